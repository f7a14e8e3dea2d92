//! Command Sequence Generator
//!
//! Builds command sequences against the abstract model only. Nothing here
//! touches the real system: `command` is never called, and every state
//! transition goes through the model next-state with a symbolic result.
//!
//! ## Algorithm
//!
//! Sized generation over a budget `n`:
//!
//! ```text
//! loop:
//!   stop with weight 1, continue with weight n   (n == 0 always stops)
//!   draw name   <- generate_command(state)
//!   draw args   <- args(state)
//!   precondition(state, args)?  no  -> redraw (bounded)
//!                               yes -> handle #<i>, state <- next_state(state, args, #<i>)
//!   n <- n - 1, i <- i + 1
//! ```
//!
//! With this weighting the sequence length is uniform over `0..=n`.
//!
//! All randomness comes from the `proptest` [`TestRunner`], so the same runner
//! state always yields the same sequence.

mod tree;

pub use tree::CommandSequenceTree;

use crate::error::{GenerationError, SpecError};
use crate::invocation::CommandInvocation;
use crate::spec::{ModelState, ModelValue, SystemSpec};
use crate::symbolic::{SymbolicValue, Term};
use proptest::strategy::{NewTree, Strategy, ValueTree};
use proptest::test_runner::{Reason, TestRunner};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Default bound on redraws for a single step.
pub const DEFAULT_MAX_PRECONDITION_RETRIES: u32 = 100;

/// One generated step together with the shrink tree of its arguments.
pub(crate) struct GeneratedStep<V> {
    pub(crate) handle: SymbolicValue,
    pub(crate) command: String,
    pub(crate) args: Vec<Term<V>>,
    pub(crate) args_tree: Box<dyn ValueTree<Value = Vec<Term<V>>>>,
}

impl<V: Clone> GeneratedStep<V> {
    pub(crate) fn invocation(&self) -> CommandInvocation<V> {
        CommandInvocation::new(self.handle.clone(), self.command.clone(), self.args.clone())
    }
}

/// Generate a sequence of at most `size` steps.
pub fn generate_sequence<S: ModelState, V: ModelValue>(
    spec: &SystemSpec<S, V>,
    runner: &mut TestRunner,
    size: usize,
    max_retries: u32,
) -> Result<Vec<CommandInvocation<V>>, GenerationError> {
    let steps = generate_steps(spec, runner, size, max_retries)?;
    Ok(steps.iter().map(GeneratedStep::invocation).collect())
}

pub(crate) fn generate_steps<S: ModelState, V: ModelValue>(
    spec: &SystemSpec<S, V>,
    runner: &mut TestRunner,
    size: usize,
    max_retries: u32,
) -> Result<Vec<GeneratedStep<V>>, GenerationError> {
    let mut state = spec.model_initial_state();
    let mut steps = Vec::new();
    let mut remaining = size;
    let mut index: u64 = 0;

    while remaining > 0 && !should_stop(runner, remaining)? {
        match draw_step(spec, runner, &state, index, max_retries)? {
            Some((step, next_state)) => {
                trace!(handle = %step.handle, command = %step.command, "generated step");
                steps.push(step);
                state = next_state;
            }
            None => {
                debug!(index, "no eligible command, ending sequence");
                break;
            }
        }
        remaining -= 1;
        index += 1;
    }

    debug!(size, len = steps.len(), "generated command sequence");
    Ok(steps)
}

/// Weight 1 for stop, weight `n` for continue.
fn should_stop(runner: &mut TestRunner, n: usize) -> Result<bool, GenerationError> {
    let roll = draw(&(0..=n), runner).map_err(|reason| GenerationError::Draw(reason.to_string()))?;
    Ok(roll == 0)
}

fn draw<T: Strategy>(strategy: &T, runner: &mut TestRunner) -> Result<T::Value, Reason> {
    strategy.new_tree(runner).map(|tree| tree.current())
}

/// Draw one precondition-valid step, redrawing up to `max_retries` times.
///
/// Returns `Ok(None)` when the default command generator has no eligible
/// command for this state.
fn draw_step<S: ModelState, V: ModelValue>(
    spec: &SystemSpec<S, V>,
    runner: &mut TestRunner,
    state: &S,
    index: u64,
    max_retries: u32,
) -> Result<Option<(GeneratedStep<V>, S)>, GenerationError> {
    for _ in 0..max_retries {
        let Some(names) = spec.command_generator(state) else {
            return Ok(None);
        };
        let name = draw(&names, runner)
            .map_err(|reason| SpecError::MalformedCommandGenerator(reason.to_string()))?;
        let command = spec.command(&name)?;

        if !command.requires(state) {
            trace!(index, command = %name, "requires rejected draw");
            continue;
        }

        let args_tree = command
            .args(state)
            .new_tree(runner)
            .map_err(|reason| SpecError::MalformedArgs {
                command: name.clone(),
                reason: reason.to_string(),
            })?;
        let args = args_tree.current();

        if !command.precondition(state, &args) {
            trace!(index, command = %name, "precondition rejected draw");
            continue;
        }

        let handle = SymbolicValue::new(index);
        let next_state = command.model_next_state(state, &args, &Term::Symbolic(handle.clone()));
        let step = GeneratedStep {
            handle,
            command: name,
            args,
            args_tree,
        };
        return Ok(Some((step, next_state)));
    }

    warn!(index, attempts = max_retries, "precondition retry budget exhausted");
    Err(GenerationError::Exhausted {
        index,
        attempts: max_retries,
    })
}

/// `proptest` strategy producing shrinkable command sequences.
///
/// Shrink candidates are re-validated against the model before they are
/// exposed (see [`CommandSequenceTree`]).
pub struct CommandSequenceStrategy<S, V> {
    spec: Arc<SystemSpec<S, V>>,
    max_size: usize,
    max_retries: u32,
}

impl<S: ModelState, V: ModelValue> CommandSequenceStrategy<S, V> {
    pub fn new(spec: Arc<SystemSpec<S, V>>, max_size: usize) -> Self {
        CommandSequenceStrategy {
            spec,
            max_size,
            max_retries: DEFAULT_MAX_PRECONDITION_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl<S, V> fmt::Debug for CommandSequenceStrategy<S, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSequenceStrategy")
            .field("max_size", &self.max_size)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl<S: ModelState, V: ModelValue> Strategy for CommandSequenceStrategy<S, V> {
    type Tree = CommandSequenceTree<S, V>;
    type Value = Vec<CommandInvocation<V>>;

    fn new_tree(&self, runner: &mut TestRunner) -> NewTree<Self> {
        let steps = generate_steps(&self.spec, runner, self.max_size, self.max_retries)
            .map_err(|err| Reason::from(err.to_string()))?;
        Ok(CommandSequenceTree::new(self.spec.clone(), steps))
    }
}
