//! Validity Verifier
//!
//! Shrinking mutates a command sequence structurally, without any knowledge
//! of the model. Before a shrunk candidate is executed it is replayed here
//! against the abstract model exactly as generation would have built it:
//! same `requires`, same `precondition`, same model next-state, same
//! symbolic handles. A candidate that fails any check is rejected.
//!
//! The verifier is pure: it never calls a real command.

use crate::invocation::CommandInvocation;
use crate::spec::{ModelState, ModelValue, SystemSpec};
use crate::symbolic::{HandleId, SymbolicValue, Term};
use std::collections::HashSet;
use thiserror::Error;

/// Why a candidate sequence is not a sequence generation could have produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("step {step}: unknown command `{command}`")]
    UnknownCommand { step: usize, command: String },

    #[error("step {step}: `{command}` is not eligible in this state")]
    Requires { step: usize, command: String },

    #[error("step {step}: precondition of `{command}` does not hold")]
    Precondition { step: usize, command: String },

    #[error("step {step}: handle {handle} is not a fresh step handle")]
    HandleOrder { step: usize, handle: String },

    #[error("step {step}: argument {handle} is not produced by an earlier step")]
    DanglingReference { step: usize, handle: String },
}

/// Replay `invocations` from the model initial state.
pub fn verify<S: ModelState, V: ModelValue>(
    spec: &SystemSpec<S, V>,
    invocations: &[CommandInvocation<V>],
) -> Result<(), Rejection> {
    let mut state = spec.model_initial_state();
    let mut produced: HashSet<HandleId> = HashSet::new();
    if spec.has_setup() {
        produced.insert(HandleId::Setup);
    }
    let mut last_index: Option<u64> = None;

    for (step, inv) in invocations.iter().enumerate() {
        let command = spec
            .command(&inv.command)
            .map_err(|_| Rejection::UnknownCommand {
                step,
                command: inv.command.clone(),
            })?;

        let index = fresh_index(&inv.handle, last_index).ok_or_else(|| Rejection::HandleOrder {
            step,
            handle: inv.handle.to_string(),
        })?;

        if let Some(dangling) = inv.references().find(|sym| !produced.contains(&sym.root())) {
            return Err(Rejection::DanglingReference {
                step,
                handle: dangling.to_string(),
            });
        }

        if !command.requires(&state) {
            return Err(Rejection::Requires {
                step,
                command: inv.command.clone(),
            });
        }
        if !command.precondition(&state, &inv.args) {
            return Err(Rejection::Precondition {
                step,
                command: inv.command.clone(),
            });
        }

        state = command.model_next_state(&state, &inv.args, &Term::Symbolic(inv.handle.clone()));
        produced.insert(inv.handle.root());
        last_index = Some(index);
    }

    Ok(())
}

pub fn is_valid<S: ModelState, V: ModelValue>(
    spec: &SystemSpec<S, V>,
    invocations: &[CommandInvocation<V>],
) -> bool {
    verify(spec, invocations).is_ok()
}

/// A step handle must be an unprojected step root, later than the last one.
fn fresh_index(handle: &SymbolicValue, last: Option<u64>) -> Option<u64> {
    if !handle.path().is_empty() {
        return None;
    }
    let index = handle.index()?;
    match last {
        Some(prev) if index <= prev => None,
        _ => Some(index),
    }
}
