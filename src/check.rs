//! Stateful Check Orchestrator
//!
//! Wires the pieces together: the filtered sequence strategy is driven by a
//! seeded `proptest` [`TestRunner`], each sequence is executed by the runner
//! (up to `max_tries` times), and the runner's shrinking walks the
//! [`CommandSequenceTree`](crate::generator::CommandSequenceTree) down to a
//! minimal failing sequence. Only candidates that fail with the same
//! [`FailureClass`] as the first failure count as failing while shrinking.
//!
//! After a failure the original and shrunk sequences are replayed once more
//! to produce the traces in the [`FailureReport`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! let check = StatefulCheck::new(spec, CheckConfig::new(42));
//! let result = check.run()?;
//! assert!(result.is_success(), "{}", result.summary());
//! ```

use crate::config::CheckConfig;
use crate::error::{CheckError, CommandError, RunError};
use crate::generator::CommandSequenceStrategy;
use crate::invocation::CommandInvocation;
use crate::rng;
use crate::runner::{self, ExecutionTrace, FailureClass};
use crate::spec::{ModelState, ModelValue, SystemSpec};
use proptest::test_runner::{TestCaseError, TestCaseResult, TestError};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a check failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The system under test raised an error or panicked.
    Command(CommandError),
    /// Model and system disagreed.
    Postcondition(FailureClass),
    /// The shrunk sequence passed on replay; the system is nondeterministic.
    Unreproduced(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Command(error) => write!(f, "{}", error),
            FailureCause::Postcondition(class) => write!(f, "{}", class),
            FailureCause::Unreproduced(reason) => {
                write!(f, "failure did not reproduce on replay ({})", reason)
            }
        }
    }
}

/// A failing sequence, before and after shrinking.
#[derive(Debug, Clone)]
pub struct FailureReport<S, V> {
    pub seed: u64,
    /// First failing sequence found. `None` only if it was never recorded.
    pub original: Option<Vec<CommandInvocation<V>>>,
    /// Replay of `original`, when `report_original` is set.
    pub original_trace: Option<ExecutionTrace<S, V>>,
    pub shrunk: Vec<CommandInvocation<V>>,
    pub shrunk_trace: ExecutionTrace<S, V>,
    pub cause: FailureCause,
}

/// Outcome of [`StatefulCheck::run`].
#[derive(Debug, Clone)]
pub struct CheckResult<S, V> {
    pub seed: u64,
    /// Sequence executions, shrinking included.
    pub runs: u64,
    pub failure: Option<Box<FailureReport<S, V>>>,
}

impl<S, V: fmt::Debug> CheckResult<S, V> {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn summary(&self) -> String {
        match &self.failure {
            None => format!("Seed {}: {} runs, passed", self.seed, self.runs),
            Some(report) => format!(
                "Seed {}: {} runs, FAILED: {} (shrunk to {} steps)",
                self.seed,
                self.runs,
                report.cause,
                report.shrunk.len()
            ),
        }
    }
}

/// A system specification paired with the settings to check it.
pub struct StatefulCheck<S, V = serde_json::Value> {
    spec: Arc<SystemSpec<S, V>>,
    config: CheckConfig,
}

impl<S: ModelState, V: ModelValue> StatefulCheck<S, V> {
    pub fn new(spec: SystemSpec<S, V>, config: CheckConfig) -> Self {
        Self::from_arc(Arc::new(spec), config)
    }

    pub fn from_arc(spec: Arc<SystemSpec<S, V>>, config: CheckConfig) -> Self {
        StatefulCheck { spec, config }
    }

    pub fn spec(&self) -> &SystemSpec<S, V> {
        &self.spec
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Generator of model-valid command sequences, for use with an external
    /// `proptest` harness.
    pub fn strategy(&self) -> CommandSequenceStrategy<S, V> {
        CommandSequenceStrategy::new(self.spec.clone(), self.config.max_size)
            .with_max_retries(self.config.max_precondition_retries)
    }

    /// The property checked for every generated sequence.
    ///
    /// Internal errors (unbound handles) fail the case as well, with the
    /// error in the message.
    pub fn property(&self) -> impl Fn(Vec<CommandInvocation<V>>) -> TestCaseResult + '_ {
        move |invocations| match self.execute(&invocations) {
            Ok(trace) => verdict(&trace),
            Err(err) => Err(TestCaseError::fail(format!("internal error: {}", err))),
        }
    }

    /// Execute a concrete sequence once, with real side effects.
    pub fn replay(
        &self,
        invocations: &[CommandInvocation<V>],
    ) -> Result<ExecutionTrace<S, V>, CheckError> {
        Ok(runner::run_sequence(&self.spec, invocations)?)
    }

    fn execute(&self, invocations: &[CommandInvocation<V>]) -> Result<ExecutionTrace<S, V>, RunError> {
        runner::run_repeated(&self.spec, invocations, self.config.max_tries)
    }

    /// Generate, execute and shrink until `cases` sequences pass or one fails.
    pub fn run(&self) -> Result<CheckResult<S, V>, CheckError> {
        let mut test_runner = rng::test_runner(&self.config);
        let strategy = self.strategy();

        let original: RefCell<Option<Vec<CommandInvocation<V>>>> = RefCell::new(None);
        let first_class: RefCell<Option<FailureClass>> = RefCell::new(None);
        let internal: RefCell<Option<RunError>> = RefCell::new(None);
        let runs = Cell::new(0u64);

        let outcome = test_runner.run(&strategy, |invocations| {
            runs.set(runs.get() + 1);
            match self.execute(&invocations) {
                Ok(trace) => {
                    let Some(class) = trace.failure_class() else {
                        return Ok(());
                    };
                    let mut recorded = first_class.borrow_mut();
                    match recorded.as_ref() {
                        None => {
                            *recorded = Some(class);
                            original.borrow_mut().get_or_insert(invocations);
                        }
                        // a different failure is not a smaller instance of this one
                        Some(expected) if *expected != class => {
                            debug!(%class, %expected, "shrink candidate fails differently, rejecting");
                            return Ok(());
                        }
                        Some(_) => {}
                    }
                    verdict(&trace)
                }
                Err(err) => {
                    let message = format!("internal error: {}", err);
                    internal.borrow_mut().get_or_insert(err);
                    Err(TestCaseError::fail(message))
                }
            }
        });

        if let Some(err) = internal.into_inner() {
            return Err(err.into());
        }

        let seed = self.config.seed;
        let runs = runs.get();
        match outcome {
            Ok(()) => {
                info!(seed, runs, "stateful check passed");
                Ok(CheckResult {
                    seed,
                    runs,
                    failure: None,
                })
            }
            Err(TestError::Abort(reason)) => {
                warn!(seed, reason = reason.message(), "generation aborted");
                Err(CheckError::GenerationAborted(reason.message().to_string()))
            }
            Err(TestError::Fail(reason, shrunk)) => {
                let report = self.report(original.into_inner(), shrunk, reason.message())?;
                warn!(seed, runs, cause = %report.cause, steps = report.shrunk.len(), "stateful check failed");
                Ok(CheckResult {
                    seed,
                    runs,
                    failure: Some(Box::new(report)),
                })
            }
        }
    }

    fn report(
        &self,
        original: Option<Vec<CommandInvocation<V>>>,
        shrunk: Vec<CommandInvocation<V>>,
        reason: &str,
    ) -> Result<FailureReport<S, V>, CheckError> {
        let shrunk_trace = self.replay(&shrunk)?;
        let original_trace = match &original {
            Some(seq) if self.config.report_original => Some(self.replay(seq)?),
            _ => None,
        };

        let cause = match shrunk_trace.command_error() {
            Some(error) => FailureCause::Command(error.clone()),
            None => match shrunk_trace.failure_class() {
                Some(class) => FailureCause::Postcondition(class),
                None => FailureCause::Unreproduced(reason.to_string()),
            },
        };

        Ok(FailureReport {
            seed: self.config.seed,
            original,
            original_trace,
            shrunk,
            shrunk_trace,
            cause,
        })
    }
}

impl<S, V> fmt::Debug for StatefulCheck<S, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatefulCheck")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn verdict<S, V: fmt::Display>(trace: &ExecutionTrace<S, V>) -> TestCaseResult {
    if trace.is_passed() {
        Ok(())
    } else {
        Err(TestCaseError::fail(trace.to_string()))
    }
}

/// Check the same specification under consecutive seeds.
///
/// A fatal error (broken spec, internal error) stops the batch.
pub fn run_check_batch<S: ModelState, V: ModelValue>(
    spec: Arc<SystemSpec<S, V>>,
    start_seed: u64,
    num_seeds: usize,
    config_fn: fn(u64) -> CheckConfig,
) -> Result<Vec<CheckResult<S, V>>, CheckError> {
    (0..num_seeds)
        .map(|i| {
            let seed = start_seed + i as u64;
            StatefulCheck::from_arc(spec.clone(), config_fn(seed)).run()
        })
        .collect()
}

/// Summarize batch results
pub fn summarize_batch<S, V: fmt::Debug>(results: &[CheckResult<S, V>]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed = total - passed;
    let total_runs: u64 = results.iter().map(|r| r.runs).sum();

    let mut summary = format!(
        "Stateful Check Summary\n\
         ======================\n\
         Seeds: {} total, {} passed, {} failed\n\
         Total runs: {}\n",
        total, passed, failed, total_runs
    );

    if failed > 0 {
        summary.push_str("\nFailed seeds:\n");
        for result in results.iter().filter(|r| !r.is_success()) {
            summary.push_str(&format!("  {}\n", result.summary()));
        }
    }

    summary
}
