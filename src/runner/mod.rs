//! Command Runner
//!
//! Executes one concrete sequence against the live system, strictly in
//! order on the calling thread:
//!
//! ```text
//! setup → initial state → [resolve args → command → bind → next state
//!                          → spec postcondition → command postcondition]*
//!       → cleanup (always)
//! ```
//!
//! The first failing check or command error stops the run. A panic in any
//! real-phase callback (initial state, command, next state, postconditions)
//! is captured as [`CommandError::Panicked`] and stops the run the same way.
//! `cleanup` runs exactly once on every exit path once setup has succeeded,
//! because it is tied to a drop guard that owns the current real state.
//!
//! The runner never calls `requires`, `args` or `precondition`.

mod trace;

pub use trace::{
    CommandFailure, ExecutionTrace, FailedCheck, FailureClass, FailurePoint, Outcome,
    PostconditionFailure, StepRecord,
};

use crate::error::{CommandError, RunError};
use crate::invocation::CommandInvocation;
use crate::spec::{ModelState, ModelValue, SystemSpec};
use crate::symbolic::{Bindings, HandleId, Term};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Owns the current real state and hands it to `cleanup` when dropped.
struct CleanupGuard<'a, S: ModelState, V: ModelValue> {
    spec: &'a SystemSpec<S, V>,
    state: S,
}

impl<'a, S: ModelState, V: ModelValue> CleanupGuard<'a, S, V> {
    fn new(spec: &'a SystemSpec<S, V>, state: S) -> Self {
        CleanupGuard { spec, state }
    }

    fn state(&self) -> &S {
        &self.state
    }

    fn advance(&mut self, next: S) -> S {
        std::mem::replace(&mut self.state, next)
    }
}

impl<S: ModelState, V: ModelValue> Drop for CleanupGuard<'_, S, V> {
    fn drop(&mut self) {
        debug!("running cleanup");
        if let Err(error) = guarded(|| self.spec.run_cleanup(&self.state)) {
            warn!(%error, "cleanup panicked");
        }
    }
}

/// Call into the system under test, turning panics into command errors.
fn call_real<V, F>(f: F) -> Result<V, CommandError>
where
    F: FnOnce() -> Result<V, CommandError>,
{
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(CommandError::from_panic(payload)))
}

/// Call a user callback that cannot fail except by panicking.
fn guarded<T, F>(f: F) -> Result<T, CommandError>
where
    F: FnOnce() -> T,
{
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(CommandError::from_panic)
}

fn step_failure<S, V: Clone>(
    index: usize,
    invocation: &CommandInvocation<V>,
    args: Vec<V>,
    error: CommandError,
) -> Outcome<S, V> {
    warn!(step = index, command = %invocation.command, %error, "command failed");
    Outcome::CommandFailed(CommandFailure {
        step: Some(index),
        invocation: Some(invocation.clone()),
        args,
        error,
    })
}

/// Execute `invocations` once, with a fresh setup and cleanup.
///
/// `Err` is reserved for internal invariant violations (an unbound handle,
/// an unknown command name); every behavior of the system under test is
/// reported through the returned trace.
pub fn run_sequence<S: ModelState, V: ModelValue>(
    spec: &SystemSpec<S, V>,
    invocations: &[CommandInvocation<V>],
) -> Result<ExecutionTrace<S, V>, RunError> {
    let mut bindings: Bindings<V> = Bindings::new();
    let mut steps = Vec::with_capacity(invocations.len());

    let setup_result = panic::catch_unwind(AssertUnwindSafe(|| spec.run_setup()))
        .unwrap_or_else(|payload| Some(Err(CommandError::from_panic(payload))));
    let setup = match setup_result {
        None => None,
        Some(Ok(value)) => {
            bindings.bind(HandleId::Setup, value.clone())?;
            Some(value)
        }
        Some(Err(error)) => {
            warn!(%error, "setup failed, skipping run");
            return Ok(ExecutionTrace {
                steps,
                outcome: Outcome::CommandFailed(CommandFailure {
                    step: None,
                    invocation: None,
                    args: Vec::new(),
                    error,
                }),
                final_state: None,
            });
        }
    };

    // setup succeeded, so cleanup is owed even if the initial state panics
    let mut guard = CleanupGuard::new(spec, S::default());
    let initial = guarded(|| spec.real_initial_state(setup.as_ref()))
        .and_then(|state| {
            guard.advance(state);
            guarded(|| spec.postcondition(guard.state()))
        });
    let initial_ok = match initial {
        Ok(ok) => ok,
        Err(error) => {
            warn!(%error, "initial state panicked");
            let outcome = Outcome::CommandFailed(CommandFailure {
                step: None,
                invocation: None,
                args: Vec::new(),
                error,
            });
            return Ok(finish(guard, steps, outcome));
        }
    };

    if !initial_ok {
        warn!("spec postcondition failed on initial state");
        let outcome = Outcome::PostconditionFailed(PostconditionFailure {
            check: FailedCheck::SpecPostcondition,
            point: FailurePoint::InitialState,
            prev_state: None,
            next_state: guard.state().clone(),
        });
        return Ok(finish(guard, steps, outcome));
    }

    for (index, invocation) in invocations.iter().enumerate() {
        let command = spec.command(&invocation.command)?;
        let args = bindings.resolve_all(&invocation.args)?;

        let result = match call_real(|| command.run(&args)) {
            Ok(result) => result,
            Err(error) => {
                let outcome = step_failure(index, invocation, args, error);
                return Ok(finish(guard, steps, outcome));
            }
        };
        bindings.bind(invocation.handle.root(), result.clone())?;
        debug!(step = index, handle = %invocation.handle, command = %invocation.command, ?result, "executed");

        let concrete_args: Vec<Term<V>> = args.iter().cloned().map(Term::Value).collect();
        let next = match guarded(|| {
            command.real_next_state(guard.state(), &concrete_args, &Term::Value(result.clone()))
        }) {
            Ok(next) => next,
            Err(error) => {
                let outcome = step_failure(index, invocation, args, error);
                return Ok(finish(guard, steps, outcome));
            }
        };
        let prev = guard.advance(next);

        let checked = guarded(|| {
            if !spec.postcondition(guard.state()) {
                Some(FailedCheck::SpecPostcondition)
            } else if !command.postcondition(&prev, guard.state(), &args, &result) {
                Some(FailedCheck::CommandPostcondition)
            } else {
                None
            }
        });
        let failed = match checked {
            Ok(failed) => failed,
            Err(error) => {
                let outcome = step_failure(index, invocation, args, error);
                return Ok(finish(guard, steps, outcome));
            }
        };

        if let Some(check) = failed {
            warn!(step = index, command = %invocation.command, %check, "postcondition failed");
            let outcome = Outcome::PostconditionFailed(PostconditionFailure {
                check,
                point: FailurePoint::Step {
                    index,
                    invocation: invocation.clone(),
                    args,
                    result,
                },
                prev_state: Some(prev),
                next_state: guard.state().clone(),
            });
            return Ok(finish(guard, steps, outcome));
        }

        steps.push(StepRecord {
            invocation: invocation.clone(),
            args,
            result,
        });
    }

    Ok(finish(guard, steps, Outcome::Passed))
}

fn finish<S: ModelState, V: ModelValue>(
    guard: CleanupGuard<'_, S, V>,
    steps: Vec<StepRecord<V>>,
    outcome: Outcome<S, V>,
) -> ExecutionTrace<S, V> {
    let final_state = Some(guard.state().clone());
    drop(guard);
    ExecutionTrace {
        steps,
        outcome,
        final_state,
    }
}

/// Run the same sequence up to `tries` times and return the first failing
/// trace, or the last passing one. Catches systems whose failures only show
/// up on some executions.
pub fn run_repeated<S: ModelState, V: ModelValue>(
    spec: &SystemSpec<S, V>,
    invocations: &[CommandInvocation<V>],
    tries: u32,
) -> Result<ExecutionTrace<S, V>, RunError> {
    let mut trace = run_sequence(spec, invocations)?;
    for attempt in 1..tries {
        if !trace.is_passed() {
            debug!(attempt, "failing execution, skipping remaining tries");
            break;
        }
        trace = run_sequence(spec, invocations)?;
    }
    Ok(trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::CommandSpec;
    use crate::symbolic::SymbolicValue;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;

    /// Model: a counter.
    #[derive(Debug, Clone, Default, PartialEq)]
    struct Count {
        n: i64,
    }

    fn incr_next(s: &Count, _: &[Term<Value>], _: &Term<Value>) -> Count {
        Count { n: s.n + 1 }
    }

    fn counter_spec(
        counter: Arc<Mutex<i64>>,
        cleanups: Arc<Mutex<Vec<Count>>>,
    ) -> SystemSpec<Count, Value> {
        let c = counter.clone();
        SystemSpec::builder()
            .command(
                "incr",
                CommandSpec::new(move |_: &[Value]| {
                    let mut n = c.lock();
                    *n += 1;
                    Ok(json!(*n))
                })
                .next_state(incr_next)
                .postcondition(|_: &Count, next: &Count, _: &[Value], result: &Value| {
                    result.as_i64() == Some(next.n)
                }),
            )
            .command(
                "explode",
                CommandSpec::new(|_: &[Value]| Err(CommandError::new("Overflow", "too big"))),
            )
            .command(
                "panic",
                CommandSpec::new(|_: &[Value]| -> Result<Value, CommandError> {
                    panic!("counter corrupted")
                }),
            )
            .cleanup(move |state: &Count| cleanups.lock().push(state.clone()))
            .build()
            .unwrap()
    }

    fn step(index: u64, command: &str) -> CommandInvocation<Value> {
        CommandInvocation::new(SymbolicValue::new(index), command, vec![])
    }

    #[test]
    fn test_passing_run() {
        let cleanups = Arc::new(Mutex::new(Vec::new()));
        let spec = counter_spec(Arc::new(Mutex::new(0)), cleanups.clone());
        let trace = run_sequence(&spec, &[step(0, "incr"), step(1, "incr")]).unwrap();

        assert!(trace.is_passed());
        assert_eq!(trace.steps.len(), 2);
        assert_eq!(trace.steps[1].result, json!(2));
        assert_eq!(trace.final_state, Some(Count { n: 2 }));
        assert_eq!(*cleanups.lock(), vec![Count { n: 2 }]);
    }

    #[test]
    fn test_command_postcondition_failure_stops_run() {
        let counter = Arc::new(Mutex::new(10));
        let cleanups = Arc::new(Mutex::new(Vec::new()));
        let spec = counter_spec(counter.clone(), cleanups.clone());
        let trace = run_sequence(&spec, &[step(0, "incr"), step(1, "incr")]).unwrap();

        match &trace.outcome {
            Outcome::PostconditionFailed(failure) => {
                assert_eq!(failure.check, FailedCheck::CommandPostcondition);
                assert_eq!(failure.step(), Some(0));
                assert_eq!(failure.prev_state, Some(Count { n: 0 }));
                assert_eq!(failure.next_state, Count { n: 1 });
            }
            other => panic!("expected postcondition failure, got {:?}", other),
        }
        // second step never ran
        assert_eq!(*counter.lock(), 11);
        assert_eq!(*cleanups.lock(), vec![Count { n: 1 }]);
    }

    #[test]
    fn test_command_error_captured() {
        let cleanups = Arc::new(Mutex::new(Vec::new()));
        let spec = counter_spec(Arc::new(Mutex::new(0)), cleanups.clone());
        let trace = run_sequence(&spec, &[step(0, "incr"), step(1, "explode"), step(2, "incr")]).unwrap();

        assert_eq!(trace.steps.len(), 1);
        assert_eq!(
            trace.command_error(),
            Some(&CommandError::new("Overflow", "too big"))
        );
        assert_eq!(
            trace.failure_class(),
            Some(FailureClass::Command { kind: "Overflow".into() })
        );
        assert_eq!(*cleanups.lock(), vec![Count { n: 1 }]);
    }

    #[test]
    fn test_panic_captured_as_command_error() {
        let cleanups = Arc::new(Mutex::new(Vec::new()));
        let spec = counter_spec(Arc::new(Mutex::new(0)), cleanups.clone());
        let trace = run_sequence(&spec, &[step(0, "panic")]).unwrap();

        assert_eq!(
            trace.command_error(),
            Some(&CommandError::Panicked("counter corrupted".into()))
        );
        assert_eq!(cleanups.lock().len(), 1);
    }

    /// `peek` reads its first argument but is always called without one.
    fn careless_spec(cleanups: Arc<Mutex<Vec<Count>>>) -> SystemSpec<Count, Value> {
        SystemSpec::builder()
            .command(
                "peek",
                CommandSpec::new(|_: &[Value]| Ok(json!(0))).postcondition(
                    |_: &Count, _: &Count, args: &[Value], result: &Value| &args[0] == result,
                ),
            )
            .command(
                "grow",
                CommandSpec::new(|_: &[Value]| Ok(json!(1))).real_next_state(
                    |_: &Count, args: &[Term<Value>], _: &Term<Value>| Count {
                        n: args[0].as_value().and_then(Value::as_i64).unwrap_or_default(),
                    },
                ),
            )
            .command("incr", CommandSpec::new(|_: &[Value]| Ok(json!(1))).next_state(incr_next))
            .cleanup(move |state: &Count| cleanups.lock().push(state.clone()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_postcondition_panic_captured() {
        let cleanups = Arc::new(Mutex::new(Vec::new()));
        let spec = careless_spec(cleanups.clone());
        let trace = run_sequence(&spec, &[step(0, "incr"), step(1, "peek"), step(2, "incr")]).unwrap();

        assert!(matches!(trace.command_error(), Some(CommandError::Panicked(_))));
        assert_eq!(trace.failure_class(), Some(FailureClass::Command { kind: "panic".into() }));
        match &trace.outcome {
            Outcome::CommandFailed(failure) => {
                assert_eq!(failure.step, Some(1));
                assert_eq!(failure.invocation.as_ref().map(|inv| inv.command.as_str()), Some("peek"));
            }
            other => panic!("expected command failure, got {:?}", other),
        }
        assert_eq!(trace.steps.len(), 1);
        // the state peek advanced to is kept for cleanup
        assert_eq!(*cleanups.lock(), vec![Count { n: 1 }]);
    }

    #[test]
    fn test_real_next_state_panic_captured() {
        let cleanups = Arc::new(Mutex::new(Vec::new()));
        let spec = careless_spec(cleanups.clone());
        let trace = run_sequence(&spec, &[step(0, "incr"), step(1, "grow")]).unwrap();

        assert!(matches!(trace.command_error(), Some(CommandError::Panicked(_))));
        assert_eq!(trace.steps.len(), 1);
        assert_eq!(*cleanups.lock(), vec![Count { n: 1 }]);
    }

    #[test]
    fn test_initial_state_panic_still_cleans_up() {
        let cleanups = Arc::new(Mutex::new(Vec::new()));
        let cl = cleanups.clone();
        let spec: SystemSpec<Count, Value> = SystemSpec::builder()
            .command("incr", CommandSpec::new(|_: &[Value]| Ok(json!(1))))
            .setup(|| Ok(json!({"conn": 1})))
            .real_initial_state(|setup: Option<&Term<Value>>| Count {
                n: setup.and_then(Term::as_value).and_then(|v| v["missing"].as_i64()).expect("no count in setup"),
            })
            .cleanup(move |s: &Count| cl.lock().push(s.clone()))
            .build()
            .unwrap();

        let trace = run_sequence(&spec, &[step(0, "incr")]).unwrap();
        match &trace.outcome {
            Outcome::CommandFailed(failure) => {
                assert_eq!(failure.step, None);
                assert_eq!(failure.error, CommandError::Panicked("no count in setup".into()));
            }
            other => panic!("expected initial-state failure, got {:?}", other),
        }
        assert!(trace.steps.is_empty());
        assert_eq!(*cleanups.lock(), vec![Count::default()]);
    }

    #[test]
    fn test_cleanup_panic_does_not_escape() {
        let spec: SystemSpec<Count, Value> = SystemSpec::builder()
            .command("incr", CommandSpec::new(|_: &[Value]| Ok(json!(1))))
            .cleanup(|_: &Count| panic!("double close"))
            .build()
            .unwrap();
        let trace = run_sequence(&spec, &[step(0, "incr")]).unwrap();
        assert!(trace.is_passed());
    }

    #[test]
    fn test_spec_postcondition_checked_on_initial_state() {
        let cleanups = Arc::new(Mutex::new(Vec::new()));
        let cl = cleanups.clone();
        let spec: SystemSpec<Count, Value> = SystemSpec::builder()
            .command("incr", CommandSpec::new(|_: &[Value]| Ok(json!(1))))
            .initial_state(|_: Option<&Term<Value>>| Count { n: -1 })
            .postcondition(|s: &Count| s.n >= 0)
            .cleanup(move |s: &Count| cl.lock().push(s.clone()))
            .build()
            .unwrap();

        let trace = run_sequence(&spec, &[step(0, "incr")]).unwrap();
        match &trace.outcome {
            Outcome::PostconditionFailed(failure) => {
                assert_eq!(failure.check, FailedCheck::SpecPostcondition);
                assert_eq!(failure.step(), None);
            }
            other => panic!("expected initial-state failure, got {:?}", other),
        }
        assert!(trace.steps.is_empty());
        assert_eq!(*cleanups.lock(), vec![Count { n: -1 }]);
    }

    #[test]
    fn test_setup_result_bound_and_resolvable() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let spec: SystemSpec<Count, Value> = SystemSpec::builder()
            .command(
                "read",
                CommandSpec::new(move |args: &[Value]| {
                    s.lock().push(args[0].clone());
                    Ok(Value::Null)
                }),
            )
            .setup(|| Ok(json!({"port": 6379})))
            .build()
            .unwrap();

        let read = CommandInvocation::new(
            SymbolicValue::new(0),
            "read",
            vec![SymbolicValue::setup().project("port").into()],
        );
        let trace = run_sequence(&spec, &[read]).unwrap();
        assert!(trace.is_passed());
        assert_eq!(*seen.lock(), vec![json!(6379)]);
    }

    #[test]
    fn test_setup_failure_skips_cleanup() {
        let cleanups = Arc::new(Mutex::new(0));
        let cl = cleanups.clone();
        let spec: SystemSpec<Count, Value> = SystemSpec::builder()
            .command("incr", CommandSpec::new(|_: &[Value]| Ok(json!(1))))
            .setup(|| Err(CommandError::new("ConnectionRefused", "no server")))
            .cleanup(move |_: &Count| *cl.lock() += 1)
            .build()
            .unwrap();

        let trace = run_sequence(&spec, &[step(0, "incr")]).unwrap();
        assert_eq!(
            trace.failure_class(),
            Some(FailureClass::Command { kind: "ConnectionRefused".into() })
        );
        assert_eq!(*cleanups.lock(), 0);
    }

    #[test]
    fn test_unbound_handle_is_internal_error() {
        let spec = counter_spec(Arc::new(Mutex::new(0)), Arc::new(Mutex::new(Vec::new())));
        let bad = CommandInvocation::new(
            SymbolicValue::new(0),
            "incr",
            vec![SymbolicValue::new(5).into()],
        );
        assert!(matches!(
            run_sequence(&spec, &[bad]),
            Err(RunError::Resolve(_))
        ));
    }

    #[test]
    fn test_run_repeated_stops_at_first_failure() {
        let counter = Arc::new(Mutex::new(0));
        let cleanups = Arc::new(Mutex::new(Vec::new()));
        let spec = counter_spec(counter.clone(), cleanups.clone());
        // the real counter is never reset, so the second run disagrees with the model
        let trace = run_repeated(&spec, &[step(0, "incr")], 5).unwrap();
        assert!(!trace.is_passed());
        assert_eq!(cleanups.lock().len(), 2);
    }
}
