//! Human-readable rendering of runs and failures
//!
//! One line per executed step, the step that stopped the run, then a `fail:`
//! or `pass` verdict:
//!
//! ```text
//! #<0> = (new) => 0
//! #<1> = (push #<0> 7) => 7
//! #<2> = (pop #<0>) => [7]
//! fail: command postcondition violated at step 2
//! ```
//!
//! Values are printed with their `Display` form.

use crate::check::FailureReport;
use crate::runner::{ExecutionTrace, FailurePoint, Outcome};
use crate::symbolic::HandleId;
use std::fmt;

impl<S, V: fmt::Display> fmt::Display for ExecutionTrace<S, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            writeln!(f, "{} = {} => {}", step.invocation.handle, step.invocation, step.result)?;
        }
        match &self.outcome {
            Outcome::Passed => write!(f, "pass"),
            Outcome::PostconditionFailed(failure) => match &failure.point {
                FailurePoint::InitialState => {
                    write!(f, "fail: {} violated on initial state", failure.check)
                }
                FailurePoint::Step {
                    index,
                    invocation,
                    result,
                    ..
                } => {
                    writeln!(f, "{} = {} => {}", invocation.handle, invocation, result)?;
                    write!(f, "fail: {} violated at step {}", failure.check, index)
                }
            },
            Outcome::CommandFailed(failure) => {
                match &failure.invocation {
                    Some(invocation) => {
                        writeln!(f, "{} = {} !! {}", invocation.handle, invocation, failure.error)?
                    }
                    None => writeln!(f, "{} = (setup) !! {}", HandleId::Setup, failure.error)?,
                }
                write!(f, "fail: {}", failure.error)
            }
        }
    }
}

fn write_sequence<S, V: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    len: usize,
    trace: Option<&ExecutionTrace<S, V>>,
) -> fmt::Result {
    writeln!(f, "{} ({} steps):", title, len)?;
    match trace {
        Some(trace) => {
            for line in trace.to_string().lines() {
                writeln!(f, "  {}", line)?;
            }
            Ok(())
        }
        None => writeln!(f, "  (not replayed)"),
    }
}

impl<S, V: fmt::Display> fmt::Display for FailureReport<S, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "stateful check failed (seed {}): {}", self.seed, self.cause)?;
        if let Some(original) = &self.original {
            write_sequence(f, "original", original.len(), self.original_trace.as_ref())?;
        }
        write_sequence(f, "shrunk", self.shrunk.len(), Some(&self.shrunk_trace))
    }
}
