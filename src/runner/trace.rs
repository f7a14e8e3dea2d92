//! Execution traces

use crate::error::CommandError;
use crate::invocation::CommandInvocation;
use std::fmt;

/// A step that ran and passed every check.
#[derive(Debug, Clone)]
pub struct StepRecord<V> {
    pub invocation: CommandInvocation<V>,
    pub args: Vec<V>,
    pub result: V,
}

/// Which of the two independent postconditions failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailedCheck {
    /// Whole-state invariant on the system spec.
    SpecPostcondition,
    /// Per-command `postcondition(prev, next, args, result)`.
    CommandPostcondition,
}

impl fmt::Display for FailedCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailedCheck::SpecPostcondition => write!(f, "spec postcondition"),
            FailedCheck::CommandPostcondition => write!(f, "command postcondition"),
        }
    }
}

/// Where in the run a postcondition failed.
#[derive(Debug, Clone)]
pub enum FailurePoint<V> {
    InitialState,
    Step {
        index: usize,
        invocation: CommandInvocation<V>,
        args: Vec<V>,
        result: V,
    },
}

/// Context captured when a postcondition returns false.
#[derive(Debug, Clone)]
pub struct PostconditionFailure<S, V> {
    pub check: FailedCheck,
    pub point: FailurePoint<V>,
    /// Real state before the step (`None` for the initial state).
    pub prev_state: Option<S>,
    pub next_state: S,
}

impl<S, V> PostconditionFailure<S, V> {
    pub fn step(&self) -> Option<usize> {
        match &self.point {
            FailurePoint::InitialState => None,
            FailurePoint::Step { index, .. } => Some(*index),
        }
    }

    pub fn command(&self) -> Option<&str> {
        match &self.point {
            FailurePoint::InitialState => None,
            FailurePoint::Step { invocation, .. } => Some(&invocation.command),
        }
    }
}

/// Context captured when the system under test raised an error.
#[derive(Debug, Clone)]
pub struct CommandFailure<V> {
    /// `None` when `setup` failed.
    pub step: Option<usize>,
    pub invocation: Option<CommandInvocation<V>>,
    pub args: Vec<V>,
    pub error: CommandError,
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum Outcome<S, V> {
    Passed,
    PostconditionFailed(PostconditionFailure<S, V>),
    CommandFailed(CommandFailure<V>),
}

/// Failure identity used to compare a failure with its replay.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailureClass {
    Postcondition {
        check: FailedCheck,
        command: Option<String>,
    },
    Command {
        kind: String,
    },
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Postcondition {
                check,
                command: Some(command),
            } => write!(f, "{} of `{}` violated", check, command),
            FailureClass::Postcondition { check, command: None } => {
                write!(f, "{} violated on initial state", check)
            }
            FailureClass::Command { kind } => write!(f, "command error ({})", kind),
        }
    }
}

/// Everything observed while running one sequence.
#[derive(Debug, Clone)]
pub struct ExecutionTrace<S, V> {
    pub steps: Vec<StepRecord<V>>,
    pub outcome: Outcome<S, V>,
    /// Last successfully computed real state, the one handed to `cleanup`.
    pub final_state: Option<S>,
}

impl<S, V> ExecutionTrace<S, V> {
    pub fn is_passed(&self) -> bool {
        matches!(self.outcome, Outcome::Passed)
    }

    pub fn command_error(&self) -> Option<&CommandError> {
        match &self.outcome {
            Outcome::CommandFailed(failure) => Some(&failure.error),
            _ => None,
        }
    }

    pub fn failure_class(&self) -> Option<FailureClass> {
        match &self.outcome {
            Outcome::Passed => None,
            Outcome::PostconditionFailed(failure) => Some(FailureClass::Postcondition {
                check: failure.check,
                command: failure.command().map(str::to_string),
            }),
            Outcome::CommandFailed(failure) => Some(FailureClass::Command {
                kind: failure.error.kind().to_string(),
            }),
        }
    }
}
