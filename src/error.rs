//! Error taxonomy for stateful checks
//!
//! Errors are split by who is at fault:
//! - [`SpecError`]: the specification itself is broken (fatal, never retried)
//! - [`GenerationError`]: sequence generation could not complete
//! - [`CommandError`]: the system under test failed while running a command
//! - [`ResolveError`](crate::symbolic::ResolveError): internal invariant violation
//! - [`CheckError`]: what the orchestrator hands back to the caller
//!
//! Postcondition violations are deliberately absent: they are test outcomes,
//! recorded in [`Outcome`](crate::runner::Outcome), not errors.

use crate::symbolic::ResolveError;
use thiserror::Error;

/// A bug in the system specification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("unknown command `{0}` produced by generate_command")]
    UnknownCommand(String),

    #[error("system specification declares no commands")]
    NoCommands,

    #[error("command `{0}` registered more than once")]
    DuplicateCommand(String),

    #[error("argument generator for `{command}` failed: {reason}")]
    MalformedArgs { command: String, reason: String },

    #[error("command generator failed: {0}")]
    MalformedCommandGenerator(String),
}

/// Failure to produce a command sequence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("no precondition-valid command found for step {index} after {attempts} attempts")]
    Exhausted { index: u64, attempts: u32 },

    #[error("random draw failed: {0}")]
    Draw(String),
}

/// Failure raised by the real system while executing a command or `setup`.
///
/// This is the Rust counterpart of an exception escaping the system under
/// test: it stops the run and becomes the authoritative failure cause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{kind}: {message}")]
    Failed { kind: String, message: String },

    #[error("command panicked: {0}")]
    Panicked(String),
}

impl CommandError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        CommandError::Failed {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Wrap any error, using its type name as the failure kind.
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        CommandError::Failed {
            kind: std::any::type_name::<E>().to_string(),
            message: err.to_string(),
        }
    }

    /// Turn a payload caught by `catch_unwind` into an error.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        CommandError::Panicked(message)
    }

    /// The failure class, used to compare an original failure with its replay.
    pub fn kind(&self) -> &str {
        match self {
            CommandError::Failed { kind, .. } => kind,
            CommandError::Panicked(_) => "panic",
        }
    }
}

/// Fatal errors while executing a sequence. Neither is a test outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Spec(#[from] SpecError),
}

/// Errors returned by [`StatefulCheck`](crate::check::StatefulCheck).
#[derive(Debug, Clone, Error)]
pub enum CheckError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("sequence generation aborted: {0}")]
    GenerationAborted(String),

    #[error("internal error while resolving symbolic values: {0}")]
    Internal(#[from] ResolveError),

    #[error("test runner failed without a recorded failing sequence: {0}")]
    Harness(String),
}

impl From<RunError> for CheckError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Resolve(e) => CheckError::Internal(e),
            RunError::Spec(e) => CheckError::Spec(e),
        }
    }
}
