//! Model-based stateful property testing.
//!
//! A [`SystemSpec`] describes a stateful system as an abstract model: commands
//! with argument generators, preconditions, next-state functions and
//! postconditions. [`StatefulCheck`] generates random command sequences from
//! the model, runs them against the real system, and shrinks any failing
//! sequence to a minimal one that the model still accepts.
//!
//! Results of earlier commands are referenced through symbolic handles
//! ([`SymbolicValue`]) at generation time and resolved to concrete values when
//! the sequence is executed.

pub mod check;
pub mod config;
pub mod error;
pub mod generator;
pub mod invocation;
pub mod logging;
mod report;
pub mod rng;
pub mod runner;
pub mod spec;
pub mod symbolic;
pub mod verifier;

pub use check::{run_check_batch, summarize_batch, CheckResult, FailureCause, FailureReport, StatefulCheck};
pub use config::{CheckConfig, ConfigError};
pub use error::{CheckError, CommandError, GenerationError, RunError, SpecError};
pub use generator::{generate_sequence, CommandSequenceStrategy, CommandSequenceTree};
pub use invocation::CommandInvocation;
pub use runner::{run_repeated, run_sequence, ExecutionTrace, FailureClass, Outcome};
pub use spec::{CommandSpec, ModelState, ModelValue, SystemSpec, SystemSpecBuilder};
pub use symbolic::{Bindings, HandleId, Key, Project, ResolveError, SymbolicValue, Term};
