//! System Specifications
//!
//! A [`SystemSpec`] is the whole model handed to the engine: the command
//! registry plus lifecycle hooks and initial-state functions. It is an
//! explicit value, built once through [`SystemSpecBuilder`] and shared by
//! reference; changing behavior means building a new spec.
//!
//! All fallback resolution (`model/real` → generic → default) happens in
//! [`SystemSpecBuilder::build`], never at call time.

pub mod command;

pub use command::{
    ArgsFn, CommandFn, CommandSpec, NextStateFn, PostconditionFn, PreconditionFn, RequiresFn,
    ResolvedCommand,
};

use crate::error::{CommandError, SpecError};
use crate::symbolic::{Project, SymbolicValue, Term};
use proptest::sample::select;
use proptest::strategy::{BoxedStrategy, Strategy};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Bounds for the state type threaded through both phases.
pub trait ModelState: Clone + fmt::Debug + Default + Send + Sync + 'static {}

impl<T> ModelState for T where T: Clone + fmt::Debug + Default + Send + Sync + 'static {}

/// Bounds for concrete argument and result values. `Display` is what
/// failure reports print.
pub trait ModelValue: Clone + fmt::Debug + fmt::Display + Project + Send + Sync + 'static {}

impl<T> ModelValue for T where T: Clone + fmt::Debug + fmt::Display + Project + Send + Sync + 'static {}

pub type GenerateCommandFn<S> = Arc<dyn Fn(&S) -> BoxedStrategy<String> + Send + Sync>;
pub type SetupFn<V> = Arc<dyn Fn() -> Result<V, CommandError> + Send + Sync>;
pub type CleanupFn<S> = Arc<dyn Fn(&S) + Send + Sync>;
pub type InitialStateFn<S, V> = Arc<dyn Fn(Option<&Term<V>>) -> S + Send + Sync>;
pub type StatePostconditionFn<S> = Arc<dyn Fn(&S) -> bool + Send + Sync>;

/// A resolved system specification.
pub struct SystemSpec<S, V = serde_json::Value> {
    commands: BTreeMap<String, ResolvedCommand<S, V>>,
    generate_command: Option<GenerateCommandFn<S>>,
    setup: Option<SetupFn<V>>,
    cleanup: Option<CleanupFn<S>>,
    model_initial_state: InitialStateFn<S, V>,
    real_initial_state: InitialStateFn<S, V>,
    postcondition: Option<StatePostconditionFn<S>>,
}

impl<S: ModelState, V: ModelValue> SystemSpec<S, V> {
    pub fn builder() -> SystemSpecBuilder<S, V> {
        SystemSpecBuilder::new()
    }

    /// Look up a command by name.
    ///
    /// An absent name is a bug in the system specification (usually in `generate_command`),
    /// never a reason to retry.
    pub fn command(&self, name: &str) -> Result<&ResolvedCommand<S, V>, SpecError> {
        self.commands
            .get(name)
            .ok_or_else(|| SpecError::UnknownCommand(name.to_string()))
    }

    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn has_setup(&self) -> bool {
        self.setup.is_some()
    }

    /// Strategy over command names for the given abstract state.
    ///
    /// The default picks uniformly among commands whose `requires` holds and
    /// returns `None` when no command is eligible.
    pub fn command_generator(&self, state: &S) -> Option<BoxedStrategy<String>> {
        if let Some(f) = &self.generate_command {
            return Some(f(state));
        }
        let eligible: Vec<String> = self
            .commands
            .values()
            .filter(|cmd| cmd.requires(state))
            .map(|cmd| cmd.name().to_string())
            .collect();
        if eligible.is_empty() {
            None
        } else {
            Some(select(eligible).boxed())
        }
    }

    /// Abstract initial state. Receives the symbolic setup handle when a
    /// `setup` hook exists.
    pub fn model_initial_state(&self) -> S {
        if self.has_setup() {
            let setup = Term::Symbolic(SymbolicValue::setup());
            (self.model_initial_state)(Some(&setup))
        } else {
            (self.model_initial_state)(None)
        }
    }

    /// Real initial state, given the concrete setup result if any.
    pub fn real_initial_state(&self, setup: Option<&V>) -> S {
        match setup {
            Some(value) => (self.real_initial_state)(Some(&Term::Value(value.clone()))),
            None => (self.real_initial_state)(None),
        }
    }

    pub fn run_setup(&self) -> Option<Result<V, CommandError>> {
        self.setup.as_ref().map(|f| f())
    }

    pub fn run_cleanup(&self, state: &S) {
        if let Some(f) = &self.cleanup {
            f(state);
        }
    }

    /// Spec-level whole-state invariant.
    pub fn postcondition(&self, state: &S) -> bool {
        self.postcondition.as_ref().map_or(true, |f| f(state))
    }
}

impl<S, V> fmt::Debug for SystemSpec<S, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemSpec")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .field("generate_command", &self.generate_command.is_some())
            .field("setup", &self.setup.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .field("postcondition", &self.postcondition.is_some())
            .finish()
    }
}

/// Builder collecting the optional slots of a [`SystemSpec`].
pub struct SystemSpecBuilder<S, V> {
    commands: Vec<(String, CommandSpec<S, V>)>,
    generate_command: Option<GenerateCommandFn<S>>,
    setup: Option<SetupFn<V>>,
    cleanup: Option<CleanupFn<S>>,
    initial_state: Option<InitialStateFn<S, V>>,
    model_initial_state: Option<InitialStateFn<S, V>>,
    real_initial_state: Option<InitialStateFn<S, V>>,
    postcondition: Option<StatePostconditionFn<S>>,
}

impl<S: ModelState, V: ModelValue> Default for SystemSpecBuilder<S, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ModelState, V: ModelValue> SystemSpecBuilder<S, V> {
    pub fn new() -> Self {
        SystemSpecBuilder {
            commands: Vec::new(),
            generate_command: None,
            setup: None,
            cleanup: None,
            initial_state: None,
            model_initial_state: None,
            real_initial_state: None,
            postcondition: None,
        }
    }

    pub fn command(mut self, name: impl Into<String>, spec: CommandSpec<S, V>) -> Self {
        self.commands.push((name.into(), spec));
        self
    }

    pub fn generate_command<F>(mut self, f: F) -> Self
    where
        F: Fn(&S) -> BoxedStrategy<String> + Send + Sync + 'static,
    {
        self.generate_command = Some(Arc::new(f));
        self
    }

    pub fn setup<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Result<V, CommandError> + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(f));
        self
    }

    pub fn cleanup<F>(mut self, f: F) -> Self
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        self.cleanup = Some(Arc::new(f));
        self
    }

    pub fn initial_state<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&Term<V>>) -> S + Send + Sync + 'static,
    {
        self.initial_state = Some(Arc::new(f));
        self
    }

    pub fn model_initial_state<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&Term<V>>) -> S + Send + Sync + 'static,
    {
        self.model_initial_state = Some(Arc::new(f));
        self
    }

    pub fn real_initial_state<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&Term<V>>) -> S + Send + Sync + 'static,
    {
        self.real_initial_state = Some(Arc::new(f));
        self
    }

    pub fn postcondition<F>(mut self, f: F) -> Self
    where
        F: Fn(&S) -> bool + Send + Sync + 'static,
    {
        self.postcondition = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Result<SystemSpec<S, V>, SpecError> {
        if self.commands.is_empty() {
            return Err(SpecError::NoCommands);
        }

        let mut commands = BTreeMap::new();
        for (name, spec) in self.commands {
            if commands.contains_key(&name) {
                return Err(SpecError::DuplicateCommand(name));
            }
            let resolved = spec.resolve(name.clone());
            commands.insert(name, resolved);
        }

        let default: InitialStateFn<S, V> = Arc::new(|_: Option<&Term<V>>| S::default());
        let generic = self.initial_state.unwrap_or(default);

        Ok(SystemSpec {
            commands,
            generate_command: self.generate_command,
            setup: self.setup,
            cleanup: self.cleanup,
            model_initial_state: self.model_initial_state.unwrap_or_else(|| generic.clone()),
            real_initial_state: self.real_initial_state.unwrap_or(generic),
            postcondition: self.postcondition,
        })
    }
}
