//! Command specifications
//!
//! A [`CommandSpec`] carries the two halves of one operation: the modeling
//! half (`requires`, `args`, `precondition`, model next-state), used only
//! during generation, and the real half (`command`, real next-state,
//! `postcondition`), used only during execution.
//!
//! Optional slots are plain `Option` fields. [`CommandSpec::resolve`] applies
//! the next-state fallback chain once, producing a [`ResolvedCommand`] whose
//! callers never have to look at the `Option`s again.

use super::{ModelState, ModelValue};
use crate::error::CommandError;
use crate::symbolic::Term;
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use std::fmt;
use std::sync::Arc;

pub type RequiresFn<S> = Arc<dyn Fn(&S) -> bool + Send + Sync>;
pub type ArgsFn<S, V> = Arc<dyn Fn(&S) -> BoxedStrategy<Vec<Term<V>>> + Send + Sync>;
pub type PreconditionFn<S, V> = Arc<dyn Fn(&S, &[Term<V>]) -> bool + Send + Sync>;
pub type CommandFn<V> = Arc<dyn Fn(&[V]) -> Result<V, CommandError> + Send + Sync>;
pub type NextStateFn<S, V> = Arc<dyn Fn(&S, &[Term<V>], &Term<V>) -> S + Send + Sync>;
pub type PostconditionFn<S, V> = Arc<dyn Fn(&S, &S, &[V], &V) -> bool + Send + Sync>;

/// Declarative description of one operation.
pub struct CommandSpec<S, V> {
    requires: Option<RequiresFn<S>>,
    args: Option<ArgsFn<S, V>>,
    precondition: Option<PreconditionFn<S, V>>,
    command: CommandFn<V>,
    model_next_state: Option<NextStateFn<S, V>>,
    real_next_state: Option<NextStateFn<S, V>>,
    next_state: Option<NextStateFn<S, V>>,
    postcondition: Option<PostconditionFn<S, V>>,
}

impl<S: ModelState, V: ModelValue> CommandSpec<S, V> {
    pub fn new<F>(command: F) -> Self
    where
        F: Fn(&[V]) -> Result<V, CommandError> + Send + Sync + 'static,
    {
        CommandSpec {
            requires: None,
            args: None,
            precondition: None,
            command: Arc::new(command),
            model_next_state: None,
            real_next_state: None,
            next_state: None,
            postcondition: None,
        }
    }

    pub fn requires<F>(mut self, f: F) -> Self
    where
        F: Fn(&S) -> bool + Send + Sync + 'static,
    {
        self.requires = Some(Arc::new(f));
        self
    }

    pub fn args<F>(mut self, f: F) -> Self
    where
        F: Fn(&S) -> BoxedStrategy<Vec<Term<V>>> + Send + Sync + 'static,
    {
        self.args = Some(Arc::new(f));
        self
    }

    pub fn precondition<F>(mut self, f: F) -> Self
    where
        F: Fn(&S, &[Term<V>]) -> bool + Send + Sync + 'static,
    {
        self.precondition = Some(Arc::new(f));
        self
    }

    /// Next-state function shared by both phases unless overridden.
    pub fn next_state<F>(mut self, f: F) -> Self
    where
        F: Fn(&S, &[Term<V>], &Term<V>) -> S + Send + Sync + 'static,
    {
        self.next_state = Some(Arc::new(f));
        self
    }

    pub fn model_next_state<F>(mut self, f: F) -> Self
    where
        F: Fn(&S, &[Term<V>], &Term<V>) -> S + Send + Sync + 'static,
    {
        self.model_next_state = Some(Arc::new(f));
        self
    }

    pub fn real_next_state<F>(mut self, f: F) -> Self
    where
        F: Fn(&S, &[Term<V>], &Term<V>) -> S + Send + Sync + 'static,
    {
        self.real_next_state = Some(Arc::new(f));
        self
    }

    pub fn postcondition<F>(mut self, f: F) -> Self
    where
        F: Fn(&S, &S, &[V], &V) -> bool + Send + Sync + 'static,
    {
        self.postcondition = Some(Arc::new(f));
        self
    }

    /// Apply the `model/real` → generic → identity fallback.
    pub(crate) fn resolve(self, name: String) -> ResolvedCommand<S, V> {
        let identity: NextStateFn<S, V> = Arc::new(|state: &S, _: &[Term<V>], _: &Term<V>| state.clone());
        let generic = self.next_state.unwrap_or(identity);
        ResolvedCommand {
            name,
            requires: self.requires,
            args: self.args,
            precondition: self.precondition,
            command: self.command,
            model_next_state: self.model_next_state.unwrap_or_else(|| generic.clone()),
            real_next_state: self.real_next_state.unwrap_or(generic),
            postcondition: self.postcondition,
        }
    }
}

/// A command with its fallbacks already applied.
pub struct ResolvedCommand<S, V> {
    name: String,
    requires: Option<RequiresFn<S>>,
    args: Option<ArgsFn<S, V>>,
    precondition: Option<PreconditionFn<S, V>>,
    command: CommandFn<V>,
    model_next_state: NextStateFn<S, V>,
    real_next_state: NextStateFn<S, V>,
    postcondition: Option<PostconditionFn<S, V>>,
}

impl<S: ModelState, V: ModelValue> ResolvedCommand<S, V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requires(&self, state: &S) -> bool {
        self.requires.as_ref().map_or(true, |f| f(state))
    }

    pub fn args(&self, state: &S) -> BoxedStrategy<Vec<Term<V>>> {
        match &self.args {
            Some(f) => f(state),
            None => Just(Vec::new()).boxed(),
        }
    }

    pub fn precondition(&self, state: &S, args: &[Term<V>]) -> bool {
        self.precondition.as_ref().map_or(true, |f| f(state, args))
    }

    /// The side-effecting call. Never invoked during generation.
    pub fn run(&self, args: &[V]) -> Result<V, CommandError> {
        (self.command)(args)
    }

    pub fn model_next_state(&self, state: &S, args: &[Term<V>], result: &Term<V>) -> S {
        (self.model_next_state)(state, args, result)
    }

    pub fn real_next_state(&self, state: &S, args: &[Term<V>], result: &Term<V>) -> S {
        (self.real_next_state)(state, args, result)
    }

    pub fn postcondition(&self, prev: &S, next: &S, args: &[V], result: &V) -> bool {
        self.postcondition
            .as_ref()
            .map_or(true, |f| f(prev, next, args, result))
    }
}

impl<S, V> fmt::Debug for ResolvedCommand<S, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCommand")
            .field("name", &self.name)
            .field("requires", &self.requires.is_some())
            .field("args", &self.args.is_some())
            .field("precondition", &self.precondition.is_some())
            .field("postcondition", &self.postcondition.is_some())
            .finish()
    }
}
