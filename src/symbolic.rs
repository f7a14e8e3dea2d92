//! Symbolic Values
//!
//! During generation the result of a command does not exist yet. Each
//! generated step is given a [`SymbolicValue`]: an index into an append-only
//! results table plus an immutable projection path. Later steps may pass the
//! handle (or a projection of it) as an argument, and the model state may
//! store it.
//!
//! During execution [`Bindings`] records each concrete result under its
//! handle, and [`Bindings::resolve`] substitutes concrete values for handles.
//!
//! ```text
//! #<0> = (new)           => Queue
//! #<1> = (push #<0> 7)   => 1
//! #<2> = (pop #<0>)      => 7
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Root of a symbolic value: the setup result or the result of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HandleId {
    Setup,
    Step(u64),
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleId::Setup => write!(f, "#<setup>"),
            HandleId::Step(index) => write!(f, "#<{}>", index),
        }
    }
}

/// One accessor in a projection path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Field(String),
    Index(usize),
}

impl From<&str> for Key {
    fn from(field: &str) -> Self {
        Key::Field(field.to_string())
    }
}

impl From<String> for Key {
    fn from(field: String) -> Self {
        Key::Field(field)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

/// Opaque handle to a not-yet-known result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolicValue {
    root: HandleId,
    path: Vec<Key>,
}

impl SymbolicValue {
    pub fn new(index: u64) -> Self {
        SymbolicValue {
            root: HandleId::Step(index),
            path: Vec::new(),
        }
    }

    /// The reserved handle standing for the result of `setup`.
    pub fn setup() -> Self {
        SymbolicValue {
            root: HandleId::Setup,
            path: Vec::new(),
        }
    }

    /// Compose a projection. Nothing is evaluated until resolution.
    pub fn project(&self, key: impl Into<Key>) -> Self {
        let mut path = self.path.clone();
        path.push(key.into());
        SymbolicValue {
            root: self.root,
            path,
        }
    }

    pub fn root(&self) -> HandleId {
        self.root
    }

    pub fn path(&self) -> &[Key] {
        &self.path
    }

    /// Step index of the root, `None` for the setup handle.
    pub fn index(&self) -> Option<u64> {
        match self.root {
            HandleId::Step(index) => Some(index),
            HandleId::Setup => None,
        }
    }
}

impl fmt::Display for SymbolicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for key in &self.path {
            match key {
                Key::Field(name) => write!(f, ".{}", name)?,
                Key::Index(i) => write!(f, "[{}]", i)?,
            }
        }
        Ok(())
    }
}

/// A value that may still be symbolic.
///
/// Abstract states and generated arguments hold `Symbolic` terms; the real
/// phase only ever hands out `Value` terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term<V> {
    Value(V),
    Symbolic(SymbolicValue),
}

impl<V> Term<V> {
    pub fn as_symbolic(&self) -> Option<&SymbolicValue> {
        match self {
            Term::Symbolic(sym) => Some(sym),
            Term::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&V> {
        match self {
            Term::Value(v) => Some(v),
            Term::Symbolic(_) => None,
        }
    }

    /// Whether this term depends on the given root handle.
    pub fn references(&self, root: HandleId) -> bool {
        matches!(self, Term::Symbolic(sym) if sym.root == root)
    }
}

impl<V> From<SymbolicValue> for Term<V> {
    fn from(sym: SymbolicValue) -> Self {
        Term::Symbolic(sym)
    }
}

impl<V: fmt::Display> fmt::Display for Term<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Value(v) => write!(f, "{}", v),
            Term::Symbolic(sym) => write!(f, "{}", sym),
        }
    }
}

/// Key projection on concrete values.
pub trait Project: Sized {
    fn project(&self, key: &Key) -> Option<Self>;
}

impl Project for serde_json::Value {
    fn project(&self, key: &Key) -> Option<Self> {
        match key {
            Key::Field(name) => self.get(name.as_str()).cloned(),
            Key::Index(i) => self.get(*i).cloned(),
        }
    }
}

/// Symbolic resolution failures. These are internal invariant violations:
/// correct generation never produces a sequence that triggers one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("symbolic value {0} resolved before it was bound")]
    Unbound(HandleId),

    #[error("symbolic value {0} bound twice")]
    AlreadyBound(HandleId),

    #[error("projection {key:?} not found while resolving {handle}")]
    Projection { handle: String, key: Key },
}

/// Append-only table of concrete results, keyed by handle root.
#[derive(Debug, Clone)]
pub struct Bindings<V> {
    values: HashMap<HandleId, V>,
}

impl<V> Default for Bindings<V> {
    fn default() -> Self {
        Bindings {
            values: HashMap::new(),
        }
    }
}

impl<V: Clone + Project> Bindings<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, root: HandleId, value: V) -> Result<(), ResolveError> {
        if self.values.contains_key(&root) {
            return Err(ResolveError::AlreadyBound(root));
        }
        self.values.insert(root, value);
        Ok(())
    }

    pub fn is_bound(&self, root: HandleId) -> bool {
        self.values.contains_key(&root)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Substitute a concrete value for a term.
    pub fn resolve(&self, term: &Term<V>) -> Result<V, ResolveError> {
        match term {
            Term::Value(v) => Ok(v.clone()),
            Term::Symbolic(sym) => self.resolve_symbolic(sym),
        }
    }

    pub fn resolve_symbolic(&self, sym: &SymbolicValue) -> Result<V, ResolveError> {
        let mut current = self
            .values
            .get(&sym.root)
            .cloned()
            .ok_or(ResolveError::Unbound(sym.root))?;
        for key in &sym.path {
            current = current
                .project(key)
                .ok_or_else(|| ResolveError::Projection {
                    handle: sym.to_string(),
                    key: key.clone(),
                })?;
        }
        Ok(current)
    }

    pub fn resolve_all(&self, terms: &[Term<V>]) -> Result<Vec<V>, ResolveError> {
        terms.iter().map(|t| self.resolve(t)).collect()
    }
}
