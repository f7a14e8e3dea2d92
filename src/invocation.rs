//! Generated steps

use crate::symbolic::{SymbolicValue, Term};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One generated step: `handle = (command args...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandInvocation<V> {
    pub handle: SymbolicValue,
    pub command: String,
    pub args: Vec<Term<V>>,
}

impl<V> CommandInvocation<V> {
    pub fn new(handle: SymbolicValue, command: impl Into<String>, args: Vec<Term<V>>) -> Self {
        CommandInvocation {
            handle,
            command: command.into(),
            args,
        }
    }

    /// Symbolic handles this step reads.
    pub fn references(&self) -> impl Iterator<Item = &SymbolicValue> {
        self.args.iter().filter_map(Term::as_symbolic)
    }
}

impl<V: fmt::Display> fmt::Display for CommandInvocation<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.command)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_display() {
        let inv: CommandInvocation<Value> = CommandInvocation::new(
            SymbolicValue::new(2),
            "push",
            vec![SymbolicValue::new(0).into(), Term::Value(json!(5))],
        );
        assert_eq!(inv.to_string(), "(push #<0> 5)");
        assert_eq!(inv.references().count(), 1);
    }
}
