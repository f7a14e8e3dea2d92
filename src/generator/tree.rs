//! Shrink tree for command sequences
//!
//! Shrinking runs in two phases:
//!
//! 1. **Step removal.** Remove one step, plus every later step whose
//!    arguments (transitively) read a removed handle. Passes repeat until a
//!    whole pass removes nothing.
//! 2. **Argument shrinking.** Walk the surviving steps and simplify each
//!    step's argument tree in turn.
//!
//! Handles keep their original indices: a shrunk sequence may read
//! `#<0>, #<3>, #<7>`. Every candidate goes through [`verifier::verify`]
//! before it becomes `current()`, so the runner only ever sees sequences the
//! model itself could have generated.
//!
//! `complicate()` always restores the last accepted (failing) candidate, so
//! `current()` is a known failure whenever shrinking stops.

use super::GeneratedStep;
use crate::invocation::CommandInvocation;
use crate::spec::{ModelState, ModelValue, SystemSpec};
use crate::symbolic::{HandleId, Term};
use crate::verifier;
use proptest::strategy::ValueTree;
use std::fmt;
use std::mem;
use std::sync::Arc;
use tracing::trace;

/// Bound on rejected argument candidates per shrink step.
const MAX_ARG_SHRINK_ATTEMPTS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    RemoveStep(usize),
    ShrinkArgs(usize),
    Done,
}

enum LastShrink<V> {
    Removed(Vec<usize>),
    Args { index: usize, previous: Vec<Term<V>> },
}

pub struct CommandSequenceTree<S, V> {
    spec: Arc<SystemSpec<S, V>>,
    steps: Vec<GeneratedStep<V>>,
    included: Vec<bool>,
    phase: Phase,
    /// Removals accepted in the current pass and not undone.
    removed_this_pass: usize,
    last: Option<LastShrink<V>>,
}

impl<S: ModelState, V: ModelValue> CommandSequenceTree<S, V> {
    pub(crate) fn new(spec: Arc<SystemSpec<S, V>>, steps: Vec<GeneratedStep<V>>) -> Self {
        let included = vec![true; steps.len()];
        CommandSequenceTree {
            spec,
            steps,
            included,
            phase: Phase::RemoveStep(0),
            removed_this_pass: 0,
            last: None,
        }
    }

    /// Number of steps in the current candidate.
    pub fn len(&self) -> usize {
        self.included.iter().filter(|i| **i).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_valid(&self) -> bool {
        verifier::is_valid(&self.spec, &self.current())
    }

    /// `start` plus every later included step that depends on a removed handle.
    fn removal_set(&self, start: usize) -> Vec<usize> {
        let mut removed_roots: Vec<HandleId> = vec![self.steps[start].handle.root()];
        let mut set = vec![start];
        for j in (start + 1)..self.steps.len() {
            if !self.included[j] {
                continue;
            }
            let depends = self.steps[j]
                .args
                .iter()
                .any(|arg| removed_roots.iter().any(|root| arg.references(*root)));
            if depends {
                removed_roots.push(self.steps[j].handle.root());
                set.push(j);
            }
        }
        set
    }

    fn set_included(&mut self, set: &[usize], value: bool) {
        for &j in set {
            self.included[j] = value;
        }
    }

    fn try_remove(&mut self, i: usize) -> bool {
        let set = self.removal_set(i);
        self.set_included(&set, false);
        if self.is_valid() {
            trace!(step = i, removed = set.len(), "shrink: removed steps");
            self.removed_this_pass += 1;
            self.last = Some(LastShrink::Removed(set));
            true
        } else {
            self.set_included(&set, true);
            false
        }
    }

    /// Simplify the argument tree of step `i` until the verifier accepts a
    /// candidate or the tree is exhausted. A rejected candidate first moves
    /// the tree back up; only when that is exhausted does it move down again.
    fn try_shrink_args(&mut self, i: usize) -> bool {
        let mut moved = self.steps[i].args_tree.simplify();
        let mut attempts = 0;
        while moved && attempts < MAX_ARG_SHRINK_ATTEMPTS {
            let candidate = self.steps[i].args_tree.current();
            let previous = mem::replace(&mut self.steps[i].args, candidate);
            if self.is_valid() {
                trace!(step = i, "shrink: simplified arguments");
                self.last = Some(LastShrink::Args { index: i, previous });
                return true;
            }
            self.steps[i].args = previous;
            moved = self.steps[i].args_tree.complicate() || self.steps[i].args_tree.simplify();
            attempts += 1;
        }
        false
    }
}

impl<S: ModelState, V: ModelValue> ValueTree for CommandSequenceTree<S, V> {
    type Value = Vec<CommandInvocation<V>>;

    fn current(&self) -> Self::Value {
        self.steps
            .iter()
            .zip(&self.included)
            .filter(|(_, included)| **included)
            .map(|(step, _)| step.invocation())
            .collect()
    }

    fn simplify(&mut self) -> bool {
        loop {
            match self.phase {
                Phase::RemoveStep(i) if i >= self.steps.len() => {
                    if self.removed_this_pass > 0 {
                        self.removed_this_pass = 0;
                        self.phase = Phase::RemoveStep(0);
                    } else {
                        self.phase = Phase::ShrinkArgs(0);
                    }
                }
                Phase::RemoveStep(i) => {
                    self.phase = Phase::RemoveStep(i + 1);
                    if self.included[i] && self.try_remove(i) {
                        return true;
                    }
                }
                Phase::ShrinkArgs(i) if i >= self.steps.len() => {
                    self.phase = Phase::Done;
                }
                Phase::ShrinkArgs(i) => {
                    if self.included[i] && self.try_shrink_args(i) {
                        return true;
                    }
                    self.phase = Phase::ShrinkArgs(i + 1);
                }
                Phase::Done => return false,
            }
        }
    }

    fn complicate(&mut self) -> bool {
        match self.last.take() {
            None => false,
            Some(LastShrink::Removed(set)) => {
                self.set_included(&set, true);
                self.removed_this_pass = self.removed_this_pass.saturating_sub(1);
                true
            }
            Some(LastShrink::Args { index, previous }) => {
                self.steps[index].args = previous;
                self.steps[index].args_tree.complicate();
                true
            }
        }
    }
}

impl<S, V: fmt::Debug> fmt::Debug for CommandSequenceTree<S, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSequenceTree")
            .field("steps", &self.steps.len())
            .field("included", &self.included)
            .field("phase", &self.phase)
            .finish()
    }
}
