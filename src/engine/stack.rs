//! The undoable command stack.
//!
//! The engine is written against the [`CommandStack`] trait so hosts can
//! supply their own stack; [`InMemoryCommandStack`] is the reference
//! implementation with bounded undo/redo history. One executed transaction
//! pairs with exactly one undo entry. A failure mid-transaction rolls the
//! applied prefix back before the error is surfaced.

use anyhow::{Context, Result};

use super::subcommand::Transaction;
use crate::model::Model;

/// Host-provided executor of sub-command transactions.
///
/// The stack promises exactly-once apply of each sub-command and pairs each
/// transaction with a single undo entry.
pub trait CommandStack {
    fn execute(&mut self, model: &mut Model, transaction: Transaction) -> Result<()>;
}

/// In-process command stack with bounded undo/redo history.
pub struct InMemoryCommandStack {
    undo: Vec<Transaction>,
    redo: Vec<Transaction>,
    max_depth: usize,
}

/// Default number of undo entries retained.
pub const DEFAULT_UNDO_DEPTH: usize = 50;

impl InMemoryCommandStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            max_depth,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Labels of the undo entries, oldest first.
    pub fn undo_labels(&self) -> Vec<&str> {
        self.undo.iter().map(|t| t.label.as_str()).collect()
    }

    /// Revert the most recent transaction. Returns false when the history
    /// is empty. A revert failure is fatal and not recovered.
    pub fn undo(&mut self, model: &mut Model) -> Result<bool> {
        let Some(mut transaction) = self.undo.pop() else {
            return Ok(false);
        };
        for cmd in transaction.commands.iter_mut().rev() {
            cmd.revert(model)
                .with_context(|| format!("undo of '{}' failed", transaction.label))?;
        }
        self.redo.push(transaction);
        Ok(true)
    }

    /// Re-apply the most recently undone transaction.
    pub fn redo(&mut self, model: &mut Model) -> Result<bool> {
        let Some(mut transaction) = self.redo.pop() else {
            return Ok(false);
        };
        for cmd in transaction.commands.iter_mut() {
            cmd.apply(model)
                .with_context(|| format!("redo of '{}' failed", transaction.label))?;
        }
        self.undo.push(transaction);
        Ok(true)
    }
}

impl Default for InMemoryCommandStack {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_DEPTH)
    }
}

impl CommandStack for InMemoryCommandStack {
    fn execute(&mut self, model: &mut Model, mut transaction: Transaction) -> Result<()> {
        let mut applied = 0usize;
        for (i, cmd) in transaction.commands.iter_mut().enumerate() {
            match cmd.apply(model) {
                Ok(()) => applied = i + 1,
                Err(e) => {
                    // Roll the applied prefix back before surfacing the error.
                    for done in transaction.commands[..applied].iter_mut().rev() {
                        done.revert(model).with_context(|| {
                            format!("rollback of '{}' failed after apply error", transaction.label)
                        })?;
                    }
                    return Err(e.context(format!(
                        "transaction '{}' failed at sub-command {i}",
                        transaction.label
                    )));
                }
            }
        }
        if self.undo.len() >= self.max_depth {
            self.undo.remove(0);
        }
        self.undo.push(transaction);
        // A new transaction starts a new branch of history.
        self.redo.clear();
        Ok(())
    }
}
