//! Command executor seam for commit-time side effects.
//!
//! # Responsibility
//! - Let applications observe committed change sets (domain events, cache
//!   invalidation) without the context owning those side effects.
//!
//! # Invariants
//! - The resolver is consulted exactly once per `save()` call.
//! - Receipts are delivered only after the owning transaction commits.

use crate::context::tracker::EntryInfo;
use std::rc::Rc;

/// Summary of one committed save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReceipt {
    pub affected: usize,
    pub inserted: Vec<EntryInfo>,
    pub updated: Vec<EntryInfo>,
    pub deleted: Vec<EntryInfo>,
}

impl CommitReceipt {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Executor for cross-cutting work triggered by a commit.
pub trait CommandExecutor {
    fn on_committed(&self, _receipt: &CommitReceipt) {}
}

/// Supplies the executor used by one save.
pub trait CommandExecutorResolver {
    fn resolve(&self) -> Rc<dyn CommandExecutor>;
}

/// Executor that ignores every receipt.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCommandExecutor;

impl CommandExecutor for NoopCommandExecutor {}

impl CommandExecutorResolver for NoopCommandExecutor {
    fn resolve(&self) -> Rc<dyn CommandExecutor> {
        Rc::new(NoopCommandExecutor)
    }
}

impl<F: Fn() -> Rc<dyn CommandExecutor>> CommandExecutorResolver for F {
    fn resolve(&self) -> Rc<dyn CommandExecutor> {
        self()
    }
}
