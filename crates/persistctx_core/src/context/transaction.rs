//! Transaction scope with "required" semantics.
//!
//! # Responsibility
//! - Join an open transaction or begin a new one for each save.
//! - Commit owned scopes only when marked complete; roll back otherwise.
//! - Doom the ambient scope when a joined save fails.
//!
//! # Invariants
//! - A scope that is never completed never commits.
//! - Only the scope that began a transaction ends it.

use crate::command::{CommandExecutor, CommitReceipt};
use crate::store::{Store, StoreResult};
use log::{debug, warn};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    /// This scope began the transaction and ends it.
    Owned,
    /// Joined the context's ambient scope.
    Ambient,
    /// Joined a transaction opened on the store outside the context.
    External,
}

/// State of an explicit `with_transaction` scope.
#[derive(Default)]
pub(crate) struct AmbientScope {
    pub(crate) doomed: bool,
    pub(crate) pending: Vec<(Rc<dyn CommandExecutor>, CommitReceipt)>,
}

impl AmbientScope {
    pub(crate) fn deliver(self) {
        for (executor, receipt) in self.pending {
            executor.on_committed(&receipt);
        }
    }
}

pub(crate) struct TransactionScope {
    kind: ScopeKind,
    completed: bool,
}

impl TransactionScope {
    pub(crate) fn enter<S: Store + ?Sized>(
        store: &mut S,
        ambient: Option<&AmbientScope>,
    ) -> StoreResult<Self> {
        let kind = if ambient.is_some() {
            ScopeKind::Ambient
        } else if store.in_transaction() {
            ScopeKind::External
        } else {
            store.begin()?;
            ScopeKind::Owned
        };
        debug!("event=tx_scope module=context status=enter kind={kind:?}");
        Ok(Self {
            kind,
            completed: false,
        })
    }

    pub(crate) fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub(crate) fn complete(&mut self) {
        self.completed = true;
    }

    /// Ends the scope: commit if owned and complete, otherwise roll back or doom.
    pub(crate) fn exit<S: Store + ?Sized>(
        self,
        store: &mut S,
        ambient: Option<&mut AmbientScope>,
    ) -> StoreResult<()> {
        match (self.kind, self.completed) {
            (ScopeKind::Owned, true) => {
                if let Err(err) = store.commit() {
                    rollback_quietly(store);
                    return Err(err);
                }
                debug!("event=tx_scope module=context status=commit");
            }
            (ScopeKind::Owned, false) => {
                rollback_quietly(store);
                debug!("event=tx_scope module=context status=rollback");
            }
            (ScopeKind::Ambient, false) => {
                if let Some(ambient) = ambient {
                    ambient.doomed = true;
                }
                debug!("event=tx_scope module=context status=doomed");
            }
            (ScopeKind::Ambient, true) | (ScopeKind::External, _) => {}
        }
        Ok(())
    }
}

/// Rolls back after a failure whose error is already being returned.
pub(crate) fn rollback_quietly<S: Store + ?Sized>(store: &mut S) {
    if let Err(err) = store.rollback() {
        warn!("event=tx_scope module=context status=rollback_failed error={err}");
    }
}
