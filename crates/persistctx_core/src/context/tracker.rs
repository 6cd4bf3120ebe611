//! Change tracker: lifecycle state per tracked entity instance.
//!
//! # Responsibility
//! - Register instances with an initial state and look them up by handle.
//! - Resolve tracked instances by set and key for the identity map.
//! - Snapshot entries for the commit pipeline.
//!
//! # Invariants
//! - An instance appears at most once; identity is the handle allocation.
//! - No entry is ever stored in `Detached` state; detaching removes it.
//! - Entry order is registration order.
//! - Each entry remembers the key it had when it was registered or last
//!   saved; persisted rows are addressed by that key.

use crate::context::error::{ContextError, ContextResult};
use crate::model::audit::{stamp_timestamps, EpochMillis};
use crate::model::entity::{Entity, EntityKey, EntityRef, EntitySet};
use crate::store::row::Row;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

/// Lifecycle state of an entity instance relative to one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityState {
    Detached,
    Unchanged,
    Added,
    Modified,
    Deleted,
}

impl EntityState {
    /// Whether save validates and stamps entries in this state.
    pub fn is_dirty(self) -> bool {
        matches!(self, Self::Added | Self::Modified)
    }

    pub fn has_pending_write(self) -> bool {
        matches!(self, Self::Added | Self::Modified | Self::Deleted)
    }
}

/// Read-only view of one tracked entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub set: &'static str,
    pub key: EntityKey,
    pub state: EntityState,
}

/// Type-erased operations the pipeline needs from a tracked instance.
pub(crate) trait TrackedEntity {
    fn set(&self) -> EntitySet;
    fn key(&self) -> ContextResult<EntityKey>;
    fn validate(&self) -> ContextResult<()>;
    fn stamp_timestamps(&self, now: EpochMillis) -> ContextResult<bool>;
    fn to_row(&self) -> ContextResult<Row>;
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

impl<T: Entity> TrackedEntity for RefCell<T> {
    fn set(&self) -> EntitySet {
        T::SET
    }

    fn key(&self) -> ContextResult<EntityKey> {
        Ok(read::<T>(self)?.key())
    }

    fn validate(&self) -> ContextResult<()> {
        let entity = read::<T>(self)?;
        let Some(validatable) = entity.as_validatable() else {
            return Ok(());
        };
        validatable
            .validate()
            .map_err(|source| ContextError::Validation {
                set: T::SET.name,
                key: entity.key(),
                source,
            })
    }

    fn stamp_timestamps(&self, now: EpochMillis) -> ContextResult<bool> {
        let mut entity = write::<T>(self)?;
        Ok(stamp_timestamps(entity.as_auditable_mut(), now))
    }

    fn to_row(&self) -> ContextResult<Row> {
        Ok(read::<T>(self)?.to_row())
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

fn read<T: Entity>(cell: &RefCell<T>) -> ContextResult<std::cell::Ref<'_, T>> {
    cell.try_borrow()
        .map_err(|_| ContextError::EntityInUse { set: T::SET.name })
}

pub(crate) fn write<T: Entity>(cell: &RefCell<T>) -> ContextResult<std::cell::RefMut<'_, T>> {
    cell.try_borrow_mut()
        .map_err(|_| ContextError::EntityInUse { set: T::SET.name })
}

pub(crate) fn read_key<T: Entity>(item: &EntityRef<T>) -> ContextResult<EntityKey> {
    Ok(read::<T>(item.cell())?.key())
}

pub(crate) fn handle_addr<T: Entity>(item: &EntityRef<T>) -> *const () {
    Rc::as_ptr(item.cell()) as *const ()
}

struct Entry {
    entity: Rc<dyn TrackedEntity>,
    state: EntityState,
    original_key: EntityKey,
}

impl Entry {
    fn addr(&self) -> *const () {
        Rc::as_ptr(&self.entity) as *const ()
    }
}

/// Point-in-time copy of one entry used by save.
#[derive(Clone)]
pub(crate) struct SnapshotEntry {
    pub(crate) entity: Rc<dyn TrackedEntity>,
    pub(crate) state: EntityState,
    pub(crate) original_key: EntityKey,
}

/// Ordered registry of tracked entity instances.
#[derive(Default)]
pub struct ChangeTracker {
    entries: Vec<Entry>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any entry would produce a write on save.
    pub fn has_changes(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.state.has_pending_write())
    }

    /// Lists entries in tracking order.
    pub fn entries(&self) -> ContextResult<Vec<EntryInfo>> {
        self.entries
            .iter()
            .map(|entry| {
                Ok(EntryInfo {
                    set: entry.entity.set().name,
                    key: entry.entity.key()?,
                    state: entry.state,
                })
            })
            .collect()
    }

    pub(crate) fn position(&self, addr: *const ()) -> Option<usize> {
        self.entries.iter().position(|entry| entry.addr() == addr)
    }

    pub(crate) fn state_of(&self, addr: *const ()) -> EntityState {
        self.position(addr)
            .map_or(EntityState::Detached, |index| self.entries[index].state)
    }

    /// Tracks `item`; `key` is its current key, read by the caller.
    pub(crate) fn register<T: Entity>(
        &mut self,
        item: &EntityRef<T>,
        key: EntityKey,
        state: EntityState,
    ) {
        let entity: Rc<dyn TrackedEntity> = item.cell().clone();
        self.entries.push(Entry {
            entity,
            state,
            original_key: key,
        });
    }

    pub(crate) fn set_state_at(&mut self, index: usize, state: EntityState) {
        if state == EntityState::Detached {
            self.entries.remove(index);
        } else {
            self.entries[index].state = state;
        }
    }

    pub(crate) fn state_at(&self, index: usize) -> EntityState {
        self.entries[index].state
    }

    /// Finds the entry of `set` whose key equals `key`.
    pub(crate) fn find_by_key(
        &self,
        set: &EntitySet,
        key: &EntityKey,
    ) -> ContextResult<Option<usize>> {
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.entity.set().name != set.name {
                continue;
            }
            if entry.entity.key()? == *key {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Returns the typed handle for the entry at `index`.
    pub(crate) fn handle_at<T: Entity>(&self, index: usize) -> ContextResult<EntityRef<T>> {
        let entity = Rc::clone(&self.entries[index].entity);
        let key = entity.key()?;
        entity
            .into_any()
            .downcast::<RefCell<T>>()
            .map(EntityRef::from_cell)
            .map_err(|_| ContextError::IdentityConflict {
                set: T::SET.name,
                key,
            })
    }

    pub(crate) fn snapshot(&self) -> Vec<SnapshotEntry> {
        self.entries
            .iter()
            .map(|entry| SnapshotEntry {
                entity: Rc::clone(&entry.entity),
                state: entry.state,
                original_key: entry.original_key.clone(),
            })
            .collect()
    }

    /// Marks written entries as persisted after a successful save.
    ///
    /// `written_keys` is aligned with the snapshot the save was built from;
    /// `Some(key)` becomes the entry's persisted key. Added/Modified entries
    /// become Unchanged; Deleted entries leave the tracker.
    pub(crate) fn accept_changes(&mut self, written_keys: Vec<Option<EntityKey>>) {
        let mut written_keys = written_keys.into_iter();
        self.entries.retain_mut(|entry| {
            let written = written_keys.next().flatten();
            if entry.state == EntityState::Deleted {
                return false;
            }
            if let Some(key) = written {
                entry.original_key = key;
            }
            entry.state = EntityState::Unchanged;
            true
        });
    }
}
