//! Persistence context: typed facade over a store session.
//!
//! # Responsibility
//! - Register entities as Added/Modified/Deleted and resolve them by key.
//! - Run the commit pipeline: snapshot, validate and stamp dirty entries,
//!   write inside a transaction scope, then settle tracker state.
//!
//! # Invariants
//! - Validation of every dirty entry finishes before any write starts.
//! - Persisted rows are written under the key they were tracked with; a
//!   changed key fails the save before any write.
//! - A failed save leaves tracker states untouched and commits nothing.
//! - In-memory stamps made by a failed save are not reverted.
//! - One context serves one unit of work on one thread.

pub mod error;
mod factory;
pub mod tracker;
mod transaction;

use crate::clock::{Clock, SystemClock};
use crate::command::{CommandExecutorResolver, CommitReceipt, NoopCommandExecutor};
use crate::model::audit::stamp_actor;
use crate::model::entity::{Entity, EntityKey, EntityRef};
use crate::store::row::{Row, Value};
use crate::store::{PendingWrite, Store, StoreError, WriteKind};
use factory::EntityFactories;
use log::{debug, info};
use std::time::Instant;
use tracker::{handle_addr, ChangeTracker, EntityState, EntryInfo};
use transaction::{rollback_quietly, AmbientScope, ScopeKind, TransactionScope};

pub use error::{ContextError, ContextResult};

/// How often the clock is read while stamping one save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimestampMode {
    /// One reading per stamped entity.
    #[default]
    PerEntity,
    /// One reading shared by every entity in the save.
    PerSave,
}

/// Tunables for a persistence context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextOptions {
    pub timestamp_mode: TimestampMode,
}

/// Builder wiring collaborators into a `PersistenceContext`.
pub struct ContextBuilder<S: Store> {
    store: S,
    clock: Box<dyn Clock>,
    executors: Box<dyn CommandExecutorResolver>,
    factories: EntityFactories,
    options: ContextOptions,
}

impl<S: Store> ContextBuilder<S> {
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn command_executor(mut self, resolver: impl CommandExecutorResolver + 'static) -> Self {
        self.executors = Box::new(resolver);
        self
    }

    pub fn options(mut self, options: ContextOptions) -> Self {
        self.options = options;
        self
    }

    /// Registers `T::default` as the factory for `create_entity::<T>()`.
    pub fn register_default<T: Entity + Default>(mut self) -> Self {
        self.factories.register::<T>(T::default);
        self
    }

    pub fn register_factory<T: Entity>(mut self, factory: impl Fn() -> T + 'static) -> Self {
        self.factories.register::<T>(factory);
        self
    }

    pub fn build(self) -> PersistenceContext<S> {
        PersistenceContext {
            store: self.store,
            tracker: ChangeTracker::new(),
            clock: self.clock,
            executors: self.executors,
            factories: self.factories,
            options: self.options,
            ambient: None,
        }
    }
}

/// Unit-of-work over a `Store`.
pub struct PersistenceContext<S: Store> {
    store: S,
    tracker: ChangeTracker,
    clock: Box<dyn Clock>,
    executors: Box<dyn CommandExecutorResolver>,
    factories: EntityFactories,
    options: ContextOptions,
    ambient: Option<AmbientScope>,
}

impl<S: Store> PersistenceContext<S> {
    /// Creates a context with the system clock and no command executor.
    pub fn new(store: S) -> Self {
        Self::builder(store).build()
    }

    pub fn builder(store: S) -> ContextBuilder<S> {
        ContextBuilder {
            store,
            clock: Box::new(SystemClock),
            executors: Box::new(NoopCommandExecutor),
            factories: EntityFactories::default(),
            options: ContextOptions::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Ends the unit of work and hands the store back; pending changes are dropped.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Returns a fresh, untracked instance from the registered factory.
    ///
    /// # Errors
    /// - `Instantiation` when no factory is registered for `T`.
    pub fn create_entity<T: Entity>(&self) -> ContextResult<EntityRef<T>> {
        self.factories
            .create::<T>()
            .map(EntityRef::new)
            .ok_or(ContextError::Instantiation {
                type_name: std::any::type_name::<T>(),
            })
    }

    /// Stamps actor fields on `item` and tracks it as Added when detached.
    ///
    /// An absent item is returned as-is with no side effects. An item that
    /// is already tracked keeps its state.
    pub fn add<T: Entity>(
        &mut self,
        item: Option<EntityRef<T>>,
        actor: Option<&str>,
    ) -> ContextResult<Option<EntityRef<T>>> {
        let Some(item) = item else {
            return Ok(None);
        };

        stamp_actor_on(&item, actor)?;
        if self.tracker.position(handle_addr(&item)).is_none() {
            let key = tracker::read_key(&item)?;
            self.tracker.register(&item, key, EntityState::Added);
        }
        Ok(Some(item))
    }

    /// Attaches `item`, stamps actor fields and forces it to Modified.
    ///
    /// An absent item yields `None` with no side effects.
    ///
    /// # Errors
    /// - `IdentityConflict` when a different tracked instance has the same key.
    pub fn update<T: Entity>(
        &mut self,
        item: Option<EntityRef<T>>,
        actor: Option<&str>,
    ) -> ContextResult<Option<EntityRef<T>>> {
        let Some(item) = item else {
            return Ok(None);
        };

        let index = self.attach(&item, EntityState::Unchanged)?;
        stamp_actor_on(&item, actor)?;
        self.tracker.set_state_at(index, EntityState::Modified);
        Ok(Some(item))
    }

    /// Resolves an entity by key components in key-column order.
    ///
    /// Tracked instances win over the store; a tracked instance marked
    /// Deleted resolves to `None`. Loaded instances are tracked Unchanged.
    ///
    /// # Errors
    /// - `InvalidKey` when `keys.len()` differs from the set's key arity;
    ///   the store is not consulted.
    pub fn get<T: Entity>(&mut self, keys: &[Value]) -> ContextResult<Option<EntityRef<T>>> {
        let expected = T::SET.key_arity();
        if keys.len() != expected {
            return Err(ContextError::InvalidKey {
                set: T::SET.name,
                expected,
                actual: keys.len(),
            });
        }

        let key = EntityKey::from(keys);
        if let Some(index) = self.tracker.find_by_key(&T::SET, &key)? {
            if self.tracker.state_at(index) == EntityState::Deleted {
                return Ok(None);
            }
            return self.tracker.handle_at::<T>(index).map(Some);
        }

        let Some(row) = self.store.find(&T::SET, &key)? else {
            return Ok(None);
        };
        let entity = T::from_row(&row).map_err(|source| StoreError::Mapping {
            set: T::SET.name,
            source,
        })?;
        let loaded_key = entity.key();
        let item = EntityRef::new(entity);
        self.tracker.register(&item, loaded_key, EntityState::Unchanged);
        Ok(Some(item))
    }

    /// Schedules `item` for deletion.
    ///
    /// Added instances are discarded instead; detached instances are
    /// attached as Deleted.
    pub fn remove<T: Entity>(&mut self, item: &EntityRef<T>) -> ContextResult<()> {
        let index = self.attach(item, EntityState::Deleted)?;
        let next = match self.tracker.state_at(index) {
            EntityState::Added => EntityState::Detached,
            _ => EntityState::Deleted,
        };
        self.tracker.set_state_at(index, next);
        Ok(())
    }

    /// Stops tracking `item`; returns whether it was tracked.
    pub fn detach<T: Entity>(&mut self, item: &EntityRef<T>) -> bool {
        match self.tracker.position(handle_addr(item)) {
            Some(index) => {
                self.tracker.set_state_at(index, EntityState::Detached);
                true
            }
            None => false,
        }
    }

    pub fn state_of<T: Entity>(&self, item: &EntityRef<T>) -> EntityState {
        self.tracker.state_of(handle_addr(item))
    }

    /// Forces the lifecycle state of `item`, attaching it when needed.
    pub fn set_state<T: Entity>(
        &mut self,
        item: &EntityRef<T>,
        state: EntityState,
    ) -> ContextResult<()> {
        if state == EntityState::Detached {
            self.detach(item);
            return Ok(());
        }
        let index = self.attach(item, state)?;
        self.tracker.set_state_at(index, state);
        Ok(())
    }

    pub fn entries(&self) -> ContextResult<Vec<EntryInfo>> {
        self.tracker.entries()
    }

    pub fn has_changes(&self) -> bool {
        self.tracker.has_changes()
    }

    /// Commits every pending change atomically and returns affected rows.
    ///
    /// # Errors
    /// - `Validation` from the first failing dirty entry; nothing is written.
    /// - `KeyChanged` when a Modified or Deleted entry's key differs from the
    ///   key it was tracked with; nothing is written.
    /// - `Store` when the write or commit fails; the transaction is rolled
    ///   back (or the ambient scope doomed).
    pub fn save(&mut self) -> ContextResult<usize> {
        let started_at = Instant::now();
        let snapshot = self.tracker.snapshot();
        let executor = self.executors.resolve();
        debug!(
            "event=context_save module=context status=start tracked={}",
            snapshot.len()
        );

        let save_now = match self.options.timestamp_mode {
            TimestampMode::PerSave => Some(self.clock.utc_now_ms()),
            TimestampMode::PerEntity => None,
        };
        for entry in snapshot.iter().filter(|entry| entry.state.is_dirty()) {
            entry.entity.validate()?;
            let now = save_now.unwrap_or_else(|| self.clock.utc_now_ms());
            entry.entity.stamp_timestamps(now)?;
        }

        let mut batch = Vec::new();
        let mut written_keys = Vec::with_capacity(snapshot.len());
        let mut receipt = CommitReceipt::default();
        for entry in &snapshot {
            let kind = match entry.state {
                EntityState::Added => WriteKind::Insert,
                EntityState::Modified => WriteKind::Update,
                EntityState::Deleted => WriteKind::Delete,
                EntityState::Unchanged | EntityState::Detached => {
                    written_keys.push(None);
                    continue;
                }
            };
            let set = entry.entity.set();
            let key = entry.entity.key()?;
            if kind != WriteKind::Insert && key != entry.original_key {
                return Err(ContextError::KeyChanged {
                    set: set.name,
                    original: entry.original_key.clone(),
                    current: key,
                });
            }
            written_keys.push(Some(key.clone()));
            let row = match kind {
                WriteKind::Delete => Row::new(),
                WriteKind::Insert | WriteKind::Update => entry.entity.to_row()?,
            };

            let info = EntryInfo {
                set: set.name,
                key: key.clone(),
                state: entry.state,
            };
            match kind {
                WriteKind::Insert => receipt.inserted.push(info),
                WriteKind::Update => receipt.updated.push(info),
                WriteKind::Delete => receipt.deleted.push(info),
            }
            batch.push(PendingWrite {
                set,
                key,
                kind,
                row,
            });
        }

        let mut scope = TransactionScope::enter(&mut self.store, self.ambient.as_ref())?;
        let kind = scope.kind();
        let affected = match self.store.write(&batch) {
            Ok(affected) => {
                scope.complete();
                affected
            }
            Err(err) => {
                scope.exit(&mut self.store, self.ambient.as_mut())?;
                return Err(err.into());
            }
        };
        scope.exit(&mut self.store, self.ambient.as_mut())?;

        self.tracker.accept_changes(written_keys);
        receipt.affected = affected;
        match (kind, self.ambient.as_mut()) {
            (ScopeKind::Owned, _) => executor.on_committed(&receipt),
            (ScopeKind::Ambient, Some(ambient)) => ambient.pending.push((executor, receipt)),
            _ => {}
        }

        info!(
            "event=context_save module=context status=ok writes={} affected={} scope={kind:?} duration_ms={}",
            batch.len(),
            affected,
            started_at.elapsed().as_millis()
        );
        Ok(affected)
    }

    /// Runs `work` inside an explicit ambient transaction.
    ///
    /// Saves inside `work` join the scope. The scope commits when `work`
    /// returns `Ok` and no joined save failed; otherwise it rolls back.
    /// Nested calls join the outermost scope.
    ///
    /// # Errors
    /// - The error returned by `work`.
    /// - `TransactionAborted` when `work` succeeded but a joined save failed.
    pub fn with_transaction<R>(
        &mut self,
        work: impl FnOnce(&mut Self) -> ContextResult<R>,
    ) -> ContextResult<R> {
        if self.ambient.is_some() {
            let result = work(self);
            if result.is_err() {
                if let Some(ambient) = self.ambient.as_mut() {
                    ambient.doomed = true;
                }
            }
            return result;
        }

        let owned = !self.store.in_transaction();
        if owned {
            self.store.begin()?;
        }
        self.ambient = Some(AmbientScope::default());
        debug!("event=tx_ambient module=context status=start owned={owned}");

        let result = work(self);
        let ambient = self.ambient.take().unwrap_or_default();

        match result {
            Ok(value) if !ambient.doomed => {
                if owned {
                    if let Err(err) = self.store.commit() {
                        rollback_quietly(&mut self.store);
                        return Err(err.into());
                    }
                }
                debug!("event=tx_ambient module=context status=commit owned={owned}");
                ambient.deliver();
                Ok(value)
            }
            Ok(_) => {
                if owned {
                    rollback_quietly(&mut self.store);
                }
                debug!("event=tx_ambient module=context status=aborted owned={owned}");
                Err(ContextError::TransactionAborted)
            }
            Err(err) => {
                if owned {
                    rollback_quietly(&mut self.store);
                }
                debug!("event=tx_ambient module=context status=rollback owned={owned}");
                Err(err)
            }
        }
    }

    /// Returns the entry index of `item`, registering it with `state` when detached.
    fn attach<T: Entity>(
        &mut self,
        item: &EntityRef<T>,
        state: EntityState,
    ) -> ContextResult<usize> {
        if let Some(index) = self.tracker.position(handle_addr(item)) {
            return Ok(index);
        }

        let key = tracker::read_key(item)?;
        if self.tracker.find_by_key(&T::SET, &key)?.is_some() {
            return Err(ContextError::IdentityConflict {
                set: T::SET.name,
                key,
            });
        }
        self.tracker.register(item, key, state);
        Ok(self.tracker.len() - 1)
    }
}

fn stamp_actor_on<T: Entity>(item: &EntityRef<T>, actor: Option<&str>) -> ContextResult<()> {
    let mut entity = tracker::write(item.cell())?;
    stamp_actor(entity.as_auditable_mut(), actor);
    Ok(())
}
