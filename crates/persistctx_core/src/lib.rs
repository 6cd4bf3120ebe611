//! Generic persistence context over a relational store.
//! Tracks entity lifecycle state, stamps audit fields, validates dirty
//! entities and commits each batch atomically.

pub mod clock;
pub mod command;
pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use command::{
    CommandExecutor, CommandExecutorResolver, CommitReceipt, NoopCommandExecutor,
};
pub use context::tracker::{ChangeTracker, EntityState, EntryInfo};
pub use context::{
    ContextBuilder, ContextError, ContextOptions, ContextResult, PersistenceContext,
    TimestampMode,
};
pub use logging::{
    default_log_level, init_logging, init_logging_with, logging_status, LoggingConfig,
};
pub use model::audit::{AuditFields, Auditable, EpochMillis};
pub use model::entity::{Entity, EntityKey, EntityRef, EntitySet};
pub use model::validation::{Validatable, ValidationError};
pub use store::row::{MappingError, Row, RowMapping, Value};
pub use store::sqlite::SqliteStore;
pub use store::{PendingWrite, Store, StoreError, StoreResult, WriteKind};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
