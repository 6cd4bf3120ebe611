//! Store driver contract consumed by the persistence context.
//!
//! # Responsibility
//! - Define key lookup, batch write and transaction primitives.
//! - Keep SQL and connection handling behind the driver boundary.
//!
//! # Invariants
//! - `write` applies the whole batch or reports an error; the caller owns
//!   the surrounding transaction and rolls it back on error.
//! - `begin` is only called when `in_transaction()` is false.

use crate::db::DbError;
use crate::model::entity::{EntityKey, EntitySet};
use crate::store::row::{MappingError, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod row;
pub mod sqlite;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure raised by a store driver.
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Db(DbError),
    Mapping {
        set: &'static str,
        source: MappingError,
    },
    /// An update or delete matched no row.
    ConcurrencyConflict {
        set: &'static str,
        key: EntityKey,
    },
    Transaction(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Mapping { set, source } => write!(f, "cannot map `{set}` row: {source}"),
            Self::ConcurrencyConflict { set, key } => {
                write!(f, "`{set}` row {key} was not found for write")
            }
            Self::Transaction(message) => write!(f, "transaction error: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Mapping { source, .. } => Some(source),
            Self::ConcurrencyConflict { .. } => None,
            Self::Transaction(_) => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

/// Kind of statement a pending write turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
}

/// One row-level change handed to `Store::write`.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub set: EntitySet,
    pub key: EntityKey,
    pub kind: WriteKind,
    /// Full row for inserts and updates; empty for deletes.
    pub row: Row,
}

/// Underlying relational store session.
pub trait Store {
    /// Loads one row by key; `key` arity already matches `set`.
    fn find(&mut self, set: &EntitySet, key: &EntityKey) -> StoreResult<Option<Row>>;

    /// Applies `batch` in order and returns the affected-row count.
    fn write(&mut self, batch: &[PendingWrite]) -> StoreResult<usize>;

    fn in_transaction(&self) -> bool;

    fn begin(&mut self) -> StoreResult<()>;

    fn commit(&mut self) -> StoreResult<()>;

    fn rollback(&mut self) -> StoreResult<()>;
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn find(&mut self, set: &EntitySet, key: &EntityKey) -> StoreResult<Option<Row>> {
        (**self).find(set, key)
    }

    fn write(&mut self, batch: &[PendingWrite]) -> StoreResult<usize> {
        (**self).write(batch)
    }

    fn in_transaction(&self) -> bool {
        (**self).in_transaction()
    }

    fn begin(&mut self) -> StoreResult<()> {
        (**self).begin()
    }

    fn commit(&mut self) -> StoreResult<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> StoreResult<()> {
        (**self).rollback()
    }
}
