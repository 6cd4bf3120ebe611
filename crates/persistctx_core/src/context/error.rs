use crate::model::entity::EntityKey;
use crate::model::validation::ValidationError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ContextResult<T> = Result<T, ContextError>;

/// Errors surfaced by persistence context operations.
#[derive(Debug)]
pub enum ContextError {
    /// A dirty entity failed its pre-commit check; nothing was written.
    Validation {
        set: &'static str,
        key: EntityKey,
        source: ValidationError,
    },
    /// Key component count does not match the set's key definition.
    InvalidKey {
        set: &'static str,
        expected: usize,
        actual: usize,
    },
    /// No factory is registered for the requested entity type.
    Instantiation { type_name: &'static str },
    /// The underlying store failed; the transaction was not completed.
    Store(StoreError),
    /// Another instance with the same key is already tracked.
    IdentityConflict { set: &'static str, key: EntityKey },
    /// A persisted entity's key no longer matches the row it was loaded from.
    KeyChanged {
        set: &'static str,
        original: EntityKey,
        current: EntityKey,
    },
    /// The instance is borrowed elsewhere while the context needs it.
    EntityInUse { set: &'static str },
    /// A save joined the ambient transaction and failed, so the scope rolled back.
    TransactionAborted,
}

impl Display for ContextError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation { set, key, source } => {
                write!(f, "validation failed for `{set}` {key}: {source}")
            }
            Self::InvalidKey {
                set,
                expected,
                actual,
            } => write!(
                f,
                "invalid key for `{set}`: expected {expected} component(s), got {actual}"
            ),
            Self::Instantiation { type_name } => {
                write!(f, "no factory registered for entity type `{type_name}`")
            }
            Self::Store(err) => write!(f, "{err}"),
            Self::IdentityConflict { set, key } => {
                write!(f, "another `{set}` instance with key {key} is already tracked")
            }
            Self::KeyChanged {
                set,
                original,
                current,
            } => write!(
                f,
                "key of tracked `{set}` changed from {original} to {current}; keys of persisted entities are immutable"
            ),
            Self::EntityInUse { set } => {
                write!(f, "`{set}` instance is borrowed and cannot be accessed")
            }
            Self::TransactionAborted => {
                write!(f, "transaction scope was aborted by a failed save")
            }
        }
    }
}

impl Error for ContextError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation { source, .. } => Some(source),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ContextError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
