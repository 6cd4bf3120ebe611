//! Pre-commit validation capability.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Invariant violation reported by `Validatable::validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: Option<&'static str>,
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    pub fn for_field(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field: Some(field),
            message: message.into(),
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.field {
            Some(field) => write!(f, "{field}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl Error for ValidationError {}

/// Capability for entities with invariants checked before every save.
pub trait Validatable {
    fn validate(&self) -> Result<(), ValidationError>;
}
