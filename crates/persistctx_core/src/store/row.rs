//! Store-neutral row codec shared by the context and store drivers.
//!
//! # Responsibility
//! - Carry key components and column values between entities and drivers.
//! - Define the mapping contract entity types implement for a driver.
//!
//! # Invariants
//! - `Row` keeps columns in insertion order; drivers bind in that order.
//! - Column lookup is by exact name.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// One column value or key component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "'{value}'"),
            Self::Blob(value) => write!(f, "<{} bytes>", value.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Integer(if value { 1 } else { 0 })
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Failure to convert between a `Row` and an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    MissingColumn(String),
    UnexpectedType {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },
    InvalidValue {
        column: String,
        message: String,
    },
}

impl MappingError {
    pub fn invalid(column: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            column: column.to_string(),
            message: message.into(),
        }
    }
}

impl Display for MappingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingColumn(column) => write!(f, "row has no column `{column}`"),
            Self::UnexpectedType {
                column,
                expected,
                actual,
            } => write!(f, "column `{column}` holds {actual}, expected {expected}"),
            Self::InvalidValue { column, message } => {
                write!(f, "invalid value in column `{column}`: {message}")
            }
        }
    }
}

impl Error for MappingError {}

/// Ordered column/value pairs for one entity row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; replaces an existing column of the same name.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column.to_string(), value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    fn require(&self, column: &str) -> Result<&Value, MappingError> {
        self.get(column)
            .ok_or_else(|| MappingError::MissingColumn(column.to_string()))
    }

    pub fn get_i64(&self, column: &str) -> Result<i64, MappingError> {
        match self.require(column)? {
            Value::Integer(value) => Ok(*value),
            other => Err(unexpected(column, "integer", other)),
        }
    }

    pub fn get_opt_i64(&self, column: &str) -> Result<Option<i64>, MappingError> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Integer(value) => Ok(Some(*value)),
            other => Err(unexpected(column, "integer", other)),
        }
    }

    pub fn get_f64(&self, column: &str) -> Result<f64, MappingError> {
        match self.require(column)? {
            Value::Real(value) => Ok(*value),
            Value::Integer(value) => Ok(*value as f64),
            other => Err(unexpected(column, "real", other)),
        }
    }

    pub fn get_bool(&self, column: &str) -> Result<bool, MappingError> {
        match self.get_i64(column)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(MappingError::invalid(
                column,
                format!("expected 0 or 1, got {other}"),
            )),
        }
    }

    pub fn get_text(&self, column: &str) -> Result<String, MappingError> {
        match self.require(column)? {
            Value::Text(value) => Ok(value.clone()),
            other => Err(unexpected(column, "text", other)),
        }
    }

    pub fn get_opt_text(&self, column: &str) -> Result<Option<String>, MappingError> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Text(value) => Ok(Some(value.clone())),
            other => Err(unexpected(column, "text", other)),
        }
    }

    pub fn get_uuid(&self, column: &str) -> Result<Uuid, MappingError> {
        let text = self.get_text(column)?;
        Uuid::parse_str(&text)
            .map_err(|_| MappingError::invalid(column, format!("`{text}` is not a uuid")))
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(&column, value);
        }
        row
    }
}

fn unexpected(column: &str, expected: &'static str, actual: &Value) -> MappingError {
    MappingError::UnexpectedType {
        column: column.to_string(),
        expected,
        actual: actual.kind(),
    }
}

/// Mapping contract between an entity type and store rows.
///
/// Implemented per entity type; the context never inspects columns itself.
pub trait RowMapping: Sized {
    fn to_row(&self) -> Row;
    fn from_row(row: &Row) -> Result<Self, MappingError>;
}
