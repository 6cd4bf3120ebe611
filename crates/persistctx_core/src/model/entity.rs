//! Entity identity and shared instance handles.
//!
//! # Responsibility
//! - Describe an entity set (name, key columns, columns) for store drivers.
//! - Expose optional audit/validation capabilities per entity type.
//! - Provide `EntityRef`, the handle callers and the context share.
//!
//! # Invariants
//! - `EntitySet::key_columns` order defines the order of `EntityKey` parts.
//! - Key fields of a persisted entity never change.
//! - Handle identity (not key equality) decides whether an instance is tracked.

use crate::model::audit::Auditable;
use crate::model::validation::Validatable;
use crate::store::row::{RowMapping, Value};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt::{Display, Formatter};
use std::rc::Rc;

/// Static description of one entity set (table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySet {
    pub name: &'static str,
    pub key_columns: &'static [&'static str],
    pub columns: &'static [&'static str],
}

impl EntitySet {
    pub fn key_arity(&self) -> usize {
        self.key_columns.len()
    }

    pub fn is_key_column(&self, column: &str) -> bool {
        self.key_columns.contains(&column)
    }
}

/// Ordered key components of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityKey(Vec<Value>);

impl EntityKey {
    pub fn new(parts: Vec<Value>) -> Self {
        Self(parts)
    }

    pub fn parts(&self) -> &[Value] {
        &self.0
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }
}

impl From<Value> for EntityKey {
    fn from(value: Value) -> Self {
        Self(vec![value])
    }
}

impl From<&[Value]> for EntityKey {
    fn from(value: &[Value]) -> Self {
        Self(value.to_vec())
    }
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (index, part) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{part}")?;
        }
        write!(f, ")")
    }
}

/// Domain record managed by a persistence context.
///
/// Capabilities are opt-in: override the accessors to expose them.
pub trait Entity: RowMapping + 'static {
    const SET: EntitySet;

    fn key(&self) -> EntityKey;

    fn as_auditable_mut(&mut self) -> Option<&mut dyn Auditable> {
        None
    }

    fn as_validatable(&self) -> Option<&dyn Validatable> {
        None
    }
}

/// Shared, single-threaded handle to one entity instance.
///
/// Cloning yields another handle to the same instance.
pub struct EntityRef<T: Entity>(Rc<RefCell<T>>);

impl<T: Entity> EntityRef<T> {
    pub fn new(entity: T) -> Self {
        Self(Rc::new(RefCell::new(entity)))
    }

    /// Panics if the instance is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    /// Panics if the instance is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn from_cell(cell: Rc<RefCell<T>>) -> Self {
        Self(cell)
    }

    pub(crate) fn cell(&self) -> &Rc<RefCell<T>> {
        &self.0
    }
}

impl<T: Entity> Clone for EntityRef<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: Entity + std::fmt::Debug> std::fmt::Debug for EntityRef<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0.try_borrow() {
            Ok(entity) => f.debug_tuple("EntityRef").field(&*entity).finish(),
            Err(_) => f.write_str("EntityRef(<borrowed>)"),
        }
    }
}
