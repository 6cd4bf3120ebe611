//! Entity model and optional capabilities.
//!
//! # Responsibility
//! - Define what the persistence context needs to know about an entity.
//! - Keep audit and validation polymorphic over opt-in capabilities.
//!
//! # Invariants
//! - Entities without a capability are skipped by that capability's logic,
//!   never rejected.

pub mod audit;
pub mod entity;
pub mod validation;
