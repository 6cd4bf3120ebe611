//! Audit capability and stamping rules.
//!
//! # Responsibility
//! - Hold created/modified timestamps and actors for auditable entities.
//! - Apply actor stamping (add/update) and timestamp stamping (save).
//!
//! # Invariants
//! - `created_on`/`created_by` are written only while unset.
//! - `modified_on`/`modified_by` are overwritten on every stamp.
//! - `ignore_on_commit` suppresses every stamp and is never persisted.

use serde::{Deserialize, Serialize};

/// Unix epoch milliseconds, UTC.
pub type EpochMillis = i64;

/// Audit columns embedded in auditable entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFields {
    pub created_on: Option<EpochMillis>,
    pub modified_on: Option<EpochMillis>,
    pub created_by: Option<String>,
    pub modified_by: Option<String>,
    /// Per-instance opt-out for all stamping.
    #[serde(skip)]
    pub ignore_on_commit: bool,
}

impl AuditFields {
    /// Fields loaded from storage; `ignore_on_commit` starts cleared.
    pub fn loaded(
        created_on: Option<EpochMillis>,
        modified_on: Option<EpochMillis>,
        created_by: Option<String>,
        modified_by: Option<String>,
    ) -> Self {
        Self {
            created_on,
            modified_on,
            created_by,
            modified_by,
            ignore_on_commit: false,
        }
    }
}

/// Capability exposing audit columns to the stamping rules.
pub trait Auditable {
    fn audit_mut(&mut self) -> &mut AuditFields;
}

/// Stamps actor fields for add/update.
///
/// Returns whether anything was written. Blank or absent actors and
/// suppressed instances are left untouched.
pub fn stamp_actor(target: Option<&mut dyn Auditable>, actor: Option<&str>) -> bool {
    let Some(actor) = actor.filter(|value| !value.trim().is_empty()) else {
        return false;
    };
    let Some(target) = target else {
        return false;
    };

    let fields = target.audit_mut();
    if fields.ignore_on_commit {
        return false;
    }

    if fields.created_by.as_deref().map_or(true, str::is_empty) {
        fields.created_by = Some(actor.to_string());
    }
    fields.modified_by = Some(actor.to_string());
    true
}

/// Stamps timestamp fields for a dirty entry during save.
pub fn stamp_timestamps(target: Option<&mut dyn Auditable>, now: EpochMillis) -> bool {
    let Some(target) = target else {
        return false;
    };

    let fields = target.audit_mut();
    if fields.ignore_on_commit {
        return false;
    }

    if fields.created_on.is_none() {
        fields.created_on = Some(now);
    }
    fields.modified_on = Some(now);
    true
}

#[cfg(test)]
mod tests {
    use super::{stamp_actor, stamp_timestamps, AuditFields, Auditable};

    #[derive(Default)]
    struct Doc {
        audit: AuditFields,
    }

    impl Auditable for Doc {
        fn audit_mut(&mut self) -> &mut AuditFields {
            &mut self.audit
        }
    }

    #[test]
    fn actor_sets_creator_once_and_always_overwrites_modifier() {
        let mut doc = Doc::default();

        assert!(stamp_actor(Some(&mut doc), Some("alice")));
        assert!(stamp_actor(Some(&mut doc), Some("bob")));

        assert_eq!(doc.audit.created_by.as_deref(), Some("alice"));
        assert_eq!(doc.audit.modified_by.as_deref(), Some("bob"));
    }

    #[test]
    fn empty_creator_counts_as_unset() {
        let mut doc = Doc::default();
        doc.audit.created_by = Some(String::new());

        stamp_actor(Some(&mut doc), Some("carol"));
        assert_eq!(doc.audit.created_by.as_deref(), Some("carol"));
    }

    #[test]
    fn blank_or_missing_actor_is_a_no_op() {
        let mut doc = Doc::default();

        assert!(!stamp_actor(Some(&mut doc), None));
        assert!(!stamp_actor(Some(&mut doc), Some("   ")));
        assert!(!stamp_actor(None, Some("alice")));
        assert_eq!(doc.audit, AuditFields::default());
    }

    #[test]
    fn timestamps_keep_created_on_and_move_modified_on() {
        let mut doc = Doc::default();

        stamp_timestamps(Some(&mut doc), 100);
        stamp_timestamps(Some(&mut doc), 250);

        assert_eq!(doc.audit.created_on, Some(100));
        assert_eq!(doc.audit.modified_on, Some(250));
    }

    #[test]
    fn suppressed_instance_is_never_stamped() {
        let mut doc = Doc::default();
        doc.audit.ignore_on_commit = true;

        assert!(!stamp_actor(Some(&mut doc), Some("alice")));
        assert!(!stamp_timestamps(Some(&mut doc), 100));
        assert_eq!(doc.audit.created_by, None);
        assert_eq!(doc.audit.created_on, None);
        assert!(doc.audit.ignore_on_commit);
    }
}
