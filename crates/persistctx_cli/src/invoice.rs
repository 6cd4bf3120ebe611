//! Demo entity mapped to the `invoices` table.

use persistctx_core::db::migrations::Migration;
use persistctx_core::{
    AuditFields, Auditable, Entity, EntityKey, EntitySet, MappingError, Row, RowMapping,
    Validatable, ValidationError, Value,
};
use uuid::Uuid;

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("schema/0001_init.sql"),
}];

#[derive(Debug, Clone, Default)]
pub struct Invoice {
    pub id: Uuid,
    pub customer: String,
    pub total_cents: i64,
    pub audit: AuditFields,
}

impl Invoice {
    pub fn new(customer: &str, total_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer: customer.to_string(),
            total_cents,
            audit: AuditFields::default(),
        }
    }
}

impl RowMapping for Invoice {
    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("customer", self.customer.as_str())
            .with("total_cents", self.total_cents)
            .with("created_on", self.audit.created_on)
            .with("modified_on", self.audit.modified_on)
            .with("created_by", self.audit.created_by.clone())
            .with("modified_by", self.audit.modified_by.clone())
    }

    fn from_row(row: &Row) -> Result<Self, MappingError> {
        Ok(Self {
            id: row.get_uuid("id")?,
            customer: row.get_text("customer")?,
            total_cents: row.get_i64("total_cents")?,
            audit: AuditFields::loaded(
                row.get_opt_i64("created_on")?,
                row.get_opt_i64("modified_on")?,
                row.get_opt_text("created_by")?,
                row.get_opt_text("modified_by")?,
            ),
        })
    }
}

impl Auditable for Invoice {
    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }
}

impl Validatable for Invoice {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.customer.trim().is_empty() {
            return Err(ValidationError::for_field("customer", "must not be blank"));
        }
        Ok(())
    }
}

impl Entity for Invoice {
    const SET: EntitySet = EntitySet {
        name: "invoices",
        key_columns: &["id"],
        columns: &[
            "id",
            "customer",
            "total_cents",
            "created_on",
            "modified_on",
            "created_by",
            "modified_by",
        ],
    };

    fn key(&self) -> EntityKey {
        EntityKey::from(Value::from(self.id))
    }

    fn as_auditable_mut(&mut self) -> Option<&mut dyn Auditable> {
        Some(self)
    }

    fn as_validatable(&self) -> Option<&dyn Validatable> {
        Some(self)
    }
}
