#![allow(dead_code)]

use persistctx_core::db::migrations::Migration;
use persistctx_core::{
    AuditFields, Auditable, Entity, EntityKey, EntitySet, MappingError, PendingWrite, Row,
    RowMapping, SqliteStore, Store, StoreError, StoreResult, Validatable, ValidationError, Value,
    WriteKind,
};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;
use uuid::Uuid;

pub const BILLING_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: "CREATE TABLE invoices (
            id TEXT PRIMARY KEY NOT NULL,
            customer TEXT NOT NULL,
            total_cents INTEGER NOT NULL CHECK (total_cents >= 0),
            created_on INTEGER,
            modified_on INTEGER,
            created_by TEXT,
            modified_by TEXT
        );",
    },
    Migration {
        version: 2,
        sql: "CREATE TABLE invoice_lines (
            invoice_id TEXT NOT NULL REFERENCES invoices(id),
            line_no INTEGER NOT NULL,
            description TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            PRIMARY KEY (invoice_id, line_no)
        );",
    },
];

/// Auditable, validatable invoice header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub customer: String,
    pub total_cents: i64,
    #[serde(flatten)]
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
        if self.total_cents < 0 {
            return Err(ValidationError::for_field(
                "total_cents",
                format!("must be >= 0, got {}", self.total_cents),
            ));
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

/// Plain entity with a composite key and no capabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceLine {
    pub invoice_id: Uuid,
    pub line_no: i64,
    pub description: String,
    pub amount_cents: i64,
}

impl InvoiceLine {
    pub fn new(invoice_id: Uuid, line_no: i64, description: &str, amount_cents: i64) -> Self {
        Self {
            invoice_id,
            line_no,
            description: description.to_string(),
            amount_cents,
        }
    }
}

impl RowMapping for InvoiceLine {
    fn to_row(&self) -> Row {
        Row::new()
            .with("invoice_id", self.invoice_id)
            .with("line_no", self.line_no)
            .with("description", self.description.as_str())
            .with("amount_cents", self.amount_cents)
    }

    fn from_row(row: &Row) -> Result<Self, MappingError> {
        Ok(Self {
            invoice_id: row.get_uuid("invoice_id")?,
            line_no: row.get_i64("line_no")?,
            description: row.get_text("description")?,
            amount_cents: row.get_i64("amount_cents")?,
        })
    }
}

impl Entity for InvoiceLine {
    const SET: EntitySet = EntitySet {
        name: "invoice_lines",
        key_columns: &["invoice_id", "line_no"],
        columns: &["invoice_id", "line_no", "description", "amount_cents"],
    };

    fn key(&self) -> EntityKey {
        EntityKey::new(vec![Value::from(self.invoice_id), Value::from(self.line_no)])
    }
}

/// Validatable entity that counts how often it was checked.
#[derive(Debug, Clone)]
pub struct Memo {
    pub id: i64,
    pub body: String,
    pub validations: Rc<Cell<usize>>,
}

impl Memo {
    pub fn new(id: i64, body: &str) -> Self {
        Self {
            id,
            body: body.to_string(),
            validations: Rc::new(Cell::new(0)),
        }
    }
}

impl RowMapping for Memo {
    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("body", self.body.as_str())
    }

    fn from_row(row: &Row) -> Result<Self, MappingError> {
        Ok(Self::new(row.get_i64("id")?, &row.get_text("body")?))
    }
}

impl Validatable for Memo {
    fn validate(&self) -> Result<(), ValidationError> {
        self.validations.set(self.validations.get() + 1);
        if self.body.is_empty() {
            return Err(ValidationError::for_field("body", "must not be empty"));
        }
        Ok(())
    }
}

impl Entity for Memo {
    const SET: EntitySet = EntitySet {
        name: "memos",
        key_columns: &["id"],
        columns: &["id", "body"],
    };

    fn key(&self) -> EntityKey {
        EntityKey::from(Value::from(self.id))
    }

    fn as_validatable(&self) -> Option<&dyn Validatable> {
        Some(self)
    }
}

pub fn billing_store() -> SqliteStore {
    SqliteStore::open_in_memory(BILLING_MIGRATIONS).unwrap()
}

/// Clock returning `start`, `start + step`, ... on successive reads.
pub fn stepping_clock(start: i64, step: i64) -> (impl Fn() -> i64, Rc<Cell<usize>>) {
    let reads = Rc::new(Cell::new(0_usize));
    let counter = Rc::clone(&reads);
    let clock = move || {
        let index = counter.get();
        counter.set(index + 1);
        start + step * index as i64
    };
    (clock, reads)
}

pub fn count_rows(store: &SqliteStore, table: &str) -> i64 {
    store
        .connection()
        .query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
            row.get(0)
        })
        .unwrap()
}

/// In-memory fake driver that records every call.
#[derive(Default)]
pub struct RecordingStore {
    pub rows: Vec<(&'static str, EntityKey, Row)>,
    pub find_calls: usize,
    pub write_calls: usize,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub fail_writes: bool,
    pub last_batch: Vec<PendingWrite>,
    backup: Option<Vec<(&'static str, EntityKey, Row)>>,
}

impl RecordingStore {
    pub fn with_row<T: Entity>(mut self, entity: &T) -> Self {
        self.rows.push((T::SET.name, entity.key(), entity.to_row()));
        self
    }

    fn position(&self, set: &str, key: &EntityKey) -> Option<usize> {
        self.rows
            .iter()
            .position(|(name, row_key, _)| *name == set && row_key == key)
    }
}

impl Store for RecordingStore {
    fn find(&mut self, set: &EntitySet, key: &EntityKey) -> StoreResult<Option<Row>> {
        self.find_calls += 1;
        Ok(self
            .position(set.name, key)
            .map(|index| self.rows[index].2.clone()))
    }

    fn write(&mut self, batch: &[PendingWrite]) -> StoreResult<usize> {
        self.write_calls += 1;
        self.last_batch = batch.to_vec();
        if self.fail_writes {
            return Err(StoreError::Transaction("injected write failure".to_string()));
        }

        for write in batch {
            let existing = self.position(write.set.name, &write.key);
            match (write.kind, existing) {
                (WriteKind::Insert, None) => {
                    self.rows
                        .push((write.set.name, write.key.clone(), write.row.clone()));
                }
                (WriteKind::Update, Some(index)) => self.rows[index].2 = write.row.clone(),
                (WriteKind::Delete, Some(index)) => {
                    self.rows.remove(index);
                }
                _ => {
                    return Err(StoreError::ConcurrencyConflict {
                        set: write.set.name,
                        key: write.key.clone(),
                    })
                }
            }
        }
        Ok(batch.len())
    }

    fn in_transaction(&self) -> bool {
        self.backup.is_some()
    }

    fn begin(&mut self) -> StoreResult<()> {
        self.begins += 1;
        self.backup = Some(self.rows.clone());
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.commits += 1;
        self.backup = None;
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.rollbacks += 1;
        if let Some(rows) = self.backup.take() {
            self.rows = rows;
        }
        Ok(())
    }
}
