//! SQLite store driver.
//!
//! # Responsibility
//! - Translate pending writes into parameterized INSERT/UPDATE/DELETE.
//! - Load rows by primary key for the context identity map.
//! - Delimit transactions on the owned connection.
//!
//! # Invariants
//! - Identifiers are always double-quoted; values are always bound.
//! - UPDATE/DELETE that change zero rows fail the batch.

use crate::db::migrations::Migration;
use crate::db::{open_db, open_db_in_memory};
use crate::model::entity::{EntityKey, EntitySet};
use crate::store::row::{MappingError, Row, Value};
use crate::store::{PendingWrite, Store, StoreError, StoreResult, WriteKind};
use log::debug;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::path::Path;

/// Store driver owning one SQLite connection.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Wraps an already bootstrapped connection.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn open(path: impl AsRef<Path>, migrations: &[Migration]) -> StoreResult<Self> {
        Ok(Self::new(open_db(path, migrations)?))
    }

    pub fn open_in_memory(migrations: &[Migration]) -> StoreResult<Self> {
        Ok(Self::new(open_db_in_memory(migrations)?))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }

    fn execute_write(&self, write: &PendingWrite) -> StoreResult<usize> {
        let (sql, values) = match write.kind {
            WriteKind::Insert => insert_statement(write),
            WriteKind::Update => update_statement(write),
            WriteKind::Delete => delete_statement(write),
        };

        let changed = self.conn.execute(&sql, params_from_iter(values.iter()))?;
        if changed == 0 && write.kind != WriteKind::Insert {
            return Err(StoreError::ConcurrencyConflict {
                set: write.set.name,
                key: write.key.clone(),
            });
        }
        Ok(changed)
    }
}

impl Store for SqliteStore {
    fn find(&mut self, set: &EntitySet, key: &EntityKey) -> StoreResult<Option<Row>> {
        let columns = set
            .columns
            .iter()
            .map(|column| quote(column))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {columns} FROM {} WHERE {} LIMIT 1;",
            quote(set.name),
            key_predicate(set.key_columns, 1)
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(key.parts().iter()))?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let mut loaded = Row::new();
        for (index, column) in set.columns.iter().enumerate() {
            let value = value_from_ref(row.get_ref(index)?).map_err(|message| {
                StoreError::Mapping {
                    set: set.name,
                    source: MappingError::invalid(column, message),
                }
            })?;
            loaded.set(column, value);
        }
        Ok(Some(loaded))
    }

    fn write(&mut self, batch: &[PendingWrite]) -> StoreResult<usize> {
        let mut affected = 0;
        for write in batch {
            affected += self.execute_write(write)?;
        }
        debug!(
            "event=store_write module=store status=ok writes={} affected={}",
            batch.len(),
            affected
        );
        Ok(affected)
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn begin(&mut self) -> StoreResult<()> {
        if self.in_transaction() {
            return Err(StoreError::Transaction(
                "connection already has an open transaction".to_string(),
            ));
        }
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.conn.execute_batch("COMMIT;")?;
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK;")?;
        }
        Ok(())
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(value) => ToSqlOutput::Borrowed(ValueRef::Integer(*value)),
            Value::Real(value) => ToSqlOutput::Borrowed(ValueRef::Real(*value)),
            Value::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
            Value::Blob(value) => ToSqlOutput::Borrowed(ValueRef::Blob(value)),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Result<Value, String> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(value) => Value::Integer(value),
        ValueRef::Real(value) => Value::Real(value),
        ValueRef::Text(bytes) => Value::Text(
            String::from_utf8(bytes.to_vec()).map_err(|_| "text is not valid UTF-8".to_string())?,
        ),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    })
}

fn insert_statement(write: &PendingWrite) -> (String, Vec<&Value>) {
    let mut columns = Vec::with_capacity(write.row.len());
    let mut placeholders = Vec::with_capacity(write.row.len());
    let mut values = Vec::with_capacity(write.row.len());
    for (index, (column, value)) in write.row.iter().enumerate() {
        columns.push(quote(column));
        placeholders.push(format!("?{}", index + 1));
        values.push(value);
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({});",
        quote(write.set.name),
        columns.join(", "),
        placeholders.join(", ")
    );
    (sql, values)
}

fn update_statement(write: &PendingWrite) -> (String, Vec<&Value>) {
    let mut assignments = Vec::new();
    let mut values = Vec::new();
    for (column, value) in write.row.iter() {
        if write.set.is_key_column(column) {
            continue;
        }
        values.push(value);
        assignments.push(format!("{} = ?{}", quote(column), values.len()));
    }

    let predicate = key_predicate(write.set.key_columns, values.len() + 1);
    values.extend(write.key.parts());

    // A key-only set has nothing to assign; touch the row so the match count stays honest.
    let assignments = if assignments.is_empty() {
        write
            .set
            .key_columns
            .iter()
            .map(|column| format!("{0} = {0}", quote(column)))
            .collect::<Vec<_>>()
    } else {
        assignments
    };

    let sql = format!(
        "UPDATE {} SET {} WHERE {predicate};",
        quote(write.set.name),
        assignments.join(", ")
    );
    (sql, values)
}

fn delete_statement(write: &PendingWrite) -> (String, Vec<&Value>) {
    let sql = format!(
        "DELETE FROM {} WHERE {};",
        quote(write.set.name),
        key_predicate(write.set.key_columns, 1)
    );
    (sql, write.key.parts().iter().collect())
}

fn key_predicate(key_columns: &[&str], first_index: usize) -> String {
    key_columns
        .iter()
        .enumerate()
        .map(|(offset, column)| format!("{} = ?{}", quote(column), first_index + offset))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}
