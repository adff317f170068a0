//! In-memory relational backend.
//!
//! Executes the structured form of the engine's statements against plain
//! row maps. Transactions journal every applied change as a reversible
//! command; rollback undoes the journal in reverse order.

use crate::backend::{Backend, ExecOutcome, Row};
use crate::core::{Result, StoreError, Value};
use crate::sql::{SelectItem, SelectStatement, Statement};
use std::collections::{BTreeMap, HashMap};

type RowMap = HashMap<String, Value>;

#[derive(Debug, Clone, Default)]
struct MemTable {
    columns: Vec<String>,
    rows: BTreeMap<usize, RowMap>,
    next_row_id: usize,
    identity_column: Option<String>,
    next_identity: i64,
}

impl MemTable {
    fn new(columns: &[&str], identity_column: Option<&str>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: BTreeMap::new(),
            next_row_id: 0,
            identity_column: identity_column.map(|c| c.to_string()),
            next_identity: 1,
        }
    }

    fn insert_row(&mut self, row: RowMap) -> usize {
        let id = self.next_row_id;
        self.next_row_id += 1;
        self.rows.insert(id, row);
        id
    }

    fn matching_ids(&self, filter: &[(String, Value)]) -> Vec<usize> {
        self.rows
            .iter()
            .filter(|(_, row)| {
                filter.iter().all(|(col, val)| {
                    row.get(col).map(|v| v == val).unwrap_or(val.is_null())
                })
            })
            .map(|(id, _)| *id)
            .collect()
    }
}

/// A single reversible change, recorded while a transaction is open and
/// undone in reverse order on rollback.
#[derive(Debug, Clone)]
enum JournalEntry {
    InsertRow { table: String, row_id: usize },
    UpdateRow { table: String, row_id: usize, old: RowMap },
    DeleteRow { table: String, row_id: usize, old: RowMap },
    CreateTable { table: String },
}

/// Counters used by cache/idempotence tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendStats {
    pub statements_executed: usize,
    pub ddl_statements: usize,
    pub existence_probes: usize,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: HashMap<String, MemTable>,
    journal: Option<Vec<JournalEntry>>,
    stats: BackendStats,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a core table. Test setup and bootstrap only; side tables
    /// are created by the extensibility provider through DDL statements.
    pub fn create_table(&mut self, name: &str, columns: &[&str], identity_column: Option<&str>) {
        self.tables
            .insert(name.to_string(), MemTable::new(columns, identity_column));
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.rows.len())
    }

    pub fn stats(&self) -> BackendStats {
        self.stats
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    fn table(&self, name: &str) -> Result<&MemTable> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    fn journal(&mut self, entry: JournalEntry) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(entry);
        }
    }

    fn exec_insert(
        &mut self,
        table_name: &str,
        columns: &[String],
        values: &[Value],
    ) -> Result<ExecOutcome> {
        if columns.len() != values.len() {
            return Err(StoreError::ExecutionError(format!(
                "Insert into '{}' binds {} columns to {} values",
                table_name,
                columns.len(),
                values.len()
            )));
        }
        let table = self.table_mut(table_name)?;
        for column in columns {
            if !table.columns.contains(column) {
                return Err(StoreError::ExecutionError(format!(
                    "Unknown column '{}' in table '{}'",
                    column, table_name
                )));
            }
        }

        let mut row: RowMap = columns
            .iter()
            .cloned()
            .zip(values.iter().cloned())
            .collect();

        let mut last_insert_id = None;
        if let Some(identity) = table.identity_column.clone() {
            match row.get(&identity) {
                None | Some(Value::Null) => {
                    let id = table.next_identity;
                    table.next_identity += 1;
                    row.insert(identity, Value::Int(id));
                    last_insert_id = Some(id);
                }
                Some(Value::Int(provided)) => {
                    table.next_identity = table.next_identity.max(provided + 1);
                }
                Some(other) => {
                    return Err(StoreError::TypeMismatch(format!(
                        "Identity column '{}' expects an integer, got {}",
                        identity,
                        other.type_name()
                    )));
                }
            }
        }

        let row_id = table.insert_row(row);
        self.journal(JournalEntry::InsertRow {
            table: table_name.to_string(),
            row_id,
        });
        Ok(ExecOutcome {
            rows_affected: 1,
            last_insert_id,
        })
    }

    fn exec_update(
        &mut self,
        table_name: &str,
        set: &[(String, Value)],
        filter: &[(String, Value)],
    ) -> Result<ExecOutcome> {
        let ids = self.table(table_name)?.matching_ids(filter);
        let mut entries = Vec::new();
        {
            let table = self.table_mut(table_name)?;
            for id in &ids {
                let row = table.rows.get_mut(id).ok_or_else(|| {
                    StoreError::ExecutionError("Row vanished during update".to_string())
                })?;
                entries.push(JournalEntry::UpdateRow {
                    table: table_name.to_string(),
                    row_id: *id,
                    old: row.clone(),
                });
                for (col, val) in set {
                    row.insert(col.clone(), val.clone());
                }
            }
        }
        for entry in entries {
            self.journal(entry);
        }
        Ok(ExecOutcome {
            rows_affected: ids.len(),
            last_insert_id: None,
        })
    }

    fn exec_delete(
        &mut self,
        table_name: &str,
        filter: &[(String, Value)],
    ) -> Result<ExecOutcome> {
        let ids = self.table(table_name)?.matching_ids(filter);
        let mut entries = Vec::new();
        {
            let table = self.table_mut(table_name)?;
            for id in &ids {
                if let Some(old) = table.rows.remove(id) {
                    entries.push(JournalEntry::DeleteRow {
                        table: table_name.to_string(),
                        row_id: *id,
                        old,
                    });
                }
            }
        }
        let affected = entries.len();
        for entry in entries {
            self.journal(entry);
        }
        Ok(ExecOutcome {
            rows_affected: affected,
            last_insert_id: None,
        })
    }

    fn exec_upsert(
        &mut self,
        table_name: &str,
        key: &[(String, Value)],
        property: &str,
        value_column: &str,
        value: &Value,
    ) -> Result<ExecOutcome> {
        let mut constraint: Vec<(String, Value)> = key.to_vec();
        constraint.push(("Name".to_string(), Value::Text(property.to_string())));

        let existing = self.table(table_name)?.matching_ids(&constraint);
        if existing.is_empty() {
            let mut columns: Vec<String> = key.iter().map(|(col, _)| col.clone()).collect();
            columns.push("Name".to_string());
            columns.push(value_column.to_string());
            let mut values: Vec<Value> = key.iter().map(|(_, val)| val.clone()).collect();
            values.push(Value::Text(property.to_string()));
            values.push(value.clone());
            self.exec_insert(table_name, &columns, &values)
        } else {
            self.exec_update(
                table_name,
                &[(value_column.to_string(), value.clone())],
                &constraint,
            )
        }
    }

    fn exec_create_extended_table(
        &mut self,
        table_name: &str,
        key_columns: &[(String, crate::core::DbType, Option<usize>)],
    ) -> Result<ExecOutcome> {
        if self.tables.contains_key(table_name) {
            return Ok(ExecOutcome::default());
        }
        let mut columns: Vec<&str> = Vec::new();
        let key_names: Vec<String> = key_columns.iter().map(|(c, _, _)| c.clone()).collect();
        for name in &key_names {
            columns.push(name.as_str());
        }
        for fixed in ["Name", "Int64", "Decimal", "DateTime", "String", "Binary"] {
            columns.push(fixed);
        }
        self.tables
            .insert(table_name.to_string(), MemTable::new(&columns, None));
        self.stats.ddl_statements += 1;
        self.journal(JournalEntry::CreateTable {
            table: table_name.to_string(),
        });
        Ok(ExecOutcome::default())
    }

    fn project(&self, select: &SelectStatement, row: &RowMap) -> Result<Row> {
        let mut projected = Vec::with_capacity(select.items.len());
        for item in &select.items {
            match item {
                SelectItem::Column { column, .. } => {
                    projected.push(row.get(column).cloned().unwrap_or(Value::Null));
                }
                SelectItem::ExtendedScalar {
                    side_table,
                    value_column,
                    property,
                    key_join,
                    ..
                } => {
                    let side = match self.tables.get(side_table) {
                        Some(side) => side,
                        None => {
                            projected.push(Value::Null);
                            continue;
                        }
                    };
                    let mut filter: Vec<(String, Value)> = key_join
                        .iter()
                        .map(|(side_col, outer_col)| {
                            (
                                side_col.clone(),
                                row.get(outer_col).cloned().unwrap_or(Value::Null),
                            )
                        })
                        .collect();
                    filter.push(("Name".to_string(), Value::Text(property.clone())));
                    let ids = side.matching_ids(&filter);
                    let value = ids
                        .first()
                        .and_then(|id| side.rows.get(id))
                        .and_then(|r| r.get(value_column).cloned())
                        .unwrap_or(Value::Null);
                    projected.push(value);
                }
            }
        }
        Ok(projected)
    }
}

impl Backend for MemoryBackend {
    fn begin(&mut self) -> Result<()> {
        if self.journal.is_some() {
            return Err(StoreError::InvalidOperation(
                "Transaction already active".to_string(),
            ));
        }
        self.journal = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.journal.take().is_none() {
            return Err(StoreError::InvalidOperation(
                "No active transaction to commit".to_string(),
            ));
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let journal = self.journal.take().ok_or_else(|| {
            StoreError::InvalidOperation("No active transaction to roll back".to_string())
        })?;
        for entry in journal.into_iter().rev() {
            match entry {
                JournalEntry::InsertRow { table, row_id } => {
                    if let Some(table) = self.tables.get_mut(&table) {
                        table.rows.remove(&row_id);
                    }
                }
                JournalEntry::UpdateRow { table, row_id, old }
                | JournalEntry::DeleteRow { table, row_id, old } => {
                    if let Some(table) = self.tables.get_mut(&table) {
                        table.rows.insert(row_id, old);
                    }
                }
                JournalEntry::CreateTable { table } => {
                    self.tables.remove(&table);
                }
            }
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.journal.is_some()
    }

    fn execute(&mut self, statement: &Statement) -> Result<ExecOutcome> {
        self.stats.statements_executed += 1;
        match statement {
            Statement::Insert {
                table,
                columns,
                values,
            } => self.exec_insert(table, columns, values),
            Statement::Update { table, set, filter } => self.exec_update(table, set, filter),
            Statement::Delete { table, filter } => self.exec_delete(table, filter),
            Statement::UpsertExtendedRow {
                table,
                key,
                property,
                value_column,
                value,
            } => self.exec_upsert(table, key, property, value_column, value),
            Statement::CreateExtendedTable {
                table, key_columns, ..
            } => self.exec_create_extended_table(table, key_columns),
        }
    }

    fn query(&mut self, select: &SelectStatement) -> Result<Vec<Row>> {
        let table = self.table(&select.table)?;
        let mut ids = table.matching_ids(&select.filter);
        if let Some(top) = select.top {
            ids.truncate(top);
        }
        let rows: Vec<RowMap> = ids
            .iter()
            .filter_map(|id| table.rows.get(id).cloned())
            .collect();
        rows.iter().map(|row| self.project(select, row)).collect()
    }

    fn table_exists(&mut self, table: &str) -> Result<bool> {
        self.stats.existence_probes += 1;
        Ok(self.tables.contains_key(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DbType;

    fn backend_with_orders() -> MemoryBackend {
        let mut backend = MemoryBackend::new();
        backend.create_table("Order", &["Id", "Subject"], Some("Id"));
        backend
    }

    fn insert_order(backend: &mut MemoryBackend, subject: &str) -> i64 {
        let outcome = backend
            .execute(&Statement::Insert {
                table: "Order".into(),
                columns: vec!["Subject".into()],
                values: vec![Value::Text(subject.into())],
            })
            .unwrap();
        outcome.last_insert_id.unwrap()
    }

    #[test]
    fn test_identity_assignment() {
        let mut backend = backend_with_orders();
        assert_eq!(insert_order(&mut backend, "a"), 1);
        assert_eq!(insert_order(&mut backend, "b"), 2);
    }

    #[test]
    fn test_rollback_undoes_all_changes() {
        let mut backend = backend_with_orders();
        insert_order(&mut backend, "kept");

        backend.begin().unwrap();
        insert_order(&mut backend, "discarded");
        backend
            .execute(&Statement::Update {
                table: "Order".into(),
                set: vec![("Subject".into(), Value::Text("changed".into()))],
                filter: vec![("Id".into(), Value::Int(1))],
            })
            .unwrap();
        backend.rollback().unwrap();

        assert_eq!(backend.row_count("Order"), 1);
        let rows = backend
            .query(
                &SelectStatement::new("Order")
                    .column("Subject")
                    .filter("Id", Value::Int(1)),
            )
            .unwrap();
        assert_eq!(rows[0][0], Value::Text("kept".into()));
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let mut backend = backend_with_orders();
        backend
            .execute(&Statement::CreateExtendedTable {
                table: "OrderBfx".into(),
                key_columns: vec![("Id".into(), DbType::Int64, None)],
                name_size: 64,
                string_size: 2048,
            })
            .unwrap();

        let upsert = |value: i64| Statement::UpsertExtendedRow {
            table: "OrderBfx".into(),
            key: vec![("Id".into(), Value::Int(1))],
            property: "Priority".into(),
            value_column: "Int64".into(),
            value: Value::Int(value),
        };
        backend.execute(&upsert(5)).unwrap();
        assert_eq!(backend.row_count("OrderBfx"), 1);
        backend.execute(&upsert(9)).unwrap();
        assert_eq!(backend.row_count("OrderBfx"), 1);
    }

    #[test]
    fn test_create_extended_table_is_noop_when_present() {
        let mut backend = backend_with_orders();
        let ddl = Statement::CreateExtendedTable {
            table: "OrderBfx".into(),
            key_columns: vec![("Id".into(), DbType::Int64, None)],
            name_size: 64,
            string_size: 2048,
        };
        backend.execute(&ddl).unwrap();
        backend.execute(&ddl).unwrap();
        assert_eq!(backend.stats().ddl_statements, 1);
    }
}
