//! In-process row store

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::query::{compare_values, Filter, SelectQuery};
use crate::schema::TableSchema;
use crate::store::{Row, RowStore};

struct MemoryTable {
    schema: TableSchema,
    rows: Vec<Row>,
}

impl MemoryTable {
    fn normalize(&self, mut row: Row) -> StorageResult<Row> {
        for key in row.keys() {
            if self.schema.find_column(key).is_none() {
                return Err(StorageError::QueryFailed(format!(
                    "column \"{}\" of relation \"{}\" does not exist",
                    key, self.schema.name
                )));
            }
        }
        for column in &self.schema.columns {
            let value = row.entry(column.name.clone()).or_insert(Value::Null);
            if value.is_null() && !column.nullable {
                return Err(StorageError::QueryFailed(format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    column.name, self.schema.name
                )));
            }
        }
        Ok(row)
    }

    fn conflicting_index(&self, row: &Row, skip: Option<usize>) -> Option<(usize, String)> {
        for column in self.schema.unique_columns() {
            let Some(value) = row.get(&column.name).filter(|v| !v.is_null()) else {
                continue;
            };
            let probe = Filter::Eq(column.name.clone(), value.clone());
            let found = self
                .rows
                .iter()
                .enumerate()
                .find(|(i, existing)| Some(*i) != skip && probe.matches(existing));
            if let Some((index, _)) = found {
                return Some((index, column.name.clone()));
            }
        }
        None
    }
}

/// Row store held in process memory.
///
/// Every operation runs under one mutex, which makes `update_where` an atomic
/// check-and-set. Used by tests and single-process demos.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<HashMap<String, MemoryTable>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the tables created so far
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every row in a table, in insertion order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }
}

fn missing(table: &str) -> StorageError {
    StorageError::MissingRelation(table.to_string())
}

#[async_trait]
impl RowStore for InMemoryStore {
    async fn create_table(&self, schema: &TableSchema) -> StorageResult<()> {
        schema.validate()?;
        let mut tables = self.tables.lock();
        if !tables.contains_key(&schema.name) {
            debug!("Creating in-memory table {}", schema.name);
            tables.insert(
                schema.name.clone(),
                MemoryTable {
                    schema: schema.clone(),
                    rows: Vec::new(),
                },
            );
        }
        Ok(())
    }

    async fn select(&self, query: &SelectQuery) -> StorageResult<Vec<Row>> {
        let tables = self.tables.lock();
        let table = tables.get(&query.table).ok_or_else(|| missing(&query.table))?;

        let mut rows: Vec<Row> = table
            .rows
            .iter()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();

        if let Some(order) = &query.order_by {
            rows.sort_by(|a, b| {
                let ordering = compare_values(
                    a.get(&order.column).unwrap_or(&Value::Null),
                    b.get(&order.column).unwrap_or(&Value::Null),
                );
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        if let Some(limit) = query.limit {
            rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        Ok(rows)
    }

    async fn fetch_one(&self, query: &SelectQuery) -> StorageResult<Row> {
        let mut rows = self.select(query).await?;
        match rows.len() {
            0 => Err(StorageError::NoRows),
            1 => Ok(rows.remove(0)),
            n => Err(StorageError::QueryFailed(format!(
                "expected a single row from {}, found {}",
                query.table, n
            ))),
        }
    }

    async fn insert(&self, table: &str, row: Row) -> StorageResult<()> {
        let mut tables = self.tables.lock();
        let table = tables.get_mut(table).ok_or_else(|| missing(table))?;
        let row = table.normalize(row)?;
        if let Some((_, column)) = table.conflicting_index(&row, None) {
            return Err(StorageError::DuplicateKey(format!(
                "{}.{}",
                table.schema.name, column
            )));
        }
        table.rows.push(row);
        Ok(())
    }

    async fn insert_if_absent(
        &self,
        table: &str,
        row: Row,
        conflict_key: &str,
    ) -> StorageResult<u64> {
        let mut tables = self.tables.lock();
        let table = tables.get_mut(table).ok_or_else(|| missing(table))?;

        let key_value = row
            .get(conflict_key)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| {
                StorageError::ValidationFailed(format!(
                    "row has no value for conflict key '{}'",
                    conflict_key
                ))
            })?;
        let key_filter = Filter::Eq(conflict_key.to_string(), key_value);

        if table.rows.iter().any(|r| key_filter.matches(r)) {
            return Ok(0);
        }
        let row = table.normalize(row)?;
        table.rows.push(row);
        Ok(1)
    }

    async fn update_where(
        &self,
        table: &str,
        values: Row,
        filters: &[Filter],
    ) -> StorageResult<u64> {
        let mut tables = self.tables.lock();
        let table = tables.get_mut(table).ok_or_else(|| missing(table))?;

        let matching: Vec<usize> = table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| filters.iter().all(|f| f.matches(row)))
            .map(|(i, _)| i)
            .collect();

        let mut updated = Vec::with_capacity(matching.len());
        for &index in &matching {
            let mut row = table.rows[index].clone();
            for (column, value) in &values {
                row.insert(column.clone(), value.clone());
            }
            let row = table.normalize(row)?;
            if let Some((_, column)) = table.conflicting_index(&row, Some(index)) {
                return Err(StorageError::DuplicateKey(format!(
                    "{}.{}",
                    table.schema.name, column
                )));
            }
            updated.push((index, row));
        }

        for (index, row) in updated {
            table.rows[index] = row;
        }
        Ok(matching.len() as u64)
    }
}
