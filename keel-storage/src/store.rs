//! Row-oriented storage interface

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{StorageError, StorageResult};
use crate::query::{Filter, SelectQuery};
use crate::schema::TableSchema;

/// A row as a column-name to JSON-value map
pub type Row = serde_json::Map<String, Value>;

/// Convert a JSON object into a [`Row`]
pub fn to_row(value: Value) -> StorageResult<Row> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::SerializationError(format!(
            "expected a JSON object for a row, got {}",
            other
        ))),
    }
}

/// Storage handle shared by the ledger and the lock manager.
///
/// Implementations must apply `update_where` atomically: the filter check and
/// the write happen as one step, so two concurrent callers racing on the same
/// predicate see exactly one affected row between them.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Create the table if it does not exist yet
    async fn create_table(&self, schema: &TableSchema) -> StorageResult<()>;

    /// Rows matching the query
    async fn select(&self, query: &SelectQuery) -> StorageResult<Vec<Row>>;

    /// Exactly one row; [`StorageError::NoRows`] when the query matches nothing
    async fn fetch_one(&self, query: &SelectQuery) -> StorageResult<Row>;

    /// Plain insert
    async fn insert(&self, table: &str, row: Row) -> StorageResult<()>;

    /// Insert unless a row with the same `conflict_key` value exists.
    /// Returns rows written (0 or 1).
    async fn insert_if_absent(&self, table: &str, row: Row, conflict_key: &str)
        -> StorageResult<u64>;

    /// Set `values` on every row matching all `filters`. Returns rows affected.
    async fn update_where(&self, table: &str, values: Row, filters: &[Filter])
        -> StorageResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_row() {
        let row = to_row(json!({"version": 1})).unwrap();
        assert_eq!(row.get("version"), Some(&json!(1)));
        assert!(matches!(
            to_row(json!([1, 2])),
            Err(StorageError::SerializationError(_))
        ));
    }
}
