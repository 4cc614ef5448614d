//! Persisted version ledger

use chrono::{DateTime, SecondsFormat, Utc};
use keel_storage::{
    to_row, ColumnDef, ColumnType, Row, RowStore, SelectQuery, StorageError, TableSchema,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{MigrationError, MigrationResult};

pub const MIGRATIONS_TABLE: &str = "migrations";
pub const COMPATIBILITY_TABLE: &str = "db_app_version_compatibility";
pub const LOCKS_TABLE: &str = "migration_locks";

/// One applied schema version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub version: i64,
    pub applied_at: DateTime<Utc>,
}

/// Audit row written alongside each ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityRecord {
    pub db_version: i64,
    pub app_version: String,
    pub upgraded_at: DateTime<Utc>,
}

/// The three bookkeeping tables
pub fn ledger_tables() -> Vec<TableSchema> {
    vec![
        TableSchema::new(MIGRATIONS_TABLE)
            .column(ColumnDef::new("version", ColumnType::Integer).primary_key())
            .column(ColumnDef::new("applied_at", ColumnType::Timestamp)),
        TableSchema::new(COMPATIBILITY_TABLE)
            .column(ColumnDef::new("db_version", ColumnType::Integer))
            .column(ColumnDef::new("app_version", ColumnType::Text))
            .column(ColumnDef::new("upgraded_at", ColumnType::Timestamp)),
        TableSchema::new(LOCKS_TABLE)
            .column(ColumnDef::new("lock_key", ColumnType::Text).primary_key())
            .column(ColumnDef::new("locked", ColumnType::Boolean))
            .column(ColumnDef::new("locked_at", ColumnType::Timestamp).nullable())
            .column(ColumnDef::new("locked_by", ColumnType::Text).nullable()),
    ]
}

pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn from_row<T: DeserializeOwned>(row: Row) -> MigrationResult<T> {
    serde_json::from_value(Value::Object(row))
        .map_err(|e| MigrationError::Storage(StorageError::from(e)))
}

/// Append-only record of applied schema versions
#[derive(Clone)]
pub struct VersionLedger {
    store: Arc<dyn RowStore>,
}

impl VersionLedger {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    /// Create the bookkeeping tables if absent, then probe each with a
    /// single-row read. An empty table is fine; any other failure is fatal.
    pub async fn ensure_schema(&self) -> MigrationResult<()> {
        for schema in ledger_tables() {
            self.store
                .create_table(&schema)
                .await
                .map_err(|cause| MigrationError::Verification {
                    table: schema.name.clone(),
                    cause,
                })?;

            match self
                .store
                .fetch_one(&SelectQuery::new(&schema.name).limit(1))
                .await
            {
                Ok(_) | Err(StorageError::NoRows) => {
                    debug!(table = %schema.name, "Ledger table verified");
                }
                Err(cause) => {
                    return Err(MigrationError::Verification {
                        table: schema.name,
                        cause,
                    })
                }
            }
        }
        Ok(())
    }

    /// Highest applied version, 0 when nothing has been applied
    pub async fn current_version(&self) -> MigrationResult<i64> {
        let rows = self
            .store
            .select(
                &SelectQuery::new(MIGRATIONS_TABLE)
                    .order_desc("version")
                    .limit(1),
            )
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(from_row::<LedgerEntry>(row)?.version),
            None => Ok(0),
        }
    }

    /// Record a migration whose effects already succeeded.
    ///
    /// The audit row is written before the ledger entry, so a version never
    /// shows as applied without one. An audit row left by an attempt whose
    /// ledger insert failed is reused rather than duplicated.
    pub async fn record_applied(&self, version: i64, app_version: &str) -> MigrationResult<()> {
        let now = timestamp(Utc::now());

        let orphaned = self
            .store
            .select(
                &SelectQuery::new(COMPATIBILITY_TABLE)
                    .eq("db_version", version)
                    .limit(1),
            )
            .await?;
        if orphaned.is_empty() {
            self.store
                .insert(
                    COMPATIBILITY_TABLE,
                    to_row(json!({
                        "db_version": version,
                        "app_version": app_version,
                        "upgraded_at": now,
                    }))?,
                )
                .await?;
        } else {
            warn!(version, "Reusing compatibility record from an earlier attempt");
        }

        self.store
            .insert(
                MIGRATIONS_TABLE,
                to_row(json!({ "version": version, "applied_at": now }))?,
            )
            .await?;
        info!(version, app_version, "Recorded applied migration");
        Ok(())
    }

    /// Applied entries, ascending
    pub async fn applied(&self) -> MigrationResult<Vec<LedgerEntry>> {
        let rows = self
            .store
            .select(&SelectQuery::new(MIGRATIONS_TABLE).order_asc("version"))
            .await?;
        rows.into_iter().map(from_row).collect()
    }

    /// Applied versions, ascending
    pub async fn applied_versions(&self) -> MigrationResult<Vec<i64>> {
        Ok(self.applied().await?.into_iter().map(|e| e.version).collect())
    }

    /// Compatibility audit trail, oldest schema version first
    pub async fn compatibility_history(&self) -> MigrationResult<Vec<CompatibilityRecord>> {
        let rows = self
            .store
            .select(&SelectQuery::new(COMPATIBILITY_TABLE).order_asc("db_version"))
            .await?;
        rows.into_iter().map(from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_storage::testing::MockRowStore;
    use keel_storage::InMemoryStore;

    #[tokio::test]
    async fn test_empty_ledger_is_version_zero() {
        let ledger = VersionLedger::new(Arc::new(InMemoryStore::new()));
        ledger.ensure_schema().await.unwrap();
        assert_eq!(ledger.current_version().await.unwrap(), 0);
        assert!(ledger.applied_versions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_applied_writes_both_tables() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = VersionLedger::new(store.clone());
        ledger.ensure_schema().await.unwrap();

        ledger.record_applied(1, "1.0.0").await.unwrap();
        ledger.record_applied(2, "1.1.0").await.unwrap();

        assert_eq!(ledger.current_version().await.unwrap(), 2);
        assert_eq!(ledger.applied_versions().await.unwrap(), vec![1, 2]);

        let history = ledger.compatibility_history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].app_version, "1.1.0");
        assert_eq!(history[1].db_version, 2);
        assert_eq!(store.rows(COMPATIBILITY_TABLE).len(), 2);
    }

    #[tokio::test]
    async fn test_same_version_cannot_be_recorded_twice() {
        let ledger = VersionLedger::new(Arc::new(InMemoryStore::new()));
        ledger.ensure_schema().await.unwrap();
        ledger.record_applied(1, "1.0.0").await.unwrap();
        assert!(matches!(
            ledger.record_applied(1, "1.0.0").await,
            Err(MigrationError::Storage(StorageError::DuplicateKey(_)))
        ));
    }

    #[tokio::test]
    async fn test_failed_audit_insert_leaves_version_unapplied() {
        let mut store = MockRowStore::new();
        store.expect_select().returning(|_| Ok(Vec::new()));
        store
            .expect_insert()
            .withf(|table, _| table == COMPATIBILITY_TABLE)
            .times(1)
            .returning(|_, _| Err(StorageError::ConnectionFailed("reset".to_string())));
        store
            .expect_insert()
            .withf(|table, _| table == MIGRATIONS_TABLE)
            .never();

        let ledger = VersionLedger::new(Arc::new(store));
        assert!(matches!(
            ledger.record_applied(1, "1.0.0").await,
            Err(MigrationError::Storage(StorageError::ConnectionFailed(_)))
        ));
    }

    #[tokio::test]
    async fn test_retry_after_failed_ledger_insert_keeps_one_audit_row() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = VersionLedger::new(store.clone());
        ledger.ensure_schema().await.unwrap();

        // Audit row from an attempt whose ledger insert never landed
        store
            .insert(
                COMPATIBILITY_TABLE,
                to_row(json!({
                    "db_version": 1,
                    "app_version": "1.0.0",
                    "upgraded_at": "2024-05-01T12:00:00.000000Z",
                }))
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ledger.current_version().await.unwrap(), 0);

        ledger.record_applied(1, "1.0.0").await.unwrap();
        ledger.record_applied(2, "1.1.0").await.unwrap();

        assert_eq!(ledger.applied_versions().await.unwrap(), vec![1, 2]);
        let history = ledger.compatibility_history().await.unwrap();
        assert_eq!(
            history.iter().map(|r| r.db_version).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_ledger_tables() {
        let names: Vec<String> = ledger_tables().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec![MIGRATIONS_TABLE, COMPATIBILITY_TABLE, LOCKS_TABLE]);
        assert!(ledger_tables().iter().all(|t| t.validate().is_ok()));
    }
}
