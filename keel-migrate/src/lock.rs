//! Cross-instance migration lock

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_config::MigrationConfig;
use keel_storage::{to_row, Filter, RowStore, SelectQuery, StorageError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{MigrationError, MigrationResult};
use crate::ledger::{from_row, timestamp, LOCKS_TABLE};

/// Row of the `migration_locks` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub lock_key: String,
    pub locked: bool,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
}

/// Exclusive lock guarding the migration critical section
#[async_trait]
pub trait MigrationLock: Send + Sync {
    /// Block until the lock is held by `owner_id`, or fail with
    /// [`MigrationError::LockAcquisition`]
    async fn acquire(&self, lock_key: &str, owner_id: &str) -> MigrationResult<()>;

    /// Give the lock up. Returns false when `owner_id` did not hold it.
    async fn release(&self, lock_key: &str, owner_id: &str) -> MigrationResult<bool>;
}

/// Polling schedule for [`PollingLock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    /// Polls after the first failed attempt
    pub retries: u32,
    /// Fixed wait before each poll
    pub retry_interval: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            retries: 10,
            retry_interval: Duration::from_secs(1),
        }
    }
}

impl From<&MigrationConfig> for LockSettings {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            retries: config.lock_retries,
            retry_interval: config.lock_retry_interval,
        }
    }
}

/// Lock backed by one row per key and an atomic conditional update.
///
/// There is no lease: a holder that dies without releasing leaves the row
/// locked until an operator clears it.
#[derive(Clone)]
pub struct PollingLock {
    store: Arc<dyn RowStore>,
    settings: LockSettings,
}

impl PollingLock {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self::with_settings(store, LockSettings::default())
    }

    pub fn with_settings(store: Arc<dyn RowStore>, settings: LockSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> LockSettings {
        self.settings
    }

    /// One acquisition attempt: make sure the row exists, then flip it from
    /// unlocked to locked. True iff exactly one row changed.
    pub async fn try_acquire(&self, lock_key: &str, owner_id: &str) -> MigrationResult<bool> {
        self.store
            .insert_if_absent(
                LOCKS_TABLE,
                to_row(json!({
                    "lock_key": lock_key,
                    "locked": false,
                    "locked_at": null,
                    "locked_by": null,
                }))?,
                "lock_key",
            )
            .await?;

        let affected = self
            .store
            .update_where(
                LOCKS_TABLE,
                to_row(json!({
                    "locked": true,
                    "locked_at": timestamp(Utc::now()),
                    "locked_by": owner_id,
                }))?,
                &[Filter::eq("lock_key", lock_key), Filter::eq("locked", false)],
            )
            .await?;

        Ok(affected == 1)
    }

    /// Current lock row, if the key was ever used
    pub async fn inspect(&self, lock_key: &str) -> MigrationResult<Option<LockRecord>> {
        match self
            .store
            .fetch_one(&SelectQuery::new(LOCKS_TABLE).eq("lock_key", lock_key))
            .await
        {
            Ok(row) => Ok(Some(from_row(row)?)),
            Err(StorageError::NoRows) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl MigrationLock for PollingLock {
    async fn acquire(&self, lock_key: &str, owner_id: &str) -> MigrationResult<()> {
        if self.try_acquire(lock_key, owner_id).await? {
            info!(lock_key, owner_id, "Migration lock acquired");
            return Ok(());
        }

        for poll in 1..=self.settings.retries {
            sleep(self.settings.retry_interval).await;

            match self.inspect(lock_key).await? {
                Some(record) if record.locked => {
                    debug!(
                        lock_key,
                        poll,
                        holder = record.locked_by.as_deref().unwrap_or("unknown"),
                        "Migration lock still held"
                    );
                }
                _ => {
                    if self.try_acquire(lock_key, owner_id).await? {
                        info!(lock_key, owner_id, poll, "Migration lock acquired");
                        return Ok(());
                    }
                    debug!(lock_key, poll, "Lost the race for a free migration lock");
                }
            }
        }

        warn!(lock_key, owner_id, "Giving up on migration lock");
        Err(MigrationError::LockAcquisition {
            lock_key: lock_key.to_string(),
            attempts: self.settings.retries + 1,
        })
    }

    async fn release(&self, lock_key: &str, owner_id: &str) -> MigrationResult<bool> {
        let affected = self
            .store
            .update_where(
                LOCKS_TABLE,
                to_row(json!({
                    "locked": false,
                    "locked_at": null,
                    "locked_by": null,
                }))?,
                &[Filter::eq("lock_key", lock_key), Filter::eq("locked_by", owner_id)],
            )
            .await?;

        if affected == 0 {
            warn!(lock_key, owner_id, "Release found no lock held by this owner");
            Ok(false)
        } else {
            info!(lock_key, owner_id, "Migration lock released");
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::VersionLedger;
    use keel_storage::InMemoryStore;

    async fn lock() -> PollingLock {
        let store: Arc<dyn RowStore> = Arc::new(InMemoryStore::new());
        VersionLedger::new(store.clone()).ensure_schema().await.unwrap();
        PollingLock::new(store)
    }

    #[tokio::test]
    async fn test_single_attempt_excludes_second_owner() {
        let lock = lock().await;
        assert!(lock.try_acquire("schema_migration", "a").await.unwrap());
        assert!(!lock.try_acquire("schema_migration", "b").await.unwrap());

        let record = lock.inspect("schema_migration").await.unwrap().unwrap();
        assert!(record.locked);
        assert_eq!(record.locked_by.as_deref(), Some("a"));
        assert!(record.locked_at.is_some());
    }

    #[tokio::test]
    async fn test_release_only_by_owner() {
        let lock = lock().await;
        lock.acquire("k", "a").await.unwrap();
        assert!(!lock.release("k", "b").await.unwrap());
        assert!(lock.inspect("k").await.unwrap().unwrap().locked);

        assert!(lock.release("k", "a").await.unwrap());
        let record = lock.inspect("k").await.unwrap().unwrap();
        assert_eq!(
            record,
            LockRecord {
                lock_key: "k".to_string(),
                locked: false,
                locked_at: None,
                locked_by: None,
            }
        );
        assert!(lock.try_acquire("k", "b").await.unwrap());
    }

    #[tokio::test]
    async fn test_inspect_unknown_key() {
        let lock = lock().await;
        assert!(lock.inspect("never-used").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let lock = lock().await;
        assert!(lock.try_acquire("a", "x").await.unwrap());
        assert!(lock.try_acquire("b", "y").await.unwrap());
    }
}
