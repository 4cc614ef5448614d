//! Migration orchestration entry point

use keel_config::MigrationConfig;
use keel_resilience::RetryPolicy;
use keel_storage::{RowStore, SqlEndpoint};
use semver::Version;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::compatibility::{parse_app_version, CompatibilityMap};
use crate::error::{MigrationError, MigrationResult};
use crate::executor::SqlExecutor;
use crate::ledger::VersionLedger;
use crate::lock::{LockSettings, MigrationLock, PollingLock};
use crate::registry::{MigrationContext, MigrationDefinition, MigrationRegistry};

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Ledger version when the run started
    pub starting_version: i64,
    /// Schema version the running application needs
    pub required_version: i64,
    /// Ledger version when the run finished
    pub final_version: i64,
    /// Versions applied by this run, ascending
    pub applied: Vec<i64>,
    /// Whether the run had to take the lock
    pub lock_taken: bool,
}

/// Brings the shared schema up to what the running application needs.
///
/// Control flow: ensure ledger tables, read the current version, consult the
/// compatibility gate, and only when incompatible take the lock and apply the
/// pending migrations in ascending order.
pub struct Orchestrator {
    store: Arc<dyn RowStore>,
    registry: Arc<MigrationRegistry>,
    compatibility: CompatibilityMap,
    executor: SqlExecutor,
    lock: Arc<dyn MigrationLock>,
    ledger: VersionLedger,
    app_version: Version,
    lock_key: String,
}

impl Orchestrator {
    pub fn builder(
        store: Arc<dyn RowStore>,
        endpoint: Arc<dyn SqlEndpoint>,
        registry: Arc<MigrationRegistry>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder::new(store, endpoint, registry)
    }

    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    pub fn app_version(&self) -> &Version {
        &self.app_version
    }

    /// Run the full migration flow for this process.
    ///
    /// Any error is fatal for the host. The lock, when taken, is released
    /// before the error is returned.
    pub async fn run_migrations(&self, instance_id: &str) -> MigrationResult<MigrationReport> {
        info!(instance_id, app_version = %self.app_version, "Starting schema migration check");

        self.ledger.ensure_schema().await?;
        let starting_version = self.ledger.current_version().await?;

        let decision = self.compatibility.check(starting_version, &self.app_version);
        if decision.compatible {
            info!(
                current_version = starting_version,
                required_version = decision.required_version,
                "Schema is compatible, nothing to apply"
            );
            return Ok(MigrationReport {
                starting_version,
                required_version: decision.required_version,
                final_version: starting_version,
                applied: Vec::new(),
                lock_taken: false,
            });
        }

        if self.registry.latest_version() < decision.required_version
            || self.registry.pending(starting_version).is_empty()
        {
            return Err(MigrationError::configuration(format!(
                "application {} requires schema version {} but the latest registered migration is {} (ledger at {})",
                self.app_version,
                decision.required_version,
                self.registry.latest_version(),
                starting_version
            )));
        }

        self.lock.acquire(&self.lock_key, instance_id).await?;

        let outcome = self.apply_pending().await;
        let released = self.lock.release(&self.lock_key, instance_id).await;

        let (locked_version, applied) = match (outcome, released) {
            (Ok(result), Ok(_)) => result,
            (Ok(_), Err(release_err)) => return Err(release_err),
            (Err(apply_err), Ok(_)) => return Err(apply_err),
            (Err(apply_err), Err(release_err)) => {
                error!(error = %release_err, "Failed to release migration lock after a failed run");
                return Err(apply_err);
            }
        };

        let final_version = applied.last().copied().unwrap_or(locked_version);
        if final_version < decision.required_version {
            warn!(
                final_version,
                required_version = decision.required_version,
                "Schema is still behind the running application"
            );
        }
        info!(
            starting_version,
            final_version,
            applied = applied.len(),
            "Schema migration finished"
        );

        Ok(MigrationReport {
            starting_version,
            required_version: decision.required_version,
            final_version,
            applied,
            lock_taken: true,
        })
    }

    /// Apply under the lock. The ledger is read again first: another instance
    /// may have applied some or all migrations while this one waited.
    async fn apply_pending(&self) -> MigrationResult<(i64, Vec<i64>)> {
        let locked_version = self.ledger.current_version().await?;
        let pending = self.registry.pending(locked_version);
        let mut applied = Vec::with_capacity(pending.len());

        for migration in pending {
            self.apply_one(migration).await?;
            self.ledger
                .record_applied(migration.version, &self.app_version.to_string())
                .await?;
            applied.push(migration.version);
        }

        Ok((locked_version, applied))
    }

    async fn apply_one(&self, migration: &MigrationDefinition) -> MigrationResult<()> {
        info!(version = migration.version, name = %migration.name, "Applying migration");

        for statement in migration.body.statements() {
            self.executor.execute(statement).await?;
        }

        if let Some(procedure) = migration.body.procedure() {
            let ctx = MigrationContext {
                version: migration.version,
                executor: &self.executor,
                store: self.store.as_ref(),
            };
            procedure.apply(&ctx).await?;
        }
        Ok(())
    }
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    store: Arc<dyn RowStore>,
    endpoint: Arc<dyn SqlEndpoint>,
    registry: Arc<MigrationRegistry>,
    compatibility: Option<CompatibilityMap>,
    app_version: Option<Version>,
    lock: Option<Arc<dyn MigrationLock>>,
    lock_key: String,
    lock_settings: LockSettings,
    retry_policy: RetryPolicy,
}

impl OrchestratorBuilder {
    pub fn new(
        store: Arc<dyn RowStore>,
        endpoint: Arc<dyn SqlEndpoint>,
        registry: Arc<MigrationRegistry>,
    ) -> Self {
        Self {
            store,
            endpoint,
            registry,
            compatibility: None,
            app_version: None,
            lock: None,
            lock_key: MigrationConfig::default().lock_key,
            lock_settings: LockSettings::default(),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Apply lock, retry and version settings from configuration
    pub fn config(mut self, config: &MigrationConfig) -> MigrationResult<Self> {
        self.lock_key = config.lock_key.clone();
        self.lock_settings = LockSettings::from(config);
        self.retry_policy = RetryPolicy::fixed(config.sql_max_attempts, config.sql_retry_delay);
        if let Some(raw) = &config.app_version {
            self.app_version = Some(parse_app_version(raw)?);
        }
        Ok(self)
    }

    pub fn app_version(mut self, version: Version) -> Self {
        self.app_version = Some(version);
        self
    }

    /// Explicit map; defaults to one entry per registered migration
    pub fn compatibility(mut self, map: CompatibilityMap) -> Self {
        self.compatibility = Some(map);
        self
    }

    /// Replace the default row-based polling lock
    pub fn lock(mut self, lock: Arc<dyn MigrationLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn lock_key(mut self, key: impl Into<String>) -> Self {
        self.lock_key = key.into();
        self
    }

    pub fn lock_settings(mut self, settings: LockSettings) -> Self {
        self.lock_settings = settings;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn build(self) -> MigrationResult<Orchestrator> {
        let app_version = self.app_version.ok_or_else(|| {
            MigrationError::configuration("running application version is not set")
        })?;
        if self.lock_key.trim().is_empty() {
            return Err(MigrationError::configuration("lock key cannot be empty"));
        }

        let compatibility = self
            .compatibility
            .unwrap_or_else(|| CompatibilityMap::from_registry(&self.registry));
        let lock: Arc<dyn MigrationLock> = match self.lock {
            Some(lock) => lock,
            None => Arc::new(PollingLock::with_settings(self.store.clone(), self.lock_settings)),
        };

        Ok(Orchestrator {
            ledger: VersionLedger::new(self.store.clone()),
            executor: SqlExecutor::with_policy(self.endpoint, self.retry_policy),
            store: self.store,
            registry: self.registry,
            compatibility,
            lock,
            app_version,
            lock_key: self.lock_key,
        })
    }
}
