//! Versioned schema migrations for redeployed application fleets
//!
//! Several instances of an application may start at once against one shared
//! database. Before serving traffic each calls
//! [`Orchestrator::run_migrations`], which:
//!
//! 1. ensures the bookkeeping tables exist ([`VersionLedger::ensure_schema`])
//! 2. reads the applied schema version
//! 3. asks the [`CompatibilityMap`] which version the running application needs
//! 4. when behind, takes the [`MigrationLock`] and applies pending migrations
//!    from the [`MigrationRegistry`] through the [`SqlExecutor`], recording each
//!    one in the ledger
//!
//! Storage and SQL execution are reached through the `keel-storage`
//! interfaces, so the same flow runs over a REST gateway, a direct database
//! connection, or in-memory doubles.

pub mod compatibility;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod lock;
pub mod manifest;
pub mod orchestrator;
pub mod registry;
pub mod startup;

pub use compatibility::{is_compatible, parse_app_version, CompatibilityEntry, CompatibilityMap, GateDecision};
pub use error::{MigrationError, MigrationResult};
pub use executor::SqlExecutor;
pub use ledger::{
    ledger_tables, CompatibilityRecord, LedgerEntry, VersionLedger, COMPATIBILITY_TABLE,
    LOCKS_TABLE, MIGRATIONS_TABLE,
};
pub use lock::{LockRecord, LockSettings, MigrationLock, PollingLock};
pub use manifest::{MigrationManifest, ProcedureCatalog};
pub use orchestrator::{MigrationReport, Orchestrator, OrchestratorBuilder};
pub use registry::{
    MigrationBody, MigrationContext, MigrationDefinition, MigrationRegistry, Procedure,
    RegistryBuilder,
};
pub use startup::{default_instance_id, startup_migrations};
