//! Versioned migration registry

use async_trait::async_trait;
use keel_storage::RowStore;
use semver::Version;
use std::fmt;
use std::sync::Arc;

use crate::error::{MigrationError, MigrationResult};
use crate::executor::SqlExecutor;

/// What a procedural step may touch while it runs. Same privileges as the
/// declarative statements of the migration.
pub struct MigrationContext<'a> {
    /// Version of the migration being applied
    pub version: i64,
    /// Executor used for the migration's statements
    pub executor: &'a SqlExecutor,
    /// Row storage handle
    pub store: &'a dyn RowStore,
}

/// Imperative migration step, e.g. provisioning a storage bucket
#[async_trait]
pub trait Procedure: Send + Sync {
    async fn apply(&self, ctx: &MigrationContext<'_>) -> MigrationResult<()>;
}

/// Body of a migration
#[derive(Clone)]
pub enum MigrationBody {
    /// SQL statements run in order
    Declarative(Vec<String>),
    /// A procedure only
    Procedural(Arc<dyn Procedure>),
    /// Statements first, then the procedure
    Combined {
        statements: Vec<String>,
        procedure: Arc<dyn Procedure>,
    },
}

impl MigrationBody {
    pub fn statements(&self) -> &[String] {
        match self {
            MigrationBody::Declarative(statements) | MigrationBody::Combined { statements, .. } => {
                statements
            }
            MigrationBody::Procedural(_) => &[],
        }
    }

    pub fn procedure(&self) -> Option<&Arc<dyn Procedure>> {
        match self {
            MigrationBody::Declarative(_) => None,
            MigrationBody::Procedural(procedure) | MigrationBody::Combined { procedure, .. } => {
                Some(procedure)
            }
        }
    }
}

impl fmt::Debug for MigrationBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationBody::Declarative(statements) => {
                f.debug_tuple("Declarative").field(statements).finish()
            }
            MigrationBody::Procedural(_) => f.write_str("Procedural(..)"),
            MigrationBody::Combined { statements, .. } => f
                .debug_struct("Combined")
                .field("statements", statements)
                .finish_non_exhaustive(),
        }
    }
}

/// One registered migration
#[derive(Debug, Clone)]
pub struct MigrationDefinition {
    pub version: i64,
    pub name: String,
    /// Application version that introduced this migration
    pub required_app_version: Version,
    pub body: MigrationBody,
}

impl MigrationDefinition {
    pub fn new(version: i64, required_app_version: Version, body: MigrationBody) -> Self {
        Self {
            version,
            name: format!("migration_{}", version),
            required_app_version,
            body,
        }
    }

    pub fn declarative<S: Into<String>>(
        version: i64,
        required_app_version: Version,
        statements: impl IntoIterator<Item = S>,
    ) -> Self {
        let statements = statements.into_iter().map(Into::into).collect();
        Self::new(version, required_app_version, MigrationBody::Declarative(statements))
    }

    pub fn procedural(version: i64, required_app_version: Version, procedure: Arc<dyn Procedure>) -> Self {
        Self::new(version, required_app_version, MigrationBody::Procedural(procedure))
    }

    pub fn combined<S: Into<String>>(
        version: i64,
        required_app_version: Version,
        statements: impl IntoIterator<Item = S>,
        procedure: Arc<dyn Procedure>,
    ) -> Self {
        let statements = statements.into_iter().map(Into::into).collect();
        Self::new(
            version,
            required_app_version,
            MigrationBody::Combined {
                statements,
                procedure,
            },
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Immutable, ordered set of migrations
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    migrations: Vec<MigrationDefinition>,
}

impl MigrationRegistry {
    /// Validate and build. Versions must be positive and strictly increasing
    /// in the order given.
    pub fn new(migrations: Vec<MigrationDefinition>) -> MigrationResult<Self> {
        let mut previous: Option<i64> = None;
        for migration in &migrations {
            if migration.version <= 0 {
                return Err(MigrationError::configuration(format!(
                    "migration '{}' has non-positive version {}",
                    migration.name, migration.version
                )));
            }
            if let Some(prev) = previous {
                if migration.version == prev {
                    return Err(MigrationError::configuration(format!(
                        "duplicate migration version {}",
                        migration.version
                    )));
                }
                if migration.version < prev {
                    return Err(MigrationError::configuration(format!(
                        "migration version {} registered after {}; versions must be strictly increasing",
                        migration.version, prev
                    )));
                }
            }
            if let MigrationBody::Declarative(statements) = &migration.body {
                if statements.iter().all(|s| s.trim().is_empty()) {
                    return Err(MigrationError::configuration(format!(
                        "migration {} has no statements",
                        migration.version
                    )));
                }
            }
            previous = Some(migration.version);
        }
        Ok(Self { migrations })
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Migrations with `version > current_version`, ascending
    pub fn pending(&self, current_version: i64) -> &[MigrationDefinition] {
        let start = self
            .migrations
            .partition_point(|m| m.version <= current_version);
        &self.migrations[start..]
    }

    /// Highest registered version, 0 when empty
    pub fn latest_version(&self) -> i64 {
        self.migrations.last().map(|m| m.version).unwrap_or(0)
    }

    pub fn get(&self, version: i64) -> Option<&MigrationDefinition> {
        self.migrations
            .binary_search_by_key(&version, |m| m.version)
            .ok()
            .map(|i| &self.migrations[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationDefinition> {
        self.migrations.iter()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

/// Collects definitions; validation happens in [`RegistryBuilder::build`]
#[derive(Default)]
pub struct RegistryBuilder {
    migrations: Vec<MigrationDefinition>,
}

impl RegistryBuilder {
    pub fn migration(mut self, migration: MigrationDefinition) -> Self {
        self.migrations.push(migration);
        self
    }

    pub fn build(self) -> MigrationResult<MigrationRegistry> {
        MigrationRegistry::new(self.migrations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    struct Noop;

    #[async_trait]
    impl Procedure for Noop {
        async fn apply(&self, _ctx: &MigrationContext<'_>) -> MigrationResult<()> {
            Ok(())
        }
    }

    fn registry() -> MigrationRegistry {
        MigrationRegistry::builder()
            .migration(MigrationDefinition::declarative(1, v("1.0.0"), ["CREATE TABLE a (id INT)"]))
            .migration(MigrationDefinition::procedural(2, v("1.1.0"), Arc::new(Noop)))
            .migration(MigrationDefinition::combined(
                3,
                v("1.2.0"),
                ["ALTER TABLE a ADD COLUMN b TEXT"],
                Arc::new(Noop),
            ))
            .build()
            .unwrap()
    }

    #[test]
    fn test_pending_is_strictly_after_current() {
        let registry = registry();
        let versions = |current| {
            registry
                .pending(current)
                .iter()
                .map(|m| m.version)
                .collect::<Vec<_>>()
        };
        assert_eq!(versions(0), vec![1, 2, 3]);
        assert_eq!(versions(1), vec![2, 3]);
        assert_eq!(versions(3), Vec::<i64>::new());
        assert_eq!(versions(10), Vec::<i64>::new());
        assert_eq!(registry.latest_version(), 3);
    }

    #[test]
    fn test_rejects_duplicate_and_decreasing_versions() {
        let dup = MigrationRegistry::builder()
            .migration(MigrationDefinition::declarative(1, v("1.0.0"), ["SELECT 1"]))
            .migration(MigrationDefinition::declarative(1, v("1.0.0"), ["SELECT 2"]))
            .build();
        assert!(matches!(dup, Err(MigrationError::Configuration(_))));

        let decreasing = MigrationRegistry::builder()
            .migration(MigrationDefinition::declarative(2, v("1.0.0"), ["SELECT 1"]))
            .migration(MigrationDefinition::declarative(1, v("1.0.0"), ["SELECT 2"]))
            .build();
        assert!(matches!(decreasing, Err(MigrationError::Configuration(_))));

        let zero = MigrationRegistry::builder()
            .migration(MigrationDefinition::declarative(0, v("1.0.0"), ["SELECT 1"]))
            .build();
        assert!(zero.is_err());
    }

    #[test]
    fn test_rejects_empty_declarative_body() {
        let empty = MigrationRegistry::builder()
            .migration(MigrationDefinition::declarative(1, v("1.0.0"), Vec::<String>::new()))
            .build();
        assert!(empty.is_err());
    }

    #[test]
    fn test_gaps_are_allowed() {
        let registry = MigrationRegistry::builder()
            .migration(MigrationDefinition::declarative(1, v("1.0.0"), ["SELECT 1"]))
            .migration(MigrationDefinition::declarative(5, v("2.0.0"), ["SELECT 5"]))
            .build()
            .unwrap();
        assert_eq!(registry.pending(2).len(), 1);
        assert!(registry.get(5).is_some());
        assert!(registry.get(3).is_none());
    }

    #[test]
    fn test_body_accessors() {
        let registry = registry();
        let m1 = registry.get(1).unwrap();
        assert_eq!(m1.body.statements().len(), 1);
        assert!(m1.body.procedure().is_none());
        assert!(registry.get(2).unwrap().body.statements().is_empty());
        assert!(registry.get(3).unwrap().body.procedure().is_some());
        assert_eq!(m1.name, "migration_1");
        assert!(format!("{:?}", registry.get(2).unwrap().body).contains("Procedural"));
    }
}
