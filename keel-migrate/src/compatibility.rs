//! Application version to schema version compatibility gate

use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::error::{MigrationError, MigrationResult};
use crate::registry::MigrationRegistry;

/// "Application `app_version` needs schema version `db_version`"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityEntry {
    pub app_version: Version,
    pub db_version: i64,
}

/// Ordered compatibility entries, kept in the order they were declared
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatibilityMap {
    entries: Vec<CompatibilityEntry>,
}

/// Result of a gate check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub compatible: bool,
    pub required_version: i64,
}

impl CompatibilityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, app_version: Version, db_version: i64) -> Self {
        self.entries.push(CompatibilityEntry {
            app_version,
            db_version,
        });
        self
    }

    /// Parse `(app_version, db_version)` pairs
    pub fn parse<'a>(pairs: impl IntoIterator<Item = (&'a str, i64)>) -> MigrationResult<Self> {
        let mut map = Self::new();
        for (app_version, db_version) in pairs {
            map = map.entry(parse_app_version(app_version)?, db_version);
        }
        Ok(map)
    }

    /// One entry per migration, keyed by the version that introduced it
    pub fn from_registry(registry: &MigrationRegistry) -> Self {
        registry.iter().fold(Self::new(), |map, m| {
            map.entry(m.required_app_version.clone(), m.version)
        })
    }

    pub fn entries(&self) -> &[CompatibilityEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Minimum schema version the running application needs.
    ///
    /// Entries are visited in ascending semantic-version order (stable, so
    /// equal versions keep declaration order). Among equal versions the last
    /// declared entry speaks for the group. The result is the highest group
    /// value at or below `running`, or 0 when no entry applies.
    pub fn required_version(&self, running: &Version) -> i64 {
        let mut sorted: Vec<&CompatibilityEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| precedence(&a.app_version, &b.app_version));

        let mut required = 0;
        let mut index = 0;
        while index < sorted.len() {
            let group_version = &sorted[index].app_version;
            if precedence(group_version, running) == Ordering::Greater {
                break;
            }
            let mut last = index;
            while last + 1 < sorted.len()
                && precedence(&sorted[last + 1].app_version, group_version) == Ordering::Equal
            {
                last += 1;
            }
            required = required.max(sorted[last].db_version);
            index = last + 1;
        }
        required
    }

    /// Gate check for the running application against the current schema version
    pub fn check(&self, current_version: i64, running: &Version) -> GateDecision {
        let required_version = self.required_version(running);
        let decision = GateDecision {
            compatible: current_version >= required_version,
            required_version,
        };
        debug!(
            current_version,
            required_version,
            app_version = %running,
            compatible = decision.compatible,
            "Compatibility gate evaluated"
        );
        decision
    }
}

/// Free-function form of [`CompatibilityMap::check`]
pub fn is_compatible(current_version: i64, running: &Version, map: &CompatibilityMap) -> GateDecision {
    map.check(current_version, running)
}

/// Semantic-version precedence; build metadata does not count
fn precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

/// Parse an application version, tolerating a leading `v`
pub fn parse_app_version(raw: &str) -> MigrationResult<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).map_err(|e| {
        MigrationError::configuration(format!("invalid application version '{}': {}", raw, e))
    })
}
