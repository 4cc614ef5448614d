#![allow(dead_code)]

use async_trait::async_trait;
use keel_migrate::{MigrationDefinition, MigrationRegistry};
use keel_storage::{EndpointError, SqlEndpoint, SqlResponse};
use semver::Version;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// How a scripted statement fails
#[derive(Debug, Clone)]
pub enum Failure {
    Transport(String),
    Application(String),
    MissingFlag,
}

/// Endpoint that records every call and fails scripted statements
#[derive(Default)]
pub struct RecordingEndpoint {
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, Failure>>,
    yield_between_calls: bool,
}

impl RecordingEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Yield to the scheduler on every call so concurrent runs interleave
    pub fn yielding() -> Self {
        Self {
            yield_between_calls: true,
            ..Self::default()
        }
    }

    pub fn fail(&self, sql: &str, failure: Failure) {
        self.failures.lock().unwrap().insert(sql.to_string(), failure);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, sql: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == sql).count()
    }
}

#[async_trait]
impl SqlEndpoint for RecordingEndpoint {
    async fn exec_sql(&self, sql_text: &str) -> Result<SqlResponse, EndpointError> {
        if self.yield_between_calls {
            tokio::task::yield_now().await;
        }
        self.calls.lock().unwrap().push(sql_text.to_string());
        let failure = self.failures.lock().unwrap().get(sql_text).cloned();
        match failure {
            None => Ok(SqlResponse::succeeded()),
            Some(Failure::Transport(message)) => Err(EndpointError::Transport {
                message,
                body: Some("upstream connect error".to_string()),
            }),
            Some(Failure::Application(message)) => Ok(SqlResponse::failed(message)),
            Some(Failure::MissingFlag) => Ok(SqlResponse::from_body("{}")),
        }
    }
}

pub fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

pub const CREATE_NOTES: &str = "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)";
pub const ADD_PINNED: &str = "ALTER TABLE notes ADD COLUMN pinned BOOLEAN";
pub const ADD_TAGS: &str = "CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL)";
pub const INDEX_TAGS: &str = "CREATE UNIQUE INDEX tags_name ON tags (name)";

/// Versions 1..=3 introduced by app 1.0.0, 1.1.0 and 1.2.0
pub fn three_migrations() -> Arc<MigrationRegistry> {
    first_migrations(3)
}

/// The first `count` of the three migrations, as shipped by an older release
pub fn first_migrations(count: usize) -> Arc<MigrationRegistry> {
    let all = [
        MigrationDefinition::declarative(1, v("1.0.0"), [CREATE_NOTES]),
        MigrationDefinition::declarative(2, v("1.1.0"), [ADD_PINNED]),
        MigrationDefinition::declarative(3, v("1.2.0"), [ADD_TAGS, INDEX_TAGS]),
    ];
    let builder = all
        .into_iter()
        .take(count)
        .fold(MigrationRegistry::builder(), |builder, m| builder.migration(m));
    Arc::new(builder.build().unwrap())
}
