mod common;

use common::{Failure, RecordingEndpoint};
use keel_migrate::{MigrationError, SqlExecutor};
use keel_resilience::RetryPolicy;
use keel_storage::testing::MockSqlEndpoint;
use keel_storage::{EndpointError, SqlResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_always_failing_endpoint_is_called_exactly_three_times() {
    let mut endpoint = MockSqlEndpoint::new();
    let mut attempt = 0;
    endpoint.expect_exec_sql().times(3).returning(move |_| {
        attempt += 1;
        Err(EndpointError::Transport {
            message: format!("connection reset (attempt {})", attempt),
            body: Some(format!("body {}", attempt)),
        })
    });

    let executor = SqlExecutor::new(Arc::new(endpoint));
    let started = Instant::now();
    let err = executor.execute("SELECT 1").await.unwrap_err();

    match &err {
        MigrationError::TransientExecution {
            attempts,
            last_error,
            body,
        } => {
            assert_eq!(*attempts, 3);
            assert!(last_error.contains("connection reset (attempt 3)"));
            assert_eq!(body.as_deref(), Some("body 3"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    // Fixed one-second delays between attempts
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_then_success() {
    let mut endpoint = MockSqlEndpoint::new();
    let mut calls = 0;
    endpoint.expect_exec_sql().times(2).returning(move |_| {
        calls += 1;
        if calls == 1 {
            Err(EndpointError::transport("timeout"))
        } else {
            Ok(SqlResponse::succeeded())
        }
    });

    let executor = SqlExecutor::new(Arc::new(endpoint));
    let response = executor.execute("SELECT 1").await.unwrap();
    assert!(response.is_success());
}

#[tokio::test]
async fn test_application_error_is_not_retried() {
    let endpoint = Arc::new(RecordingEndpoint::new());
    endpoint.fail("CREATE TABL x", Failure::Application("syntax error at or near \"TABL\"".to_string()));

    let executor = SqlExecutor::new(endpoint.clone());
    let err = executor.execute("CREATE TABL x").await.unwrap_err();

    assert!(matches!(err, MigrationError::ApplicationSql { ref message, .. } if message.contains("syntax error")));
    assert_eq!(endpoint.count("CREATE TABL x"), 1);
}

#[tokio::test]
async fn test_missing_success_flag_is_not_retried() {
    let endpoint = Arc::new(RecordingEndpoint::new());
    endpoint.fail("SELECT 1", Failure::MissingFlag);

    let executor = SqlExecutor::new(endpoint.clone());
    let err = executor.execute("SELECT 1").await.unwrap_err();

    assert!(matches!(err, MigrationError::MissingSuccessFlag { .. }));
    assert_eq!(err.body(), Some("{}"));
    assert_eq!(endpoint.count("SELECT 1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_custom_policy_bounds_attempts() {
    let endpoint = Arc::new(RecordingEndpoint::new());
    endpoint.fail("SELECT 1", Failure::Transport("refused".to_string()));

    let executor = SqlExecutor::with_policy(
        endpoint.clone(),
        RetryPolicy::fixed(5, Duration::from_millis(200)),
    );
    let err = executor.execute("SELECT 1").await.unwrap_err();

    assert!(matches!(err, MigrationError::TransientExecution { attempts: 5, .. }));
    assert_eq!(endpoint.count("SELECT 1"), 5);
}
