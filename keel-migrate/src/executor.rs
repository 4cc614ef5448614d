//! Resilient SQL execution

use keel_resilience::{Retrier, RetryPolicy, Retryable};
use keel_storage::{EndpointError, SqlEndpoint, SqlResponse};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{MigrationError, MigrationResult};

/// Outcome of one call to the endpoint, classified by failure layer
#[derive(Debug)]
enum AttemptError {
    /// The call itself failed
    Transport(EndpointError),
    /// The endpoint ran the SQL and reported an error
    Application {
        message: String,
        body: Option<String>,
    },
    /// The endpoint answered without saying whether it succeeded
    MissingFlag { body: Option<String> },
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Transport(err) => write!(f, "{}", err),
            AttemptError::Application { message, .. } => write!(f, "{}", message),
            AttemptError::MissingFlag { .. } => write!(f, "response carried no success flag"),
        }
    }
}

impl Retryable for AttemptError {
    fn is_retryable(&self) -> bool {
        matches!(self, AttemptError::Transport(_))
    }
}

fn classify(response: SqlResponse) -> Result<SqlResponse, AttemptError> {
    if let Some(message) = response.error.clone() {
        return Err(AttemptError::Application {
            message,
            body: response.body,
        });
    }
    match response.success {
        Some(true) => Ok(response),
        Some(false) => Err(AttemptError::Application {
            message: "endpoint reported failure without an error message".to_string(),
            body: response.body,
        }),
        None => Err(AttemptError::MissingFlag {
            body: response.body,
        }),
    }
}

/// Runs SQL text through a [`SqlEndpoint`] with bounded retries.
///
/// Only transport failures are retried. A reported SQL error or a response
/// without a success flag surfaces on the first occurrence.
#[derive(Clone)]
pub struct SqlExecutor {
    endpoint: Arc<dyn SqlEndpoint>,
    policy: RetryPolicy,
}

impl SqlExecutor {
    /// Three attempts, one second apart
    pub fn new(endpoint: Arc<dyn SqlEndpoint>) -> Self {
        Self::with_policy(endpoint, RetryPolicy::default())
    }

    pub fn with_policy(endpoint: Arc<dyn SqlEndpoint>, policy: RetryPolicy) -> Self {
        Self { endpoint, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `sql_text`, returning the successful response
    pub async fn execute(&self, sql_text: &str) -> MigrationResult<SqlResponse> {
        let endpoint = &self.endpoint;

        let result = Retrier::new(self.policy)
            .run("exec_sql", |attempt| async move {
                debug!(attempt, "Executing SQL ({} bytes)", sql_text.len());
                let response = endpoint
                    .exec_sql(sql_text)
                    .await
                    .map_err(AttemptError::Transport)?;
                classify(response)
            })
            .await;

        result.map_err(|err| {
            let attempts = err.attempts();
            match err.into_error() {
                AttemptError::Transport(last) => {
                    warn!(attempts, error = %last, "SQL execution gave up");
                    MigrationError::TransientExecution {
                        attempts,
                        body: last.body().map(str::to_string),
                        last_error: last.to_string(),
                    }
                }
                AttemptError::Application { message, body } => {
                    warn!(error = %message, "SQL execution reported an error");
                    MigrationError::ApplicationSql { message, body }
                }
                AttemptError::MissingFlag { body } => {
                    warn!("SQL endpoint response carried no success flag");
                    MigrationError::MissingSuccessFlag { body }
                }
            }
        })
    }
}

impl fmt::Debug for SqlExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_layers() {
        assert!(classify(SqlResponse::succeeded()).is_ok());

        let err = classify(SqlResponse::failed("relation \"notes\" already exists")).unwrap_err();
        assert!(matches!(err, AttemptError::Application { .. }));
        assert!(!err.is_retryable());

        let err = classify(SqlResponse::from_body("{}")).unwrap_err();
        assert!(matches!(err, AttemptError::MissingFlag { body: Some(_) }));
        assert!(!err.is_retryable());

        let err = classify(SqlResponse {
            success: Some(false),
            error: None,
            body: None,
        })
        .unwrap_err();
        assert!(matches!(err, AttemptError::Application { .. }));

        assert!(AttemptError::Transport(EndpointError::transport("reset")).is_retryable());
    }

    #[test]
    fn test_error_alongside_success_flag_is_a_failure() {
        let response = SqlResponse {
            success: Some(true),
            error: Some("partial failure".to_string()),
            body: None,
        };
        assert!(classify(response).is_err());
    }
}
