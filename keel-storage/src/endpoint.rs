//! SQL execution endpoint interface

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Failure to invoke the endpoint at all
#[derive(Debug, Clone, Error)]
pub enum EndpointError {
    /// Network, connection or invocation failure
    #[error("SQL endpoint transport failure: {message}")]
    Transport {
        message: String,
        body: Option<String>,
    },

    /// The endpoint answered with a non-success status
    #[error("SQL endpoint returned status {status}: {message}")]
    Status {
        status: u16,
        message: String,
        body: Option<String>,
    },
}

impl EndpointError {
    pub fn transport(message: impl Into<String>) -> Self {
        EndpointError::Transport {
            message: message.into(),
            body: None,
        }
    }

    /// Raw response body, when one was received
    pub fn body(&self) -> Option<&str> {
        match self {
            EndpointError::Transport { body, .. } | EndpointError::Status { body, .. } => {
                body.as_deref()
            }
        }
    }
}

/// Payload returned by the endpoint for one SQL text
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SqlResponse {
    /// Explicit success flag; absent means the outcome is unknown
    #[serde(default)]
    pub success: Option<bool>,

    /// Application-level error message
    #[serde(default)]
    pub error: Option<String>,

    /// Raw body as received
    #[serde(skip)]
    pub body: Option<String>,
}

impl SqlResponse {
    pub fn succeeded() -> Self {
        Self {
            success: Some(true),
            error: None,
            body: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: Some(false),
            error: Some(message.into()),
            body: None,
        }
    }

    /// Parse a raw JSON body. Anything that is not a JSON object yields a
    /// response without a success flag.
    pub fn from_body(raw: &str) -> Self {
        let mut response = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value @ serde_json::Value::Object(_)) => {
                serde_json::from_value::<SqlResponse>(value).unwrap_or_default()
            }
            _ => SqlResponse::default(),
        };
        response.body = Some(raw.to_string());
        response
    }

    pub fn is_success(&self) -> bool {
        self.success == Some(true) && self.error.is_none()
    }
}

/// Executes raw SQL text remotely.
#[async_trait]
pub trait SqlEndpoint: Send + Sync {
    /// Submit `sql_text`; `Err` only for transport-level failures
    async fn exec_sql(&self, sql_text: &str) -> Result<SqlResponse, EndpointError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success_body() {
        let response = SqlResponse::from_body(r#"{"success": true}"#);
        assert!(response.is_success());
        assert_eq!(response.body.as_deref(), Some(r#"{"success": true}"#));
    }

    #[test]
    fn test_parse_application_error() {
        let response = SqlResponse::from_body(r#"{"success": false, "error": "syntax error at or near \"TABL\""}"#);
        assert_eq!(response.success, Some(false));
        assert!(response.error.as_deref().unwrap().contains("syntax error"));
        assert!(!response.is_success());
    }

    #[test]
    fn test_missing_flag_and_non_object_bodies() {
        assert_eq!(SqlResponse::from_body("{}").success, None);
        assert_eq!(SqlResponse::from_body("null").success, None);
        assert_eq!(SqlResponse::from_body("not json").success, None);
        assert_eq!(SqlResponse::from_body(r#"{"success": "yes"}"#).success, None);
    }

    #[test]
    fn test_endpoint_error_body() {
        let err = EndpointError::Status {
            status: 503,
            message: "Service Unavailable".to_string(),
            body: Some("upstream down".to_string()),
        };
        assert_eq!(err.body(), Some("upstream down"));
        assert_eq!(EndpointError::transport("reset").body(), None);
    }
}
