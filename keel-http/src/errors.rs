//! HTTP error types

use keel_storage::{EndpointError, StorageError, NO_ROWS_CODE};
use serde::Deserialize;

/// Error type for HTTP operations
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid header value for {0}")]
    InvalidHeader(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Non-2xx answer from the gateway
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
        body: String,
    },
}

/// PostgREST error document
#[derive(Debug, Default, Deserialize)]
pub(crate) struct PostgrestError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

impl HttpError {
    /// Build a status error from a response body, reading the PostgREST error document if present
    pub fn from_status(status: u16, body: String) -> Self {
        let document: PostgrestError = serde_json::from_str(&body).unwrap_or_default();
        let message = match (document.message, document.details) {
            (Some(message), Some(details)) => format!("{} ({})", message, details),
            (Some(message), None) => message,
            (None, _) if body.is_empty() => format!("status {}", status),
            (None, _) => body.clone(),
        };
        HttpError::Status {
            status,
            code: document.code,
            message,
            body,
        }
    }
}

impl From<HttpError> for StorageError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Status {
                status,
                code,
                message,
                ..
            } => match code.as_deref() {
                Some(NO_ROWS_CODE) => StorageError::NoRows,
                Some("42P01") | Some("PGRST205") => StorageError::MissingRelation(message),
                Some("23505") => StorageError::DuplicateKey(message),
                _ if status == 404 => StorageError::MissingRelation(message),
                _ if status >= 500 => StorageError::ConnectionFailed(message),
                _ => StorageError::QueryFailed(message),
            },
            HttpError::NetworkError(e) => StorageError::ConnectionFailed(e.to_string()),
            HttpError::InvalidJson(e) => StorageError::from(e),
            HttpError::InvalidUrl(msg) | HttpError::InvalidHeader(msg) | HttpError::ConfigError(msg) => {
                StorageError::ConfigError(msg)
            }
        }
    }
}

impl From<HttpError> for EndpointError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Status {
                status,
                message,
                body,
                ..
            } => EndpointError::Status {
                status,
                message,
                body: Some(body),
            },
            other => EndpointError::transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_rows_document_maps_to_no_rows() {
        let body = r#"{"code":"PGRST116","details":"The result contains 0 rows","hint":null,"message":"JSON object requested, multiple (or no) rows returned"}"#;
        let err = HttpError::from_status(406, body.to_string());
        assert!(StorageError::from(err).is_no_rows());
    }

    #[test]
    fn test_status_mapping() {
        let missing = HttpError::from_status(404, r#"{"code":"42P01","message":"relation \"public.migrations\" does not exist"}"#.to_string());
        assert!(matches!(StorageError::from(missing), StorageError::MissingRelation(_)));

        let dup = HttpError::from_status(409, r#"{"code":"23505","message":"duplicate key value"}"#.to_string());
        assert!(matches!(StorageError::from(dup), StorageError::DuplicateKey(_)));

        let unavailable = HttpError::from_status(503, String::new());
        assert!(matches!(StorageError::from(unavailable), StorageError::ConnectionFailed(_)));

        let bad = HttpError::from_status(400, "plain text".to_string());
        match StorageError::from(bad) {
            StorageError::QueryFailed(message) => assert_eq!(message, "plain text"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_endpoint_error_keeps_body() {
        let err = HttpError::from_status(500, r#"{"message":"function exec_sql does not exist"}"#.to_string());
        let endpoint: EndpointError = err.into();
        assert!(endpoint.body().unwrap().contains("exec_sql"));
        assert!(endpoint.to_string().contains("500"));
    }
}
