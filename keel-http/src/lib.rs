//! PostgREST-style REST backend for Keel
//!
//! [`RestClient`] talks to a gateway exposing tables under `/rest/v1/{table}`
//! and an SQL execution function under `/rest/v1/rpc/{function}`, and
//! implements both storage collaborator interfaces.

pub mod client;
pub mod config;
pub mod errors;
mod rest_store;
mod rpc;

// Re-export main types for convenience
pub use client::{RestClient, SINGLE_OBJECT};
pub use config::RestClientConfig;
pub use errors::HttpError;
