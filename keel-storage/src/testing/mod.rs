//! Test doubles for the storage interfaces

pub mod mocks;

pub use mocks::{MockRowStore, MockSqlEndpoint};
