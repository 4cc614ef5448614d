//! CLI command implementations

pub mod backend;
pub mod config;
pub mod migrate;
pub mod status;
