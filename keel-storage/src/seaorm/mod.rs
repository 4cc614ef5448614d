//! SeaORM-backed storage (SQLite and PostgreSQL)

pub mod connection;
pub mod store;

pub use connection::connect;
pub use store::SeaOrmStore;
