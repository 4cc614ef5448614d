//! Storage abstractions for Keel
//!
//! Two collaborator interfaces sit at the bottom of the migration stack:
//!
//! - [`RowStore`]: row-oriented table access (create, select, single-row fetch,
//!   insert-if-absent, conditional update, insert)
//! - [`SqlEndpoint`]: submission of raw SQL text with a success/error payload
//!
//! Backends: [`InMemoryStore`] for tests, [`seaorm::SeaOrmStore`] for direct
//! SQLite/PostgreSQL connections. The REST gateway backend lives in `keel-http`.

pub mod endpoint;
pub mod error;
pub mod memory;
pub mod query;
pub mod schema;
pub mod store;

#[cfg(feature = "database")]
pub mod seaorm;

#[cfg(feature = "testing")]
pub mod testing;

// Re-export commonly used types
pub use endpoint::{EndpointError, SqlEndpoint, SqlResponse};
pub use error::{StorageError, StorageResult, NO_ROWS_CODE};
pub use memory::InMemoryStore;
pub use query::{Filter, OrderBy, SelectQuery};
pub use schema::{ColumnDef, ColumnType, SqlDialect, TableSchema};
pub use store::{to_row, Row, RowStore};
