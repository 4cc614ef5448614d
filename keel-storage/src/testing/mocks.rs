//! Mock implementations for testing
//!
//! mockall doubles for [`RowStore`] and [`SqlEndpoint`], used where a test needs
//! to script failures the in-memory store cannot produce.

use async_trait::async_trait;
use mockall::mock;

use crate::{
    endpoint::{EndpointError, SqlEndpoint, SqlResponse},
    query::{Filter, SelectQuery},
    schema::TableSchema,
    store::{Row, RowStore},
    StorageResult,
};

mock! {
    pub SqlEndpoint {}

    #[async_trait]
    impl SqlEndpoint for SqlEndpoint {
        async fn exec_sql(&self, sql_text: &str) -> Result<SqlResponse, EndpointError>;
    }
}

mock! {
    pub RowStore {}

    #[async_trait]
    impl RowStore for RowStore {
        async fn create_table(&self, schema: &TableSchema) -> StorageResult<()>;
        async fn select(&self, query: &SelectQuery) -> StorageResult<Vec<Row>>;
        async fn fetch_one(&self, query: &SelectQuery) -> StorageResult<Row>;
        async fn insert(&self, table: &str, row: Row) -> StorageResult<()>;
        async fn insert_if_absent(&self, table: &str, row: Row, conflict_key: &str) -> StorageResult<u64>;
        async fn update_where(&self, table: &str, values: Row, filters: &[Filter]) -> StorageResult<u64>;
    }
}
