use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use keel_config::DatabaseConfig;
use parking_lot::RwLock;
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr, FromQueryResult, JsonValue,
    QueryResult, SqlErr, Statement,
};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::endpoint::{EndpointError, SqlEndpoint, SqlResponse};
use crate::error::{StorageError, StorageResult};
use crate::query::{Filter, SelectQuery};
use crate::schema::{quote_ident, validate_identifier, ColumnDef, ColumnType, SqlDialect, TableSchema};
use crate::store::{Row, RowStore};

/// Row store and SQL endpoint over a direct SeaORM connection
pub struct SeaOrmStore {
    connection: DatabaseConnection,
    dialect: SqlDialect,
    schemas: RwLock<HashMap<String, TableSchema>>,
}

/// Positional parameters in the backend's placeholder style
struct Params {
    backend: DatabaseBackend,
    values: Vec<sea_orm::Value>,
}

impl Params {
    fn new(backend: DatabaseBackend) -> Self {
        Self {
            backend,
            values: Vec::new(),
        }
    }

    fn push(&mut self, value: sea_orm::Value) -> String {
        self.values.push(value);
        match self.backend {
            DatabaseBackend::Postgres => format!("${}", self.values.len()),
            _ => "?".to_string(),
        }
    }

    fn statement(self, sql: String) -> Statement {
        Statement::from_sql_and_values(self.backend, sql, self.values)
    }
}

impl SeaOrmStore {
    /// Connect using the database backend configuration
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        let connection = super::connection::connect(config).await?;
        Self::from_connection(connection)
    }

    /// Wrap an existing connection
    pub fn from_connection(connection: DatabaseConnection) -> StorageResult<Self> {
        let dialect = match connection.get_database_backend() {
            DatabaseBackend::Postgres => SqlDialect::Postgres,
            DatabaseBackend::Sqlite => SqlDialect::Sqlite,
            other => {
                return Err(StorageError::ConfigError(format!(
                    "unsupported database backend: {:?}",
                    other
                )))
            }
        };
        Ok(Self {
            connection,
            dialect,
            schemas: RwLock::new(HashMap::new()),
        })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    fn backend(&self) -> DatabaseBackend {
        self.connection.get_database_backend()
    }

    fn column_type(&self, table: &str, column: &str) -> Option<ColumnType> {
        self.schemas
            .read()
            .get(table)
            .and_then(|schema| schema.find_column(column))
            .map(|c| c.column_type)
    }

    /// Convert a JSON value into a bind parameter typed for its column
    fn bind(&self, table: &str, column: &str, value: &Value) -> StorageResult<sea_orm::Value> {
        let column_type = self.column_type(table, column);
        let postgres = self.dialect == SqlDialect::Postgres;

        let bound = match value {
            Value::Null => match column_type {
                Some(ColumnType::Integer) => sea_orm::Value::BigInt(None),
                Some(ColumnType::Boolean) => sea_orm::Value::Bool(None),
                Some(ColumnType::Timestamp) if postgres => sea_orm::Value::ChronoDateTimeUtc(None),
                _ => sea_orm::Value::String(None),
            },
            Value::Bool(b) => sea_orm::Value::from(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => sea_orm::Value::from(i),
                None => sea_orm::Value::from(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => match column_type {
                Some(ColumnType::Timestamp) if postgres => {
                    let ts = DateTime::parse_from_rfc3339(s).map_err(|e| {
                        StorageError::ValidationFailed(format!(
                            "column {}.{} expects an RFC 3339 timestamp: {}",
                            table, column, e
                        ))
                    })?;
                    sea_orm::Value::from(ts.with_timezone(&Utc))
                }
                _ => sea_orm::Value::from(s.clone()),
            },
            other => sea_orm::Value::from(serde_json::to_string(other)?),
        };
        Ok(bound)
    }

    fn where_clause(&self, table: &str, filters: &[Filter], params: &mut Params) -> StorageResult<String> {
        if filters.is_empty() {
            return Ok(String::new());
        }
        let mut predicates = Vec::with_capacity(filters.len());
        for filter in filters {
            validate_identifier(filter.column())?;
            match filter {
                Filter::Eq(column, value) => {
                    let placeholder = params.push(self.bind(table, column, value)?);
                    predicates.push(format!("{} = {}", quote_ident(column), placeholder));
                }
                Filter::IsNull(column) => {
                    predicates.push(format!("{} IS NULL", quote_ident(column)));
                }
            }
        }
        Ok(format!(" WHERE {}", predicates.join(" AND ")))
    }

    fn insert_statement(&self, table: &str, row: &Row, params: &mut Params) -> StorageResult<String> {
        validate_identifier(table)?;
        if row.is_empty() {
            return Err(StorageError::ValidationFailed(format!(
                "cannot insert an empty row into {}",
                table
            )));
        }
        let mut columns = Vec::with_capacity(row.len());
        let mut placeholders = Vec::with_capacity(row.len());
        for (column, value) in row {
            validate_identifier(column)?;
            columns.push(quote_ident(column));
            placeholders.push(params.push(self.bind(table, column, value)?));
        }
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.join(", "),
            placeholders.join(", ")
        ))
    }

    fn decode_value(&self, result: &QueryResult, column: &ColumnDef) -> StorageResult<Value> {
        let name = column.name.as_str();
        let value = match (column.column_type, self.dialect) {
            (ColumnType::Integer, _) => result
                .try_get::<Option<i64>>("", name)
                .map(|v| v.map(Value::from)),
            (ColumnType::Boolean, _) => result
                .try_get::<Option<bool>>("", name)
                .map(|v| v.map(Value::from)),
            (ColumnType::Timestamp, SqlDialect::Postgres) => result
                .try_get::<Option<DateTime<Utc>>>("", name)
                .map(|v| v.map(|ts| Value::from(ts.to_rfc3339_opts(SecondsFormat::Micros, true)))),
            (ColumnType::Text, _) | (ColumnType::Timestamp, SqlDialect::Sqlite) => result
                .try_get::<Option<String>>("", name)
                .map(|v| v.map(Value::from)),
        }
        .map_err(map_db_err)?;
        Ok(value.unwrap_or(Value::Null))
    }
}

fn map_db_err(err: DbErr) -> StorageError {
    if let Some(SqlErr::UniqueConstraintViolation(message)) = err.sql_err() {
        return StorageError::DuplicateKey(message);
    }
    match err {
        DbErr::Conn(e) => StorageError::ConnectionFailed(e.to_string()),
        DbErr::ConnectionAcquire(e) => StorageError::ConnectionFailed(e.to_string()),
        other => {
            let message = other.to_string();
            if message.contains("no such table") || message.contains("does not exist") {
                StorageError::MissingRelation(message)
            } else {
                StorageError::QueryFailed(message)
            }
        }
    }
}

#[async_trait]
impl RowStore for SeaOrmStore {
    async fn create_table(&self, schema: &TableSchema) -> StorageResult<()> {
        schema.validate()?;
        let sql = schema.create_table_sql(self.dialect);
        debug!("Ensuring table {}: {}", schema.name, sql);
        self.connection
            .execute_unprepared(&sql)
            .await
            .map_err(map_db_err)?;
        self.schemas.write().insert(schema.name.clone(), schema.clone());
        Ok(())
    }

    async fn select(&self, query: &SelectQuery) -> StorageResult<Vec<Row>> {
        validate_identifier(&query.table)?;
        let mut params = Params::new(self.backend());
        let mut sql = format!("SELECT * FROM {}", quote_ident(&query.table));
        sql.push_str(&self.where_clause(&query.table, &query.filters, &mut params)?);
        if let Some(order) = &query.order_by {
            validate_identifier(&order.column)?;
            sql.push_str(&format!(
                " ORDER BY {} {}",
                quote_ident(&order.column),
                if order.descending { "DESC" } else { "ASC" }
            ));
        }
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        let statement = params.statement(sql);

        let schema = self.schemas.read().get(&query.table).cloned();
        match schema {
            Some(schema) => {
                let results = self
                    .connection
                    .query_all(statement)
                    .await
                    .map_err(map_db_err)?;
                let mut rows = Vec::with_capacity(results.len());
                for result in &results {
                    let mut row = Row::new();
                    for column in &schema.columns {
                        row.insert(column.name.clone(), self.decode_value(result, column)?);
                    }
                    rows.push(row);
                }
                Ok(rows)
            }
            None => {
                warn!(
                    "No schema registered for {}, decoding rows generically",
                    query.table
                );
                let values = JsonValue::find_by_statement(statement)
                    .all(&self.connection)
                    .await
                    .map_err(map_db_err)?;
                values.into_iter().map(crate::store::to_row).collect()
            }
        }
    }

    async fn fetch_one(&self, query: &SelectQuery) -> StorageResult<Row> {
        let mut rows = self.select(query).await?;
        match rows.len() {
            0 => Err(StorageError::NoRows),
            1 => Ok(rows.remove(0)),
            n => Err(StorageError::QueryFailed(format!(
                "expected a single row from {}, found {}",
                query.table, n
            ))),
        }
    }

    async fn insert(&self, table: &str, row: Row) -> StorageResult<()> {
        let mut params = Params::new(self.backend());
        let sql = self.insert_statement(table, &row, &mut params)?;
        self.connection
            .execute(params.statement(sql))
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn insert_if_absent(
        &self,
        table: &str,
        row: Row,
        conflict_key: &str,
    ) -> StorageResult<u64> {
        validate_identifier(conflict_key)?;
        let mut params = Params::new(self.backend());
        let mut sql = self.insert_statement(table, &row, &mut params)?;
        sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", quote_ident(conflict_key)));

        let result = self
            .connection
            .execute(params.statement(sql))
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected())
    }

    async fn update_where(
        &self,
        table: &str,
        values: Row,
        filters: &[Filter],
    ) -> StorageResult<u64> {
        validate_identifier(table)?;
        if values.is_empty() {
            return Err(StorageError::ValidationFailed(format!(
                "update on {} sets no columns",
                table
            )));
        }

        let mut params = Params::new(self.backend());
        let mut assignments = Vec::with_capacity(values.len());
        for (column, value) in &values {
            validate_identifier(column)?;
            let placeholder = params.push(self.bind(table, column, value)?);
            assignments.push(format!("{} = {}", quote_ident(column), placeholder));
        }

        let mut sql = format!("UPDATE {} SET {}", quote_ident(table), assignments.join(", "));
        sql.push_str(&self.where_clause(table, filters, &mut params)?);

        let result = self
            .connection
            .execute(params.statement(sql))
            .await
            .map_err(map_db_err)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SqlEndpoint for SeaOrmStore {
    /// Run raw SQL directly. Database errors come back as a failed response;
    /// only connection problems are transport errors.
    async fn exec_sql(&self, sql_text: &str) -> Result<SqlResponse, EndpointError> {
        match self.connection.execute_unprepared(sql_text).await {
            Ok(_) => Ok(SqlResponse::succeeded()),
            Err(DbErr::Conn(e)) => Err(EndpointError::transport(e.to_string())),
            Err(DbErr::ConnectionAcquire(e)) => Err(EndpointError::transport(e.to_string())),
            Err(other) => Ok(SqlResponse::failed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::to_row;
    use serde_json::json;

    async fn memory_store() -> SeaOrmStore {
        SeaOrmStore::connect(&DatabaseConfig::default()).await.unwrap()
    }

    fn locks() -> TableSchema {
        TableSchema::new("migration_locks")
            .column(ColumnDef::new("lock_key", ColumnType::Text).primary_key())
            .column(ColumnDef::new("locked", ColumnType::Boolean))
            .column(ColumnDef::new("locked_at", ColumnType::Timestamp).nullable())
            .column(ColumnDef::new("locked_by", ColumnType::Text).nullable())
    }

    #[tokio::test]
    async fn test_sqlite_lock_row_cycle() {
        let store = memory_store().await;
        assert_eq!(store.dialect(), SqlDialect::Sqlite);
        store.create_table(&locks()).await.unwrap();
        store.create_table(&locks()).await.unwrap();

        let baseline = to_row(json!({"lock_key": "k", "locked": false, "locked_at": null, "locked_by": null})).unwrap();
        assert_eq!(
            store.insert_if_absent("migration_locks", baseline.clone(), "lock_key").await.unwrap(),
            1
        );
        assert_eq!(
            store.insert_if_absent("migration_locks", baseline, "lock_key").await.unwrap(),
            0
        );

        let take = to_row(json!({"locked": true, "locked_at": "2024-05-01T12:00:00Z", "locked_by": "a"})).unwrap();
        let unlocked = [Filter::eq("lock_key", "k"), Filter::eq("locked", false)];
        assert_eq!(store.update_where("migration_locks", take.clone(), &unlocked).await.unwrap(), 1);
        assert_eq!(store.update_where("migration_locks", take, &unlocked).await.unwrap(), 0);

        let row = store
            .fetch_one(&SelectQuery::new("migration_locks").eq("lock_key", "k"))
            .await
            .unwrap();
        assert_eq!(row["locked"], json!(true));
        assert_eq!(row["locked_by"], json!("a"));
        assert_eq!(row["locked_at"], json!("2024-05-01T12:00:00Z"));
    }

    #[tokio::test]
    async fn test_sqlite_no_rows_and_missing_table() {
        let store = memory_store().await;
        store.create_table(&locks()).await.unwrap();
        let err = store
            .fetch_one(&SelectQuery::new("migration_locks").limit(1))
            .await
            .unwrap_err();
        assert!(err.is_no_rows());

        let err = store.select(&SelectQuery::new("absent")).await.unwrap_err();
        assert!(matches!(err, StorageError::MissingRelation(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_exec_sql_reports_database_errors_in_payload() {
        let store = memory_store().await;
        let ok = store.exec_sql("CREATE TABLE widgets (id INTEGER PRIMARY KEY)").await.unwrap();
        assert!(ok.is_success());

        let failed = store.exec_sql("CREATE TABL oops").await.unwrap();
        assert_eq!(failed.success, Some(false));
        assert!(failed.error.is_some());
    }

    #[test]
    fn test_placeholder_styles() {
        let mut params = Params::new(DatabaseBackend::Postgres);
        assert_eq!(params.push(sea_orm::Value::from(1i64)), "$1");
        assert_eq!(params.push(sea_orm::Value::from(true)), "$2");
        let mut sqlite = Params::new(DatabaseBackend::Sqlite);
        assert_eq!(sqlite.push(sea_orm::Value::from(1i64)), "?");
    }
}
