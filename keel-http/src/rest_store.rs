//! Row storage over PostgREST table endpoints

use async_trait::async_trait;
use keel_storage::schema::validate_identifier;
use keel_storage::{
    to_row, Filter, Row, RowStore, SelectQuery, SqlDialect, SqlEndpoint,
    StorageError, StorageResult, TableSchema,
};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::client::RestClient;

/// Render a filter as a PostgREST query parameter
fn filter_param(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq(column, Value::Null) | Filter::IsNull(column) => {
            (column.clone(), "is.null".to_string())
        }
        Filter::Eq(column, Value::String(s)) => (column.clone(), format!("eq.{}", s)),
        Filter::Eq(column, other) => (column.clone(), format!("eq.{}", other)),
    }
}

fn filter_params(filters: &[Filter]) -> StorageResult<Vec<(String, String)>> {
    filters
        .iter()
        .map(|f| {
            validate_identifier(f.column())?;
            Ok(filter_param(f))
        })
        .collect()
}

fn select_params(query: &SelectQuery) -> StorageResult<Vec<(String, String)>> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(filter_params(&query.filters)?);
    if let Some(order) = &query.order_by {
        validate_identifier(&order.column)?;
        let direction = if order.descending { "desc" } else { "asc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    Ok(params)
}

fn parse_rows(body: &str) -> StorageResult<Vec<Row>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(body)? {
        Value::Array(items) => items.into_iter().map(to_row).collect(),
        other => Ok(vec![to_row(other)?]),
    }
}

#[async_trait]
impl RowStore for RestClient {
    /// DDL goes through the SQL RPC; the gateway is then told to reload its schema cache.
    async fn create_table(&self, schema: &TableSchema) -> StorageResult<()> {
        schema.validate()?;
        let sql = format!(
            "{}; NOTIFY pgrst, 'reload schema';",
            schema.create_table_sql(SqlDialect::Postgres)
        );
        let response = self
            .exec_sql(&sql)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        if response.is_success() {
            debug!("Ensured table {}", schema.name);
            Ok(())
        } else {
            Err(StorageError::QueryFailed(format!(
                "creating {} failed: {}",
                schema.name,
                response
                    .error
                    .or(response.body)
                    .unwrap_or_else(|| "no success flag in response".to_string())
            )))
        }
    }

    async fn select(&self, query: &SelectQuery) -> StorageResult<Vec<Row>> {
        validate_identifier(&query.table)?;
        let builder = self
            .request(Method::GET, &query.table)?
            .query(&select_params(query)?);
        let body = self.send(builder).await?;
        parse_rows(&body)
    }

    async fn fetch_one(&self, query: &SelectQuery) -> StorageResult<Row> {
        validate_identifier(&query.table)?;
        let builder = self
            .request(Method::GET, &query.table)?
            .query(&select_params(query)?);
        let body = self.send(RestClient::single_object(builder)).await?;
        to_row(serde_json::from_str(&body)?)
    }

    async fn insert(&self, table: &str, row: Row) -> StorageResult<()> {
        validate_identifier(table)?;
        let builder = self
            .request(Method::POST, table)?
            .header("prefer", "return=minimal")
            .json(&row);
        self.send(builder).await?;
        Ok(())
    }

    async fn insert_if_absent(
        &self,
        table: &str,
        row: Row,
        conflict_key: &str,
    ) -> StorageResult<u64> {
        validate_identifier(table)?;
        validate_identifier(conflict_key)?;
        let builder = self
            .request(Method::POST, table)?
            .query(&[("on_conflict", conflict_key)])
            .header("prefer", "resolution=ignore-duplicates,return=representation")
            .json(&row);
        let body = self.send(builder).await?;
        Ok(parse_rows(&body)?.len() as u64)
    }

    async fn update_where(
        &self,
        table: &str,
        values: Row,
        filters: &[Filter],
    ) -> StorageResult<u64> {
        validate_identifier(table)?;
        let builder = self
            .request(Method::PATCH, table)?
            .query(&filter_params(filters)?)
            .header("prefer", "return=representation")
            .json(&values);
        let body = self.send(builder).await?;
        Ok(parse_rows(&body)?.len() as u64)
    }
}
