//! SQL execution through the gateway's RPC endpoint

use async_trait::async_trait;
use keel_storage::{EndpointError, SqlEndpoint, SqlResponse};
use reqwest::Method;
use serde_json::json;
use tracing::debug;

use crate::client::RestClient;

#[async_trait]
impl SqlEndpoint for RestClient {
    async fn exec_sql(&self, sql_text: &str) -> Result<SqlResponse, EndpointError> {
        let path = format!("rpc/{}", self.config().rpc_function);
        debug!("POST {} ({} bytes of SQL)", path, sql_text.len());

        let builder = self
            .request(Method::POST, &path)?
            .json(&json!({ "sql_text": sql_text }));
        let body = self.send(builder).await?;
        Ok(SqlResponse::from_body(&body))
    }
}
