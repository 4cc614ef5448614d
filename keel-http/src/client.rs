//! REST gateway client

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION},
    Client, Method, RequestBuilder,
};
use tracing::{debug, warn};

use crate::config::RestClientConfig;
use crate::errors::HttpError;

/// Media type asking PostgREST for a single JSON object instead of an array
pub const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Client for a PostgREST-style gateway.
///
/// Implements [`keel_storage::RowStore`] over `/rest/v1/{table}` and
/// [`keel_storage::SqlEndpoint`] over `/rest/v1/rpc/{function}`.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    config: RestClientConfig,
}

impl RestClient {
    pub fn new(config: RestClientConfig) -> Result<Self, HttpError> {
        debug!(
            "Creating REST client for {} with timeout: {}s",
            config.base_url,
            config.timeout.as_secs()
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("apikey"),
            header_value(&config.api_key, "apikey")?,
        );
        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", config.api_key), "authorization")?,
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RestClientConfig {
        &self.config
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.as_str().trim_end_matches('/'),
            path
        )
    }

    /// Start a request, adding the schema profile header when configured
    pub(crate) fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, HttpError> {
        let reads = method == Method::GET || method == Method::HEAD;
        let mut builder = self.client.request(method, self.url(path));
        if let Some(schema) = &self.config.schema {
            let profile = if reads { "accept-profile" } else { "content-profile" };
            builder = builder.header(profile, header_value(schema, profile)?);
        }
        Ok(builder)
    }

    /// Ask for a single object (`406` + `PGRST116` when nothing matches)
    pub(crate) fn single_object(builder: RequestBuilder) -> RequestBuilder {
        builder.header(ACCEPT, SINGLE_OBJECT)
    }

    /// Send and return the body of a 2xx answer
    pub(crate) async fn send(&self, builder: RequestBuilder) -> Result<String, HttpError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            debug!("Gateway answered {} ({} bytes)", status, body.len());
            Ok(body)
        } else {
            warn!("Gateway answered {}: {}", status, body);
            Err(HttpError::from_status(status.as_u16(), body))
        }
    }
}

fn header_value(value: &str, name: &str) -> Result<HeaderValue, HttpError> {
    HeaderValue::from_str(value).map_err(|_| HttpError::InvalidHeader(name.to_string()))
}
