//! HTTP gateway for a PostgREST-style table API.
//!
//! - upsert: `POST {url}/rest/v1/{table}` with `Prefer: resolution=merge-duplicates`
//! - select: `GET {url}/rest/v1/{table}?select=*`
//! - delete: `DELETE {url}/rest/v1/{table}?id=eq.{id}`
//!
//! The static credential goes in both the `apikey` and bearer headers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;

use super::{GatewayError, RemoteGateway};
use crate::config::RemoteConfig;
use crate::models::Table;

#[derive(Debug, Clone)]
pub struct PostgrestGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PostgrestGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Builds a gateway from config.
    ///
    /// Returns an error if the remote is not configured.
    pub fn from_config(config: &RemoteConfig) -> Result<Self, GatewayError> {
        let url = config.url.clone().ok_or(GatewayError::NotConfigured)?;
        let api_key = config.api_key.clone().ok_or(GatewayError::NotConfigured)?;
        Self::new(url, api_key, Duration::from_secs(config.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(response: Response) -> Result<Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl RemoteGateway for PostgrestGateway {
    async fn upsert(&self, table: Table, record: Value) -> Result<(), GatewayError> {
        let response = self
            .request(Method::POST, &self.table_url(table))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&record)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn select_all(&self, table: Table) -> Result<Vec<Value>, GatewayError> {
        let url = format!("{}?select=*", self.table_url(table));
        let response = self.request(Method::GET, &url).send().await?;
        let rows = Self::check(response).await?.json::<Vec<Value>>().await?;
        Ok(rows)
    }

    async fn delete_by_id(&self, table: Table, id: &str) -> Result<(), GatewayError> {
        let url = format!(
            "{}?id=eq.{}",
            self.table_url(table),
            urlencoding::encode(id)
        );
        let response = self.request(Method::DELETE, &url).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}
