// ABOUTME: HTTP client for the ResultsDB v2.0 REST API
// ABOUTME: Handles result queries, pagination links, and result creation

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use std::time::Duration;

use super::models::{AuthenticatedCreate, CreateResult, ResultsDbResult, ResultsPage};
use crate::error::ResultsDbError;

/// Default timeout for HTTP requests, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Represents a ResultsDB instance, e.g.
/// `https://taskotron-dev.fedoraproject.org/resultsdb_api/api`.
#[derive(Debug, Clone)]
pub struct ResultsDbClient {
    client: Client,
    api_url: String,
    auth_token: Option<String>,
}

impl ResultsDbClient {
    pub fn new(api_url: &str, auth_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn results_url(&self) -> String {
        format!("{}/v2.0/results", self.api_url)
    }

    /// Get a single result by its ResultsDB id.
    pub async fn get_result(&self, id: u64) -> Result<ResultsDbResult, ResultsDbError> {
        let url = format!("{}/{}", self.results_url(), id);
        let response = self.send(self.client.get(&url), &url).await?;
        decode(response, &url).await
    }

    /// Query the first page of results matching `params`.
    ///
    /// Consult the ResultsDB API documentation for valid parameters
    /// (`since`, `_sort`, `limit`, arbitrary data keys, ...).
    pub async fn get_results_page(
        &self,
        params: &[(String, String)],
    ) -> Result<ResultsPage, ResultsDbError> {
        let url = self.results_url();
        tracing::debug!("GET {} {:?}", url, params);
        let response = self.send(self.client.get(&url).query(params), &url).await?;
        decode(response, &url).await
    }

    /// Follow a `next` link from a previous page. The link already carries the query.
    pub async fn get_next_page(&self, url: &str) -> Result<ResultsPage, ResultsDbError> {
        tracing::debug!("GET {}", url);
        let response = self.send(self.client.get(url), url).await?;
        decode(response, url).await
    }

    /// Create a new result. Returns the id ResultsDB assigned, when it reports one.
    pub async fn create_result(&self, result: &CreateResult) -> Result<Option<u64>, ResultsDbError> {
        let url = self.results_url();
        let body = AuthenticatedCreate {
            result,
            auth_token: self.auth_token.as_deref(),
        };
        let response = self.send(self.client.post(&url).json(&body), &url).await?;

        // Older deployments answer with an empty body; the id is informational only.
        let created: serde_json::Value = response.json().await.unwrap_or_default();
        Ok(created.get("id").and_then(serde_json::Value::as_u64))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<Response, ResultsDbError> {
        let response = request.send().await.map_err(|source| ResultsDbError::Http {
            url: url.to_string(),
            source,
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ResultsDbError::Status {
                url: url.to_string(),
                status,
                body,
            });
        }

        Ok(response)
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: Response,
    url: &str,
) -> Result<T, ResultsDbError> {
    response.json().await.map_err(|source| ResultsDbError::Decode {
        url: url.to_string(),
        source,
    })
}
