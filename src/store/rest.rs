//! PostgREST-style HTTP implementation of `DataStore`.
//!
//! Direct HTTP via reqwest against a hosted relational service. Error
//! bodies carry `{code, message}`; the codes this core cares about are
//! mapped to structured variants:
//! - `PGRST116` — single-row fetch matched zero or multiple rows
//! - `42P01`   — relation does not exist
//! - `23505`   — unique constraint violation

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::{DataStore, Query, StoreError};

// ============================================================================
// Retry policy
// ============================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

fn status_is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let ms = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    Duration::from_millis(ms)
}

/// Send a request, retrying transport errors and retryable statuses up to
/// the policy's attempt budget.
async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, StoreError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return Ok(request.send().await?);
        };

        match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                if status_is_retryable(status) && attempt < attempts {
                    let delay = backoff_delay(attempt, policy);
                    log::warn!(
                        "store retry {}/{} after status {} (sleep {:?})",
                        attempt,
                        attempts,
                        status,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                if (err.is_timeout() || err.is_connect()) && attempt < attempts {
                    let delay = backoff_delay(attempt, policy);
                    log::warn!(
                        "store retry {}/{} after transport error: {} (sleep {:?})",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(StoreError::Http(err));
            }
        }
    }

    Err(StoreError::Api {
        status: 0,
        message: "request exhausted retries".to_string(),
    })
}

// ============================================================================
// Client
// ============================================================================

#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    /// Service base URL, e.g. `https://project.example.co`.
    pub base_url: Url,
    /// Service API key, sent as both `apikey` and bearer token.
    pub api_key: String,
    pub retry: RetryPolicy,
}

pub struct RestStore {
    client: reqwest::Client,
    config: RestStoreConfig,
}

impl RestStore {
    pub fn new(config: RestStoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn table_url(&self, table: &str) -> Result<Url, StoreError> {
        self.config
            .base_url
            .join(&format!("rest/v1/{table}"))
            .map_err(|e| StoreError::Api {
                status: 0,
                message: format!("invalid table URL for {table}: {e}"),
            })
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    fn apply_query(mut request: reqwest::RequestBuilder, query: &Query) -> reqwest::RequestBuilder {
        for (column, value) in &query.filters {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Null => "null".to_string(),
                other => other.to_string(),
            };
            request = request.query(&[(column.as_str(), format!("eq.{rendered}"))]);
        }
        if let Some((column, descending)) = &query.order {
            let direction = if *descending { "desc" } else { "asc" };
            request = request.query(&[("order", format!("{column}.{direction}"))]);
        }
        if let Some(limit) = query.limit {
            request = request.query(&[("limit", limit.to_string())]);
        }
        request
    }

    async fn read_error(response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        map_api_error(status, &body)
    }

    async fn json_rows(response: reqwest::Response) -> Result<Vec<Value>, StoreError> {
        let body: Value = response.json().await?;
        match body {
            Value::Array(rows) => Ok(rows),
            other => Ok(vec![other]),
        }
    }
}

/// Map a PostgREST error body to a structured variant.
fn map_api_error(status: u16, body: &str) -> StoreError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let code = parsed["code"].as_str().unwrap_or("");
    let message = parsed["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());

    match code {
        "PGRST116" => {
            // "JSON object requested, multiple (or no) rows returned"
            if message.contains("0 rows") {
                StoreError::NoRows
            } else {
                StoreError::MultipleRows
            }
        }
        "42P01" => StoreError::RelationMissing(message),
        "23505" => StoreError::Conflict(message),
        _ => StoreError::Api { status, message },
    }
}

#[async_trait]
impl DataStore for RestStore {
    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        let request = self
            .request(reqwest::Method::POST, self.table_url(table)?)
            .header("Prefer", "return=representation")
            .json(&row);
        let response = send_with_retry(request, &self.config.retry).await?;
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        let mut rows = Self::json_rows(response).await?;
        rows.pop().ok_or(StoreError::NoRows)
    }

    async fn insert_many(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, StoreError> {
        let request = self
            .request(reqwest::Method::POST, self.table_url(table)?)
            .header("Prefer", "return=representation")
            .json(&rows);
        let response = send_with_retry(request, &self.config.retry).await?;
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        Self::json_rows(response).await
    }

    async fn select(&self, table: &str, query: Query) -> Result<Vec<Value>, StoreError> {
        let request = Self::apply_query(
            self.request(reqwest::Method::GET, self.table_url(table)?),
            &query,
        );
        let response = send_with_retry(request, &self.config.retry).await?;
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        Self::json_rows(response).await
    }

    async fn select_single(&self, table: &str, query: Query) -> Result<Value, StoreError> {
        let request = Self::apply_query(
            self.request(reqwest::Method::GET, self.table_url(table)?),
            &query,
        )
        .header("Accept", "application/vnd.pgrst.object+json");
        let response = send_with_retry(request, &self.config.retry).await?;
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn update(
        &self,
        table: &str,
        query: Query,
        patch: Value,
    ) -> Result<Vec<Value>, StoreError> {
        let request = Self::apply_query(
            self.request(reqwest::Method::PATCH, self.table_url(table)?),
            &query,
        )
        .header("Prefer", "return=representation")
        .json(&patch);
        let response = send_with_retry(request, &self.config.retry).await?;
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        Self::json_rows(response).await
    }

    async fn upsert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        let request = self
            .request(reqwest::Method::POST, self.table_url(table)?)
            .header("Prefer", "return=representation,resolution=merge-duplicates")
            .json(&row);
        let response = send_with_retry(request, &self.config.retry).await?;
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        let mut rows = Self::json_rows(response).await?;
        rows.pop().ok_or(StoreError::NoRows)
    }

    async fn delete(&self, table: &str, query: Query) -> Result<u64, StoreError> {
        let request = Self::apply_query(
            self.request(reqwest::Method::DELETE, self.table_url(table)?),
            &query,
        )
        .header("Prefer", "return=representation");
        let response = send_with_retry(request, &self.config.retry).await?;
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        Ok(Self::json_rows(response).await?.len() as u64)
    }
}
