//! PostgREST client.
//!
//! Thin typed wrapper over the Supabase REST surface:
//! - Service-role auth headers on every request
//! - HTTP client tuning (pooling, timeouts)
//! - Exponential backoff with jitter
//! - Observability (tracing spans, metrics)

use std::time::{Duration, Instant};

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::metrics::record_request;
use crate::retry::{with_retry, RetryConfig};

// =============================================================================
// Configuration
// =============================================================================

/// Store client configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of the Supabase project (no trailing slash)
    pub base_url: String,
    /// Service-role key; bypasses row-level security
    pub service_key: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        let base_url = std::env::var("SUPABASE_URL")
            .map_err(|_| StoreError::config_error("SUPABASE_URL must be set"))?;
        if base_url.is_empty() {
            return Err(StoreError::config_error("SUPABASE_URL cannot be empty"));
        }

        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .map_err(|_| StoreError::config_error("SUPABASE_SERVICE_ROLE_KEY must be set"))?;

        let connect_timeout_secs: u64 = std::env::var("STORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
        })
    }
}

// =============================================================================
// Client
// =============================================================================

/// PostgREST client shared by the job, clip and credit repositories.
#[derive(Clone)]
pub struct StoreClient {
    http: Client,
    config: StoreConfig,
    rest_url: String,
}

impl StoreClient {
    /// Create a new store client.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("dreamlab-store/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StoreError::Network)?;

        let rest_url = format!("{}/rest/v1", config.base_url);

        Ok(Self {
            http,
            config,
            rest_url,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(StoreConfig::from_env()?)
    }

    /// GET rows matching a PostgREST path+query, e.g.
    /// `jobs?id=eq.42&select=*`.
    pub async fn select<T: DeserializeOwned>(
        &self,
        operation: &str,
        path_and_query: &str,
    ) -> StoreResult<Vec<T>> {
        let url = format!("{}/{}", self.rest_url, path_and_query);
        self.execute(operation, || {
            self.http
                .request(Method::GET, &url)
                .header("apikey", &self.config.service_key)
                .bearer_auth(&self.config.service_key)
        })
        .await
    }

    /// POST rows into a table; returns the inserted representation.
    pub async fn insert<T: DeserializeOwned>(
        &self,
        operation: &str,
        table: &str,
        body: &impl Serialize,
    ) -> StoreResult<Vec<T>> {
        let url = format!("{}/{}", self.rest_url, table);
        let payload = serde_json::to_value(body)?;
        self.execute(operation, || {
            self.http
                .request(Method::POST, &url)
                .header("apikey", &self.config.service_key)
                .bearer_auth(&self.config.service_key)
                .header("Prefer", "return=representation")
                .json(&payload)
        })
        .await
    }

    /// PATCH rows matching a path+query; returns the updated rows.
    ///
    /// PostgREST applies the patch to every matching row and returns
    /// them, so an empty result means the filter matched nothing. That
    /// is how conditional claims (e.g. refund guards) report a lost
    /// race rather than erroring.
    pub async fn update<T: DeserializeOwned>(
        &self,
        operation: &str,
        path_and_query: &str,
        body: &impl Serialize,
    ) -> StoreResult<Vec<T>> {
        let url = format!("{}/{}", self.rest_url, path_and_query);
        let payload = serde_json::to_value(body)?;
        self.execute(operation, || {
            self.http
                .request(Method::PATCH, &url)
                .header("apikey", &self.config.service_key)
                .bearer_auth(&self.config.service_key)
                .header("Prefer", "return=representation")
                .json(&payload)
        })
        .await
    }

    /// Call a Postgres function through `/rpc/{name}`.
    pub async fn rpc<T: DeserializeOwned>(
        &self,
        operation: &str,
        function: &str,
        args: &impl Serialize,
    ) -> StoreResult<T> {
        let url = format!("{}/rpc/{}", self.rest_url, function);
        let payload = serde_json::to_value(args)?;
        self.execute(operation, || {
            self.http
                .request(Method::POST, &url)
                .header("apikey", &self.config.service_key)
                .bearer_auth(&self.config.service_key)
                .json(&payload)
        })
        .await
    }

    async fn execute<T, F>(&self, operation: &str, build: F) -> StoreResult<T>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        with_retry(&self.config.retry, operation, || async {
            let start = Instant::now();
            let response = build().send().await?;
            let status = response.status();
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

            record_request(operation, status.as_u16(), latency_ms);
            debug!(operation = %operation, status = status.as_u16(), "store request");

            if status.is_success() {
                let body = response.text().await?;
                // PostgREST returns an empty body on 204
                if body.is_empty() {
                    return serde_json::from_str("null").map_err(StoreError::Json);
                }
                return serde_json::from_str(&body)
                    .map_err(|e| StoreError::invalid_response(format!("{e}: {body}")));
            }

            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            let body = response.text().await.unwrap_or_default();

            Err(Self::error_for_status(status, body, retry_after_ms))
        })
        .await
    }

    fn error_for_status(status: StatusCode, body: String, retry_after_ms: Option<u64>) -> StoreError {
        match status {
            StatusCode::NOT_FOUND => StoreError::not_found(body),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::PermissionDenied(body),
            StatusCode::CONFLICT => StoreError::Conflict(body),
            StatusCode::TOO_MANY_REQUESTS => {
                StoreError::RateLimited(retry_after_ms.unwrap_or(1000))
            }
            s if s.is_server_error() => StoreError::ServerError {
                status: s.as_u16(),
                body,
            },
            s => StoreError::request_failed(format!("HTTP {}: {}", s.as_u16(), body)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> StoreClient {
        StoreClient::new(StoreConfig {
            base_url: base_url.to_string(),
            service_key: "test-key".to_string(),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(1),
            retry: RetryConfig {
                max_retries: 0,
                base_delay_ms: 1,
                max_delay_ms: 1,
            },
        })
        .unwrap()
    }

    #[tokio::test]
    async fn select_sends_service_role_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/jobs"))
            .and(header("apikey", "test-key"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let rows: Vec<serde_json::Value> = client.select("get_jobs", "jobs").await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn update_returns_empty_when_filter_misses() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let rows: Vec<serde_json::Value> = client
            .update("claim", "jobs?id=eq.1&refunded=eq.false", &json!({"refunded": true}))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn server_errors_are_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let result: StoreResult<Vec<serde_json::Value>> = client.select("get_jobs", "jobs").await;
        let err = result.unwrap_err();
        assert!(err.is_retryable());
    }
}
