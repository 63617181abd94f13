//! REST chain client backed by `reqwest`.
//!
//! - `GET  {node}/transactions?start=&limit=` (404 → empty)
//! - `GET  {node}/` for the ledger info / head version
//! - `POST {node}/view` for read-only Move view functions
//!
//! Transient failures (connection errors, 429, 5xx) are retried in place with
//! exponential backoff before an error reaches the job. Other 4xx answers and
//! undecodable bodies are reported as [`IngestError::ChainData`].

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use chainingest_core::chain::ChainClient;
use chainingest_core::config::ChainConfig;
use chainingest_core::error::IngestError;
use chainingest_core::retry::{RetryConfig, RetryPolicy};
use chainingest_core::types::{Transaction, Version};

use crate::model::{transaction_from_json, LedgerInfo};

/// Configuration for [`AptosRestClient`].
#[derive(Debug, Clone)]
pub struct AptosClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for AptosClientConfig {
    fn default() -> Self {
        let chain = ChainConfig::default();
        Self {
            retry: chain.retry,
            request_timeout: Duration::from_millis(chain.request_timeout_ms),
        }
    }
}

#[derive(Debug)]
enum RestError {
    Transport(String),
    Status { code: u16, body: String },
    Decode(String),
}

impl RestError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { code, .. } => *code == 429 || *code >= 500,
            Self::Decode(_) => false,
        }
    }

    fn into_ingest(self, what: &str) -> IngestError {
        if self.is_retryable() {
            IngestError::Chain(format!("{what}: {self}"))
        } else {
            IngestError::ChainData(format!("{what}: {self}"))
        }
    }
}

impl std::fmt::Display for RestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Status { code, body } => write!(f, "HTTP {code}: {body}"),
            Self::Decode(e) => write!(f, "decode: {e}"),
        }
    }
}

#[derive(Serialize)]
struct ViewRequest<'a> {
    function: String,
    type_arguments: &'a [String],
    arguments: &'a [Value],
}

/// Client for a node's REST API.
pub struct AptosRestClient {
    base_url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl AptosRestClient {
    /// Create a client for `base_url` (e.g. `http://localhost:8080/v1`).
    pub fn new(base_url: impl Into<String>, config: AptosClientConfig) -> Result<Self, IngestError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| IngestError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            retry: RetryPolicy::new(config.retry),
        })
    }

    pub fn from_config(config: &ChainConfig) -> Result<Self, IngestError> {
        Self::new(
            config.node_url.clone(),
            AptosClientConfig {
                retry: config.retry.clone(),
                request_timeout: Duration::from_millis(config.request_timeout_ms),
            },
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /`: current ledger info.
    pub async fn ledger_info(&self) -> Result<LedgerInfo, IngestError> {
        let url = format!("{}/", self.base_url);
        let value = self
            .request("ledger_info", || self.http.get(&url))
            .await?
            .ok_or_else(|| IngestError::ChainData(format!("{url} returned 404")))?;
        serde_json::from_value(value)
            .map_err(|e| IngestError::ChainData(format!("malformed ledger info: {e}")))
    }

    /// Send with retry. `Ok(None)` means the node answered 404.
    async fn request<F>(&self, what: &str, build: F) -> Result<Option<Value>, IngestError>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(build()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            request = what,
                            url = %self.base_url,
                            "Retrying node request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(attempt, error = %e, request = what, url = %self.base_url, "Node request failed");
                        return Err(e.into_ingest(what));
                    }
                },
                Err(e) => return Err(e.into_ingest(what)),
            }
        }
    }

    async fn send_once(&self, req: reqwest::RequestBuilder) -> Result<Option<Value>, RestError> {
        let resp = req.send().await.map_err(|e| RestError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RestError::Status {
                code: status.as_u16(),
                body,
            });
        }

        resp.json::<Value>()
            .await
            .map(Some)
            .map_err(|e| RestError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChainClient for AptosRestClient {
    async fn transactions(&self, start: Version, limit: u16) -> Result<Vec<Transaction>, IngestError> {
        let url = format!("{}/transactions", self.base_url);
        let query = [("start", start.to_string()), ("limit", limit.to_string())];
        let Some(value) = self
            .request("transactions", || self.http.get(&url).query(&query))
            .await?
        else {
            return Ok(vec![]);
        };

        let Value::Array(items) = value else {
            return Err(IngestError::ChainData("transactions response is not an array".into()));
        };
        items.into_iter().map(transaction_from_json).collect()
    }

    async fn head_version(&self) -> Result<Version, IngestError> {
        Ok(self.ledger_info().await?.ledger_version)
    }

    async fn view(
        &self,
        module: &str,
        function: &str,
        type_arguments: Vec<String>,
        arguments: Vec<Value>,
    ) -> Result<Vec<Value>, IngestError> {
        let url = format!("{}/view", self.base_url);
        let body = ViewRequest {
            function: format!("{module}::{function}"),
            type_arguments: &type_arguments,
            arguments: &arguments,
        };
        let value = self
            .request("view", || self.http.post(&url).json(&body))
            .await?
            .ok_or_else(|| IngestError::ChainData(format!("view function {module}::{function} not found")))?;

        match value {
            Value::Array(items) => Ok(items),
            other => Err(IngestError::ChainData(format!("view returned non-array: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainingest_core::testing::{serve_http, SeenRequests};

    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, SeenRequests) {
        let (base, seen) = serve_http(responses).await;
        (format!("{base}/v1"), seen)
    }

    fn client(url: &str) -> AptosRestClient {
        AptosRestClient::new(
            url,
            AptosClientConfig {
                retry: RetryConfig {
                    max_retries: 2,
                    initial_backoff_ms: 1,
                    max_backoff_ms: 5,
                    multiplier: 2.0,
                    jitter_fraction: 0.0,
                },
                request_timeout: Duration::from_secs(5),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn transactions_builds_query_and_parses() {
        let body = r#"[{"type":"state_checkpoint_transaction","version":"42","timestamp":"1"}]"#;
        let (url, seen) = serve(vec![(200, body)]).await;
        let txs = client(&url).transactions(42, 1).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].version(), Some(42));
        assert!(seen.lock().unwrap()[0].starts_with("GET /v1/transactions?start=42&limit=1 "));
    }

    #[tokio::test]
    async fn transactions_404_is_empty() {
        let (url, _) = serve(vec![(404, r#"{"message":"not found"}"#)]).await;
        assert!(client(&url).transactions(7, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_error_is_retried() {
        let info = r#"{"chain_id":1,"epoch":"1","ledger_version":"900","oldest_ledger_version":"0","ledger_timestamp":"1"}"#;
        let (url, seen) = serve(vec![(503, "{}"), (200, info)]).await;
        assert_eq!(client(&url).head_version().await.unwrap(), 900);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let (url, seen) = serve(vec![(400, r#"{"message":"bad"}"#)]).await;
        let err = client(&url).head_version().await.unwrap_err();
        assert!(matches!(err, IngestError::ChainData(ref m) if m.contains("HTTP 400")));
        assert!(!err.is_retryable());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retries_exhausted_stay_retryable() {
        let (url, seen) = serve(vec![(503, "{}"), (503, "{}"), (503, "{}")]).await;
        let err = client(&url).head_version().await.unwrap_err();
        assert!(matches!(err, IngestError::Chain(_)));
        assert!(err.is_retryable());
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn malformed_transaction_body_is_terminal() {
        let body = r#"[{"type":"block_metadata_transaction","version":"5"}]"#;
        let (url, _) = serve(vec![(200, body)]).await;
        let err = client(&url).transactions(5, 1).await.unwrap_err();
        assert!(matches!(err, IngestError::ChainData(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn view_posts_function_path() {
        let (url, seen) = serve(vec![(200, r#"["1000"]"#)]).await;
        let out = client(&url)
            .view("0x1::coin", "balance", vec!["0x1::gas_coin::GasCoin".into()], vec![Value::from("0xabc")])
            .await
            .unwrap();
        assert_eq!(out, vec![Value::from("1000")]);
        let req = seen.lock().unwrap()[0].clone();
        assert!(req.starts_with("POST /v1/view "));
        assert!(req.contains(r#""function":"0x1::coin::balance""#));
    }
}
