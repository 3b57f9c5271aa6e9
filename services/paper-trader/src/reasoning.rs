//! Reasoning Gateway Client
//!
//! HTTP client for the external service that turns market context into a
//! trading decision. The service is free to be an LLM, a rules engine or a
//! human; this side only sees JSON in and JSON out.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::decision::DecisionError;
use crate::types::DecisionRequest;

/// Default gateway URL
pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8090";

/// Default timeout for decision requests (30 seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Failure of one decision round-trip
#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("reasoning request timed out after {0:?}")]
    Timeout(Duration),

    #[error("reasoning request failed: {0}")]
    Transport(String),

    #[error("reasoning service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("reasoning response was not valid JSON: {0}")]
    Malformed(String),

    #[error("invalid decision: {0}")]
    Invalid(#[from] DecisionError),
}

/// Something that can be asked for a trading decision.
///
/// Returns the raw payload; callers validate it with
/// [`crate::decision::parse_decision`].
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn request_decision(&self, request: &DecisionRequest) -> Result<Value, ReasoningError>;
}

/// Reasoning gateway reached over HTTP
pub struct GatewayClient {
    /// Gateway base URL
    gateway_url: String,
    /// HTTP client with connection pooling
    http_client: Client,
    /// Request timeout
    timeout: Duration,
}

impl GatewayClient {
    pub fn new(gateway_url: impl Into<String>, timeout: Duration) -> Result<Self, ReasoningError> {
        let gateway_url = gateway_url.into().trim_end_matches('/').to_string();

        let http_client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| ReasoningError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "Reasoning gateway client initialized: url={}, timeout={:?}",
            gateway_url, timeout
        );

        Ok(Self {
            gateway_url,
            http_client,
            timeout,
        })
    }

    /// Get the gateway URL
    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }
}

#[async_trait]
impl ReasoningService for GatewayClient {
    /// POST /v1/decide with the DecisionRequest body
    async fn request_decision(&self, request: &DecisionRequest) -> Result<Value, ReasoningError> {
        let url = format!("{}/v1/decide", self.gateway_url);

        debug!(
            "Requesting decision: risk={}, cash={:.2}, asset={:.6} {}",
            request.risk_level, request.cash, request.asset_amount, request.asset_name
        );

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ReasoningError::Timeout(self.timeout)
                } else if e.is_connect() {
                    ReasoningError::Transport(format!(
                        "Failed to connect to reasoning gateway at {}: {}",
                        url, e
                    ))
                } else {
                    ReasoningError::Transport(e.to_string())
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Reasoning gateway returned error: status={}, body={}", status, body);
            return Err(ReasoningError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;

        serde_json::from_str(body.trim()).map_err(|e| ReasoningError::Malformed(e.to_string()))
    }
}
