//! Remote classification service client.
//!
//! The service itself is opaque; this module only pins down the
//! authentication handshake and the error-classification contract the
//! prediction policy depends on.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Typed remote-call failure, mapped by the predictor onto the structured
/// failure envelope. Rate limiting is its own variant so the retry hint
/// survives unmangled.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("API rate limit reached")]
    RateLimited { next_available_at: Option<String> },
    #[error("API error: {status}")]
    Api { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One per-transaction score from the remote service.
#[derive(Debug, Clone)]
pub struct RemoteScore {
    pub category: String,
    pub confidence: f64,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    rows: &'a [Vec<f64>],
}

#[derive(Deserialize)]
struct ClassifyResponse {
    predictions: Vec<RemotePrediction>,
}

#[derive(Deserialize)]
struct RemotePrediction {
    class: String,
    probability: f64,
}

/// Thin authenticated client for the classification API.
pub struct TabPfnClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl TabPfnClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into();
        info!(base_url = %base_url, "TabPFN client initialized");
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Classify a batch of feature rows.
    ///
    /// HTTP 429 becomes [`RemoteError::RateLimited`] with the body's
    /// `next_available_at` hint carried through unchanged; other
    /// non-success statuses become [`RemoteError::Api`] with status and
    /// body; anything else is [`RemoteError::Transport`].
    pub async fn classify(&self, rows: &[Vec<f64>]) -> Result<Vec<RemoteScore>, RemoteError> {
        let url = format!("{}/v1/classify", self.base_url);
        debug!(rows = rows.len(), url = %url, "Sending classification request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&ClassifyRequest { rows })
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::RateLimited {
                next_available_at: extract_retry_hint(&body),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ClassifyResponse = response.json().await?;
        Ok(parsed
            .predictions
            .into_iter()
            .map(|p| RemoteScore {
                category: p.class,
                confidence: p.probability,
            })
            .collect())
    }
}

fn extract_retry_hint(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("next_available_at")? {
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
