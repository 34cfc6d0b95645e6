//! Prediction result and response envelope data structures

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Predicted category for a single transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Caller-supplied `id`, or the positional index when absent
    pub transaction_id: String,

    /// Original description, verbatim (pre-normalization), empty when absent
    pub description: String,

    /// Category label from the active mode's label set
    pub predicted_category: String,

    /// Confidence in [0, 1]
    pub confidence: f64,
}

/// Which prediction path produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeMode {
    Mock,
    Tabpfn,
    Error,
}

/// Machine-readable error classification, serialized in the legacy
/// SCREAMING_SNAKE form consumers already parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    RateLimitExceeded,
    ApiError,
    UnknownError,
    InvalidInput,
}

/// One batch-level (or per-item) error descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub error: ErrorKind,
    pub message: String,

    /// Retry hint extracted from a rate-limit response, carried unchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_available_at: Option<String>,

    /// Response body or other supporting detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(error: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
            next_available_at: None,
            details: None,
        }
    }

    pub fn with_next_available_at(mut self, at: Option<String>) -> Self {
        self.next_available_at = at;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Uniform response wrapper: one per request, success or failure.
///
/// On success `results` preserves the order and cardinality of the input
/// batch; on failure `results` is empty and `errors` holds one entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub success: bool,
    pub results: Vec<PredictionResult>,
    pub errors: Vec<ErrorDetail>,
    pub total_processed: usize,
    pub total_errors: usize,
    pub request_id: String,
    pub mode: EnvelopeMode,
}

impl ResultEnvelope {
    pub fn success(results: Vec<PredictionResult>, mode: EnvelopeMode) -> Self {
        let total_processed = results.len();
        Self {
            success: true,
            results,
            errors: Vec::new(),
            total_processed,
            total_errors: 0,
            request_id: request_id(),
            mode,
        }
    }

    pub fn failure(error: ErrorDetail) -> Self {
        Self {
            success: false,
            results: Vec::new(),
            errors: vec![error],
            total_processed: 0,
            total_errors: 1,
            request_id: request_id(),
            mode: EnvelopeMode::Error,
        }
    }
}

/// Time-derived correlation token, millisecond resolution.
pub fn request_id() -> String {
    Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string()
}
