//! Prediction policy: mode selection, per-transaction categorization and
//! uniform result shaping.

use crate::config::{ApiConfig, PredictorConfig};
use crate::feature_builder::{self, FeatureError, FeatureTable};
use crate::models::artifacts::{ArtifactError, ArtifactStore};
use crate::models::tabpfn::{RemoteError, TabPfnClient};
use crate::transformers::{self, TransformerBundle};
use crate::types::prediction::{
    EnvelopeMode, ErrorDetail, ErrorKind, PredictionResult, ResultEnvelope,
};
use crate::types::transaction::Transaction;
use thiserror::Error;
use tracing::{error, info, warn};

/// Fixed label set of the fallback path; also the cyclic default when no
/// keyword group matches.
const MOCK_CATEGORIES: [&str; 5] = [
    "Transport",
    "Logement",
    "Alimentation",
    "Loisirs",
    "Santé",
];

/// Keyword groups tested in priority order; first matching group wins.
const MOCK_KEYWORD_GROUPS: [(&str, &[&str]); 5] = [
    ("Transport", &["carte", "chargemap", "transport", "sncf", "uber"]),
    ("Logement", &["bricolage", "loyer", "edf", "eau"]),
    ("Alimentation", &["carrefour", "auchan", "leclerc", "monoprix"]),
    ("Loisirs", &["cinema", "fnac", "spotify"]),
    ("Santé", &["pharmacie", "medecin", "mutuelle"]),
];

const MOCK_CONFIDENCE: f64 = 0.95;

/// Ordered keyword table of the primary path; first match wins.
const REMOTE_KEYWORDS: [(&str, &str); 16] = [
    ("supermarket", "Groceries"),
    ("grocery", "Groceries"),
    ("food", "Groceries"),
    ("uber", "Transportation"),
    ("taxi", "Transportation"),
    ("transport", "Transportation"),
    ("travel", "Transportation"),
    ("salary", "Income"),
    ("deposit", "Income"),
    ("payroll", "Income"),
    ("restaurant", "Dining"),
    ("cafe", "Dining"),
    ("coffee", "Dining"),
    ("rent", "Housing"),
    ("mortgage", "Housing"),
    ("utilities", "Housing"),
];

const REMOTE_KEYWORD_CONFIDENCE: f64 = 0.90;
const REMOTE_CREDIT_CONFIDENCE: f64 = 0.85;
const REMOTE_DEFAULT_CONFIDENCE: f64 = 0.65;

/// Why remote setup could not complete.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("classification API token is not configured")]
    MissingCredential,
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Typed initialization result surfaced to the constructing caller.
#[derive(Debug)]
pub enum InitOutcome {
    /// Remote mode is up
    Remote,
    /// Mock mode was requested explicitly
    Mock,
    /// Remote setup failed and the configured fallback engaged
    FellBack { reason: InitError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Mock,
    Remote,
}

struct ReadyState {
    mode: OperatingMode,
    client: Option<TabPfnClient>,
    transformers: Option<TransformerBundle>,
}

enum Lifecycle {
    Uninitialized,
    Ready(ReadyState),
}

/// Batch-level failures of the primary path.
#[derive(Debug, Error)]
enum PredictError {
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("remote service returned {actual} scores for {expected} transactions")]
    ShapeMismatch { expected: usize, actual: usize },
}

impl PredictError {
    fn into_detail(self) -> ErrorDetail {
        match self {
            PredictError::Feature(e) => ErrorDetail::new(ErrorKind::InvalidInput, e.to_string()),
            PredictError::Remote(RemoteError::RateLimited { next_available_at }) => {
                ErrorDetail::new(ErrorKind::RateLimitExceeded, "API rate limit reached")
                    .with_next_available_at(next_available_at)
            }
            PredictError::Remote(RemoteError::Api { status, body }) => {
                ErrorDetail::new(ErrorKind::ApiError, format!("API error: {status}"))
                    .with_details(body)
            }
            PredictError::Remote(RemoteError::Transport(e)) => {
                ErrorDetail::new(ErrorKind::UnknownError, e.to_string())
            }
            other => ErrorDetail::new(ErrorKind::UnknownError, other.to_string()),
        }
    }
}

/// Transaction category predictor.
///
/// Explicitly constructed and initialized once by the hosting entry point,
/// then shared read-only across requests: Uninitialized → Ready, with Ready
/// permanently gated into mock or remote mode.
pub struct TransactionPredictor {
    settings: PredictorConfig,
    api: ApiConfig,
    store: Option<ArtifactStore>,
    state: Lifecycle,
}

impl TransactionPredictor {
    pub fn new(settings: PredictorConfig, api: ApiConfig) -> Self {
        info!(
            use_mock = settings.use_mock,
            fallback_to_mock = settings.fallback_to_mock,
            "Constructing predictor"
        );
        Self {
            settings,
            api,
            store: None,
            state: Lifecycle::Uninitialized,
        }
    }

    /// Attach an artifact store; without one, remote setup runs in pure
    /// API-client mode and loads no local model files.
    pub fn with_store(mut self, store: ArtifactStore) -> Self {
        self.store = Some(store);
        self
    }

    /// The operating mode, once initialized.
    pub fn mode(&self) -> Option<OperatingMode> {
        match &self.state {
            Lifecycle::Ready(state) => Some(state.mode),
            Lifecycle::Uninitialized => None,
        }
    }

    /// Select the operating mode. Idempotent: a second call reports the
    /// mode already chosen.
    ///
    /// Remote setup needs the API credential and, when a store is
    /// attached, both model artifacts. Any failure either engages the
    /// mock fallback (default) or, with `fallback_to_mock` off,
    /// propagates to the caller.
    pub async fn initialize(&mut self) -> Result<InitOutcome, InitError> {
        if let Lifecycle::Ready(state) = &self.state {
            return Ok(match state.mode {
                OperatingMode::Mock => InitOutcome::Mock,
                OperatingMode::Remote => InitOutcome::Remote,
            });
        }

        if self.settings.use_mock {
            info!("Initializing mock predictor");
            self.state = Lifecycle::Ready(ReadyState {
                mode: OperatingMode::Mock,
                client: None,
                transformers: None,
            });
            return Ok(InitOutcome::Mock);
        }

        match self.try_remote_setup().await {
            Ok(state) => {
                info!("TabPFN client initialization completed");
                self.state = Lifecycle::Ready(state);
                Ok(InitOutcome::Remote)
            }
            Err(reason) if self.settings.fallback_to_mock => {
                warn!(error = %reason, "Remote setup failed, falling back to mock predictor");
                self.state = Lifecycle::Ready(ReadyState {
                    mode: OperatingMode::Mock,
                    client: None,
                    transformers: None,
                });
                Ok(InitOutcome::FellBack { reason })
            }
            Err(reason) => Err(reason),
        }
    }

    async fn try_remote_setup(&self) -> Result<ReadyState, InitError> {
        let token = self
            .api
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(InitError::MissingCredential)?;
        let client = TabPfnClient::new(self.api.base_url.clone(), token);

        let transformers = match &self.store {
            Some(store) => {
                let artifacts = store.load().await?;
                if transformers::validate(Some(&artifacts.transformers)) {
                    Some(artifacts.transformers)
                } else {
                    warn!("Transformer validation failed. Proceeding without transformers.");
                    None
                }
            }
            None => {
                info!("TabPFN API client mode - no local model files needed");
                None
            }
        };

        Ok(ReadyState {
            mode: OperatingMode::Remote,
            client: Some(client),
            transformers,
        })
    }

    /// Predict categories for a batch. Always returns a structured
    /// envelope; no path panics or propagates an unhandled fault.
    pub async fn predict(&self, transactions: &[Transaction]) -> ResultEnvelope {
        let state = match &self.state {
            Lifecycle::Ready(state) => state,
            Lifecycle::Uninitialized => {
                error!("predict called on an uninitialized predictor");
                return ResultEnvelope::failure(ErrorDetail::new(
                    ErrorKind::UnknownError,
                    "Predictor is not initialized",
                ));
            }
        };

        match state.mode {
            OperatingMode::Mock => {
                ResultEnvelope::success(mock_predict(transactions), EnvelopeMode::Mock)
            }
            OperatingMode::Remote => match self.remote_predict(state, transactions).await {
                Ok(results) => ResultEnvelope::success(results, EnvelopeMode::Tabpfn),
                Err(e) => {
                    error!(error = %e, "Prediction failed");
                    ResultEnvelope::failure(e.into_detail())
                }
            },
        }
    }

    /// Primary path: derive features (the only path that exercises the
    /// feature builder), then categorize. Per-transaction remote inference
    /// stays behind the `remote_inference` switch; the keyword/amount
    /// heuristic is the shipped behavior without it.
    async fn remote_predict(
        &self,
        state: &ReadyState,
        transactions: &[Transaction],
    ) -> Result<Vec<PredictionResult>, PredictError> {
        let features = feature_builder::build_features(
            transactions,
            state.transformers.as_ref(),
            false,
        )?;

        if self.settings.remote_inference {
            if let Some(client) = &state.client {
                let scores = client.classify(&features.to_matrix()).await?;
                if scores.len() != transactions.len() {
                    return Err(PredictError::ShapeMismatch {
                        expected: transactions.len(),
                        actual: scores.len(),
                    });
                }
                return Ok(transactions
                    .iter()
                    .enumerate()
                    .zip(scores)
                    .map(|((index, tx), score)| {
                        shape_result(index, tx, score.category, score.confidence)
                    })
                    .collect());
            }
        }

        Ok(heuristic_predict(transactions, &features))
    }
}

/// Fallback path: keyword groups in priority order, then a deterministic
/// position-based default. Confidence is fixed regardless of match quality.
fn mock_predict(transactions: &[Transaction]) -> Vec<PredictionResult> {
    transactions
        .iter()
        .enumerate()
        .map(|(index, tx)| {
            let desc = tx.description_or_empty().to_lowercase();
            let category = MOCK_KEYWORD_GROUPS
                .iter()
                .find(|(_, words)| words.iter().any(|word| desc.contains(word)))
                .map(|(category, _)| *category)
                .unwrap_or(MOCK_CATEGORIES[index % MOCK_CATEGORIES.len()]);
            shape_result(index, tx, category.to_string(), MOCK_CONFIDENCE)
        })
        .collect()
}

fn heuristic_predict(
    transactions: &[Transaction],
    features: &FeatureTable,
) -> Vec<PredictionResult> {
    transactions
        .iter()
        .enumerate()
        .map(|(index, tx)| {
            let desc = tx.description_or_empty().to_lowercase();
            let matched = REMOTE_KEYWORDS
                .iter()
                .find(|(keyword, _)| desc.contains(keyword));

            let (category, confidence) = match matched {
                Some((_, category)) => (*category, REMOTE_KEYWORD_CONFIDENCE),
                // is_credit was derived from the raw amount, before any scaling
                None if features.rows[index].is_credit == 1 => {
                    ("Income", REMOTE_CREDIT_CONFIDENCE)
                }
                None => ("Other", REMOTE_DEFAULT_CONFIDENCE),
            };
            shape_result(index, tx, category.to_string(), confidence)
        })
        .collect()
}

fn shape_result(
    index: usize,
    tx: &Transaction,
    category: String,
    confidence: f64,
) -> PredictionResult {
    PredictionResult {
        transaction_id: tx.id.clone().unwrap_or_else(|| index.to_string()),
        description: tx.description_or_empty().to_string(),
        predicted_category: category,
        confidence,
    }
}
