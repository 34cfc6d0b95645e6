//! Transaction Categorizer Library
//!
//! A thin service around a remote transaction-classification API with a
//! deterministic keyword fallback: feature preprocessing, transformer
//! validation and the mock/remote prediction policy.

pub mod calendar;
pub mod config;
pub mod feature_builder;
pub mod http;
pub mod metrics;
pub mod models;
pub mod predictor;
pub mod text;
pub mod transformers;
pub mod types;

pub use config::AppConfig;
pub use feature_builder::{build_features, FeatureTable};
pub use models::{ArtifactStore, TabPfnClient};
pub use predictor::TransactionPredictor;
pub use types::{ResultEnvelope, Transaction};
