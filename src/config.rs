//! Configuration management for the categorization service

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Where the model artifacts come from.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Read artifacts from `model_dir` on local disk
    #[default]
    Local,
    /// Download artifacts from a cloud storage bucket
    Gcs,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub predictor: PredictorConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Model artifact location.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Local directory holding the artifacts (local backend)
    pub model_dir: String,
    /// Bucket name (gcs backend)
    pub bucket: String,
    /// Fixed object prefix under which both artifacts live
    pub prefix: String,
    /// Blob/file name of the serialized model
    pub model_artifact: String,
    /// Blob/file name of the fitted transformer bundle
    pub transformers_artifact: String,
    /// Storage endpoint override, used by tests; empty means the public
    /// Google Cloud Storage endpoint
    pub endpoint: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            model_dir: "models/tabpfn-client".to_string(),
            bucket: String::new(),
            prefix: "models/tabpfn-client".to_string(),
            model_artifact: "tabpfn_model.json".to_string(),
            transformers_artifact: "transformers.json".to_string(),
            endpoint: String::new(),
        }
    }
}

/// Prediction policy switches.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Skip remote setup entirely and serve keyword/position predictions
    pub use_mock: bool,
    /// Fall back to mock mode when remote setup fails; with this off the
    /// initialization error propagates to the caller
    pub fallback_to_mock: bool,
    /// Call the remote classification service per batch instead of the
    /// keyword/amount heuristic (unresolved integration point, default off)
    pub remote_inference: bool,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            use_mock: false,
            fallback_to_mock: true,
            remote_inference: false,
        }
    }
}

/// Remote classification API access.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Credential for the classification service; also read from the
    /// legacy TABPFN_API_TOKEN environment variable
    pub token: Option<String>,
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: "https://api.priorlabs.ai".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    pub level: String,
    /// json or pretty
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `config/config.toml` (optional) with
    /// CATEGORIZER_* environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config")
    }

    /// Load configuration rooted at a specific file stem.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("CATEGORIZER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut loaded: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Legacy credential variable takes effect when nothing more
        // specific is configured.
        if loaded.api.token.is_none() {
            loaded.api.token = std::env::var("TABPFN_API_TOKEN").ok().filter(|t| !t.is_empty());
        }
        Ok(loaded)
    }
}
