//! Model artifact retrieval from local disk or cloud object storage

use crate::config::{StorageBackend, StorageConfig};
use crate::transformers::TransformerBundle;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Failure to produce the artifact pair. Any variant is a hard
/// initialization failure for remote mode.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact {name} not found at {path}")]
    Missing { name: String, path: PathBuf },
    #[error("failed to read artifact {name}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to download artifact {name}: {reason}")]
    Download { name: String, reason: String },
    #[error("failed to decode artifact {name}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The two artifacts a remote-mode predictor needs.
#[derive(Debug)]
pub struct LoadedArtifacts {
    /// Serialized trained model, kept opaque; the remote service owns its
    /// interpretation
    pub model: Vec<u8>,
    pub transformers: TransformerBundle,
}

enum Backend {
    Local {
        dir: PathBuf,
    },
    Gcs {
        http: reqwest::Client,
        endpoint: String,
        bucket: String,
        prefix: String,
    },
}

/// Read-only source of the model artifact pair.
pub struct ArtifactStore {
    backend: Backend,
    model_artifact: String,
    transformers_artifact: String,
}

impl ArtifactStore {
    pub fn from_config(cfg: &StorageConfig) -> Self {
        let backend = match cfg.backend {
            StorageBackend::Local => Backend::Local {
                dir: PathBuf::from(&cfg.model_dir),
            },
            StorageBackend::Gcs => Backend::Gcs {
                http: reqwest::Client::new(),
                endpoint: if cfg.endpoint.is_empty() {
                    DEFAULT_GCS_ENDPOINT.to_string()
                } else {
                    cfg.endpoint.clone()
                },
                bucket: cfg.bucket.clone(),
                prefix: cfg.prefix.clone(),
            },
        };
        Self {
            backend,
            model_artifact: cfg.model_artifact.clone(),
            transformers_artifact: cfg.transformers_artifact.clone(),
        }
    }

    /// Load both artifacts. Downloaded blobs are staged in a temporary
    /// directory that is removed on every exit path, including failures.
    pub async fn load(&self) -> Result<LoadedArtifacts, ArtifactError> {
        match &self.backend {
            Backend::Local { dir } => {
                info!(dir = %dir.display(), "Loading model artifacts from local storage");
                let model = read_artifact(&dir.join(&self.model_artifact), &self.model_artifact)?;
                let raw = read_artifact(
                    &dir.join(&self.transformers_artifact),
                    &self.transformers_artifact,
                )?;
                Ok(LoadedArtifacts {
                    model,
                    transformers: decode_transformers(&raw, &self.transformers_artifact)?,
                })
            }
            Backend::Gcs {
                http,
                endpoint,
                bucket,
                prefix,
            } => {
                // TempDir cleans up unconditionally when dropped, so a
                // failed download cannot leave staged files behind.
                let staging = tempfile::tempdir().map_err(|source| ArtifactError::Io {
                    name: "staging".to_string(),
                    source,
                })?;
                info!(
                    bucket = %bucket,
                    prefix = %prefix,
                    staging = %staging.path().display(),
                    "Downloading model artifacts from object storage"
                );

                let model_path = staging.path().join(&self.model_artifact);
                let transformers_path = staging.path().join(&self.transformers_artifact);
                download_blob(
                    http,
                    endpoint,
                    bucket,
                    prefix,
                    &self.model_artifact,
                    &model_path,
                )
                .await?;
                download_blob(
                    http,
                    endpoint,
                    bucket,
                    prefix,
                    &self.transformers_artifact,
                    &transformers_path,
                )
                .await?;

                let model = read_artifact(&model_path, &self.model_artifact)?;
                let raw = read_artifact(&transformers_path, &self.transformers_artifact)?;
                Ok(LoadedArtifacts {
                    model,
                    transformers: decode_transformers(&raw, &self.transformers_artifact)?,
                })
            }
        }
    }
}

fn read_artifact(path: &Path, name: &str) -> Result<Vec<u8>, ArtifactError> {
    if !path.exists() {
        return Err(ArtifactError::Missing {
            name: name.to_string(),
            path: path.to_path_buf(),
        });
    }
    std::fs::read(path).map_err(|source| ArtifactError::Io {
        name: name.to_string(),
        source,
    })
}

fn decode_transformers(raw: &[u8], name: &str) -> Result<TransformerBundle, ArtifactError> {
    serde_json::from_slice(raw).map_err(|source| ArtifactError::Decode {
        name: name.to_string(),
        source,
    })
}

async fn download_blob(
    http: &reqwest::Client,
    endpoint: &str,
    bucket: &str,
    prefix: &str,
    name: &str,
    dest: &Path,
) -> Result<(), ArtifactError> {
    // Object paths always use forward slashes
    let url = format!("{endpoint}/{bucket}/{prefix}/{name}");
    let response = http
        .get(&url)
        .send()
        .await
        .map_err(|e| ArtifactError::Download {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(ArtifactError::Download {
            name: name.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(|e| ArtifactError::Download {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    std::fs::write(dest, &bytes).map_err(|source| ArtifactError::Io {
        name: name.to_string(),
        source,
    })?;

    info!(blob = %name, bytes = bytes.len(), "Downloaded artifact");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformers;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TRANSFORMERS_JSON: &str = r#"{
        "scaler": {"kind": "standard_scaler", "mean": [0.0, 0.0], "scale": [1.0, 1.0]},
        "tfidf": {"kind": "tfidf_vectorizer", "vocabulary": {"loyer": 0}, "idf": [1.0]},
        "pca": {"kind": "pca", "mean": [0.0], "components": [[1.0]]}
    }"#;

    fn local_config(dir: &Path) -> StorageConfig {
        StorageConfig {
            backend: StorageBackend::Local,
            model_dir: dir.display().to_string(),
            ..StorageConfig::default()
        }
    }

    #[tokio::test]
    async fn test_local_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tabpfn_model.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("transformers.json"), TRANSFORMERS_JSON).unwrap();

        let store = ArtifactStore::from_config(&local_config(dir.path()));
        let artifacts = store.load().await.unwrap();
        assert_eq!(artifacts.model, b"{}");
        assert!(transformers::validate(Some(&artifacts.transformers)));
    }

    #[tokio::test]
    async fn test_local_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tabpfn_model.json"), b"{}").unwrap();

        let store = ArtifactStore::from_config(&local_config(dir.path()));
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, ArtifactError::Missing { name, .. } if name == "transformers.json"));
    }

    #[tokio::test]
    async fn test_gcs_download_and_staging() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models/models/tabpfn-client/tabpfn_model.json"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"model-bytes".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/models/models/tabpfn-client/transformers.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TRANSFORMERS_JSON))
            .mount(&server)
            .await;

        let cfg = StorageConfig {
            backend: StorageBackend::Gcs,
            bucket: "models".to_string(),
            endpoint: server.uri(),
            ..StorageConfig::default()
        };
        let artifacts = ArtifactStore::from_config(&cfg).load().await.unwrap();
        assert_eq!(artifacts.model, b"model-bytes");
        assert!(transformers::validate(Some(&artifacts.transformers)));
    }

    #[tokio::test]
    async fn test_gcs_missing_blob_is_hard_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let cfg = StorageConfig {
            backend: StorageBackend::Gcs,
            bucket: "models".to_string(),
            endpoint: server.uri(),
            ..StorageConfig::default()
        };
        let err = ArtifactStore::from_config(&cfg).load().await.unwrap_err();
        assert!(matches!(err, ArtifactError::Download { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_transformers_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tabpfn_model.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("transformers.json"), b"not-json").unwrap();

        let store = ArtifactStore::from_config(&local_config(dir.path()));
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, ArtifactError::Decode { .. }));
    }
}
