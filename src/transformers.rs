//! Fitted feature transformers: scaler, text vectorizer, PCA reducer
//!
//! The bundle is fitted upstream by the training pipeline and shipped as a
//! JSON artifact. It is read-only for the lifetime of a predictor instance;
//! nothing here mutates it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{error, warn};

/// One fitted transformer, tagged by kind.
///
/// The `kind` tag is part of the artifact contract: validation checks it by
/// equality instead of probing a live object's runtime type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transformer {
    /// Standardizes `amount` and `absolute_amount`, in that column order
    StandardScaler { mean: Vec<f64>, scale: Vec<f64> },

    /// Maps normalized description text to a weighted term vector
    TfidfVectorizer {
        vocabulary: HashMap<String, usize>,
        idf: Vec<f64>,
    },

    /// Projects the term vector down to the embedding dimensions
    Pca {
        mean: Vec<f64>,
        components: Vec<Vec<f64>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformerKind {
    StandardScaler,
    TfidfVectorizer,
    Pca,
}

impl Transformer {
    pub fn kind(&self) -> TransformerKind {
        match self {
            Transformer::StandardScaler { .. } => TransformerKind::StandardScaler,
            Transformer::TfidfVectorizer { .. } => TransformerKind::TfidfVectorizer,
            Transformer::Pca { .. } => TransformerKind::Pca,
        }
    }
}

/// Shape mismatches between the fitted artifact and the data it is applied
/// to. These abort the batch; they are distinct from validation failures,
/// which merely disable the bundle.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    #[error("scaler expects {expected} feature columns, artifact has {actual}")]
    ScalerShape { expected: usize, actual: usize },
    #[error("tf-idf vocabulary index {index} out of bounds for {len} idf weights")]
    VocabularyShape { index: usize, len: usize },
    #[error("pca expects {expected} input dimensions, got {actual}")]
    PcaShape { expected: usize, actual: usize },
}

/// Named transformer entries, deserialized straight from the artifact:
/// `{"scaler": {...}, "tfidf": {...}, "pca": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformerBundle {
    entries: BTreeMap<String, Transformer>,
}

const REQUIRED: [(&str, TransformerKind); 3] = [
    ("scaler", TransformerKind::StandardScaler),
    ("tfidf", TransformerKind::TfidfVectorizer),
    ("pca", TransformerKind::Pca),
];

impl TransformerBundle {
    pub fn new(entries: BTreeMap<String, Transformer>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&Transformer> {
        self.entries.get(name)
    }

    /// True when both text transformers (`tfidf` and `pca`) are present.
    pub fn has_text_transformers(&self) -> bool {
        self.entries.contains_key("tfidf") && self.entries.contains_key("pca")
    }

    /// Standardize the `[amount, absolute_amount]` pair.
    ///
    /// `Ok(None)` when no scaler entry is present.
    pub fn scale_amounts(
        &self,
        amount: f64,
        absolute: f64,
    ) -> Result<Option<(f64, f64)>, TransformError> {
        let Some(Transformer::StandardScaler { mean, scale }) = self.get("scaler") else {
            return Ok(None);
        };
        if mean.len() != 2 || scale.len() != 2 {
            return Err(TransformError::ScalerShape {
                expected: 2,
                actual: mean.len().min(scale.len()),
            });
        }
        Ok(Some((
            (amount - mean[0]) / scale[0],
            (absolute - mean[1]) / scale[1],
        )))
    }

    /// Embed normalized description text: tf-idf then PCA projection.
    ///
    /// `Ok(None)` unless both text transformers are present.
    pub fn embed(&self, text: &str) -> Result<Option<Vec<f64>>, TransformError> {
        let (Some(Transformer::TfidfVectorizer { vocabulary, idf }), Some(Transformer::Pca { mean, components })) =
            (self.get("tfidf"), self.get("pca"))
        else {
            return Ok(None);
        };

        let term_vector = tfidf_vector(vocabulary, idf, text)?;
        pca_project(mean, components, &term_vector).map(Some)
    }

    fn validate_entries(&self) -> bool {
        if self.entries.len() != REQUIRED.len() {
            error!(
                entries = self.entries.len(),
                "Transformer bundle must contain exactly the scaler, tfidf and pca entries"
            );
            return false;
        }

        for (name, expected) in REQUIRED {
            match self.entries.get(name) {
                None => {
                    error!(transformer = name, "Missing required transformer");
                    return false;
                }
                Some(entry) if entry.kind() != expected => {
                    error!(
                        transformer = name,
                        kind = ?entry.kind(),
                        "Invalid transformer kind"
                    );
                    return false;
                }
                Some(_) => {}
            }
        }
        true
    }
}

/// Check an externally supplied bundle against the expected shape contract.
///
/// An absent bundle is valid-but-absent: the result is `false`, meaning "do
/// not use transformers", never an error. A present bundle must carry
/// exactly the three named entries with matching kind tags.
pub fn validate(bundle: Option<&TransformerBundle>) -> bool {
    let Some(bundle) = bundle else {
        warn!("No transformers provided. Features will not be scaled or embedded.");
        return false;
    };
    bundle.validate_entries()
}

fn tfidf_vector(
    vocabulary: &HashMap<String, usize>,
    idf: &[f64],
    text: &str,
) -> Result<Vec<f64>, TransformError> {
    let mut counts = vec![0.0f64; idf.len()];
    for token in text.split_whitespace() {
        if let Some(&index) = vocabulary.get(token) {
            if index >= idf.len() {
                return Err(TransformError::VocabularyShape {
                    index,
                    len: idf.len(),
                });
            }
            counts[index] += 1.0;
        }
    }

    let mut weighted: Vec<f64> = counts
        .iter()
        .zip(idf)
        .map(|(count, weight)| count * weight)
        .collect();

    // L2-normalize, matching the fitted vectorizer's norm
    let norm = weighted.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for value in &mut weighted {
            *value /= norm;
        }
    }
    Ok(weighted)
}

fn pca_project(
    mean: &[f64],
    components: &[Vec<f64>],
    input: &[f64],
) -> Result<Vec<f64>, TransformError> {
    if mean.len() != input.len() {
        return Err(TransformError::PcaShape {
            expected: mean.len(),
            actual: input.len(),
        });
    }

    let centered: Vec<f64> = input.iter().zip(mean).map(|(x, m)| x - m).collect();
    let mut projected = Vec::with_capacity(components.len());
    for row in components {
        if row.len() != centered.len() {
            return Err(TransformError::PcaShape {
                expected: row.len(),
                actual: centered.len(),
            });
        }
        projected.push(row.iter().zip(&centered).map(|(w, x)| w * x).sum());
    }
    Ok(projected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaler() -> Transformer {
        Transformer::StandardScaler {
            mean: vec![0.0, 50.0],
            scale: vec![2.0, 25.0],
        }
    }

    fn tfidf() -> Transformer {
        let mut vocabulary = HashMap::new();
        vocabulary.insert("sncf".to_string(), 0);
        vocabulary.insert("paris".to_string(), 1);
        Transformer::TfidfVectorizer {
            vocabulary,
            idf: vec![1.0, 2.0],
        }
    }

    fn pca(components: Vec<Vec<f64>>) -> Transformer {
        Transformer::Pca {
            mean: vec![0.0, 0.0],
            components,
        }
    }

    fn full_bundle() -> TransformerBundle {
        let mut entries = BTreeMap::new();
        entries.insert("scaler".to_string(), scaler());
        entries.insert("tfidf".to_string(), tfidf());
        entries.insert(
            "pca".to_string(),
            pca(vec![vec![1.0, 0.0], vec![0.0, 1.0]]),
        );
        TransformerBundle::new(entries)
    }

    #[test]
    fn test_validate_absent_bundle() {
        assert!(!validate(None));
    }

    #[test]
    fn test_validate_complete_bundle() {
        assert!(validate(Some(&full_bundle())));
    }

    #[test]
    fn test_validate_missing_pca() {
        let mut entries = BTreeMap::new();
        entries.insert("scaler".to_string(), scaler());
        entries.insert("tfidf".to_string(), tfidf());
        let bundle = TransformerBundle::new(entries);
        assert!(!validate(Some(&bundle)));
    }

    #[test]
    fn test_validate_kind_mismatch() {
        let mut entries = BTreeMap::new();
        entries.insert("scaler".to_string(), scaler());
        entries.insert("tfidf".to_string(), scaler()); // wrong kind in the tfidf slot
        entries.insert("pca".to_string(), pca(vec![vec![1.0, 0.0]]));
        let bundle = TransformerBundle::new(entries);
        assert!(!validate(Some(&bundle)));
    }

    #[test]
    fn test_validate_rejects_extra_entries() {
        let mut bundle = full_bundle();
        bundle
            .entries
            .insert("extra".to_string(), scaler());
        assert!(!validate(Some(&bundle)));
    }

    #[test]
    fn test_scaler_standardizes_both_columns() {
        let bundle = full_bundle();
        let (amount, absolute) = bundle.scale_amounts(4.0, 75.0).unwrap().unwrap();
        assert_eq!(amount, 2.0);
        assert_eq!(absolute, 1.0);
    }

    #[test]
    fn test_embed_tfidf_then_projection() {
        let bundle = full_bundle();
        // "sncf paris paris": counts [1, 2], idf-weighted [1, 4], L2-normalized
        let embedding = bundle.embed("sncf paris paris").unwrap().unwrap();
        let norm = (17.0f64).sqrt();
        assert!((embedding[0] - 1.0 / norm).abs() < 1e-12);
        assert!((embedding[1] - 4.0 / norm).abs() < 1e-12);
    }

    #[test]
    fn test_embed_unknown_tokens_is_zero_vector() {
        let bundle = full_bundle();
        let embedding = bundle.embed("carrefour market").unwrap().unwrap();
        assert!(embedding.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_pca_shape_mismatch_is_an_error() {
        let mut entries = BTreeMap::new();
        entries.insert("scaler".to_string(), scaler());
        entries.insert("tfidf".to_string(), tfidf());
        entries.insert(
            "pca".to_string(),
            Transformer::Pca {
                mean: vec![0.0; 5], // disagrees with the 2-term vocabulary
                components: vec![vec![0.0; 5]],
            },
        );
        let bundle = TransformerBundle::new(entries);
        assert!(matches!(
            bundle.embed("sncf"),
            Err(TransformError::PcaShape { .. })
        ));
    }

    #[test]
    fn test_artifact_json_round_trip() {
        let raw = r#"{
            "scaler": {"kind": "standard_scaler", "mean": [0.0, 0.0], "scale": [1.0, 1.0]},
            "tfidf": {"kind": "tfidf_vectorizer", "vocabulary": {"loyer": 0}, "idf": [1.0]},
            "pca": {"kind": "pca", "mean": [0.0], "components": [[1.0]]}
        }"#;
        let bundle: TransformerBundle = serde_json::from_str(raw).unwrap();
        assert!(validate(Some(&bundle)));
        assert!(bundle.has_text_transformers());
    }
}
