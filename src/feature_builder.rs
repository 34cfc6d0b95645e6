//! Feature derivation for transaction category inference.
//!
//! Turns a raw transaction batch into the fixed-width numeric table the
//! model consumes: amount statistics, calendar features and, when fitted
//! text transformers are supplied, a 10-dimension description embedding.
//! Matches the preprocessing done by the training pipeline.

use crate::calendar::{self, FrenchHolidayCalendar};
use crate::text;
use crate::transformers::{self, TransformError, TransformerBundle};
use crate::types::transaction::{InputError, Transaction};
use chrono::{Datelike, NaiveDate};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Number of text-embedding dimensions the model was trained with.
pub const EMBEDDING_DIMS: usize = 10;

/// Errors that abort the batch. Transformer *validation* failures never
/// land here; those degrade to an unscaled table instead.
#[derive(Debug, Clone, Error)]
pub enum FeatureError {
    #[error("row {index}: {source}")]
    Input {
        index: usize,
        #[source]
        source: InputError,
    },
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("feature validation failed: {0}")]
    Validation(String),
}

/// One derived feature row, same order as the input batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub amount: f64,
    pub absolute_amount: f64,
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week: u32,
    /// 1..=12
    pub month: u32,
    /// Weekday and not a public holiday
    pub is_business_day: u8,
    /// Amount strictly positive
    pub is_credit: u8,
    /// Present only when text transformers were applied
    pub desc_emb: Option<Vec<f64>>,
}

impl FeatureRow {
    /// Flatten to the model input order: six base features, then the
    /// embedding dimensions when present.
    pub fn as_vector(&self) -> Vec<f64> {
        let mut values = vec![
            self.amount,
            self.absolute_amount,
            f64::from(self.day_of_week),
            f64::from(self.month),
            f64::from(self.is_business_day),
            f64::from(self.is_credit),
        ];
        if let Some(embedding) = &self.desc_emb {
            values.extend_from_slice(embedding);
        }
        values
    }
}

/// Derived feature table, one row per surviving input transaction.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in model input order.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = [
            "amount",
            "absolute_amount",
            "day_of_week",
            "month",
            "is_business_day",
            "is_credit",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if self.rows.iter().any(|r| r.desc_emb.is_some()) {
            for i in 0..EMBEDDING_DIMS {
                names.push(format!("desc_emb_{i}"));
            }
        }
        names
    }

    /// Row-major matrix for the remote model input.
    pub fn to_matrix(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(FeatureRow::as_vector).collect()
    }

    /// Post-condition check for inference tables: embeddings are
    /// all-or-nothing across rows, and when present carry exactly
    /// [`EMBEDDING_DIMS`] dimensions.
    pub fn validate(&self) -> Result<(), FeatureError> {
        let embedded = self.rows.iter().filter(|r| r.desc_emb.is_some()).count();
        if embedded != 0 && embedded != self.rows.len() {
            return Err(FeatureError::Validation(format!(
                "text embeddings present on {embedded} of {} rows",
                self.rows.len()
            )));
        }

        for row in &self.rows {
            if let Some(embedding) = &row.desc_emb {
                if embedding.len() != EMBEDDING_DIMS {
                    return Err(FeatureError::Validation(format!(
                        "expected {EMBEDDING_DIMS} text embedding dimensions, got {}",
                        embedding.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Build the feature table for a transaction batch.
///
/// Training mode drops rows without a category label. A supplied bundle is
/// shape-checked first; a bundle that fails validation is dropped with a
/// warning and the table is built unscaled and unembedded. Malformed
/// amounts and dates are hard errors carrying the offending row index.
pub fn build_features(
    batch: &[Transaction],
    bundle: Option<&TransformerBundle>,
    is_training: bool,
) -> Result<FeatureTable, FeatureError> {
    info!(
        rows = batch.len(),
        mode = if is_training { "training" } else { "prediction" },
        "Building features"
    );

    let bundle = match bundle {
        Some(b) if transformers::validate(Some(b)) => Some(b),
        Some(_) => {
            warn!("Transformer validation failed. Proceeding without transformers.");
            None
        }
        None => None,
    };

    // Parse every row up front so the holiday span is known before
    // deriving calendar features.
    let mut parsed: Vec<(f64, NaiveDate, String)> = Vec::with_capacity(batch.len());
    for (index, tx) in batch.iter().enumerate() {
        if is_training && tx.category.is_none() {
            debug!(index, "Dropping unlabeled training row");
            continue;
        }

        let amount = tx
            .amount
            .parse()
            .map_err(|source| FeatureError::Input { index, source })?;
        let date = tx
            .parse_date()
            .map_err(|source| FeatureError::Input { index, source })?;
        let normalized = text::normalize(tx.description.as_deref());
        parsed.push((amount, date, normalized));
    }

    let holidays = match (
        parsed.iter().map(|(_, d, _)| *d).min(),
        parsed.iter().map(|(_, d, _)| *d).max(),
    ) {
        (Some(start), Some(end)) => FrenchHolidayCalendar.holidays(start, end),
        _ => Default::default(),
    };

    let mut table = FeatureTable::default();
    for (amount, date, normalized) in &parsed {
        let mut row = FeatureRow {
            amount: *amount,
            absolute_amount: amount.abs(),
            day_of_week: date.weekday().num_days_from_monday(),
            month: date.month(),
            is_business_day: u8::from(calendar::is_business_day(*date, &holidays)),
            is_credit: u8::from(*amount > 0.0),
            desc_emb: None,
        };

        if let Some(bundle) = bundle {
            if let Some((scaled, scaled_abs)) =
                bundle.scale_amounts(row.amount, row.absolute_amount)?
            {
                row.amount = scaled;
                row.absolute_amount = scaled_abs;
            }
            row.desc_emb = bundle.embed(normalized)?;
        }
        table.rows.push(row);
    }

    if !is_training {
        table.validate()?;
    }

    debug!(
        rows = table.len(),
        columns = table.feature_names().len(),
        "Feature build complete"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformers::Transformer;
    use std::collections::{BTreeMap, HashMap};

    fn tx(json: serde_json::Value) -> Transaction {
        serde_json::from_value(json).unwrap()
    }

    fn ten_dim_bundle() -> TransformerBundle {
        let mut vocabulary = HashMap::new();
        vocabulary.insert("sncf".to_string(), 0);
        vocabulary.insert("uber".to_string(), 1);

        let mut entries = BTreeMap::new();
        entries.insert(
            "scaler".to_string(),
            Transformer::StandardScaler {
                mean: vec![0.0, 0.0],
                scale: vec![10.0, 10.0],
            },
        );
        entries.insert(
            "tfidf".to_string(),
            Transformer::TfidfVectorizer {
                vocabulary,
                idf: vec![1.0, 1.0],
            },
        );
        entries.insert(
            "pca".to_string(),
            Transformer::Pca {
                mean: vec![0.0, 0.0],
                components: vec![vec![1.0, 0.0]; EMBEDDING_DIMS],
            },
        );
        TransformerBundle::new(entries)
    }

    #[test]
    fn test_base_features_for_comma_amount() {
        let batch = vec![tx(serde_json::json!({
            "dateOp": "25/12/2024",
            "amount": "-45,67",
            "transaction_description": "CADEAUX NOEL"
        }))];

        let table = build_features(&batch, None, false).unwrap();
        let row = &table.rows[0];
        assert_eq!(row.amount, -45.67);
        assert_eq!(row.absolute_amount, 45.67);
        assert_eq!(row.is_credit, 0);
        assert_eq!(row.month, 12);
        assert_eq!(row.day_of_week, 2); // Christmas 2024 is a Wednesday
        assert_eq!(row.is_business_day, 0); // ...and a public holiday
        assert!(row.desc_emb.is_none());
    }

    #[test]
    fn test_iso_date_fallback_and_business_day() {
        let batch = vec![tx(serde_json::json!({
            "dateOp": "2024-12-23",
            "amount": 10.0
        }))];
        let table = build_features(&batch, None, false).unwrap();
        let row = &table.rows[0];
        assert_eq!(row.day_of_week, 0); // Monday
        assert_eq!(row.is_business_day, 1);
        assert_eq!(row.is_credit, 1);
    }

    #[test]
    fn test_malformed_amount_carries_row_index() {
        let batch = vec![
            tx(serde_json::json!({"dateOp": "01/01/2024", "amount": "1,0"})),
            tx(serde_json::json!({"dateOp": "01/01/2024", "amount": "oops"})),
        ];
        let err = build_features(&batch, None, false).unwrap_err();
        assert!(matches!(err, FeatureError::Input { index: 1, .. }));
    }

    #[test]
    fn test_valid_bundle_scales_and_embeds() {
        let bundle = ten_dim_bundle();
        let batch = vec![tx(serde_json::json!({
            "dateOp": "01/03/2024",
            "amount": "-50,0",
            "transaction_description": "SNCF PARIS"
        }))];

        let table = build_features(&batch, Some(&bundle), false).unwrap();
        let row = &table.rows[0];
        assert_eq!(row.amount, -5.0);
        assert_eq!(row.absolute_amount, 5.0);
        let embedding = row.desc_emb.as_ref().unwrap();
        assert_eq!(embedding.len(), EMBEDDING_DIMS);
        assert_eq!(table.feature_names().len(), 6 + EMBEDDING_DIMS);
        assert_eq!(table.to_matrix()[0].len(), 6 + EMBEDDING_DIMS);
    }

    #[test]
    fn test_invalid_bundle_degrades_without_failing() {
        let mut entries = BTreeMap::new();
        entries.insert(
            "scaler".to_string(),
            Transformer::StandardScaler {
                mean: vec![0.0, 0.0],
                scale: vec![1.0, 1.0],
            },
        );
        let incomplete = TransformerBundle::new(entries);

        let batch = vec![tx(serde_json::json!({
            "dateOp": "01/03/2024",
            "amount": "-50,0",
            "transaction_description": "SNCF"
        }))];
        let table = build_features(&batch, Some(&incomplete), false).unwrap();
        let row = &table.rows[0];
        assert_eq!(row.amount, -50.0); // unscaled
        assert!(row.desc_emb.is_none());
    }

    #[test]
    fn test_wrong_embedding_width_fails_validation() {
        // A PCA artifact projecting to 3 dimensions instead of 10
        let mut vocabulary = HashMap::new();
        vocabulary.insert("sncf".to_string(), 0);
        vocabulary.insert("uber".to_string(), 1);

        let mut entries = BTreeMap::new();
        entries.insert(
            "scaler".to_string(),
            Transformer::StandardScaler {
                mean: vec![0.0, 0.0],
                scale: vec![1.0, 1.0],
            },
        );
        entries.insert(
            "tfidf".to_string(),
            Transformer::TfidfVectorizer {
                vocabulary,
                idf: vec![1.0, 1.0],
            },
        );
        entries.insert(
            "pca".to_string(),
            Transformer::Pca {
                mean: vec![0.0, 0.0],
                components: vec![vec![1.0, 0.0]; 3],
            },
        );
        let bundle = TransformerBundle::new(entries);

        let batch = vec![tx(serde_json::json!({
            "dateOp": "01/03/2024",
            "amount": "1,0",
            "transaction_description": "SNCF"
        }))];
        let err = build_features(&batch, Some(&bundle), false).unwrap_err();
        assert!(matches!(err, FeatureError::Validation(_)));
    }

    #[test]
    fn test_training_mode_drops_unlabeled_rows() {
        let batch = vec![
            tx(serde_json::json!({
                "dateOp": "01/03/2024",
                "amount": "1,0",
                "category": "Transport"
            })),
            tx(serde_json::json!({"dateOp": "02/03/2024", "amount": "2,0"})),
        ];
        let table = build_features(&batch, None, true).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_empty_batch_yields_empty_table() {
        let table = build_features(&[], None, false).unwrap();
        assert!(table.is_empty());
    }
}
