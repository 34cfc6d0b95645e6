//! Transaction data structures for category inference

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One financial event submitted for categorization.
///
/// Immutable, provided fresh per request, never persisted. The `id` is an
/// opaque external identifier; callers that omit it get the positional
/// index back as `transaction_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// External identifier (optional, defaults to positional index)
    #[serde(default)]
    pub id: Option<String>,

    /// Operation date, day/month/year or ISO form
    #[serde(rename = "dateOp", alias = "dateop", alias = "date")]
    pub date_op: String,

    /// Signed amount; bank exports deliver this as a string with a comma
    /// decimal separator
    pub amount: Amount,

    /// Free-text description (may be absent or empty)
    #[serde(
        default,
        rename = "transaction_description",
        alias = "description"
    )]
    pub description: Option<String>,

    /// Category label, only present on training data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Transaction {
    /// Original description text, empty string when absent.
    pub fn description_or_empty(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    /// Parse the operation date, trying `%d/%m/%Y` first, then ISO.
    pub fn parse_date(&self) -> Result<NaiveDate, InputError> {
        let raw = self.date_op.trim();
        if let Ok(day) = NaiveDate::parse_from_str(raw, "%d/%m/%Y") {
            return Ok(day);
        }
        if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(day);
        }
        if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
            return Ok(stamp.date_naive());
        }
        Err(InputError::Date {
            value: raw.to_string(),
        })
    }
}

/// Amount field tolerant of both JSON numbers and comma-decimal strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    /// Parse to a signed float; a comma decimal separator is replaced with
    /// a period. Failure is a hard error for the batch, never a silent zero.
    pub fn parse(&self) -> Result<f64, InputError> {
        match self {
            Amount::Number(n) => Ok(*n),
            Amount::Text(s) => {
                let normalized = s.trim().replace(',', ".");
                normalized
                    .parse::<f64>()
                    .map_err(|_| InputError::Amount { value: s.clone() })
            }
        }
    }
}

/// Malformed fields in an incoming transaction.
#[derive(Debug, Clone, Error)]
pub enum InputError {
    #[error("unparseable amount {value:?}")]
    Amount { value: String },
    #[error("unparseable date {value:?}, expected d/m/Y or ISO format")]
    Date { value: String },
}
