//! Core data types shared across the service

pub mod prediction;
pub mod transaction;

pub use prediction::{
    EnvelopeMode, ErrorDetail, ErrorKind, PredictionResult, ResultEnvelope,
};
pub use transaction::{Amount, InputError, Transaction};
