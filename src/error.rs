//! Error types shared by the training pipeline and the inference gateway.

use serde::Serialize;
use thiserror::Error;

/// One rejected input field, addressable by its wire key so a frontend can
/// attach the message to the matching form control.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub label: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// Coarse error classes a transport layer maps to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    DataUnavailable,
    Validation,
    InsufficientSamples,
    PredictionFailure,
    ArtifactMismatch,
    Unavailable,
}

#[derive(Debug, Error)]
pub enum AirQualityError {
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("{} input field(s) rejected", .0.len())]
    Validation(Vec<FieldError>),

    #[error("category {category} has {found} training samples, balancing needs at least {required}")]
    InsufficientSamples {
        category: String,
        found: usize,
        required: usize,
    },

    #[error("prediction failed: {0}")]
    PredictionFailure(String),

    #[error("artifact mismatch: {0}")]
    ArtifactMismatch(String),

    #[error("model is not loaded, run the training pipeline first")]
    Unavailable,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AirQualityError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::DataUnavailable(_) | Self::Io(_) | Self::Csv(_) | Self::Json(_) => {
                ErrorCategory::DataUnavailable
            }
            Self::Validation(_) => ErrorCategory::Validation,
            Self::InsufficientSamples { .. } => ErrorCategory::InsufficientSamples,
            Self::PredictionFailure(_) | Self::Config(_) => ErrorCategory::PredictionFailure,
            Self::ArtifactMismatch(_) => ErrorCategory::ArtifactMismatch,
            Self::Unavailable => ErrorCategory::Unavailable,
        }
    }

    /// Field errors for a validation failure, empty otherwise.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, AirQualityError>;
