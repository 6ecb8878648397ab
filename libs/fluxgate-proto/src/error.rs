//! Error types for fluxgate-proto

use thiserror::Error;

/// Errors raised while parsing input strings or building points
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtoError {
    /// A field pair in a free-form field list could not be parsed
    #[error("Malformed field '{key}': {reason}")]
    MalformedField { key: String, reason: String },

    /// A float field value is not a finite decimal number
    #[error("Invalid number for field '{field}': '{value}'")]
    InvalidNumber { field: String, value: String },

    #[error("Measurement name cannot be empty")]
    EmptyMeasurement,

    #[error("Field key cannot be empty")]
    EmptyFieldKey,

    #[error("Point requires at least one field")]
    EmptyFieldSet,
}

impl ProtoError {
    pub(crate) fn malformed(key: &str, reason: impl Into<String>) -> Self {
        ProtoError::MalformedField {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtoError>;
