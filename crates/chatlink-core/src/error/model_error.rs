//! Model errors - a payload could not be turned into a record

use thiserror::Error;

/// Record decoding errors
///
/// Required fields are never defaulted: a payload that lacks one is rejected
/// with one of these variants and the caller decides whether to skip it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("{record} payload is missing required field `{field}`")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },

    #[error("{record} payload has an invalid `{field}`: {reason}")]
    InvalidField {
        record: &'static str,
        field: &'static str,
        reason: String,
    },

    #[error("invalid {record} payload: {reason}")]
    InvalidData { record: &'static str, reason: String },

    #[error("expected a JSON object for {record}")]
    NotAnObject { record: &'static str },
}

impl ModelError {
    /// Name of the record that failed to decode
    #[must_use]
    pub fn record(&self) -> &'static str {
        match self {
            Self::MissingField { record, .. }
            | Self::InvalidField { record, .. }
            | Self::InvalidData { record, .. }
            | Self::NotAnObject { record } => record,
        }
    }

    /// Check if the error was caused by an absent required field
    #[must_use]
    pub fn is_missing_field(&self) -> bool {
        matches!(self, Self::MissingField { .. })
    }
}

/// Result type for record decoding
pub type ModelResult<T> = Result<T, ModelError>;
