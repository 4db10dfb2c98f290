//! Client error types
//!
//! Unified error type surfaced through request futures and the session handle.

use chatlink_core::ModelError;
use std::fmt;

use crate::config::ConfigError;

/// Client-wide error type
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    // Wire errors
    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    // REST errors
    #[error("Rate limit retries exhausted for {route} after {attempts} attempts")]
    RateLimitExceeded { route: String, attempts: u32 },

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        code: Option<u64>,
        message: String,
    },

    // Record decoding
    #[error(transparent)]
    InvalidData(#[from] ModelError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Config(#[from] ConfigError),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

impl ClientError {
    /// HTTP status associated with this error, if any
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::RateLimitExceeded { .. } => Some(429),
            _ => None,
        }
    }

    /// Get a stable error code for logs
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "DECODE_ERROR",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::Http { .. } => "HTTP_ERROR",
            Self::InvalidData(_) => "INVALID_DATA",
            Self::Cancelled => "CANCELLED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Check if the failure is transient and the request may be retried
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if this is a client error (4xx)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status_code()
            .is_some_and(|status| (400..500).contains(&status))
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Create a transport error from any displayable cause
    #[must_use]
    pub fn transport(cause: impl fmt::Display) -> Self {
        Self::Transport(cause.to_string())
    }

    /// Create a protocol error
    #[must_use]
    pub fn protocol(msg: impl fmt::Display) -> Self {
        Self::Protocol(msg.to_string())
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
