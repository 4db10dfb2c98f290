//! Gateway error types

use chatlink_common::ClientError;
use thiserror::Error;

use crate::protocol::CloseCode;

/// Error that ends a gateway session
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The server closed with a code that forbids reconnecting
    #[error("Gateway closed with {code}: {reason}")]
    FatalClose { code: u16, reason: String },

    /// Outbound payload could not be serialized
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// The session task ended before the request completed
    #[error("Session is not running")]
    SessionStopped,

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl GatewayError {
    /// Close code the server sent, if this error came from one
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::FatalClose { code, .. } => CloseCode::from_u16(*code),
            _ => None,
        }
    }

    /// Check if the token was rejected
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self.close_code(), Some(CloseCode::AuthenticationFailed))
    }
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;
