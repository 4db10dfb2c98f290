//! Completed HTTP exchanges

use chatlink_common::ClientError;
use chatlink_core::FromData;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

/// Status, headers and raw body of a response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Error body returned by the platform for rejected requests
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<u64>,
    #[serde(default)]
    pub message: String,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: u16, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON; an empty body is `null`
    pub fn json(&self) -> Result<Value, ClientError> {
        if self.body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Decode the body into a record
    pub fn decode<T: FromData>(&self) -> Result<T, ClientError> {
        let value = self.json()?;
        T::from_data(&value).map_err(ClientError::from)
    }

    /// Convert a non-success response into `ClientError::Http`
    #[must_use]
    pub fn into_error(self) -> ClientError {
        let body: Option<ApiErrorBody> = serde_json::from_slice(&self.body).ok();
        let reason = StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown status");

        match body {
            Some(body) if !body.message.is_empty() => ClientError::Http {
                status: self.status,
                code: body.code,
                message: body.message,
            },
            Some(body) => ClientError::Http {
                status: self.status,
                code: body.code,
                message: reason.to_string(),
            },
            None => ClientError::Http {
                status: self.status,
                code: None,
                message: reason.to_string(),
            },
        }
    }
}
