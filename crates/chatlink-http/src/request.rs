//! Requests waiting in the scheduler

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::route::Route;
use chatlink_common::ClientError;

/// A file uploaded as one multipart part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl FileAttachment {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Request body
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    /// `payload_json` part plus `files[n]` parts
    Multipart {
        payload_json: Option<Value>,
        files: Vec<FileAttachment>,
    },
}

/// A request submitted to the scheduler
#[derive(Debug, Clone)]
pub struct QueuedRequest {
    pub route: Route,
    pub body: RequestBody,
    /// Sent as `X-Audit-Log-Reason`
    pub reason: Option<String>,
    /// Correlates log lines for one request across retries
    pub request_id: Uuid,
    /// Number of times the request has been sent
    pub attempt: u32,
}

impl QueuedRequest {
    pub fn new(route: Route) -> Self {
        Self {
            route,
            body: RequestBody::Empty,
            reason: None,
            request_id: Uuid::new_v4(),
            attempt: 0,
        }
    }

    /// Attach a JSON body
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        let value = serde_json::to_value(body).map_err(ClientError::internal)?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    /// Attach files, with an optional JSON payload carried as `payload_json`
    #[must_use]
    pub fn multipart(mut self, payload_json: Option<Value>, files: Vec<FileAttachment>) -> Self {
        self.body = RequestBody::Multipart {
            payload_json,
            files,
        };
        self
    }

    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
