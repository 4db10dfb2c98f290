//! HTTP transport seam
//!
//! The scheduler only needs "send this request, give me the response".
//! Production uses reqwest; tests substitute a scripted transport.

use async_trait::async_trait;
use chatlink_common::{ClientError, RestConfig};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::multipart::{Form, Part};

use crate::request::{QueuedRequest, RequestBody};
use crate::response::HttpResponse;
use crate::route::encode_component;

/// Header carrying the audit log reason
pub const AUDIT_LOG_REASON_HEADER: &str = "x-audit-log-reason";

/// Sends one request and returns the raw response
///
/// Any HTTP status is a successful exchange; `Err` means the request never
/// produced a response (connect failure, timeout, reset).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &QueuedRequest) -> Result<HttpResponse, ClientError>;
}

/// reqwest-backed transport with bot authorization
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    api_root: String,
}

impl ReqwestTransport {
    /// Build a client that authorizes every request with `Bot <token>`
    pub fn new(token: &str, config: &RestConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        let mut authorization = HeaderValue::from_str(&format!("Bot {token}"))
            .map_err(|_| ClientError::protocol("token contains characters not allowed in headers"))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).map_err(ClientError::internal)?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(ClientError::internal)?;

        Ok(Self {
            client,
            api_root: config.api_root(),
        })
    }

    fn build_form(
        payload_json: Option<&serde_json::Value>,
        files: &[crate::request::FileAttachment],
    ) -> Result<Form, ClientError> {
        let mut form = Form::new();
        if let Some(payload) = payload_json {
            form = form.text("payload_json", payload.to_string());
        }
        for (index, file) in files.iter().enumerate() {
            let mut part = Part::bytes(file.data.clone()).file_name(file.filename.clone());
            if let Some(content_type) = &file.content_type {
                part = part.mime_str(content_type).map_err(ClientError::internal)?;
            }
            form = form.part(format!("files[{index}]"), part);
        }
        Ok(form)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &QueuedRequest) -> Result<HttpResponse, ClientError> {
        let url = format!("{}{}", self.api_root, request.route.path());
        let mut builder = self.client.request(request.route.method().clone(), url);

        if let Some(reason) = &request.reason {
            builder = builder.header(AUDIT_LOG_REASON_HEADER, encode_component(reason));
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart {
                payload_json,
                files,
            } => builder.multipart(Self::build_form(payload_json.as_ref(), files)?),
        };

        let response = builder.send().await.map_err(ClientError::transport)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(ClientError::transport)?;

        Ok(HttpResponse::new(status, headers, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_token_with_newline() {
        let err = ReqwestTransport::new("abc\ndef", &RestConfig::default()).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn test_build_form() {
        let files = vec![crate::request::FileAttachment::new("a.png", vec![1, 2, 3])
            .with_content_type("image/png")];
        assert!(ReqwestTransport::build_form(Some(&serde_json::json!({"content": "x"})), &files).is_ok());

        let bad = vec![crate::request::FileAttachment::new("a", vec![]).with_content_type("not a mime")];
        assert!(ReqwestTransport::build_form(None, &bad).is_err());
    }
}
