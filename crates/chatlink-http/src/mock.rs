//! Scripted transport for scheduler and client tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatlink_common::ClientError;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::time::Instant;

use crate::request::QueuedRequest;
use crate::response::HttpResponse;
use crate::transport::HttpTransport;

/// Build a response with the given headers and body
pub fn response(status: u16, headers: &[(&str, &str)], body: &str) -> HttpResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    HttpResponse::new(status, map, body.as_bytes().to_vec())
}

/// Replies with queued outcomes in order, then `200 {}` once the script runs out
///
/// The reply is picked when the call starts and returned after `latency`.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<HttpResponse, ClientError>>>,
    calls: Mutex<Vec<(Instant, QueuedRequest)>>,
    latency: Duration,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Self::default()
        })
    }

    pub fn push(&self, response: HttpResponse) {
        self.script.lock().push_back(Ok(response));
    }

    pub fn push_error(&self, error: ClientError) {
        self.script.lock().push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Send time and path of every request
    pub fn calls(&self) -> Vec<(Instant, String)> {
        self.calls
            .lock()
            .iter()
            .map(|(at, request)| (*at, request.route.path().to_string()))
            .collect()
    }

    pub fn requests(&self) -> Vec<QueuedRequest> {
        self.calls.lock().iter().map(|(_, request)| request.clone()).collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: &QueuedRequest) -> Result<HttpResponse, ClientError> {
        self.calls.lock().push((Instant::now(), request.clone()));
        let reply = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(response(200, &[], "{}")));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        reply
    }
}
