//! Test helpers for integration tests
//!
//! Provides an in-process WebSocket gateway and a scripted REST API, both
//! served by axum on ephemeral ports.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chatlink_common::{ClientConfig, GatewayConfig, RestConfig};
use chatlink_gateway::GatewayFrame;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::fixtures::{
    api_error_json, bot_user_json, gateway_bot_json, guild_json, message_json, unique_id,
};

/// Bot token the mock servers expect
pub const TEST_TOKEN: &str = "test-token";

/// How long a helper waits for the client before failing the test
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages allowed per window on the message bucket
pub const MESSAGE_BUCKET_LIMIT: u32 = 5;

/// Length of the message bucket window
pub const MESSAGE_BUCKET_WINDOW: Duration = Duration::from_millis(500);

async fn serve(app: Router) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok((addr, handle))
}

/// Client configuration pointed at the mock servers
pub fn test_config(rest: Option<&MockRestServer>, gateway: Option<&MockGateway>) -> ClientConfig {
    let mut config = ClientConfig::new(TEST_TOKEN);
    config.rest = RestConfig {
        base_url: rest.map_or_else(|| "http://127.0.0.1:9".to_string(), MockRestServer::api_base),
        request_timeout_secs: 5,
        backoff_base_ms: 20,
        ..RestConfig::default()
    };
    config.gateway = GatewayConfig {
        url: gateway.map(MockGateway::url),
        compress: false,
        reconnect_base_ms: 50,
        reconnect_max_ms: 200,
        ..GatewayConfig::default()
    };
    config
}

// ============================================================================
// Mock gateway
// ============================================================================

/// WebSocket gateway that hands every accepted connection to the test
pub struct MockGateway {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<GatewaySocket>,
    _handle: JoinHandle<()>,
}

impl MockGateway {
    pub async fn start() -> Result<Self> {
        let (tx, connections) = mpsc::unbounded_channel();
        let app = Router::new().route("/", get(upgrade)).with_state(tx);
        let (addr, handle) = serve(app).await?;

        Ok(Self {
            addr,
            connections,
            _handle: handle,
        })
    }

    /// Base URL for the gateway
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Wait for the client's next connection
    pub async fn accept(&mut self) -> Result<GatewaySocket> {
        self.accept_within(STEP_TIMEOUT).await
    }

    pub async fn accept_within(&mut self, timeout: Duration) -> Result<GatewaySocket> {
        tokio::time::timeout(timeout, self.connections.recv())
            .await
            .context("timed out waiting for a gateway connection")?
            .ok_or_else(|| anyhow!("gateway server stopped"))
    }
}

async fn upgrade(
    State(connections): State<mpsc::UnboundedSender<GatewaySocket>>,
    RawQuery(query): RawQuery,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let _ = connections.send(GatewaySocket {
            socket,
            query: query.unwrap_or_default(),
            encoder: ZlibEncoder::new(Vec::new(), Compression::default()),
        });
    })
}

/// Server side of one gateway connection
pub struct GatewaySocket {
    socket: WebSocket,
    /// Query string the client connected with
    pub query: String,
    encoder: ZlibEncoder<Vec<u8>>,
}

impl GatewaySocket {
    pub async fn send(&mut self, frame: &GatewayFrame) -> Result<()> {
        let text = serde_json::to_string(frame)?;
        self.socket.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Send a frame on the connection's zlib stream, split into `chunks`
    /// binary messages
    pub async fn send_compressed(&mut self, frame: &GatewayFrame, chunks: usize) -> Result<()> {
        let text = serde_json::to_string(frame)?;
        self.encoder.write_all(text.as_bytes())?;
        self.encoder.flush()?;
        let compressed = std::mem::take(self.encoder.get_mut());

        let size = compressed.len().div_ceil(chunks.max(1));
        for chunk in compressed.chunks(size.max(1)) {
            self.socket.send(Message::Binary(chunk.to_vec())).await?;
        }
        Ok(())
    }

    /// Next frame from the client; fails on close
    pub async fn recv_frame(&mut self) -> Result<GatewayFrame> {
        loop {
            let message = tokio::time::timeout(STEP_TIMEOUT, self.socket.recv())
                .await
                .context("timed out waiting for a client frame")?
                .ok_or_else(|| anyhow!("client disconnected"))??;
            match message {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Close(frame) => bail!("client closed with {:?}", frame.map(|f| f.code)),
                Message::Binary(_) => bail!("client sent a binary message"),
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
    }

    /// Read until the client closes; returns its close code
    pub async fn recv_close(&mut self) -> Result<Option<u16>> {
        loop {
            let message = tokio::time::timeout(STEP_TIMEOUT, self.socket.recv())
                .await
                .context("timed out waiting for the client to close")?;
            match message {
                Some(Ok(Message::Close(frame))) => return Ok(frame.map(|f| f.code)),
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return Ok(None),
            }
        }
    }

    /// Send HELLO and return the client's answer (IDENTIFY or RESUME)
    pub async fn handshake(&mut self, heartbeat_interval: u64) -> Result<GatewayFrame> {
        self.send(&GatewayFrame::hello(heartbeat_interval)).await?;
        loop {
            let frame = self.recv_frame().await?;
            if frame.op != chatlink_gateway::OpCode::Heartbeat {
                return Ok(frame);
            }
        }
    }

    /// Close the connection with `code`
    pub async fn close(mut self, code: u16) -> Result<()> {
        self.socket
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: "".into(),
            })))
            .await?;
        Ok(())
    }
}

// ============================================================================
// Mock REST API
// ============================================================================

/// A request the mock REST server received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub user_agent: Option<String>,
    pub audit_log_reason: Option<String>,
    pub at: Instant,
}

#[derive(Debug)]
struct MessageWindow {
    remaining: u32,
    resets_at: Instant,
}

#[derive(Debug)]
struct RestState {
    requests: Mutex<Vec<RecordedRequest>>,
    window: Mutex<MessageWindow>,
    /// Guild lookups answered with 429 before succeeding
    guild_rate_limits: Mutex<u32>,
    /// Responses with status 429 the server sent
    rate_limited: Mutex<u32>,
    gateway_url: Mutex<String>,
}

impl RestState {
    fn record(&self, method: Method, uri: &Uri, headers: &HeaderMap) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        self.requests.lock().push(RecordedRequest {
            method,
            path: uri.path().to_string(),
            authorization: header("authorization"),
            user_agent: header("user-agent"),
            audit_log_reason: header("x-audit-log-reason"),
            at: Instant::now(),
        });
    }
}

/// REST API double serving `/api/v10`
pub struct MockRestServer {
    pub addr: SocketAddr,
    state: Arc<RestState>,
    _handle: JoinHandle<()>,
}

impl MockRestServer {
    pub async fn start() -> Result<Self> {
        let state = Arc::new(RestState {
            requests: Mutex::new(Vec::new()),
            window: Mutex::new(MessageWindow {
                remaining: MESSAGE_BUCKET_LIMIT,
                resets_at: Instant::now(),
            }),
            guild_rate_limits: Mutex::new(0),
            rate_limited: Mutex::new(0),
            gateway_url: Mutex::new("ws://127.0.0.1:9".to_string()),
        });

        let app = Router::new()
            .route("/api/v10/gateway/bot", get(gateway_bot))
            .route("/api/v10/users/@me", get(current_user))
            .route("/api/v10/users/:user_id", get(unknown_user))
            .route("/api/v10/guilds/:guild_id", get(guild))
            .route("/api/v10/channels/:channel_id/messages", post(create_message))
            .route(
                "/api/v10/channels/:channel_id/messages/:message_id",
                axum::routing::delete(delete_message),
            )
            .with_state(Arc::clone(&state));
        let (addr, handle) = serve(app).await?;

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// Value for `RestConfig::base_url`
    pub fn api_base(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Gateway URL returned by `GET /gateway/bot`
    pub fn set_gateway_url(&self, url: impl Into<String>) {
        *self.state.gateway_url.lock() = url.into();
    }

    /// Answer the next `count` guild lookups with 429
    pub fn rate_limit_guilds(&self, count: u32) {
        *self.state.guild_rate_limits.lock() = count;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    /// Number of 429 responses served
    pub fn rate_limited_count(&self) -> u32 {
        *self.state.rate_limited.lock()
    }
}

type Shared = State<Arc<RestState>>;

fn bucket_headers(bucket: &str, limit: u32, remaining: u32, reset_after: Duration) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let mut put = |name: &'static str, value: String| {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    };
    put("x-ratelimit-bucket", bucket.to_string());
    put("x-ratelimit-limit", limit.to_string());
    put("x-ratelimit-remaining", remaining.to_string());
    // Never earlier than the server-side reset
    let reset_millis = reset_after.as_millis() + 1;
    put("x-ratelimit-reset-after", format!("{:.3}", reset_millis as f64 / 1000.0));
    headers
}

async fn gateway_bot(State(state): Shared, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    state.record(method, &uri, &headers);
    let url = state.gateway_url.lock().clone();
    Json(gateway_bot_json(&url)).into_response()
}

async fn current_user(State(state): Shared, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    state.record(method, &uri, &headers);
    (
        bucket_headers("users", 5, 4, Duration::from_secs(1)),
        Json(bot_user_json()),
    )
        .into_response()
}

async fn unknown_user(
    State(state): Shared,
    Path(_user_id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    state.record(method, &uri, &headers);
    (
        StatusCode::NOT_FOUND,
        Json(api_error_json(10013, "Unknown User")),
    )
        .into_response()
}

async fn guild(
    State(state): Shared,
    Path(guild_id): Path<u64>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    state.record(method, &uri, &headers);
    {
        let mut pending = state.guild_rate_limits.lock();
        if *pending > 0 {
            *pending -= 1;
            *state.rate_limited.lock() += 1;
            let mut headers = bucket_headers("guilds", 5, 0, Duration::from_millis(100));
            headers.insert("x-ratelimit-scope", HeaderValue::from_static("user"));
            headers.insert("retry-after", HeaderValue::from_static("1"));
            return (
                StatusCode::TOO_MANY_REQUESTS,
                headers,
                Json(json!({
                    "message": "You are being rate limited.",
                    "retry_after": 0.1,
                    "global": false
                })),
            )
                .into_response();
        }
    }
    (
        bucket_headers("guilds", 5, 4, Duration::from_secs(1)),
        Json(guild_json(guild_id, "Test Guild")),
    )
        .into_response()
}

async fn create_message(
    State(state): Shared,
    Path(channel_id): Path<u64>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    state.record(method, &uri, &headers);

    let now = Instant::now();
    let (remaining, reset_after) = {
        let mut window = state.window.lock();
        if now >= window.resets_at {
            window.remaining = MESSAGE_BUCKET_LIMIT;
            window.resets_at = now + MESSAGE_BUCKET_WINDOW;
        }
        if window.remaining == 0 {
            drop(window);
            *state.rate_limited.lock() += 1;
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"message": "You are being rate limited.", "retry_after": 0.5, "global": false})),
            )
                .into_response();
        }
        window.remaining -= 1;
        (window.remaining, window.resets_at - now)
    };

    let content = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("content").and_then(Value::as_str).map(String::from))
        .unwrap_or_default();

    (
        bucket_headers("messages", MESSAGE_BUCKET_LIMIT, remaining, reset_after),
        Json(message_json(unique_id(), channel_id, &content)),
    )
        .into_response()
}

async fn delete_message(
    State(state): Shared,
    Path((_channel_id, _message_id)): Path<(u64, u64)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    state.record(method, &uri, &headers);
    StatusCode::NO_CONTENT.into_response()
}
