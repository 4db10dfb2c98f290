//! REST Integration Tests
//!
//! Drive the real reqwest transport and bucket scheduler against an
//! in-process API.
//!
//! Run with: cargo test -p integration-tests --test rest_tests

use chatlink_common::ClientError;
use chatlink_core::Snowflake;
use chatlink_gateway::{EventRouter, GatewayClient, OpCode};
use chatlink_http::{CreateMessage, RestClient};
use integration_tests::{
    fixtures::*, test_config, MockGateway, MockRestServer, MESSAGE_BUCKET_WINDOW, TEST_TOKEN,
};
use std::time::Duration;

const MESSAGES_PATH_PREFIX: &str = "/api/v10/channels/";

async fn client() -> (MockRestServer, RestClient) {
    let server = MockRestServer::start().await.expect("Failed to start REST server");
    let config = test_config(Some(&server), None);
    let rest = RestClient::from_config(&config).expect("Failed to build client");
    (server, rest)
}

// ============================================================================
// Request Tests
// ============================================================================

#[tokio::test]
async fn test_get_gateway_bot() {
    let (server, rest) = client().await;
    server.set_gateway_url("wss://gateway.example");

    let gateway = rest.get_gateway_bot().await.unwrap();
    assert_eq!(gateway.url, "wss://gateway.example");
    assert_eq!(gateway.shards, 1);
    assert_eq!(gateway.session_start_limit.remaining, 999);
    assert_eq!(gateway.session_start_limit.max_concurrency, 1);
}

#[tokio::test]
async fn test_requests_carry_bot_token_and_user_agent() {
    let (server, rest) = client().await;

    let user = rest.get_current_user().await.unwrap();
    assert_eq!(user.id, Snowflake::new(BOT_USER_ID));
    assert!(user.bot);

    let requests = server.requests_to("/api/v10/users/@me");
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].authorization.as_deref(),
        Some(format!("Bot {TEST_TOKEN}").as_str())
    );
    assert!(requests[0]
        .user_agent
        .as_deref()
        .is_some_and(|agent| agent.starts_with("DiscordBot")));
}

#[tokio::test]
async fn test_audit_log_reason_header() {
    let (server, rest) = client().await;

    rest.delete_message(Snowflake::new(10), Snowflake::new(20), Some("cleanup"))
        .await
        .unwrap();

    let requests = server.requests_to("/api/v10/channels/10/messages/20");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, axum::http::Method::DELETE);
    assert_eq!(requests[0].audit_log_reason.as_deref(), Some("cleanup"));
}

#[tokio::test]
async fn test_api_error_surfaces_status_and_code() {
    let (_server, rest) = client().await;

    let err = rest.get_user(Snowflake::new(404)).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Http { status: 404, code: Some(10013), ref message } if message == "Unknown User"
    ));
}

// ============================================================================
// Rate Limit Tests
// ============================================================================

#[tokio::test]
async fn test_sixth_message_waits_for_bucket_reset() {
    let (server, rest) = client().await;
    let channel = Snowflake::new(unique_id());

    // The first response teaches the client the bucket's limits
    rest.create_message(channel, &CreateMessage::content("message 1"))
        .await
        .unwrap();

    let pending: Vec<_> = (2..=6)
        .map(|n| rest.create_message(channel, &CreateMessage::content(format!("message {n}"))))
        .collect();
    for future in pending {
        future.await.unwrap();
    }

    let requests: Vec<_> = server
        .requests()
        .into_iter()
        .filter(|r| r.path.starts_with(MESSAGES_PATH_PREFIX))
        .collect();
    assert_eq!(requests.len(), 6);
    assert_eq!(server.rate_limited_count(), 0);

    let first = requests[0].at;
    let window = MESSAGE_BUCKET_WINDOW - Duration::from_millis(50);
    for request in &requests[1..5] {
        assert!(request.at.duration_since(first) < window);
    }
    assert!(requests[5].at.duration_since(first) >= window);
}

#[tokio::test]
async fn test_rate_limited_request_is_retried() {
    let (server, rest) = client().await;
    server.rate_limit_guilds(1);

    let guild = rest.get_guild(Snowflake::new(77)).await.unwrap();
    assert_eq!(guild.id, Snowflake::new(77));
    assert_eq!(guild.name, "Test Guild");

    let requests = server.requests_to("/api/v10/guilds/77");
    assert_eq!(requests.len(), 2);
    assert_eq!(server.rate_limited_count(), 1);
    assert!(requests[1].at.duration_since(requests[0].at) >= Duration::from_millis(90));
}

// ============================================================================
// Gateway Discovery Tests
// ============================================================================

#[tokio::test]
async fn test_connect_with_rest_discovers_gateway_url() {
    let server = MockRestServer::start().await.unwrap();
    let mut gateway = MockGateway::start().await.unwrap();
    server.set_gateway_url(gateway.url());

    // No fixed gateway URL, so the client asks the REST API
    let config = test_config(Some(&server), None);
    let rest = RestClient::from_config(&config).unwrap();
    let client = GatewayClient::connect_with_rest(&config, &rest, EventRouter::new())
        .await
        .unwrap();

    let mut socket = gateway.accept().await.unwrap();
    assert_eq!(socket.handshake(41_250).await.unwrap().op, OpCode::Identify);
    assert_eq!(server.requests_to("/api/v10/gateway/bot").len(), 1);

    client.shutdown().await.unwrap();
}
