//! Gateway Integration Tests
//!
//! Each test runs a real WebSocket session against an in-process gateway.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use chatlink_common::ClientConfig;
use chatlink_core::{Message, Snowflake};
use chatlink_gateway::{
    CacheManager, ConnectionStatus, DispatchContext, EventRouter, EventType, GatewayClient,
    GatewayError, GatewayFrame, OpCode,
};
use integration_tests::{fixtures::*, test_config, MockGateway, TEST_TOKEN};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const HEARTBEAT_INTERVAL: u64 = 41_250;

/// Router that forwards every event to the returned receiver
fn recording_router(cache: Option<Arc<CacheManager>>) -> (EventRouter, mpsc::UnboundedReceiver<DispatchContext>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut router = match cache {
        Some(cache) => EventRouter::new().with_cache(cache),
        None => EventRouter::new(),
    };
    router.on_any(move |ctx| {
        let _ = tx.send(ctx.clone());
        Ok(())
    });
    (router, rx)
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<DispatchContext>) -> DispatchContext {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("router stopped")
}

fn start(config: &ClientConfig, gateway: &MockGateway, router: EventRouter) -> GatewayClient {
    GatewayClient::connect(config, gateway.url(), router)
}

// ============================================================================
// Identify Tests
// ============================================================================

#[tokio::test]
async fn test_identify_and_receive_events() {
    let mut gateway = MockGateway::start().await.unwrap();
    let config = test_config(None, Some(&gateway));
    let cache = CacheManager::new_shared(config.cache.clone());
    let (router, mut events) = recording_router(Some(Arc::clone(&cache)));
    let client = start(&config, &gateway, router);

    let mut socket = gateway.accept().await.unwrap();
    assert!(socket.query.contains("v=10"));
    assert!(socket.query.contains("encoding=json"));
    assert!(!socket.query.contains("compress"));

    let identify = socket.handshake(HEARTBEAT_INTERVAL).await.unwrap();
    assert_eq!(identify.op, OpCode::Identify);
    assert_eq!(identify.d["token"], TEST_TOKEN);
    assert!(identify.d["intents"].is_u64());

    socket
        .send(&GatewayFrame::dispatch("READY", 1, ready_json("session-1", &gateway.url())))
        .await
        .unwrap();
    let channel_id = unique_id();
    socket
        .send(&GatewayFrame::dispatch(
            "MESSAGE_CREATE",
            2,
            message_json(unique_id(), channel_id, "hello there"),
        ))
        .await
        .unwrap();

    client.session().wait_ready().await.unwrap();

    let ready = next_event(&mut events).await;
    assert_eq!(ready.event_type(), Some(EventType::Ready));
    assert_eq!(ready.sequence(), Some(1));

    let created = next_event(&mut events).await;
    assert_eq!(created.event(), "MESSAGE_CREATE");
    let message: Message = created.decode().unwrap();
    assert_eq!(message.content, "hello there");
    assert_eq!(message.channel_id, Snowflake::new(channel_id));

    assert_eq!(cache.current_user().unwrap().id, Snowflake::new(BOT_USER_ID));
    assert!(cache.message(message.id).is_some());

    client.session().shutdown();
    assert_eq!(socket.recv_close().await.unwrap(), Some(1000));
    client.join().await.unwrap();
}

#[tokio::test]
async fn test_presence_update_reaches_gateway() {
    let mut gateway = MockGateway::start().await.unwrap();
    let config = test_config(None, Some(&gateway));
    let (router, _events) = recording_router(None);
    let client = start(&config, &gateway, router);

    let mut socket = gateway.accept().await.unwrap();
    socket.handshake(HEARTBEAT_INTERVAL).await.unwrap();
    socket
        .send(&GatewayFrame::dispatch("READY", 1, ready_json("session-1", &gateway.url())))
        .await
        .unwrap();
    client.session().wait_ready().await.unwrap();

    client
        .session()
        .update_presence(chatlink_gateway::protocol::UpdatePresence::status(
            chatlink_gateway::protocol::Status::Idle,
        ))
        .unwrap();

    let frame = loop {
        let frame = socket.recv_frame().await.unwrap();
        if frame.op != OpCode::Heartbeat {
            break frame;
        }
    };
    assert_eq!(frame.op, OpCode::PresenceUpdate);
    assert_eq!(frame.d["status"], "idle");

    client.shutdown().await.unwrap();
}

// ============================================================================
// Compression Tests
// ============================================================================

#[tokio::test]
async fn test_zlib_stream_frames_split_across_messages() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut config = test_config(None, Some(&gateway));
    config.gateway.compress = true;
    let (router, mut events) = recording_router(None);
    let client = start(&config, &gateway, router);

    let mut socket = gateway.accept().await.unwrap();
    assert!(socket.query.contains("compress=zlib-stream"));

    socket
        .send_compressed(&GatewayFrame::hello(HEARTBEAT_INTERVAL), 1)
        .await
        .unwrap();
    let identify = loop {
        let frame = socket.recv_frame().await.unwrap();
        if frame.op != OpCode::Heartbeat {
            break frame;
        }
    };
    assert_eq!(identify.op, OpCode::Identify);

    socket
        .send_compressed(
            &GatewayFrame::dispatch("READY", 1, ready_json("session-z", &gateway.url())),
            3,
        )
        .await
        .unwrap();
    for seq in 2..=4 {
        let content = format!("compressed {seq}");
        socket
            .send_compressed(
                &GatewayFrame::dispatch("MESSAGE_CREATE", seq, message_json(unique_id(), 10, &content)),
                2,
            )
            .await
            .unwrap();
    }

    assert_eq!(next_event(&mut events).await.event(), "READY");
    for seq in 2..=4 {
        let event = next_event(&mut events).await;
        assert_eq!(event.sequence(), Some(seq));
        assert_eq!(event.data()["content"], format!("compressed {seq}"));
    }
    assert_eq!(client.session().status(), ConnectionStatus::Connected);

    client.shutdown().await.unwrap();
}

// ============================================================================
// Reconnect Tests
// ============================================================================

#[tokio::test]
async fn test_resume_on_resume_url_after_server_close() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut resume_gateway = MockGateway::start().await.unwrap();
    let config = test_config(None, Some(&gateway));
    let (router, mut events) = recording_router(None);
    let client = start(&config, &gateway, router);

    let mut socket = gateway.accept().await.unwrap();
    socket.handshake(HEARTBEAT_INTERVAL).await.unwrap();
    socket
        .send(&GatewayFrame::dispatch("READY", 1, ready_json("session-r", &resume_gateway.url())))
        .await
        .unwrap();
    socket
        .send(&GatewayFrame::dispatch(
            "MESSAGE_CREATE",
            42,
            message_json(unique_id(), 10, "before close"),
        ))
        .await
        .unwrap();
    assert_eq!(next_event(&mut events).await.sequence(), Some(1));
    assert_eq!(next_event(&mut events).await.sequence(), Some(42));

    socket.close(4000).await.unwrap();

    let mut resumed = resume_gateway.accept().await.unwrap();
    let resume = resumed.handshake(HEARTBEAT_INTERVAL).await.unwrap();
    assert_eq!(resume.op, OpCode::Resume);
    assert_eq!(resume.d["token"], TEST_TOKEN);
    assert_eq!(resume.d["session_id"], "session-r");
    assert_eq!(resume.d["seq"], 42);

    resumed
        .send(&GatewayFrame::dispatch("RESUMED", 43, json!({})))
        .await
        .unwrap();
    resumed
        .send(&GatewayFrame::dispatch(
            "MESSAGE_CREATE",
            44,
            message_json(unique_id(), 10, "after resume"),
        ))
        .await
        .unwrap();

    assert_eq!(next_event(&mut events).await.event(), "RESUMED");
    let replayed = next_event(&mut events).await;
    assert_eq!(replayed.sequence(), Some(44));
    assert_eq!(replayed.data()["content"], "after resume");

    client.session().wait_ready().await.unwrap();
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_session_identifies_again() {
    let mut gateway = MockGateway::start().await.unwrap();
    let config = test_config(None, Some(&gateway));
    let (router, _events) = recording_router(None);
    let client = start(&config, &gateway, router);

    let mut socket = gateway.accept().await.unwrap();
    socket.handshake(HEARTBEAT_INTERVAL).await.unwrap();
    socket
        .send(&GatewayFrame::dispatch("READY", 1, ready_json("session-i", &gateway.url())))
        .await
        .unwrap();
    client.session().wait_ready().await.unwrap();

    socket
        .send(&GatewayFrame::invalid_session(false))
        .await
        .unwrap();
    assert_eq!(socket.recv_close().await.unwrap(), Some(1000));

    // Waits one to five seconds before identifying from scratch
    let mut fresh = gateway.accept_within(Duration::from_secs(8)).await.unwrap();
    let identify = fresh.handshake(HEARTBEAT_INTERVAL).await.unwrap();
    assert_eq!(identify.op, OpCode::Identify);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_authentication_failure_is_fatal() {
    let mut gateway = MockGateway::start().await.unwrap();
    let config = test_config(None, Some(&gateway));
    let (router, _events) = recording_router(None);
    let client = start(&config, &gateway, router);

    let mut socket = gateway.accept().await.unwrap();
    assert_eq!(
        socket.handshake(HEARTBEAT_INTERVAL).await.unwrap().op,
        OpCode::Identify
    );
    socket.close(4004).await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), client.join())
        .await
        .unwrap()
        .unwrap_err();
    assert!(err.is_authentication_failure());
    assert!(matches!(err, GatewayError::FatalClose { code: 4004, .. }));
}
