//! Test fixtures and payload builders
//!
//! JSON shaped like the platform's wire format, for the mock servers to send.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for unique snowflakes
static COUNTER: AtomicU64 = AtomicU64::new(1_000);

/// Get a unique id for test records
pub fn unique_id() -> u64 {
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

pub const BOT_USER_ID: u64 = 1;

pub fn user_json(id: u64, username: &str) -> Value {
    json!({
        "id": id.to_string(),
        "username": username,
        "global_name": null,
        "avatar": null,
        "bot": id == BOT_USER_ID
    })
}

pub fn bot_user_json() -> Value {
    user_json(BOT_USER_ID, "chatlink-bot")
}

/// READY payload with one unavailable guild
pub fn ready_json(session_id: &str, resume_gateway_url: &str) -> Value {
    json!({
        "v": 10,
        "user": bot_user_json(),
        "guilds": [{"id": "100", "unavailable": true}],
        "session_id": session_id,
        "resume_gateway_url": resume_gateway_url,
        "shard": [0, 1]
    })
}

pub fn guild_json(id: u64, name: &str) -> Value {
    json!({
        "id": id.to_string(),
        "name": name,
        "icon": null,
        "owner_id": "2",
        "roles": [{
            "id": id.to_string(),
            "name": "@everyone",
            "position": 0,
            "permissions": "1024"
        }],
        "member_count": 2
    })
}

pub fn text_channel_json(id: u64, guild_id: u64, name: &str) -> Value {
    json!({
        "id": id.to_string(),
        "type": 0,
        "guild_id": guild_id.to_string(),
        "name": name,
        "position": 0
    })
}

pub fn message_json(id: u64, channel_id: u64, content: &str) -> Value {
    json!({
        "id": id.to_string(),
        "channel_id": channel_id.to_string(),
        "author": bot_user_json(),
        "content": content,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "tts": false,
        "mention_everyone": false,
        "mentions": [],
        "mention_roles": [],
        "attachments": [],
        "embeds": [],
        "pinned": false
    })
}

pub fn gateway_bot_json(url: &str) -> Value {
    json!({
        "url": url,
        "shards": 1,
        "session_start_limit": {
            "total": 1000,
            "remaining": 999,
            "reset_after": 14_400_000,
            "max_concurrency": 1
        }
    })
}

/// Error body the platform sends with 4xx responses
pub fn api_error_json(code: u64, message: &str) -> Value {
    json!({"code": code, "message": message})
}
