//! Typed REST endpoints
//!
//! Every call goes through the [`RequestScheduler`] and returns a
//! [`TaskFuture`] of the decoded record.

use std::sync::Arc;

use chatlink_common::{ClientConfig, ClientError, ClientResult, RestConfig};
use chatlink_core::{Channel, Emoji, FromData, Guild, Member, Message, ModelError, Snowflake, User};
use chatlink_task::TaskFuture;
use serde::Serialize;

use crate::payloads::{CreateMessage, EditMessage, GatewayBot, ModifyCurrentUser};
use crate::request::QueuedRequest;
use crate::route::{encode_component, Route};
use crate::scheduler::RequestScheduler;
use crate::transport::{HttpTransport, ReqwestTransport};

/// REST client for the chat platform
#[derive(Debug, Clone)]
pub struct RestClient {
    scheduler: RequestScheduler,
}

impl RestClient {
    /// Create a client authorizing as the bot `token`
    pub fn new(token: &str, config: &RestConfig) -> ClientResult<Self> {
        let transport = ReqwestTransport::new(token, config)?;
        Ok(Self::with_transport(Arc::new(transport), config.clone()))
    }

    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        Self::new(&config.token, &config.rest)
    }

    /// Create a client on top of a custom transport
    pub fn with_transport(transport: Arc<dyn HttpTransport>, config: RestConfig) -> Self {
        Self {
            scheduler: RequestScheduler::new(transport, config),
        }
    }

    #[must_use]
    pub fn scheduler(&self) -> &RequestScheduler {
        &self.scheduler
    }

    /// Submit a request and decode the response body as `T`
    pub fn request<T>(&self, request: QueuedRequest) -> TaskFuture<T>
    where
        T: FromData + Send + 'static,
    {
        self.scheduler.submit(request).map(|response| response.decode::<T>())
    }

    /// Submit a request whose response body is ignored
    pub fn request_empty(&self, request: QueuedRequest) -> TaskFuture<()> {
        self.scheduler.submit(request).map(|_| Ok(()))
    }

    fn request_json<B, T>(&self, route: Route, body: &B) -> TaskFuture<T>
    where
        B: Serialize + ?Sized,
        T: FromData + Send + 'static,
    {
        match QueuedRequest::new(route).json(body) {
            Ok(request) => self.request(request),
            Err(err) => TaskFuture::ready(Err(err)),
        }
    }

    // Gateway

    pub fn get_gateway_bot(&self) -> TaskFuture<GatewayBot> {
        self.request(QueuedRequest::new(Route::get("/gateway/bot")))
    }

    // Users

    pub fn get_current_user(&self) -> TaskFuture<User> {
        self.request(QueuedRequest::new(Route::get("/users/@me")))
    }

    pub fn get_user(&self, user_id: Snowflake) -> TaskFuture<User> {
        self.request(QueuedRequest::new(Route::get(format!("/users/{user_id}"))))
    }

    pub fn modify_current_user(&self, changes: &ModifyCurrentUser) -> TaskFuture<User> {
        self.request_json(Route::patch("/users/@me"), changes)
    }

    // Channels

    pub fn get_channel(&self, channel_id: Snowflake) -> TaskFuture<Channel> {
        self.request(QueuedRequest::new(Route::get(format!("/channels/{channel_id}"))))
    }

    pub fn trigger_typing(&self, channel_id: Snowflake) -> TaskFuture<()> {
        self.request_empty(QueuedRequest::new(Route::post(format!(
            "/channels/{channel_id}/typing"
        ))))
    }

    // Guilds

    pub fn get_guild(&self, guild_id: Snowflake) -> TaskFuture<Guild> {
        self.request(QueuedRequest::new(Route::get(format!("/guilds/{guild_id}"))))
    }

    pub fn get_guild_channels(&self, guild_id: Snowflake) -> TaskFuture<Vec<Channel>> {
        self.request::<Vec<Channel>>(QueuedRequest::new(Route::get(format!(
            "/guilds/{guild_id}/channels"
        ))))
        .map(move |channels| {
            Ok(channels
                .into_iter()
                .map(|channel| channel.with_guild_id(guild_id))
                .collect())
        })
    }

    pub fn get_guild_member(&self, guild_id: Snowflake, user_id: Snowflake) -> TaskFuture<Member> {
        self.request::<Member>(QueuedRequest::new(Route::get(format!(
            "/guilds/{guild_id}/members/{user_id}"
        ))))
        .map(move |mut member| {
            member.guild_id = Some(guild_id);
            Ok(member)
        })
    }

    // Messages

    /// Send a message; attachments switch the body to multipart
    pub fn create_message(&self, channel_id: Snowflake, message: &CreateMessage) -> TaskFuture<Message> {
        if message.is_empty() {
            return TaskFuture::ready(Err(ClientError::InvalidData(ModelError::InvalidData {
                record: "CreateMessage",
                reason: "a message needs content, an embed or a file".to_string(),
            })));
        }

        let route = Route::post(format!("/channels/{channel_id}/messages"));
        if message.files.is_empty() {
            return self.request_json(route, message);
        }

        match serde_json::to_value(message) {
            Ok(payload) => self.request(
                QueuedRequest::new(route).multipart(Some(payload), message.files.clone()),
            ),
            Err(err) => TaskFuture::ready(Err(ClientError::internal(err))),
        }
    }

    pub fn edit_message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        changes: &EditMessage,
    ) -> TaskFuture<Message> {
        self.request_json(
            Route::patch(format!("/channels/{channel_id}/messages/{message_id}")),
            changes,
        )
    }

    pub fn delete_message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        reason: Option<&str>,
    ) -> TaskFuture<()> {
        let mut request = QueuedRequest::new(Route::delete(format!(
            "/channels/{channel_id}/messages/{message_id}"
        )));
        if let Some(reason) = reason {
            request = request.reason(reason);
        }
        self.request_empty(request)
    }

    /// React to a message as the current user
    pub fn create_reaction(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
        emoji: &Emoji,
    ) -> TaskFuture<()> {
        self.request_empty(QueuedRequest::new(Route::put(format!(
            "/channels/{channel_id}/messages/{message_id}/reactions/{}/@me",
            encode_component(&emoji.route_component())
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageData;
    use crate::mock::{response, MockTransport};
    use crate::request::{FileAttachment, RequestBody};
    use chatlink_core::ChannelInfo;
    use reqwest::Method;
    use serde_json::json;

    fn client(mock: &Arc<MockTransport>) -> RestClient {
        RestClient::with_transport(Arc::clone(mock) as Arc<dyn HttpTransport>, RestConfig::default())
    }

    const MESSAGE: &str = r#"{
        "id": "10", "channel_id": "20",
        "author": {"id": "30", "username": "bot", "bot": true},
        "content": "hello", "timestamp": "2024-01-01T00:00:00+00:00"
    }"#;

    #[tokio::test]
    async fn test_get_current_user() {
        let mock = MockTransport::new();
        mock.push(response(200, &[], r#"{"id": "1", "username": "me", "bot": true}"#));

        let user = client(&mock).get_current_user().await.unwrap();
        assert!(user.bot);
        assert_eq!(mock.calls()[0].1, "/users/@me");
    }

    #[tokio::test]
    async fn test_invalid_record_surfaces_as_error() {
        let mock = MockTransport::new();
        mock.push(response(200, &[], r#"{"username": "missing id"}"#));

        let err = client(&mock).get_user(Snowflake::new(1)).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_create_message_json() {
        let mock = MockTransport::new();
        mock.push(response(200, &[], MESSAGE));

        let message = client(&mock)
            .create_message(Snowflake::new(20), &CreateMessage::content("hello"))
            .await
            .unwrap();
        assert_eq!(message.content, "hello");

        let request = &mock.requests()[0];
        assert_eq!(request.route.method(), &Method::POST);
        assert_eq!(request.route.path(), "/channels/20/messages");
        assert_eq!(request.body, RequestBody::Json(json!({"content": "hello"})));
    }

    #[tokio::test]
    async fn test_create_message_with_file_uses_multipart() {
        let mock = MockTransport::new();
        mock.push(response(200, &[], MESSAGE));

        let outgoing = CreateMessage::content("see file").file(FileAttachment::new("log.txt", b"abc".to_vec()));
        client(&mock).create_message(Snowflake::new(20), &outgoing).await.unwrap();

        match &mock.requests()[0].body {
            RequestBody::Multipart { payload_json, files } => {
                assert_eq!(payload_json.as_ref(), Some(&json!({"content": "see file"})));
                assert_eq!(files[0].filename, "log.txt");
            }
            other => panic!("expected multipart body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected_locally() {
        let mock = MockTransport::new();
        let err = client(&mock)
            .create_message(Snowflake::new(1), &CreateMessage::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidData(_)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_message_with_reason() {
        let mock = MockTransport::new();
        mock.push(response(204, &[], ""));

        client(&mock)
            .delete_message(Snowflake::new(1), Snowflake::new(2), Some("spam"))
            .await
            .unwrap();

        let request = &mock.requests()[0];
        assert_eq!(request.route.method(), &Method::DELETE);
        assert_eq!(request.reason.as_deref(), Some("spam"));
    }

    #[tokio::test]
    async fn test_create_reaction_encodes_emoji() {
        let mock = MockTransport::new();
        mock.push(response(204, &[], ""));

        let emoji = Emoji::Unicode {
            name: "👍".to_string(),
        };
        client(&mock)
            .create_reaction(Snowflake::new(1), Snowflake::new(2), &emoji)
            .await
            .unwrap();
        assert_eq!(mock.calls()[0].1, "/channels/1/messages/2/reactions/%F0%9F%91%8D/@me");
    }

    #[tokio::test]
    async fn test_guild_channels_carry_guild_id() {
        let mock = MockTransport::new();
        mock.push(response(
            200,
            &[],
            r#"[{"id": "1", "type": 0, "name": "general"}, {"id": "2", "type": 2, "name": "voice"}]"#,
        ));

        let channels = client(&mock).get_guild_channels(Snowflake::new(99)).await.unwrap();
        assert_eq!(channels.len(), 2);
        assert!(channels.iter().all(|c| c.guild_id() == Some(Snowflake::new(99))));
    }

    #[tokio::test]
    async fn test_guild_member_carries_guild_id() {
        let mock = MockTransport::new();
        mock.push(response(
            200,
            &[],
            r#"{"user": {"id": "5", "username": "m"}, "roles": [], "joined_at": "2024-01-01T00:00:00+00:00"}"#,
        ));

        let member = client(&mock)
            .get_guild_member(Snowflake::new(7), Snowflake::new(5))
            .await
            .unwrap();
        assert_eq!(member.guild_id, Some(Snowflake::new(7)));
        assert_eq!(member.user_id(), Some(Snowflake::new(5)));
    }

    #[tokio::test]
    async fn test_modify_current_user_sends_data_uri() {
        let mock = MockTransport::new();
        mock.push(response(200, &[], r#"{"id": "1", "username": "renamed"}"#));

        let avatar = ImageData::from_bytes(b"GIF89a").unwrap();
        let changes = ModifyCurrentUser {
            username: Some("renamed".to_string()),
            avatar: Some(avatar),
        };
        client(&mock).modify_current_user(&changes).await.unwrap();

        let RequestBody::Json(body) = &mock.requests()[0].body else {
            panic!("expected JSON body");
        };
        assert!(body["avatar"].as_str().unwrap().starts_with("data:image/gif;base64,"));
    }

    #[tokio::test]
    async fn test_cancel_mapped_request() {
        let mock = MockTransport::new();
        let client = client(&mock);
        let future = client.get_current_user();
        future.cancel();
        assert!(matches!(future.wait().await, Err(ClientError::Cancelled)));
    }
}
