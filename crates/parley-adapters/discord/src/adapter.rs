//! Discord adapter.
//!
//! Inbound events arrive through the gateway websocket; outbound calls go
//! through the REST API. Discord references the answered message in every
//! reply, so listening uses per-handle collectors (see [`crate::collector`])
//! instead of a shared correlation map.
//!
//! # Configuration
//!
//! ```yaml
//! adapters:
//!   discord:
//!     token: ${DISCORD_BOT_TOKEN}
//! ```
//!
//! ```rust,ignore
//! use parley_adapter_discord::DiscordAdapter;
//!
//! runtime.register_adapter::<DiscordAdapter>()?;
//! ```

use std::any::Any;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use parley_core::{
    AdapterError, AdapterResult, ChatIo, ConfigurableAdapter, DispatchForm, DispatchedHandle,
    DispatchedInfo, EventHub, Platform, PlatformAdapter, TransportError, UsageError, UsageResult,
};
use parley_transport::{WsClient, WsConfig, WsConnection};

use crate::api::{DiscordApi, OutboundFile, OutboundMessage, RestDiscordApi};
use crate::collector::{DiscordListenHooks, InboundMessage, InboundReaction};
use crate::config::DiscordConfig;
use crate::gateway::GatewaySession;
use crate::model::{
    Channel, GuildCreate, GuildMemberUpdate, Message, ReactionAdd, ThreadMembersUpdate, User,
    VoiceState,
};
use crate::normalize::Normalizer;

/// Inbound items buffered per collector before it starts lagging.
const COLLECTOR_BUFFER: usize = 256;

/// The Discord adapter.
pub struct DiscordAdapter {
    me: Weak<DiscordAdapter>,
    hub: EventHub,
    config: DiscordConfig,
    api: Arc<dyn DiscordApi>,
    hooks: Arc<DiscordListenHooks>,
    normalizer: Normalizer,
    messages: broadcast::Sender<Arc<InboundMessage>>,
    reactions: broadcast::Sender<Arc<InboundReaction>>,
    bot_user: RwLock<Option<User>>,
    connection: Mutex<Option<WsConnection>>,
}

impl DiscordAdapter {
    /// Creates an adapter that calls the Discord REST API.
    pub fn new(config: DiscordConfig) -> AdapterResult<Arc<Self>> {
        let api = RestDiscordApi::new(&config.api_base, &config.token)?;
        Ok(Self::with_api(config, Arc::new(api)))
    }

    /// Creates an adapter on top of any [`DiscordApi`].
    pub fn with_api(config: DiscordConfig, api: Arc<dyn DiscordApi>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let erased: Weak<dyn PlatformAdapter> = me.clone();
            let (messages, _) = broadcast::channel(COLLECTOR_BUFFER);
            let (reactions, _) = broadcast::channel(COLLECTOR_BUFFER);
            Self {
                me: me.clone(),
                hub: EventHub::new(erased),
                hooks: Arc::new(DiscordListenHooks::new(
                    me.clone(),
                    messages.clone(),
                    reactions.clone(),
                )),
                normalizer: Normalizer::new(),
                messages,
                reactions,
                bot_user: RwLock::new(None),
                connection: Mutex::new(None),
                config,
                api,
            }
        })
    }

    /// Returns the adapter configuration.
    pub fn config(&self) -> &DiscordConfig {
        &self.config
    }

    /// Returns the collector-backed listen hooks.
    pub fn hooks(&self) -> &Arc<DiscordListenHooks> {
        &self.hooks
    }

    /// Returns the normalizer and its cached state.
    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Returns the bot user once the gateway reported it.
    pub fn bot_user(&self) -> Option<User> {
        self.bot_user.read().clone()
    }

    /// Records the bot user; its own messages are ignored from then on.
    pub fn set_bot_user(&self, user: User) {
        *self.bot_user.write() = Some(user);
    }

    fn is_own(&self, user_id: &str) -> bool {
        self.bot_user
            .read()
            .as_ref()
            .is_some_and(|bot| bot.id == user_id)
    }

    /// Handles one gateway dispatch by event name.
    pub async fn handle_dispatch(&self, name: &str, data: Value) -> AdapterResult<()> {
        match name {
            "MESSAGE_CREATE" => self.handle_message(parse(name, data)?).await,
            "MESSAGE_REACTION_ADD" => self.handle_reaction(parse(name, data)?).await,
            "GUILD_CREATE" => {
                let guild: GuildCreate = parse(name, data)?;
                debug!(guild_id = %guild.id, threads = guild.threads.len(), "guild available");
                self.normalizer.observe_guild(&guild);
            }
            "THREAD_CREATE" => self.normalizer.observe_channel(&parse::<Channel>(name, data)?),
            "THREAD_UPDATE" => {
                if let Some(log) = self.normalizer.thread_update(&parse::<Channel>(name, data)?) {
                    self.trigger_event(log.into());
                }
            }
            "GUILD_MEMBER_UPDATE" => {
                if let Some(log) = self
                    .normalizer
                    .member_update(&parse::<GuildMemberUpdate>(name, data)?)
                {
                    self.trigger_event(log.into());
                }
            }
            "VOICE_STATE_UPDATE" => {
                if let Some(log) = self.normalizer.voice_state(&parse::<VoiceState>(name, data)?) {
                    self.trigger_event(log.into());
                }
            }
            "THREAD_MEMBERS_UPDATE" => {
                let update: ThreadMembersUpdate = parse(name, data)?;
                for log in self.normalizer.thread_members(&update) {
                    self.trigger_event(log.into());
                }
            }
            other => trace!(event = other, "ignoring gateway dispatch"),
        }
        Ok(())
    }

    async fn handle_message(&self, message: Message) {
        if self.is_own(&message.author.id) {
            trace!(message_id = %message.id, "skipping own message");
            return;
        }

        let replied = match (message.referenced_message.as_deref(), message.reply_target()) {
            (Some(referenced), _) => Some(referenced.clone()),
            (None, Some(target)) => {
                let channel_id = message
                    .message_reference
                    .as_ref()
                    .and_then(|reference| reference.channel_id.as_deref())
                    .unwrap_or(&message.channel_id);
                match self.api.message(channel_id, target).await {
                    Ok(fetched) => Some(fetched),
                    Err(e) => {
                        debug!(message_id = %message.id, reply_to = target, error = %e, "replied message unavailable");
                        None
                    }
                }
            }
            (None, None) => None,
        };

        let event = self.normalizer.message(&message, replied.as_ref());
        // No receivers just means nothing is listening.
        let _ = self.messages.send(Arc::new(InboundMessage {
            raw: message,
            event: event.clone(),
        }));
        self.trigger_event(event);
    }

    async fn handle_reaction(&self, reaction: ReactionAdd) {
        let author = match &reaction.message_author_id {
            Some(author) => author.clone(),
            None => match self.api.message(&reaction.channel_id, &reaction.message_id).await {
                Ok(message) => message.author.id,
                Err(e) => {
                    debug!(message_id = %reaction.message_id, error = %e, "reacted message unavailable");
                    String::new()
                }
            },
        };

        let event = self.normalizer.reaction(&reaction, author);
        let _ = self.reactions.send(Arc::new(InboundReaction {
            raw: reaction,
            event: event.clone(),
        }));
        self.trigger_event(event);
    }

    /// Fetches a channel that messages can be posted in.
    async fn text_channel(&self, channel_id: &str) -> AdapterResult<Channel> {
        match self.api.channel(channel_id).await? {
            None => Err(AdapterError::rejected("Invalid thread/channelID")),
            Some(channel) if !channel.is_text_based() => Err(AdapterError::rejected(
                "cannot send to a channel that is not text based",
            )),
            Some(channel) => Ok(channel),
        }
    }

    async fn deliver(&self, handle: DispatchedHandle) {
        let outcome = self.send_form(&handle).await;
        if let Err(err) = &outcome {
            error!(handle_id = %handle.id(), error = %err, "discord dispatch failed");
        }
        if let Err(err) = handle.resolve_response(outcome) {
            warn!(handle_id = %handle.id(), error = %err, "dispatch settled elsewhere");
        }
    }

    async fn send_form(&self, handle: &DispatchedHandle) -> AdapterResult<DispatchedInfo> {
        let form = handle.begin_send()?;
        let channel_id = form.thread.clone().ok_or(UsageError::MissingThread)?;
        self.text_channel(&channel_id).await?;

        let content = form
            .render_body(Platform::Discord)
            .filter(|text| !text.is_empty());
        let mut files = Vec::with_capacity(form.attachments.len());
        for attachment in &form.attachments {
            let bytes = attachment.load().await.map_err(TransportError::from)?;
            files.push(OutboundFile {
                name: attachment.name.clone(),
                bytes,
            });
        }

        let message = self
            .api
            .create_message(OutboundMessage {
                channel_id,
                content,
                reply_to: form.reply_to.clone(),
                files,
            })
            .await?;

        let timestamp = message
            .created_millis()
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        Ok(DispatchedInfo::new(message.id, message.channel_id, timestamp))
    }
}

fn parse<T: DeserializeOwned>(event: &str, data: Value) -> AdapterResult<T> {
    serde_json::from_value(data).map_err(|e| AdapterError::parse(format!("{event}: {e}")))
}

#[async_trait]
impl PlatformAdapter for DiscordAdapter {
    fn name() -> &'static str {
        "discord"
    }

    fn platform(&self) -> Platform {
        Platform::Discord
    }

    fn event_hub(&self) -> &EventHub {
        &self.hub
    }

    async fn on_start_listen(&self) -> AdapterResult<()> {
        let url = self.api.gateway_url().await?;
        let session = Arc::new(GatewaySession::new(
            self.me.clone(),
            self.config.token.clone(),
            self.config.intents,
        ));
        let connection =
            WsClient::connect(&url, session, WsConfig::from(&self.config.reconnect)).await?;
        info!(url = %url, "Discord gateway connected");
        *self.connection.lock() = Some(connection);
        Ok(())
    }

    async fn on_stop_listen(&self) -> AdapterResult<()> {
        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            connection.close().await;
        }
        Ok(())
    }

    fn on_dispatch(&self, _io: &ChatIo, form: DispatchForm) -> UsageResult<DispatchedHandle> {
        let handle = DispatchedHandle::new(Platform::Discord, form, self.hooks.clone());
        match self.me.upgrade() {
            Some(adapter) => {
                let pending = handle.clone();
                tokio::spawn(async move { adapter.deliver(pending).await });
            }
            None => {
                handle.resolve_response(Err(AdapterError::internal("adapter is shutting down")))?;
            }
        }
        Ok(handle)
    }

    async fn on_unsend(&self, _io: &ChatIo, message_id: &str, thread_id: &str) -> AdapterResult<()> {
        self.text_channel(thread_id).await?;
        self.api.delete_message(thread_id, message_id).await?;
        debug!(message_id, thread_id, "message deleted");
        Ok(())
    }

    async fn on_resolve_username(&self, user_id: &str) -> AdapterResult<String> {
        match self.api.user(user_id).await {
            Ok(user) if !user.username.is_empty() => Ok(user.username),
            Ok(_) => Err(AdapterError::username_unresolved(user_id)),
            Err(err) => {
                debug!(user_id, error = %err, "user lookup failed");
                Err(AdapterError::username_unresolved(user_id))
            }
        }
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl ConfigurableAdapter for DiscordAdapter {
    type Config = DiscordConfig;

    fn from_config(config: Self::Config) -> AdapterResult<Arc<Self>> {
        if config.token.is_empty() {
            return Err(AdapterError::InvalidConfig(
                "adapters.discord.token is required".into(),
            ));
        }
        Self::new(config)
    }

    fn enabled(config: &Self::Config) -> bool {
        config.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use parley_core::{BoxedAdapter, EventType, InferredEvent, LogEventType, MessageEvent};
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::{mpsc, oneshot};
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    const SENT_AT: &str = "2024-05-01T12:00:00+00:00";

    #[derive(Default)]
    struct MockDiscord {
        gateway: Mutex<String>,
        created: Mutex<Vec<OutboundMessage>>,
        deleted: Mutex<Vec<(String, String)>>,
        stored: Mutex<HashMap<String, Message>>,
    }

    fn message_json(id: &str, author: &str, content: &str) -> Value {
        json!({
            "id": id,
            "channel_id": "C1",
            "author": {"id": author, "username": author.to_lowercase(), "bot": author == "BOT"},
            "content": content,
            "timestamp": SENT_AT,
        })
    }

    fn channel(id: &str, kind: u8) -> Channel {
        serde_json::from_value(json!({"id": id, "type": kind})).unwrap()
    }

    #[async_trait]
    impl DiscordApi for MockDiscord {
        async fn gateway_url(&self) -> AdapterResult<String> {
            Ok(self.gateway.lock().clone())
        }

        async fn channel(&self, channel_id: &str) -> AdapterResult<Option<Channel>> {
            Ok(match channel_id {
                "C1" => Some(channel("C1", 0)),
                "CAT" => Some(channel("CAT", 4)),
                _ => None,
            })
        }

        async fn message(&self, _channel_id: &str, message_id: &str) -> AdapterResult<Message> {
            self.stored
                .lock()
                .get(message_id)
                .cloned()
                .ok_or_else(|| AdapterError::rejected("404: Unknown Message"))
        }

        async fn create_message(&self, message: OutboundMessage) -> AdapterResult<Message> {
            let mut created = self.created.lock();
            created.push(message.clone());
            let id = format!("M{}", created.len());
            let sent: Message = serde_json::from_value(message_json(
                &id,
                "BOT",
                message.content.as_deref().unwrap_or_default(),
            ))
            .unwrap();
            self.stored.lock().insert(id, sent.clone());
            Ok(sent)
        }

        async fn delete_message(&self, channel_id: &str, message_id: &str) -> AdapterResult<()> {
            self.deleted
                .lock()
                .push((channel_id.to_string(), message_id.to_string()));
            Ok(())
        }

        async fn user(&self, user_id: &str) -> AdapterResult<User> {
            if user_id != "U1" {
                return Err(AdapterError::rejected("404: Unknown User"));
            }
            Ok(User {
                id: "U1".into(),
                username: "ada".into(),
                global_name: Some("Ada Lovelace".into()),
                bot: false,
            })
        }
    }

    fn adapter_with(api: Arc<MockDiscord>) -> Arc<DiscordAdapter> {
        let config = DiscordConfig {
            token: "token".into(),
            ..Default::default()
        };
        DiscordAdapter::with_api(config, api)
    }

    fn inbound(adapter: &Arc<DiscordAdapter>) -> ChatIo {
        let boxed: BoxedAdapter = adapter.clone();
        ChatIo::new(
            InferredEvent::Message(MessageEvent::new("U1", "C1", "IN1", "+quiz")),
            boxed,
        )
    }

    fn observe(adapter: &Arc<DiscordAdapter>) -> mpsc::UnboundedReceiver<InferredEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        adapter
            .event_hub()
            .subscribe(Arc::new(move |event: &InferredEvent, _: &BoxedAdapter| {
                let _ = tx.send(event.clone());
            }));
        rx
    }

    #[tokio::test]
    async fn test_reply_references_inbound_message() {
        let api = Arc::new(MockDiscord::default());
        let adapter = adapter_with(api.clone());

        let info = inbound(&adapter)
            .reply("What is 2 + 2?")
            .unwrap()
            .await_ready()
            .await
            .unwrap();

        assert_eq!(info, DispatchedInfo::new("M1", "C1", 1_714_564_800_000));
        assert_eq!(
            api.created.lock().clone(),
            vec![OutboundMessage {
                channel_id: "C1".into(),
                content: Some("What is 2 + 2?".into()),
                reply_to: Some("IN1".into()),
                files: Vec::new(),
            }]
        );
    }

    #[tokio::test]
    async fn test_dispatch_validates_channel() {
        let api = Arc::new(MockDiscord::default());
        let adapter = adapter_with(api.clone());
        let io = inbound(&adapter);

        let missing = io.send_to("hi", "NOPE").unwrap();
        let err = missing.await_ready().await.unwrap_err();
        assert_eq!(err.to_string(), "platform rejected request: Invalid thread/channelID");
        assert!(missing.is_failed());

        let category = io.send_to("hi", "CAT").unwrap();
        assert!(matches!(
            category.await_ready().await,
            Err(AdapterError::Rejected(_))
        ));
        assert!(api.created.lock().is_empty());
    }

    #[tokio::test]
    async fn test_reply_collector_and_dual_dispatch() {
        let adapter = adapter_with(Arc::new(MockDiscord::default()));
        let mut routed = observe(&adapter);

        let handle = inbound(&adapter).reply("What is 2 + 2?").unwrap();
        let mut replies = handle.subscribe_replies();
        handle
            .listen_replies(Some(Duration::from_secs(30)))
            .await
            .unwrap();
        assert_eq!(adapter.hooks().reply_collectors(), 1);

        let mut unrelated = message_json("199", "U1", "off topic");
        unrelated["message_reference"] = json!({"message_id": "OTHER"});
        adapter.handle_dispatch("MESSAGE_CREATE", unrelated).await.unwrap();

        let mut answer = message_json("200", "U1", "4");
        answer["message_reference"] = json!({"message_id": "M1", "channel_id": "C1"});
        answer["referenced_message"] = message_json("M1", "BOT", "What is 2 + 2?");
        adapter.handle_dispatch("MESSAGE_CREATE", answer).await.unwrap();

        let reply = replies.recv().await.unwrap();
        assert_eq!(reply.event.as_message().unwrap().body, "4");
        assert_eq!(reply.event.replied_message().unwrap().message_id, "M1");
        assert_eq!(reply.io.reply_to(), Some("200"));

        assert_eq!(routed.recv().await.unwrap().event_type(), EventType::Message);
        assert_eq!(routed.recv().await.unwrap().event_type(), EventType::MessageReply);

        handle.stop_listen_replies().unwrap();
        assert_eq!(adapter.hooks().reply_collectors(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relisten_extends_reply_collector() {
        let adapter = adapter_with(Arc::new(MockDiscord::default()));
        let handle = inbound(&adapter).reply("What is 2 + 2?").unwrap();
        let mut replies = handle.subscribe_replies();

        handle
            .listen_replies(Some(Duration::from_millis(50)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        handle
            .listen_replies(Some(Duration::from_millis(50)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(handle.is_listening_replies());
        assert_eq!(adapter.hooks().reply_collectors(), 1);

        let mut answer = message_json("200", "U1", "4");
        answer["message_reference"] = json!({"message_id": "M1", "channel_id": "C1"});
        answer["referenced_message"] = message_json("M1", "BOT", "What is 2 + 2?");
        adapter.handle_dispatch("MESSAGE_CREATE", answer).await.unwrap();

        let reply = tokio::time::timeout(Duration::from_millis(10), replies.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.event.as_message().unwrap().body, "4");

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!handle.is_listening_replies());
        assert_eq!(adapter.hooks().reply_collectors(), 0);
    }

    #[tokio::test]
    async fn test_missing_reference_is_fetched() {
        let adapter = adapter_with(Arc::new(MockDiscord::default()));
        let mut routed = observe(&adapter);
        inbound(&adapter).send("question").unwrap().await_ready().await.unwrap();

        let mut answer = message_json("300", "U1", "answer");
        answer["message_reference"] = json!({"message_id": "M1"});
        adapter.handle_dispatch("MESSAGE_CREATE", answer).await.unwrap();

        let event = routed.recv().await.unwrap();
        assert_eq!(event.event_type(), EventType::MessageReply);
        assert_eq!(event.replied_message().unwrap().body, "question");
    }

    #[tokio::test]
    async fn test_own_messages_are_skipped() {
        let adapter = adapter_with(Arc::new(MockDiscord::default()));
        let mut routed = observe(&adapter);
        adapter.set_bot_user(User {
            id: "BOT".into(),
            username: "bot".into(),
            global_name: None,
            bot: true,
        });

        adapter
            .handle_dispatch("MESSAGE_CREATE", message_json("1", "BOT", "echo"))
            .await
            .unwrap();
        adapter
            .handle_dispatch("MESSAGE_CREATE", message_json("2", "U1", "hi"))
            .await
            .unwrap();

        assert_eq!(routed.recv().await.unwrap().as_message().unwrap().message_id, "2");
        assert!(routed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reaction_collector() {
        let adapter = adapter_with(Arc::new(MockDiscord::default()));
        let handle = inbound(&adapter).send("vote!").unwrap();
        let mut reactions = handle.subscribe_reactions();
        handle.listen_reactions(None).await.unwrap();
        assert_eq!(adapter.hooks().reaction_collectors(), 1);

        adapter
            .handle_dispatch(
                "MESSAGE_REACTION_ADD",
                json!({
                    "user_id": "U2",
                    "channel_id": "C1",
                    "message_id": "M1",
                    "message_author_id": "BOT",
                    "emoji": {"id": null, "name": "👍"}
                }),
            )
            .await
            .unwrap();

        let notification = reactions.recv().await.unwrap();
        assert_eq!(notification.event.user_id, "U2");
        assert_eq!(notification.event.sender_id, "BOT");
        assert_eq!(notification.event.reaction, "👍");

        handle.stop_listen_reactions().unwrap();
        assert_eq!(adapter.hooks().reaction_collectors(), 0);
    }

    #[tokio::test]
    async fn test_unsend_deletes_message() {
        let api = Arc::new(MockDiscord::default());
        let adapter = adapter_with(api.clone());
        let io = inbound(&adapter);

        let handle = io.send("temporary").unwrap();
        io.unsend(&handle).await.unwrap();
        assert_eq!(api.deleted.lock().clone(), vec![("C1".to_string(), "M1".to_string())]);

        let err = io.unsend_message("M9", Some("CAT")).await.unwrap_err();
        assert!(matches!(err, AdapterError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_resolve_username() {
        let adapter = adapter_with(Arc::new(MockDiscord::default()));
        let io = inbound(&adapter);

        assert_eq!(io.resolve_username("U1").await.unwrap(), "ada");
        let err = io.resolve_username("U404").await.unwrap_err();
        assert!(matches!(err, AdapterError::UsernameUnresolved { .. }));
    }

    #[tokio::test]
    async fn test_thread_rename_becomes_log_event() {
        let adapter = adapter_with(Arc::new(MockDiscord::default()));
        let mut routed = observe(&adapter);

        adapter
            .handle_dispatch("THREAD_CREATE", json!({"id": "T1", "type": 11, "name": "general"}))
            .await
            .unwrap();
        adapter
            .handle_dispatch("THREAD_UPDATE", json!({"id": "T1", "type": 11, "name": "random"}))
            .await
            .unwrap();

        let event = routed.recv().await.unwrap();
        let log = event.as_log().unwrap();
        assert_eq!(log.log_type(), LogEventType::ThreadName);
        assert_eq!(log.body, "Someone changed the group name to random.");
        assert!(routed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_dispatch_is_a_parse_error() {
        let adapter = adapter_with(Arc::new(MockDiscord::default()));
        let err = adapter
            .handle_dispatch("MESSAGE_CREATE", json!({"id": 5}))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::ParseError { .. }));
        adapter
            .handle_dispatch("TYPING_START", json!({}))
            .await
            .unwrap();
    }

    #[test]
    fn test_from_config_requires_token() {
        let err = DiscordAdapter::from_config(DiscordConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, AdapterError::InvalidConfig(_)));
        assert!(!DiscordAdapter::enabled(&DiscordConfig {
            enabled: false,
            ..Default::default()
        }));
    }

    fn frame(value: Value) -> WsMessage {
        WsMessage::Text(value.to_string().into())
    }

    #[tokio::test]
    async fn test_gateway_identifies_and_forwards_dispatches() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (identified_tx, identified_rx) = oneshot::channel::<Value>();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            ws.send(frame(json!({"op": 10, "d": {"heartbeat_interval": 45000}})))
                .await
                .unwrap();

            let identify = loop {
                match ws.next().await {
                    Some(Ok(WsMessage::Text(text))) => {
                        break serde_json::from_str::<Value>(text.as_str()).unwrap();
                    }
                    Some(Ok(_)) => continue,
                    _ => return,
                }
            };
            let _ = identified_tx.send(identify);

            ws.send(frame(json!({
                "op": 0, "s": 1, "t": "READY",
                "d": {"user": {"id": "BOT", "username": "parley", "bot": true}, "session_id": "S1"}
            })))
            .await
            .unwrap();
            ws.send(frame(json!({
                "op": 0, "s": 2, "t": "MESSAGE_CREATE",
                "d": message_json("10", "U1", "hello")
            })))
            .await
            .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let api = Arc::new(MockDiscord::default());
        *api.gateway.lock() = format!("ws://{addr}");
        let adapter = adapter_with(api);
        let mut routed = observe(&adapter);

        adapter.listen().await.unwrap();
        let identify = identified_rx.await.unwrap();
        assert_eq!(identify["op"], 2);
        assert_eq!(identify["d"]["token"], "token");

        let event = tokio::time::timeout(Duration::from_secs(5), routed.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.as_message().unwrap().body, "hello");
        assert_eq!(adapter.bot_user().unwrap().id, "BOT");

        adapter.stop_listening().await.unwrap();
        assert!(!adapter.event_hub().is_listening());
    }

    #[tokio::test]
    async fn test_gateway_reconnect_request_identifies_again() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (identified_tx, mut identified_rx) = mpsc::unbounded_channel::<Value>();

        tokio::spawn(async move {
            for round in 0..2 {
                let (socket, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
                ws.send(frame(json!({"op": 10, "d": {"heartbeat_interval": 45000}})))
                    .await
                    .unwrap();
                loop {
                    match ws.next().await {
                        Some(Ok(WsMessage::Text(text))) => {
                            let _ = identified_tx
                                .send(serde_json::from_str::<Value>(text.as_str()).unwrap());
                            break;
                        }
                        Some(Ok(_)) => continue,
                        _ => return,
                    }
                }
                if round == 0 {
                    let _ = ws.send(frame(json!({"op": 7, "d": null}))).await;
                }
                while let Some(Ok(_)) = ws.next().await {}
            }
        });

        let api = Arc::new(MockDiscord::default());
        *api.gateway.lock() = format!("ws://{addr}");
        let mut config = DiscordConfig {
            token: "token".into(),
            ..Default::default()
        };
        config.reconnect.initial_delay_ms = 10;
        let adapter = DiscordAdapter::with_api(config, api);

        adapter.listen().await.unwrap();
        for _ in 0..2 {
            let identify = tokio::time::timeout(Duration::from_secs(5), identified_rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(identify["op"], 2);
        }

        adapter.stop_listening().await.unwrap();
    }
}
