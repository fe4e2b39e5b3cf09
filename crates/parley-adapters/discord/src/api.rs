//! Outbound Discord REST calls.
//!
//! The adapter only reaches the platform through [`DiscordApi`]; tests swap in
//! a recording mock. [`RestDiscordApi`] implements it over `RestClient`.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use parley_core::{AdapterError, AdapterResult, TransportError};
use parley_transport::{Auth, MultipartForm, RestClient};

use crate::model::{AttachmentSlot, Channel, CreateMessage, GatewayBot, Message, MessageReference, User};

/// A file to upload with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFile {
    /// File name shown in the client.
    pub name: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// A message ready for the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Target channel.
    pub channel_id: String,
    /// Rendered text.
    pub content: Option<String>,
    /// Message to reply to.
    pub reply_to: Option<String>,
    /// Uploaded as `files[n]`.
    pub files: Vec<OutboundFile>,
}

/// Discord operations the adapter needs.
#[async_trait]
pub trait DiscordApi: Send + Sync + 'static {
    /// Returns the gateway websocket URL.
    async fn gateway_url(&self) -> AdapterResult<String>;

    /// Fetches a channel. `Ok(None)` when it does not exist or is not visible.
    async fn channel(&self, channel_id: &str) -> AdapterResult<Option<Channel>>;

    /// Fetches a message.
    async fn message(&self, channel_id: &str, message_id: &str) -> AdapterResult<Message>;

    /// Posts a message.
    async fn create_message(&self, message: OutboundMessage) -> AdapterResult<Message>;

    /// Deletes a message.
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> AdapterResult<()>;

    /// Fetches a user.
    async fn user(&self, user_id: &str) -> AdapterResult<User>;
}

/// REST implementation of [`DiscordApi`].
pub struct RestDiscordApi {
    client: RestClient,
}

impl RestDiscordApi {
    /// Creates a client for `api_base` authenticated as a bot.
    pub fn new(api_base: &str, token: &str) -> AdapterResult<Self> {
        let client =
            RestClient::new(api_base)?.with_auth(Auth::header("Authorization", format!("Bot {token}")));
        Ok(Self { client })
    }
}

#[async_trait]
impl DiscordApi for RestDiscordApi {
    async fn gateway_url(&self) -> AdapterResult<String> {
        let gateway: GatewayBot = self
            .client
            .get_json("/gateway/bot", &[])
            .await
            .map_err(map_transport)?;
        Ok(format!("{}/?v=10&encoding=json", gateway.url.trim_end_matches('/')))
    }

    async fn channel(&self, channel_id: &str) -> AdapterResult<Option<Channel>> {
        match self
            .client
            .get_json::<Channel>(&format!("/channels/{channel_id}"), &[])
            .await
        {
            Ok(channel) => Ok(Some(channel)),
            Err(TransportError::Status { status: 403 | 404, .. }) => Ok(None),
            Err(err) => Err(map_transport(err)),
        }
    }

    async fn message(&self, channel_id: &str, message_id: &str) -> AdapterResult<Message> {
        self.client
            .get_json(&format!("/channels/{channel_id}/messages/{message_id}"), &[])
            .await
            .map_err(map_transport)
    }

    async fn create_message(&self, message: OutboundMessage) -> AdapterResult<Message> {
        let path = format!("/channels/{}/messages", message.channel_id);
        let body = create_body(&message);

        if message.files.is_empty() {
            return self.client.post_json(&path, &body).await.map_err(map_transport);
        }

        let payload = serde_json::to_string(&body).map_err(|e| AdapterError::internal(e.to_string()))?;
        let mut form = MultipartForm::new().text("payload_json", payload);
        for (index, file) in message.files.into_iter().enumerate() {
            debug!(channel_id = %message.channel_id, name = %file.name, "uploading file");
            form = form.file(format!("files[{index}]"), file.name, file.bytes);
        }
        self.client.post_multipart(&path, form).await.map_err(map_transport)
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> AdapterResult<()> {
        self.client
            .delete(&format!("/channels/{channel_id}/messages/{message_id}"))
            .await
            .map_err(map_transport)
    }

    async fn user(&self, user_id: &str) -> AdapterResult<User> {
        self.client
            .get_json(&format!("/users/{user_id}"), &[])
            .await
            .map_err(map_transport)
    }
}

/// Builds the JSON body of a message, listing uploads as attachment slots.
fn create_body(message: &OutboundMessage) -> CreateMessage {
    CreateMessage {
        content: message.content.clone(),
        message_reference: message.reply_to.as_ref().map(|id| MessageReference {
            message_id: Some(id.clone()),
            channel_id: Some(message.channel_id.clone()),
            fail_if_not_exists: Some(false),
        }),
        attachments: message
            .files
            .iter()
            .enumerate()
            .map(|(id, file)| AttachmentSlot {
                id,
                filename: file.name.clone(),
            })
            .collect(),
    }
}

/// Client errors are the platform saying no; everything else stays a transport failure.
fn map_transport(err: TransportError) -> AdapterError {
    match err {
        TransportError::Status { status, body } if (400..500).contains(&status) => {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|value| value["message"].as_str().map(str::to_owned))
                .unwrap_or(body);
            AdapterError::rejected(format!("{status}: {message}"))
        }
        other => AdapterError::Transport(other),
    }
}
