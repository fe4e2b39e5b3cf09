//! Outbound Messenger calls.
//!
//! The adapter talks to the platform only through [`MessengerApi`], so tests
//! can stand in a recording mock. [`GraphApi`] is the real implementation on
//! top of the Graph Send API.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use parley_core::{AdapterError, AdapterResult, TransportError};
use parley_transport::{Auth, MultipartForm, RestClient};

use crate::model::{Party, ReplyTo, SendMessage, SendRequest, SendResponse, UserProfile};

/// A file to upload with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundAttachment {
    /// File name, used to guess the attachment type.
    pub name: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// A message ready for the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Conversation to send to.
    pub recipient: String,
    /// Rendered text.
    pub text: Option<String>,
    /// Message to reply to.
    pub reply_to: Option<String>,
    /// Files, each sent as its own message after the text.
    pub attachments: Vec<OutboundAttachment>,
}

/// What the platform acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Id of the first message of the send.
    pub message_id: String,
    /// Conversation it landed in.
    pub recipient_id: String,
}

/// Messenger operations the adapter needs.
#[async_trait]
pub trait MessengerApi: Send + Sync + 'static {
    /// Sends text and attachments, returning the first message's ids.
    async fn send(&self, message: OutboundMessage) -> AdapterResult<SentMessage>;

    /// Looks up a display name. `Ok(None)` when the profile has none.
    async fn user_name(&self, user_id: &str) -> AdapterResult<Option<String>>;
}

/// Graph API implementation of [`MessengerApi`].
pub struct GraphApi {
    client: RestClient,
}

impl GraphApi {
    /// Creates a client for `api_base` authenticated with a page token.
    pub fn new(api_base: &str, access_token: &str) -> AdapterResult<Self> {
        let client = RestClient::new(api_base)?.with_auth(Auth::access_token(access_token));
        Ok(Self { client })
    }

    async fn send_text(
        &self,
        recipient: &str,
        text: String,
        reply_to: Option<String>,
    ) -> AdapterResult<SentMessage> {
        let request = SendRequest {
            recipient: Party {
                id: recipient.to_string(),
            },
            messaging_type: "RESPONSE",
            message: SendMessage {
                text: Some(text),
                reply_to: reply_to.map(|mid| ReplyTo { mid }),
            },
        };
        let response: SendResponse = self
            .client
            .post_json("/me/messages", &request)
            .await
            .map_err(map_transport)?;
        Ok(response.into())
    }

    async fn send_attachment(
        &self,
        recipient: &str,
        attachment: OutboundAttachment,
        reply_to: Option<String>,
    ) -> AdapterResult<SentMessage> {
        let mut message = json!({
            "attachment": {
                "type": attachment_kind(&attachment.name),
                "payload": { "is_reusable": false }
            }
        });
        if let Some(mid) = reply_to {
            message["reply_to"] = json!({ "mid": mid });
        }

        let form = MultipartForm::new()
            .text("recipient", json!({ "id": recipient }).to_string())
            .text("messaging_type", "RESPONSE")
            .text("message", message.to_string())
            .file("filedata", attachment.name, attachment.bytes);

        let response: SendResponse = self
            .client
            .post_multipart("/me/messages", form)
            .await
            .map_err(map_transport)?;
        Ok(response.into())
    }
}

#[async_trait]
impl MessengerApi for GraphApi {
    async fn send(&self, message: OutboundMessage) -> AdapterResult<SentMessage> {
        let OutboundMessage {
            recipient,
            text,
            mut reply_to,
            attachments,
        } = message;

        let mut first = None;
        if let Some(text) = text {
            first = Some(self.send_text(&recipient, text, reply_to.take()).await?);
        }
        for attachment in attachments {
            debug!(recipient = %recipient, name = %attachment.name, "uploading attachment");
            let sent = self
                .send_attachment(&recipient, attachment, reply_to.take())
                .await?;
            first.get_or_insert(sent);
        }

        first.ok_or_else(|| AdapterError::internal("send produced no message"))
    }

    async fn user_name(&self, user_id: &str) -> AdapterResult<Option<String>> {
        let profile: UserProfile = self
            .client
            .get_json(&format!("/{user_id}"), &[("fields", "name")])
            .await
            .map_err(map_transport)?;
        Ok(profile.name.filter(|name| !name.is_empty()))
    }
}

impl From<SendResponse> for SentMessage {
    fn from(response: SendResponse) -> Self {
        Self {
            message_id: response.message_id,
            recipient_id: response.recipient_id,
        }
    }
}

/// Client errors are the platform saying no; everything else stays a transport failure.
pub(crate) fn map_transport(err: TransportError) -> AdapterError {
    match err {
        TransportError::Status { status, body } if (400..500).contains(&status) => {
            AdapterError::rejected(format!("{status}: {body}"))
        }
        other => AdapterError::Transport(other),
    }
}

/// Guesses the Send API attachment type from a file name.
fn attachment_kind(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "webp" => "image",
        "mp4" | "mov" | "webm" => "video",
        "mp3" | "ogg" | "wav" | "m4a" => "audio",
        _ => "file",
    }
}
