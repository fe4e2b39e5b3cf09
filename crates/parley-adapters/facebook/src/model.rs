//! Messenger webhook and Send API payloads.
//!
//! Only the fields the adapter reads are modelled; unknown fields are ignored.

use serde::{Deserialize, Serialize};

/// Top-level webhook body.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    /// `"page"` for Messenger traffic.
    pub object: String,
    /// Batched entries, one per page.
    #[serde(default)]
    pub entry: Vec<Entry>,
}

/// One page's batch of events.
#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    /// Page id.
    pub id: String,
    /// Batch time in milliseconds.
    #[serde(default)]
    pub time: i64,
    /// Messaging events.
    #[serde(default)]
    pub messaging: Vec<Messaging>,
}

/// A participant reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Page-scoped id.
    pub id: String,
}

/// One messaging event.
#[derive(Debug, Clone, Deserialize)]
pub struct Messaging {
    /// Who triggered the event.
    pub sender: Party,
    /// Who received it.
    pub recipient: Party,
    /// Event time in milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    /// Present for new messages.
    #[serde(default)]
    pub message: Option<InboundMessage>,
    /// Present for reactions.
    #[serde(default)]
    pub reaction: Option<InboundReaction>,
}

/// Message part of a messaging event.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    /// Message id.
    pub mid: String,
    /// Text, absent for attachment-only messages.
    #[serde(default)]
    pub text: Option<String>,
    /// Set when the page itself sent the message.
    #[serde(default)]
    pub is_echo: bool,
    /// The message this one replies to.
    #[serde(default)]
    pub reply_to: Option<ReplyTo>,
    /// Attachments.
    #[serde(default)]
    pub attachments: Vec<InboundAttachment>,
}

/// Reply target of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTo {
    /// Replied-to message id.
    pub mid: String,
}

/// An attachment of an inbound message.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundAttachment {
    /// `image`, `video`, `audio`, `file`, ...
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Reaction part of a messaging event.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundReaction {
    /// Reacted message id.
    pub mid: String,
    /// `react` or `unreact`.
    pub action: String,
    /// The emoji, when the platform sends one.
    #[serde(default)]
    pub emoji: Option<String>,
    /// Named reaction such as `love` or `smile`.
    #[serde(default)]
    pub reaction: Option<String>,
}

/// Body of `POST /me/messages`.
#[derive(Debug, Clone, Serialize)]
pub struct SendRequest {
    /// Target conversation.
    pub recipient: Party,
    /// Always `RESPONSE`.
    pub messaging_type: &'static str,
    /// The message.
    pub message: SendMessage,
}

/// Message part of a send request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SendMessage {
    /// Text content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Reply target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyTo>,
}

/// Answer of `POST /me/messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct SendResponse {
    /// Conversation the message landed in.
    pub recipient_id: String,
    /// Id of the sent message.
    pub message_id: String,
}

/// Answer of `GET /{id}?fields=name`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    /// Display name, if the token may read it.
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_payload() {
        let json = r#"{
            "object": "page",
            "entry": [{
                "id": "PAGE",
                "time": 1700000000000,
                "messaging": [{
                    "sender": {"id": "U1"},
                    "recipient": {"id": "PAGE"},
                    "timestamp": 1700000000000,
                    "message": {"mid": "m_1", "text": "hi", "reply_to": {"mid": "m_0"}, "nlp": {}}
                }]
            }]
        }"#;

        let payload: WebhookPayload = serde_json::from_str(json).unwrap();
        let event = &payload.entry[0].messaging[0];
        let message = event.message.as_ref().unwrap();
        assert_eq!(event.sender.id, "U1");
        assert_eq!(message.text.as_deref(), Some("hi"));
        assert_eq!(message.reply_to.as_ref().unwrap().mid, "m_0");
        assert!(!message.is_echo);
        assert!(event.reaction.is_none());
    }

    #[test]
    fn test_send_request_skips_empty_fields() {
        let request = SendRequest {
            recipient: Party { id: "U1".into() },
            messaging_type: "RESPONSE",
            message: SendMessage {
                text: Some("hello".into()),
                reply_to: None,
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["message"], serde_json::json!({"text": "hello"}));
        assert_eq!(value["recipient"]["id"], "U1");
    }
}
