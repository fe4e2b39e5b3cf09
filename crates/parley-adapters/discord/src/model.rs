//! Discord REST and gateway payloads.
//!
//! Only the fields the adapter reads are modelled; unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Gateway Opcodes
// ============================================================================

/// Gateway opcodes used by the adapter.
pub mod opcode {
    /// An event was dispatched.
    pub const DISPATCH: u8 = 0;
    /// Heartbeat, sent by either side.
    pub const HEARTBEAT: u8 = 1;
    /// Starts a new session.
    pub const IDENTIFY: u8 = 2;
    /// The client should reconnect.
    pub const RECONNECT: u8 = 7;
    /// The session is invalid.
    pub const INVALID_SESSION: u8 = 9;
    /// First frame after connecting.
    pub const HELLO: u8 = 10;
    /// A heartbeat was received.
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// A gateway frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload {
    /// Opcode.
    pub op: u8,
    /// Event data.
    #[serde(default)]
    pub d: Value,
    /// Sequence number of dispatches.
    #[serde(default)]
    pub s: Option<u64>,
    /// Dispatch event name.
    #[serde(default)]
    pub t: Option<String>,
}

/// Data of `Hello`.
#[derive(Debug, Clone, Deserialize)]
pub struct Hello {
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval: u64,
}

/// Data of the `READY` dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
    /// The bot user.
    pub user: User,
    /// Session id.
    #[serde(default)]
    pub session_id: String,
}

/// Answer of `GET /gateway/bot`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayBot {
    /// Gateway websocket URL.
    pub url: String,
}

// ============================================================================
// Resources
// ============================================================================

/// A user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Snowflake id.
    pub id: String,
    /// Unique username.
    #[serde(default)]
    pub username: String,
    /// Display name.
    #[serde(default)]
    pub global_name: Option<String>,
    /// Set for bot accounts.
    #[serde(default)]
    pub bot: bool,
}

/// A message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Snowflake id.
    pub id: String,
    /// Channel the message was posted in.
    pub channel_id: String,
    /// Guild, absent in direct messages.
    #[serde(default)]
    pub guild_id: Option<String>,
    /// Author.
    pub author: User,
    /// Text content.
    #[serde(default)]
    pub content: String,
    /// ISO 8601 creation time.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Mentioned users.
    #[serde(default)]
    pub mentions: Vec<User>,
    /// Reference to the replied-to message.
    #[serde(default)]
    pub message_reference: Option<MessageReference>,
    /// The replied-to message, when the gateway resolved it.
    #[serde(default)]
    pub referenced_message: Option<Box<Message>>,
    /// Uploaded files.
    #[serde(default)]
    pub attachments: Vec<MessageAttachment>,
}

impl Message {
    /// Returns the id of the replied-to message, if any.
    pub fn reply_target(&self) -> Option<&str> {
        self.message_reference
            .as_ref()
            .and_then(|reference| reference.message_id.as_deref())
    }

    /// Returns the creation time in milliseconds, if it parses.
    pub fn created_millis(&self) -> Option<i64> {
        let timestamp = self.timestamp.as_deref()?;
        chrono::DateTime::parse_from_rfc3339(timestamp)
            .ok()
            .map(|time| time.timestamp_millis())
    }
}

/// Reference from a message to another one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageReference {
    /// Referenced message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Channel of the referenced message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Do not fail the send when the referenced message is gone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_if_not_exists: Option<bool>,
}

/// A file attached to a message.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageAttachment {
    /// Snowflake id.
    pub id: String,
    /// File name.
    #[serde(default)]
    pub filename: String,
    /// CDN URL.
    #[serde(default)]
    pub url: String,
}

/// A channel or thread.
#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    /// Snowflake id.
    pub id: String,
    /// Channel type.
    #[serde(rename = "type")]
    pub kind: u8,
    /// Name; absent for direct messages.
    #[serde(default)]
    pub name: Option<String>,
    /// Guild, absent for direct messages.
    #[serde(default)]
    pub guild_id: Option<String>,
}

impl Channel {
    /// Returns `true` if messages can be posted in this channel.
    ///
    /// Text, DM, voice, group DM, announcement, the three thread kinds and
    /// stage channels carry a message stream; categories, directories,
    /// forums and media channels do not.
    pub fn is_text_based(&self) -> bool {
        matches!(self.kind, 0 | 1 | 2 | 3 | 5 | 10 | 11 | 12 | 13)
    }
}

// ============================================================================
// Dispatch Events
// ============================================================================

/// Data of `GUILD_CREATE`, trimmed to the state the normalizer tracks.
#[derive(Debug, Clone, Deserialize)]
pub struct GuildCreate {
    /// Guild id.
    pub id: String,
    /// Active threads.
    #[serde(default)]
    pub threads: Vec<Channel>,
    /// Members sent with the guild.
    #[serde(default)]
    pub members: Vec<GuildMember>,
    /// Users currently in voice channels.
    #[serde(default)]
    pub voice_states: Vec<VoiceState>,
}

/// Data of `MESSAGE_REACTION_ADD`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReactionAdd {
    /// User who reacted.
    pub user_id: String,
    /// Channel of the message.
    pub channel_id: String,
    /// Reacted message.
    pub message_id: String,
    /// Guild, absent in direct messages.
    #[serde(default)]
    pub guild_id: Option<String>,
    /// Author of the reacted message.
    #[serde(default)]
    pub message_author_id: Option<String>,
    /// The emoji.
    pub emoji: Emoji,
}

/// A reaction emoji.
#[derive(Debug, Clone, Deserialize)]
pub struct Emoji {
    /// Custom emoji id.
    #[serde(default)]
    pub id: Option<String>,
    /// Unicode emoji, or the custom emoji name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Data of `GUILD_MEMBER_UPDATE`.
#[derive(Debug, Clone, Deserialize)]
pub struct GuildMemberUpdate {
    /// Guild.
    pub guild_id: String,
    /// The member's user.
    pub user: User,
    /// Guild nickname.
    #[serde(default)]
    pub nick: Option<String>,
}

/// Data of `VOICE_STATE_UPDATE`.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceState {
    /// Guild.
    #[serde(default)]
    pub guild_id: Option<String>,
    /// Voice channel; absent after leaving.
    #[serde(default)]
    pub channel_id: Option<String>,
    /// The user.
    pub user_id: String,
    /// Camera enabled.
    #[serde(default)]
    pub self_video: bool,
}

/// Data of `THREAD_MEMBERS_UPDATE`.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadMembersUpdate {
    /// Thread id.
    pub id: String,
    /// Guild.
    #[serde(default)]
    pub guild_id: Option<String>,
    /// Members who joined.
    #[serde(default)]
    pub added_members: Vec<ThreadMember>,
    /// Ids of members who left.
    #[serde(default)]
    pub removed_member_ids: Vec<String>,
}

/// A thread member.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadMember {
    /// Member user id.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Guild member, sent with `THREAD_MEMBERS_UPDATE`.
    #[serde(default)]
    pub member: Option<GuildMember>,
}

/// A guild member.
#[derive(Debug, Clone, Deserialize)]
pub struct GuildMember {
    /// The member's user.
    #[serde(default)]
    pub user: Option<User>,
    /// Guild nickname.
    #[serde(default)]
    pub nick: Option<String>,
}

// ============================================================================
// Requests
// ============================================================================

/// Body of `POST /channels/{id}/messages`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateMessage {
    /// Text content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Reply target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_reference: Option<MessageReference>,
    /// Metadata of the uploaded `files[n]` parts.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentSlot>,
}

/// Links a multipart `files[n]` part to its file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentSlot {
    /// Index `n` of the `files[n]` part.
    pub id: usize,
    /// File name.
    pub filename: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_message() {
        let json = r#"{
            "id": "200",
            "channel_id": "C1",
            "author": {"id": "U1", "username": "ada", "bot": false},
            "content": "4",
            "timestamp": "2024-05-01T12:00:00.000000+00:00",
            "mentions": [{"id": "U2", "username": "bob"}],
            "message_reference": {"message_id": "100", "channel_id": "C1"},
            "referenced_message": {
                "id": "100",
                "channel_id": "C1",
                "author": {"id": "BOT", "username": "parley", "bot": true},
                "content": "What is 2 + 2?"
            },
            "tts": false
        }"#;

        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.reply_target(), Some("100"));
        assert_eq!(message.mentions[0].username, "bob");
        assert_eq!(message.created_millis(), Some(1_714_564_800_000));
        let target = message.referenced_message.unwrap();
        assert!(target.author.bot);
        assert!(target.reply_target().is_none());
    }

    #[test]
    fn test_channel_text_based() {
        let text: Channel = serde_json::from_str(r#"{"id": "1", "type": 0}"#).unwrap();
        let category: Channel = serde_json::from_str(r#"{"id": "2", "type": 4}"#).unwrap();
        let thread: Channel =
            serde_json::from_str(r#"{"id": "3", "type": 11, "name": "help"}"#).unwrap();

        assert!(text.is_text_based());
        assert!(!category.is_text_based());
        assert!(thread.is_text_based());
    }

    #[test]
    fn test_create_message_skips_empty_fields() {
        let body = CreateMessage {
            content: Some("hi".into()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&body).unwrap(), serde_json::json!({"content": "hi"}));
    }

    #[test]
    fn test_gateway_payload_defaults() {
        let hello: GatewayPayload =
            serde_json::from_str(r#"{"op": 10, "d": {"heartbeat_interval": 41250}}"#).unwrap();
        assert_eq!(hello.op, opcode::HELLO);
        assert!(hello.s.is_none());
        let data: Hello = serde_json::from_value(hello.d).unwrap();
        assert_eq!(data.heartbeat_interval, 41250);
    }
}
