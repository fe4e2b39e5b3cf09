//! Inferred event model.
//!
//! Every adapter translates its native notifications into an
//! [`InferredEvent`], and everything downstream (routing, reply correlation,
//! command handlers) consumes only this shape:
//!
//! - [`InferredEvent::Message`] - a plain message
//! - [`InferredEvent::MessageReply`] - a message answering another message
//! - [`InferredEvent::Reaction`] - an emoji reaction on a message
//! - [`InferredEvent::Log`] - a thread log event (rename, nickname, call, ...)
//!
//! Each variant carries [`Extras`], an opaque side channel for native objects
//! that cannot be normalized. Core code never looks inside it.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{AdapterError, AdapterResult};

// ============================================================================
// Extras
// ============================================================================

/// Opaque platform-specific values attached to an event.
#[derive(Clone, Default)]
pub struct Extras {
    entries: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Extras {
    /// Creates an empty extras map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value under `key`, replacing any previous one.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Arc::new(value));
    }

    /// Stores an already shared value under `key`.
    pub fn insert_arc(&mut self, key: impl Into<String>, value: Arc<dyn Any + Send + Sync>) {
        self.entries.insert(key.into(), value);
    }

    /// Returns the value under `key` if it exists and has type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.entries.get(key).cloned()?.downcast::<T>().ok()
    }

    /// Returns `true` if a value is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterates over the stored keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Returns the number of stored values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Extras {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

// ============================================================================
// Event Type Classification
// ============================================================================

/// Discriminant of an [`InferredEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// `message`
    Message,
    /// `message_reply`
    MessageReply,
    /// `message_reaction`
    MessageReaction,
    /// `event` (log events)
    Log,
}

impl EventType {
    /// Returns the wire tag of this event type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::MessageReply => "message_reply",
            Self::MessageReaction => "message_reaction",
            Self::Log => "event",
        }
    }

    /// Returns `true` for `message` and `message_reply`.
    pub const fn is_message_like(self) -> bool {
        matches!(self, Self::Message | Self::MessageReply)
    }
}

impl FromStr for EventType {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(Self::Message),
            "message_reply" => Ok(Self::MessageReply),
            "message_reaction" => Ok(Self::MessageReaction),
            "event" => Ok(Self::Log),
            other => Err(AdapterError::parse(format!("unknown event type '{other}'"))),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Message Events
// ============================================================================

/// A normalized chat message.
#[derive(Debug, Clone, Default)]
pub struct MessageEvent {
    /// Author of the message.
    pub sender_id: String,
    /// Thread (conversation, channel) the message was posted in.
    pub thread_id: String,
    /// Platform message id.
    pub message_id: String,
    /// Text content; empty for attachment-only messages.
    pub body: String,
    /// Mentioned user id to the mention text as it appeared.
    pub mentions: BTreeMap<String, String>,
    /// The message this one replies to, one level deep.
    pub message_reply: Option<Box<MessageEvent>>,
    /// Platform side channel.
    pub extras: Extras,
}

impl MessageEvent {
    /// Creates a message without mentions or reply target.
    pub fn new(
        sender_id: impl Into<String>,
        thread_id: impl Into<String>,
        message_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            thread_id: thread_id.into(),
            message_id: message_id.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Adds a mention.
    pub fn with_mention(mut self, user_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.mentions.insert(user_id.into(), text.into());
        self
    }

    /// Marks this message as a reply to `target`.
    pub fn replying_to(mut self, target: MessageEvent) -> Self {
        self.message_reply = Some(Box::new(target));
        self
    }

    /// Replaces the extras.
    pub fn with_extras(mut self, extras: Extras) -> Self {
        self.extras = extras;
        self
    }

    fn validate(&self) -> AdapterResult<()> {
        for (field, value) in [
            ("senderID", &self.sender_id),
            ("threadID", &self.thread_id),
            ("messageID", &self.message_id),
        ] {
            if value.is_empty() {
                return Err(AdapterError::parse(format!("message event has empty {field}")));
            }
        }
        Ok(())
    }
}

/// A reaction added to a message.
#[derive(Debug, Clone, Default)]
pub struct ReactionEvent {
    /// Message the reaction was added to.
    pub message_id: String,
    /// Author of the reacted message.
    pub sender_id: String,
    /// User who reacted.
    pub user_id: String,
    /// The emoji.
    pub reaction: String,
    /// Platform side channel.
    pub extras: Extras,
}

// ============================================================================
// Log Events
// ============================================================================

/// Fixed set of thread log subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogEventType {
    /// `log:subscribe`
    Subscribe,
    /// `log:unsubscribe`
    Unsubscribe,
    /// `log:thread-admins`
    ThreadAdmins,
    /// `log:thread-name`
    ThreadName,
    /// `log:user-nickname`
    UserNickname,
    /// `log:thread-call`
    ThreadCall,
    /// `log:thread-icon`
    ThreadIcon,
    /// `log:thread-color`
    ThreadColor,
    /// `log:link-status`
    LinkStatus,
    /// `log:magic-words`
    MagicWords,
    /// `log:thread-approval-mode`
    ThreadApprovalMode,
    /// `log:thread-poll`
    ThreadPoll,
}

impl LogEventType {
    /// Every log type.
    pub const ALL: [LogEventType; 12] = [
        Self::Subscribe,
        Self::Unsubscribe,
        Self::ThreadAdmins,
        Self::ThreadName,
        Self::UserNickname,
        Self::ThreadCall,
        Self::ThreadIcon,
        Self::ThreadColor,
        Self::LinkStatus,
        Self::MagicWords,
        Self::ThreadApprovalMode,
        Self::ThreadPoll,
    ];

    /// Returns the `log:*` wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "log:subscribe",
            Self::Unsubscribe => "log:unsubscribe",
            Self::ThreadAdmins => "log:thread-admins",
            Self::ThreadName => "log:thread-name",
            Self::UserNickname => "log:user-nickname",
            Self::ThreadCall => "log:thread-call",
            Self::ThreadIcon => "log:thread-icon",
            Self::ThreadColor => "log:thread-color",
            Self::LinkStatus => "log:link-status",
            Self::MagicWords => "log:magic-words",
            Self::ThreadApprovalMode => "log:thread-approval-mode",
            Self::ThreadPoll => "log:thread-poll",
        }
    }
}

impl FromStr for LogEventType {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| AdapterError::parse(format!("unknown log message type '{s}'")))
    }
}

impl fmt::Display for LogEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A participant added to a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Platform user id.
    #[serde(rename = "userFbId")]
    pub user_id: String,
    /// Display name at the time of joining.
    #[serde(rename = "fullName")]
    pub full_name: String,
}

/// Direction of an admin change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminEvent {
    /// `add_admin`
    AddAdmin,
    /// `remove_admin`
    RemoveAdmin,
}

/// Whether a group call started or ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallEvent {
    /// `group_call_started`
    GroupCallStarted,
    /// `group_call_ended`
    GroupCallEnded,
}

/// Payload of `log:thread-call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallData {
    /// User who started or ended the call.
    pub caller_id: String,
    /// Video call flag, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<bool>,
    /// Duration in seconds; zero for a start.
    #[serde(default)]
    pub call_duration: u64,
    /// User joining an ongoing call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joining_user: Option<String>,
    /// Start or end.
    pub event: CallEvent,
    /// Platform call kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_call_type: Option<String>,
}

/// Payload of `log:magic-words`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicWordsData {
    /// The trigger word.
    pub magic_word: String,
    /// Theme attached to it.
    pub theme_name: String,
    /// Optional emoji effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji_effect: Option<String>,
    /// Number of magic words in the thread after the change.
    pub new_magic_word_count: u32,
}

/// Whether a poll was created or voted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollEventType {
    /// `question_creation`
    QuestionCreation,
    /// `update_vote`
    UpdateVote,
}

/// Payload of `log:thread-poll`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollData {
    /// Raw JSON describing the question.
    pub question_json: String,
    /// Creation or vote.
    pub event_type: PollEventType,
}

/// Log payload keyed by its log type.
///
/// Serializes as `{"logMessageType": "log:...", "logMessageData": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "logMessageType", content = "logMessageData")]
pub enum LogEventData {
    /// Participants joined.
    #[serde(rename = "log:subscribe")]
    Subscribe {
        /// Joined participants.
        #[serde(rename = "addedParticipants")]
        added_participants: Vec<Participant>,
    },
    /// A participant left or was removed.
    #[serde(rename = "log:unsubscribe")]
    Unsubscribe {
        /// Who left, when known.
        #[serde(
            rename = "leftParticipantFbId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        left_participant_id: Option<String>,
    },
    /// An admin was added or removed.
    #[serde(rename = "log:thread-admins")]
    ThreadAdmins {
        /// Direction of the change.
        #[serde(rename = "ADMIN_EVENT")]
        admin_event: AdminEvent,
    },
    /// The thread was renamed.
    #[serde(rename = "log:thread-name")]
    ThreadName {
        /// New name; `None` when cleared.
        #[serde(default)]
        name: Option<String>,
    },
    /// A nickname changed.
    #[serde(rename = "log:user-nickname")]
    UserNickname {
        /// Whose nickname.
        participant_id: String,
        /// The new nickname.
        nickname: String,
    },
    /// A group call started or ended.
    #[serde(rename = "log:thread-call")]
    ThreadCall(CallData),
    /// The thread icon changed.
    #[serde(rename = "log:thread-icon")]
    ThreadIcon {
        /// New icon.
        thread_icon: String,
    },
    /// The thread color changed.
    #[serde(rename = "log:thread-color")]
    ThreadColor {
        /// New color; `None` when reset.
        #[serde(default)]
        thread_color: Option<String>,
    },
    /// Invite link status changed.
    #[serde(rename = "log:link-status")]
    LinkStatus {},
    /// A magic word was added.
    #[serde(rename = "log:magic-words")]
    MagicWords(MagicWordsData),
    /// Approval mode toggled.
    #[serde(rename = "log:thread-approval-mode")]
    ThreadApprovalMode {},
    /// A poll was created or voted on.
    #[serde(rename = "log:thread-poll")]
    ThreadPoll(PollData),
}

impl LogEventData {
    /// Returns the log type this payload belongs to.
    pub const fn log_type(&self) -> LogEventType {
        match self {
            Self::Subscribe { .. } => LogEventType::Subscribe,
            Self::Unsubscribe { .. } => LogEventType::Unsubscribe,
            Self::ThreadAdmins { .. } => LogEventType::ThreadAdmins,
            Self::ThreadName { .. } => LogEventType::ThreadName,
            Self::UserNickname { .. } => LogEventType::UserNickname,
            Self::ThreadCall(_) => LogEventType::ThreadCall,
            Self::ThreadIcon { .. } => LogEventType::ThreadIcon,
            Self::ThreadColor { .. } => LogEventType::ThreadColor,
            Self::LinkStatus {} => LogEventType::LinkStatus,
            Self::MagicWords(_) => LogEventType::MagicWords,
            Self::ThreadApprovalMode {} => LogEventType::ThreadApprovalMode,
            Self::ThreadPoll(_) => LogEventType::ThreadPoll,
        }
    }
}

/// A thread log event.
#[derive(Debug, Clone)]
pub struct LogEvent {
    /// Typed payload.
    pub data: LogEventData,
    /// Human-readable description.
    pub body: String,
    /// Originating user, when known.
    pub author: Option<String>,
    /// Platform side channel.
    pub extras: Extras,
}

impl LogEvent {
    /// Creates a log event.
    pub fn new(data: LogEventData, body: impl Into<String>, author: Option<String>) -> Self {
        Self {
            data,
            body: body.into(),
            author,
            extras: Extras::default(),
        }
    }

    /// Returns the log type.
    pub const fn log_type(&self) -> LogEventType {
        self.data.log_type()
    }
}

// ============================================================================
// Inferred Event
// ============================================================================

/// A platform-agnostic event produced by an adapter.
#[derive(Debug, Clone)]
pub enum InferredEvent {
    /// A plain message.
    Message(MessageEvent),
    /// A reply; `message_reply` is always set.
    MessageReply(MessageEvent),
    /// A reaction.
    Reaction(ReactionEvent),
    /// A thread log event.
    Log(LogEvent),
}

impl InferredEvent {
    /// Wraps a message, choosing `MessageReply` when it replies to something.
    pub fn from_message(message: MessageEvent) -> Self {
        if message.message_reply.is_some() {
            Self::MessageReply(message)
        } else {
            Self::Message(message)
        }
    }

    /// Returns the event type tag.
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Message(_) => EventType::Message,
            Self::MessageReply(_) => EventType::MessageReply,
            Self::Reaction(_) => EventType::MessageReaction,
            Self::Log(_) => EventType::Log,
        }
    }

    /// Returns the message for `message` and `message_reply` events.
    pub fn as_message(&self) -> Option<&MessageEvent> {
        match self {
            Self::Message(msg) | Self::MessageReply(msg) => Some(msg),
            _ => None,
        }
    }

    /// Returns the message being replied to, for `message_reply` events.
    pub fn replied_message(&self) -> Option<&MessageEvent> {
        match self {
            Self::MessageReply(msg) => msg.message_reply.as_deref(),
            _ => None,
        }
    }

    /// Returns the reaction payload.
    pub fn as_reaction(&self) -> Option<&ReactionEvent> {
        match self {
            Self::Reaction(reaction) => Some(reaction),
            _ => None,
        }
    }

    /// Returns the log payload.
    pub fn as_log(&self) -> Option<&LogEvent> {
        match self {
            Self::Log(log) => Some(log),
            _ => None,
        }
    }

    /// Returns the thread of message-like events.
    pub fn thread_id(&self) -> Option<&str> {
        self.as_message().map(|msg| msg.thread_id.as_str())
    }

    /// Returns the acting user, when the event has one.
    pub fn sender_id(&self) -> Option<&str> {
        match self {
            Self::Message(msg) | Self::MessageReply(msg) => Some(&msg.sender_id),
            Self::Reaction(reaction) => Some(&reaction.user_id),
            Self::Log(log) => log.author.as_deref(),
        }
    }

    /// Returns the platform side channel.
    pub fn extras(&self) -> &Extras {
        match self {
            Self::Message(msg) | Self::MessageReply(msg) => &msg.extras,
            Self::Reaction(reaction) => &reaction.extras,
            Self::Log(log) => &log.extras,
        }
    }

    /// Checks the shape invariants every adapter must uphold.
    pub fn validate(&self) -> AdapterResult<()> {
        match self {
            Self::Message(msg) => msg.validate(),
            Self::MessageReply(msg) => {
                msg.validate()?;
                if msg.message_reply.is_none() {
                    return Err(AdapterError::parse("message_reply event without messageReply"));
                }
                Ok(())
            }
            Self::Reaction(reaction) if reaction.message_id.is_empty() => {
                Err(AdapterError::parse("reaction event has empty messageID"))
            }
            Self::Reaction(_) | Self::Log(_) => Ok(()),
        }
    }
}

impl From<LogEvent> for InferredEvent {
    fn from(log: LogEvent) -> Self {
        Self::Log(log)
    }
}

impl From<ReactionEvent> for InferredEvent {
    fn from(reaction: ReactionEvent) -> Self {
        Self::Reaction(reaction)
    }
}
