//! Gateway dispatch to inferred event normalization.
//!
//! Discord reports thread renames, nickname changes and voice moves as
//! updated snapshots rather than as changes, so the [`Normalizer`] keeps the
//! last known value per id and only emits a log event when it differs. A
//! snapshot seen for the first time is recorded without an event.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::trace;

use parley_core::{
    CallData, CallEvent, Extras, InferredEvent, LogEvent, LogEventData, MessageEvent, Participant,
    ReactionEvent,
};

use crate::model::{Channel, GuildCreate, GuildMemberUpdate, Message, ReactionAdd, ThreadMembersUpdate, User, VoiceState};

/// Author id of log events with no known actor.
pub const UNKNOWN_AUTHOR: &str = "-1";

/// Extras key holding the channel or thread a log event happened in.
pub const THREAD_ID: &str = "thread_id";

/// Joins names into a sentence list: `A`, `A and B`, `A, B, and C`.
pub fn format_list<S: AsRef<str>>(items: &[S]) -> String {
    match items {
        [] => String::new(),
        [only] => only.as_ref().to_string(),
        [first, second] => format!("{} and {}", first.as_ref(), second.as_ref()),
        [rest @ .., last] => {
            let rest: Vec<&str> = rest.iter().map(AsRef::as_ref).collect();
            format!("{}, and {}", rest.join(", "), last.as_ref())
        }
    }
}

/// Stateful translator from gateway data to events.
#[derive(Default)]
pub struct Normalizer {
    thread_names: Mutex<HashMap<String, Option<String>>>,
    nicknames: Mutex<HashMap<(String, String), Option<String>>>,
    voice_channels: Mutex<HashMap<(String, String), String>>,
    usernames: Mutex<HashMap<String, String>>,
}

impl Normalizer {
    /// Creates an empty normalizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds cached state from a guild snapshot.
    pub fn observe_guild(&self, guild: &GuildCreate) {
        for thread in &guild.threads {
            self.observe_channel(thread);
        }
        for member in &guild.members {
            if let Some(user) = &member.user {
                self.remember_user(user);
                self.nicknames
                    .lock()
                    .insert((guild.id.clone(), user.id.clone()), member.nick.clone());
            }
        }
        let mut voice = self.voice_channels.lock();
        for state in &guild.voice_states {
            if let Some(channel) = &state.channel_id {
                voice.insert((guild.id.clone(), state.user_id.clone()), channel.clone());
            }
        }
    }

    /// Records a channel or thread name.
    pub fn observe_channel(&self, channel: &Channel) {
        self.thread_names
            .lock()
            .insert(channel.id.clone(), channel.name.clone());
    }

    /// Returns the last known username of `user_id`.
    pub fn username(&self, user_id: &str) -> Option<String> {
        self.usernames.lock().get(user_id).cloned()
    }

    fn remember_user(&self, user: &User) {
        if !user.username.is_empty() {
            self.usernames
                .lock()
                .insert(user.id.clone(), user.username.clone());
        }
    }

    /// Converts a message without its reply context.
    pub fn message_event(&self, message: &Message) -> MessageEvent {
        self.remember_user(&message.author);
        let mut extras = Extras::new();
        if let Some(timestamp) = message.created_millis() {
            extras.insert("timestamp", timestamp);
        }
        if let Some(guild_id) = &message.guild_id {
            extras.insert("guild_id", guild_id.clone());
        }
        if let Some(reply_to) = message.reply_target() {
            extras.insert("reply_to", reply_to.to_string());
        }
        if !message.attachments.is_empty() {
            extras.insert("attachments", message.attachments.clone());
        }

        let mut event = MessageEvent::new(
            &message.author.id,
            &message.channel_id,
            &message.id,
            &message.content,
        )
        .with_extras(extras);
        for user in &message.mentions {
            self.remember_user(user);
            event = event.with_mention(&user.id, format!("@{}", user.username));
        }
        event
    }

    /// Converts `MESSAGE_CREATE`. With a `replied` message it becomes a reply.
    pub fn message(&self, message: &Message, replied: Option<&Message>) -> InferredEvent {
        let mut event = self.message_event(message);
        if let Some(replied) = replied {
            event = event.replying_to(self.message_event(replied));
        }
        InferredEvent::from_message(event)
    }

    /// Converts `MESSAGE_REACTION_ADD`; `author` is the reacted message's author.
    pub fn reaction(&self, reaction: &ReactionAdd, author: String) -> InferredEvent {
        let mut extras = Extras::new();
        extras.insert("channel_id", reaction.channel_id.clone());
        if let Some(id) = &reaction.emoji.id {
            extras.insert("emoji_id", id.clone());
        }
        InferredEvent::Reaction(ReactionEvent {
            message_id: reaction.message_id.clone(),
            sender_id: author,
            user_id: reaction.user_id.clone(),
            reaction: reaction.emoji.name.clone().unwrap_or_default(),
            extras,
        })
    }

    /// Converts `THREAD_UPDATE` into a rename, if the name changed.
    pub fn thread_update(&self, thread: &Channel) -> Option<LogEvent> {
        let previous = self
            .thread_names
            .lock()
            .insert(thread.id.clone(), thread.name.clone());
        match previous {
            Some(previous) if previous != thread.name => {}
            _ => {
                trace!(thread_id = %thread.id, "thread update without rename");
                return None;
            }
        }

        let shown = thread.name.as_deref().unwrap_or("null");
        let log = LogEvent::new(
            LogEventData::ThreadName {
                name: thread.name.clone(),
            },
            format!("Someone changed the group name to {shown}."),
            Some(UNKNOWN_AUTHOR.to_string()),
        );
        Some(in_thread(log, &thread.id))
    }

    /// Converts `GUILD_MEMBER_UPDATE` into a nickname change, if it changed.
    pub fn member_update(&self, update: &GuildMemberUpdate) -> Option<LogEvent> {
        self.remember_user(&update.user);
        let key = (update.guild_id.clone(), update.user.id.clone());
        let previous = self.nicknames.lock().insert(key, update.nick.clone());
        match previous {
            Some(previous) if previous != update.nick => {}
            _ => return None,
        }

        let nickname = update.nick.clone().unwrap_or_default();
        let mut log = LogEvent::new(
            LogEventData::UserNickname {
                participant_id: update.user.id.clone(),
                nickname: nickname.clone(),
            },
            format!("{} set their own nickname to {nickname}.", update.user.username),
            Some(update.user.id.clone()),
        );
        log.extras.insert("guild_id", update.guild_id.clone());
        Some(log)
    }

    /// Converts `VOICE_STATE_UPDATE` into a call start or end.
    ///
    /// Moving between voice channels is neither.
    pub fn voice_state(&self, state: &VoiceState) -> Option<LogEvent> {
        let key = (
            state.guild_id.clone().unwrap_or_default(),
            state.user_id.clone(),
        );
        let previous = {
            let mut voice = self.voice_channels.lock();
            match &state.channel_id {
                Some(channel) => voice.insert(key, channel.clone()),
                None => voice.remove(&key),
            }
        };

        let (event, body, channel) = match (previous, &state.channel_id) {
            (None, Some(joined)) => (CallEvent::GroupCallStarted, "Call started", joined.clone()),
            (Some(left), None) => (CallEvent::GroupCallEnded, "Call ended", left),
            _ => return None,
        };
        let log = LogEvent::new(
            LogEventData::ThreadCall(CallData {
                caller_id: state.user_id.clone(),
                video: None,
                call_duration: 0,
                joining_user: None,
                event,
                group_call_type: None,
            }),
            body,
            Some(state.user_id.clone()),
        );
        Some(in_thread(log, &channel))
    }

    /// Converts `THREAD_MEMBERS_UPDATE`: one join event for all additions and
    /// one leave event per removal.
    pub fn thread_members(&self, update: &ThreadMembersUpdate) -> Vec<LogEvent> {
        let mut events = Vec::new();

        let added: Vec<Participant> = update
            .added_members
            .iter()
            .map(|member| {
                let user = member.member.as_ref().and_then(|m| m.user.as_ref());
                if let Some(user) = user {
                    self.remember_user(user);
                }
                Participant {
                    user_id: user
                        .map(|u| u.id.clone())
                        .or_else(|| member.user_id.clone())
                        .unwrap_or_default(),
                    full_name: user
                        .map(|u| u.username.clone())
                        .unwrap_or_else(|| "unknown".to_string()),
                }
            })
            .collect();
        if !added.is_empty() {
            let names: Vec<&str> = added.iter().map(|p| p.full_name.as_str()).collect();
            let body = format!("{} joined the group.", format_list(&names));
            events.push(in_thread(
                LogEvent::new(
                    LogEventData::Subscribe {
                        added_participants: added,
                    },
                    body,
                    None,
                ),
                &update.id,
            ));
        }

        for user_id in &update.removed_member_ids {
            let name = self.username(user_id).unwrap_or_else(|| "unknown".to_string());
            events.push(in_thread(
                LogEvent::new(
                    LogEventData::Unsubscribe {
                        left_participant_id: Some(user_id.clone()),
                    },
                    format!("{name} left the group."),
                    None,
                ),
                &update.id,
            ));
        }
        events
    }
}

fn in_thread(mut log: LogEvent, thread_id: &str) -> LogEvent {
    log.extras.insert(THREAD_ID, thread_id.to_string());
    log
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{EventType, LogEventType};

    fn user(id: &str, name: &str) -> User {
        User {
            id: id.into(),
            username: name.into(),
            global_name: None,
            bot: false,
        }
    }

    fn message(id: &str, author: User, content: &str) -> Message {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "channel_id": "C1",
            "author": author,
            "content": content,
        }))
        .unwrap()
    }

    fn thread(name: Option<&str>) -> Channel {
        serde_json::from_value(serde_json::json!({"id": "T1", "type": 11, "name": name})).unwrap()
    }

    #[test]
    fn test_format_list() {
        let empty: [&str; 0] = [];
        assert_eq!(format_list(&empty), "");
        assert_eq!(format_list(&["A"]), "A");
        assert_eq!(format_list(&["A", "B"]), "A and B");
        assert_eq!(format_list(&["A", "B", "C"]), "A, B, and C");
    }

    #[test]
    fn test_message_mentions_and_reply() {
        let normalizer = Normalizer::new();
        let mut msg = message("200", user("U1", "ada"), "hi <@U2>");
        msg.mentions.push(user("U2", "bob"));
        let replied = message("100", user("BOT", "parley"), "question");

        let event = normalizer.message(&msg, Some(&replied));
        assert_eq!(event.event_type(), EventType::MessageReply);
        let body = event.as_message().unwrap();
        assert_eq!(body.mentions.get("U2").map(String::as_str), Some("@bob"));
        assert_eq!(event.replied_message().unwrap().sender_id, "BOT");
        assert!(event.validate().is_ok());

        let plain = normalizer.message(&msg, None);
        assert_eq!(plain.event_type(), EventType::Message);
        assert_eq!(normalizer.username("U2").as_deref(), Some("bob"));
    }

    #[test]
    fn test_thread_rename_needs_prior_name() {
        let normalizer = Normalizer::new();
        assert!(normalizer.thread_update(&thread(Some("general"))).is_none());
        assert!(normalizer.thread_update(&thread(Some("general"))).is_none());

        let log = normalizer.thread_update(&thread(Some("random"))).unwrap();
        assert_eq!(log.log_type(), LogEventType::ThreadName);
        assert_eq!(log.body, "Someone changed the group name to random.");
        assert_eq!(log.author.as_deref(), Some(UNKNOWN_AUTHOR));
        assert_eq!(*log.extras.get::<String>(THREAD_ID).unwrap(), "T1");
    }

    #[test]
    fn test_nickname_change() {
        let normalizer = Normalizer::new();
        let update = |nick: Option<&str>| GuildMemberUpdate {
            guild_id: "G1".into(),
            user: user("U1", "ada"),
            nick: nick.map(str::to_owned),
        };

        assert!(normalizer.member_update(&update(None)).is_none());
        let log = normalizer.member_update(&update(Some("Countess"))).unwrap();
        assert_eq!(log.body, "ada set their own nickname to Countess.");
        assert_eq!(
            log.data,
            LogEventData::UserNickname {
                participant_id: "U1".into(),
                nickname: "Countess".into(),
            }
        );
        assert!(normalizer.member_update(&update(Some("Countess"))).is_none());
    }

    #[test]
    fn test_voice_join_move_and_leave() {
        let normalizer = Normalizer::new();
        let state = |channel: Option<&str>| VoiceState {
            guild_id: Some("G1".into()),
            channel_id: channel.map(str::to_owned),
            user_id: "U1".into(),
            self_video: false,
        };

        let started = normalizer.voice_state(&state(Some("V1"))).unwrap();
        assert_eq!(started.body, "Call started");
        assert!(matches!(
            started.data,
            LogEventData::ThreadCall(CallData { event: CallEvent::GroupCallStarted, .. })
        ));
        assert!(normalizer.voice_state(&state(Some("V2"))).is_none());

        let ended = normalizer.voice_state(&state(None)).unwrap();
        assert_eq!(ended.body, "Call ended");
        assert_eq!(*ended.extras.get::<String>(THREAD_ID).unwrap(), "V2");
    }

    #[test]
    fn test_thread_members_update() {
        let normalizer = Normalizer::new();
        normalizer.message_event(&message("1", user("U9", "carol"), "bye"));

        let update: ThreadMembersUpdate = serde_json::from_value(serde_json::json!({
            "id": "T1",
            "guild_id": "G1",
            "member_count": 3,
            "added_members": [
                {"user_id": "U1", "member": {"user": {"id": "U1", "username": "ada"}}},
                {"user_id": "U2", "member": {"user": {"id": "U2", "username": "bob"}}},
                {"user_id": "U3"}
            ],
            "removed_member_ids": ["U9"]
        }))
        .unwrap();

        let events = normalizer.thread_members(&update);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].body, "ada, bob, and unknown joined the group.");
        match &events[0].data {
            LogEventData::Subscribe { added_participants } => {
                assert_eq!(added_participants[2].user_id, "U3");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(events[1].body, "carol left the group.");
        assert_eq!(events[1].log_type(), LogEventType::Unsubscribe);
    }

    #[test]
    fn test_guild_snapshot_seeds_state() {
        let normalizer = Normalizer::new();
        let guild: GuildCreate = serde_json::from_value(serde_json::json!({
            "id": "G1",
            "threads": [{"id": "T1", "type": 11, "name": "general"}],
            "members": [{"user": {"id": "U1", "username": "ada"}, "nick": null}],
            "voice_states": [{"channel_id": "V1", "user_id": "U1"}]
        }))
        .unwrap();
        normalizer.observe_guild(&guild);

        assert!(normalizer.thread_update(&thread(Some("renamed"))).is_some());
        let left = normalizer
            .voice_state(&VoiceState {
                guild_id: Some("G1".into()),
                channel_id: None,
                user_id: "U1".into(),
                self_video: false,
            })
            .unwrap();
        assert_eq!(left.body, "Call ended");
    }
}
