//! Webhook payload to inferred event translation.
//!
//! Messenger conversations with a page are one-to-one, so the thread of a
//! message is the page-scoped id of the user on the other side.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use parking_lot::Mutex;
use tracing::{debug, trace};

use parley_core::{Extras, InferredEvent, MessageEvent, ReactionEvent};

use crate::model::{InboundMessage, InboundReaction, Messaging, WebhookPayload};

/// Insertion-ordered map that forgets its oldest entry past `capacity`.
#[derive(Debug)]
pub(crate) struct Bounded<K, V> {
    order: VecDeque<K>,
    entries: HashMap<K, V>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V> Bounded<K, V> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            entries: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Inserts or replaces. Returns `false` if the key was already present.
    pub(crate) fn insert(&mut self, key: K, value: V) -> bool {
        if self.entries.insert(key.clone(), value).is_some() {
            return false;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        true
    }

    pub(crate) fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Turns webhook batches into events, dropping echoes and redeliveries.
pub struct Translator {
    recent: Mutex<Bounded<String, MessageEvent>>,
    seen: Mutex<Bounded<String, ()>>,
}

impl Translator {
    /// Creates a translator remembering up to `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            recent: Mutex::new(Bounded::new(capacity)),
            // Redeliveries arrive close together; a few times the cache is plenty.
            seen: Mutex::new(Bounded::new(capacity.saturating_mul(4))),
        }
    }

    /// Remembers a message so later replies to it can name it.
    pub fn remember(&self, message: &MessageEvent) {
        let mut stored = message.clone();
        stored.message_reply = None;
        self.recent.lock().insert(stored.message_id.clone(), stored);
    }

    /// Looks up a remembered message.
    pub fn lookup(&self, message_id: &str) -> Option<MessageEvent> {
        self.recent.lock().get(&message_id.to_string()).cloned()
    }

    /// Returns the number of remembered messages.
    pub fn remembered(&self) -> usize {
        self.recent.lock().len()
    }

    fn first_sight(&self, key: String) -> bool {
        self.seen.lock().insert(key, ())
    }

    /// Translates every messaging event of `payload`.
    pub fn translate(&self, payload: &WebhookPayload) -> Vec<InferredEvent> {
        if payload.object != "page" {
            debug!(object = %payload.object, "ignoring non-page webhook");
            return Vec::new();
        }

        payload
            .entry
            .iter()
            .flat_map(|entry| entry.messaging.iter())
            .filter_map(|messaging| {
                if let Some(message) = &messaging.message {
                    self.translate_message(messaging, message)
                } else if let Some(reaction) = &messaging.reaction {
                    self.translate_reaction(messaging, reaction)
                } else {
                    trace!(sender = %messaging.sender.id, "ignoring unsupported messaging event");
                    None
                }
            })
            .collect()
    }

    fn translate_message(
        &self,
        messaging: &Messaging,
        message: &InboundMessage,
    ) -> Option<InferredEvent> {
        if message.is_echo {
            trace!(mid = %message.mid, "skipping echo");
            return None;
        }
        if !self.first_sight(format!("message:{}", message.mid)) {
            debug!(mid = %message.mid, "dropping duplicate delivery");
            return None;
        }

        let thread_id = messaging.sender.id.clone();
        let mut extras = Extras::new();
        extras.insert("timestamp", messaging.timestamp);
        if !message.attachments.is_empty() {
            extras.insert("attachments", message.attachments.clone());
        }

        let mut event = MessageEvent::new(
            &messaging.sender.id,
            &thread_id,
            &message.mid,
            message.text.clone().unwrap_or_default(),
        )
        .with_extras(extras);
        self.remember(&event);

        if let Some(reply_to) = &message.reply_to {
            let target = self.lookup(&reply_to.mid).unwrap_or_else(|| MessageEvent {
                message_id: reply_to.mid.clone(),
                thread_id: thread_id.clone(),
                ..MessageEvent::default()
            });
            event = event.replying_to(target);
        }

        Some(InferredEvent::from_message(event))
    }

    fn translate_reaction(
        &self,
        messaging: &Messaging,
        reaction: &InboundReaction,
    ) -> Option<InferredEvent> {
        if reaction.action != "react" {
            trace!(mid = %reaction.mid, action = %reaction.action, "ignoring reaction removal");
            return None;
        }
        let emoji = reaction
            .emoji
            .clone()
            .or_else(|| reaction.reaction.clone())
            .unwrap_or_default();
        let key = format!(
            "reaction:{}:{}:{}:{}",
            reaction.mid, messaging.sender.id, emoji, messaging.timestamp
        );
        if !self.first_sight(key) {
            debug!(mid = %reaction.mid, "dropping duplicate reaction");
            return None;
        }

        let mut extras = Extras::new();
        extras.insert("timestamp", messaging.timestamp);
        let author = self
            .lookup(&reaction.mid)
            .map(|message| message.sender_id)
            .unwrap_or_default();

        Some(InferredEvent::Reaction(ReactionEvent {
            message_id: reaction.mid.clone(),
            sender_id: author,
            user_id: messaging.sender.id.clone(),
            reaction: emoji,
            extras,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::EventType;

    fn payload(messaging: serde_json::Value) -> WebhookPayload {
        serde_json::from_value(serde_json::json!({
            "object": "page",
            "entry": [{ "id": "PAGE", "time": 1, "messaging": [messaging] }]
        }))
        .unwrap()
    }

    fn message(mid: &str, text: &str) -> serde_json::Value {
        serde_json::json!({
            "sender": {"id": "U1"},
            "recipient": {"id": "PAGE"},
            "timestamp": 10,
            "message": {"mid": mid, "text": text}
        })
    }

    #[test]
    fn test_plain_message() {
        let translator = Translator::new(8);
        let events = translator.translate(&payload(message("m_1", "hello")));

        assert_eq!(events.len(), 1);
        let msg = events[0].as_message().unwrap();
        assert_eq!(events[0].event_type(), EventType::Message);
        assert_eq!(msg.sender_id, "U1");
        assert_eq!(msg.thread_id, "U1");
        assert_eq!(msg.body, "hello");
        assert_eq!(*msg.extras.get::<i64>("timestamp").unwrap(), 10);
    }

    #[test]
    fn test_reply_fills_known_target() {
        let translator = Translator::new(8);
        translator.remember(&MessageEvent::new("PAGE", "U1", "m_bot", "What is 2 + 2?"));

        let mut raw = message("m_2", "4");
        raw["message"]["reply_to"] = serde_json::json!({"mid": "m_bot"});
        let events = translator.translate(&payload(raw));

        assert_eq!(events[0].event_type(), EventType::MessageReply);
        let target = events[0].replied_message().unwrap();
        assert_eq!(target.message_id, "m_bot");
        assert_eq!(target.sender_id, "PAGE");
        assert_eq!(target.body, "What is 2 + 2?");
    }

    #[test]
    fn test_reply_to_unknown_target_keeps_id() {
        let translator = Translator::new(8);
        let mut raw = message("m_2", "4");
        raw["message"]["reply_to"] = serde_json::json!({"mid": "m_old"});
        let events = translator.translate(&payload(raw));

        let target = events[0].replied_message().unwrap();
        assert_eq!(target.message_id, "m_old");
        assert_eq!(target.thread_id, "U1");
        assert!(events[0].validate().is_ok());
    }

    #[test]
    fn test_duplicates_and_echoes_are_dropped() {
        let translator = Translator::new(8);
        assert_eq!(translator.translate(&payload(message("m_1", "hi"))).len(), 1);
        assert!(translator.translate(&payload(message("m_1", "hi"))).is_empty());

        let mut echo = message("m_3", "from page");
        echo["message"]["is_echo"] = serde_json::json!(true);
        assert!(translator.translate(&payload(echo)).is_empty());
    }

    #[test]
    fn test_reaction_names_message_author() {
        let translator = Translator::new(8);
        translator.remember(&MessageEvent::new("PAGE", "U1", "m_bot", "vote"));

        let events = translator.translate(&payload(serde_json::json!({
            "sender": {"id": "U1"},
            "recipient": {"id": "PAGE"},
            "timestamp": 20,
            "reaction": {"mid": "m_bot", "action": "react", "emoji": "👍", "reaction": "like"}
        })));

        let reaction = events[0].as_reaction().unwrap();
        assert_eq!(reaction.message_id, "m_bot");
        assert_eq!(reaction.sender_id, "PAGE");
        assert_eq!(reaction.user_id, "U1");
        assert_eq!(reaction.reaction, "👍");
    }

    #[test]
    fn test_unreact_is_ignored() {
        let translator = Translator::new(8);
        let events = translator.translate(&payload(serde_json::json!({
            "sender": {"id": "U1"},
            "recipient": {"id": "PAGE"},
            "timestamp": 20,
            "reaction": {"mid": "m_bot", "action": "unreact"}
        })));
        assert!(events.is_empty());
    }

    #[test]
    fn test_bounded_forgets_oldest() {
        let mut bounded = Bounded::new(2);
        assert!(bounded.insert("a", 1));
        assert!(bounded.insert("b", 2));
        assert!(!bounded.insert("b", 3));
        assert!(bounded.insert("c", 4));

        assert_eq!(bounded.len(), 2);
        assert!(bounded.get(&"a").is_none());
        assert_eq!(bounded.get(&"b"), Some(&3));
    }
}
