//! Reply and reaction correlation for platforms without native reply tracking.
//!
//! While a handle listens, its sent message id maps to a weak reference to
//! the handle. Inbound `message_reply` events are looked up by the id of the
//! message they answer; reactions by the id of the message they target.
//!
//! Entries exist only while the matching axis is listening: listening inserts
//! exactly one entry, stopping (explicitly or by timeout) removes exactly
//! that entry. Entries whose handle was dropped are pruned on the next
//! lookup or insert.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::foundation::error::{AdapterError, AdapterResult};
use crate::foundation::event::InferredEvent;
use crate::framework::io::ChatIo;
use crate::integration::adapter::{BoxedAdapter, EventObserver};
use crate::integration::handle::{
    DispatchedHandle, ListenHooks, ReactionNotification, ReplyNotification, WeakDispatchedHandle,
};

type CorrelationMap = HashMap<String, WeakDispatchedHandle>;

/// Message-id keyed map of listening handles.
pub struct CorrelationRegistry {
    replies: Mutex<CorrelationMap>,
    reactions: Mutex<CorrelationMap>,
    capacity: Option<usize>,
}

impl CorrelationRegistry {
    /// Creates an unbounded registry.
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            reactions: Mutex::new(HashMap::new()),
            capacity: None,
        }
    }

    /// Creates a registry holding at most `capacity` entries per axis.
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Returns `true` if replies to `message_id` are being correlated.
    pub fn is_listening_replies(&self, message_id: &str) -> bool {
        self.replies.lock().contains_key(message_id)
    }

    /// Returns `true` if reactions on `message_id` are being correlated.
    pub fn is_listening_reactions(&self, message_id: &str) -> bool {
        self.reactions.lock().contains_key(message_id)
    }

    /// Returns the number of reply entries.
    pub fn reply_entries(&self) -> usize {
        self.replies.lock().len()
    }

    /// Returns the number of reaction entries.
    pub fn reaction_entries(&self) -> usize {
        self.reactions.lock().len()
    }

    fn insert(
        &self,
        map: &Mutex<CorrelationMap>,
        handle: &DispatchedHandle,
    ) -> AdapterResult<()> {
        let message_id = handle
            .message_id()
            .ok_or_else(|| AdapterError::internal("cannot correlate a handle that is not ready"))?;

        let mut map = map.lock();
        map.retain(|_, weak| weak.upgrade().is_some());
        if let Some(capacity) = self.capacity
            && map.len() >= capacity
            && !map.contains_key(&message_id)
        {
            warn!(capacity, "correlation map is full");
            return Err(AdapterError::rejected(format!(
                "too many active listeners (limit {capacity})"
            )));
        }
        if let Some(previous) = map.insert(message_id.clone(), handle.downgrade())
            && previous.id() != handle.id()
        {
            warn!(message_id = %message_id, "replaced correlation of another handle");
        }
        trace!(message_id = %message_id, entries = map.len(), "correlation added");
        Ok(())
    }

    fn remove(&self, map: &Mutex<CorrelationMap>, handle: &DispatchedHandle) {
        let Some(message_id) = handle.message_id() else {
            return;
        };
        let mut map = map.lock();
        if map
            .get(&message_id)
            .is_some_and(|weak| weak.id() == handle.id())
        {
            map.remove(&message_id);
            trace!(message_id = %message_id, entries = map.len(), "correlation removed");
        }
    }

    fn lookup(map: &Mutex<CorrelationMap>, message_id: &str) -> Option<DispatchedHandle> {
        let mut map = map.lock();
        let handle = map.get(message_id)?.upgrade();
        if handle.is_none() {
            map.remove(message_id);
            debug!(message_id, "pruned correlation of a dropped handle");
        }
        handle
    }

    /// Routes `event` to the handle listening for it, if any.
    ///
    /// Returns `true` if a handle received the event.
    pub fn correlate(&self, event: &InferredEvent, adapter: &BoxedAdapter) -> bool {
        match event {
            InferredEvent::MessageReply(_) => {
                let Some(target) = event.replied_message() else {
                    return false;
                };
                let Some(handle) = Self::lookup(&self.replies, &target.message_id) else {
                    return false;
                };
                let delivered = handle.emit_reply(ReplyNotification {
                    io: ChatIo::new(event.clone(), adapter.clone()),
                    event: event.clone(),
                });
                debug!(message_id = %target.message_id, delivered, "reply correlated");
                true
            }
            InferredEvent::Reaction(reaction) => {
                let Some(handle) = Self::lookup(&self.reactions, &reaction.message_id) else {
                    return false;
                };
                let delivered = handle.emit_reaction(ReactionNotification {
                    io: ChatIo::new(event.clone(), adapter.clone()),
                    event: reaction.clone(),
                });
                debug!(message_id = %reaction.message_id, delivered, "reaction correlated");
                true
            }
            _ => false,
        }
    }
}

impl Default for CorrelationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenHooks for CorrelationRegistry {
    fn on_listen_replies(
        &self,
        handle: &DispatchedHandle,
        _timeout: Option<Duration>,
    ) -> AdapterResult<()> {
        self.insert(&self.replies, handle)
    }

    fn on_unlisten_replies(&self, handle: &DispatchedHandle) -> AdapterResult<()> {
        self.remove(&self.replies, handle);
        Ok(())
    }

    fn on_listen_reactions(
        &self,
        handle: &DispatchedHandle,
        _timeout: Option<Duration>,
    ) -> AdapterResult<()> {
        self.insert(&self.reactions, handle)
    }

    fn on_unlisten_reactions(&self, handle: &DispatchedHandle) -> AdapterResult<()> {
        self.remove(&self.reactions, handle);
        Ok(())
    }
}

impl EventObserver for CorrelationRegistry {
    fn on_event(&self, event: &InferredEvent, adapter: &BoxedAdapter) {
        self.correlate(event, adapter);
    }
}
