//! Read-only projection over thread log events.
//!
//! Typed getters return `None` when the event is of another log type, so a
//! caller can never read a nickname out of a poll.

use crate::foundation::event::{
    AdminEvent, CallData, LogEvent, LogEventData, LogEventType, MagicWordsData, Participant,
    PollData,
};

/// Default maximum length of [`LogEventView::summary`].
pub const DEFAULT_SUMMARY_LENGTH: usize = 120;

/// A nickname change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NicknameChange<'a> {
    /// Whose nickname changed.
    pub participant_id: &'a str,
    /// The new nickname.
    pub nickname: &'a str,
}

/// Typed accessors over one [`LogEvent`].
#[derive(Debug, Clone, Copy)]
pub struct LogEventView<'a> {
    event: &'a LogEvent,
}

impl<'a> LogEventView<'a> {
    /// Wraps a log event.
    pub fn new(event: &'a LogEvent) -> Self {
        Self { event }
    }

    /// Returns the originating user, if known.
    pub fn author(&self) -> Option<&'a str> {
        self.event.author.as_deref()
    }

    /// Returns the human-readable description.
    pub fn body(&self) -> &'a str {
        &self.event.body
    }

    /// Returns the raw payload.
    pub fn data(&self) -> &'a LogEventData {
        &self.event.data
    }

    /// Returns the log type.
    pub fn log_type(&self) -> LogEventType {
        self.event.log_type()
    }

    /// Returns `true` if the event has an author.
    pub fn has_author(&self) -> bool {
        self.author().is_some()
    }

    /// Returns `true` if `user_id` authored the event.
    pub fn matches_author(&self, user_id: &str) -> bool {
        self.author() == Some(user_id)
    }

    /// Returns `true` if the event has no author.
    pub fn is_anonymous(&self) -> bool {
        !self.has_author()
    }

    /// Returns `true` if the log type is one of `types`.
    pub fn is_type(&self, types: &[LogEventType]) -> bool {
        types.contains(&self.log_type())
    }

    /// Returns the body cut to `max_length` characters.
    pub fn summary(&self, max_length: usize) -> String {
        let body = self.body();
        if body.chars().count() <= max_length {
            return body.to_owned();
        }
        let cut: String = body.chars().take(max_length).collect();
        format!("{}...", cut.trim())
    }

    // ------------------------------------------------------------------------
    // Type checks
    // ------------------------------------------------------------------------

    /// `log:subscribe`
    pub fn is_subscribe_event(&self) -> bool {
        self.log_type() == LogEventType::Subscribe
    }

    /// `log:unsubscribe`
    pub fn is_unsubscribe_event(&self) -> bool {
        self.log_type() == LogEventType::Unsubscribe
    }

    /// `log:thread-admins`
    pub fn is_admin_event(&self) -> bool {
        self.log_type() == LogEventType::ThreadAdmins
    }

    /// `log:thread-name`
    pub fn is_thread_name_event(&self) -> bool {
        self.log_type() == LogEventType::ThreadName
    }

    /// `log:user-nickname`
    pub fn is_nickname_event(&self) -> bool {
        self.log_type() == LogEventType::UserNickname
    }

    /// `log:thread-call`
    pub fn is_call_event(&self) -> bool {
        self.log_type() == LogEventType::ThreadCall
    }

    /// `log:thread-icon`
    pub fn is_icon_event(&self) -> bool {
        self.log_type() == LogEventType::ThreadIcon
    }

    /// `log:thread-color`
    pub fn is_color_event(&self) -> bool {
        self.log_type() == LogEventType::ThreadColor
    }

    /// `log:link-status`
    pub fn is_link_status_event(&self) -> bool {
        self.log_type() == LogEventType::LinkStatus
    }

    /// `log:magic-words`
    pub fn is_magic_words_event(&self) -> bool {
        self.log_type() == LogEventType::MagicWords
    }

    /// `log:thread-approval-mode`
    pub fn is_approval_mode_event(&self) -> bool {
        self.log_type() == LogEventType::ThreadApprovalMode
    }

    /// `log:thread-poll`
    pub fn is_poll_event(&self) -> bool {
        self.log_type() == LogEventType::ThreadPoll
    }

    // ------------------------------------------------------------------------
    // Typed getters
    // ------------------------------------------------------------------------

    /// Participants who joined.
    pub fn added_participants(&self) -> Option<&'a [Participant]> {
        match self.data() {
            LogEventData::Subscribe { added_participants } => Some(added_participants),
            _ => None,
        }
    }

    /// Participant who left. `Some(None)` when the platform did not say who.
    pub fn left_participant_id(&self) -> Option<Option<&'a str>> {
        match self.data() {
            LogEventData::Unsubscribe {
                left_participant_id,
            } => Some(left_participant_id.as_deref()),
            _ => None,
        }
    }

    /// Direction of an admin change.
    pub fn admin_event(&self) -> Option<AdminEvent> {
        match self.data() {
            LogEventData::ThreadAdmins { admin_event } => Some(*admin_event),
            _ => None,
        }
    }

    /// Returns `true` for an admin being added.
    pub fn is_admin_added(&self) -> bool {
        self.admin_event() == Some(AdminEvent::AddAdmin)
    }

    /// Returns `true` for an admin being removed.
    pub fn is_admin_removed(&self) -> bool {
        self.admin_event() == Some(AdminEvent::RemoveAdmin)
    }

    /// New thread name. `Some(None)` when the name was cleared.
    pub fn thread_name(&self) -> Option<Option<&'a str>> {
        match self.data() {
            LogEventData::ThreadName { name } => Some(name.as_deref()),
            _ => None,
        }
    }

    /// Nickname change.
    pub fn nickname_change(&self) -> Option<NicknameChange<'a>> {
        match self.data() {
            LogEventData::UserNickname {
                participant_id,
                nickname,
            } => Some(NicknameChange {
                participant_id,
                nickname,
            }),
            _ => None,
        }
    }

    /// Call details.
    pub fn call(&self) -> Option<&'a CallData> {
        match self.data() {
            LogEventData::ThreadCall(call) => Some(call),
            _ => None,
        }
    }

    /// New thread icon.
    pub fn thread_icon(&self) -> Option<&'a str> {
        match self.data() {
            LogEventData::ThreadIcon { thread_icon } => Some(thread_icon),
            _ => None,
        }
    }

    /// New thread color. `Some(None)` when the color was reset.
    pub fn thread_color(&self) -> Option<Option<&'a str>> {
        match self.data() {
            LogEventData::ThreadColor { thread_color } => Some(thread_color.as_deref()),
            _ => None,
        }
    }

    /// Magic word details.
    pub fn magic_words(&self) -> Option<&'a MagicWordsData> {
        match self.data() {
            LogEventData::MagicWords(magic) => Some(magic),
            _ => None,
        }
    }

    /// Poll details.
    pub fn poll(&self) -> Option<&'a PollData> {
        match self.data() {
            LogEventData::ThreadPoll(poll) => Some(poll),
            _ => None,
        }
    }
}
