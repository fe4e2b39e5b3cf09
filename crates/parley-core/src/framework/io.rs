//! Per-event I/O facade.
//!
//! A [`ChatIo`] wraps one inbound event and the adapter it came from. For
//! message-like events it remembers the thread and the message to reply to,
//! so handler code can simply write:
//!
//! ```rust,ignore
//! let handle = io.reply("pong")?;
//! handle.await?;
//! ```
//!
//! Targeting precedence for `reply_with`/`send_to` is: explicit argument,
//! then the form's own field, then the pinned default.

use std::error::Error;
use std::fmt::{self, Display, Write as _};
use std::sync::Arc;

use tracing::debug;

use crate::foundation::error::{AdapterError, AdapterResult, UsageError, UsageResult};
use crate::foundation::event::{EventType, InferredEvent};
use crate::foundation::form::DispatchForm;
use crate::foundation::platform::Platform;
use crate::framework::log_view::LogEventView;
use crate::integration::adapter::{BoxedAdapter, PlatformAdapter, downcast_adapter};
use crate::integration::handle::DispatchedHandle;

/// First line of every formatted error report.
pub const ERROR_HEADER: &str = "❌ | An error has occurred:";

/// Facade over one inbound event and its adapter.
#[derive(Clone)]
pub struct ChatIo {
    event: Arc<InferredEvent>,
    adapter: BoxedAdapter,
    thread: Option<String>,
    reply_to: Option<String>,
}

impl ChatIo {
    /// Wraps `event`, pinning its thread and message for message-like events.
    pub fn new(event: InferredEvent, adapter: BoxedAdapter) -> Self {
        let (thread, reply_to) = pinned_targets(&event);
        Self {
            event: Arc::new(event),
            adapter,
            thread,
            reply_to,
        }
    }

    /// Returns the wrapped event.
    pub fn event(&self) -> &InferredEvent {
        &self.event
    }

    /// Returns the originating adapter.
    pub fn adapter(&self) -> &BoxedAdapter {
        &self.adapter
    }

    /// Returns the platform of the originating adapter.
    pub fn platform(&self) -> Platform {
        self.adapter.platform()
    }

    /// Returns the current default thread.
    pub fn thread(&self) -> Option<&str> {
        self.thread.as_deref()
    }

    /// Returns the current default reply target.
    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    /// Overrides the default thread; `None` restores the event's thread.
    pub fn set_thread(&mut self, thread: Option<String>) {
        self.thread = thread.or_else(|| pinned_targets(&self.event).0);
    }

    /// Overrides the default reply target; `None` restores the event's message.
    pub fn set_reply_to(&mut self, reply_to: Option<String>) {
        self.reply_to = reply_to.or_else(|| pinned_targets(&self.event).1);
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    /// Sends `form` as is. The form must name its thread.
    pub fn dispatch(&self, form: impl Into<DispatchForm>) -> UsageResult<DispatchedHandle> {
        let form = form.into();
        if form.thread.is_none() {
            return Err(UsageError::MissingThread);
        }
        if !form.has_content() {
            return Err(UsageError::NothingToSend);
        }
        debug!(
            platform = %self.platform(),
            thread = form.thread.as_deref().unwrap_or_default(),
            reply_to = form.reply_to.as_deref().unwrap_or("-"),
            "dispatching"
        );
        self.adapter.on_dispatch(self, form)
    }

    /// Replies to the event's message.
    pub fn reply(&self, form: impl Into<DispatchForm>) -> UsageResult<DispatchedHandle> {
        self.reply_with(form, None, None)
    }

    /// Replies with explicit targets.
    pub fn reply_with(
        &self,
        form: impl Into<DispatchForm>,
        reply_to: Option<&str>,
        thread: Option<&str>,
    ) -> UsageResult<DispatchedHandle> {
        if !self.event.event_type().is_message_like() {
            return Err(UsageError::NotMessageEvent { operation: "reply" });
        }
        let mut form = form.into();
        form.reply_to = reply_to
            .map(str::to_owned)
            .or(form.reply_to)
            .or_else(|| self.reply_to.clone());
        form.thread = thread
            .map(str::to_owned)
            .or(form.thread)
            .or_else(|| self.thread.clone());
        if form.reply_to.is_none() {
            return Err(UsageError::MissingReplyTo);
        }
        self.dispatch(form)
    }

    /// Sends to the default thread without replying.
    pub fn send(&self, form: impl Into<DispatchForm>) -> UsageResult<DispatchedHandle> {
        self.send_in(form, None)
    }

    /// Sends to `thread` without replying.
    pub fn send_to(
        &self,
        form: impl Into<DispatchForm>,
        thread: &str,
    ) -> UsageResult<DispatchedHandle> {
        self.send_in(form, Some(thread))
    }

    fn send_in(
        &self,
        form: impl Into<DispatchForm>,
        thread: Option<&str>,
    ) -> UsageResult<DispatchedHandle> {
        let mut form = form.into();
        form.reply_to = None;
        form.thread = thread
            .map(str::to_owned)
            .or(form.thread)
            .or_else(|| self.thread.clone());
        self.dispatch(form)
    }

    /// Deletes a message sent through `handle`, waiting for it to be sent first.
    pub async fn unsend(&self, handle: &DispatchedHandle) -> AdapterResult<()> {
        let info = handle.await_ready().await?;
        self.adapter
            .on_unsend(self, &info.message_id, &info.thread_id)
            .await
    }

    /// Deletes a message by id; the thread defaults to the current one.
    pub async fn unsend_message(
        &self,
        message_id: &str,
        thread_id: Option<&str>,
    ) -> AdapterResult<()> {
        let thread_id = thread_id
            .or(self.thread.as_deref())
            .ok_or(UsageError::MissingThread)?;
        self.adapter.on_unsend(self, message_id, thread_id).await
    }

    /// Reports `err` to the user.
    ///
    /// Replies on message-like events and sends to the current thread otherwise.
    pub fn error(&self, err: &(dyn Error + 'static)) -> UsageResult<DispatchedHandle> {
        self.report(format_error(err))
    }

    /// Reports a plain message as an error.
    pub fn error_text(&self, message: impl Display) -> UsageResult<DispatchedHandle> {
        self.report(format!("{ERROR_HEADER}\n{message}"))
    }

    fn report(&self, text: String) -> UsageResult<DispatchedHandle> {
        if self.is_message() || self.is_message_reply() {
            self.reply(text)
        } else {
            self.send(text)
        }
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Returns the event type.
    pub fn event_type(&self) -> EventType {
        self.event.event_type()
    }

    /// Returns `true` if the event is one of `types`.
    pub fn is(&self, types: &[EventType]) -> bool {
        types.contains(&self.event.event_type())
    }

    /// Returns `true` for `message` events.
    pub fn is_message(&self) -> bool {
        self.event_type() == EventType::Message
    }

    /// Returns `true` for `message_reply` events.
    pub fn is_message_reply(&self) -> bool {
        self.event_type() == EventType::MessageReply
    }

    /// Returns a typed view over log events.
    pub fn log_event(&self) -> Option<LogEventView<'_>> {
        self.event.as_log().map(LogEventView::new)
    }

    /// Returns the user the event points at: the first mention, else the
    /// author of the replied-to message.
    pub fn ref_sender_id(&self) -> Option<&str> {
        let message = self.event.as_message()?;
        message
            .mentions
            .keys()
            .next()
            .map(String::as_str)
            .or_else(|| {
                message
                    .message_reply
                    .as_deref()
                    .map(|replied| replied.sender_id.as_str())
            })
            .filter(|id| !id.is_empty())
    }

    /// Resolves a user id through the adapter.
    pub async fn resolve_username(&self, user_id: &str) -> AdapterResult<String> {
        self.adapter.on_resolve_username(user_id).await
    }

    /// Returns the concrete adapter, or an adapter-mismatch error.
    pub fn assert_dangerous_api<A: PlatformAdapter>(&self) -> AdapterResult<Arc<A>> {
        self.nullable_dangerous_api::<A>()
            .ok_or(AdapterError::AdapterMismatch {
                expected: A::name(),
                actual: self.platform().name(),
            })
    }

    /// Returns the concrete adapter if it is an `A`.
    pub fn nullable_dangerous_api<A: PlatformAdapter>(&self) -> Option<Arc<A>> {
        downcast_adapter::<A>(&self.adapter)
    }
}

impl fmt::Debug for ChatIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatIo")
            .field("platform", &self.platform())
            .field("event_type", &self.event_type())
            .field("thread", &self.thread)
            .field("reply_to", &self.reply_to)
            .finish()
    }
}

fn pinned_targets(event: &InferredEvent) -> (Option<String>, Option<String>) {
    match event.as_message() {
        Some(message) => (
            Some(message.thread_id.clone()),
            Some(message.message_id.clone()),
        ),
        None => (None, None),
    }
}

/// Formats an error and its source chain for display to users.
pub fn format_error(err: &(dyn Error + 'static)) -> String {
    let mut text = format!("{ERROR_HEADER}\n{err}");
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(text, "\ncaused by: {cause}");
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::event::{LogEvent, LogEventData, MessageEvent, ReactionEvent};
    use crate::testing::MockAdapter;
    use std::time::Duration;

    fn message_io(adapter: &Arc<MockAdapter>) -> ChatIo {
        ChatIo::new(
            InferredEvent::Message(MessageEvent::new("U1", "T1", "M0", "hey")),
            adapter.boxed(),
        )
    }

    fn event_of(tag: EventType) -> InferredEvent {
        let message = MessageEvent::new("U1", "T1", "M0", "hey");
        match tag {
            EventType::Message => InferredEvent::Message(message),
            EventType::MessageReply => InferredEvent::MessageReply(
                message.replying_to(MessageEvent::new("U2", "T1", "M-1", "earlier")),
            ),
            EventType::MessageReaction => InferredEvent::Reaction(ReactionEvent {
                message_id: "M0".into(),
                sender_id: "U1".into(),
                user_id: "U2".into(),
                reaction: "❤".into(),
                ..Default::default()
            }),
            EventType::Log => InferredEvent::Log(LogEvent::new(
                LogEventData::ThreadName {
                    name: Some("general".into()),
                },
                "renamed",
                Some("U1".into()),
            )),
        }
    }

    #[tokio::test]
    async fn test_dispatch_resolves_with_adapter_info() {
        let adapter = MockAdapter::with_delay(Duration::from_millis(5));
        let io = message_io(&adapter);

        let handle = io.dispatch(DispatchForm::from("hi").thread("T1")).unwrap();
        assert!(handle.is_pending());

        let ready = handle.await.unwrap();
        let info = ready.info().unwrap();
        assert_eq!(info.message_id, "M1");
        assert_eq!(info.thread_id, "T1");
        assert_eq!(info.timestamp, 1000);
    }

    #[test]
    fn test_reply_fills_pinned_targets() {
        let adapter = MockAdapter::new();
        let io = message_io(&adapter);

        io.reply("yo").unwrap();

        let sent = adapter.dispatched();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].render_body(Platform::Unspecified).as_deref(), Some("yo"));
        assert_eq!(sent[0].thread.as_deref(), Some("T1"));
        assert_eq!(sent[0].reply_to.as_deref(), Some("M0"));
    }

    #[test]
    fn test_reply_guard_by_event_type() {
        let adapter = MockAdapter::new();
        for (tag, allowed) in [
            (EventType::Message, true),
            (EventType::MessageReply, true),
            (EventType::MessageReaction, false),
            (EventType::Log, false),
        ] {
            let io = ChatIo::new(event_of(tag), adapter.boxed());
            let result = io.reply("yo");
            assert_eq!(result.is_ok(), allowed, "reply on {tag}");
            if !allowed {
                assert_eq!(
                    result.err(),
                    Some(UsageError::NotMessageEvent { operation: "reply" })
                );
            }
        }
    }

    #[test]
    fn test_reply_override_precedence() {
        let adapter = MockAdapter::new();
        let io = message_io(&adapter);

        io.reply(DispatchForm::from("a").reply_to("M5")).unwrap();
        io.reply_with("b", Some("M7"), Some("T2")).unwrap();

        let sent = adapter.dispatched();
        assert_eq!(sent[0].reply_to.as_deref(), Some("M5"));
        assert_eq!(sent[0].thread.as_deref(), Some("T1"));
        assert_eq!(sent[1].reply_to.as_deref(), Some("M7"));
        assert_eq!(sent[1].thread.as_deref(), Some("T2"));
    }

    #[test]
    fn test_send_never_replies() {
        let adapter = MockAdapter::new();
        let io = message_io(&adapter);

        io.send(DispatchForm::from("x").reply_to("M5")).unwrap();
        io.send_to("y", "T9").unwrap();

        let sent = adapter.dispatched();
        assert!(sent.iter().all(|form| form.reply_to.is_none()));
        assert_eq!(sent[0].thread.as_deref(), Some("T1"));
        assert_eq!(sent[1].thread.as_deref(), Some("T9"));
    }

    #[test]
    fn test_send_without_thread_on_log_event() {
        let adapter = MockAdapter::new();
        let mut io = ChatIo::new(event_of(EventType::Log), adapter.boxed());

        assert_eq!(io.send("x").err(), Some(UsageError::MissingThread));
        assert!(io.send_to("x", "T3").is_ok());

        io.set_thread(Some("T4".into()));
        assert!(io.send("x").is_ok());
        io.set_thread(None);
        assert_eq!(io.thread(), None);
    }

    #[test]
    fn test_dispatch_usage_errors() {
        let adapter = MockAdapter::new();
        let io = message_io(&adapter);

        assert_eq!(io.dispatch("no thread").err(), Some(UsageError::MissingThread));
        assert_eq!(
            io.dispatch(DispatchForm::new().thread("T1")).err(),
            Some(UsageError::NothingToSend)
        );
        assert!(adapter.dispatched().is_empty());
    }

    #[test]
    fn test_set_targets_default_back_to_event() {
        let adapter = MockAdapter::new();
        let mut io = message_io(&adapter);

        io.set_thread(Some("T2".into()));
        io.set_reply_to(Some("M9".into()));
        assert_eq!((io.thread(), io.reply_to()), (Some("T2"), Some("M9")));

        io.set_thread(None);
        io.set_reply_to(None);
        assert_eq!((io.thread(), io.reply_to()), (Some("T1"), Some("M0")));
    }

    #[tokio::test]
    async fn test_unsend_handle_passes_ids() {
        let adapter = MockAdapter::new();
        let io = message_io(&adapter);

        let handle = io.reply("bye").unwrap();
        io.unsend(&handle).await.unwrap();

        assert_eq!(adapter.unsent(), vec![("M1".to_owned(), "T1".to_owned())]);
    }

    #[tokio::test]
    async fn test_unsend_message_defaults_thread() {
        let adapter = MockAdapter::new();
        let io = message_io(&adapter);

        io.unsend_message("M3", None).await.unwrap();
        io.unsend_message("M4", Some("T8")).await.unwrap();

        assert_eq!(
            adapter.unsent(),
            vec![
                ("M3".to_owned(), "T1".to_owned()),
                ("M4".to_owned(), "T8".to_owned())
            ]
        );
    }

    #[tokio::test]
    async fn test_unsend_failure_propagates() {
        let adapter = MockAdapter::new();
        adapter.fail_unsend();
        let io = message_io(&adapter);

        assert!(io.unsend_message("M3", None).await.is_err());
    }

    #[test]
    fn test_format_error_includes_chain() {
        let text = format_error(&AdapterError::rejected("invalid channel"));
        assert!(text.starts_with("❌ | An error has occurred:\n"));
        assert!(text.contains("invalid channel"));

        #[derive(Debug)]
        struct Wrapper(std::io::Error);
        impl Display for Wrapper {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("wrapper failed")
            }
        }
        impl Error for Wrapper {
            fn source(&self) -> Option<&(dyn Error + 'static)> {
                Some(&self.0)
            }
        }
        let text = format_error(&Wrapper(std::io::Error::other("disk full")));
        assert!(text.ends_with("wrapper failed\ncaused by: disk full"));
    }

    #[test]
    fn test_error_replies_with_report() {
        let adapter = MockAdapter::new();
        let io = message_io(&adapter);

        io.error(&AdapterError::internal("boom")).unwrap();

        let sent = adapter.dispatched();
        let body = sent[0].render_body(Platform::Unspecified).unwrap();
        assert!(body.starts_with(ERROR_HEADER));
        assert!(body.contains("boom"));
        assert_eq!(sent[0].reply_to.as_deref(), Some("M0"));
    }

    #[test]
    fn test_ref_sender_id() {
        let adapter = MockAdapter::new();
        let mentioned = ChatIo::new(
            InferredEvent::Message(
                MessageEvent::new("U1", "T1", "M0", "@bob hi").with_mention("U7", "@bob"),
            ),
            adapter.boxed(),
        );
        assert_eq!(mentioned.ref_sender_id(), Some("U7"));

        let reply = ChatIo::new(event_of(EventType::MessageReply), adapter.boxed());
        assert_eq!(reply.ref_sender_id(), Some("U2"));

        let plain = message_io(&adapter);
        assert_eq!(plain.ref_sender_id(), None);
    }

    #[test]
    fn test_event_type_helpers() {
        let adapter = MockAdapter::new();
        let io = ChatIo::new(event_of(EventType::Log), adapter.boxed());
        assert!(io.is(&[EventType::Message, EventType::Log]));
        assert!(!io.is_message());
        assert!(io.log_event().is_some());
        assert!(message_io(&adapter).log_event().is_none());
    }

    #[test]
    fn test_dangerous_api_checks_adapter_type() {
        let adapter = MockAdapter::new();
        let io = message_io(&adapter);

        assert!(io.assert_dangerous_api::<MockAdapter>().is_ok());
        assert!(io.nullable_dangerous_api::<MockAdapter>().is_some());

        let err = io
            .assert_dangerous_api::<crate::testing::SilentAdapter>()
            .unwrap_err();
        assert!(matches!(err, AdapterError::AdapterMismatch { .. }));
        assert!(
            io.nullable_dangerous_api::<crate::testing::SilentAdapter>()
                .is_none()
        );
    }
}
