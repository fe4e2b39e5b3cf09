//! Dispatch handles.
//!
//! A [`DispatchedHandle`] stands for one message being sent. It starts out
//! pending, settles exactly once into ready (with the platform ids) or failed
//! (with the captured error), and can then listen for replies and reactions
//! on the sent message.
//!
//! ```text
//!            resolve_response(Ok)          listen_replies / stop / timeout
//! pending ─────────────────────────▶ ready ◀──────────────────────────────▶ listening-reply
//!    │                                 ▲
//!    │ resolve_response(Err)           └──── listen_reactions / stop / timeout ──▶ listening-reaction
//!    ▼
//! failed
//! ```
//!
//! The handle is awaitable: `handle.await` yields the ready handle or the
//! error the send failed with. The form stays mutable until the adapter
//! calls [`DispatchedHandle::begin_send`].
//!
//! Adapter-side correlation state is reached through [`ListenHooks`]. The
//! adapter only ever keeps a [`WeakDispatchedHandle`], so it never extends the
//! lifetime of a handle the caller dropped.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::foundation::error::{AdapterError, AdapterResult, UsageError, UsageResult};
use crate::foundation::event::{InferredEvent, ReactionEvent};
use crate::foundation::form::{Attachment, DispatchBody, DispatchForm};
use crate::foundation::platform::Platform;
use crate::framework::io::ChatIo;

// ============================================================================
// Settled Values
// ============================================================================

/// Platform confirmation of a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedInfo {
    /// Id of the sent message.
    pub message_id: String,
    /// Thread the message landed in.
    pub thread_id: String,
    /// Platform timestamp in milliseconds.
    pub timestamp: i64,
}

impl DispatchedInfo {
    /// Creates dispatch info.
    pub fn new(message_id: impl Into<String>, thread_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            message_id: message_id.into(),
            thread_id: thread_id.into(),
            timestamp,
        }
    }
}

/// Send state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// The send has not settled.
    Pending,
    /// The platform confirmed the message.
    Ready,
    /// The send failed.
    Failed,
}

type Outcome = Result<DispatchedInfo, AdapterError>;

/// A reply to a listened-to message.
#[derive(Debug, Clone)]
pub struct ReplyNotification {
    /// Facade bound to the reply event.
    pub io: ChatIo,
    /// The reply.
    pub event: InferredEvent,
}

/// A reaction on a listened-to message.
#[derive(Debug, Clone)]
pub struct ReactionNotification {
    /// Facade bound to the reaction event.
    pub io: ChatIo,
    /// The reaction.
    pub event: ReactionEvent,
}

// ============================================================================
// Listen Hooks
// ============================================================================

/// Adapter-side correlation behind a handle's listening axes.
///
/// Hooks run while the handle holds its axis lock and must not block.
pub trait ListenHooks: Send + Sync {
    /// Start routing replies of `handle`'s message to it.
    fn on_listen_replies(
        &self,
        handle: &DispatchedHandle,
        timeout: Option<Duration>,
    ) -> AdapterResult<()>;

    /// Stop routing replies to `handle`.
    fn on_unlisten_replies(&self, handle: &DispatchedHandle) -> AdapterResult<()>;

    /// Start routing reactions on `handle`'s message to it.
    fn on_listen_reactions(
        &self,
        handle: &DispatchedHandle,
        _timeout: Option<Duration>,
    ) -> AdapterResult<()> {
        Err(AdapterError::unsupported(
            handle.platform().name(),
            "listen_reactions",
        ))
    }

    /// Stop routing reactions to `handle`.
    fn on_unlisten_reactions(&self, handle: &DispatchedHandle) -> AdapterResult<()> {
        Err(AdapterError::unsupported(
            handle.platform().name(),
            "stop_listen_reactions",
        ))
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

/// Receiving end of a notification subscription.
///
/// Ends (yields `None`) once the axis it was taken from stops listening.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Waits for the next notification.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Returns a notification if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

struct Subscribers<T> {
    senders: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T: Clone> Subscribers<T> {
    fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().push(tx);
        Subscription { rx }
    }

    fn emit(&self, value: &T) -> usize {
        let mut senders = self.senders.lock();
        senders.retain(|tx| tx.send(value.clone()).is_ok());
        senders.len()
    }

    fn close(&self) {
        self.senders.lock().clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Replies,
    Reactions,
}

impl Axis {
    const fn name(self) -> &'static str {
        match self {
            Self::Replies => "replies",
            Self::Reactions => "reactions",
        }
    }
}

#[derive(Default)]
struct AxisState {
    active: bool,
    generation: u64,
    timer: Option<AbortHandle>,
}

struct FormSlot {
    form: DispatchForm,
    locked: bool,
}

// ============================================================================
// Dispatched Handle
// ============================================================================

struct HandleInner {
    id: Uuid,
    platform: Platform,
    hooks: Arc<dyn ListenHooks>,
    form: Mutex<FormSlot>,
    outcome: watch::Sender<Option<Outcome>>,
    reply_axis: Mutex<AxisState>,
    reaction_axis: Mutex<AxisState>,
    replies: Subscribers<ReplyNotification>,
    reactions: Subscribers<ReactionNotification>,
}

/// A message being sent, and later the sent message.
///
/// Cloning is cheap and every clone refers to the same handle.
#[derive(Clone)]
pub struct DispatchedHandle {
    inner: Arc<HandleInner>,
}

impl DispatchedHandle {
    /// Creates a pending handle for `form`.
    pub fn new(platform: Platform, form: DispatchForm, hooks: Arc<dyn ListenHooks>) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                platform,
                hooks,
                form: Mutex::new(FormSlot {
                    form,
                    locked: false,
                }),
                outcome,
                reply_axis: Mutex::new(AxisState::default()),
                reaction_axis: Mutex::new(AxisState::default()),
                replies: Subscribers::new(),
                reactions: Subscribers::new(),
            }),
        }
    }

    /// Returns the unique handle id.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns the platform of the adapter that created this handle.
    pub fn platform(&self) -> Platform {
        self.inner.platform
    }

    /// Returns a non-owning reference.
    pub fn downgrade(&self) -> WeakDispatchedHandle {
        WeakDispatchedHandle {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ------------------------------------------------------------------------
    // Send state
    // ------------------------------------------------------------------------

    /// Returns the current send state.
    pub fn state(&self) -> HandleState {
        match &*self.inner.outcome.borrow() {
            None => HandleState::Pending,
            Some(Ok(_)) => HandleState::Ready,
            Some(Err(_)) => HandleState::Failed,
        }
    }

    /// Returns `true` until the send settles.
    pub fn is_pending(&self) -> bool {
        self.state() == HandleState::Pending
    }

    /// Returns `true` once the platform confirmed the message.
    pub fn is_ready(&self) -> bool {
        self.state() == HandleState::Ready
    }

    /// Returns `true` if the send failed.
    pub fn is_failed(&self) -> bool {
        self.state() == HandleState::Failed
    }

    /// Returns the confirmation, once ready.
    pub fn info(&self) -> Option<DispatchedInfo> {
        match &*self.inner.outcome.borrow() {
            Some(Ok(info)) => Some(info.clone()),
            _ => None,
        }
    }

    /// Returns the captured error, once failed.
    pub fn error(&self) -> Option<AdapterError> {
        match &*self.inner.outcome.borrow() {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }

    /// Returns the sent message id, once ready.
    pub fn message_id(&self) -> Option<String> {
        self.info().map(|info| info.message_id)
    }

    /// Returns the thread of the sent message, once ready.
    pub fn thread_id(&self) -> Option<String> {
        self.info().map(|info| info.thread_id)
    }

    /// Settles the send. Adapters call this exactly once per handle.
    pub fn resolve_response(&self, outcome: Outcome) -> UsageResult<()> {
        let summary = match &outcome {
            Ok(info) => format!("ready as {}", info.message_id),
            Err(err) => format!("failed: {err}"),
        };
        let settled = self.inner.outcome.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        });
        if !settled {
            error!(handle_id = %self.inner.id, "dispatch handle resolved twice");
            return Err(UsageError::AlreadyResolved);
        }
        self.inner.form.lock().locked = true;
        debug!(handle_id = %self.inner.id, platform = %self.inner.platform, "dispatch {summary}");
        Ok(())
    }

    /// Waits until the send settles.
    pub async fn await_ready(&self) -> AdapterResult<DispatchedInfo> {
        let mut rx = self.inner.outcome.subscribe();
        let settled = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| AdapterError::internal("dispatch handle closed"))?;
        match &*settled {
            Some(Ok(info)) => Ok(info.clone()),
            Some(Err(err)) => Err(err.clone()),
            None => Err(AdapterError::internal("dispatch handle closed")),
        }
    }

    // ------------------------------------------------------------------------
    // Form
    // ------------------------------------------------------------------------

    fn with_form(&self, apply: impl FnOnce(&mut DispatchForm)) -> UsageResult<&Self> {
        let mut slot = self.inner.form.lock();
        if slot.locked {
            return Err(UsageError::FormLocked);
        }
        apply(&mut slot.form);
        Ok(self)
    }

    /// Replaces the body of the pending form.
    pub fn set_body(&self, body: impl Into<DispatchBody>) -> UsageResult<&Self> {
        let body = body.into();
        self.with_form(|form| form.body = Some(body))
    }

    /// Replaces the attachments of the pending form.
    pub fn set_attachments(&self, attachments: Vec<Attachment>) -> UsageResult<&Self> {
        self.with_form(|form| form.attachments = attachments)
    }

    /// Retargets the pending form.
    pub fn set_thread(&self, thread: impl Into<String>) -> UsageResult<&Self> {
        let thread = thread.into();
        self.with_form(|form| form.thread = Some(thread))
    }

    /// Changes (or clears) the reply target of the pending form.
    pub fn set_reply_to(&self, reply_to: Option<String>) -> UsageResult<&Self> {
        self.with_form(|form| form.reply_to = reply_to)
    }

    /// Returns a snapshot of the form.
    pub fn form(&self) -> DispatchForm {
        self.inner.form.lock().form.clone()
    }

    /// Locks the form and returns it for sending.
    pub fn begin_send(&self) -> UsageResult<DispatchForm> {
        let mut slot = self.inner.form.lock();
        if slot.locked {
            return Err(UsageError::FormLocked);
        }
        slot.locked = true;
        Ok(slot.form.clone())
    }

    // ------------------------------------------------------------------------
    // Listening
    // ------------------------------------------------------------------------

    fn axis(&self, axis: Axis) -> &Mutex<AxisState> {
        match axis {
            Axis::Replies => &self.inner.reply_axis,
            Axis::Reactions => &self.inner.reaction_axis,
        }
    }

    /// Starts routing replies to this handle.
    ///
    /// Waits for the send to settle first. With a timeout, listening stops
    /// on its own once it elapses; calling again restarts the timer.
    pub async fn listen_replies(&self, timeout: Option<Duration>) -> AdapterResult<()> {
        self.await_ready().await?;
        self.start_listening(Axis::Replies, timeout)
    }

    /// Stops routing replies. Safe to call any number of times.
    pub fn stop_listen_replies(&self) -> AdapterResult<()> {
        self.stop_listening(Axis::Replies)
    }

    /// Starts routing reactions to this handle.
    pub async fn listen_reactions(&self, timeout: Option<Duration>) -> AdapterResult<()> {
        self.await_ready().await?;
        self.start_listening(Axis::Reactions, timeout)
    }

    /// Stops routing reactions. Safe to call any number of times.
    pub fn stop_listen_reactions(&self) -> AdapterResult<()> {
        self.stop_listening(Axis::Reactions)
    }

    /// Returns `true` while replies are routed to this handle.
    pub fn is_listening_replies(&self) -> bool {
        self.inner.reply_axis.lock().active
    }

    /// Returns `true` while reactions are routed to this handle.
    pub fn is_listening_reactions(&self) -> bool {
        self.inner.reaction_axis.lock().active
    }

    fn start_listening(&self, axis: Axis, timeout: Option<Duration>) -> AdapterResult<()> {
        let mut state = self.axis(axis).lock();
        if !state.active {
            match axis {
                Axis::Replies => self.inner.hooks.on_listen_replies(self, timeout)?,
                Axis::Reactions => self.inner.hooks.on_listen_reactions(self, timeout)?,
            }
            state.active = true;
        }

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;

        match timeout {
            Some(duration) => {
                let weak = self.downgrade();
                let generation = state.generation;
                let task = tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    if let Some(handle) = weak.upgrade() {
                        handle.expire(axis, generation);
                    }
                });
                state.timer = Some(task.abort_handle());
            }
            None => warn!(
                handle_id = %self.inner.id,
                axis = axis.name(),
                "listening without a timeout; it must be stopped explicitly"
            ),
        }

        debug!(handle_id = %self.inner.id, axis = axis.name(), ?timeout, "listening started");
        Ok(())
    }

    fn stop_listening(&self, axis: Axis) -> AdapterResult<()> {
        let mut state = self.axis(axis).lock();
        if !state.active {
            return Ok(());
        }
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        self.teardown(axis, &mut state)
    }

    fn expire(&self, axis: Axis, generation: u64) {
        let mut state = self.axis(axis).lock();
        if !state.active || state.generation != generation {
            return;
        }
        state.timer = None;
        debug!(handle_id = %self.inner.id, axis = axis.name(), "listening timed out");
        if let Err(err) = self.teardown(axis, &mut state) {
            warn!(handle_id = %self.inner.id, axis = axis.name(), error = %err, "failed to stop listening after timeout");
        }
    }

    fn teardown(&self, axis: Axis, state: &mut AxisState) -> AdapterResult<()> {
        state.active = false;
        let result = match axis {
            Axis::Replies => {
                self.inner.replies.close();
                self.inner.hooks.on_unlisten_replies(self)
            }
            Axis::Reactions => {
                self.inner.reactions.close();
                self.inner.hooks.on_unlisten_reactions(self)
            }
        };
        debug!(handle_id = %self.inner.id, axis = axis.name(), "listening stopped");
        result
    }

    // ------------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------------

    /// Subscribes to replies. The subscription ends when reply listening stops.
    pub fn subscribe_replies(&self) -> Subscription<ReplyNotification> {
        self.inner.replies.subscribe()
    }

    /// Subscribes to reactions. The subscription ends when reaction listening stops.
    pub fn subscribe_reactions(&self) -> Subscription<ReactionNotification> {
        self.inner.reactions.subscribe()
    }

    /// Runs `callback` for every reply until reply listening stops.
    pub fn on_reply<F, Fut>(&self, callback: F)
    where
        F: Fn(ReplyNotification) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut subscription = self.subscribe_replies();
        tokio::spawn(async move {
            while let Some(notification) = subscription.recv().await {
                callback(notification).await;
            }
        });
    }

    /// Runs `callback` for every reaction until reaction listening stops.
    pub fn on_reaction<F, Fut>(&self, callback: F)
    where
        F: Fn(ReactionNotification) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut subscription = self.subscribe_reactions();
        tokio::spawn(async move {
            while let Some(notification) = subscription.recv().await {
                callback(notification).await;
            }
        });
    }

    /// Delivers a reply to every subscriber; returns how many received it.
    ///
    /// Nothing is delivered unless replies are being listened for.
    pub fn emit_reply(&self, notification: ReplyNotification) -> usize {
        let state = self.inner.reply_axis.lock();
        if !state.active {
            return 0;
        }
        self.inner.replies.emit(&notification)
    }

    /// Delivers a reaction to every subscriber; returns how many received it.
    pub fn emit_reaction(&self, notification: ReactionNotification) -> usize {
        let state = self.inner.reaction_axis.lock();
        if !state.active {
            return 0;
        }
        self.inner.reactions.emit(&notification)
    }
}

impl fmt::Debug for DispatchedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchedHandle")
            .field("id", &self.inner.id)
            .field("platform", &self.inner.platform)
            .field("state", &self.state())
            .field("message_id", &self.message_id())
            .finish()
    }
}

impl IntoFuture for DispatchedHandle {
    type Output = AdapterResult<DispatchedHandle>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            self.await_ready().await?;
            Ok(self)
        })
    }
}

/// A handle reference that does not keep the handle alive.
#[derive(Debug, Clone)]
pub struct WeakDispatchedHandle {
    id: Uuid,
    inner: Weak<HandleInner>,
}

impl WeakDispatchedHandle {
    /// Returns the id of the referenced handle.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the handle if it is still alive.
    pub fn upgrade(&self) -> Option<DispatchedHandle> {
        self.inner
            .upgrade()
            .map(|inner| DispatchedHandle { inner })
    }
}
