//! # Parley Core
//!
//! The platform-independent heart of the Parley chat bot.
//!
//! Chat platforms disagree on almost everything: message shapes, how replies
//! are threaded, how attachments are uploaded, whether a bot can wait for an
//! answer to a message it sent. This crate hides those differences behind
//! one interface: receive an inferred event, dispatch a reply, optionally
//! wait for replies or reactions within a timeout, unsend a message.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! - **Event Model**: [`InferredEvent`] and its log payloads ([`LogEventData`])
//! - **Dispatch Forms**: [`DispatchForm`], [`DispatchBody`], [`Renderable`]
//! - **Shared Vocabulary**: [`Platform`], [`Role`], error types
//!
//! ### Integration Layer
//!
//! - **Adapter Contract**: [`PlatformAdapter`], [`ConfigurableAdapter`]
//! - **Event Fan-out**: [`EventHub`], [`EventObserver`]
//! - **Dispatch Handles**: [`DispatchedHandle`], [`ListenHooks`]
//! - **Reply Correlation**: [`CorrelationRegistry`]
//!
//! ### Framework Layer
//!
//! - **I/O Facade**: [`ChatIo`]
//! - **Log Views**: [`LogEventView`]
//!
//! ## Flow
//!
//! ```text
//! ┌──────────┐  trigger_event  ┌──────────┐  on_event  ┌────────────────┐
//! │ Adapter  │────────────────▶│ EventHub │───────────▶│ Router / Corr. │
//! └──────────┘                 └──────────┘            └───────┬────────┘
//!      ▲                                                       │ ChatIo::reply
//!      │ on_dispatch                                           ▼
//!      └────────────────────────────────────────────── DispatchedHandle
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use parley_core::prelude::*;
//!
//! async fn quiz(io: ChatIo) -> AdapterResult<()> {
//!     let handle = io.reply("What is 2 + 2?")?;
//!     let mut replies = handle.subscribe_replies();
//!     handle.listen_replies(Some(Duration::from_secs(30))).await?;
//!
//!     if let Some(answer) = replies.recv().await {
//!         handle.stop_listen_replies()?;
//!         answer.io.reply("Noted!")?;
//!     }
//!     Ok(())
//! }
//! ```

// Architectural layers
pub mod foundation;
pub mod framework;
pub mod integration;

#[cfg(test)]
pub(crate) mod testing;

// Re-export foundation types
pub use foundation::{
    AdapterError, AdapterResult, AdminEvent, Attachment, AttachmentSource, CallData, CallEvent,
    DispatchBody, DispatchForm, EventType, Extras, InferredEvent, LogEvent, LogEventData,
    LogEventType, MagicWordsData, MessageEvent, Participant, Platform, PollData, PollEventType,
    ReactionEvent, Renderable, Role, TransportError, TransportResult, UsageError, UsageResult,
};

// Re-export framework types
pub use framework::{
    ChatIo, DEFAULT_SUMMARY_LENGTH, ERROR_HEADER, LogEventView, NicknameChange, format_error,
};

// Re-export integration types
pub use integration::{
    BoxedAdapter, ConfigurableAdapter, CorrelationRegistry, DispatchedHandle, DispatchedInfo,
    EventHub, EventObserver, HandleState, ListenHooks, PlatformAdapter, ReactionNotification,
    ReplyNotification, Subscription, WeakDispatchedHandle, downcast_adapter,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::foundation::*;
    pub use super::framework::{ChatIo, LogEventView};
    pub use super::integration::{
        BoxedAdapter, DispatchedHandle, DispatchedInfo, PlatformAdapter, ReactionNotification,
        ReplyNotification,
    };
}
