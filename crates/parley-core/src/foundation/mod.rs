//! Foundation layer - shared vocabulary.
//!
//! This module contains the types every other layer speaks:
//! - Error taxonomy (usage, transport, adapter)
//! - The inferred event model
//! - Dispatch forms
//! - Platforms and roles

pub mod error;
pub mod event;
pub mod form;
pub mod platform;
pub mod role;

pub use error::{
    AdapterError, AdapterResult, TransportError, TransportResult, UsageError, UsageResult,
};
pub use event::{
    AdminEvent, CallData, CallEvent, EventType, Extras, InferredEvent, LogEvent, LogEventData,
    LogEventType, MagicWordsData, MessageEvent, Participant, PollData, PollEventType,
    ReactionEvent,
};
pub use form::{Attachment, AttachmentSource, DispatchBody, DispatchForm, Renderable};
pub use platform::Platform;
pub use role::Role;
