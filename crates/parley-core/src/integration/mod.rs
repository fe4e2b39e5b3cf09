//! Integration layer - the seam between the core and platform adapters.
//!
//! This module contains:
//! - The adapter contract and its event hub
//! - Dispatch handles and their listen hooks
//! - The message-id correlation registry

pub mod adapter;
pub mod correlation;
pub mod handle;

pub use adapter::{
    BoxedAdapter, ConfigurableAdapter, EventHub, EventObserver, PlatformAdapter, downcast_adapter,
};
pub use correlation::CorrelationRegistry;
pub use handle::{
    DispatchedHandle, DispatchedInfo, HandleState, ListenHooks, ReactionNotification,
    ReplyNotification, Subscription, WeakDispatchedHandle,
};
