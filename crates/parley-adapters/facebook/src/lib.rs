//! # Parley Adapter for Facebook Messenger
//!
//! Connects Parley to a Facebook page through the Messenger platform.
//!
//! ## Overview
//!
//! - Inbound: a webhook receives `entry[].messaging[]` batches, which are
//!   translated into `message`, `message_reply` and `message_reaction`
//!   events. Echoes of the page's own messages and redelivered batches are
//!   dropped before they reach any observer.
//! - Outbound: text and attachments go through the Graph Send API.
//! - Listening: replies and reactions are matched to the handle that sent
//!   the original message through a correlation map, bounded by
//!   `max_reply_listeners`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley_adapter_facebook::{FacebookAdapter, FacebookConfig};
//!
//! let adapter = FacebookAdapter::new(FacebookConfig {
//!     access_token: "PAGE_TOKEN".into(),
//!     verify_token: "verify-me".into(),
//!     ..Default::default()
//! })?;
//! adapter.listen().await?;
//! ```
//!
//! ## Limitations
//!
//! Pages cannot delete messages they sent, so unsending reports
//! [`AdapterError::Unsupported`](parley_core::AdapterError::Unsupported).

pub mod adapter;
pub mod api;
pub mod config;
pub mod model;
pub mod translate;

pub use adapter::FacebookAdapter;
pub use api::{GraphApi, MessengerApi, OutboundAttachment, OutboundMessage, SentMessage};
pub use config::{FacebookConfig, WebhookConfig};
pub use translate::Translator;
