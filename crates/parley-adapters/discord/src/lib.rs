//! # Parley Adapter for Discord
//!
//! Connects Parley to Discord as a bot user.
//!
//! ## Overview
//!
//! - Inbound: the gateway websocket delivers dispatches. Messages become
//!   `message` or `message_reply` events (the replied message is taken from
//!   the dispatch or fetched), reactions become `message_reaction`, and
//!   thread renames, nickname changes, voice joins and leaves and thread
//!   membership changes become log events.
//! - Outbound: messages go through the REST API; attachments are uploaded
//!   as multipart `files[n]`.
//! - Listening: each listening handle runs a [`Collector`] over the adapter's
//!   inbound broadcast, filtered on the message reference of replies or the
//!   message id of reactions.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley_adapter_discord::{DiscordAdapter, DiscordConfig};
//!
//! let adapter = DiscordAdapter::new(DiscordConfig {
//!     token: "BOT_TOKEN".into(),
//!     ..Default::default()
//! })?;
//! adapter.listen().await?;
//! ```

pub mod adapter;
pub mod api;
pub mod collector;
pub mod config;
mod gateway;
pub mod model;
pub mod normalize;

pub use adapter::DiscordAdapter;
pub use api::{DiscordApi, OutboundFile, OutboundMessage, RestDiscordApi};
pub use collector::{Collector, DiscordListenHooks};
pub use config::{DiscordConfig, ReconnectConfig};
pub use normalize::{Normalizer, format_list};
