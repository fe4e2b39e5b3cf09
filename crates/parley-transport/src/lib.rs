//! # Parley Transport
//!
//! Wire helpers shared by the Parley platform adapters.
//!
//! Adapters speak to their platforms through three primitives, each behind a
//! feature flag so an adapter only pulls in the stack it needs.
//!
//! ## Features
//!
//! - `http-client`: [`RestClient`], a JSON/multipart REST client
//! - `http-server`: [`WebhookServer`], an inbound webhook endpoint
//! - `ws-client`: [`WsClient`], a reconnecting websocket client
//! - `full`: all of the above
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  Adapter Layer      │  (Facebook, Discord)
//! ├─────────────────────┤
//! │  parley-transport   │  <- This crate
//! ├─────────────────────┤
//! │  Network (TCP/HTTP) │
//! └─────────────────────┘
//! ```
//!
//! All failures surface as [`parley_core::TransportError`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley_transport::{Auth, RestClient};
//!
//! let client = RestClient::new("https://discord.com/api/v10")?
//!     .with_auth(Auth::header("Authorization", "Bot TOKEN"));
//! let me: serde_json::Value = client.get_json("/users/@me", &[]).await?;
//! ```

#[cfg(any(feature = "http-client", feature = "http-server"))]
pub mod http;

#[cfg(feature = "ws-client")]
pub mod websocket;

#[cfg(feature = "http-client")]
pub use http::{Auth, FilePart, MultipartForm, RestClient};

#[cfg(feature = "http-server")]
pub use http::{WebhookHandler, WebhookListener, WebhookServer};

#[cfg(feature = "ws-client")]
pub use websocket::{WsClient, WsConfig, WsConnection, WsHandler, WsSender};
