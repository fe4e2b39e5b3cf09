//! HTTP transports.
//!
//! This module provides the REST client and the webhook server.

#[cfg(feature = "http-client")]
mod client;
#[cfg(feature = "http-client")]
pub use client::{Auth, FilePart, MultipartForm, RestClient};

#[cfg(feature = "http-server")]
mod server;
#[cfg(feature = "http-server")]
pub use server::{WebhookHandler, WebhookListener, WebhookServer};
