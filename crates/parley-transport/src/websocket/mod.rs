//! WebSocket transports.

mod client;
pub use client::{WsClient, WsConfig, WsConnection, WsHandler, WsSender};
