//! Configuration types for the Facebook adapter.
//!
//! Loaded from the `adapters.facebook` table of the global configuration.
//!
//! # Example Configuration
//!
//! ```yaml
//! adapters:
//!   facebook:
//!     enabled: true
//!     access_token: ${PAGE_ACCESS_TOKEN}
//!     verify_token: my-verify-token
//!     webhook:
//!       host: 0.0.0.0
//!       port: 9000
//!       path: /facebook/webhook
//!     max_reply_listeners: 1024
//! ```

use serde::{Deserialize, Serialize};

/// Graph API base used when none is configured.
pub const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v19.0";

/// Facebook adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FacebookConfig {
    /// Whether the adapter is registered at all.
    pub enabled: bool,

    /// Page access token used for every Graph API call.
    pub access_token: String,

    /// Token the webhook handshake must present.
    pub verify_token: String,

    /// Graph API base URL.
    pub api_base: String,

    /// Inbound webhook endpoint.
    pub webhook: WebhookConfig,

    /// Upper bound of handles listening for replies (and, separately, reactions).
    pub max_reply_listeners: usize,

    /// How many recent messages are remembered to fill in reply targets.
    pub recent_messages: usize,
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            access_token: String::new(),
            verify_token: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            webhook: WebhookConfig::default(),
            max_reply_listeners: 1024,
            recent_messages: 512,
        }
    }
}

/// Webhook bind configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Bind address (default: "0.0.0.0").
    pub host: String,

    /// Listen port (default: 9000).
    pub port: u16,

    /// Endpoint path (default: "/facebook/webhook").
    pub path: String,
}

impl WebhookConfig {
    /// Returns the bind address as `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            path: "/facebook/webhook".to_string(),
        }
    }
}
