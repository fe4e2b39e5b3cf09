//! Configuration types for the Discord adapter.
//!
//! Loaded from the `adapters.discord` table of the global configuration.
//!
//! # Example Configuration
//!
//! ```yaml
//! adapters:
//!   discord:
//!     token: ${DISCORD_BOT_TOKEN}
//!     intents: 33409
//!     reconnect:
//!       initial_delay_ms: 1000
//!       max_delay_ms: 60000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use parley_transport::WsConfig;

/// REST API base used when none is configured.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Gateway intents the adapter needs by default.
///
/// Guilds, guild members, guild voice states, guild messages, guild message
/// reactions and message content.
pub const DEFAULT_INTENTS: u64 = (1 << 0) | (1 << 1) | (1 << 7) | (1 << 9) | (1 << 10) | (1 << 15);

/// Discord adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Whether the adapter is registered at all.
    pub enabled: bool,

    /// Bot token, sent as `Authorization: Bot <token>`.
    pub token: String,

    /// REST API base URL.
    pub api_base: String,

    /// Gateway intents bitfield.
    pub intents: u64,

    /// Gateway reconnection policy.
    pub reconnect: ReconnectConfig,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            intents: DEFAULT_INTENTS,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Gateway reconnection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Reconnect when the gateway drops (default: true).
    pub auto_reconnect: bool,

    /// First retry delay in milliseconds (default: 1000).
    pub initial_delay_ms: u64,

    /// Retry delay ceiling in milliseconds (default: 60000).
    pub max_delay_ms: u64,

    /// Delay growth factor (default: 2.0).
    pub backoff_multiplier: f64,

    /// Give up after this many failed attempts; unlimited when absent.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            max_retries: None,
        }
    }
}

impl From<&ReconnectConfig> for WsConfig {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            auto_reconnect: config.auto_reconnect,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            max_retries: config.max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
token: bot-token
reconnect:
  initial_delay_ms: 250
  max_retries: 5
"#;

        let config: DiscordConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.enabled);
        assert_eq!(config.token, "bot-token");
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.intents, DEFAULT_INTENTS);

        let ws = WsConfig::from(&config.reconnect);
        assert!(ws.auto_reconnect);
        assert_eq!(ws.initial_delay, Duration::from_millis(250));
        assert_eq!(ws.max_delay, Duration::from_secs(60));
        assert_eq!(ws.max_retries, Some(5));
    }

    #[test]
    fn test_default_intents_include_message_content() {
        assert_ne!(DEFAULT_INTENTS & (1 << 15), 0);
        assert_ne!(DEFAULT_INTENTS & (1 << 9), 0);
    }
}
