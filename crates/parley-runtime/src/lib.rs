//! Parley Runtime - orchestration layer for the Parley chat bot.
//!
//! This crate provides:
//! - Layered configuration (`ParleyConfig`, `ConfigLoader`)
//! - Logging setup (`LoggingBuilder`)
//! - The adapter registry (`AdapterRegistry`)
//! - Command and event routing (`CommandRouter`)
//! - A username cache (`UsernameCache`)
//! - Runtime lifecycle (`ParleyRuntime`)
//!
//! ```ignore
//! use parley_runtime::{CommandContext, FnCommand, ParleyRuntime};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = ParleyRuntime::new();
//!     runtime.register_adapter::<DiscordAdapter>()?;
//!     runtime.register_command(FnCommand::new("ping", |ctx: CommandContext| async move {
//!         ctx.io.reply("pong")?.await?;
//!         Ok(())
//!     }))?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod usernames;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use config::{
    BotConfig, ConfigError, ConfigLoader, ConfigResult, LogFormat, LogLevel, LogOutput,
    LoggingConfig, ParleyConfig, Profile,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use registry::{AdapterRegistry, RegistryStats};
pub use router::{
    Command, CommandContext, CommandRouter, EventContext, EventHandler, FnCommand, PrefixMode,
    RoleTable, Routing,
};
pub use runtime::{ParleyRuntime, RuntimeBuilder};
pub use usernames::{UNKNOWN_USER, UsernameCache};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
