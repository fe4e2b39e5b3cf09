//! # Parley
//!
//! A chat bot core that speaks to several platforms through one model.
//!
//! ## Overview
//!
//! ```text
//! ┌──────────────┐  InferredEvent  ┌───────────────┐  CommandContext  ┌─────────┐
//! │   Adapter    │────────────────▶│ CommandRouter │─────────────────▶│ Command │
//! │ (Facebook,   │                 └───────────────┘                  └────┬────┘
//! │  Discord)    │◀──────────── DispatchForm ◀──── ChatIo ◀────────────────┘
//! └──────────────┘──────────────▶ DispatchedHandle (await, listen, unsend)
//! ```
//!
//! - **Adapters** translate native traffic into [`InferredEvent`](core::InferredEvent)s
//!   and send [`DispatchForm`](core::DispatchForm)s back.
//! - **ChatIo** is the per-event facade commands talk to.
//! - **DispatchedHandle** resolves once the platform confirms a send and can
//!   then listen for replies and reactions to it.
//! - **Runtime** owns configuration, logging, the adapter registry and the router.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley::prelude::*;
//! use parley::discord::DiscordAdapter;
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
//!
//! ## Features
//!
//! - `discord`: Discord adapter (default)
//! - `facebook`: Facebook Messenger adapter (default)
//! - `toml-config`: `parley.toml` support (default)
//! - `yaml-config`: `parley.yaml` support
//! - `json-log`: JSON log output

pub use parley_core as core;
pub use parley_runtime as runtime;

#[cfg(feature = "discord")]
pub use parley_adapter_discord as discord;
#[cfg(feature = "facebook")]
pub use parley_adapter_facebook as facebook;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use parley::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use parley_runtime::{ParleyRuntime, RuntimeBuilder};

    // Routing
    pub use parley_runtime::{
        Command, CommandContext, EventContext, EventHandler, FnCommand, PrefixMode,
    };

    // Event model and I/O
    pub use parley_core::{
        ChatIo, DispatchForm, DispatchedHandle, EventType, InferredEvent, LogEventType,
        MessageEvent, Platform, ReactionNotification, ReplyNotification, Role,
    };

    // Logging macros
    pub use parley_runtime::prelude::*;
}
