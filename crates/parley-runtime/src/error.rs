//! Runtime error types.

use thiserror::Error;

use parley_core::{AdapterError, Platform};

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Adapter configuration deserialization failed.
    #[error("Failed to deserialize adapter config: {0}")]
    AdapterConfigDeserialize(String),

    /// Adapter error.
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An adapter for this platform is already registered.
    #[error("An adapter for {0} is already registered")]
    AdapterExists(Platform),

    /// No adapter is registered for this platform.
    #[error("No adapter registered for {0}")]
    AdapterNotFound(Platform),

    /// A command name or alias is already taken.
    #[error("Command name or alias '{name}' is already registered by '{owner}'")]
    DuplicateCommand {
        /// The colliding name or alias.
        name: String,
        /// The command that already owns it.
        owner: String,
    },

    /// A command was registered without a usable name.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
