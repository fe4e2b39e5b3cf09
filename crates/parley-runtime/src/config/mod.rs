//! Configuration for the Parley runtime.
//!
//! [`ConfigLoader`] layers defaults, a `parley.toml`/`parley.yaml` file and
//! `PARLEY_*` environment variables into a [`ParleyConfig`];
//! [`validate_config`] rejects values the runtime cannot work with.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile};
pub use schema::{
    BotConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, ParleyConfig, SpanEventConfig,
};
pub use validation::validate_config;
