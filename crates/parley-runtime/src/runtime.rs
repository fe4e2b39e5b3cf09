//! Runtime lifecycle.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use parley_runtime::ParleyRuntime;
//!
//! // Loads parley.toml / parley.yaml from the current directory.
//! let runtime = ParleyRuntime::new();
//!
//! // Or pick the file and profile explicitly.
//! let runtime = ParleyRuntime::builder()
//!     .config_file("config/parley.toml")
//!     .profile("production")
//!     .build()?;
//!
//! runtime.register_adapter::<DiscordAdapter>()?;
//! runtime.register_command(ping)?;
//! runtime.run().await?;
//! ```
//!
//! Adapters are registered before `start`; `stop` runs before the process
//! exits. Every registered adapter feeds the runtime's [`CommandRouter`].

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal;
use tracing::{debug, error, info, warn};

use parley_core::{BoxedAdapter, ConfigurableAdapter};

use crate::config::{ConfigLoader, ConfigResult, ParleyConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::registry::{AdapterRegistry, RegistryStats};
use crate::router::{Command, CommandRouter, EventHandler};
use crate::usernames::UsernameCache;

/// Owns the adapters, the router and the username cache of one bot.
pub struct ParleyRuntime {
    config: ParleyConfig,
    registry: Arc<AdapterRegistry>,
    router: CommandRouter,
    running: AtomicBool,
}

impl ParleyRuntime {
    /// Creates a runtime from the configuration found in the current directory.
    ///
    /// Falls back to defaults when no configuration can be loaded.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                ParleyConfig::default()
            });

        Self::from_config(&config)
    }

    /// Starts a [`RuntimeBuilder`] for explicit config sources.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from `config`, initializing logging from it.
    pub fn from_config(config: &ParleyConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            prefixes = ?config.bot.prefixes,
            "Runtime initialized from configuration"
        );

        let usernames = Arc::new(UsernameCache::new());
        Self {
            config: config.clone(),
            registry: Arc::new(AdapterRegistry::new()),
            router: CommandRouter::from_config(&config.bot, usernames),
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    pub fn usernames(&self) -> &Arc<UsernameCache> {
        self.router.usernames()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Builds and registers an adapter from its `adapters.<name>` table.
    ///
    /// A missing table means the adapter's default configuration. Returns
    /// `Ok(false)` when the configuration disables the adapter.
    pub fn register_adapter<A>(&self) -> RuntimeResult<bool>
    where
        A: ConfigurableAdapter + 'static,
    {
        let adapter_name = A::name();

        let config: A::Config = match self.config.adapters.get(adapter_name) {
            Some(value) => value.deserialize().map_err(|e| {
                RuntimeError::AdapterConfigDeserialize(format!(
                    "Failed to deserialize config for adapter '{adapter_name}': {e}"
                ))
            })?,
            None => {
                warn!(
                    adapter = adapter_name,
                    "No configuration found for adapter, using default"
                );
                A::Config::default()
            }
        };

        if !A::enabled(&config) {
            info!(adapter = adapter_name, "Adapter disabled by configuration");
            return Ok(false);
        }

        let adapter = A::from_config(config)?;
        self.register_adapter_instance(adapter)?;
        info!(adapter = adapter_name, "Registered adapter");
        Ok(true)
    }

    /// Registers an adapter built elsewhere and routes its events.
    pub fn register_adapter_instance(&self, adapter: BoxedAdapter) -> RuntimeResult<()> {
        self.registry.register(adapter.clone())?;
        adapter.event_hub().subscribe(Arc::new(self.router.clone()));
        Ok(())
    }

    /// Registers a command with the router.
    pub fn register_command(&self, command: impl Command) -> RuntimeResult<()> {
        self.router.register_command(command)
    }

    /// Registers an event handler with the router.
    pub fn register_event_handler(&self, handler: impl EventHandler) {
        self.router.register_event_handler(handler);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts every registered adapter.
    pub async fn start(&self) -> RuntimeResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Runtime is already running");
            return Ok(());
        }

        info!(
            adapters = self.registry.count(),
            commands = self.router.command_count(),
            "Starting Parley runtime"
        );
        let listening = self.registry.listen_all().await;
        if listening == 0 && self.registry.count() > 0 {
            warn!("No adapter is listening");
        }
        info!(listening, "Runtime started");
        Ok(())
    }

    /// Stops every registered adapter.
    pub async fn stop(&self) -> RuntimeResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Runtime is not running");
            return Ok(());
        }

        info!("Stopping Parley runtime");
        self.registry.stop_all().await;
        info!(stats = %self.registry.stats(), "Runtime stopped");
        Ok(())
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("Parley runtime is now running. Press Ctrl+C to stop.");
        wait_for_shutdown().await;
        self.stop().await
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await
    }
}

impl Default for ParleyRuntime {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler; waiting for Ctrl+C only");
                wait_for_ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = wait_for_ctrl_c() => {}
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`ParleyRuntime`] with explicit configuration sources.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Loads this file instead of searching for one.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g. "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a directory to search for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Reads `PARLEY_*` environment variables (the default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration built in code.
    pub fn merge(mut self, config: ParleyConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads, validates and builds.
    pub fn build(self) -> ConfigResult<ParleyRuntime> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;
        debug!("Configuration validated");
        Ok(ParleyRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
