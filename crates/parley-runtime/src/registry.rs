//! Registry of the adapters a runtime drives.
//!
//! One adapter per platform. Adapters are registered before anything listens
//! and torn down in reverse: `stop_all` runs before the runtime exits.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use parley_core::{BoxedAdapter, EventObserver, Platform};

use crate::error::{RuntimeError, RuntimeResult};

/// Adapters keyed by platform name.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<BTreeMap<&'static str, BoxedAdapter>>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `adapter` under its platform.
    pub fn register(&self, adapter: BoxedAdapter) -> RuntimeResult<()> {
        let platform = adapter.platform();
        let mut adapters = self.adapters.write();
        if adapters.contains_key(platform.name()) {
            return Err(RuntimeError::AdapterExists(platform));
        }
        adapters.insert(platform.name(), adapter);
        debug!(platform = %platform, "Registered adapter");
        Ok(())
    }

    /// Returns the adapter for `platform`.
    pub fn get(&self, platform: Platform) -> Option<BoxedAdapter> {
        self.adapters.read().get(platform.name()).cloned()
    }

    /// Returns the adapter for `platform`, or an error naming it.
    pub fn require(&self, platform: Platform) -> RuntimeResult<BoxedAdapter> {
        self.get(platform).ok_or(RuntimeError::AdapterNotFound(platform))
    }

    /// Returns every adapter, ordered by platform name.
    pub fn all(&self) -> Vec<BoxedAdapter> {
        self.adapters.read().values().cloned().collect()
    }

    /// Returns the registered platforms, ordered by name.
    pub fn platforms(&self) -> Vec<Platform> {
        self.adapters
            .read()
            .values()
            .map(|adapter| adapter.platform())
            .collect()
    }

    /// Returns the number of registered adapters.
    pub fn count(&self) -> usize {
        self.adapters.read().len()
    }

    /// Attaches `observer` to every registered adapter's event hub.
    pub fn subscribe_all(&self, observer: Arc<dyn EventObserver>) {
        for adapter in self.all() {
            adapter.event_hub().subscribe(observer.clone());
        }
    }

    /// Starts every adapter. Failures are logged and do not stop the others.
    ///
    /// Returns the number of adapters that are listening.
    pub async fn listen_all(&self) -> usize {
        let adapters = self.all();
        let results = join_all(adapters.iter().map(|adapter| adapter.listen())).await;

        let mut listening = 0;
        for (adapter, result) in adapters.iter().zip(results) {
            match result {
                Ok(()) => {
                    listening += 1;
                    info!(platform = %adapter.platform(), "Adapter started");
                }
                Err(e) => error!(platform = %adapter.platform(), error = %e, "Failed to start adapter"),
            }
        }
        listening
    }

    /// Stops every adapter. Adapters that cannot stop are skipped quietly.
    pub async fn stop_all(&self) {
        for adapter in self.all() {
            match adapter.stop_listening().await {
                Ok(()) => debug!(platform = %adapter.platform(), "Adapter stopped"),
                Err(e) if e.is_unsupported() => {
                    debug!(platform = %adapter.platform(), "Adapter cannot stop listening")
                }
                Err(e) => warn!(platform = %adapter.platform(), error = %e, "Error stopping adapter"),
            }
        }
    }

    /// Returns a snapshot for status output.
    pub fn stats(&self) -> RegistryStats {
        let adapters = self.all();
        RegistryStats {
            adapters: adapters.len(),
            listening: adapters
                .iter()
                .filter(|adapter| adapter.event_hub().is_listening())
                .count(),
            events: adapters
                .iter()
                .map(|adapter| adapter.event_hub().triggered_count())
                .sum(),
        }
    }
}

/// Statistics about the adapter registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of registered adapters.
    pub adapters: usize,
    /// Number of adapters currently listening.
    pub listening: usize,
    /// Events triggered across all adapters.
    pub events: u64,
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Adapters: {} total ({} listening), {} events",
            self.adapters, self.listening, self.events
        )
    }
}
