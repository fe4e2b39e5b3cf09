//! Cached username resolution.
//!
//! Display names are looked up through the adapter once per platform and
//! user, then served from memory. A user that cannot be resolved shows up as
//! [`UNKNOWN_USER`]; that placeholder is never cached, so the next lookup
//! tries the platform again.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{trace, warn};

use parley_core::{BoxedAdapter, Platform};

/// Shown in place of a name that could not be resolved.
pub const UNKNOWN_USER: &str = "[Unknown User]";

/// In-memory username cache keyed by platform and user id.
#[derive(Debug, Default)]
pub struct UsernameCache {
    names: RwLock<HashMap<(Platform, String), String>>,
}

impl UsernameCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the display name of `user_id` on `adapter`'s platform.
    ///
    /// Never fails: an unresolvable user yields [`UNKNOWN_USER`].
    pub async fn get(&self, adapter: &BoxedAdapter, user_id: &str) -> String {
        let key = (adapter.platform(), user_id.to_owned());
        let cached = self.names.read().get(&key).cloned();
        if let Some(name) = cached {
            trace!(platform = %key.0, user_id, "username cache hit");
            return name;
        }

        match adapter.on_resolve_username(user_id).await {
            Ok(name) => {
                self.names.write().insert(key, name.clone());
                name
            }
            Err(e) => {
                warn!(platform = %key.0, user_id, error = %e, "Failed to resolve username");
                UNKNOWN_USER.to_owned()
            }
        }
    }

    /// Returns a cached name without asking the platform.
    pub fn cached(&self, platform: Platform, user_id: &str) -> Option<String> {
        self.names
            .read()
            .get(&(platform, user_id.to_owned()))
            .cloned()
    }

    /// Stores a name learned elsewhere, e.g. from an inbound event.
    pub fn insert(&self, platform: Platform, user_id: impl Into<String>, name: impl Into<String>) {
        self.names
            .write()
            .insert((platform, user_id.into()), name.into());
    }

    /// Forgets one user, so the next lookup asks the platform again.
    pub fn invalidate(&self, platform: Platform, user_id: &str) -> bool {
        self.names
            .write()
            .remove(&(platform, user_id.to_owned()))
            .is_some()
    }

    /// Returns the number of cached names.
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubAdapter;

    #[tokio::test]
    async fn test_resolves_once_then_serves_from_cache() {
        let stub = StubAdapter::new(Platform::Discord);
        let adapter: BoxedAdapter = stub.clone();
        let cache = UsernameCache::new();

        assert_eq!(cache.get(&adapter, "42").await, "User 42");
        assert_eq!(cache.get(&adapter, "42").await, "User 42");

        assert_eq!(stub.username_lookups(), 1);
        assert_eq!(cache.cached(Platform::Discord, "42").as_deref(), Some("User 42"));
        assert_eq!(cache.cached(Platform::Facebook, "42"), None);
    }

    #[tokio::test]
    async fn test_failure_yields_placeholder_and_is_not_cached() {
        let stub = StubAdapter::new(Platform::Facebook);
        let adapter: BoxedAdapter = stub.clone();
        let cache = UsernameCache::new();

        assert_eq!(cache.get(&adapter, "").await, UNKNOWN_USER);
        assert_eq!(cache.get(&adapter, "").await, UNKNOWN_USER);

        assert!(cache.is_empty());
        assert_eq!(stub.username_lookups(), 2);
    }

    #[tokio::test]
    async fn test_insert_and_invalidate() {
        let stub = StubAdapter::new(Platform::Discord);
        let adapter: BoxedAdapter = stub.clone();
        let cache = UsernameCache::new();

        cache.insert(Platform::Discord, "7", "Seven");
        assert_eq!(cache.get(&adapter, "7").await, "Seven");
        assert_eq!(stub.username_lookups(), 0);

        assert!(cache.invalidate(Platform::Discord, "7"));
        assert_eq!(cache.get(&adapter, "7").await, "User 7");
        assert_eq!(cache.len(), 1);
    }
}
