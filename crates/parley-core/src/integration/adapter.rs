//! Platform adapter contract.
//!
//! An adapter turns one platform's native notifications into
//! [`InferredEvent`]s and turns [`DispatchForm`]s back into native API calls.
//!
//! # Event Flow
//!
//! ```text
//! native event ──▶ translate ──▶ trigger_event ──▶ EventHub ──▶ observers
//!                                                              (correlation, router)
//! ```
//!
//! [`PlatformAdapter::trigger_event`] is the only way events leave an adapter.
//! It runs once per native event; adapters dedupe before calling it.
//!
//! # Dispatch
//!
//! [`PlatformAdapter::on_dispatch`] never blocks. It validates the request,
//! returns a pending [`DispatchedHandle`], and spawns the network call, which
//! ends with exactly one [`DispatchedHandle::resolve_response`].

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use crate::foundation::error::{AdapterResult, UsageResult};
use crate::foundation::event::InferredEvent;
use crate::foundation::form::DispatchForm;
use crate::foundation::platform::Platform;
use crate::framework::io::ChatIo;
use crate::integration::handle::DispatchedHandle;

/// The core adapter trait.
#[async_trait]
pub trait PlatformAdapter: Send + Sync + 'static {
    /// Returns the adapter name.
    ///
    /// The name locates the adapter's configuration table:
    ///
    /// ```toml
    /// [adapters.discord]  # <- returned by PlatformAdapter::name()
    /// token = "..."
    /// ```
    fn name() -> &'static str
    where
        Self: Sized;

    /// Returns the platform this adapter talks to.
    fn platform(&self) -> Platform;

    /// Returns the hub that fans translated events out to observers.
    fn event_hub(&self) -> &EventHub;

    /// Hands a translated event to every observer.
    fn trigger_event(&self, event: InferredEvent) {
        self.event_hub().trigger(event);
    }

    /// Starts receiving native events. Runs the start hook at most once.
    async fn listen(&self) -> AdapterResult<()> {
        if !self.event_hub().mark_listening() {
            warn!(platform = %self.platform(), "adapter is already listening");
            return Ok(());
        }
        info!(platform = %self.platform(), "adapter listening");
        if let Err(err) = self.on_start_listen().await {
            self.event_hub().clear_listening();
            return Err(err);
        }
        Ok(())
    }

    /// Stops receiving native events.
    async fn stop_listening(&self) -> AdapterResult<()> {
        if !self.event_hub().is_listening() {
            return Ok(());
        }
        self.on_stop_listen().await?;
        self.event_hub().clear_listening();
        info!(platform = %self.platform(), "adapter stopped listening");
        Ok(())
    }

    /// Begins receiving native events.
    async fn on_start_listen(&self) -> AdapterResult<()>;

    /// Ends receiving native events.
    ///
    /// Platforms that cannot stop return [`AdapterError::Unsupported`](crate::AdapterError::Unsupported).
    async fn on_stop_listen(&self) -> AdapterResult<()>;

    /// Schedules a send and returns its pending handle.
    ///
    /// Misuse (no thread, nothing to send) fails here. Platform failures
    /// settle the returned handle as failed instead.
    fn on_dispatch(&self, io: &ChatIo, form: DispatchForm) -> UsageResult<DispatchedHandle>;

    /// Deletes a previously sent message.
    async fn on_unsend(&self, io: &ChatIo, message_id: &str, thread_id: &str) -> AdapterResult<()>;

    /// Resolves a user id to a display name.
    async fn on_resolve_username(&self, user_id: &str) -> AdapterResult<String>;

    /// Converts this adapter into `Arc<dyn Any>` for downcasting.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A shared adapter trait object.
pub type BoxedAdapter = Arc<dyn PlatformAdapter>;

/// Trait for adapters that can be created from configuration.
///
/// Adapters implement both `PlatformAdapter` and `ConfigurableAdapter`.
pub trait ConfigurableAdapter: PlatformAdapter {
    /// The configuration type for this adapter.
    type Config: serde::de::DeserializeOwned + Default;

    /// Creates an adapter from its configuration.
    fn from_config(config: Self::Config) -> AdapterResult<Arc<Self>>
    where
        Self: Sized;

    /// Returns `false` if the configuration disables the adapter.
    fn enabled(_config: &Self::Config) -> bool
    where
        Self: Sized,
    {
        true
    }
}

/// Downcasts a boxed adapter to a concrete type.
pub fn downcast_adapter<T: PlatformAdapter>(adapter: &BoxedAdapter) -> Option<Arc<T>> {
    Arc::clone(adapter).as_any().downcast::<T>().ok()
}

// ============================================================================
// Event Hub
// ============================================================================

/// Receives every event an adapter triggers.
pub trait EventObserver: Send + Sync {
    /// Called once per event, in trigger order. Must not block.
    fn on_event(&self, event: &InferredEvent, adapter: &BoxedAdapter);
}

impl<F> EventObserver for F
where
    F: Fn(&InferredEvent, &BoxedAdapter) + Send + Sync,
{
    fn on_event(&self, event: &InferredEvent, adapter: &BoxedAdapter) {
        self(event, adapter)
    }
}

/// Fans translated events out to observers.
///
/// Owned by its adapter and pointing back at it weakly; build both with
/// [`Arc::new_cyclic`].
pub struct EventHub {
    adapter: Weak<dyn PlatformAdapter>,
    observers: RwLock<Vec<Arc<dyn EventObserver>>>,
    listening: AtomicBool,
    triggered: AtomicU64,
}

impl EventHub {
    /// Creates a hub for the adapter behind `adapter`.
    pub fn new(adapter: Weak<dyn PlatformAdapter>) -> Self {
        Self {
            adapter,
            observers: RwLock::new(Vec::new()),
            listening: AtomicBool::new(false),
            triggered: AtomicU64::new(0),
        }
    }

    /// Appends an observer.
    pub fn subscribe(&self, observer: Arc<dyn EventObserver>) {
        let mut observers = self.observers.write();
        observers.push(observer);
        debug!(observers = observers.len(), "event observer subscribed");
    }

    /// Returns the number of observers.
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Returns how many events passed through this hub.
    pub fn triggered_count(&self) -> u64 {
        self.triggered.load(Ordering::Relaxed)
    }

    /// Returns `true` once the adapter started listening.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    fn mark_listening(&self) -> bool {
        !self.listening.swap(true, Ordering::SeqCst)
    }

    fn clear_listening(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }

    /// Validates `event` and hands it to every observer.
    pub fn trigger(&self, event: InferredEvent) {
        if let Err(err) = event.validate() {
            warn!(error = %err, event_type = %event.event_type(), "dropping malformed event");
            return;
        }
        let Some(adapter) = self.adapter.upgrade() else {
            warn!("dropping event: adapter is gone");
            return;
        };

        self.triggered.fetch_add(1, Ordering::Relaxed);
        trace!(
            platform = %adapter.platform(),
            event_type = %event.event_type(),
            sender = event.sender_id().unwrap_or("-"),
            "event triggered"
        );

        let observers = self.observers.read().clone();
        for observer in observers {
            observer.on_event(&event, &adapter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::event::MessageEvent;
    use crate::testing::MockAdapter;
    use parking_lot::Mutex;

    #[test]
    fn test_trigger_reaches_observers_in_order() {
        let adapter = MockAdapter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = seen.clone();
            adapter
                .event_hub()
                .subscribe(Arc::new(move |event: &InferredEvent, _: &BoxedAdapter| {
                    seen.lock().push((tag, event.event_type()));
                }));
        }

        adapter.trigger_event(InferredEvent::Message(MessageEvent::new("U1", "T1", "M1", "hi")));

        assert_eq!(
            *seen.lock(),
            vec![
                ("first", crate::EventType::Message),
                ("second", crate::EventType::Message)
            ]
        );
        assert_eq!(adapter.event_hub().triggered_count(), 1);
    }

    #[test]
    fn test_trigger_drops_malformed_events() {
        let adapter = MockAdapter::new();
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        adapter
            .event_hub()
            .subscribe(Arc::new(move |_: &InferredEvent, _: &BoxedAdapter| {
                *counter.lock() += 1;
            }));

        adapter.trigger_event(InferredEvent::Message(MessageEvent::new("U1", "T1", "", "hi")));

        assert_eq!(*count.lock(), 0);
        assert_eq!(adapter.event_hub().triggered_count(), 0);
    }

    #[tokio::test]
    async fn test_listen_runs_start_hook_once() {
        let adapter = MockAdapter::new();
        adapter.listen().await.unwrap();
        adapter.listen().await.unwrap();
        assert_eq!(adapter.start_calls(), 1);

        adapter.stop_listening().await.unwrap();
        assert!(!adapter.event_hub().is_listening());
    }

    #[test]
    fn test_downcast_adapter() {
        let adapter = MockAdapter::new();
        assert!(downcast_adapter::<MockAdapter>(&adapter.boxed()).is_some());
    }
}
