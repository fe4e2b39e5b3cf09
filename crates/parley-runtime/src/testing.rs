//! Test doubles shared by the unit tests of this crate.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;

use parley_core::{
    AdapterError, AdapterResult, BoxedAdapter, ChatIo, ConfigurableAdapter, CorrelationRegistry,
    DispatchForm, DispatchedHandle, DispatchedInfo, EventHub, InferredEvent, MessageEvent,
    Platform, PlatformAdapter, UsageResult,
};

/// Adapter that confirms every dispatch as `S1`, `S2`, ... and records it.
pub(crate) struct StubAdapter {
    me: Weak<StubAdapter>,
    platform: Platform,
    hub: EventHub,
    registry: Arc<CorrelationRegistry>,
    fail_start: bool,
    unstoppable: bool,
    sent: Mutex<Vec<DispatchForm>>,
    lookups: AtomicUsize,
}

impl StubAdapter {
    pub(crate) fn new(platform: Platform) -> Arc<Self> {
        Self::build(platform, false, false)
    }

    /// Fails to start listening.
    pub(crate) fn failing(platform: Platform) -> Arc<Self> {
        Self::build(platform, true, false)
    }

    /// Reports that it cannot stop listening.
    pub(crate) fn unstoppable(platform: Platform) -> Arc<Self> {
        Self::build(platform, false, true)
    }

    fn build(platform: Platform, fail_start: bool, unstoppable: bool) -> Arc<Self> {
        let adapter = Arc::new_cyclic(|me: &Weak<Self>| {
            let erased: Weak<dyn PlatformAdapter> = me.clone();
            Self {
                me: me.clone(),
                platform,
                hub: EventHub::new(erased),
                registry: Arc::new(CorrelationRegistry::new()),
                fail_start,
                unstoppable,
                sent: Mutex::new(Vec::new()),
                lookups: AtomicUsize::new(0),
            }
        });
        adapter.hub.subscribe(adapter.registry.clone());
        adapter
    }

    pub(crate) fn boxed(&self) -> BoxedAdapter {
        self.me.upgrade().expect("stub adapter dropped")
    }

    /// Rendered bodies of everything sent, in order.
    pub(crate) fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|form| form.render_body(self.platform))
            .collect()
    }

    pub(crate) fn sent_forms(&self) -> Vec<DispatchForm> {
        self.sent.lock().clone()
    }

    pub(crate) fn username_lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

/// Builds an inbound message in thread `T1`.
pub(crate) fn message(sender: &str, message_id: &str, body: &str) -> InferredEvent {
    InferredEvent::Message(MessageEvent::new(sender, "T1", message_id, body))
}

#[async_trait]
impl PlatformAdapter for StubAdapter {
    fn name() -> &'static str {
        "stub"
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn event_hub(&self) -> &EventHub {
        &self.hub
    }

    async fn on_start_listen(&self) -> AdapterResult<()> {
        if self.fail_start {
            return Err(AdapterError::internal("cannot reach platform"));
        }
        Ok(())
    }

    async fn on_stop_listen(&self) -> AdapterResult<()> {
        if self.unstoppable {
            return Err(AdapterError::unsupported("stub", "stop_listening"));
        }
        Ok(())
    }

    fn on_dispatch(&self, _io: &ChatIo, form: DispatchForm) -> UsageResult<DispatchedHandle> {
        let number = {
            let mut sent = self.sent.lock();
            sent.push(form.clone());
            sent.len()
        };
        let thread = form.thread.clone().unwrap_or_default();
        let handle = DispatchedHandle::new(self.platform, form, self.registry.clone());
        handle.begin_send()?;
        handle.resolve_response(Ok(DispatchedInfo::new(format!("S{number}"), thread, 0)))?;
        Ok(handle)
    }

    async fn on_unsend(&self, _io: &ChatIo, _message_id: &str, _thread_id: &str) -> AdapterResult<()> {
        Ok(())
    }

    async fn on_resolve_username(&self, user_id: &str) -> AdapterResult<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if user_id.is_empty() {
            return Err(AdapterError::username_unresolved(user_id));
        }
        Ok(format!("User {user_id}"))
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct StubConfig {
    pub(crate) disabled: bool,
}

impl ConfigurableAdapter for StubAdapter {
    type Config = StubConfig;

    fn from_config(_config: Self::Config) -> AdapterResult<Arc<Self>> {
        Ok(Self::new(Platform::Unspecified))
    }

    fn enabled(config: &Self::Config) -> bool {
        !config.disabled
    }
}
