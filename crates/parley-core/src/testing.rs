//! Test doubles shared by the unit tests of this crate.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::foundation::error::{AdapterError, AdapterResult, UsageResult};
use crate::foundation::form::DispatchForm;
use crate::foundation::platform::Platform;
use crate::framework::io::ChatIo;
use crate::integration::adapter::{BoxedAdapter, EventHub, PlatformAdapter};
use crate::integration::correlation::CorrelationRegistry;
use crate::integration::handle::{DispatchedHandle, DispatchedInfo, ListenHooks};

/// Adapter that records dispatches and confirms them as `M1`, `M2`, ...
pub(crate) struct MockAdapter {
    me: Weak<MockAdapter>,
    hub: EventHub,
    registry: Arc<CorrelationRegistry>,
    delay: Option<Duration>,
    dispatched: Mutex<Vec<DispatchForm>>,
    unsent: Mutex<Vec<(String, String)>>,
    starts: AtomicUsize,
    fail_unsend: AtomicBool,
}

impl MockAdapter {
    /// Confirms every dispatch immediately.
    pub(crate) fn new() -> Arc<Self> {
        Self::build(None)
    }

    /// Confirms every dispatch after `delay`.
    pub(crate) fn with_delay(delay: Duration) -> Arc<Self> {
        Self::build(Some(delay))
    }

    fn build(delay: Option<Duration>) -> Arc<Self> {
        let adapter = Arc::new_cyclic(|me: &Weak<Self>| {
            let erased: Weak<dyn PlatformAdapter> = me.clone();
            Self {
                me: me.clone(),
                hub: EventHub::new(erased),
                registry: Arc::new(CorrelationRegistry::new()),
                delay,
                dispatched: Mutex::new(Vec::new()),
                unsent: Mutex::new(Vec::new()),
                starts: AtomicUsize::new(0),
                fail_unsend: AtomicBool::new(false),
            }
        });
        adapter.hub.subscribe(adapter.registry.clone());
        adapter
    }

    pub(crate) fn boxed(&self) -> BoxedAdapter {
        self.me.upgrade().expect("mock adapter dropped")
    }

    pub(crate) fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    pub(crate) fn dispatched(&self) -> Vec<DispatchForm> {
        self.dispatched.lock().clone()
    }

    pub(crate) fn unsent(&self) -> Vec<(String, String)> {
        self.unsent.lock().clone()
    }

    pub(crate) fn start_calls(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_unsend(&self) {
        self.fail_unsend.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn name() -> &'static str {
        "mock"
    }

    fn platform(&self) -> Platform {
        Platform::Unspecified
    }

    fn event_hub(&self) -> &EventHub {
        &self.hub
    }

    async fn on_start_listen(&self) -> AdapterResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_stop_listen(&self) -> AdapterResult<()> {
        Ok(())
    }

    fn on_dispatch(&self, _io: &ChatIo, form: DispatchForm) -> UsageResult<DispatchedHandle> {
        let number = {
            let mut dispatched = self.dispatched.lock();
            dispatched.push(form.clone());
            dispatched.len()
        };
        let thread = form.thread.clone().unwrap_or_default();
        let handle = DispatchedHandle::new(Platform::Unspecified, form, self.registry.clone());
        let info = DispatchedInfo::new(format!("M{number}"), thread, 1000);

        match self.delay {
            None => {
                handle.begin_send()?;
                handle.resolve_response(Ok(info))?;
            }
            Some(delay) => {
                let pending = handle.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let outcome = pending.begin_send().map(|_| info).map_err(AdapterError::from);
                    let _ = pending.resolve_response(outcome);
                });
            }
        }
        Ok(handle)
    }

    async fn on_unsend(&self, _io: &ChatIo, message_id: &str, thread_id: &str) -> AdapterResult<()> {
        if self.fail_unsend.load(Ordering::SeqCst) {
            return Err(AdapterError::rejected("delete failed"));
        }
        self.unsent
            .lock()
            .push((message_id.to_owned(), thread_id.to_owned()));
        Ok(())
    }

    async fn on_resolve_username(&self, user_id: &str) -> AdapterResult<String> {
        if user_id.is_empty() {
            return Err(AdapterError::username_unresolved(user_id));
        }
        Ok(format!("User {user_id}"))
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Adapter type that is never instantiated; used to provoke mismatches.
#[allow(dead_code)]
pub(crate) struct SilentAdapter {
    hub: EventHub,
}

impl std::fmt::Debug for SilentAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SilentAdapter").finish_non_exhaustive()
    }
}

#[async_trait]
impl PlatformAdapter for SilentAdapter {
    fn name() -> &'static str {
        "silent"
    }

    fn platform(&self) -> Platform {
        Platform::Unspecified
    }

    fn event_hub(&self) -> &EventHub {
        &self.hub
    }

    async fn on_start_listen(&self) -> AdapterResult<()> {
        Ok(())
    }

    async fn on_stop_listen(&self) -> AdapterResult<()> {
        Err(AdapterError::unsupported("silent", "stop_listening"))
    }

    fn on_dispatch(&self, _io: &ChatIo, _form: DispatchForm) -> UsageResult<DispatchedHandle> {
        Err(crate::UsageError::NothingToSend)
    }

    async fn on_unsend(&self, _io: &ChatIo, _message_id: &str, _thread_id: &str) -> AdapterResult<()> {
        Ok(())
    }

    async fn on_resolve_username(&self, user_id: &str) -> AdapterResult<String> {
        Err(AdapterError::username_unresolved(user_id))
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Hooks that only count calls.
#[derive(Default)]
pub(crate) struct RecordingHooks {
    pub(crate) reply_listens: AtomicUsize,
    pub(crate) reply_unlistens: AtomicUsize,
}

impl RecordingHooks {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl ListenHooks for RecordingHooks {
    fn on_listen_replies(
        &self,
        _handle: &DispatchedHandle,
        _timeout: Option<Duration>,
    ) -> AdapterResult<()> {
        self.reply_listens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_unlisten_replies(&self, _handle: &DispatchedHandle) -> AdapterResult<()> {
        self.reply_unlistens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
