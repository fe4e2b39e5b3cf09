//! Facebook Messenger adapter.
//!
//! Inbound traffic arrives on a webhook; outbound messages go through the
//! Send API. Messenger has no way to wait for an answer to a particular
//! message, so reply and reaction listening is done by correlation: a
//! [`CorrelationRegistry`] maps sent message ids to the handles listening on
//! them and is the first observer of every event the adapter triggers.
//!
//! # Configuration
//!
//! ```yaml
//! adapters:
//!   facebook:
//!     access_token: ${PAGE_ACCESS_TOKEN}
//!     verify_token: my-verify-token
//!     webhook:
//!       port: 9000
//! ```
//!
//! ```rust,ignore
//! use parley_adapter_facebook::FacebookAdapter;
//!
//! runtime.register_adapter::<FacebookAdapter>()?;
//! ```

use std::any::Any;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use parley_core::{
    AdapterError, AdapterResult, ChatIo, ConfigurableAdapter, CorrelationRegistry,
    DispatchForm, DispatchedHandle, DispatchedInfo, EventHub, MessageEvent, Platform,
    PlatformAdapter, TransportError, TransportResult, UsageError, UsageResult,
};
use parley_transport::{WebhookHandler, WebhookListener, WebhookServer};

use crate::api::{GraphApi, MessengerApi, OutboundAttachment, OutboundMessage};
use crate::config::FacebookConfig;
use crate::model::WebhookPayload;
use crate::translate::Translator;

/// The Facebook Messenger adapter.
pub struct FacebookAdapter {
    me: Weak<FacebookAdapter>,
    hub: EventHub,
    config: FacebookConfig,
    api: Arc<dyn MessengerApi>,
    registry: Arc<CorrelationRegistry>,
    translator: Translator,
    page_id: RwLock<Option<String>>,
    listener: Mutex<Option<WebhookListener>>,
}

impl FacebookAdapter {
    /// Creates an adapter that calls the Graph API.
    pub fn new(config: FacebookConfig) -> AdapterResult<Arc<Self>> {
        let api = GraphApi::new(&config.api_base, &config.access_token)?;
        Ok(Self::with_api(config, Arc::new(api)))
    }

    /// Creates an adapter on top of any [`MessengerApi`].
    pub fn with_api(config: FacebookConfig, api: Arc<dyn MessengerApi>) -> Arc<Self> {
        let adapter = Arc::new_cyclic(|me: &Weak<Self>| {
            let erased: Weak<dyn PlatformAdapter> = me.clone();
            Self {
                me: me.clone(),
                hub: EventHub::new(erased),
                registry: Arc::new(CorrelationRegistry::with_capacity_limit(
                    config.max_reply_listeners,
                )),
                translator: Translator::new(config.recent_messages),
                page_id: RwLock::new(None),
                listener: Mutex::new(None),
                config,
                api,
            }
        });
        // Correlation runs before any other observer sees the event.
        adapter.hub.subscribe(adapter.registry.clone());
        adapter
    }

    /// Returns the adapter configuration.
    pub fn config(&self) -> &FacebookConfig {
        &self.config
    }

    /// Returns the reply/reaction correlation map.
    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    /// Returns the page id, once a webhook batch revealed it.
    pub fn page_id(&self) -> Option<String> {
        self.page_id.read().clone()
    }

    /// Returns the bound webhook address while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().as_ref().map(WebhookListener::local_addr)
    }

    /// Translates and triggers a parsed webhook batch. Returns the number of events.
    pub fn handle_payload(&self, payload: &WebhookPayload) -> usize {
        if let Some(entry) = payload.entry.first() {
            let mut page_id = self.page_id.write();
            if page_id.as_deref() != Some(entry.id.as_str()) {
                debug!(page_id = %entry.id, "learned page id");
                *page_id = Some(entry.id.clone());
            }
        }

        let events = self.translator.translate(payload);
        let count = events.len();
        for event in events {
            self.trigger_event(event);
        }
        count
    }

    /// Parses and handles a raw webhook body.
    pub fn handle_raw(&self, body: &[u8]) -> AdapterResult<usize> {
        let payload: WebhookPayload =
            serde_json::from_slice(body).map_err(|e| AdapterError::parse(e.to_string()))?;
        Ok(self.handle_payload(&payload))
    }

    async fn deliver(&self, handle: DispatchedHandle) {
        let outcome = self.send_form(&handle).await;
        if let Err(err) = &outcome {
            error!(handle_id = %handle.id(), error = %err, "facebook dispatch failed");
        }
        if let Err(err) = handle.resolve_response(outcome) {
            warn!(handle_id = %handle.id(), error = %err, "dispatch settled elsewhere");
        }
    }

    async fn send_form(&self, handle: &DispatchedHandle) -> AdapterResult<DispatchedInfo> {
        let form = handle.begin_send()?;
        let recipient = form.thread.clone().ok_or(UsageError::MissingThread)?;
        let text = form
            .render_body(Platform::Facebook)
            .filter(|text| !text.is_empty());

        let mut attachments = Vec::with_capacity(form.attachments.len());
        for attachment in &form.attachments {
            let bytes = attachment.load().await.map_err(TransportError::from)?;
            attachments.push(OutboundAttachment {
                name: attachment.name.clone(),
                bytes,
            });
        }

        let sent = self
            .api
            .send(OutboundMessage {
                recipient,
                text: text.clone(),
                reply_to: form.reply_to.clone(),
                attachments,
            })
            .await?;

        let timestamp = chrono::Utc::now().timestamp_millis();
        self.translator.remember(&MessageEvent::new(
            self.page_id().unwrap_or_default(),
            &sent.recipient_id,
            &sent.message_id,
            text.unwrap_or_default(),
        ));
        Ok(DispatchedInfo::new(sent.message_id, sent.recipient_id, timestamp))
    }
}

#[async_trait]
impl PlatformAdapter for FacebookAdapter {
    fn name() -> &'static str {
        "facebook"
    }

    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn event_hub(&self) -> &EventHub {
        &self.hub
    }

    async fn on_start_listen(&self) -> AdapterResult<()> {
        let bridge = Arc::new(WebhookBridge {
            adapter: self.me.clone(),
            verify_token: self.config.verify_token.clone(),
        });
        let listener = WebhookServer::serve(
            &self.config.webhook.bind_addr(),
            &self.config.webhook.path,
            bridge,
        )
        .await?;
        info!(
            addr = %listener.local_addr(),
            path = %self.config.webhook.path,
            "Facebook webhook ready"
        );
        *self.listener.lock() = Some(listener);
        Ok(())
    }

    async fn on_stop_listen(&self) -> AdapterResult<()> {
        if let Some(listener) = self.listener.lock().take() {
            listener.shutdown();
        }
        Ok(())
    }

    fn on_dispatch(&self, _io: &ChatIo, form: DispatchForm) -> UsageResult<DispatchedHandle> {
        let handle = DispatchedHandle::new(Platform::Facebook, form, self.registry.clone());
        match self.me.upgrade() {
            Some(adapter) => {
                let pending = handle.clone();
                tokio::spawn(async move { adapter.deliver(pending).await });
            }
            None => {
                handle.resolve_response(Err(AdapterError::internal("adapter is shutting down")))?;
            }
        }
        Ok(handle)
    }

    async fn on_unsend(&self, _io: &ChatIo, message_id: &str, _thread_id: &str) -> AdapterResult<()> {
        warn!(message_id, "Messenger pages cannot delete sent messages");
        Err(AdapterError::unsupported("facebook", "unsend"))
    }

    async fn on_resolve_username(&self, user_id: &str) -> AdapterResult<String> {
        match self.api.user_name(user_id).await {
            Ok(Some(name)) => Ok(name),
            Ok(None) => Err(AdapterError::username_unresolved(user_id)),
            Err(err) => {
                debug!(user_id, error = %err, "profile lookup failed");
                Err(AdapterError::username_unresolved(user_id))
            }
        }
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl ConfigurableAdapter for FacebookAdapter {
    type Config = FacebookConfig;

    fn from_config(config: Self::Config) -> AdapterResult<Arc<Self>> {
        if config.access_token.is_empty() {
            return Err(AdapterError::InvalidConfig(
                "adapters.facebook.access_token is required".into(),
            ));
        }
        Self::new(config)
    }

    fn enabled(config: &Self::Config) -> bool {
        config.enabled
    }
}

/// Routes webhook traffic into the adapter without keeping it alive.
struct WebhookBridge {
    adapter: Weak<FacebookAdapter>,
    verify_token: String,
}

#[async_trait]
impl WebhookHandler for WebhookBridge {
    fn verify_token(&self) -> &str {
        &self.verify_token
    }

    async fn on_payload(&self, body: &[u8]) -> TransportResult<()> {
        let Some(adapter) = self.adapter.upgrade() else {
            return Err(TransportError::ConnectionClosed {
                reason: "adapter dropped".into(),
            });
        };
        adapter
            .handle_raw(body)
            .map(|count| debug!(events = count, "webhook batch handled"))
            .map_err(|e| TransportError::InvalidPayload(e.to_string()))
    }
}
