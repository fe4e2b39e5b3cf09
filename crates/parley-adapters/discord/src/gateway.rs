//! Gateway session handling.
//!
//! The websocket client owns the connection and its reconnects; this handler
//! speaks the gateway protocol on top of it:
//!
//! ```text
//! server: Hello{heartbeat_interval} ──▶ start heartbeats, send Identify
//! server: Dispatch READY            ──▶ remember the bot user
//! server: Dispatch <event>          ──▶ DiscordAdapter::handle_dispatch
//! server: Heartbeat                 ──▶ heartbeat now
//! server: Reconnect                 ──▶ drop the connection; the client reconnects
//! server: InvalidSession            ──▶ identify again after a pause
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use parley_transport::{WsHandler, WsSender};

use crate::adapter::DiscordAdapter;
use crate::model::{GatewayPayload, Hello, Ready, opcode};

/// Pause before identifying again after an invalid session.
const REIDENTIFY_DELAY: Duration = Duration::from_secs(3);

/// Speaks the gateway protocol for one adapter.
pub(crate) struct GatewaySession {
    adapter: Weak<DiscordAdapter>,
    token: String,
    intents: u64,
    sequence: Arc<Mutex<Option<u64>>>,
    heartbeat: Mutex<Option<CancellationToken>>,
}

impl GatewaySession {
    pub(crate) fn new(adapter: Weak<DiscordAdapter>, token: String, intents: u64) -> Self {
        Self {
            adapter,
            token,
            intents,
            sequence: Arc::new(Mutex::new(None)),
            heartbeat: Mutex::new(None),
        }
    }

    fn identify_payload(&self) -> Value {
        json!({
            "op": opcode::IDENTIFY,
            "d": {
                "token": self.token,
                "intents": self.intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "parley",
                    "device": "parley"
                }
            }
        })
    }

    fn heartbeat_payload(sequence: Option<u64>) -> Value {
        json!({ "op": opcode::HEARTBEAT, "d": sequence })
    }

    fn start_heartbeat(&self, interval: Duration, sender: WsSender) {
        let token = CancellationToken::new();
        if let Some(previous) = self.heartbeat.lock().replace(token.clone()) {
            previous.cancel();
        }

        let sequence = self.sequence.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let beat = Self::heartbeat_payload(*sequence.lock());
                        if let Err(e) = sender.send_json(&beat).await {
                            warn!(error = %e, "Discord heartbeat failed");
                            break;
                        }
                        trace!("heartbeat sent");
                    }
                }
            }
        });
    }

    fn stop_heartbeat(&self) {
        if let Some(token) = self.heartbeat.lock().take() {
            token.cancel();
        }
    }

    async fn handle_payload(&self, payload: GatewayPayload, sender: &WsSender) {
        if let Some(seq) = payload.s {
            *self.sequence.lock() = Some(seq);
        }

        match payload.op {
            opcode::HELLO => {
                let interval = serde_json::from_value::<Hello>(payload.d)
                    .map(|hello| hello.heartbeat_interval)
                    .unwrap_or(41_250);
                debug!(interval_ms = interval, "gateway hello");
                self.start_heartbeat(Duration::from_millis(interval), sender.clone());
                if let Err(e) = sender.send_json(&self.identify_payload()).await {
                    error!(error = %e, "failed to identify with the Discord gateway");
                }
            }
            opcode::HEARTBEAT => {
                let beat = Self::heartbeat_payload(*self.sequence.lock());
                if let Err(e) = sender.send_json(&beat).await {
                    warn!(error = %e, "requested heartbeat failed");
                }
            }
            opcode::HEARTBEAT_ACK => trace!("heartbeat acknowledged"),
            opcode::RECONNECT => {
                info!("Discord gateway asked to reconnect");
                self.stop_heartbeat();
                if let Err(e) = sender.reconnect().await {
                    warn!(error = %e, "failed to drop the gateway connection");
                }
            }
            opcode::INVALID_SESSION => {
                warn!("Discord gateway session invalidated; identifying again");
                *self.sequence.lock() = None;
                let identify = self.identify_payload();
                let sender = sender.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(REIDENTIFY_DELAY).await;
                    if let Err(e) = sender.send_json(&identify).await {
                        warn!(error = %e, "re-identify failed");
                    }
                });
            }
            opcode::DISPATCH => self.handle_dispatch(payload).await,
            other => trace!(op = other, "ignoring gateway opcode"),
        }
    }

    async fn handle_dispatch(&self, payload: GatewayPayload) {
        let Some(name) = payload.t else {
            return;
        };
        let Some(adapter) = self.adapter.upgrade() else {
            return;
        };

        if name == "READY" {
            match serde_json::from_value::<Ready>(payload.d) {
                Ok(ready) => {
                    info!(user = %ready.user.username, id = %ready.user.id, "Discord adapter ready");
                    adapter.set_bot_user(ready.user);
                }
                Err(e) => warn!(error = %e, "malformed READY payload"),
            }
            return;
        }

        if let Err(e) = adapter.handle_dispatch(&name, payload.d).await {
            warn!(event = %name, error = %e, "dropping gateway event");
        }
    }
}

#[async_trait]
impl WsHandler for GatewaySession {
    async fn on_open(&self, _sender: WsSender) {
        debug!("Discord gateway connected; waiting for hello");
    }

    async fn on_text(&self, text: &str, sender: &WsSender) {
        match serde_json::from_str::<GatewayPayload>(text) {
            Ok(payload) => self.handle_payload(payload, sender).await,
            Err(e) => warn!(error = %e, "unparseable gateway frame"),
        }
    }

    async fn on_close(&self, reason: Option<String>) {
        self.stop_heartbeat();
        match reason {
            Some(reason) => warn!(reason = %reason, "Discord gateway closed"),
            None => debug!("Discord gateway closed locally"),
        }
    }
}

impl Drop for GatewaySession {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_payload() {
        let session = GatewaySession::new(Weak::new(), "secret".into(), 513);
        let identify = session.identify_payload();

        assert_eq!(identify["op"], 2);
        assert_eq!(identify["d"]["token"], "secret");
        assert_eq!(identify["d"]["intents"], 513);
        assert_eq!(identify["d"]["properties"]["browser"], "parley");
    }

    #[test]
    fn test_heartbeat_carries_last_sequence() {
        assert_eq!(
            GatewaySession::heartbeat_payload(None),
            json!({"op": 1, "d": null})
        );
        assert_eq!(
            GatewaySession::heartbeat_payload(Some(42)),
            json!({"op": 1, "d": 42})
        );
    }
}
