//! Webhook endpoint for platforms that push events over HTTP.
//!
//! The endpoint answers the subscription handshake on `GET` (the platform
//! sends `hub.mode=subscribe`, `hub.verify_token` and `hub.challenge`, and
//! expects the challenge echoed back) and forwards every `POST` body to a
//! [`WebhookHandler`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use parley_core::TransportResult;

/// Receiver of webhook traffic.
#[async_trait]
pub trait WebhookHandler: Send + Sync + 'static {
    /// Token the platform must present during the handshake.
    fn verify_token(&self) -> &str;

    /// Handles one pushed payload. An error answers `400`.
    async fn on_payload(&self, body: &[u8]) -> TransportResult<()>;
}

/// Running webhook endpoint.
///
/// Dropping the listener without calling [`shutdown`](Self::shutdown)
/// also stops the server.
#[derive(Debug)]
pub struct WebhookListener {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl WebhookListener {
    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting requests.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Factory for webhook endpoints.
pub struct WebhookServer;

impl WebhookServer {
    /// Binds `addr` and serves `path` until the returned listener shuts down.
    pub async fn serve(
        addr: &str,
        path: &str,
        handler: Arc<dyn WebhookHandler>,
    ) -> TransportResult<WebhookListener> {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        let router = Router::new()
            .route(&path, get(verify).post(receive))
            .with_state(handler);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, path = %path, "Webhook server listening");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                error!(error = %e, "Webhook server error");
            }
            info!(addr = %local_addr, "Webhook server stopped");
        });

        Ok(WebhookListener {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }
}

/// Checks a handshake and returns the challenge to echo.
fn check_handshake(params: &HashMap<String, String>, expected: &str) -> Option<String> {
    let mode = params.get("hub.mode")?;
    let token = params.get("hub.verify_token")?;
    let challenge = params.get("hub.challenge")?;
    (mode == "subscribe" && token == expected).then(|| challenge.clone())
}

async fn verify(
    State(handler): State<Arc<dyn WebhookHandler>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    match check_handshake(&params, handler.verify_token()) {
        Some(challenge) => {
            info!("Webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        None => {
            warn!("Webhook verification rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

async fn receive(State(handler): State<Arc<dyn WebhookHandler>>, body: Bytes) -> StatusCode {
    debug!(len = body.len(), "Received webhook POST");
    match handler.on_payload(&body).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Webhook payload rejected");
            StatusCode::BAD_REQUEST
        }
    }
}
