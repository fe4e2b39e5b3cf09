//! Reconnecting WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{error, info, trace, warn};

use parley_core::{TransportError, TransportResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reconnection policy of a [`WsClient`] connection.
#[derive(Debug, Clone, PartialEq)]
pub struct WsConfig {
    /// Reconnect when the connection drops.
    pub auto_reconnect: bool,
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound of the backoff delay.
    pub max_delay: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
    /// Give up after this many consecutive failed attempts. `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            max_retries: None,
        }
    }
}

impl WsConfig {
    fn next_delay(&self, current: Duration) -> Duration {
        std::cmp::min(
            Duration::from_secs_f64(current.as_secs_f64() * self.backoff_multiplier),
            self.max_delay,
        )
    }
}

/// Callbacks of a websocket connection.
///
/// `on_open` and `on_close` are called once per underlying connection, so a
/// reconnect produces a `close`/`open` pair.
#[async_trait]
pub trait WsHandler: Send + Sync + 'static {
    /// A connection was (re)established.
    async fn on_open(&self, sender: WsSender);

    /// A text frame arrived.
    async fn on_text(&self, text: &str, sender: &WsSender);

    /// The connection went away. `reason` is `None` on a local close.
    async fn on_close(&self, reason: Option<String>);
}

/// Outbound side of a connection. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WsSender {
    tx: mpsc::Sender<Message>,
}

impl WsSender {
    /// Queues a text frame.
    pub async fn send_text(&self, text: impl Into<String>) -> TransportResult<()> {
        self.tx
            .send(Message::Text(text.into().into()))
            .await
            .map_err(|_| TransportError::ConnectionClosed {
                reason: "websocket loop has stopped".into(),
            })
    }

    /// Queues a JSON value as a text frame.
    pub async fn send_json(&self, value: &serde_json::Value) -> TransportResult<()> {
        self.send_text(value.to_string()).await
    }

    /// Closes the current connection. The client then reconnects if its
    /// config allows it.
    pub async fn reconnect(&self) -> TransportResult<()> {
        self.tx
            .send(Message::Close(None))
            .await
            .map_err(|_| TransportError::ConnectionClosed {
                reason: "websocket loop has stopped".into(),
            })
    }

    /// Returns `true` once the connection loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A running connection.
#[derive(Debug)]
pub struct WsConnection {
    sender: WsSender,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WsConnection {
    /// Returns the outbound side.
    pub fn sender(&self) -> WsSender {
        self.sender.clone()
    }

    /// Closes the connection and waits for the loop to finish.
    pub async fn close(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "WebSocket loop ended abnormally");
        }
    }
}

/// Factory for websocket connections.
pub struct WsClient;

impl WsClient {
    /// Connects to `url` and drives the connection in a background task.
    ///
    /// Only the first connection attempt is reported as an error; later
    /// drops are retried according to `config`.
    pub async fn connect(
        url: &str,
        handler: Arc<dyn WsHandler>,
        config: WsConfig,
    ) -> TransportResult<WsConnection> {
        let url = url.to_string();

        info!(url = %url, "Connecting to WebSocket server");

        let (stream, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::ConnectionFailed {
                    url: url.clone(),
                    reason: format!("WebSocket connection failed: {e}"),
                })?;

        info!(url = %url, "WebSocket client connected");

        let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sender = WsSender { tx: outbound_tx };

        let task = tokio::spawn(run_client_loop(
            stream,
            outbound_rx,
            shutdown_rx,
            handler,
            sender.clone(),
            url,
            config,
        ));

        Ok(WsConnection {
            sender,
            shutdown_tx,
            task,
        })
    }
}

/// How one connection ended.
enum SessionEnd {
    Shutdown,
    Lost(String),
}

async fn run_client_loop(
    stream: WsStream,
    mut outbound_rx: mpsc::Receiver<Message>,
    mut shutdown_rx: watch::Receiver<bool>,
    handler: Arc<dyn WsHandler>,
    sender: WsSender,
    url: String,
    config: WsConfig,
) {
    let mut next = Some(stream);

    'connection: loop {
        let Some(stream) = next.take() else {
            break;
        };

        handler.on_open(sender.clone()).await;
        let end = run_session(stream, &mut outbound_rx, &mut shutdown_rx, &handler, &sender).await;

        match end {
            SessionEnd::Shutdown => {
                info!(url = %url, "WebSocket client shutting down");
                handler.on_close(None).await;
                break;
            }
            SessionEnd::Lost(reason) => {
                info!(url = %url, reason = %reason, "WebSocket connection lost");
                handler.on_close(Some(reason)).await;
                if !config.auto_reconnect {
                    break;
                }
            }
        }

        let mut attempts = 0u32;
        let mut delay = config.initial_delay;
        loop {
            if let Some(max) = config.max_retries
                && attempts >= max
            {
                error!(url = %url, attempts, "Max retries reached, giving up");
                break 'connection;
            }

            warn!(url = %url, delay = ?delay, "Reconnecting...");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => {
                    info!(url = %url, "WebSocket client shut down while reconnecting");
                    break 'connection;
                }
            }

            match connect_async(url.as_str()).await {
                Ok((stream, _)) => {
                    info!(url = %url, "Reconnected successfully");
                    next = Some(stream);
                    break;
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Reconnection failed");
                    attempts += 1;
                    delay = config.next_delay(delay);
                }
            }
        }
    }
}

async fn run_session(
    stream: WsStream,
    outbound_rx: &mut mpsc::Receiver<Message>,
    shutdown_rx: &mut watch::Receiver<bool>,
    handler: &Arc<dyn WsHandler>,
    sender: &WsSender,
) -> SessionEnd {
    let (mut ws_tx, mut ws_rx) = stream.split();

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    let _ = ws_tx.close().await;
                    return SessionEnd::Shutdown;
                }
            }

            Some(msg) = outbound_rx.recv() => {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = ws_tx.send(msg).await {
                    return SessionEnd::Lost(format!("send failed: {e}"));
                }
                if closing {
                    return SessionEnd::Lost("reconnect requested".to_string());
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        trace!(len = text.len(), "Received text");
                        handler.on_text(text.as_str(), sender).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        trace!(len = data.len(), "Received binary");
                        match std::str::from_utf8(&data) {
                            Ok(text) => handler.on_text(text, sender).await,
                            Err(_) => warn!("Dropped non UTF-8 binary frame"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        trace!("Received ping, sending pong");
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("{} {}", u16::from(f.code), f.reason.as_str()))
                            .unwrap_or_else(|| "closed by server".to_string());
                        return SessionEnd::Lost(reason);
                    }
                    Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                    None => return SessionEnd::Lost("stream ended".to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Recorder {
        opens: AtomicUsize,
        closes: AtomicUsize,
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WsHandler for Recorder {
        async fn on_open(&self, sender: WsSender) {
            self.opens.fetch_add(1, Ordering::SeqCst);
            sender.send_text("hello").await.unwrap();
        }

        async fn on_text(&self, text: &str, _sender: &WsSender) {
            self.texts.lock().push(text.to_string());
        }

        async fn on_close(&self, _reason: Option<String>) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Accepts one connection and echoes text frames back.
    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() && ws.send(msg).await.is_err() {
                    break;
                }
            }
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn test_reconnect_opens_a_new_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                        return;
                    };
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });

        let recorder = Arc::new(Recorder::default());
        let config = WsConfig {
            initial_delay: Duration::from_millis(10),
            ..Default::default()
        };
        let connection = WsClient::connect(&format!("ws://{addr}"), recorder.clone(), config)
            .await
            .unwrap();
        connection.sender().reconnect().await.unwrap();

        for _ in 0..200 {
            if recorder.opens.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(recorder.opens.load(Ordering::SeqCst), 2);
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);

        connection.close().await;
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = WsConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 3.0,
            ..Default::default()
        };
        let second = config.next_delay(config.initial_delay);
        assert_eq!(second, Duration::from_secs(3));
        assert_eq!(config.next_delay(second), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_connect_refused_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = WsClient::connect(
            &format!("ws://{addr}"),
            Arc::new(Recorder::default()),
            WsConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed { .. }));
    }

    #[tokio::test]
    async fn test_echo_roundtrip_and_close() {
        let url = echo_server().await;
        let recorder = Arc::new(Recorder::default());

        let connection = WsClient::connect(&url, recorder.clone(), WsConfig::default())
            .await
            .unwrap();
        connection.sender().send_text("second").await.unwrap();

        for _ in 0..100 {
            if recorder.texts.lock().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let mut texts = recorder.texts.lock().clone();
        texts.sort();
        assert_eq!(texts, ["hello", "second"]);

        let sender = connection.sender();
        connection.close().await;
        assert_eq!(recorder.opens.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
        assert!(sender.is_closed());
    }
}
