//! A single WebSocket session and the task that drives it.

use futures::{SinkExt, StreamExt};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::reconnect::Backoff;
use super::{
    ConnectionState, InboundFrame, OutboundMessage, SessionHandler, WS_DECODE_FAILURES_TOTAL,
    WS_FRAMES_TOTAL, WS_RECONNECTS_TOTAL,
};
use crate::config::ReconnectConfig;
use crate::error::{ClientError, ClientResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handle to a running session
///
/// Opening is fire-and-forget: the socket is established in the background
/// and the state moves to `Connected` once the handshake completes.
/// Dropping the handle closes the session.
pub struct Session {
    outbound: mpsc::UnboundedSender<String>,
    shared: Arc<SessionShared>,
}

/// State shared between the handle and the session task
struct SessionShared {
    session_id: String,
    url: String,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    decode_failures: AtomicU64,
    handler: Arc<dyn SessionHandler>,
}

enum SessionEnd {
    /// Explicit disconnect
    Cancelled,
    /// Peer closed the socket
    Closed,
    Failed(tungstenite::Error),
}

impl Session {
    /// Start connecting to `url`. Must be called from within a Tokio runtime.
    pub fn open(url: String, handler: Arc<dyn SessionHandler>, reconnect: ReconnectConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(SessionShared {
            session_id: uuid::Uuid::new_v4().to_string(),
            url,
            state,
            cancel: CancellationToken::new(),
            decode_failures: AtomicU64::new(0),
            handler,
        });

        info!(
            session_id = %shared.session_id,
            url = %shared.url,
            reconnect = reconnect.enabled(),
            "Opening AI WebSocket"
        );
        shared.notify_state(ConnectionState::Connecting);

        let task = SessionTask {
            shared: shared.clone(),
            outbound: outbound_rx,
            backoff: Backoff::new(reconnect),
        };
        tokio::spawn(task.run());

        Self {
            outbound: outbound_tx,
            shared,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Inbound frames that failed to parse as JSON
    pub fn decode_failures(&self) -> u64 {
        self.shared.decode_failures.load(Ordering::Relaxed)
    }

    /// Queue a chat turn. Rejected unless the session is connected; nothing
    /// is buffered for later delivery.
    pub fn send(&self, message: &OutboundMessage) -> ClientResult<()> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let json = serde_json::to_string(message).map_err(|source| ClientError::Encode { source })?;
        self.outbound
            .send(json)
            .map_err(|_| ClientError::NotConnected)
    }

    /// Close the session and mark it disconnected. Idempotent.
    pub fn close(&self) {
        if self.shared.cancel.is_cancelled() {
            return;
        }
        self.shared.cancel.cancel();
        let previous = self.shared.state.send_replace(ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            self.shared.notify_state(ConnectionState::Disconnected);
        }
        info!(session_id = %self.shared.session_id, "Disconnected from AI WebSocket");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

impl SessionShared {
    /// Move to `next` unless the session was closed explicitly
    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if self.cancel.is_cancelled() || *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!(session_id = %self.session_id, state = ?next, "WebSocket state changed");
            self.notify_state(next);
        }
    }

    fn notify_state(&self, state: ConnectionState) {
        self.guarded("on_state_change", || self.handler.on_state_change(state));
    }

    fn report(&self, error: &ClientError) {
        self.guarded("on_error", || self.handler.on_error(error));
    }

    /// Route one inbound frame. Frames arriving after `close()` are dropped.
    fn dispatch(&self, frame: Result<InboundFrame, serde_json::Error>) {
        if self.cancel.is_cancelled() {
            debug!(session_id = %self.session_id, "Dropping frame for closed session");
            return;
        }
        match frame {
            Ok(frame) => {
                let kind = frame.kind();
                metrics::counter!(WS_FRAMES_TOTAL, "kind" => kind).increment(1);
                debug!(session_id = %self.session_id, kind, "WebSocket frame received");
                self.guarded(kind, || match frame {
                    InboundFrame::Thoughts(data) => self.handler.on_thoughts(data),
                    InboundFrame::Message(message) => self.handler.on_message(message),
                });
            }
            Err(source) => {
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(WS_DECODE_FAILURES_TOTAL).increment(1);
                warn!(
                    session_id = %self.session_id,
                    error = %source,
                    "Error parsing WebSocket message"
                );
                self.report(&ClientError::Decode { source });
            }
        }
    }

    /// Run a handler callback, containing any panic to this one call
    fn guarded(&self, callback: &str, f: impl FnOnce()) {
        if catch_unwind(AssertUnwindSafe(f)).is_err() {
            error!(
                session_id = %self.session_id,
                callback,
                "Session handler panicked; frame dropped"
            );
        }
    }
}

struct SessionTask {
    shared: Arc<SessionShared>,
    outbound: mpsc::UnboundedReceiver<String>,
    backoff: Backoff,
}

impl SessionTask {
    async fn run(mut self) {
        loop {
            let connected = tokio::select! {
                _ = self.shared.cancel.cancelled() => return,
                result = connect_async(self.shared.url.as_str()) => result,
            };

            match connected {
                Ok((stream, _response)) => {
                    self.backoff.reset();
                    self.shared.set_state(ConnectionState::Connected);
                    info!(
                        session_id = %self.shared.session_id,
                        url = %self.shared.url,
                        "Connected to AI WebSocket"
                    );

                    match self.pump(stream).await {
                        SessionEnd::Cancelled => return,
                        SessionEnd::Closed => {
                            info!(session_id = %self.shared.session_id, "AI WebSocket closed by server");
                        }
                        SessionEnd::Failed(e) => {
                            error!(session_id = %self.shared.session_id, error = %e, "WebSocket error");
                            self.shared.report(&ClientError::Connect {
                                url: self.shared.url.clone(),
                                message: format!("connection lost: {}", e),
                            });
                        }
                    }
                }
                Err(e) => {
                    let err = ClientError::Connect {
                        url: self.shared.url.clone(),
                        message: e.to_string(),
                    };
                    error!(session_id = %self.shared.session_id, error = %err, "Failed to connect WebSocket");
                    self.shared.report(&err);
                }
            }

            self.discard_unsent();

            let Some(delay) = self.backoff.next_delay() else {
                self.shared.set_state(ConnectionState::Disconnected);
                return;
            };

            self.shared.set_state(ConnectionState::Reconnecting);
            metrics::counter!(WS_RECONNECTS_TOTAL).increment(1);
            info!(
                session_id = %self.shared.session_id,
                attempt = self.backoff.attempts(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to AI WebSocket"
            );

            tokio::select! {
                _ = self.shared.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn pump(&mut self, stream: WsStream) -> SessionEnd {
        let (mut sink, mut source) = stream.split();

        loop {
            tokio::select! {
                biased;

                _ = self.shared.cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Cancelled;
                }
                Some(text) = self.outbound.recv() => {
                    debug!(session_id = %self.shared.session_id, bytes = text.len(), "Sending WebSocket message");
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        return SessionEnd::Failed(e);
                    }
                }
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.shared.dispatch(InboundFrame::parse(&text)),
                    Some(Ok(Message::Binary(data))) => {
                        self.shared.dispatch(InboundFrame::parse_bytes(&data))
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(session_id = %self.shared.session_id, frame = ?frame, "Close frame received");
                        return SessionEnd::Closed;
                    }
                    // Ping/pong are answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Failed(e),
                    None => return SessionEnd::Closed,
                }
            }
        }
    }

    /// Turns queued for a socket that is gone are dropped, not replayed
    fn discard_unsent(&mut self) {
        let mut dropped = 0usize;
        while self.outbound.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!(session_id = %self.shared.session_id, dropped, "Discarded unsent WebSocket messages");
        }
    }
}
