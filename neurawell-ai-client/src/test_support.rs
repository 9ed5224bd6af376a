//! In-process mock of the AI service used by the unit tests.
//!
//! Serves the `/ai/*` JSON endpoints and the `/ws/{user_id}` push channel
//! on an ephemeral local port, recording everything the client sends.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::websocket::{ConnectionState, SessionHandler};

/// One HTTP request as the mock saw it
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("recorded body is JSON")
    }
}

pub(crate) struct MockState {
    requests: Mutex<Vec<RecordedRequest>>,
    /// Upcoming `/ai/status` calls that answer 503
    status_failures: AtomicU32,
    /// Frames pushed to every new WebSocket session before anything else
    ws_script: Mutex<Vec<String>>,
    ws_received: Mutex<Vec<String>>,
    ws_users: Mutex<Vec<String>>,
    ws_connects: AtomicUsize,
    ws_active: AtomicUsize,
    close_sessions: broadcast::Sender<()>,
}

impl MockState {
    fn new() -> Self {
        let (close_sessions, _) = broadcast::channel(4);
        Self {
            requests: Mutex::default(),
            status_failures: AtomicU32::new(0),
            ws_script: Mutex::default(),
            ws_received: Mutex::default(),
            ws_users: Mutex::default(),
            ws_connects: AtomicUsize::new(0),
            ws_active: AtomicUsize::new(0),
            close_sessions,
        }
    }
}

/// Running mock service; shuts down on drop
pub(crate) struct MockAiService {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl Drop for MockAiService {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl MockAiService {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::new());

        let app = Router::new()
            .route("/ws/{user_id}", get(ws_handler))
            .fallback(http_handler)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// Client configuration pointing both endpoints at this mock
    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::default();
        config.http.base_url = format!("http://{}", self.addr);
        config.websocket.base_url = format!("ws://{}", self.addr);
        config
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    pub fn fail_status(&self, times: u32) {
        self.state.status_failures.store(times, Ordering::SeqCst);
    }

    pub fn script_frames(&self, frames: &[&str]) {
        *self.state.ws_script.lock().unwrap() = frames.iter().map(|f| f.to_string()).collect();
    }

    pub fn ws_received(&self) -> Vec<String> {
        self.state.ws_received.lock().unwrap().clone()
    }

    pub fn ws_users(&self) -> Vec<String> {
        self.state.ws_users.lock().unwrap().clone()
    }

    pub fn ws_connects(&self) -> usize {
        self.state.ws_connects.load(Ordering::SeqCst)
    }

    pub fn ws_active(&self) -> usize {
        self.state.ws_active.load(Ordering::SeqCst)
    }

    /// Close every open session from the server side, once at least one is open
    pub async fn close_sessions(&self) {
        eventually(|| self.ws_active() > 0).await;
        let _ = self.state.close_sessions.send(());
    }
}

async fn http_handler(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        headers,
        body: body.clone(),
    });

    let parsed_body = || serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);

    match (method.as_str(), path.as_str()) {
        ("GET", "/ai/status") => {
            let failing = state
                .status_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                (StatusCode::SERVICE_UNAVAILABLE, "warming up").into_response()
            } else {
                axum::Json(json!({ "status": "active", "capabilities": ["chat", "mood"] }))
                    .into_response()
            }
        }
        ("POST", "/ai/chat") => {
            let request = parsed_body();
            axum::Json(json!({
                "response": format!("echo: {}", request["text"].as_str().unwrap_or_default()),
                "emotion": "neutral",
                "confidence": 0.5,
            }))
            .into_response()
        }
        ("POST", "/ai/learn") => {
            axum::Json(json!({ "status": "learning_started" })).into_response()
        }
        ("GET", "/ai/insights") => {
            axum::Json(json!({ "insights": [{ "pattern": "sleep" }] })).into_response()
        }
        ("GET", "/ai/thoughts") => {
            axum::Json(json!({ "thoughts": ["considering", "learning"] })).into_response()
        }
        ("POST", "/ai/assessment") => {
            axum::Json(json!({ "score": 7, "received": parsed_body() })).into_response()
        }
        ("POST", "/ai/mood") => {
            axum::Json(json!({ "trend": "improving", "received": parsed_body() })).into_response()
        }
        ("GET", "/ai/garbled") => (StatusCode::OK, "<html>not json</html>").into_response(),
        ("GET", "/ai/broken") => {
            (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<Arc<MockState>>,
) -> Response {
    state.ws_users.lock().unwrap().push(user_id);
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

async fn run_ws(mut socket: WebSocket, state: Arc<MockState>) {
    let mut close_rx = state.close_sessions.subscribe();
    state.ws_connects.fetch_add(1, Ordering::SeqCst);
    state.ws_active.fetch_add(1, Ordering::SeqCst);

    let script = state.ws_script.lock().unwrap().clone();
    for frame in script {
        if socket.send(Message::Text(frame.into())).await.is_err() {
            state.ws_active.fetch_sub(1, Ordering::SeqCst);
            return;
        }
    }

    loop {
        tokio::select! {
            _ = close_rx.recv() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            frame = socket.recv() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let text = text.as_str().to_string();
                    state.ws_received.lock().unwrap().push(text.clone());

                    // Behave like the real service: answer, then push thoughts on request
                    let request: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
                    let reply = json!({
                        "response": format!("echo: {}", request["text"].as_str().unwrap_or_default()),
                    });
                    if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
                        break;
                    }
                    if request["include_thoughts"] == true {
                        let thoughts = json!({ "type": "thoughts", "data": ["reflecting"] });
                        if socket.send(Message::Text(thoughts.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    }

    state.ws_active.fetch_sub(1, Ordering::SeqCst);
}

/// Session handler that forwards every callback into channels
pub(crate) struct RecordingHandler {
    messages: mpsc::UnboundedSender<Value>,
    thoughts: mpsc::UnboundedSender<Value>,
    errors: mpsc::UnboundedSender<String>,
    states: mpsc::UnboundedSender<ConnectionState>,
}

pub(crate) struct Recorded {
    pub messages: mpsc::UnboundedReceiver<Value>,
    pub thoughts: mpsc::UnboundedReceiver<Value>,
    pub errors: mpsc::UnboundedReceiver<String>,
    pub states: mpsc::UnboundedReceiver<ConnectionState>,
}

impl RecordingHandler {
    pub fn new() -> (Arc<Self>, Recorded) {
        let (messages_tx, messages) = mpsc::unbounded_channel();
        let (thoughts_tx, thoughts) = mpsc::unbounded_channel();
        let (errors_tx, errors) = mpsc::unbounded_channel();
        let (states_tx, states) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                messages: messages_tx,
                thoughts: thoughts_tx,
                errors: errors_tx,
                states: states_tx,
            }),
            Recorded {
                messages,
                thoughts,
                errors,
                states,
            },
        )
    }
}

impl SessionHandler for RecordingHandler {
    fn on_message(&self, message: Value) {
        if message["panic"] == true {
            panic!("handler exploded");
        }
        let _ = self.messages.send(message);
    }

    fn on_thoughts(&self, thoughts: Value) {
        let _ = self.thoughts.send(thoughts);
    }

    fn on_error(&self, error: &ClientError) {
        let _ = self.errors.send(error.kind().to_string());
    }

    fn on_state_change(&self, state: ConnectionState) {
        let _ = self.states.send(state);
    }
}

/// Receive one item or fail the test after a generous timeout
pub(crate) async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for callback")
        .expect("channel closed")
}

/// Poll `condition` until it holds or fail the test
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}
