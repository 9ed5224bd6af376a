//! WebSocket push channel to the AI service
//!
//! One session per client: frames from the server are routed to a
//! [`SessionHandler`], chat turns go out through [`Session::send`].
//! Failures on this path are reported through the handler and the log,
//! never returned, since nothing is waiting on them when they happen.

use serde_json::Value;

use crate::error::ClientError;

pub mod messages;
pub mod reconnect;
pub mod session;

pub use messages::{InboundFrame, OutboundMessage, THOUGHTS_TYPE};
pub use reconnect::Backoff;
pub use session::Session;

pub(crate) const WS_FRAMES_TOTAL: &str = "ai_client_ws_frames_total";
pub(crate) const WS_DECODE_FAILURES_TOTAL: &str = "ai_client_ws_decode_failures_total";
pub(crate) const WS_RECONNECTS_TOTAL: &str = "ai_client_ws_reconnects_total";

/// Observable session state
///
/// `Connecting` and `Reconnecting` both mean "no usable socket yet";
/// only `Connected` accepts sends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Receives everything a session produces
///
/// Callbacks run on the session task; a slow callback delays later frames.
/// A panicking callback loses only the frame it was handling.
pub trait SessionHandler: Send + Sync + 'static {
    /// Any inbound frame that is not a thoughts envelope, passed whole
    fn on_message(&self, message: Value);

    /// The `data` field of a `{"type":"thoughts"}` envelope
    fn on_thoughts(&self, thoughts: Value);

    /// Undecodable frames, failed connects and dropped connections
    fn on_error(&self, _error: &ClientError) {}

    fn on_state_change(&self, _state: ConnectionState) {}
}

/// Adapts a pair of closures into a [`SessionHandler`]
pub struct CallbackHandler<M, T> {
    on_message: M,
    on_thoughts: T,
}

impl<M, T> CallbackHandler<M, T>
where
    M: Fn(Value) + Send + Sync + 'static,
    T: Fn(Value) + Send + Sync + 'static,
{
    pub fn new(on_message: M, on_thoughts: T) -> Self {
        Self {
            on_message,
            on_thoughts,
        }
    }
}

impl<M, T> SessionHandler for CallbackHandler<M, T>
where
    M: Fn(Value) + Send + Sync + 'static,
    T: Fn(Value) + Send + Sync + 'static,
{
    fn on_message(&self, message: Value) {
        (self.on_message)(message)
    }

    fn on_thoughts(&self, thoughts: Value) {
        (self.on_thoughts)(thoughts)
    }
}

/// `<base>/ws/<user_id>`, with the user id percent-encoded as a path segment
pub fn session_url(base_url: &str, user_id: &str) -> String {
    format!(
        "{}/ws/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(user_id)
    )
}
