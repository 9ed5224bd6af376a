//! The AI service client: HTTP calls plus at most one push session.

use arc_swap::ArcSwapOption;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::{AvailabilityConfig, ClientConfig, WebSocketConfig};
use crate::error::{ClientError, ClientResult};
use crate::http::{HttpApi, RequestOptions};
use crate::websocket::{
    CallbackHandler, ConnectionState, OutboundMessage, Session, SessionHandler, session_url,
};

/// Client for one AI service instance
///
/// Constructed explicitly and shared by whoever needs it (wrap in `Arc` to
/// share across tasks). Holds the HTTP client and the active session, if any.
pub struct AiServiceClient {
    http: HttpApi,
    websocket: WebSocketConfig,
    availability: AvailabilityConfig,
    session: ArcSwapOption<Session>,
}

impl AiServiceClient {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        Ok(Self {
            http: HttpApi::new(&config.http)?,
            websocket: config.websocket.clone(),
            availability: config.availability.clone(),
            session: ArcSwapOption::empty(),
        })
    }

    // ==================== HTTP ====================

    pub async fn make_request(&self, endpoint: &str, options: RequestOptions) -> ClientResult<Value> {
        self.http.make_request(endpoint, options).await
    }

    pub async fn get_status(&self) -> ClientResult<Value> {
        self.http.get_status().await
    }

    pub async fn chat_with_ai(
        &self,
        message: &str,
        user_id: &str,
        context: Option<Map<String, Value>>,
    ) -> ClientResult<Value> {
        self.http.chat_with_ai(message, user_id, context).await
    }

    pub async fn trigger_learning(&self) -> ClientResult<Value> {
        self.http.trigger_learning().await
    }

    pub async fn get_insights(&self) -> ClientResult<Value> {
        self.http.get_insights().await
    }

    pub async fn get_thoughts(&self) -> ClientResult<Value> {
        self.http.get_thoughts().await
    }

    pub async fn process_assessment(&self, assessment: Value) -> ClientResult<Value> {
        self.http.process_assessment(assessment).await
    }

    pub async fn analyze_mood(&self, mood: Value) -> ClientResult<Value> {
        self.http.analyze_mood(mood).await
    }

    pub async fn is_service_available(&self) -> bool {
        self.http.is_service_available().await
    }

    pub async fn wait_for_service(&self, max_attempts: u32, delay: Duration) -> bool {
        self.http.wait_for_service(max_attempts, delay).await
    }

    /// `wait_for_service` with the configured attempts and delay
    pub async fn wait_for_service_default(&self) -> bool {
        self.wait_for_service(self.availability.max_attempts, self.availability.delay())
            .await
    }

    // ==================== WebSocket ====================

    /// Open a session for `user_id`, closing any existing one first
    ///
    /// Returns immediately; the socket connects in the background. Must be
    /// called from within a Tokio runtime.
    pub fn connect_websocket<M, T>(&self, user_id: &str, on_message: M, on_thoughts: T)
    where
        M: Fn(Value) + Send + Sync + 'static,
        T: Fn(Value) + Send + Sync + 'static,
    {
        self.connect_websocket_with(
            user_id,
            Arc::new(CallbackHandler::new(on_message, on_thoughts)),
        );
    }

    pub fn connect_websocket_with(&self, user_id: &str, handler: Arc<dyn SessionHandler>) {
        if let Some(previous) = self.session.swap(None) {
            debug!(session_id = %previous.session_id(), "Closing previous AI WebSocket");
            previous.close();
        }

        let url = session_url(&self.websocket.base_url, user_id);
        let session = Session::open(url, handler, self.websocket.reconnect.clone());
        self.session.store(Some(Arc::new(session)));
    }

    /// Send a chat turn over the active session
    ///
    /// Fails with `NotConnected` when there is no session or it is not
    /// connected yet; the message is not queued.
    pub fn send_websocket_message(&self, message: &str, include_thoughts: bool) -> ClientResult<()> {
        let guard = self.session.load();
        let Some(session) = guard.as_ref() else {
            warn!("WebSocket not connected");
            return Err(ClientError::NotConnected);
        };

        session
            .send(&OutboundMessage::new(message, include_thoughts))
            .inspect_err(|e| warn!(error = %e, "WebSocket message not sent"))
    }

    /// Close the active session, if any. Safe to call repeatedly.
    pub fn disconnect_websocket(&self) {
        if let Some(session) = self.session.swap(None) {
            session.close();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session
            .load()
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// State updates for the current session, if one exists
    pub fn subscribe_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.session.load().as_ref().map(|s| s.subscribe())
    }

    /// Undecodable frames seen by the current session
    pub fn decode_failures(&self) -> u64 {
        self.session
            .load()
            .as_ref()
            .map(|s| s.decode_failures())
            .unwrap_or(0)
    }
}

impl Drop for AiServiceClient {
    fn drop(&mut self) {
        self.disconnect_websocket();
    }
}
