use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};

/// Client configuration, loaded once at startup and handed to the client
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default = "default_http")]
    pub http: HttpConfig,

    #[serde(default = "default_websocket")]
    pub websocket: WebSocketConfig,

    #[serde(default = "default_availability")]
    pub availability: AvailabilityConfig,

    #[serde(default = "default_metrics")]
    pub metrics: MetricsConfig,

    /// User the binary opens its session for
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

/// HTTP endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_url")]
    pub base_url: String,

    /// 0 disables the timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Extra headers sent on every request. Caller-supplied headers override these.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// WebSocket session configuration
///
/// The session endpoint is configured separately from the HTTP base URL;
/// nothing derives one from the other.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebSocketConfig {
    #[serde(default = "default_ws_url")]
    pub base_url: String,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// Reconnect policy for dropped sessions
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconnectConfig {
    /// Consecutive failed attempts before giving up (0 = never reconnect)
    #[serde(default)]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Fraction of each delay randomized in both directions (0.0-1.0)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl ReconnectConfig {
    pub fn enabled(&self) -> bool {
        self.max_attempts > 0
    }
}

/// Defaults for `wait_for_service`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AvailabilityConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl AvailabilityConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Prometheus exporter settings (binary only)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http: default_http(),
            websocket: default_websocket(),
            availability: default_availability(),
            metrics: default_metrics(),
            user_id: default_user_id(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from `config.*` in the working directory and
    /// `NEURAWELL_*` environment variables
    pub fn load() -> ClientResult<Self> {
        Self::load_from(
            Config::builder()
                .add_source(File::with_name("config").required(false))
                .add_source(
                    Environment::with_prefix("NEURAWELL")
                        .separator("__")
                        .try_parsing(true),
                ),
        )
    }

    /// Build and validate configuration from an arbitrary set of sources
    pub fn load_from(builder: ConfigBuilder<DefaultState>) -> ClientResult<Self> {
        let mut config: ClientConfig = builder.build()?.try_deserialize()?;

        config.http.base_url = config.http.base_url.trim_end_matches('/').to_string();
        config.websocket.base_url = config.websocket.base_url.trim_end_matches('/').to_string();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if !has_scheme(&self.http.base_url, &["http://", "https://"]) {
            return Err(ClientError::Config {
                message: format!(
                    "http.base_url must start with http:// or https:// (got '{}')",
                    self.http.base_url
                ),
            });
        }

        if !has_scheme(&self.websocket.base_url, &["ws://", "wss://"]) {
            return Err(ClientError::Config {
                message: format!(
                    "websocket.base_url must start with ws:// or wss:// (got '{}')",
                    self.websocket.base_url
                ),
            });
        }

        let jitter = self.websocket.reconnect.jitter;
        if !(0.0..=1.0).contains(&jitter) {
            return Err(ClientError::Config {
                message: format!("websocket.reconnect.jitter must be within 0.0..=1.0 (got {jitter})"),
            });
        }

        let http_host = host_of(&self.http.base_url);
        let ws_host = host_of(&self.websocket.base_url);
        if http_host != ws_host {
            tracing::warn!(
                http = %self.http.base_url,
                websocket = %self.websocket.base_url,
                "HTTP and WebSocket endpoints point at different hosts"
            );
        }

        Ok(())
    }
}

fn has_scheme(url: &str, schemes: &[&str]) -> bool {
    schemes
        .iter()
        .any(|scheme| url.len() > scheme.len() && url.starts_with(scheme))
}

fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    rest.split('/').next().unwrap_or(rest)
}

// ==================== Defaults ====================

fn default_http() -> HttpConfig {
    HttpConfig {
        base_url: default_http_url(),
        request_timeout_secs: default_request_timeout_secs(),
        headers: HashMap::new(),
    }
}

fn default_http_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_websocket() -> WebSocketConfig {
    WebSocketConfig {
        base_url: default_ws_url(),
        reconnect: ReconnectConfig::default(),
    }
}

fn default_ws_url() -> String {
    "ws://localhost:8000".to_string()
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> f64 {
    0.2
}

fn default_availability() -> AvailabilityConfig {
    AvailabilityConfig {
        max_attempts: default_max_attempts(),
        delay_ms: default_delay_ms(),
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_delay_ms() -> u64 {
    2000
}

fn default_metrics() -> MetricsConfig {
    MetricsConfig {
        enabled: false,
        listen: default_metrics_listen(),
    }
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9464))
}

fn default_user_id() -> String {
    "anonymous".to_string()
}
