use thiserror::Error;

/// Errors surfaced by the AI service client
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server answered with a non-success status
    #[error("AI service returned status {status}: {message}")]
    Transport { status: u16, message: String },

    /// The request never produced a response (connection refused, timeout, ...)
    #[error("Request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A response body or inbound frame was not valid JSON
    #[error("Invalid JSON from AI service")]
    Decode {
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode outbound message")]
    Encode {
        #[source]
        source: serde_json::Error,
    },

    #[error("WebSocket not connected")]
    NotConnected,

    #[error("WebSocket connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ClientError {
    /// HTTP status carried by a transport failure
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Transport { status, .. } => Some(*status),
            ClientError::Request { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Transport { .. } | ClientError::Request { .. }
        )
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, ClientError::Decode { .. })
    }

    pub fn is_not_connected(&self) -> bool {
        matches!(self, ClientError::NotConnected)
    }

    /// Short machine-readable kind, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Transport { .. } => "transport",
            ClientError::Request { .. } => "request",
            ClientError::Decode { .. } => "decode",
            ClientError::Encode { .. } => "encode",
            ClientError::NotConnected => "not_connected",
            ClientError::Connect { .. } => "connect",
            ClientError::Config { .. } => "config",
        }
    }
}

impl From<config::ConfigError> for ClientError {
    fn from(e: config::ConfigError) -> Self {
        ClientError::Config {
            message: e.to_string(),
        }
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
