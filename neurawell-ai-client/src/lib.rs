//! Client for the NeuraWell AI service
//!
//! Request/response calls go over HTTP with JSON bodies ([`http::HttpApi`]);
//! live chat runs over a WebSocket session that pushes responses and, on
//! request, the model's intermediate thoughts ([`websocket::Session`]).
//! [`AiServiceClient`] bundles both behind one handle.
//!
//! ```no_run
//! use neurawell_ai_client::{AiServiceClient, ClientConfig};
//!
//! # async fn run() -> neurawell_ai_client::ClientResult<()> {
//! let client = AiServiceClient::new(&ClientConfig::load()?)?;
//! if client.wait_for_service_default().await {
//!     let reply = client.chat_with_ai("I slept badly", "user-1", None).await?;
//!     println!("{reply}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod websocket;

#[cfg(test)]
mod test_support;

pub use client::AiServiceClient;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use http::{ChatRequest, HttpApi, RequestOptions};
pub use websocket::{CallbackHandler, ConnectionState, InboundFrame, OutboundMessage, SessionHandler};
