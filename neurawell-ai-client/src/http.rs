//! JSON-over-HTTP half of the AI service client.

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::HttpConfig;
use crate::error::{ClientError, ClientResult};

const HTTP_REQUESTS_TOTAL: &str = "ai_client_http_requests_total";

/// Method, body and extra headers for a single call
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    /// Applied last, so these win over configured and default headers
    pub headers: HeaderMap,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn post() -> Self {
        Self {
            method: Method::POST,
            ..Self::get()
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Body of `POST /ai/chat`
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub text: &'a str,
    pub user_id: &'a str,
    pub context: Map<String, Value>,
}

/// Request/response client for the `/ai/*` endpoints
///
/// Every call is a single round trip: no retries and no caching. The only
/// bound on a hung request is the configured timeout.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    headers: HeaderMap,
}

impl HttpApi {
    pub fn new(config: &HttpConfig) -> ClientResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| ClientError::Config {
            message: format!("Failed to create HTTP client: {}", e),
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| ClientError::Config {
                message: format!("Invalid header name '{}': {}", name, e),
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| ClientError::Config {
                message: format!("Invalid value for header '{}': {}", name, e),
            })?;
            headers.insert(name, value);
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            headers,
        })
    }

    /// Issue one request against `endpoint` and parse the JSON body
    ///
    /// Header precedence, lowest to highest: `Content-Type: application/json`,
    /// configured headers, `options.headers`.
    pub async fn make_request(&self, endpoint: &str, options: RequestOptions) -> ClientResult<Value> {
        let url = format!("{}{}", self.base_url, endpoint);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.extend(self.headers.clone());
        headers.extend(options.headers);

        let mut request = self
            .client
            .request(options.method.clone(), &url)
            .headers(headers);
        if let Some(body) = &options.body {
            let bytes = serde_json::to_vec(body).map_err(|source| ClientError::Encode { source })?;
            request = request.body(bytes);
        }

        debug!(method = %options.method, url = %url, "AI service request");

        let result = self.execute(request, &url).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::counter!(
            HTTP_REQUESTS_TOTAL,
            "endpoint" => endpoint.to_string(),
            "outcome" => outcome
        )
        .increment(1);

        if let Err(e) = &result {
            error!(url = %url, error = %e, status = ?e.status(), "AI service request failed");
        }
        result
    }

    async fn execute(&self, request: reqwest::RequestBuilder, url: &str) -> ClientResult<Value> {
        let response = request.send().await.map_err(|source| ClientError::Request {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Transport {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.bytes().await.map_err(|source| ClientError::Request {
            url: url.to_string(),
            source,
        })?;

        serde_json::from_slice(&body).map_err(|source| ClientError::Decode { source })
    }

    /// `GET /ai/status`
    pub async fn get_status(&self) -> ClientResult<Value> {
        self.make_request("/ai/status", RequestOptions::get()).await
    }

    /// `POST /ai/chat`; a missing context is sent as `{}`
    pub async fn chat_with_ai(
        &self,
        message: &str,
        user_id: &str,
        context: Option<Map<String, Value>>,
    ) -> ClientResult<Value> {
        let request = ChatRequest {
            text: message,
            user_id,
            context: context.unwrap_or_default(),
        };
        let body = serde_json::to_value(&request).map_err(|source| ClientError::Encode { source })?;

        self.make_request("/ai/chat", RequestOptions::post().with_body(body))
            .await
    }

    /// `POST /ai/learn` with no body
    pub async fn trigger_learning(&self) -> ClientResult<Value> {
        self.make_request("/ai/learn", RequestOptions::post()).await
    }

    pub async fn get_insights(&self) -> ClientResult<Value> {
        self.make_request("/ai/insights", RequestOptions::get()).await
    }

    pub async fn get_thoughts(&self) -> ClientResult<Value> {
        self.make_request("/ai/thoughts", RequestOptions::get()).await
    }

    pub async fn process_assessment(&self, assessment: Value) -> ClientResult<Value> {
        self.make_request("/ai/assessment", RequestOptions::post().with_body(assessment))
            .await
    }

    pub async fn analyze_mood(&self, mood: Value) -> ClientResult<Value> {
        self.make_request("/ai/mood", RequestOptions::post().with_body(mood))
            .await
    }

    /// True iff `get_status` succeeds. Never returns an error.
    pub async fn is_service_available(&self) -> bool {
        self.get_status().await.is_ok()
    }

    /// Poll `get_status` up to `max_attempts` times, sleeping `delay` between
    /// attempts. Returns true on the first success.
    pub async fn wait_for_service(&self, max_attempts: u32, delay: Duration) -> bool {
        for attempt in 1..=max_attempts {
            match self.get_status().await {
                Ok(_) => return true,
                Err(e) => {
                    info!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "Waiting for AI service..."
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        false
    }
}
