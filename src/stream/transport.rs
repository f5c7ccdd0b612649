use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use crate::constants::{HTTP_CONNECT_TIMEOUT_SECS, HTTP_REQUEST_TIMEOUT_SECS};
use crate::utils::{ChatError, ChatResult};

/// Response body as it arrives from the network
pub type ByteStream = Pin<Box<dyn Stream<Item = ChatResult<Bytes>> + Send>>;

/// A provider call, fully shaped and ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
    /// URL safe to write to logs (credentials removed)
    pub redacted_url: String,
}

/// Sends provider requests and hands back the streaming body
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST the request. Resolves to the body stream only for a success
    /// status; connection failures and error statuses become `Transport` errors.
    async fn post(&self, request: HttpRequest) -> ChatResult<ByteStream>;
}

/// `reqwest`-backed transport used outside of tests
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> ChatResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ChatError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: HttpRequest) -> ChatResult<ByteStream> {
        debug!("POST {}", request.redacted_url);

        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("Provider returned {}: {}", status, body);
            return Err(ChatError::Transport(error_message(status, &body)));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ChatError::from))
            .boxed())
    }
}

/// Human-readable message for a failed provider call.
///
/// Prefers the provider's own `error.message` (with `error.status` when
/// present), then the raw body, then the HTTP status line.
pub fn error_message(status: StatusCode, body: &str) -> String {
    let fallback = || {
        format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown status")
        )
    };

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(json) => {
            let message = json
                .pointer("/error/message")
                .or_else(|| json.get("message"))
                .and_then(|m| m.as_str());
            match message {
                Some(message) => match json.pointer("/error/status").and_then(|s| s.as_str()) {
                    Some(code) => format!("{} (Status: {})", message, code),
                    None => message.to_string(),
                },
                None => fallback(),
            }
        }
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => fallback(),
    }
}
