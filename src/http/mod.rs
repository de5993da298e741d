use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Serialize;

use crate::error::RelayError;

/// Enumerates HTTP methods the gateway is called with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Minimal HTTP request representation shared by the token broker, the catalog and chat.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Builds a bodiless GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Builds a POST request with a JSON request body.
    ///
    /// # Examples
    ///
    /// ```
    /// use copilot_relay::http::{HttpMethod, HttpRequest};
    ///
    /// let request = HttpRequest::post_json("https://example.com", br"{}".to_vec());
    /// assert_eq!(request.method, HttpMethod::Post);
    /// assert_eq!(request.headers.get("Content-Type"), Some(&"application/json".to_string()));
    /// ```
    pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: HashMap::from([("Content-Type".to_string(), "application/json".to_string())]),
            body: Some(body),
            timeout: None,
        }
    }

    /// Overrides the request headers after construction.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Minimal HTTP response representation.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body, replacing invalid UTF-8.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP response that carries a streaming body.
pub struct HttpStreamResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: HttpBodyStream,
}

impl HttpStreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Alias for the body stream returned by [`HttpTransport::send_stream`].
pub type HttpBodyStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, RelayError>> + Send>>;

/// Transport abstraction that keeps the relay independent of the concrete HTTP client.
///
/// Tests script gateway responses by implementing this trait in memory.
///
/// # Examples
///
/// ```
/// # use async_trait::async_trait;
/// # use copilot_relay::http::{HttpTransport, HttpRequest, HttpResponse, HttpStreamResponse};
/// # use copilot_relay::error::RelayError;
/// # use futures_util::stream;
/// struct MemoryTransport;
///
/// #[async_trait]
/// impl HttpTransport for MemoryTransport {
///     async fn send(&self, request: HttpRequest) -> Result<HttpResponse, RelayError> {
///         Ok(HttpResponse { status: 200, headers: request.headers, body: b"ok".to_vec() })
///     }
///     async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, RelayError> {
///         Ok(HttpStreamResponse { status: 200, headers: request.headers, body: Box::pin(stream::empty()) })
///     }
/// }
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let response = MemoryTransport
///     .send(HttpRequest::get("https://example.com"))
///     .await
///     .unwrap();
/// assert_eq!(response.status, 200);
/// # });
/// ```
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and resolves when the full response is available.
    ///
    /// # Errors
    ///
    /// Implementations map connection failures to [`RelayError::Transport`].
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, RelayError>;

    /// Sends a request and returns as soon as the response headers arrive.
    ///
    /// # Errors
    ///
    /// Implementations map connection failures to [`RelayError::Transport`].
    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, RelayError>;
}

/// Thread-safe handle to a transport implementation.
pub type DynHttpTransport = Arc<dyn HttpTransport>;

/// Caller headers are merged over the JSON `Content-Type`.
fn json_request<T: Serialize>(
    url: impl Into<String>,
    headers: HashMap<String, String>,
    body: &T,
    timeout: Option<Duration>,
) -> Result<HttpRequest, RelayError> {
    let payload = serde_json::to_vec(body)
        .map_err(|err| RelayError::validation(format!("failed to serialize request: {err}")))?;
    let mut request = HttpRequest::post_json(url, payload);
    request.headers.extend(headers);
    request.timeout = timeout;
    Ok(request)
}

/// Serializes a body to JSON, attaches headers, and issues a POST request.
///
/// # Errors
///
/// Returns [`RelayError::Validation`] if serialization fails or forwards the error raised by
/// [`HttpTransport::send`].
pub async fn post_json_with_headers<T: Serialize>(
    transport: &dyn HttpTransport,
    url: impl Into<String>,
    headers: HashMap<String, String>,
    body: &T,
    timeout: Option<Duration>,
) -> Result<HttpResponse, RelayError> {
    let request = json_request(url, headers, body, timeout)?;
    transport.send(request).await
}

/// Issues a JSON POST request and returns the streaming response.
///
/// # Errors
///
/// Returns [`RelayError::Validation`] when serialization fails or propagates any error from
/// [`HttpTransport::send_stream`].
pub async fn post_json_stream_with_headers<T: Serialize>(
    transport: &dyn HttpTransport,
    url: impl Into<String>,
    headers: HashMap<String, String>,
    body: &T,
    timeout: Option<Duration>,
) -> Result<HttpStreamResponse, RelayError> {
    let request = json_request(url, headers, body, timeout)?;
    transport.send_stream(request).await
}

/// Drains a streaming body, typically to read an error payload.
pub async fn collect_body(mut body: HttpBodyStream) -> Result<String, RelayError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub mod reqwest;
