use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response};
use tracing::trace;

use crate::error::RelayError;

use super::{
    DynHttpTransport, HttpBodyStream, HttpMethod, HttpRequest, HttpResponse, HttpStreamResponse,
    HttpTransport,
};

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
///
/// Per-request timeouts come from [`HttpRequest::timeout`]; the client itself has none.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client with reqwest defaults and rustls.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] when the TLS backend cannot be initialised.
    pub fn default_client() -> Result<Self, RelayError> {
        Client::builder()
            .build()
            .map(Self::new)
            .map_err(|err| RelayError::transport(format!("failed to create reqwest client: {err}")))
    }

    fn to_reqwest(&self, request: HttpRequest) -> Result<reqwest::RequestBuilder, RelayError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;
        let method = match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };

        let mut header_map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| RelayError::transport(format!("invalid header name: {err}")))?;
            // Values may hold the bearer token; only the name goes into the error.
            let value = HeaderValue::from_str(&value)
                .map_err(|_| RelayError::transport(format!("invalid header value for {name}")))?;
            header_map.insert(name, value);
        }

        let mut builder = self.client.request(method, url).headers(header_map);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        Ok(builder)
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<Response, RelayError> {
        let url = request.url.clone();
        let response = self
            .to_reqwest(request)?
            .send()
            .await
            .map_err(send_error)?;
        trace!(url = %url, status = response.status().as_u16(), "gateway responded");
        Ok(response)
    }
}

fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

fn send_error(err: reqwest::Error) -> RelayError {
    if err.is_timeout() {
        RelayError::transport(format!("request timed out: {err}"))
    } else if err.is_connect() {
        RelayError::transport(format!("connection failed: {err}"))
    } else {
        RelayError::transport(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, RelayError> {
        let response = self.dispatch(request).await?;
        let status = response.status().as_u16();
        let headers = flatten_headers(response.headers());
        let body = response.bytes().await.map_err(send_error)?.to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, RelayError> {
        let response = self.dispatch(request).await?;
        let status = response.status().as_u16();
        let headers = flatten_headers(response.headers());
        let body: HttpBodyStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(send_error)),
        );
        Ok(HttpStreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Shared reqwest transport used when the caller does not supply one.
pub fn default_dyn_transport() -> Result<DynHttpTransport, RelayError> {
    Ok(Arc::new(ReqwestTransport::default_client()?))
}
