use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// Number of characters of an upstream body kept in diagnostics.
pub const RESPONSE_BODY_LIMIT: usize = 500;

const SYSTEM_PREVIEW_LIMIT: usize = 80;

/// Aggregates every failure mode surfaced by the relay.
///
/// Nothing inside the crate retries; callers match on the variant to decide whether to
/// re-authenticate, ask the user to shorten their input, or report the upstream failure.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The long-lived credential could not be exchanged for a bearer token.
    ///
    /// `status` is `None` when the exchange never produced an HTTP response.
    #[error("auth failure: {message}")]
    Auth {
        message: String,
        status: Option<u16>,
        endpoint: String,
        /// Truncated exchange response body.
        body: String,
    },
    /// The system prompt plus the current turn alone do not fit the prompt budget.
    #[error(
        "message is too large ({required} tokens); at most {available} tokens are available \
         (including the system prompt, excluding {reply_buffer} reply tokens). \
         Shorten the message or remove attachments."
    )]
    BudgetExceeded {
        required: usize,
        available: usize,
        reply_buffer: usize,
    },
    /// Non-2xx response from a chat or catalog call.
    #[error("{0}")]
    Api(Box<ApiErrorContext>),
    /// 2xx response whose body lacks the expected fields.
    #[error("{0}")]
    MalformedResponse(Box<ApiErrorContext>),
    /// Connection-level failure while talking to the gateway.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// The caller handed in something the relay cannot send.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// Raised when building or validating configuration fails.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
}

impl RelayError {
    /// Creates a [`RelayError::Transport`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use copilot_relay::error::RelayError;
    ///
    /// let err = RelayError::transport("dns lookup failed");
    /// assert!(matches!(err, RelayError::Transport { .. }));
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// HTTP status attached to the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            RelayError::Auth { status, .. } => *status,
            RelayError::Api(context) | RelayError::MalformedResponse(context) => context.status,
            _ => None,
        }
    }
}

/// Diagnostic context attached to API and malformed-response errors.
///
/// The context never contains message bodies: the request payload is reduced to a
/// [`PayloadSummary`] before it is stored.
#[derive(Debug, Clone)]
pub struct ApiErrorContext {
    pub message: String,
    pub status: Option<u16>,
    pub endpoint: String,
    pub model: String,
    /// First [`RESPONSE_BODY_LIMIT`] characters of the upstream body.
    pub response_body: String,
    pub payload_summary: Option<PayloadSummary>,
}

impl ApiErrorContext {
    pub fn new(message: impl Into<String>, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            endpoint: endpoint.into(),
            model: model.into(),
            response_body: String::new(),
            payload_summary: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.response_body = truncate_chars(body, RESPONSE_BODY_LIMIT);
        self
    }

    pub fn with_payload_summary(mut self, summary: PayloadSummary) -> Self {
        self.payload_summary = Some(summary);
        self
    }
}

impl fmt::Display for ApiErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(status) = self.status {
            write!(f, "\n  HTTP {status}")?;
        }
        if !self.endpoint.is_empty() {
            write!(f, "\n  Endpoint: {}", self.endpoint)?;
        }
        if !self.model.is_empty() {
            write!(f, "\n  Model: {}", self.model)?;
        }
        if !self.response_body.is_empty() {
            write!(f, "\n  Response: {}", self.response_body)?;
        }
        if let Some(summary) = &self.payload_summary {
            write!(f, "\n  Payload keys: {:?}", summary.keys())?;
        }
        Ok(())
    }
}

/// Compact view of a request payload that is safe to log.
///
/// The message array is replaced by its length and a long `system` string is cut
/// short; scalar fields are kept so the failing request can be reproduced.
///
/// # Examples
///
/// ```
/// use copilot_relay::error::PayloadSummary;
/// use serde_json::json;
///
/// let summary = PayloadSummary::from_payload(&json!({
///     "model": "gpt-4.1",
///     "messages": [{"role": "user", "content": "secret"}],
///     "stream": true,
/// }));
/// assert_eq!(summary.fields()["messages"], json!("[1 messages]"));
/// assert!(!summary.to_string().contains("secret"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadSummary {
    fields: Map<String, Value>,
}

impl PayloadSummary {
    pub fn from_payload(payload: &Value) -> Self {
        let mut fields = Map::new();
        if let Some(object) = payload.as_object() {
            for (key, value) in object {
                let summarized = match (key.as_str(), value) {
                    ("messages", Value::Array(messages)) => {
                        Value::String(format!("[{} messages]", messages.len()))
                    }
                    ("system", Value::String(text))
                        if text.chars().count() > SYSTEM_PREVIEW_LIMIT =>
                    {
                        Value::String(format!("{}…", truncate_chars(text, SYSTEM_PREVIEW_LIMIT)))
                    }
                    _ => value.clone(),
                };
                fields.insert(key.clone(), summarized);
            }
        }
        Self { fields }
    }

    pub fn keys(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl fmt::Display for PayloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.fields.clone()))
    }
}

/// Non-fatal problems met while decoding a streaming response.
///
/// They are logged and counted; the stream keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamWarning {
    #[error("failed to parse JSON chunk ({reason}): {payload}")]
    InvalidJson { reason: String, payload: String },
    #[error("unexpected chunk structure ({reason}): {payload}")]
    UnexpectedShape { reason: String, payload: String },
    #[error("stream line is not valid UTF-8: {reason}")]
    InvalidUtf8 { reason: String },
}

impl StreamWarning {
    pub(crate) fn invalid_json(err: serde_json::Error, payload: &str) -> Self {
        Self::InvalidJson {
            reason: err.to_string(),
            payload: truncate_chars(payload, 200),
        }
    }

    pub(crate) fn unexpected_shape(reason: &str, payload: &str) -> Self {
        Self::UnexpectedShape {
            reason: reason.to_string(),
            payload: truncate_chars(payload, 200),
        }
    }
}

/// Reason a 2xx body could not be turned into text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ShapeError(pub(crate) String);

/// Pulls a readable description out of an upstream error body.
///
/// OpenAI, Anthropic and the gateway all report `{"error": {"type", "message"}}`; other
/// bodies fall back to their first [`RESPONSE_BODY_LIMIT`] characters.
pub(crate) fn extract_error_detail(body: &str) -> String {
    if body.trim().is_empty() {
        return "(empty body)".to_string();
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(object)) => match object.get("error") {
            Some(Value::Object(error)) => {
                let kind = error.get("type").and_then(Value::as_str).unwrap_or("error");
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| Value::Object(error.clone()).to_string());
                format!("[{kind}] {message}")
            }
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => truncate_chars(body, RESPONSE_BODY_LIMIT),
        },
        _ => truncate_chars(body, RESPONSE_BODY_LIMIT),
    }
}

/// Truncates on a character boundary.
pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_error_detail_prefers_structured_error() {
        let body = r#"{"error": {"type": "invalid_request_error", "message": "max_tokens too large"}}"#;
        assert_eq!(
            extract_error_detail(body),
            "[invalid_request_error] max_tokens too large"
        );
        assert_eq!(extract_error_detail(r#"{"error": "quota"}"#), "quota");
        assert_eq!(extract_error_detail("not json"), "not json");
        assert_eq!(extract_error_detail(""), "(empty body)");
    }

    #[test]
    fn payload_summary_hides_messages_and_trims_system() {
        let long_system = "s".repeat(120);
        let summary = PayloadSummary::from_payload(&json!({
            "model": "claude-opus-4-5",
            "messages": [{"role": "user", "content": "top secret"}, {"role": "assistant", "content": "x"}],
            "system": long_system,
            "max_tokens": 16000,
        }));

        assert_eq!(summary.fields()["messages"], json!("[2 messages]"));
        assert_eq!(summary.fields()["max_tokens"], json!(16000));
        let system = summary.fields()["system"].as_str().expect("system");
        assert_eq!(system.chars().count(), 81);
        assert!(!summary.to_string().contains("top secret"));
    }

    #[test]
    fn api_error_display_lists_diagnostics_without_content() {
        let summary = PayloadSummary::from_payload(&json!({
            "model": "gpt-4.1",
            "messages": [{"role": "user", "content": "private"}],
        }));
        let err = RelayError::Api(Box::new(
            ApiErrorContext::new("Copilot API request failed (HTTP 400).", "https://x/chat", "gpt-4.1")
                .with_status(400)
                .with_body(&"b".repeat(900))
                .with_payload_summary(summary),
        ));

        let rendered = err.to_string();
        assert!(rendered.contains("HTTP 400"));
        assert!(rendered.contains("Endpoint: https://x/chat"));
        assert!(rendered.contains("Model: gpt-4.1"));
        assert!(rendered.contains("Payload keys"));
        assert!(!rendered.contains("private"));
        assert!(!rendered.contains(&"b".repeat(501)));
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn budget_error_reports_required_and_available() {
        let err = RelayError::BudgetExceeded {
            required: 3338,
            available: 100,
            reply_buffer: 0,
        };
        let rendered = err.to_string();
        assert!(rendered.contains("3338"));
        assert!(rendered.contains("100"));
    }

    #[test]
    fn truncate_chars_respects_multibyte_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
