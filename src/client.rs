use std::fmt;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::auth::{Credential, TokenBroker};
use crate::clock::{DynClock, SystemClock};
use crate::config::GatewayConfig;
use crate::context::{ContextWindowBuilder, DynTokenCounter};
use crate::error::{ApiErrorContext, PayloadSummary, RelayError, ShapeError, extract_error_detail};
use crate::http::reqwest::default_dyn_transport;
use crate::http::{DynHttpTransport, collect_body, post_json_stream_with_headers, post_json_with_headers};
use crate::models::{ModelLimitsRegistry, RefreshOutcome};
use crate::provider::{PayloadOptions, dialect_for};
use crate::stream::TextStream;
use crate::types::{Content, Message, ModelFamily, ModelLimits, Role};

const VISION_HEADER: &str = "copilot-vision-request";
const PREVIEW_CHARS: usize = 120;

/// One chat call.
///
/// # Examples
///
/// ```
/// use copilot_relay::client::ChatRequest;
/// use copilot_relay::types::Message;
///
/// let request = ChatRequest::new("gpt-4.1", vec![Message::user("Hi")]).with_stream(false);
/// assert!(!request.stream);
/// assert!(!request.pre_assembled);
/// ```
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    /// Ends with the current user turn.
    pub messages: Vec<Message>,
    pub stream: bool,
    /// Skip trimming; the caller already fit the messages to the prompt budget.
    pub pre_assembled: bool,
    pub cancel: Option<CancellationToken>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
            pre_assembled: false,
            cancel: None,
        }
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn pre_assembled(mut self) -> Self {
        self.pre_assembled = true;
        self
    }

    /// Ends a streamed reply early once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Reply of [`CopilotClient::chat`].
pub enum ChatReply {
    Stream(TextStream),
    Complete(String),
}

impl ChatReply {
    /// Drains a streamed reply into one string.
    ///
    /// # Errors
    ///
    /// Returns the first transport error raised by the stream.
    pub async fn into_text(self) -> Result<String, RelayError> {
        match self {
            ChatReply::Complete(text) => Ok(text),
            ChatReply::Stream(mut stream) => {
                let mut text = String::new();
                while let Some(fragment) = stream.next().await {
                    text.push_str(&fragment?);
                }
                Ok(text)
            }
        }
    }
}

impl fmt::Debug for ChatReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatReply::Stream(_) => f.write_str("ChatReply::Stream(..)"),
            ChatReply::Complete(text) => f.debug_tuple("ChatReply::Complete").field(text).finish(),
        }
    }
}

/// The request a chat call would send, built without sending it.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadPreview {
    pub endpoint: String,
    pub family: ModelFamily,
    /// Messages in the payload after dialect formatting.
    pub message_count: usize,
    pub payload: Value,
}

/// Chat entry point for the Copilot gateway.
///
/// Owns the bearer token, the model limits cache and the context trimming; safe to share
/// behind an `Arc` across tasks.
pub struct CopilotClient {
    transport: DynHttpTransport,
    config: Arc<GatewayConfig>,
    broker: TokenBroker,
    registry: ModelLimitsRegistry,
    context: ContextWindowBuilder,
}

impl CopilotClient {
    /// Starts a builder around the long-lived GitHub credential.
    pub fn builder(credential: Credential) -> CopilotClientBuilder {
        CopilotClientBuilder {
            credential,
            transport: None,
            clock: None,
            config: GatewayConfig::default(),
            counter: None,
        }
    }

    /// Sends one chat request.
    ///
    /// Unless the request is pre-assembled, history is trimmed to the model's prompt budget
    /// (or the configured defaults when the model has no known limits) before formatting.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Validation`] for an empty message list or one not ending with a user turn.
    /// - [`RelayError::Auth`] when no bearer token can be obtained.
    /// - [`RelayError::BudgetExceeded`] when the current turn alone is too large.
    /// - [`RelayError::Api`] for non-2xx responses and [`RelayError::MalformedResponse`] for
    ///   unreadable 2xx bodies.
    /// - [`RelayError::Transport`] when the gateway cannot be reached.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatReply, RelayError> {
        validate_messages(&request.messages)?;
        let bearer = self.broker.ensure_valid().await?;

        let ChatRequest {
            model,
            messages,
            stream,
            pre_assembled,
            cancel,
        } = request;
        let family = ModelFamily::from_model_id(&model);
        let dialect = dialect_for(family);
        log_outgoing(&model, family, stream, &messages);

        let limits = self.registry.lookup(&model);
        let window = if pre_assembled {
            messages
        } else {
            self.trim(&model, limits, &messages)?
        };

        let max_output_tokens =
            limits.map_or(self.config.claude_default_max_output, |l| l.max_output_tokens);
        let payload = dialect.build_payload(
            &window,
            PayloadOptions {
                model: &model,
                stream,
                max_output_tokens,
            },
        )?;
        let endpoint = dialect.endpoint(&self.config).to_string();

        let mut headers = self.config.gateway_headers(&bearer);
        if family != ModelFamily::Gemini && window.iter().any(Message::has_images) {
            headers.insert(VISION_HEADER.to_string(), "true".to_string());
        }
        debug!(
            endpoint = %endpoint,
            keys = ?PayloadSummary::from_payload(&payload).keys(),
            "sending chat request"
        );

        let timeout = Some(self.config.timeouts.chat());
        if stream {
            let response = post_json_stream_with_headers(
                self.transport.as_ref(),
                endpoint.clone(),
                headers,
                &payload,
                timeout,
            )
            .await?;
            if !response.is_success() {
                let body = collect_body(response.body).await.unwrap_or_default();
                return Err(api_error(response.status, &body, &endpoint, &model, &payload));
            }
            return Ok(ChatReply::Stream(dialect.decode_stream(response.body, cancel)));
        }

        let response = post_json_with_headers(
            self.transport.as_ref(),
            endpoint.clone(),
            headers,
            &payload,
            timeout,
        )
        .await?;
        let body = response.text_lossy();
        if !response.is_success() {
            return Err(api_error(response.status, &body, &endpoint, &model, &payload));
        }
        dialect
            .parse_completion(&body)
            .map(ChatReply::Complete)
            .map_err(|ShapeError(reason)| {
                RelayError::MalformedResponse(Box::new(
                    ApiErrorContext::new(
                        format!("Unexpected response format from {family} model: {reason}"),
                        endpoint,
                        model,
                    )
                    .with_status(response.status)
                    .with_body(&body),
                ))
            })
    }

    /// Same as [`CopilotClient::chat`], ending the reply stream once `token` is cancelled.
    pub async fn chat_with_cancel(
        &self,
        request: ChatRequest,
        token: CancellationToken,
    ) -> Result<ChatReply, RelayError> {
        self.chat(request.with_cancellation(token)).await
    }

    /// Refreshes the model limits cache from the catalog.
    ///
    /// # Errors
    ///
    /// Only token failures are errors; catalog failures come back as
    /// [`RefreshOutcome::Failed`] and keep the previous cache.
    pub async fn refresh_model_limits(&self) -> Result<RefreshOutcome, RelayError> {
        let bearer = self.broker.ensure_valid().await?;
        Ok(self.registry.refresh(&bearer).await)
    }

    pub fn model_limits(&self, model_id: &str) -> Option<ModelLimits> {
        self.registry.lookup(model_id)
    }

    /// Model ids with cached limits, aliases included.
    pub fn known_models(&self) -> Vec<String> {
        self.registry.known_ids()
    }

    /// Builds the streaming payload for `messages` as-is, without trimming or sending.
    pub fn preview(&self, messages: &[Message], model_id: &str) -> Result<PayloadPreview, RelayError> {
        let family = ModelFamily::from_model_id(model_id);
        let dialect = dialect_for(family);
        let max_output_tokens = self
            .registry
            .lookup(model_id)
            .map_or(self.config.claude_default_max_output, |l| l.max_output_tokens);
        let payload = dialect.build_payload(
            messages,
            PayloadOptions {
                model: model_id,
                stream: true,
                max_output_tokens,
            },
        )?;
        let message_count = payload
            .get("messages")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        Ok(PayloadPreview {
            endpoint: dialect.endpoint(&self.config).to_string(),
            family,
            message_count,
            payload,
        })
    }

    pub fn token_broker(&self) -> &TokenBroker {
        &self.broker
    }

    pub fn context_builder(&self) -> &ContextWindowBuilder {
        &self.context
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn trim(
        &self,
        model: &str,
        limits: Option<ModelLimits>,
        messages: &[Message],
    ) -> Result<Vec<Message>, RelayError> {
        // Catalog prompt limits already exclude the reply.
        let (max_tokens, reply_buffer) = match limits {
            Some(limits) => {
                debug!(
                    model,
                    prompt = limits.max_prompt_tokens,
                    output = limits.max_output_tokens,
                    "using catalog limits"
                );
                (limits.max_prompt_tokens, 0)
            }
            None => {
                debug!(model, "no catalog limits, using defaults");
                (
                    self.config.context.max_tokens,
                    self.config.context.reply_buffer_tokens,
                )
            }
        };
        let window = self.context.build(messages, max_tokens, reply_buffer)?;
        if window.len() < messages.len() {
            info!(
                from = messages.len(),
                to = window.len(),
                "message list trimmed to fit the context window"
            );
        }
        Ok(window)
    }
}

impl fmt::Debug for CopilotClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopilotClient")
            .field("config", &self.config)
            .field("broker", &self.broker)
            .finish_non_exhaustive()
    }
}

/// Builder for [`CopilotClient`].
///
/// # Examples
///
/// ```no_run
/// use copilot_relay::auth::Credential;
/// use copilot_relay::client::CopilotClient;
/// use copilot_relay::config::GatewayConfig;
///
/// # fn main() -> Result<(), copilot_relay::error::RelayError> {
/// let client = CopilotClient::builder(Credential::from_env()?)
///     .config(GatewayConfig::from_env()?)
///     .build()?;
/// # let _ = client;
/// # Ok(())
/// # }
/// ```
pub struct CopilotClientBuilder {
    credential: Credential,
    transport: Option<DynHttpTransport>,
    clock: Option<DynClock>,
    config: GatewayConfig,
    counter: Option<DynTokenCounter>,
}

impl CopilotClientBuilder {
    /// Defaults to a reqwest transport.
    pub fn transport(mut self, transport: DynHttpTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: DynClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to [`crate::context::default_counter`].
    pub fn token_counter(mut self, counter: DynTokenCounter) -> Self {
        self.counter = Some(counter);
        self
    }

    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConfig`] for invalid endpoints and
    /// [`RelayError::Transport`] when the default transport cannot be created.
    pub fn build(self) -> Result<CopilotClient, RelayError> {
        self.config.validate()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_dyn_transport()?,
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let context = match self.counter {
            Some(counter) => ContextWindowBuilder::new(counter),
            None => ContextWindowBuilder::default(),
        };
        let config = Arc::new(self.config);

        Ok(CopilotClient {
            broker: TokenBroker::new(
                Arc::clone(&transport),
                clock,
                self.credential,
                Arc::clone(&config),
            ),
            registry: ModelLimitsRegistry::new(Arc::clone(&transport), Arc::clone(&config)),
            transport,
            config,
            context,
        })
    }
}

fn validate_messages(messages: &[Message]) -> Result<(), RelayError> {
    match messages.last() {
        None => Err(RelayError::validation("chat requires at least one message")),
        Some(last) if last.role != Role::User => Err(RelayError::validation(format!(
            "the last message must be the current user turn, got role `{}`",
            last.role
        ))),
        Some(_) => Ok(()),
    }
}

fn api_error(status: u16, body: &str, endpoint: &str, model: &str, payload: &Value) -> RelayError {
    let detail = extract_error_detail(body);
    RelayError::Api(Box::new(
        ApiErrorContext::new(
            format!("Copilot API request failed (HTTP {status}). {detail}"),
            endpoint,
            model,
        )
        .with_status(status)
        .with_body(body)
        .with_payload_summary(PayloadSummary::from_payload(payload)),
    ))
}

fn log_outgoing(model: &str, family: ModelFamily, stream: bool, messages: &[Message]) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    debug!(model, %family, stream, count = messages.len(), "chat request");
    for (index, message) in messages.iter().enumerate() {
        debug!(index, role = %message.role, content = %content_preview(&message.content), "message");
    }
}

fn content_preview(content: &Content) -> String {
    match content {
        Content::Text(text) if text.chars().count() > PREVIEW_CHARS => {
            let head: String = text.chars().take(PREVIEW_CHARS).collect();
            format!("{head}…")
        }
        Content::Text(text) => text.clone(),
        Content::Multipart(parts) => format!("[multipart, {} parts]", parts.len()),
    }
}
