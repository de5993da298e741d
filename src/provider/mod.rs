//! Wire dialects spoken by the gateway.
//!
//! Each dialect rewrites provider-agnostic [`Message`]s into its own message shape, builds
//! the request body, and knows how to read replies, both streamed and whole.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::error::{RelayError, ShapeError};
use crate::http::HttpBodyStream;
use crate::stream::TextStream;
use crate::types::{Message, ModelFamily};

pub mod anthropic_messages;
pub mod gemini;
pub mod openai_chat;

/// Request-level settings shared by every dialect.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PayloadOptions<'a> {
    pub(crate) model: &'a str,
    pub(crate) stream: bool,
    /// Only the Claude dialect sends an output cap.
    pub(crate) max_output_tokens: usize,
}

/// One backend wire format.
pub(crate) trait Dialect: Send + Sync {
    fn family(&self) -> ModelFamily;

    fn endpoint<'c>(&self, config: &'c GatewayConfig) -> &'c str;

    /// Formats `messages` and builds the JSON request body.
    fn build_payload(
        &self,
        messages: &[Message],
        options: PayloadOptions<'_>,
    ) -> Result<Value, RelayError>;

    fn decode_stream(&self, body: HttpBodyStream, cancel: Option<CancellationToken>) -> TextStream;

    /// Extracts the reply text from a non-streaming 2xx body.
    fn parse_completion(&self, body: &str) -> Result<String, ShapeError>;
}

/// Dialect used for a model family.
pub(crate) fn dialect_for(family: ModelFamily) -> &'static dyn Dialect {
    match family {
        ModelFamily::OpenAi => &openai_chat::OpenAiChat,
        ModelFamily::Gemini => &gemini::Gemini,
        ModelFamily::Claude => &anthropic_messages::AnthropicMessages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_uses_messages_endpoint() {
        let config = GatewayConfig::default();
        assert_eq!(
            dialect_for(ModelFamily::Claude).endpoint(&config),
            "https://api.githubcopilot.com/v1/messages"
        );
        assert_eq!(
            dialect_for(ModelFamily::Gemini).endpoint(&config),
            "https://api.githubcopilot.com/chat/completions"
        );
        assert_eq!(dialect_for(ModelFamily::OpenAi).family(), ModelFamily::OpenAi);
    }
}
