//! Claude models through the gateway's Anthropic Messages endpoint.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::error::{RelayError, ShapeError};
use crate::http::HttpBodyStream;
use crate::provider::{Dialect, PayloadOptions};
use crate::stream::{TextStream, text_stream};
use crate::types::{Message, ModelFamily};

mod request;
mod response;
mod stream;

pub use request::{
    ClaudeBlock, ClaudeContent, ClaudeConversation, ClaudeImageSource, ClaudeMessage, ClaudeRole,
    START_PLACEHOLDER, format_messages,
};

use request::build_claude_body;
use response::parse_message_completion;
use stream::ClaudeEventParser;

pub(crate) struct AnthropicMessages;

impl Dialect for AnthropicMessages {
    fn family(&self) -> ModelFamily {
        ModelFamily::Claude
    }

    fn endpoint<'c>(&self, config: &'c GatewayConfig) -> &'c str {
        &config.messages_url
    }

    fn build_payload(
        &self,
        messages: &[Message],
        options: PayloadOptions<'_>,
    ) -> Result<Value, RelayError> {
        let conversation = format_messages(messages);
        build_claude_body(
            &conversation,
            options.model,
            options.stream,
            options.max_output_tokens,
        )
    }

    fn decode_stream(&self, body: HttpBodyStream, cancel: Option<CancellationToken>) -> TextStream {
        text_stream(body, ClaudeEventParser, cancel)
    }

    fn parse_completion(&self, body: &str) -> Result<String, ShapeError> {
        parse_message_completion(body)
    }
}
