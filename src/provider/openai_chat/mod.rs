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

pub use request::format_messages;

pub(crate) use request::build_chat_body;
pub(crate) use response::parse_chat_completion;
pub(crate) use stream::ChatChunkParser;

/// OpenAI Chat Completions, used for every model that is neither Claude nor Gemini.
pub(crate) struct OpenAiChat;

impl Dialect for OpenAiChat {
    fn family(&self) -> ModelFamily {
        ModelFamily::OpenAi
    }

    fn endpoint<'c>(&self, config: &'c GatewayConfig) -> &'c str {
        &config.chat_url
    }

    fn build_payload(
        &self,
        messages: &[Message],
        options: PayloadOptions<'_>,
    ) -> Result<Value, RelayError> {
        build_chat_body(&format_messages(messages), options.model, options.stream)
    }

    fn decode_stream(&self, body: HttpBodyStream, cancel: Option<CancellationToken>) -> TextStream {
        text_stream(body, ChatChunkParser::new("openai_chat"), cancel)
    }

    fn parse_completion(&self, body: &str) -> Result<String, ShapeError> {
        parse_chat_completion(body)
    }
}
