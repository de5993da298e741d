//! Gemini models behind the gateway's OpenAI-compatible endpoint.
//!
//! Only the message formatting differs from [`crate::provider::openai_chat`]; the body,
//! stream grammar and response shape are shared.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::error::{RelayError, ShapeError};
use crate::http::HttpBodyStream;
use crate::provider::openai_chat::{ChatChunkParser, build_chat_body, parse_chat_completion};
use crate::provider::{Dialect, PayloadOptions};
use crate::stream::{TextStream, text_stream};
use crate::types::{Message, ModelFamily};

mod request;

pub use request::{IMAGE_PLACEHOLDER, format_messages};

pub(crate) struct Gemini;

impl Dialect for Gemini {
    fn family(&self) -> ModelFamily {
        ModelFamily::Gemini
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
        text_stream(body, ChatChunkParser::new("gemini"), cancel)
    }

    fn parse_completion(&self, body: &str) -> Result<String, ShapeError> {
        parse_chat_completion(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Part, Role};

    #[test]
    fn payload_never_contains_image_urls() {
        let messages = vec![Message::new(
            Role::User,
            vec![Part::text("describe"), Part::inline_image("image/png", "AAAA")],
        )];
        let payload = Gemini
            .build_payload(
                &messages,
                PayloadOptions {
                    model: "gemini-3-pro-preview",
                    stream: false,
                    max_output_tokens: 0,
                },
            )
            .expect("payload");
        let rendered = payload.to_string();
        assert!(!rendered.contains("image_url"));
        assert_eq!(payload["n"], 1);
        assert_eq!(payload["stream"], false);
    }
}
