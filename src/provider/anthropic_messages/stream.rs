use serde_json::Value;
use tracing::error;

use crate::error::{StreamWarning, truncate_chars};
use crate::stream::{FragmentParser, ParseStep};

/// Dispatches Messages API stream events on their `type`.
///
/// Text deltas become fragments; an `error` event becomes one visible final fragment so the
/// reader sees why the reply stopped.
pub(crate) struct ClaudeEventParser;

impl FragmentParser for ClaudeEventParser {
    fn dialect(&self) -> &'static str {
        "anthropic_messages"
    }

    fn parse(&mut self, data: &str) -> ParseStep {
        let value: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(err) => return ParseStep::Warn(StreamWarning::invalid_json(err, data)),
        };
        // Events without a `type` fall through to the ignored arm.
        let event_type = value.get("type").and_then(Value::as_str).unwrap_or_default();

        match event_type {
            "content_block_delta" => {
                let delta = value.get("delta");
                if delta.and_then(|d| d.get("type")).and_then(Value::as_str) != Some("text_delta") {
                    return ParseStep::Skip;
                }
                match delta.and_then(|d| d.get("text")).and_then(Value::as_str) {
                    Some(text) if !text.is_empty() => ParseStep::Emit(text.to_string()),
                    _ => ParseStep::Skip,
                }
            }
            "error" => {
                let detail = value.get("error");
                let kind = detail
                    .and_then(|e| e.get("type"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown_error");
                let message = detail
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| detail.map(Value::to_string).unwrap_or_default());
                error!(
                    kind,
                    message = %message,
                    chunk = %truncate_chars(data, 300),
                    "Claude stream error"
                );
                ParseStep::Final(format!("\n\n⚠️ Claude stream error [{kind}]: {message}"))
            }
            "message_stop" => ParseStep::Stop,
            _ => ParseStep::Skip,
        }
    }
}
