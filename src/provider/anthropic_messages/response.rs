use serde_json::Value;
use tracing::warn;

use crate::error::{ShapeError, truncate_chars};

/// Joins the `text` blocks of a non-streaming Messages response with newlines.
///
/// An empty `content` array yields an empty reply and a warning.
pub(crate) fn parse_message_completion(body: &str) -> Result<String, ShapeError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|err| ShapeError(format!("Claude returned a non-JSON response: {err}")))?;
    let blocks = value
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| ShapeError("expected a 'content' array in response".to_string()))?;

    if blocks.is_empty() {
        warn!(body = %truncate_chars(body, 500), "Claude response has no content blocks");
        return Ok(String::new());
    }

    let texts: Vec<&str> = blocks
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .map(|block| block.get("text").and_then(Value::as_str).unwrap_or_default())
        .collect();
    Ok(texts.join("\n"))
}
