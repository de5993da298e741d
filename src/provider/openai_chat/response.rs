use serde_json::Value;

use crate::error::ShapeError;

/// Reads `choices[0].message.content` from a non-streaming body.
pub(crate) fn parse_chat_completion(body: &str) -> Result<String, ShapeError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|err| ShapeError(format!("response is not valid JSON: {err}")))?;
    value
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            ShapeError("expected 'choices[0].message.content' in response".to_string())
        })
}
