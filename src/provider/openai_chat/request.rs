use serde_json::{Map, Value};

use crate::error::RelayError;
use crate::types::Message;

/// OpenAI chat messages go out unchanged.
pub fn format_messages(messages: &[Message]) -> Vec<Message> {
    messages.to_vec()
}

/// 构建 Chat Completions 请求体
///
/// The Gemini dialect sends the same body with its own message formatting.
pub(crate) fn build_chat_body(
    messages: &[Message],
    model: &str,
    stream: bool,
) -> Result<Value, RelayError> {
    let messages = serde_json::to_value(messages).map_err(|err| {
        RelayError::validation(format!("failed to serialize messages: {err}"))
    })?;

    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));
    body.insert("messages".to_string(), messages);
    body.insert("stream".to_string(), Value::Bool(stream));
    body.insert("n".to_string(), Value::from(1));
    body.insert("top_p".to_string(), Value::from(1));
    body.insert("temperature".to_string(), Value::from(0.1));
    Ok(Value::Object(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Part;
    use serde_json::json;

    #[test]
    fn format_is_identity() {
        let messages = vec![
            Message::system("s"),
            Message::new(
                crate::types::Role::User,
                vec![Part::text("look"), Part::remote_image("https://example.com/a.png")],
            ),
        ];
        assert_eq!(format_messages(&messages), messages);
    }

    #[test]
    fn body_carries_sampling_defaults() {
        let body = build_chat_body(&[Message::user("Hi")], "gpt-4.1", true).expect("body");
        assert_eq!(
            body,
            json!({
                "model": "gpt-4.1",
                "messages": [{"role": "user", "content": "Hi"}],
                "stream": true,
                "n": 1,
                "top_p": 1,
                "temperature": 0.1,
            })
        );
    }
}
