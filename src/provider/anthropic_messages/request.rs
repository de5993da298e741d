use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::RelayError;
use crate::types::{Content, ImageSource, Message, Part, Role};

/// User turn inserted when the conversation would otherwise open with the assistant.
pub const START_PLACEHOLDER: &str = "(start)";

/// Claude-ready conversation: strictly alternating turns plus the extracted system prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaudeConversation {
    pub messages: Vec<ClaudeMessage>,
    /// Newline-joined system messages, `None` when there were none.
    pub system: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaudeMessage {
    pub role: ClaudeRole,
    pub content: ClaudeContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaudeRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ClaudeContent {
    Text(String),
    Blocks(Vec<ClaudeBlock>),
}

impl ClaudeContent {
    fn into_blocks(self) -> Vec<ClaudeBlock> {
        match self {
            ClaudeContent::Text(text) if text.is_empty() => Vec::new(),
            ClaudeContent::Text(text) => vec![ClaudeBlock::Text { text }],
            ClaudeContent::Blocks(blocks) => blocks,
        }
    }

    /// Joins two turns of the same role.
    fn merge(self, next: ClaudeContent) -> ClaudeContent {
        match (self, next) {
            (ClaudeContent::Text(first), ClaudeContent::Text(second)) => {
                ClaudeContent::Text(format!("{first}\n{second}"))
            }
            (first, second) => {
                let mut blocks = first.into_blocks();
                blocks.extend(second.into_blocks());
                ClaudeContent::Blocks(blocks)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaudeBlock {
    Text { text: String },
    Image { source: ClaudeImageSource },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaudeImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

/// Rewrites messages for the Messages API.
///
/// System messages leave the body and become [`ClaudeConversation::system`]; roles other
/// than user are sent as assistant; adjacent turns of one role are merged.
///
/// # Examples
///
/// ```
/// use copilot_relay::provider::anthropic_messages::{ClaudeRole, format_messages};
/// use copilot_relay::types::Message;
///
/// let conversation = format_messages(&[Message::assistant("ready"), Message::user("go")]);
/// assert_eq!(conversation.messages[0].role, ClaudeRole::User);
/// assert_eq!(conversation.messages.len(), 3);
/// ```
pub fn format_messages(messages: &[Message]) -> ClaudeConversation {
    let mut system: Option<String> = None;
    let mut body: Vec<ClaudeMessage> = Vec::new();

    for message in messages {
        let role = match &message.role {
            Role::System => {
                let text = flatten_content(&message.content);
                system = Some(match system {
                    Some(existing) => format!("{existing}\n{text}"),
                    None => text,
                });
                continue;
            }
            Role::User => ClaudeRole::User,
            Role::Assistant | Role::Other(_) => ClaudeRole::Assistant,
        };
        let content = convert_content(&message.content);

        match body.last_mut() {
            Some(last) if last.role == role => {
                let previous = std::mem::replace(&mut last.content, ClaudeContent::Text(String::new()));
                last.content = previous.merge(content);
            }
            _ => body.push(ClaudeMessage { role, content }),
        }
    }

    if body.first().is_some_and(|first| first.role != ClaudeRole::User) {
        body.insert(
            0,
            ClaudeMessage {
                role: ClaudeRole::User,
                content: ClaudeContent::Text(START_PLACEHOLDER.to_string()),
            },
        );
    }

    ClaudeConversation {
        messages: body,
        system,
    }
}

/// Plain text of a message; images become `[image]`.
fn flatten_content(content: &Content) -> String {
    match content {
        Content::Text(text) => text.clone(),
        Content::Multipart(parts) => parts
            .iter()
            .map(|part| match part {
                Part::Text { text } => text.as_str(),
                Part::Image { .. } => "[image]",
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn convert_content(content: &Content) -> ClaudeContent {
    match content {
        Content::Text(text) => ClaudeContent::Text(text.clone()),
        Content::Multipart(parts) => ClaudeContent::Blocks(parts.iter().map(convert_part).collect()),
    }
}

fn convert_part(part: &Part) -> ClaudeBlock {
    match part {
        Part::Text { text } => ClaudeBlock::Text { text: text.clone() },
        Part::Image {
            source: ImageSource::Inline { mime_type, data },
        } => ClaudeBlock::Image {
            source: ClaudeImageSource {
                kind: "base64".to_string(),
                media_type: mime_type.clone(),
                data: data.clone(),
            },
        },
        // The gateway cannot fetch remote images for Claude.
        Part::Image {
            source: ImageSource::Remote { url },
        } => ClaudeBlock::Text {
            text: format!("[image: {url}]"),
        },
    }
}

/// 构建 Anthropic Messages 请求体
pub(crate) fn build_claude_body(
    conversation: &ClaudeConversation,
    model: &str,
    stream: bool,
    max_output_tokens: usize,
) -> Result<Value, RelayError> {
    let messages = serde_json::to_value(&conversation.messages).map_err(|err| {
        RelayError::validation(format!("failed to serialize messages: {err}"))
    })?;

    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));
    body.insert("messages".to_string(), messages);
    body.insert("max_tokens".to_string(), Value::from(max_output_tokens));
    body.insert("stream".to_string(), Value::Bool(stream));
    body.insert("temperature".to_string(), Value::from(0.1));
    // system 为空时不发送
    if let Some(system) = conversation.system.as_deref().filter(|text| !text.is_empty()) {
        body.insert("system".to_string(), Value::String(system.to_string()));
    }
    Ok(Value::Object(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn system_messages_are_extracted_and_joined() {
        let conversation = format_messages(&[
            Message::system("Be terse."),
            Message::user("Hi"),
            Message::new(
                Role::System,
                vec![Part::text("Also polite."), Part::inline_image("image/png", "AAAA")],
            ),
        ]);
        assert_eq!(
            conversation.system.as_deref(),
            Some("Be terse.\nAlso polite.\n[image]")
        );
        assert_eq!(conversation.messages.len(), 1);
    }

    #[test]
    fn consecutive_text_turns_merge_with_newline() {
        let conversation = format_messages(&[
            Message::user("one"),
            Message::user("two"),
            Message::assistant("a"),
            Message::new(Role::Other("tool".to_string()), "b"),
        ]);
        assert_eq!(
            conversation.messages,
            vec![
                ClaudeMessage {
                    role: ClaudeRole::User,
                    content: ClaudeContent::Text("one\ntwo".to_string()),
                },
                ClaudeMessage {
                    role: ClaudeRole::Assistant,
                    content: ClaudeContent::Text("a\nb".to_string()),
                },
            ]
        );
        assert_eq!(conversation.system, None);
    }

    #[test]
    fn mixed_merge_concatenates_blocks_and_drops_empty_text() {
        let conversation = format_messages(&[
            Message::user(""),
            Message::new(Role::User, vec![Part::inline_image("image/jpeg", "QUJD")]),
            Message::user("caption"),
        ]);
        assert_eq!(
            conversation.messages,
            vec![ClaudeMessage {
                role: ClaudeRole::User,
                content: ClaudeContent::Blocks(vec![
                    ClaudeBlock::Image {
                        source: ClaudeImageSource {
                            kind: "base64".to_string(),
                            media_type: "image/jpeg".to_string(),
                            data: "QUJD".to_string(),
                        },
                    },
                    ClaudeBlock::Text {
                        text: "caption".to_string(),
                    },
                ]),
            }]
        );
    }

    #[test]
    fn remote_images_become_text_markers() {
        let conversation = format_messages(&[Message::new(
            Role::User,
            vec![Part::remote_image("https://example.com/cat.png")],
        )]);
        let value = serde_json::to_value(&conversation.messages).expect("json");
        assert_eq!(
            value,
            json!([{"role": "user", "content": [{"type": "text", "text": "[image: https://example.com/cat.png]"}]}])
        );
    }

    #[test]
    fn leading_assistant_gets_start_turn() {
        let conversation = format_messages(&[Message::assistant("ready"), Message::user("go")]);
        assert_eq!(
            conversation.messages[0].content,
            ClaudeContent::Text(START_PLACEHOLDER.to_string())
        );
        assert_eq!(conversation.messages[1].role, ClaudeRole::Assistant);
        assert_eq!(conversation.messages[2].role, ClaudeRole::User);
    }

    #[test]
    fn turns_always_alternate() {
        let conversation = format_messages(&[
            Message::new(Role::Other("function".to_string()), "f"),
            Message::assistant("a"),
            Message::user("u1"),
            Message::system("late system"),
            Message::user("u2"),
        ]);
        let roles: Vec<ClaudeRole> = conversation.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles[0], ClaudeRole::User);
        assert!(roles.windows(2).all(|pair| pair[0] != pair[1]));
    }

    #[test]
    fn image_blocks_serialize_in_base64_source_shape() {
        let block = convert_part(&Part::inline_image("image/png", "iVBO"));
        assert_eq!(
            serde_json::to_value(block).expect("json"),
            json!({"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "iVBO"}})
        );
    }

    #[test]
    fn body_omits_empty_system() {
        let conversation = format_messages(&[Message::system(""), Message::user("hi")]);
        let body = build_claude_body(&conversation, "claude-opus-4-5", true, 16000).expect("body");
        assert!(body.get("system").is_none());
        assert_eq!(body["max_tokens"], 16000);
        assert!(body.get("n").is_none());

        let conversation = format_messages(&[Message::system("sys"), Message::user("hi")]);
        let body = build_claude_body(&conversation, "claude-opus-4-5", false, 32000).expect("body");
        assert_eq!(body["system"], "sys");
        assert_eq!(body["stream"], false);
        assert_eq!(body["temperature"], 0.1);
    }
}
