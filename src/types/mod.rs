//! Provider-agnostic data structures shared by every dialect.
//!
//! Messages use the OpenAI chat shape on the wire (`{"role", "content"}` with either a
//! string or a list of typed parts), which is also the shape callers hand to
//! [`crate::client::CopilotClient`]. Dialect-specific rewriting happens later in
//! [`crate::provider`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Author of a chat message.
///
/// Labels other than `system`, `user` and `assistant` (for example `tool`) are kept
/// verbatim in [`Role::Other`] so the OpenAI dialect can pass them through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    System,
    User,
    Assistant,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Other(label) => label.as_str(),
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        match value {
            Role::Other(label) => label,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single chat message.
///
/// # Examples
///
/// ```
/// use copilot_relay::types::{Content, Message, Role};
///
/// let msg = Message::user("Hi");
/// assert_eq!(msg.role, Role::User);
/// assert_eq!(msg.content, Content::Text("Hi".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn new(role: Role, content: impl Into<Content>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, Content::Text(text.into()))
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Content::Text(text.into()))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Content::Text(text.into()))
    }

    /// Returns `true` when any part of the message is an image.
    pub fn has_images(&self) -> bool {
        self.content.has_images()
    }
}

/// Message body: plain text or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Multipart(Vec<Part>),
}

impl Content {
    pub fn has_images(&self) -> bool {
        match self {
            Content::Text(_) => false,
            Content::Multipart(parts) => parts.iter().any(|part| matches!(part, Part::Image { .. })),
        }
    }

    /// Converts the content into a part list, dropping empty text.
    pub fn into_parts(self) -> Vec<Part> {
        match self {
            Content::Text(text) if text.is_empty() => Vec::new(),
            Content::Text(text) => vec![Part::Text { text }],
            Content::Multipart(parts) => parts,
        }
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Content::Text(value)
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Content::Text(value.to_string())
    }
}

impl From<Vec<Part>> for Content {
    fn from(value: Vec<Part>) -> Self {
        Content::Multipart(value)
    }
}

/// One element of multipart content.
///
/// Serialized in the OpenAI chat shape: `{"type":"text","text":..}` or
/// `{"type":"image_url","image_url":{"url":..}}`. Inline images travel as
/// `data:<mime>;base64,<data>` URLs.
///
/// # Examples
///
/// ```
/// use copilot_relay::types::{ImageSource, Part};
///
/// let part: Part = serde_json::from_str(
///     r#"{"type":"image_url","image_url":{"url":"data:image/jpeg;base64,AAAA"}}"#,
/// )
/// .unwrap();
/// assert_eq!(
///     part,
///     Part::Image {
///         source: ImageSource::Inline {
///             mime_type: "image/jpeg".to_string(),
///             data: "AAAA".to_string(),
///         },
///     }
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WirePart", into = "WirePart")]
pub enum Part {
    Text { text: String },
    Image { source: ImageSource },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline_image(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Part::Image {
            source: ImageSource::Inline {
                mime_type: mime_type.into(),
                data: data.into(),
            },
        }
    }

    pub fn remote_image(url: impl Into<String>) -> Self {
        Part::Image {
            source: ImageSource::Remote { url: url.into() },
        }
    }
}

/// Where image bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Base64 payload embedded in the request.
    Inline { mime_type: String, data: String },
    /// URL the backend would have to fetch itself.
    Remote { url: String },
}

impl ImageSource {
    /// Parses an OpenAI `image_url.url` value.
    pub fn from_url(url: &str) -> Self {
        if let Some(rest) = url.strip_prefix("data:") {
            if let Some((header, data)) = rest.split_once(',') {
                let mime = header.split(';').next().unwrap_or_default();
                let mime_type = if mime.is_empty() { "image/png" } else { mime };
                return ImageSource::Inline {
                    mime_type: mime_type.to_string(),
                    data: data.to_string(),
                };
            }
        }
        ImageSource::Remote {
            url: url.to_string(),
        }
    }

    pub fn to_url(&self) -> String {
        match self {
            ImageSource::Inline { mime_type, data } => format!("data:{mime_type};base64,{data}"),
            ImageSource::Remote { url } => url.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Serialize, Deserialize)]
struct WireImageUrl {
    url: String,
}

impl From<WirePart> for Part {
    fn from(value: WirePart) -> Self {
        match value {
            WirePart::Text { text } => Part::Text { text },
            WirePart::ImageUrl { image_url } => Part::Image {
                source: ImageSource::from_url(&image_url.url),
            },
        }
    }
}

impl From<Part> for WirePart {
    fn from(value: Part) -> Self {
        match value {
            Part::Text { text } => WirePart::Text { text },
            Part::Image { source } => WirePart::ImageUrl {
                image_url: WireImageUrl {
                    url: source.to_url(),
                },
            },
        }
    }
}

/// Backend wire dialect a model id maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    OpenAi,
    Gemini,
    Claude,
}

impl ModelFamily {
    /// Classifies a model id by case-insensitive substring.
    ///
    /// # Examples
    ///
    /// ```
    /// use copilot_relay::types::ModelFamily;
    ///
    /// assert_eq!(ModelFamily::from_model_id("Claude-Opus-4.5"), ModelFamily::Claude);
    /// assert_eq!(ModelFamily::from_model_id("gemini-2.0-flash"), ModelFamily::Gemini);
    /// assert_eq!(ModelFamily::from_model_id("some-new-model"), ModelFamily::OpenAi);
    /// ```
    pub fn from_model_id(model_id: &str) -> Self {
        let lower = model_id.to_ascii_lowercase();
        if lower.contains("claude") {
            ModelFamily::Claude
        } else if lower.contains("gemini") {
            ModelFamily::Gemini
        } else {
            ModelFamily::OpenAi
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::OpenAi => "openai",
            ModelFamily::Gemini => "gemini",
            ModelFamily::Claude => "claude",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token limits advertised by the model catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimits {
    pub max_context_window_tokens: usize,
    /// Prompt budget; already excludes the space reserved for the reply.
    pub max_prompt_tokens: usize,
    pub max_output_tokens: usize,
}
