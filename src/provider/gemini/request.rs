use crate::types::{Content, Message, Part};

/// Text that replaces image parts; the gateway rejects inline images for Gemini.
pub const IMAGE_PLACEHOLDER: &str =
    "[Image attached: inline images are unsupported for Gemini models on this gateway.]";

/// Replaces every image part with [`IMAGE_PLACEHOLDER`], keeping part order.
///
/// # Examples
///
/// ```
/// use copilot_relay::provider::gemini::format_messages;
/// use copilot_relay::types::{Content, Message, Part, Role};
///
/// let input = vec![Message::new(
///     Role::User,
///     vec![Part::text("What is this?"), Part::inline_image("image/png", "AAAA")],
/// )];
/// let output = format_messages(&input);
/// let Content::Multipart(parts) = &output[0].content else { panic!("multipart") };
/// assert_eq!(parts.len(), 2);
/// assert!(matches!(&parts[1], Part::Text { text } if text.contains("unsupported")));
/// ```
pub fn format_messages(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .map(|message| match &message.content {
            Content::Text(_) => message.clone(),
            Content::Multipart(parts) => Message {
                role: message.role.clone(),
                content: Content::Multipart(parts.iter().map(strip_image).collect()),
            },
        })
        .collect()
}

fn strip_image(part: &Part) -> Part {
    match part {
        Part::Text { .. } => part.clone(),
        Part::Image { .. } => Part::text(IMAGE_PLACEHOLDER),
    }
}
