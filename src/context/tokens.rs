//! Token counting used by the context window builder.

use std::fmt;
use std::sync::Arc;

use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

use crate::types::{Content, Message, Part};

/// Framing overhead charged for every message.
pub const TOKENS_PER_MESSAGE: usize = 4;
/// Flat cost of one image part.
pub const IMAGE_TOKENS: usize = 256;
/// Overhead added once per message list for priming the reply.
pub const REPLY_PRIMING_TOKENS: usize = 3;

/// Counts tokens in plain text.
pub trait TokenCounter: Send + Sync {
    fn count_text(&self, text: &str) -> usize;

    /// Cost of one message including [`TOKENS_PER_MESSAGE`].
    fn count_message(&self, message: &Message) -> usize {
        let body = match &message.content {
            Content::Text(text) => self.count_text(text),
            Content::Multipart(parts) => parts
                .iter()
                .map(|part| match part {
                    Part::Text { text } => self.count_text(text),
                    Part::Image { .. } => IMAGE_TOKENS,
                })
                .sum(),
        };
        TOKENS_PER_MESSAGE + body
    }

    /// Cost of a message list including [`REPLY_PRIMING_TOKENS`].
    fn count_messages(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|message| self.count_message(message))
            .sum::<usize>()
            + REPLY_PRIMING_TOKENS
    }
}

/// Thread-safe handle to a counter.
pub type DynTokenCounter = Arc<dyn TokenCounter>;

/// One token per three characters, rounded up, never below one.
///
/// ```
/// use copilot_relay::context::{ApproximateCounter, TokenCounter};
///
/// assert_eq!(ApproximateCounter.count_text(""), 1);
/// assert_eq!(ApproximateCounter.count_text("abcd"), 2);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproximateCounter;

impl TokenCounter for ApproximateCounter {
    fn count_text(&self, text: &str) -> usize {
        text.chars().count().div_ceil(3).max(1)
    }
}

/// Exact counts with the `o200k_base` encoding.
pub struct TiktokenCounter {
    bpe: CoreBPE,
}

impl TiktokenCounter {
    /// Loads the `o200k_base` encoder.
    pub fn o200k() -> Result<Self, String> {
        tiktoken_rs::o200k_base()
            .map(|bpe| Self { bpe })
            .map_err(|err| err.to_string())
    }
}

impl TokenCounter for TiktokenCounter {
    /// Special-token markup in user text is counted as ordinary text.
    fn count_text(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

impl fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TiktokenCounter(o200k_base)")
    }
}

/// The exact counter when the encoder loads, else the approximation.
pub fn default_counter() -> DynTokenCounter {
    match TiktokenCounter::o200k() {
        Ok(counter) => {
            debug!("o200k_base encoder loaded");
            Arc::new(counter)
        }
        Err(err) => {
            warn!(
                error = %err,
                "o200k_base encoder is unavailable, falling back to approximate token counting (1 token per 3 chars)"
            );
            Arc::new(ApproximateCounter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approximate_counter_rounds_up_by_chars() {
        assert_eq!(ApproximateCounter.count_text("abc"), 1);
        assert_eq!(ApproximateCounter.count_text("abcdefg"), 3);
        // Counted in characters, not bytes.
        assert_eq!(ApproximateCounter.count_text("안녕하세요"), 2);
    }

    #[test]
    fn message_cost_includes_framing_and_images() {
        let message = Message::new(
            crate::types::Role::User,
            vec![Part::text("abcdef"), Part::inline_image("image/png", "AAAA")],
        );
        assert_eq!(ApproximateCounter.count_message(&message), 4 + 2 + 256);
        assert_eq!(
            ApproximateCounter.count_messages(std::slice::from_ref(&message)),
            4 + 2 + 256 + 3
        );
        assert_eq!(ApproximateCounter.count_messages(&[]), 3);
    }

    #[test]
    fn tiktoken_counter_counts_plain_english() {
        let counter = TiktokenCounter::o200k().expect("encoder");
        let count = counter.count_text("hello world");
        assert!((1..=3).contains(&count), "unexpected count {count}");
    }

    #[test]
    fn special_token_text_is_counted_as_ordinary_text() {
        let counter = TiktokenCounter::o200k().expect("encoder");
        assert!(counter.count_text("<|endoftext|>") > 1);
    }
}
