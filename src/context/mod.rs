//! Conversation trimming to a prompt budget.
//!
//! System messages and the current turn are always kept. History is filled from the
//! newest message backwards and stops at the first message that does not fit, so the
//! kept history is a contiguous suffix and user/assistant alternation survives.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::RelayError;
use crate::types::{Message, Role};

mod tokens;

pub use tokens::{
    ApproximateCounter, DynTokenCounter, IMAGE_TOKENS, REPLY_PRIMING_TOKENS, TOKENS_PER_MESSAGE,
    TiktokenCounter, TokenCounter, default_counter,
};

/// Budget used when nothing better is known.
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 8192;
/// Tokens reserved for the reply when the budget covers the whole window.
pub const DEFAULT_REPLY_BUFFER_TOKENS: usize = 1024;

/// Trims message lists to fit `max_tokens - reply_buffer_tokens`.
#[derive(Clone)]
pub struct ContextWindowBuilder {
    counter: DynTokenCounter,
}

impl ContextWindowBuilder {
    pub fn new(counter: DynTokenCounter) -> Self {
        Self { counter }
    }

    /// Builder backed by [`ApproximateCounter`].
    pub fn approximate() -> Self {
        Self::new(Arc::new(ApproximateCounter))
    }

    pub fn counter(&self) -> &dyn TokenCounter {
        self.counter.as_ref()
    }

    pub fn message_tokens(&self, message: &Message) -> usize {
        self.counter.count_message(message)
    }

    pub fn messages_tokens(&self, messages: &[Message]) -> usize {
        self.counter.count_messages(messages)
    }

    /// Returns the messages that fit the budget, ending with the last input message.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::BudgetExceeded`] when the system messages plus the current
    /// turn do not fit on their own.
    ///
    /// # Examples
    ///
    /// ```
    /// use copilot_relay::context::ContextWindowBuilder;
    /// use copilot_relay::types::Message;
    ///
    /// let builder = ContextWindowBuilder::approximate();
    /// let messages = vec![Message::system("Be brief."), Message::user("Hi")];
    /// let window = builder.build(&messages, 8192, 1024).unwrap();
    /// assert_eq!(window, messages);
    /// ```
    pub fn build(
        &self,
        messages: &[Message],
        max_tokens: usize,
        reply_buffer_tokens: usize,
    ) -> Result<Vec<Message>, RelayError> {
        let Some((current, earlier)) = messages.split_last() else {
            return Ok(Vec::new());
        };
        let effective_budget = max_tokens.saturating_sub(reply_buffer_tokens);

        let (system, history): (Vec<&Message>, Vec<&Message>) = earlier
            .iter()
            .partition(|message| message.role == Role::System);

        let fixed_tokens = system
            .iter()
            .map(|message| self.message_tokens(message))
            .sum::<usize>()
            + self.message_tokens(current)
            + REPLY_PRIMING_TOKENS;
        if fixed_tokens > effective_budget {
            return Err(RelayError::BudgetExceeded {
                required: fixed_tokens,
                available: effective_budget,
                reply_buffer: reply_buffer_tokens,
            });
        }

        let mut remaining = effective_budget - fixed_tokens;
        let mut kept = 0;
        for message in history.iter().rev() {
            let cost = self.message_tokens(message);
            if cost > remaining {
                break;
            }
            remaining -= cost;
            kept += 1;
        }

        if kept < history.len() {
            info!(
                dropped = history.len() - kept,
                max_tokens, "context window trimmed, dropped oldest messages"
            );
        }

        let mut window = Vec::with_capacity(system.len() + kept + 1);
        window.extend(system.into_iter().cloned());
        window.extend(history[history.len() - kept..].iter().map(|message| (*message).clone()));
        window.push(current.clone());

        debug!(
            input = messages.len(),
            output = window.len(),
            budget = max_tokens,
            used = effective_budget - remaining,
            "context window built"
        );
        Ok(window)
    }
}

impl Default for ContextWindowBuilder {
    fn default() -> Self {
        Self::new(default_counter())
    }
}
