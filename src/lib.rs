//! Chat relay for the GitHub Copilot gateway.
//!
//! One [`CopilotClient`] keeps the short-lived bearer token valid, caches per-model token
//! limits, trims history to the prompt budget, and speaks the three wire dialects the
//! gateway exposes (OpenAI chat, its Gemini variant, and Anthropic messages). Replies come
//! back whole or as a stream of text fragments.

pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod models;
pub mod provider;
pub mod stream;
pub mod types;

pub use client::{ChatReply, ChatRequest, CopilotClient, PayloadPreview};
pub use error::RelayError;
pub use stream::TextStream;
pub use types::*;
