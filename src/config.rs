use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::Credential;
use crate::error::RelayError;

pub const DEFAULT_API_BASE: &str = "https://api.githubcopilot.com";
pub const DEFAULT_TOKEN_URL: &str = "https://api.github.com/copilot_internal/v2/token";

/// Display name and model id of the models the gateway is known to serve.
pub const KNOWN_MODELS: &[(&str, &str)] = &[
    ("Claude Opus 4.5", "claude-opus-4-5"),
    ("Gemini 3 Pro", "gemini-3-pro-preview"),
    ("GPT-4.1", "gpt-4.1"),
];

/// Headers identifying the relay as an editor plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientIdentity {
    pub integration_id: String,
    pub editor_version: String,
    pub plugin_version: String,
    pub user_agent: String,
    pub intent: String,
    pub api_version: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            integration_id: "vscode-chat".to_string(),
            editor_version: "vscode/1.97.0".to_string(),
            plugin_version: "copilot-chat/0.22.2".to_string(),
            user_agent: "GitHubCopilotChat/0.22.2".to_string(),
            intent: "conversation-panel".to_string(),
            api_version: "2023-07-07".to_string(),
        }
    }
}

/// Budget used when the catalog has no limits for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextDefaults {
    pub max_tokens: usize,
    pub reply_buffer_tokens: usize,
}

impl Default for ContextDefaults {
    fn default() -> Self {
        Self {
            max_tokens: crate::context::DEFAULT_MAX_CONTEXT_TOKENS,
            reply_buffer_tokens: crate::context::DEFAULT_REPLY_BUFFER_TOKENS,
        }
    }
}

/// Per-call timeouts, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub token_exchange_secs: u64,
    pub models_secs: u64,
    pub chat_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            token_exchange_secs: 15,
            models_secs: 30,
            chat_secs: 120,
        }
    }
}

impl Timeouts {
    pub fn token_exchange(&self) -> Duration {
        Duration::from_secs(self.token_exchange_secs)
    }

    pub fn models(&self) -> Duration {
        Duration::from_secs(self.models_secs)
    }

    pub fn chat(&self) -> Duration {
        Duration::from_secs(self.chat_secs)
    }
}

/// Endpoints, identity and defaults for talking to the Copilot gateway.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use copilot_relay::config::GatewayConfig;
///
/// let config: GatewayConfig =
///     serde_json::from_str(r#"{"claude_default_max_output": 8000}"#).unwrap();
/// assert_eq!(config.claude_default_max_output, 8000);
/// assert_eq!(config.chat_url, "https://api.githubcopilot.com/chat/completions");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub token_url: String,
    pub models_url: String,
    pub chat_url: String,
    pub messages_url: String,
    pub identity: ClientIdentity,
    pub context: ContextDefaults,
    /// `max_tokens` sent to Claude models without catalog limits.
    pub claude_default_max_output: usize,
    pub timeouts: Timeouts,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            models_url: format!("{DEFAULT_API_BASE}/models"),
            chat_url: format!("{DEFAULT_API_BASE}/chat/completions"),
            messages_url: format!("{DEFAULT_API_BASE}/v1/messages"),
            identity: ClientIdentity::default(),
            context: ContextDefaults::default(),
            claude_default_max_output: 16_000,
            timeouts: Timeouts::default(),
        }
    }
}

impl GatewayConfig {
    /// Points the catalog, chat and messages endpoints at another base URL.
    pub fn with_api_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.models_url = format!("{base}/models");
        self.chat_url = format!("{base}/chat/completions");
        self.messages_url = format!("{base}/v1/messages");
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Defaults overridden by `COPILOT_RELAY_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConfig`] when an overridden URL is not http(s).
    pub fn from_env() -> Result<Self, RelayError> {
        let mut config = Self::default();
        if let Some(base) = env_override("COPILOT_RELAY_API_BASE") {
            config = config.with_api_base(&base);
        }
        if let Some(url) = env_override("COPILOT_RELAY_TOKEN_URL") {
            config.token_url = url;
        }
        if let Some(version) = env_override("COPILOT_RELAY_EDITOR_VERSION") {
            config.identity.editor_version = version;
        }
        if let Some(version) = env_override("COPILOT_RELAY_PLUGIN_VERSION") {
            config.identity.plugin_version = version;
        }
        if let Some(agent) = env_override("COPILOT_RELAY_USER_AGENT") {
            config.identity.user_agent = agent;
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks that every endpoint is an http(s) URL.
    pub fn validate(&self) -> Result<(), RelayError> {
        for (field, url) in [
            ("token_url", &self.token_url),
            ("models_url", &self.models_url),
            ("chat_url", &self.chat_url),
            ("messages_url", &self.messages_url),
        ] {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(RelayError::InvalidConfig {
                    field: field.to_string(),
                    reason: format!("expected an http(s) URL, got `{url}`"),
                });
            }
        }
        Ok(())
    }

    /// Headers attached to catalog and chat calls.
    pub fn gateway_headers(&self, bearer: &str) -> HashMap<String, String> {
        let identity = &self.identity;
        HashMap::from([
            ("Authorization".to_string(), format!("Bearer {bearer}")),
            ("Content-Type".to_string(), "application/json".to_string()),
            (
                "Copilot-Integration-Id".to_string(),
                identity.integration_id.clone(),
            ),
            ("Editor-Version".to_string(), identity.editor_version.clone()),
            (
                "Editor-Plugin-Version".to_string(),
                identity.plugin_version.clone(),
            ),
            ("User-Agent".to_string(), identity.user_agent.clone()),
            ("openai-intent".to_string(), identity.intent.clone()),
            ("x-github-api-version".to_string(), identity.api_version.clone()),
        ])
    }

    /// Headers attached to the bearer token exchange.
    pub fn exchange_headers(&self, credential: &Credential) -> HashMap<String, String> {
        let identity = &self.identity;
        HashMap::from([
            (
                "Authorization".to_string(),
                format!("token {}", credential.expose()),
            ),
            ("Accept".to_string(), "application/json".to_string()),
            ("Editor-Version".to_string(), identity.editor_version.clone()),
            (
                "Editor-Plugin-Version".to_string(),
                identity.plugin_version.clone(),
            ),
            ("User-Agent".to_string(), identity.user_agent.clone()),
        ])
    }
}

fn env_override(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_gateway_endpoints() {
        let config = GatewayConfig::default();
        assert_eq!(config.models_url, "https://api.githubcopilot.com/models");
        assert_eq!(config.messages_url, "https://api.githubcopilot.com/v1/messages");
        assert_eq!(config.context.max_tokens, 8192);
        assert_eq!(config.context.reply_buffer_tokens, 1024);
        assert_eq!(config.timeouts.chat(), Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn with_api_base_trims_trailing_slash() {
        let config = GatewayConfig::default().with_api_base("http://localhost:8080/");
        assert_eq!(config.chat_url, "http://localhost:8080/chat/completions");
        assert_eq!(config.messages_url, "http://localhost:8080/v1/messages");
    }

    #[test]
    fn validate_rejects_non_http_urls() {
        let config = GatewayConfig::default().with_token_url("ftp://example.com/token");
        match config.validate() {
            Err(RelayError::InvalidConfig { field, .. }) => assert_eq!(field, "token_url"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn gateway_headers_carry_identity_and_bearer() {
        let headers = GatewayConfig::default().gateway_headers("tid=abc");
        assert_eq!(headers["Authorization"], "Bearer tid=abc");
        assert_eq!(headers["Copilot-Integration-Id"], "vscode-chat");
        assert_eq!(headers["Editor-Version"], "vscode/1.97.0");
        assert_eq!(headers["Editor-Plugin-Version"], "copilot-chat/0.22.2");
        assert_eq!(headers["User-Agent"], "GitHubCopilotChat/0.22.2");
        assert_eq!(headers["openai-intent"], "conversation-panel");
        assert_eq!(headers["x-github-api-version"], "2023-07-07");
    }

    #[test]
    fn exchange_headers_use_token_scheme() {
        let credential = Credential::new("ghu_example");
        let headers = GatewayConfig::default().exchange_headers(&credential);
        assert_eq!(headers["Authorization"], "token ghu_example");
        assert_eq!(headers["Accept"], "application/json");
    }

    #[test]
    fn known_models_use_gateway_ids() {
        assert!(KNOWN_MODELS.contains(&("Claude Opus 4.5", "claude-opus-4-5")));
        assert_eq!(KNOWN_MODELS.len(), 3);
    }
}
