//! Bearer token lifecycle.
//!
//! The gateway does not accept the long-lived GitHub credential directly. It is exchanged
//! for a bearer token that expires after roughly half an hour; [`TokenBroker`] keeps one
//! valid token around and makes sure concurrent callers share a single exchange.

use std::env;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::DynClock;
use crate::config::GatewayConfig;
use crate::error::{RESPONSE_BODY_LIMIT, RelayError, truncate_chars};
use crate::http::{DynHttpTransport, HttpRequest};

/// Tokens closer than this to their expiry are refreshed before use.
pub const REFRESH_MARGIN_SECS: u64 = 60;

const CREDENTIAL_ENV: &str = "GITHUB_TOKEN";
const FORBIDDEN_HINT: &str =
    "the account may lack an active Copilot subscription or the credential may be missing required scopes";

/// Long-lived GitHub credential used to obtain bearer tokens.
///
/// `Debug` only shows a short prefix:
///
/// ```
/// use copilot_relay::auth::Credential;
///
/// let credential = Credential::new("ghu_abcdefghijklmnop");
/// assert_eq!(format!("{credential:?}"), "Credential(ghu_****)");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    /// Reads the credential from `GITHUB_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConfig`] when the variable is unset or blank.
    pub fn from_env() -> Result<Self, RelayError> {
        match env::var(CREDENTIAL_ENV) {
            Ok(value) if !value.trim().is_empty() => Ok(Self::new(value)),
            _ => Err(RelayError::InvalidConfig {
                field: CREDENTIAL_ENV.to_string(),
                reason: "environment variable is not set".to_string(),
            }),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "Credential({prefix}****)")
    }
}

/// Bearer token and its expiry in unix seconds.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenCredential {
    pub bearer_token: String,
    pub expires_at: u64,
}

impl TokenCredential {
    /// Whether the token can be used at `now` without refreshing.
    pub fn is_fresh(&self, now: u64) -> bool {
        !self.bearer_token.is_empty() && now < self.expires_at.saturating_sub(REFRESH_MARGIN_SECS)
    }
}

impl fmt::Debug for TokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCredential")
            .field("bearer_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    token: Option<String>,
    #[serde(default)]
    expires_at: u64,
}

/// Keeps a bearer token valid and single-flights the exchange.
pub struct TokenBroker {
    transport: DynHttpTransport,
    clock: DynClock,
    credential: Credential,
    config: Arc<GatewayConfig>,
    state: RwLock<TokenCredential>,
    refresh_lock: Mutex<()>,
}

impl TokenBroker {
    pub fn new(
        transport: DynHttpTransport,
        clock: DynClock,
        credential: Credential,
        config: Arc<GatewayConfig>,
    ) -> Self {
        Self {
            transport,
            clock,
            credential,
            config,
            state: RwLock::new(TokenCredential::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Returns a bearer token that is valid for at least [`REFRESH_MARGIN_SECS`].
    ///
    /// Callers arriving while an exchange is in flight wait for it and reuse its result.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Auth`] when the exchange fails.
    pub async fn ensure_valid(&self) -> Result<String, RelayError> {
        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(token) = self.fresh_token() {
            debug!("bearer token refreshed by a concurrent caller");
            return Ok(token);
        }

        let refreshed = self.exchange().await?;
        let bearer = refreshed.bearer_token.clone();
        *self.state.write() = refreshed;
        Ok(bearer)
    }

    /// Current bearer token, possibly empty or stale.
    pub fn token(&self) -> String {
        self.state.read().bearer_token.clone()
    }

    pub fn snapshot(&self) -> TokenCredential {
        self.state.read().clone()
    }

    fn fresh_token(&self) -> Option<String> {
        let now = self.clock.now_unix_seconds();
        let state = self.state.read();
        state.is_fresh(now).then(|| state.bearer_token.clone())
    }

    async fn exchange(&self) -> Result<TokenCredential, RelayError> {
        let endpoint = self.config.token_url.clone();
        if self.credential.is_empty() {
            return Err(RelayError::Auth {
                message: "no GitHub credential configured".to_string(),
                status: None,
                endpoint,
                body: String::new(),
            });
        }

        let request = HttpRequest::get(endpoint.clone())
            .with_headers(self.config.exchange_headers(&self.credential))
            .with_timeout(self.config.timeouts.token_exchange());

        let response = self.transport.send(request).await.map_err(|err| {
            warn!(error = %err, "bearer token exchange did not complete");
            RelayError::Auth {
                message: format!("token exchange failed: {err}"),
                status: None,
                endpoint: endpoint.clone(),
                body: String::new(),
            }
        })?;

        let body = response.text_lossy();
        if !response.is_success() {
            let mut message = format!("token exchange returned HTTP {}", response.status);
            if response.status == 403 {
                message.push_str(&format!("; {FORBIDDEN_HINT}"));
            }
            warn!(status = response.status, "bearer token exchange rejected");
            return Err(RelayError::Auth {
                message,
                status: Some(response.status),
                endpoint,
                body: truncate_chars(&body, RESPONSE_BODY_LIMIT),
            });
        }

        let parsed: ExchangeResponse = serde_json::from_str(&body).map_err(|err| RelayError::Auth {
            message: format!("token exchange body is not valid JSON: {err}"),
            status: Some(response.status),
            endpoint: endpoint.clone(),
            body: truncate_chars(&body, RESPONSE_BODY_LIMIT),
        })?;

        match parsed.token.filter(|token| !token.is_empty()) {
            Some(bearer_token) => {
                info!(expires_at = parsed.expires_at, "obtained Copilot bearer token");
                Ok(TokenCredential {
                    bearer_token,
                    expires_at: parsed.expires_at,
                })
            }
            None => Err(RelayError::Auth {
                message: "token exchange response has no token".to_string(),
                status: Some(response.status),
                endpoint,
                body: truncate_chars(&body, RESPONSE_BODY_LIMIT),
            }),
        }
    }
}

impl fmt::Debug for TokenBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBroker")
            .field("credential", &self.credential)
            .field("state", &*self.state.read())
            .finish()
    }
}
