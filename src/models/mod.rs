use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::error::extract_error_detail;
use crate::http::{DynHttpTransport, HttpRequest};
use crate::types::ModelLimits;

mod aliases;

pub use aliases::model_aliases;

const DEFAULT_CONTEXT_WINDOW: usize = 8192;
const DEFAULT_PROMPT_TOKENS: usize = 8192;
const DEFAULT_OUTPUT_TOKENS: usize = 1024;

/// Result of a catalog refresh. A failed refresh leaves the cache untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Number of catalog entries that carried limits.
    Updated { models: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, Default)]
struct LimitsCache {
    entries: HashMap<String, ModelLimits>,
    canonical: BTreeSet<String>,
}

impl LimitsCache {
    fn insert(&mut self, model_id: &str, limits: ModelLimits) {
        self.entries.insert(model_id.to_string(), limits);
        self.canonical.insert(model_id.to_string());
        for alias in model_aliases(model_id) {
            if !self.canonical.contains(&alias) {
                self.entries.insert(alias, limits);
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    capabilities: Option<CatalogCapabilities>,
}

#[derive(Debug, Deserialize)]
struct CatalogCapabilities {
    #[serde(default)]
    limits: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogLimits {
    max_context_window_tokens: Option<usize>,
    max_prompt_tokens: Option<usize>,
    max_output_tokens: Option<usize>,
}

impl CatalogLimits {
    /// Reads the known fields of a non-empty `limits` object; other keys are ignored.
    fn from_map(model_id: &str, limits: Map<String, Value>) -> Self {
        serde_json::from_value(Value::Object(limits)).unwrap_or_else(|err| {
            debug!(model = model_id, error = %err, "unreadable limit fields, using defaults");
            Self::default()
        })
    }

    fn resolve(&self) -> ModelLimits {
        ModelLimits {
            max_context_window_tokens: self
                .max_context_window_tokens
                .unwrap_or(DEFAULT_CONTEXT_WINDOW),
            max_prompt_tokens: self.max_prompt_tokens.unwrap_or(DEFAULT_PROMPT_TOKENS),
            max_output_tokens: self.max_output_tokens.unwrap_or(DEFAULT_OUTPUT_TOKENS),
        }
    }
}

/// Per-model token limits fetched from the gateway catalog.
///
/// Lookups never touch the network. A refresh adds or overwrites entries but never removes
/// them; the updated cache is swapped in whole, so a reader never sees a half-applied catalog.
pub struct ModelLimitsRegistry {
    transport: DynHttpTransport,
    config: Arc<GatewayConfig>,
    cache: RwLock<Arc<LimitsCache>>,
}

impl ModelLimitsRegistry {
    pub fn new(transport: DynHttpTransport, config: Arc<GatewayConfig>) -> Self {
        Self {
            transport,
            config,
            cache: RwLock::new(Arc::new(LimitsCache::default())),
        }
    }

    /// Fetches the catalog and merges its limits into the cache.
    ///
    /// Failures are logged and reported as [`RefreshOutcome::Failed`]; they never
    /// propagate as errors.
    pub async fn refresh(&self, bearer: &str) -> RefreshOutcome {
        let endpoint = self.config.models_url.as_str();
        let request = HttpRequest::get(endpoint)
            .with_headers(self.config.gateway_headers(bearer))
            .with_timeout(self.config.timeouts.models());

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(err) => return self.failed(format!("network error: {err}")),
        };
        let body = response.text_lossy();
        if !response.is_success() {
            return self.failed(format!(
                "HTTP {} from {endpoint}: {}",
                response.status,
                extract_error_detail(&body)
            ));
        }

        let value: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(err) => return self.failed(format!("undecodable catalog body: {err}")),
        };
        let entries = match value {
            Value::Object(mut object) if object.contains_key("data") => {
                object.remove("data").unwrap_or(Value::Null)
            }
            Value::Array(list) => Value::Array(list),
            other => {
                return self.failed(format!(
                    "unexpected catalog format: {}",
                    json_kind(&other)
                ));
            }
        };
        let entries: Vec<Value> = match entries {
            Value::Array(list) => list,
            other => {
                return self.failed(format!(
                    "unexpected catalog `data` format: {}",
                    json_kind(&other)
                ));
            }
        };

        debug!(count = entries.len(), "model catalog returned entries");
        let mut fetched = Vec::new();
        for raw in entries {
            let entry: CatalogEntry = match serde_json::from_value(raw) {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(error = %err, "skipping unreadable catalog entry");
                    continue;
                }
            };
            let Some(limits) = entry
                .capabilities
                .and_then(|caps| caps.limits)
                .filter(|limits| !limits.is_empty())
            else {
                debug!(model = %entry.id, "catalog entry has no limits");
                continue;
            };
            if entry.id.is_empty() {
                continue;
            }
            let resolved = CatalogLimits::from_map(&entry.id, limits).resolve();
            info!(
                model = %entry.id,
                context = resolved.max_context_window_tokens,
                prompt = resolved.max_prompt_tokens,
                output = resolved.max_output_tokens,
                "model limits"
            );
            fetched.push((entry.id, resolved));
        }

        let models = fetched.len();
        let mut cache = self.cache.write();
        let mut next = LimitsCache::clone(&cache);
        for (model_id, limits) in &fetched {
            next.insert(model_id, *limits);
        }
        *cache = Arc::new(next);
        RefreshOutcome::Updated { models }
    }

    pub fn lookup(&self, model_id: &str) -> Option<ModelLimits> {
        self.cache.read().entries.get(model_id).copied()
    }

    /// Cached ids, aliases included, sorted.
    pub fn known_ids(&self) -> Vec<String> {
        let cache = Arc::clone(&self.cache.read());
        let mut ids: Vec<String> = cache.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn failed(&self, reason: String) -> RefreshOutcome {
        warn!(
            endpoint = %self.config.models_url,
            reason = %reason,
            "failed to fetch model list, keeping cached limits"
        );
        RefreshOutcome::Failed { reason }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(prompt: usize) -> ModelLimits {
        ModelLimits {
            max_context_window_tokens: prompt * 2,
            max_prompt_tokens: prompt,
            max_output_tokens: 100,
        }
    }

    #[test]
    fn aliases_never_shadow_canonical_entries() {
        let mut cache = LimitsCache::default();
        cache.insert("gpt-4-1", limits(10));
        cache.insert("gpt-4.1", limits(20));
        cache.insert("gpt.4.1", limits(30));

        assert_eq!(cache.entries["gpt-4-1"].max_prompt_tokens, 10);
        assert_eq!(cache.entries["gpt-4.1"].max_prompt_tokens, 20);
        assert_eq!(cache.entries["gpt.4.1"].max_prompt_tokens, 30);
    }

    #[test]
    fn missing_limit_fields_use_defaults() {
        let partial: CatalogLimits =
            serde_json::from_str(r#"{"max_prompt_tokens": 64000}"#).expect("limits");
        let resolved = partial.resolve();
        assert_eq!(resolved.max_prompt_tokens, 64000);
        assert_eq!(resolved.max_context_window_tokens, 8192);
        assert_eq!(resolved.max_output_tokens, 1024);
    }

    #[test]
    fn limits_without_known_fields_fall_back_to_defaults() {
        let map: Map<String, Value> =
            serde_json::from_str(r#"{"max_inputs": 512}"#).expect("map");
        assert_eq!(
            CatalogLimits::from_map("text-embedding-3-small", map).resolve(),
            ModelLimits {
                max_context_window_tokens: 8192,
                max_prompt_tokens: 8192,
                max_output_tokens: 1024,
            }
        );
    }
}
