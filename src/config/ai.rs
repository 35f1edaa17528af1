// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::env;

pub const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";

fn default_enabled() -> bool {
    true
}
fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_model() -> String {
    "claude-3-haiku-20240307".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_min_interval_ms() -> u64 {
    1_000
}
fn default_cache_ttl_secs() -> u64 {
    3_600
}
fn default_retry_delay_ms() -> u64 {
    5_000
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_categorize_batch_size() -> usize {
    20
}
fn default_summarize_batch_size() -> usize {
    10
}

/// `[ai]` section: text-completion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// "anthropic" | "mock" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from ANTHROPIC_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,
    /// Floor between two consecutive backend calls.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Wait before the single retry after a rate-limit response.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_categorize_batch_size")]
    pub categorize_batch_size: usize,
    #[serde(default = "default_summarize_batch_size")]
    pub summarize_batch_size: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            provider: default_provider(),
            model: default_model(),
            api_key: default_api_key(),
            min_interval_ms: default_min_interval_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            categorize_batch_size: default_categorize_batch_size(),
            summarize_batch_size: default_summarize_batch_size(),
        }
    }
}

impl AiConfig {
    /// Normalize provider name and batch sizes after deserialization.
    pub fn sanitize(&mut self) {
        self.provider = self.provider.trim().to_lowercase();
        self.categorize_batch_size = self.categorize_batch_size.max(1);
        self.summarize_batch_size = self.summarize_batch_size.max(1);
    }

    /// The usable API key, if any. `"ENV"` resolves through [`ENV_API_KEY`].
    /// A missing key is not an error: the backend is simply unavailable.
    pub fn resolve_api_key(&self) -> Option<String> {
        let raw = if self.api_key.trim().eq_ignore_ascii_case("env") {
            env::var(ENV_API_KEY).ok()?
        } else {
            self.api_key.clone()
        };
        let key = raw.trim().to_string();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let mut cfg: AiConfig = toml::from_str(r#"provider = " Anthropic ""#).unwrap();
        cfg.sanitize();
        assert_eq!(cfg.provider, "anthropic");
        assert!(cfg.enabled);
        assert_eq!(cfg.min_interval_ms, 1_000);
        assert_eq!(cfg.categorize_batch_size, 20);
    }

    #[test]
    fn literal_key_is_used_verbatim() {
        let cfg = AiConfig {
            api_key: " sk-test ".into(),
            ..AiConfig::default()
        };
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("sk-test"));
    }

    #[serial_test::serial]
    #[test]
    fn env_key_resolution() {
        let prev = env::var(ENV_API_KEY).ok();
        let cfg = AiConfig::default();

        env::remove_var(ENV_API_KEY);
        assert_eq!(cfg.resolve_api_key(), None);

        env::set_var(ENV_API_KEY, "from-env");
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("from-env"));

        match prev {
            Some(v) => env::set_var(ENV_API_KEY, v),
            None => env::remove_var(ENV_API_KEY),
        }
    }
}
