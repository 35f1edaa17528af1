//! Text-completion backend: provider abstraction + response cache + rate limiter.
//!
//! Layers:
//! - [`Provider`] does one real remote call (Anthropic Messages API, or a scripted mock).
//! - [`CompletionClient`] wraps a provider with an in-memory TTL cache, a minimum-interval
//!   rate limiter, usage counters and exactly one retry after a rate-limit response.
//! - [`Completion`] is what pipeline stages consume. [`DisabledClient`] is returned when the
//!   backend is unavailable; every call then short-circuits with
//!   [`BackendError::Unavailable`] without touching the network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::AiConfig;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend unavailable")]
    Unavailable,
    #[error("backend rate limited")]
    RateLimited,
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Usage counters owned by one client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub total_calls: u64,
    pub cache_hits: u64,
    pub errors: u64,
    /// Rough estimate: whitespace-separated words of prompt + response.
    pub total_tokens_used: u64,
}

/// Capability used by the pipeline stages.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, BackendError>;
    /// `false` means every call would fail with `Unavailable`; callers skip straight to
    /// their fallback.
    fn is_available(&self) -> bool;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
    fn stats(&self) -> UsageStats {
        UsageStats::default()
    }
}

/// Convenient alias used by callers.
pub type DynCompletion = Arc<dyn Completion>;

/// Factory: build a client according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock client.
/// * Else if `config.enabled == false`, returns a disabled client.
/// * Else builds the real provider wrapped with caching + rate limiting. A missing API key
///   or an unknown provider yields a disabled client (logged once, here).
pub fn build_client(config: &AiConfig, clock: Arc<dyn Clock>) -> DynCompletion {
    let options = ClientOptions::from_config(config);

    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        info!("AI_TEST_MODE=mock: using deterministic mock backend");
        return Arc::new(CompletionClient::new(
            MockProvider::fixed("(mock)"),
            options,
            clock,
        ));
    }

    if !config.enabled {
        info!("text-completion backend disabled in config");
        return Arc::new(DisabledClient);
    }

    match config.provider.as_str() {
        "anthropic" => {
            let Some(api_key) = config.resolve_api_key() else {
                warn!("no API key for backend; running on heuristics only");
                return Arc::new(DisabledClient);
            };
            match AnthropicProvider::new(
                api_key,
                &config.model,
                Duration::from_secs(config.request_timeout_secs),
            ) {
                Ok(provider) => {
                    info!(model = %config.model, "text-completion backend available");
                    Arc::new(CompletionClient::new(provider, options, clock))
                }
                Err(e) => {
                    warn!(error = %e, "could not build backend http client");
                    Arc::new(DisabledClient)
                }
            }
        }
        "mock" => Arc::new(CompletionClient::new(
            MockProvider::fixed("(mock)"),
            options,
            clock,
        )),
        other => {
            warn!(provider = other, "unsupported backend provider");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider: does a *real* remote call. Separated so the same caching wrapper
/// serves production and tests.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    async fn fetch(&self, prompt: &str, max_tokens: u32) -> Result<String, BackendError>;
    fn name(&self) -> &'static str;
    fn model(&self) -> &str;
}

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("tech-news-curator/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_key,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn fetch(&self, prompt: &str, max_tokens: u32) -> Result<String, BackendError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            messages: Vec<Msg<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            content: Vec<Block>,
        }
        #[derive(Deserialize)]
        struct Block {
            #[serde(default)]
            text: Option<String>,
        }

        let req = Req {
            model: &self.model,
            max_tokens,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .http
            .post(ANTHROPIC_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&req)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        body.content
            .into_iter()
            .find_map(|b| b.text)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BackendError::Malformed("empty content".to_string()))
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

type Responder = dyn Fn(&str, u32) -> Result<String, BackendError> + Send + Sync;

/// Scripted provider for tests/local runs.
#[derive(Clone)]
pub struct MockProvider {
    responder: Arc<Responder>,
}

impl MockProvider {
    /// Always answers `text`.
    pub fn fixed(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::from_fn(move |_, _| Ok(text.clone()))
    }

    /// Answers whatever `f(prompt, max_tokens)` returns.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&str, u32) -> Result<String, BackendError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(f),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn fetch(&self, prompt: &str, max_tokens: u32) -> Result<String, BackendError> {
        (self.responder)(prompt, max_tokens)
    }
    fn name(&self) -> &'static str {
        "mock"
    }
    fn model(&self) -> &str {
        "mock"
    }
}

/// Always unavailable; used when the backend is disabled or misconfigured.
pub struct DisabledClient;

#[async_trait]
impl Completion for DisabledClient {
    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String, BackendError> {
        Err(BackendError::Unavailable)
    }
    fn is_available(&self) -> bool {
        false
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

// ------------------------------------------------------------
// Caching client wrapper (cache + rate limit + retry)
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    pub min_interval: Duration,
    pub cache_ttl: Duration,
    pub retry_delay: Duration,
}

impl ClientOptions {
    pub fn from_config(cfg: &AiConfig) -> Self {
        Self {
            min_interval: Duration::from_millis(cfg.min_interval_ms),
            cache_ttl: Duration::from_secs(cfg.cache_ttl_secs),
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_config(&AiConfig::default())
    }
}

/// Blocks the caller until at least `min_interval` has passed since the previous call.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let sleep_for = {
            let last = self.last_call.lock().unwrap_or_else(|e| e.into_inner());
            match *last {
                Some(t) => self.min_interval.saturating_sub(t.elapsed()),
                None => Duration::ZERO,
            }
        };
        if !sleep_for.is_zero() {
            debug!(sleep_ms = sleep_for.as_millis() as u64, "rate limiting backend call");
            tokio::time::sleep(sleep_for).await;
        }
        *self.last_call.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: String,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ClientState {
    cache: HashMap<String, CacheEntry>,
    stats: UsageStats,
}

/// Single owner of the response cache and usage counters. Calls are expected to be issued
/// sequentially; the mutex only satisfies `Sync` and is never held across an await.
pub struct CompletionClient<P: Provider> {
    inner: P,
    options: ClientOptions,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    state: Mutex<ClientState>,
}

impl<P: Provider> CompletionClient<P> {
    pub fn new(inner: P, options: ClientOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            limiter: RateLimiter::new(options.min_interval),
            options,
            clock,
            state: Mutex::new(ClientState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn clear_cache(&self) {
        self.state().cache.clear();
        info!("backend response cache cleared");
    }

    /// Number of live or not-yet-evicted cache entries.
    pub fn cache_len(&self) -> usize {
        self.state().cache.len()
    }

    /// Like [`Completion::complete`], optionally bypassing the cache.
    pub async fn complete_with(
        &self,
        prompt: &str,
        max_tokens: u32,
        use_cache: bool,
    ) -> Result<String, BackendError> {
        let key = cache_key(prompt, max_tokens, self.inner.model());

        // 1) Cache lookup; expired entries are evicted here.
        if use_cache {
            let now = self.clock.now();
            let mut st = self.state();
            let cached = st
                .cache
                .get(&key)
                .map(|e| (e.response.clone(), e.stored_at));
            match cached {
                Some((hit, stored_at)) if is_fresh(stored_at, now, self.options.cache_ttl) => {
                    st.stats.cache_hits += 1;
                    debug!("backend cache hit");
                    return Ok(hit);
                }
                Some(_) => {
                    st.cache.remove(&key);
                }
                None => {}
            }
        }

        // 2) Rate limit, then the real call.
        self.limiter.wait().await;
        self.state().stats.total_calls += 1;

        let result = match self.inner.fetch(prompt, max_tokens).await {
            Err(BackendError::RateLimited) => {
                warn!(
                    delay_ms = self.options.retry_delay.as_millis() as u64,
                    "backend rate limited, retrying once"
                );
                tokio::time::sleep(self.options.retry_delay).await;
                self.inner.fetch(prompt, max_tokens).await
            }
            other => other,
        };

        // 3) Bookkeeping.
        let mut st = self.state();
        match &result {
            Ok(text) => {
                st.stats.total_tokens_used +=
                    (prompt.split_whitespace().count() + text.split_whitespace().count()) as u64;
                if use_cache {
                    st.cache.insert(
                        key,
                        CacheEntry {
                            response: text.clone(),
                            stored_at: self.clock.now(),
                        },
                    );
                }
                debug!(chars = text.len(), "backend call ok");
            }
            Err(e) => {
                st.stats.errors += 1;
                warn!(provider = self.inner.name(), error = %e, "backend call failed");
            }
        }
        result
    }
}

#[async_trait]
impl<P: Provider> Completion for CompletionClient<P> {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, BackendError> {
        self.complete_with(prompt, max_tokens, true).await
    }
    fn is_available(&self) -> bool {
        true
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
    fn stats(&self) -> UsageStats {
        self.state().stats
    }
}

fn is_fresh(stored_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    let age = now - stored_at;
    match age.to_std() {
        Ok(age) => age < ttl,
        // Stored "in the future" (clock moved back): treat as fresh.
        Err(_) => true,
    }
}

fn cache_key(prompt: &str, max_tokens: u32, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(max_tokens.to_string().as_bytes());
    hasher.update(model.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;

    fn fast() -> ClientOptions {
        ClientOptions {
            min_interval: Duration::ZERO,
            cache_ttl: Duration::from_secs(3600),
            retry_delay: Duration::ZERO,
        }
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2025, 8, 12, 9, 0, 0).unwrap()))
    }

    #[test]
    fn cache_key_depends_on_all_parts() {
        let k = cache_key("p", 10, "m");
        assert_ne!(k, cache_key("p", 11, "m"));
        assert_ne!(k, cache_key("q", 10, "m"));
        assert_ne!(k, cache_key("p", 10, "n"));
        assert_eq!(k, cache_key("p", 10, "m"));
    }

    #[tokio::test]
    async fn disabled_client_short_circuits() {
        let c = DisabledClient;
        assert!(!c.is_available());
        assert_eq!(c.complete("x", 5).await, Err(BackendError::Unavailable));
    }

    #[tokio::test]
    async fn errors_are_counted_not_cached() {
        let c = CompletionClient::new(
            MockProvider::from_fn(|_, _| Err(BackendError::Status { status: 500, body: "boom".into() })),
            fast(),
            clock(),
        );
        assert!(c.complete("x", 5).await.is_err());
        assert!(c.complete("x", 5).await.is_err());
        let s = c.stats();
        assert_eq!(s.total_calls, 2);
        assert_eq!(s.errors, 2);
        assert_eq!(c.cache_len(), 0);
    }

    #[tokio::test]
    async fn bypassing_cache_always_calls() {
        let c = CompletionClient::new(MockProvider::fixed("ok"), fast(), clock());
        c.complete_with("x", 5, false).await.unwrap();
        c.complete_with("x", 5, false).await.unwrap();
        assert_eq!(c.stats().total_calls, 2);
        assert_eq!(c.stats().cache_hits, 0);
    }
}
