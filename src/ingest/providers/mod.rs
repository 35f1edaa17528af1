// src/ingest/providers/mod.rs
pub mod rss;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::ingest::cache::FeedCache;
use crate::ingest::config::{FeedSpec, IngestConfig};
use crate::ingest::types::{FeedProvider, RawItem};

pub use rss::{parse_feed, FeedSnapshot};

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

/// One configured RSS/Atom feed.
pub struct RssFeedProvider {
    source: String,
    mode: Mode,
    cache: Option<FeedCache>,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl RssFeedProvider {
    /// Provider over a fixed document (tests, offline runs).
    pub fn from_fixture(source: impl Into<String>, body: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source: source.into(),
            mode: Mode::Fixture(body.into()),
            cache: None,
            max_entries: usize::MAX,
            clock,
        }
    }

    pub fn from_spec(
        spec: &FeedSpec,
        client: reqwest::Client,
        cache: Option<FeedCache>,
        max_entries: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source: spec.source.clone(),
            mode: Mode::Http {
                url: spec.url.clone(),
                client,
            },
            cache,
            max_entries,
            clock,
        }
    }

    pub fn with_max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Fresh cache entry, else network, else a stale cache entry.
    async fn snapshot(&self) -> Result<FeedSnapshot> {
        let now = self.clock.now();
        let (url, client) = match &self.mode {
            Mode::Fixture(body) => return Ok(FeedSnapshot::live(&self.source, body.as_str(), now)),
            Mode::Http { url, client } => (url, client),
        };

        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get_fresh(url, now)) {
            tracing::debug!(source = %self.source, "feed served from cache");
            return Ok(FeedSnapshot::cached(&self.source, hit.body, hit.fetched_at));
        }

        let fetched = async {
            let resp = client.get(url.as_str()).send().await?.error_for_status()?;
            resp.text().await
        }
        .await;

        match fetched {
            Ok(body) => {
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache.put(url, &body, now) {
                        tracing::warn!(error = ?e, source = %self.source, "feed cache write failed");
                    }
                }
                Ok(FeedSnapshot::live(&self.source, body, now))
            }
            Err(e) => {
                counter!("ingest_provider_errors_total").increment(1);
                match self.cache.as_ref().and_then(|c| c.get(url)) {
                    Some(stale) => {
                        tracing::warn!(error = ?e, source = %self.source, "feed fetch failed, using stale cache");
                        Ok(FeedSnapshot::cached(&self.source, stale.body, stale.fetched_at))
                    }
                    None => Err(e).with_context(|| format!("fetching feed {url}")),
                }
            }
        }
    }
}

#[async_trait]
impl FeedProvider for RssFeedProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawItem>> {
        let mut items = self.snapshot().await?.items()?;
        items.truncate(self.max_entries);
        Ok(items)
    }

    fn name(&self) -> &str {
        &self.source
    }
}

/// One provider per `[[feeds]]` entry, sharing an HTTP client and the feed cache.
pub fn providers_from_config(
    feeds: &[FeedSpec],
    cfg: &IngestConfig,
    clock: Arc<dyn Clock>,
) -> Result<Vec<Box<dyn FeedProvider>>> {
    let client = reqwest::Client::builder()
        .user_agent(cfg.user_agent.clone())
        .timeout(Duration::from_secs(30))
        .build()
        .context("building feed http client")?;
    let cache = FeedCache::new(&cfg.cache_dir, cfg.cache_ttl_secs);
    Ok(feeds
        .iter()
        .map(|f| {
            Box::new(RssFeedProvider::from_spec(
                f,
                client.clone(),
                Some(cache.clone()),
                cfg.max_entries_per_feed,
                clock.clone(),
            )) as Box<dyn FeedProvider>
        })
        .collect())
}
