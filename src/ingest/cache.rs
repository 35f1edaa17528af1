// src/ingest/cache.rs
//! On-disk feed body cache, one JSON file per feed URL.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::storage::write_json_atomic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedFeed {
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct FeedCache {
    dir: PathBuf,
    ttl: Duration,
}

impl FeedCache {
    pub fn new(dir: impl Into<PathBuf>, ttl_secs: u64) -> Self {
        Self {
            dir: dir.into(),
            // Capped at ten years.
            ttl: Duration::seconds(ttl_secs.min(315_360_000) as i64),
        }
    }

    fn path_for(&self, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        let key: String = digest.iter().take(16).map(|b| format!("{b:02x}")).collect();
        self.dir.join(format!("{key}.json"))
    }

    /// Any cached body for `url`, however old.
    pub fn get(&self, url: &str) -> Option<CachedFeed> {
        let raw = std::fs::read_to_string(self.path_for(url)).ok()?;
        let entry: CachedFeed = serde_json::from_str(&raw).ok()?;
        (entry.url == url).then_some(entry)
    }

    /// Cached body younger than the TTL.
    pub fn get_fresh(&self, url: &str, now: DateTime<Utc>) -> Option<CachedFeed> {
        self.get(url).filter(|e| now - e.fetched_at < self.ttl)
    }

    pub fn put(&self, url: &str, body: &str, now: DateTime<Utc>) -> Result<()> {
        let entry = CachedFeed {
            url: url.to_string(),
            fetched_at: now,
            body: body.to_string(),
        };
        write_json_atomic(&self.path_for(url), &entry)
            .with_context(|| format!("caching feed {url}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fresh_until_ttl_then_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(dir.path(), 3600);
        let t0 = Utc.with_ymd_and_hms(2025, 8, 12, 8, 0, 0).unwrap();
        let url = "https://web.dev/feed.xml";
        assert!(cache.get(url).is_none());

        cache.put(url, "<rss/>", t0).unwrap();
        assert!(cache.get_fresh(url, t0 + Duration::minutes(59)).is_some());
        assert!(cache.get_fresh(url, t0 + Duration::minutes(61)).is_none());
        assert_eq!(cache.get(url).unwrap().body, "<rss/>");
    }
}
