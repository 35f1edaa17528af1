// src/ingest/config.rs
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_days_lookback() -> i64 {
    2
}
fn default_max_entries() -> usize {
    15
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/feeds")
}
fn default_cache_ttl_secs() -> u64 {
    3_600
}
fn default_user_agent() -> String {
    "tech-news-curator/0.1 (RSS aggregator)".to_string()
}

/// `[ingest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Entries published before `now - days_lookback` are ignored.
    #[serde(default = "default_days_lookback")]
    pub days_lookback: i64,
    #[serde(default = "default_max_entries")]
    pub max_entries_per_feed: usize,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Cached feed bodies younger than this are used instead of the network.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            days_lookback: default_days_lookback(),
            max_entries_per_feed: default_max_entries(),
            cache_dir: default_cache_dir(),
            cache_ttl_secs: default_cache_ttl_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// One `[[feeds]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSpec {
    pub url: String,
    pub source: String,
    /// Trust coefficient of this source in [0, 1].
    #[serde(default)]
    pub weight: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_entries_parse_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            feeds: Vec<FeedSpec>,
            #[serde(default)]
            ingest: IngestConfig,
        }
        let doc: Doc = toml::from_str(
            r#"
[[feeds]]
url = "https://www.cisa.gov/uscert/ncas/current-activity.xml"
source = "CISA"
weight = 0.9

[[feeds]]
url = "https://web.dev/feed.xml"
source = "Web.dev"
"#,
        )
        .unwrap();
        assert_eq!(doc.feeds.len(), 2);
        assert_eq!(doc.feeds[0].weight, Some(0.9));
        assert_eq!(doc.feeds[1].weight, None);
        assert_eq!(doc.ingest.days_lookback, 2);
        assert_eq!(doc.ingest.max_entries_per_feed, 15);
    }
}
