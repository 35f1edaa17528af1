//! JSON article store.
//!
//! File shape: `{ "last_updated": .., "total_articles": N, "articles": [..] }`, newest first.
//! Saving merges new URLs in front of what is already stored; loading never fails (an
//! unreadable file reads as empty).

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::item::{Item, MAX_TAGS};

fn default_data_dir() -> PathBuf {
    PathBuf::from("_data")
}
fn default_news_file() -> String {
    "news.json".to_string()
}
fn default_retention_days() -> i64 {
    30
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_news_file")]
    pub news_file: String,
    /// Articles older than this are pruned after each save.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            news_file: default_news_file(),
            retention_days: default_retention_days(),
        }
    }
}

/// Serialize to `<path>.tmp`, then rename over `path`. Parent directories are created.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("serializing JSON")?;
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    f.write_all(json.as_bytes())?;
    f.sync_all()?;
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArticle {
    pub title: String,
    pub url: String,
    pub source: String,
    pub category: String,
    pub published: DateTime<Utc>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub score: f64,
}

impl From<&Item> for StoredArticle {
    fn from(it: &Item) -> Self {
        Self {
            title: it.title.clone(),
            url: it.url.clone(),
            source: it.source.clone(),
            category: it.category.clone(),
            published: it.published,
            summary: it.summary.clone(),
            tags: it.tags.iter().take(MAX_TAGS).cloned().collect(),
            score: (it.score * 1000.0).round() / 1000.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsFile {
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_articles: usize,
    #[serde(default)]
    pub articles: Vec<StoredArticle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    pub added: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_articles: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

pub struct ArticleStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl ArticleStore {
    pub fn new(config: &StorageConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: config.data_dir.join(&config.news_file),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Empty on a missing or unreadable file.
    pub fn load(&self) -> NewsFile {
        if !self.path.exists() {
            return NewsFile::default();
        }
        let parsed = fs::read_to_string(&self.path)
            .map_err(anyhow::Error::from)
            .and_then(|s| serde_json::from_str::<NewsFile>(&s).map_err(anyhow::Error::from));
        match parsed {
            Ok(f) => f,
            Err(e) => {
                warn!(error = ?e, path = %self.path.display(), "news file unreadable, treating as empty");
                NewsFile::default()
            }
        }
    }

    /// Merges `items` into the stored articles (new URLs only) and rewrites the file.
    pub fn save(&self, items: &[Item]) -> Result<SaveOutcome> {
        let existing = self.load().articles;
        let known: HashSet<&str> = existing.iter().map(|a| a.url.as_str()).collect();

        let mut seen_new: HashSet<&str> = HashSet::new();
        let fresh: Vec<StoredArticle> = items
            .iter()
            .filter(|it| !known.contains(it.url.as_str()) && seen_new.insert(it.url.as_str()))
            .map(StoredArticle::from)
            .collect();
        let added = fresh.len();

        let mut articles = fresh;
        articles.extend(existing.iter().cloned());
        let total = self.write(articles)?;
        info!(added, total, path = %self.path.display(), "articles saved");
        Ok(SaveOutcome { added, total })
    }

    /// Drops articles published more than `days` days ago. Returns how many were removed.
    pub fn prune(&self, days: i64) -> Result<usize> {
        let current = self.load().articles;
        let cutoff = self.clock.now() - Duration::days(days.max(0));
        let before = current.len();
        let kept: Vec<StoredArticle> = current.into_iter().filter(|a| a.published >= cutoff).collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.write(kept)?;
            info!(removed, days, "old articles pruned");
        }
        Ok(removed)
    }

    pub fn stats(&self) -> StoreStats {
        let file = self.load();
        let mut s = StoreStats {
            total_articles: file.articles.len(),
            last_updated: file.last_updated,
            ..StoreStats::default()
        };
        for a in &file.articles {
            *s.by_category.entry(a.category.clone()).or_default() += 1;
            *s.by_source.entry(a.source.clone()).or_default() += 1;
            s.oldest = Some(s.oldest.map_or(a.published, |o| o.min(a.published)));
            s.newest = Some(s.newest.map_or(a.published, |n| n.max(a.published)));
        }
        s
    }

    fn write(&self, mut articles: Vec<StoredArticle>) -> Result<usize> {
        articles.sort_by(|a, b| b.published.cmp(&a.published));
        let file = NewsFile {
            last_updated: Some(self.clock.now()),
            total_articles: articles.len(),
            articles,
        };
        write_json_atomic(&self.path, &file)?;
        Ok(file.total_articles)
    }
}
