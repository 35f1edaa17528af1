//! Persisted discovery history: suggestion records keyed by name plus a chronological
//! trend list. Load failures give an empty history; save failures are returned.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

use crate::config::{Catalog, CategorySpec, Priority};
use crate::storage::write_json_atomic;

/// One discovered cluster as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySuggestion {
    pub name: String,
    pub article_count: usize,
    #[serde(default)]
    pub key_terms: Vec<String>,
    #[serde(default)]
    pub sample_titles: Vec<String>,
    pub confidence: f64,
    pub discovered_at: DateTime<Utc>,
    /// Extra fields the backend review may attach (description, rationale, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRecord {
    pub name: String,
    pub discovered: DateTime<Utc>,
    pub confidence: f64,
}

/// Additive catalog change proposed from history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryUpdate {
    pub action: &'static str,
    pub category: CategorySpec,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryHistory {
    #[serde(default)]
    pub patterns: BTreeMap<String, DiscoverySuggestion>,
    #[serde(default)]
    pub topics: Vec<TrendRecord>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl DiscoveryHistory {
    /// Missing or unreadable files yield an empty history.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let parsed = std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|s| serde_json::from_str::<Self>(&s).map_err(anyhow::Error::from));
        match parsed {
            Ok(h) => h,
            Err(e) => {
                warn!(error = ?e, path = %path.display(), "discovery history unreadable, starting empty");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
            .with_context(|| format!("saving discovery history to {}", path.display()))
    }

    /// Adds suggestions whose name is not yet known; existing entries are never touched.
    /// Returns the names that were added.
    pub fn record(&mut self, suggestions: &[DiscoverySuggestion], now: DateTime<Utc>) -> Vec<String> {
        let mut added = Vec::new();
        for s in suggestions {
            if self.patterns.contains_key(&s.name) {
                continue;
            }
            self.patterns.insert(s.name.clone(), s.clone());
            self.topics.push(TrendRecord {
                name: s.name.clone(),
                discovered: s.discovered_at,
                confidence: s.confidence,
            });
            added.push(s.name.clone());
        }
        self.last_updated = Some(now);
        added
    }

    /// Trend records from the last `days` days, highest confidence first, at most five.
    pub fn trending(&self, days: i64, now: DateTime<Utc>) -> Vec<TrendRecord> {
        let cutoff = now - Duration::days(days.max(0));
        let mut recent: Vec<TrendRecord> = self
            .topics
            .iter()
            .filter(|t| t.discovered >= cutoff)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        recent.truncate(5);
        recent
    }

    /// Catalog additions for strong, repeated suggestions not configured yet.
    pub fn suggest_updates(
        &self,
        catalog: &Catalog,
        min_confidence: f64,
        min_articles: usize,
    ) -> Vec<CategoryUpdate> {
        self.patterns
            .values()
            .filter(|s| s.confidence > min_confidence)
            .filter(|s| s.article_count >= min_articles)
            .filter(|s| !catalog.contains(&s.name))
            .map(|s| CategoryUpdate {
                action: "add",
                category: CategorySpec {
                    name: s.name.clone(),
                    description: format!("Emerging category for {} articles", s.name),
                    keywords: s.key_terms.clone(),
                    priority: Priority::Medium,
                    max_articles: Some(3),
                    score_multiplier: 1.0,
                },
                reason: format!(
                    "Found {} articles with {:.0}% confidence",
                    s.article_count,
                    s.confidence * 100.0
                ),
            })
            .collect()
    }
}
