//! # Topic discovery
//!
//! Mines weakly categorized items for vocabulary clusters the catalog does not cover.
//!
//! 1) Candidate pool: low-confidence assignment, the default category, or a score under
//!    `confidence_floor`.
//! 2) Greedy clustering over significant-term sets ([`cluster::greedy_clusters`]).
//! 3) Naming and confidence per cluster, first suggestion per name wins within a run.
//! 4) Optional backend review merged field-by-field into the suggestions.
//! 5) New names are added to the persisted [`DiscoveryHistory`].

pub mod cluster;
pub mod history;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analyze::ai_adapter::{BackendError, DynCompletion};
use crate::clock::Clock;
use crate::item::Item;

pub use cluster::TopicCluster;
pub use history::{CategoryUpdate, DiscoveryHistory, DiscoverySuggestion, TrendRecord};

fn default_true() -> bool {
    true
}
fn default_min_cluster_size() -> usize {
    3
}
fn default_confidence_floor() -> f64 {
    0.5
}
fn default_overlap_threshold() -> f64 {
    0.2
}
fn default_promote_confidence() -> f64 {
    0.7
}
fn default_promote_min_articles() -> usize {
    5
}
fn default_trending_days() -> i64 {
    7
}
fn default_history_path() -> PathBuf {
    PathBuf::from("_data/discovery_history.json")
}

/// `[discovery]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
    /// Items scoring below this join the candidate pool.
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: f64,
    /// Ask the backend to review the heuristic suggestions.
    #[serde(default = "default_true")]
    pub ai_review: bool,
    #[serde(default = "default_promote_confidence")]
    pub promote_confidence: f64,
    #[serde(default = "default_promote_min_articles")]
    pub promote_min_articles: usize,
    #[serde(default = "default_trending_days")]
    pub trending_days: i64,
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_cluster_size: default_min_cluster_size(),
            confidence_floor: default_confidence_floor(),
            overlap_threshold: default_overlap_threshold(),
            ai_review: true,
            promote_confidence: default_promote_confidence(),
            promote_min_articles: default_promote_min_articles(),
            trending_days: default_trending_days(),
            history_path: default_history_path(),
        }
    }
}

/// Outcome of one discovery run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    pub candidates: usize,
    pub clusters: usize,
    pub suggestions: Vec<DiscoverySuggestion>,
    /// Names that were not in the history before this run.
    pub new_names: Vec<String>,
    /// Global weighted term ranking over the candidate pool (top 20).
    pub top_terms: Vec<(String, f64)>,
    pub reviewed: bool,
}

/// Items the categorizer was unsure about.
pub fn discovery_candidates(items: &[Item], default_category: &str, floor: f64) -> Vec<Item> {
    items
        .iter()
        .filter(|it| {
            it.assignment.is_low_confidence()
                || it.category == default_category
                || it.score < floor
        })
        .cloned()
        .collect()
}

static RE_JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("json object regex"));

pub struct DiscoveryEngine {
    config: DiscoveryConfig,
    backend: DynCompletion,
    clock: Arc<dyn Clock>,
}

impl DiscoveryEngine {
    pub fn new(config: DiscoveryConfig, backend: DynCompletion, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            backend,
            clock,
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Clusters `candidates` into named suggestions. Does not touch the history.
    pub async fn discover(&self, candidates: &[Item]) -> DiscoveryReport {
        let now = self.clock.now();
        let top_terms = cluster::term_weights(candidates).top(20);
        let groups = cluster::greedy_clusters(
            candidates,
            self.config.overlap_threshold,
            self.config.min_cluster_size,
        );

        let mut suggestions: Vec<DiscoverySuggestion> = Vec::new();
        for idxs in &groups {
            let members: Vec<Item> = idxs.iter().map(|&i| candidates[i].clone()).collect();
            let c = TopicCluster::from_members(members);
            debug!(name = %c.name, size = c.members.len(), confidence = c.confidence, "topic cluster");
            suggestions.push(DiscoverySuggestion {
                name: c.name.clone(),
                article_count: c.members.len(),
                key_terms: c.top_terms.iter().map(|(t, _)| t.clone()).collect(),
                sample_titles: c.members.iter().take(3).map(|m| m.title.clone()).collect(),
                confidence: c.confidence,
                discovered_at: now,
                extra: Default::default(),
            });
        }
        let mut suggestions = first_per_name(suggestions);

        let mut reviewed = false;
        if self.config.ai_review && !suggestions.is_empty() && self.backend.is_available() {
            match self.review(&suggestions, candidates).await {
                Ok(reply) => {
                    suggestions = first_per_name(merge_review(suggestions, &reply));
                    reviewed = true;
                }
                Err(e) => warn!(error = %e, "discovery review failed, keeping heuristic suggestions"),
            }
        }

        DiscoveryReport {
            candidates: candidates.len(),
            clusters: groups.len(),
            suggestions,
            new_names: Vec::new(),
            top_terms,
            reviewed,
        }
    }

    /// Load history, discover, add new names, rewrite history. A failed save is logged.
    pub async fn run(&self, candidates: &[Item], history_path: &Path) -> (DiscoveryReport, DiscoveryHistory) {
        let mut history = DiscoveryHistory::load(history_path);
        let mut report = self.discover(candidates).await;
        report.new_names = history.record(&report.suggestions, self.clock.now());
        if let Err(e) = history.save(history_path) {
            warn!(error = ?e, "discovery history not saved");
        }
        info!(
            candidates = report.candidates,
            clusters = report.clusters,
            new = report.new_names.len(),
            "topic discovery finished"
        );
        (report, history)
    }

    async fn review(
        &self,
        suggestions: &[DiscoverySuggestion],
        candidates: &[Item],
    ) -> Result<String, BackendError> {
        let prompt = review_prompt(suggestions, candidates)
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        self.backend.complete(&prompt, 500).await
    }
}

/// Titles from the candidate pool shown to the reviewer.
const REVIEW_SAMPLE_TITLES: usize = 10;

/// Review request: the heuristic suggestions as JSON plus a sample of the candidate titles.
pub fn review_prompt(
    suggestions: &[DiscoverySuggestion],
    candidates: &[Item],
) -> serde_json::Result<String> {
    let listing = serde_json::to_string_pretty(suggestions)?;
    let titles: String = candidates
        .iter()
        .take(REVIEW_SAMPLE_TITLES)
        .map(|c| format!("- {}\n", c.title))
        .collect();
    Ok(format!(
        "Analyze these potential new tech news categories discovered from uncategorized articles:\n\n\
{listing}\n\n\
Sample article titles:\n{titles}\n\
For each suggested category, evaluate whether it is a distinct, coherent topic and whether the name is good.\n\
Respond with a single JSON object keyed by the category name. Each value is an object holding only the fields to change \
(for example \"name\", \"confidence\", \"description\", \"keywords\").\n\nJSON:"
    ))
}

/// Keeps the first suggestion of every name.
fn first_per_name(suggestions: Vec<DiscoverySuggestion>) -> Vec<DiscoverySuggestion> {
    let mut seen = HashSet::new();
    suggestions
        .into_iter()
        .filter(|s| seen.insert(s.name.clone()))
        .collect()
}

/// Merges a backend review into the suggestions. The first `{...}` span of the reply is
/// parsed as an object keyed by suggestion name; each matching object's fields overwrite
/// the record's fields. Anything unparseable leaves the suggestions as they were.
pub fn merge_review(suggestions: Vec<DiscoverySuggestion>, reply: &str) -> Vec<DiscoverySuggestion> {
    let Some(m) = RE_JSON_OBJECT.find(reply) else {
        warn!("discovery review reply has no JSON object");
        return suggestions;
    };
    let parsed: serde_json::Value = match serde_json::from_str(m.as_str()) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "discovery review reply is not valid JSON");
            return suggestions;
        }
    };
    let Some(review) = parsed.as_object() else {
        return suggestions;
    };

    suggestions
        .into_iter()
        .map(|s| {
            let Some(patch) = review.get(&s.name).and_then(|v| v.as_object()) else {
                return s;
            };
            let Ok(serde_json::Value::Object(mut base)) = serde_json::to_value(&s) else {
                return s;
            };
            for (k, v) in patch {
                base.insert(k.clone(), v.clone());
            }
            match serde_json::from_value::<DiscoverySuggestion>(serde_json::Value::Object(base)) {
                Ok(mut merged) => {
                    merged.name = merged.name.trim().to_lowercase().replace(' ', "_");
                    if merged.name.is_empty() {
                        merged.name = s.name.clone();
                    }
                    merged.confidence = if merged.confidence.is_finite() {
                        cluster::round2(merged.confidence.clamp(0.0, 1.0))
                    } else {
                        s.confidence
                    };
                    merged
                }
                Err(e) => {
                    debug!(error = %e, name = %s.name, "review patch ignored");
                    s
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sugg(name: &str) -> DiscoverySuggestion {
        DiscoverySuggestion {
            name: name.into(),
            article_count: 4,
            key_terms: vec!["lidar".into()],
            sample_titles: vec!["Lidar gets cheaper".into()],
            confidence: 0.42,
            discovered_at: Utc.with_ymd_and_hms(2025, 8, 12, 0, 0, 0).unwrap(),
            extra: Default::default(),
        }
    }

    #[test]
    fn review_fields_are_merged() {
        let reply = "Sure!\n{\"lidar_tech\": {\"name\": \"Sensing Hardware\", \"confidence\": 1.7, \"description\": \"Lidar and radar\"}}\nDone.";
        let out = merge_review(vec![sugg("lidar_tech"), sugg("other_tech")], reply);
        assert_eq!(out[0].name, "sensing_hardware");
        assert_eq!(out[0].confidence, 1.0);
        assert_eq!(out[0].extra["description"], "Lidar and radar");
        assert_eq!(out[0].article_count, 4);
        assert_eq!(out[1], sugg("other_tech"));
    }

    #[test]
    fn non_json_reply_keeps_suggestions() {
        let before = vec![sugg("lidar_tech")];
        assert_eq!(merge_review(before.clone(), "no idea"), before);
        assert_eq!(merge_review(before.clone(), "{not json}"), before);
    }

    #[test]
    fn bad_field_types_are_ignored() {
        let before = vec![sugg("lidar_tech")];
        let out = merge_review(before.clone(), r#"{"lidar_tech": {"article_count": "many"}}"#);
        assert_eq!(out, before);
    }

    #[test]
    fn review_prompt_lists_at_most_ten_candidate_titles() {
        use crate::ingest::types::RawItem;
        let ts = Utc.with_ymd_and_hms(2025, 8, 12, 0, 0, 0).unwrap();
        let candidates: Vec<Item> = (0..12)
            .map(|i| {
                Item::from_raw(RawItem::new(
                    format!("Lidar story {i}"),
                    format!("https://r.example/{i}"),
                    "Test",
                    ts,
                ))
                .unwrap()
            })
            .collect();
        let prompt = review_prompt(&[sugg("lidar_tech")], &candidates).unwrap();
        assert!(prompt.contains("\"lidar_tech\""));
        assert!(prompt.contains("- Lidar story 0\n"));
        assert!(prompt.contains("- Lidar story 9\n"));
        assert!(!prompt.contains("Lidar story 10"));
    }
}
