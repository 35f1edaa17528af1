//! # Curation pipeline
//! validate → categorize → same-topic dedup → score → title dedup → select → summarize.
//!
//! Items are threaded by value through each stage. Nothing in here returns an error: the
//! backend-facing stages absorb failures into their fallbacks, and invalid raw entries are
//! skipped with a warning.

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::analyze::ai_adapter::DynCompletion;
use crate::analyze::similarity::extract_keywords;
use crate::analyze::{
    remove_similar_titles, select, Categorizer, Deduplicator, KeepPolicy, Scorer, Summarizer,
};
use crate::clock::Clock;
use crate::config::{AppConfig, Catalog, Settings};
use crate::discovery::discovery_candidates;
use crate::ingest::types::RawItem;
use crate::item::Item;
use crate::source_weights::SourceWeightsConfig;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("curation_invalid_total", "Raw items skipped by validation.");
        describe_counter!(
            "curation_duplicates_total",
            "Items removed by any dedup stage."
        );
        describe_counter!("curation_selected_total", "Items in the curated output.");
        describe_counter!(
            "curation_fallback_total",
            "Items categorized or summarized without the backend."
        );
        describe_gauge!("curation_last_run_ts", "Unix ts of the last curation run.");
    });
}

/// Counts by category, source and publish day plus the mean score.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrendStats {
    pub by_category: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    /// `YYYY-MM-DD` of the publish time.
    pub by_day: BTreeMap<String, usize>,
    /// Three decimals; 0 for an empty set.
    pub average_score: f64,
}

pub fn analyze_trends(items: &[Item]) -> TrendStats {
    let mut t = TrendStats::default();
    for it in items {
        *t.by_category.entry(it.category.clone()).or_default() += 1;
        *t.by_source.entry(it.source.clone()).or_default() += 1;
        *t.by_day
            .entry(it.published.format("%Y-%m-%d").to_string())
            .or_default() += 1;
    }
    if !items.is_empty() {
        let avg = items.iter().map(|i| i.score).sum::<f64>() / items.len() as f64;
        t.average_score = (avg * 1000.0).round() / 1000.0;
    }
    t
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub raw: usize,
    pub invalid: usize,
    /// Category assignment path → item count.
    pub assignment: BTreeMap<&'static str, usize>,
    pub exact_duplicates: usize,
    pub same_topic_duplicates: usize,
    pub similar_titles: usize,
    pub below_threshold: usize,
    pub over_cap: usize,
    pub selected: usize,
    pub backend_summaries: usize,
    pub fallback_summaries: usize,
    pub trends: TrendStats,
    /// Top-10 frequent significant words per category of the curated items.
    pub keywords: BTreeMap<String, Vec<(String, usize)>>,
}

/// Output of one run.
#[derive(Debug, Clone, Default)]
pub struct CurationRun {
    /// Curated items, score descending.
    pub items: Vec<Item>,
    /// Every categorized, deduplicated and scored item, selected or not.
    pub pool: Vec<Item>,
    pub stats: RunStats,
}

pub struct Pipeline {
    catalog: Catalog,
    settings: Settings,
    weights: SourceWeightsConfig,
    categorizer: Categorizer,
    dedup: Deduplicator,
    summarizer: Summarizer,
    confidence_floor: f64,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    pub fn new(cfg: &AppConfig, backend: DynCompletion, clock: Arc<dyn Clock>) -> Self {
        Self {
            catalog: cfg.catalog.clone(),
            settings: cfg.settings.clone(),
            weights: cfg.source_weights.clone(),
            categorizer: Categorizer::new(
                backend.clone(),
                cfg.catalog.clone(),
                cfg.settings.default_category.clone(),
                cfg.ai.categorize_batch_size,
            ),
            dedup: Deduplicator::new(backend.clone(), cfg.dedup.clone()),
            summarizer: Summarizer::new(backend, cfg.ai.summarize_batch_size),
            confidence_floor: cfg.discovery.confidence_floor,
            clock,
        }
    }

    /// Valid items in input order plus the number skipped.
    pub fn validate(raw: Vec<RawItem>) -> (Vec<Item>, usize) {
        let mut skipped = 0usize;
        let mut out = Vec::with_capacity(raw.len());
        for r in raw {
            let (title, url) = (r.title.clone(), r.url.clone());
            match Item::from_raw(r) {
                Ok(it) => out.push(it),
                Err(e) => {
                    warn!(error = %e, %title, %url, "raw item skipped");
                    skipped += 1;
                }
            }
        }
        (out, skipped)
    }

    pub async fn run(&self, raw: Vec<RawItem>) -> CurationRun {
        ensure_metrics_described();
        let now: DateTime<Utc> = self.clock.now();
        let mut stats = RunStats {
            raw: raw.len(),
            ..RunStats::default()
        };

        let (items, invalid) = Self::validate(raw);
        stats.invalid = invalid;

        let items = self.categorizer.categorize(items).await;
        for it in &items {
            *stats.assignment.entry(it.assignment.as_str()).or_default() += 1;
        }

        let (items, same) = self
            .dedup
            .remove_same_topic(items, KeepPolicy::FirstSeen)
            .await;
        stats.exact_duplicates = same.exact;
        stats.same_topic_duplicates = same.same_topic;

        let items = Scorer::new(&self.catalog, &self.settings, &self.weights).score_all(items, now);

        let (pool, similar) =
            remove_similar_titles(items, self.dedup.config().title_similarity_threshold);
        stats.similar_titles = similar;

        let (selected, sel) = select(pool.clone(), &self.catalog, &self.settings);
        stats.below_threshold = sel.below_threshold;
        stats.over_cap = sel.over_cap;

        let (items, summaries) = self.summarizer.summarize(selected).await;
        stats.backend_summaries = summaries.backend;
        stats.fallback_summaries = summaries.fallback;
        stats.selected = items.len();
        stats.trends = analyze_trends(&items);
        stats.keywords = extract_keywords(&items);

        let keyword_paths = stats.assignment.get("keywords").copied().unwrap_or(0)
            + stats.assignment.get("default").copied().unwrap_or(0);
        counter!("curation_invalid_total").increment(invalid as u64);
        counter!("curation_duplicates_total")
            .increment((same.exact + same.same_topic + similar) as u64);
        counter!("curation_selected_total").increment(items.len() as u64);
        counter!("curation_fallback_total").increment((keyword_paths + summaries.fallback) as u64);
        gauge!("curation_last_run_ts").set(now.timestamp() as f64);

        info!(
            raw = stats.raw,
            invalid = stats.invalid,
            duplicates = same.exact + same.same_topic + similar,
            selected = stats.selected,
            avg_score = stats.trends.average_score,
            "curation finished"
        );

        CurationRun {
            items,
            pool,
            stats,
        }
    }

    /// Weakly categorized items of a run, the input of topic discovery.
    pub fn discovery_candidates(&self, run: &CurationRun) -> Vec<Item> {
        discovery_candidates(&run.pool, &self.settings.default_category, self.confidence_floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ai_adapter::DisabledClient;
    use crate::clock::FixedClock;
    use chrono::{Duration, TimeZone};

    fn item(title: &str, source: &str, category: &str, score: f64, published: DateTime<Utc>) -> Item {
        let mut it = Item::from_raw(RawItem::new(
            title,
            format!("https://e.example/{}", title.len()),
            source,
            published,
        ))
        .unwrap();
        it.category = category.into();
        it.score = score;
        it
    }

    #[test]
    fn trends_count_and_average() {
        let day = Utc.with_ymd_and_hms(2025, 8, 12, 10, 0, 0).unwrap();
        let items = vec![
            item("a", "CISA", "cybersecurity", 0.5, day),
            item("bb", "CISA", "ai", 0.25, day),
            item("ccc", "MDN Blog", "ai", 0.2, day - Duration::days(1)),
        ];
        let t = analyze_trends(&items);
        assert_eq!(t.by_category["ai"], 2);
        assert_eq!(t.by_source["CISA"], 2);
        assert_eq!(t.by_day["2025-08-11"], 1);
        assert_eq!(t.average_score, 0.317);
        assert_eq!(analyze_trends(&[]), TrendStats::default());
    }

    #[tokio::test]
    async fn pool_feeds_discovery_with_default_and_weak_items() {
        let now = Utc.with_ymd_and_hms(2025, 8, 13, 9, 0, 0).unwrap();
        let cfg = AppConfig::parse(
            "[[categories]]\nname = \"ai\"\nkeywords = [\"llm\"]\n[[categories]]\nname = \"webdev\"\nkeywords = [\"css\"]\n",
            "toml",
        )
        .unwrap();
        let pipeline = Pipeline::new(&cfg, Arc::new(DisabledClient), Arc::new(FixedClock(now)));
        let run = pipeline
            .run(vec![
                RawItem::new("New LLM benchmark", "https://e.example/1", "Ars Technica", now),
                RawItem::new("Quantum sensors in orbit", "https://e.example/2", "Ars Technica", now),
            ])
            .await;
        assert_eq!(run.pool.len(), 2);
        assert_eq!(run.stats.assignment["keywords"], 1);
        assert_eq!(run.stats.assignment["default"], 1);
        assert_eq!(run.stats.keywords["ai"][0], ("benchmark".to_string(), 1));

        let candidates = pipeline.discovery_candidates(&run);
        assert!(candidates.iter().any(|c| c.title.starts_with("Quantum")));
    }
}
