// src/ingest/mod.rs
pub mod cache;
pub mod config;
pub mod providers;
pub mod types;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use std::collections::HashSet;

use crate::ingest::config::IngestConfig;
use crate::ingest::types::{FeedProvider, RawItem};
use crate::item::content_hash;

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Total entries parsed from feeds.");
        describe_counter!("ingest_kept_total", "Entries kept after window + dedup.");
        describe_counter!(
            "ingest_too_old_total",
            "Entries dropped for falling outside the lookback window."
        );
        describe_counter!(
            "ingest_dedup_total",
            "Entries removed as exact (title, url) duplicates."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Feed fetch/parse errors."
        );
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!(
            "ingest_pipeline_last_run_ts",
            "Unix ts when ingest last ran."
        );
    });
}

/// Plain text from a feed field: HTML entities decoded, tags stripped, typographic quotes
/// folded to ASCII, whitespace collapsed.
pub fn clean_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Drops entries published before `now - days_lookback` and exact (title, url) repeats.
/// Entries without a publish time pass through; item validation rejects them later.
/// Returns (kept, too_old, duplicates).
pub fn window_and_dedup(
    now: DateTime<Utc>,
    raw: Vec<RawItem>,
    days_lookback: i64,
) -> (Vec<RawItem>, usize, usize) {
    let cutoff = now - Duration::days(days_lookback.max(0));
    let mut too_old = 0usize;
    let mut dups = 0usize;
    let mut seen: HashSet<String> = HashSet::new();
    let mut keep = Vec::with_capacity(raw.len());

    for it in raw {
        if matches!(it.published, Some(p) if p < cutoff) {
            too_old += 1;
            continue;
        }
        if !seen.insert(content_hash(it.title.trim(), it.url.trim())) {
            dups += 1;
            continue;
        }
        keep.push(it);
    }
    (keep, too_old, dups)
}

#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub items: Vec<RawItem>,
    pub feeds_ok: usize,
    pub feeds_failed: usize,
    pub too_old: usize,
    pub duplicates: usize,
}

/// Fetch every provider once. Individual feed failures are logged and counted; the call
/// fails only when there is no provider or every provider failed.
pub async fn run_once(
    providers: &[Box<dyn FeedProvider>],
    cfg: &IngestConfig,
    now: DateTime<Utc>,
) -> Result<IngestOutcome> {
    ensure_metrics_described();
    if providers.is_empty() {
        bail!("no feeds configured");
    }

    let mut raw = Vec::new();
    let mut feeds_ok = 0usize;
    let mut feeds_failed = 0usize;
    for p in providers {
        match p.fetch_latest().await {
            Ok(mut v) => {
                tracing::debug!(provider = p.name(), count = v.len(), "feed fetched");
                feeds_ok += 1;
                raw.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(error = ?e, provider = p.name(), "provider error");
                counter!("ingest_provider_errors_total").increment(1);
                feeds_failed += 1;
            }
        }
    }
    if feeds_ok == 0 {
        bail!("all {feeds_failed} feeds failed");
    }

    let (items, too_old, duplicates) = window_and_dedup(now, raw, cfg.days_lookback);

    // Telemetry
    counter!("ingest_kept_total").increment(items.len() as u64);
    counter!("ingest_too_old_total").increment(too_old as u64);
    counter!("ingest_dedup_total").increment(duplicates as u64);
    gauge!("ingest_pipeline_last_run_ts").set(now.timestamp() as f64);

    tracing::info!(
        kept = items.len(),
        too_old,
        duplicates,
        feeds_ok,
        feeds_failed,
        "ingest finished"
    );
    Ok(IngestOutcome {
        items,
        feeds_ok,
        feeds_failed,
        too_old,
        duplicates,
    })
}
