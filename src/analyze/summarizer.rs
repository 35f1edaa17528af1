//! 2-3 sentence summaries for selected items, with a description-based fallback.

use serde::Serialize;
use tracing::{info, warn};

use crate::analyze::ai_adapter::DynCompletion;
use crate::analyze::prompts::summarize_batch;
use crate::ingest::clean_text;
use crate::item::Item;

pub const FALLBACK_SUMMARY_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SummaryCounts {
    pub backend: usize,
    pub fallback: usize,
}

/// Cleaned description cut at 200 chars plus `...`; the title when there is no description.
pub fn fallback_summary(item: &Item) -> String {
    let clean = clean_text(&item.description);
    if clean.is_empty() {
        return item.title.clone();
    }
    let cut: String = clean.chars().take(FALLBACK_SUMMARY_CHARS).collect();
    format!("{}...", cut.trim_end())
}

pub struct Summarizer {
    backend: DynCompletion,
    batch_size: usize,
}

impl Summarizer {
    pub fn new(backend: DynCompletion, batch_size: usize) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
        }
    }

    /// Every returned item has a non-empty summary.
    pub async fn summarize(&self, items: Vec<Item>) -> (Vec<Item>, SummaryCounts) {
        let mut counts = SummaryCounts::default();
        if !self.backend.is_available() {
            if !items.is_empty() {
                info!(count = items.len(), "backend unavailable, description summaries");
            }
            let out = items
                .into_iter()
                .map(|mut it| {
                    it.summary = fallback_summary(&it);
                    counts.fallback += 1;
                    it
                })
                .collect();
            return (out, counts);
        }

        let mut out = Vec::with_capacity(items.len());
        for chunk in items.chunks(self.batch_size) {
            let summaries = match summarize_batch(self.backend.as_ref(), chunk).await {
                Ok(s) => {
                    if s.len() != chunk.len() {
                        warn!(expected = chunk.len(), got = s.len(), "summary count mismatch");
                    }
                    s
                }
                Err(e) => {
                    warn!(error = %e, size = chunk.len(), "batch summarization failed");
                    Vec::new()
                }
            };
            for (i, it) in chunk.iter().enumerate() {
                let mut it = it.clone();
                match summaries.get(i).map(|s| s.trim()).filter(|s| !s.is_empty()) {
                    Some(s) => {
                        it.summary = s.to_string();
                        counts.backend += 1;
                    }
                    None => {
                        it.summary = fallback_summary(&it);
                        counts.fallback += 1;
                    }
                }
                out.push(it);
            }
        }
        (out, counts)
    }
}
