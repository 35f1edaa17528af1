// src/analyze/mod.rs
//! Curation stages: categorize, dedup, score, select, summarize. Each stage takes items by
//! value and hands back the updated items plus its own counters.

pub mod ai_adapter;
pub mod categorizer;
pub mod dedup;
pub mod prompts;
pub mod scoring;
pub mod select;
pub mod similarity;
pub mod summarizer;

// Re-export convenient types.
pub use crate::analyze::categorizer::{keyword_category, Categorizer};
pub use crate::analyze::dedup::{
    remove_similar_titles, same_topic_by_keywords, DedupConfig, Deduplicator, KeepPolicy,
};
pub use crate::analyze::scoring::{ScoreInputs, Scorer};
pub use crate::analyze::select::select;
pub use crate::analyze::summarizer::Summarizer;
