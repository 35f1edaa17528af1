// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod clock;
pub mod config;
pub mod engine;
pub mod item;
pub mod source_weights;
pub mod storage;

// Curation stages (categorize, dedup, score, select, summarize) + backend client
pub mod analyze;

// Emerging-topic clustering and its persisted history
pub mod discovery;

// Feed acquisition
pub mod ingest;

// ---- Re-exports for stable public API ----
pub use analyze::ai_adapter;
pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::config::AppConfig;
pub use crate::engine::{CurationRun, Pipeline, RunStats};
pub use crate::item::{Assignment, Item};
