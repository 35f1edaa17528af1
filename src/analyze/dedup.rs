//! Duplicate removal in two passes.
//!
//! 1. [`Deduplicator::remove_same_topic`]: exact `content_hash` matches are always dropped;
//!    the remaining candidates are compared pairwise with every accepted item through the
//!    backend same-topic judgment, falling back to [`same_topic_by_keywords`].
//! 2. [`remove_similar_titles`]: token-set Jaccard over titles, run after scoring.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::analyze::ai_adapter::DynCompletion;
use crate::analyze::prompts::judge_same_topic;
use crate::analyze::similarity::title_similarity;
use crate::item::Item;

fn default_true() -> bool {
    true
}
fn default_title_threshold() -> f64 {
    0.8
}

/// `[dedup]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Ask the backend whether two titles cover the same event. Costs one call per pair.
    #[serde(default = "default_true")]
    pub same_topic_backend: bool,
    /// Titles whose Jaccard similarity is strictly above this are duplicates.
    #[serde(default = "default_title_threshold")]
    pub title_similarity_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            same_topic_backend: true,
            title_similarity_threshold: default_title_threshold(),
        }
    }
}

/// Which member of an equivalent pair survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeepPolicy {
    /// The item accepted first stays.
    #[default]
    FirstSeen,
    /// The strictly higher score wins; equal scores keep the earlier item.
    HigherScore,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SameTopicCounts {
    pub exact: usize,
    pub same_topic: usize,
}

pub struct Deduplicator {
    backend: DynCompletion,
    config: DedupConfig,
}

impl Deduplicator {
    pub fn new(backend: DynCompletion, config: DedupConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Exact and same-topic pass. Output keeps input order of the survivors.
    pub async fn remove_same_topic(
        &self,
        items: Vec<Item>,
        policy: KeepPolicy,
    ) -> (Vec<Item>, SameTopicCounts) {
        let mut counts = SameTopicCounts::default();
        let mut hashes: HashSet<String> = HashSet::new();
        let mut accepted: Vec<Item> = Vec::with_capacity(items.len());

        for cand in items {
            if !hashes.insert(cand.content_hash().to_string()) {
                debug!(title = %cand.title, "exact duplicate dropped");
                counts.exact += 1;
                continue;
            }

            let mut matched = Vec::new();
            for (idx, kept) in accepted.iter().enumerate() {
                if self.same_topic(kept, &cand).await {
                    matched.push(idx);
                    if policy == KeepPolicy::FirstSeen {
                        break;
                    }
                }
            }

            if matched.is_empty() {
                accepted.push(cand);
                continue;
            }

            let wins = policy == KeepPolicy::HigherScore
                && matched.iter().all(|&i| cand.score > accepted[i].score);
            if wins {
                // First matched slot takes the candidate; the rest are evicted.
                let slot = matched[0];
                for &i in matched.iter().skip(1).rev() {
                    let gone = accepted.remove(i);
                    debug!(title = %gone.title, "same-topic item evicted by higher score");
                }
                let gone = std::mem::replace(&mut accepted[slot], cand);
                debug!(title = %gone.title, "same-topic item evicted by higher score");
                counts.same_topic += matched.len();
            } else {
                debug!(title = %cand.title, "same-topic duplicate dropped");
                counts.same_topic += 1;
            }
        }

        (accepted, counts)
    }

    /// URL equality, then the backend (when enabled and available), then keywords.
    pub async fn same_topic(&self, a: &Item, b: &Item) -> bool {
        if a.url == b.url {
            return true;
        }
        if self.config.same_topic_backend && self.backend.is_available() {
            match judge_same_topic(self.backend.as_ref(), &a.title, &b.title).await {
                Ok(same) => return same,
                Err(e) => {
                    warn!(error = %e, "same-topic judgment failed, keyword heuristic");
                }
            }
        }
        same_topic_by_keywords(&a.title, &b.title)
    }
}

/// Vendors whose titles are compared together with a security-action term.
const VENDORS: &[&str] = &["microsoft", "google", "apple", "adobe", "cisco", "vmware"];
const SECURITY_ACTIONS: &[&str] = &["vulnerability", "patch", "update", "fix"];
/// Vendor-specific patch-cycle phrasing.
const PATCH_CYCLES: &[(&str, &[&str])] = &[(
    "microsoft",
    &["patch tuesday", "patch", "vulnerability", "flaw"],
)];

fn contains_any(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| text.contains(t))
}

/// Backend-free same-topic judgment. Symmetric in its arguments.
///
/// Two titles match when both name the same vendor of a fixed list and both carry a
/// security-action term, or when both use the patch-cycle phrasing of the same vendor.
pub fn same_topic_by_keywords(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();

    let cycle = PATCH_CYCLES.iter().any(|(vendor, phrases)| {
        a.contains(vendor) && b.contains(vendor) && contains_any(&a, phrases) && contains_any(&b, phrases)
    });
    if cycle {
        return true;
    }

    VENDORS.iter().any(|v| a.contains(v) && b.contains(v))
        && contains_any(&a, SECURITY_ACTIONS)
        && contains_any(&b, SECURITY_ACTIONS)
}

/// Drops every item whose title is more similar than `threshold` to an earlier kept title.
/// Returns the survivors and the number removed.
pub fn remove_similar_titles(items: Vec<Item>, threshold: f64) -> (Vec<Item>, usize) {
    let mut kept: Vec<Item> = Vec::with_capacity(items.len());
    let mut removed = 0usize;
    for cand in items {
        let dup = kept
            .iter()
            .any(|k| title_similarity(&k.title, &cand.title) > threshold);
        if dup {
            debug!(title = %cand.title, "similar title dropped");
            removed += 1;
        } else {
            kept.push(cand);
        }
    }
    (kept, removed)
}
