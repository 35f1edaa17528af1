//! Per-category ranked selection.

use std::collections::HashMap;

use crate::config::{Catalog, Settings};
use crate::item::Item;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub below_threshold: usize,
    pub over_cap: usize,
}

/// Output cap of a category; unknown categories get the global default.
pub fn cap_for(category: &str, catalog: &Catalog, settings: &Settings) -> usize {
    catalog
        .get(category)
        .and_then(|c| c.max_articles)
        .unwrap_or(settings.default_max_articles)
}

/// Sorts by score (descending, stable on ties), drops items under `min_score_threshold`,
/// then keeps each item while its category is under cap.
pub fn select(items: Vec<Item>, catalog: &Catalog, settings: &Settings) -> (Vec<Item>, Selection) {
    let mut sorted = items;
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut stats = Selection::default();
    let mut taken: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::new();
    for it in sorted {
        if it.score < settings.min_score_threshold {
            stats.below_threshold += 1;
            continue;
        }
        let n = taken.entry(it.category.clone()).or_insert(0);
        if *n < cap_for(&it.category, catalog, settings) {
            *n += 1;
            out.push(it);
        } else {
            stats.over_cap += 1;
        }
    }
    (out, stats)
}
