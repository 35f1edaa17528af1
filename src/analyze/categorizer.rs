//! Category assignment: backend labels per batch, keyword counting when the backend is
//! unavailable, errors out, or answers with the wrong number of lines.

use tracing::{debug, info, warn};

use crate::analyze::ai_adapter::{BackendError, DynCompletion};
use crate::analyze::prompts::{categorize_batch, LabelMatch};
use crate::config::Catalog;
use crate::item::{Assignment, Item};

pub struct Categorizer {
    backend: DynCompletion,
    catalog: Catalog,
    default_category: String,
    batch_size: usize,
}

impl Categorizer {
    pub fn new(
        backend: DynCompletion,
        catalog: Catalog,
        default_category: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            backend,
            catalog,
            default_category: default_category.into(),
            batch_size: batch_size.max(1),
        }
    }

    /// Assigns exactly one category to every item. Never fails.
    pub async fn categorize(&self, items: Vec<Item>) -> Vec<Item> {
        if items.is_empty() {
            return items;
        }
        if !self.backend.is_available() {
            info!(
                count = items.len(),
                "backend unavailable, keyword categorization"
            );
            return items.into_iter().map(|it| self.by_keywords(it)).collect();
        }

        let mut out = Vec::with_capacity(items.len());
        let mut rest = items;
        while !rest.is_empty() {
            let tail = rest.split_off(self.batch_size.min(rest.len()));
            let batch = std::mem::replace(&mut rest, tail);
            let result = categorize_batch(self.backend.as_ref(), &batch, &self.catalog).await;
            out.extend(self.apply_batch(batch, result));
        }
        out
    }

    fn apply_batch(
        &self,
        batch: Vec<Item>,
        result: Result<Vec<LabelMatch>, BackendError>,
    ) -> Vec<Item> {
        match result {
            Ok(labels) if labels.len() == batch.len() => batch
                .into_iter()
                .zip(labels)
                .map(|(mut it, label)| {
                    it.assignment = if label.exact {
                        Assignment::Backend
                    } else {
                        Assignment::BackendGuess
                    };
                    debug!(title = %it.title, category = %label.name, "backend category");
                    it.category = label.name;
                    it
                })
                .collect(),
            Ok(labels) => {
                warn!(
                    expected = batch.len(),
                    got = labels.len(),
                    "category reply line count mismatch, keyword fallback for batch"
                );
                batch.into_iter().map(|it| self.by_keywords(it)).collect()
            }
            Err(e) => {
                warn!(error = %e, size = batch.len(), "categorization failed, keyword fallback for batch");
                batch.into_iter().map(|it| self.by_keywords(it)).collect()
            }
        }
    }

    fn by_keywords(&self, mut it: Item) -> Item {
        let (name, how) = keyword_category(&it, &self.catalog, &self.default_category);
        it.category = name;
        it.assignment = how;
        it
    }
}

/// Counts the distinct keywords of every category present in `title + description` (lower-cased)
/// and returns the best one; ties go to the earlier category. With no hit at all the
/// configured default is returned with [`Assignment::Default`].
pub fn keyword_category(item: &Item, catalog: &Catalog, default: &str) -> (String, Assignment) {
    let text = item.keyword_text();
    let mut best: Option<(&str, usize)> = None;
    for c in catalog.iter() {
        let hits = c
            .keywords
            .iter()
            .filter(|k| text.contains(k.as_str()))
            .count();
        if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
            best = Some((c.name.as_str(), hits));
        }
    }
    match best {
        Some((name, _)) => (name.to_string(), Assignment::Keywords),
        None => (default.to_string(), Assignment::Default),
    }
}
