//! Token-level similarity and term-frequency helpers shared by dedup, categorization
//! reporting and topic discovery.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::item::Item;

static RE_WORD4: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[a-z]{4,}\b").expect("word regex"));

/// Filler words never counted as topical terms. Short words (< 4 letters) are already
/// excluded by tokenization; the few listed here keep the set usable on its own.
pub static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "new", "data", "with", "this", "that", "from", "will", "have",
        "been", "more", "about", "after", "also", "than", "their", "which", "these", "could",
        "would", "should", "there", "where", "when", "what", "into", "through", "under", "over",
        "article", "news", "report", "says", "according", "they", "were", "said", "each",
        "time", "other", "very", "know", "just", "first", "think", "your", "work", "life",
    ]
    .into_iter()
    .collect()
});

pub fn is_stop_word(w: &str) -> bool {
    STOP_WORDS.contains(w)
}

/// Case-insensitive Jaccard similarity of the whitespace-split token sets of two titles.
/// Identical titles (ignoring case) are 1.0; two empty titles are 0.0.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let sa: HashSet<&str> = a.split_whitespace().collect();
    let sb: HashSet<&str> = b.split_whitespace().collect();
    let inter = sa.intersection(&sb).count();
    let union = sa.union(&sb).count();
    if union == 0 {
        0.0
    } else {
        inter as f64 / union as f64
    }
}

/// Lower-cased words of at least four ASCII letters, stop words removed, in text order.
pub fn significant_terms(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    RE_WORD4
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|w| !is_stop_word(w))
        .map(str::to_string)
        .collect()
}

pub fn term_set(text: &str) -> HashSet<String> {
    significant_terms(text).into_iter().collect()
}

/// `|a ∩ b| / min(|a|, |b|)`; 0.0 when either side is empty.
pub fn overlap_ratio(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / smaller as f64
}

/// Weighted term counter that remembers first-seen order, so rankings are deterministic.
#[derive(Debug, Clone, Default)]
pub struct TermCounter {
    weights: HashMap<String, f64>,
    order: Vec<String>,
}

impl TermCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, term: &str, weight: f64) {
        match self.weights.get_mut(term) {
            Some(w) => *w += weight,
            None => {
                self.weights.insert(term.to_string(), weight);
                self.order.push(term.to_string());
            }
        }
    }

    pub fn get(&self, term: &str) -> f64 {
        self.weights.get(term).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Highest weight first; equal weights keep first-seen order.
    pub fn ranked(&self) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = self
            .order
            .iter()
            .map(|t| (t.clone(), self.get(t)))
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1));
        out
    }

    pub fn top(&self, n: usize) -> Vec<(String, f64)> {
        let mut r = self.ranked();
        r.truncate(n);
        r
    }
}

/// Ten most frequent significant words of `title + description`, per category.
pub fn extract_keywords(items: &[Item]) -> BTreeMap<String, Vec<(String, usize)>> {
    let mut per_cat: BTreeMap<String, TermCounter> = BTreeMap::new();
    for it in items {
        let counter = per_cat.entry(it.category.clone()).or_default();
        for t in significant_terms(&format!("{} {}", it.title, it.description)) {
            counter.add(&t, 1.0);
        }
    }
    per_cat
        .into_iter()
        .map(|(cat, c)| {
            let top = c
                .top(10)
                .into_iter()
                .map(|(t, w)| (t, w as usize))
                .collect();
            (cat, top)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_titles_ignore_case() {
        assert_eq!(title_similarity("Rust 2.0 Released", "rust 2.0 released"), 1.0);
    }

    #[test]
    fn jaccard_on_token_sets() {
        // {a,b,c,d} vs {a,b,c,e}: 3/5
        let s = title_similarity("a b c d", "a b c e");
        assert!((s - 0.6).abs() < 1e-9);
        assert_eq!(title_similarity("", "x"), 0.0);
    }

    #[test]
    fn significant_terms_drop_short_and_stop_words() {
        let t = significant_terms("The new Quantum chip, said IBM, will change computing");
        assert_eq!(t, vec!["quantum", "chip", "change", "computing"]);
    }

    #[test]
    fn overlap_uses_smaller_set() {
        let a: HashSet<String> = ["quantum", "chip"].iter().map(|s| s.to_string()).collect();
        let b: HashSet<String> = ["quantum", "chip", "qubit", "error", "google"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(overlap_ratio(&a, &b), 1.0);
        assert_eq!(overlap_ratio(&a, &HashSet::new()), 0.0);
    }

    #[test]
    fn ranking_is_stable_on_ties() {
        let mut c = TermCounter::new();
        c.add("zeta", 1.0);
        c.add("alpha", 1.0);
        c.add("beta", 2.0);
        let names: Vec<String> = c.ranked().into_iter().map(|(t, _)| t).collect();
        assert_eq!(names, vec!["beta", "zeta", "alpha"]);
    }

    #[test]
    fn keywords_per_category_ranked_and_capped() {
        use crate::ingest::types::RawItem;
        use chrono::{TimeZone, Utc};

        let ts = Utc.with_ymd_and_hms(2025, 8, 12, 10, 0, 0).unwrap();
        let mk = |title: &str, desc: &str, cat: &str, n: usize| {
            let mut it = Item::from_raw(
                RawItem::new(title, format!("https://k.example/{n}"), "Test", ts).with_description(desc),
            )
            .unwrap();
            it.category = cat.to_string();
            it
        };
        let items = vec![
            mk("Inference costs fall with this new kernel", "kernel kernel kernel inference", "ai", 1),
            mk("Tokenizer bugs and inference", "alpha bravo charlie delta echoes foxtrot golfs hotel india", "ai", 2),
            mk("Kubernetes release", "", "cloud", 3),
        ];
        let kw = extract_keywords(&items);

        let ai = &kw["ai"];
        assert_eq!(ai.len(), 10);
        assert_eq!(ai[0], ("kernel".to_string(), 4));
        assert_eq!(ai[1], ("inference".to_string(), 3));
        assert!(ai.iter().all(|(w, _)| !is_stop_word(w)));
        assert!(!ai.iter().any(|(w, _)| w == "this" || w == "with"));
        assert_eq!(kw["cloud"][0].0, "kubernetes");
    }
}
