//! Term weighting, greedy clustering and cluster naming.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::analyze::similarity::{overlap_ratio, significant_terms, term_set, TermCounter};
use crate::item::Item;

/// Emerging-tech vocabulary, counted twice per mention. Matched on word boundaries.
pub const TECH_VOCABULARY: &[&str] = &[
    "quantum", "blockchain", "metaverse", "web3", "defi", "nft", "edge computing", "iot", "5g",
    "6g", "ar", "vr", "xr", "mlops", "devsecops", "fintech", "healthtech", "edtech",
    "sustainability", "green tech", "climate tech", "robotics", "autonomous", "drone",
    "satellite", "space tech",
];
pub const VOCABULARY_WEIGHT: f64 = 2.0;
pub const CAMEL_CASE_WEIGHT: f64 = 1.5;

/// Ordered naming table; the first set containing one of the cluster's top terms wins.
const NAMING_TABLE: &[(&[&str], &str)] = &[
    (&["quantum", "computing"], "quantum_computing"),
    (&["blockchain", "crypto", "defi", "nft"], "blockchain_crypto"),
    (&["climate", "sustainability", "green", "carbon"], "climate_tech"),
    (&["space", "satellite", "rocket", "aerospace"], "space_tech"),
    (&["robot", "robotics", "automation", "autonomous"], "robotics_automation"),
    (&["health", "medical", "biotech", "pharma"], "health_tech"),
    (&["fintech", "payment", "banking", "finance"], "fintech"),
];

static RE_CAMEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+(?:[A-Z][a-z]+)+\b").expect("camel regex"));
static RE_NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("non-word regex"));

fn item_text(it: &Item) -> String {
    format!("{} {}", it.title, it.description)
}

/// Weighted term frequencies over `items`: significant words count 1, vocabulary terms 2,
/// camel-case product names 1.5 (lower-cased).
pub fn term_weights<'a, I>(items: I) -> TermCounter
where
    I: IntoIterator<Item = &'a Item>,
{
    let mut counter = TermCounter::new();
    for it in items {
        let text = item_text(it);
        for w in significant_terms(&text) {
            counter.add(&w, 1.0);
        }
        let padded = format!(" {} ", RE_NON_WORD.replace_all(&text.to_lowercase(), " "));
        for term in TECH_VOCABULARY {
            if padded.contains(&format!(" {term} ")) {
                counter.add(term, VOCABULARY_WEIGHT);
            }
        }
        for m in RE_CAMEL.find_iter(&text) {
            counter.add(&m.as_str().to_lowercase(), CAMEL_CASE_WEIGHT);
        }
    }
    counter
}

/// Single greedy pass: each unclustered item seeds a cluster and absorbs every later
/// unclustered item whose term set overlaps the seed's by more than `overlap_threshold`
/// of the smaller set. Clusters under `min_size` are dropped (their items stay consumed).
pub fn greedy_clusters(items: &[Item], overlap_threshold: f64, min_size: usize) -> Vec<Vec<usize>> {
    let sets: Vec<HashSet<String>> = items.iter().map(|it| term_set(&item_text(it))).collect();
    let mut used = vec![false; items.len()];
    let mut out = Vec::new();
    for seed in 0..items.len() {
        if used[seed] {
            continue;
        }
        used[seed] = true;
        let mut members = vec![seed];
        for j in seed + 1..items.len() {
            if !used[j] && overlap_ratio(&sets[seed], &sets[j]) > overlap_threshold {
                used[j] = true;
                members.push(j);
            }
        }
        if members.len() >= min_size.max(1) {
            out.push(members);
        }
    }
    out
}

/// Name from the naming table, else `{top_term}_tech`, else `emerging_tech`.
pub fn cluster_name(top_terms: &[String]) -> String {
    for (keys, name) in NAMING_TABLE {
        if top_terms.iter().any(|t| keys.contains(&t.as_str())) {
            return (*name).to_string();
        }
    }
    match top_terms.first() {
        Some(t) => format!("{}_tech", t.replace(' ', "_")),
        None => "emerging_tech".to_string(),
    }
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// `0.5*min(1, size/10) + 0.5*min(1, avg_top_freq/10)`, in [0,1], two decimals.
pub fn cluster_confidence(size: usize, avg_top_frequency: f64) -> f64 {
    let s = (size as f64 / 10.0).min(1.0);
    let f = (avg_top_frequency.max(0.0) / 10.0).min(1.0);
    round2((0.5 * s + 0.5 * f).clamp(0.0, 1.0))
}

/// A retained cluster, transient per run.
#[derive(Debug, Clone)]
pub struct TopicCluster {
    pub members: Vec<Item>,
    pub top_terms: Vec<(String, f64)>,
    pub name: String,
    pub confidence: f64,
}

impl TopicCluster {
    /// Top terms are plain significant-word counts over the members; the vocabulary and
    /// camel-case boosts of [`term_weights`] only shape the pool-wide ranking.
    pub fn from_members(members: Vec<Item>) -> Self {
        let mut counter = TermCounter::new();
        for m in &members {
            for w in significant_terms(&item_text(m)) {
                counter.add(&w, 1.0);
            }
        }
        let top_terms = counter.top(5);
        let names: Vec<String> = top_terms.iter().map(|(t, _)| t.clone()).collect();
        let avg = if top_terms.is_empty() {
            0.0
        } else {
            top_terms.iter().map(|(_, w)| w).sum::<f64>() / top_terms.len() as f64
        };
        Self {
            confidence: cluster_confidence(members.len(), avg),
            name: cluster_name(&names),
            top_terms,
            members,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::RawItem;
    use chrono::{TimeZone, Utc};

    fn item(title: &str) -> Item {
        let ts = Utc.with_ymd_and_hms(2025, 8, 12, 10, 0, 0).unwrap();
        let url = format!("https://example.org/{}", title.len());
        Item::from_raw(RawItem::new(title, url, "Example", ts)).unwrap()
    }

    #[test]
    fn vocabulary_matches_whole_words_only() {
        let w = term_weights(&[item("AR glasses and VR headsets"), item("Startup hardware")]);
        assert_eq!(w.get("ar"), 2.0);
        assert_eq!(w.get("vr"), 2.0);
        // "hardware" contains "ar" but is not the word "ar"
        assert_eq!(w.get("hardware"), 1.0);
    }

    #[test]
    fn camel_case_names_are_boosted() {
        let w = term_weights(&[item("OpenAI ships GitHub integration for DeepMind")]);
        // plain word (1.0) plus camel-case boost (1.5)
        assert_eq!(w.get("github"), 2.5);
        assert_eq!(w.get("deepmind"), 2.5);
        // "OpenAI" is not Camel+Case by the word pattern
        assert_eq!(w.get("openai"), 1.0);
    }

    #[test]
    fn naming_table_first_match_wins() {
        let t = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(cluster_name(&t(&["qubit", "quantum"])), "quantum_computing");
        assert_eq!(cluster_name(&t(&["satellite", "crypto"])), "blockchain_crypto");
        // whole terms only: "namespace" is not "space"
        assert_eq!(cluster_name(&t(&["namespace", "kubernetes"])), "namespace_tech");
        assert_eq!(cluster_name(&t(&["cryptocurrency", "greenland"])), "cryptocurrency_tech");
        assert_eq!(cluster_name(&t(&["lidar"])), "lidar_tech");
        assert_eq!(cluster_name(&[]), "emerging_tech");
    }

    #[test]
    fn cluster_terms_are_plain_counts() {
        let members = vec![
            item("Quantum chip startup raises funds"),
            item("Quantum chip startup raises funds"),
            item("Quantum chip startup raises funds"),
        ];
        let c = TopicCluster::from_members(members);
        assert_eq!(c.top_terms[0], ("quantum".to_string(), 3.0));
        assert!(c.top_terms.iter().all(|(_, w)| *w == 3.0));
        assert_eq!(c.name, "quantum_computing");
        // 0.5 * 3/10 + 0.5 * 3/10
        assert_eq!(c.confidence, 0.3);
    }

    #[test]
    fn confidence_bounds() {
        assert_eq!(cluster_confidence(3, 2.0), 0.25);
        assert_eq!(cluster_confidence(50, 100.0), 1.0);
        assert_eq!(cluster_confidence(0, 0.0), 0.0);
        assert_eq!(cluster_confidence(7, 3.333), 0.52);
    }
}
