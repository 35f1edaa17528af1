//! # Source Weights
//!
//! This module maps feed sources (e.g. "Krebs on Security", "MDN Blog", "CISA")
//! to normalized trust weights in the range `[0.0, 1.0]`.
//!
//! - Loads from the `[source_weights]` config section (weights + aliases).
//! - Per-feed weights from `[[feeds]]` are merged in on top.
//! - Case-insensitive lookup with normalization of punctuation, dashes, etc.
//! - Aliases can map alternative spellings to canonical sources.
//! - Fallback order: aliases → exact match → substring match → default (1.0).
//! - Includes a built-in `default_seed()` with the usual tech/security sources.

use serde::Deserialize;
use std::collections::HashMap;

use crate::ingest::config::FeedSpec;

/// Configuration for source weights.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceWeightsConfig {
    /// Weight for sources nobody configured.
    #[serde(default = "default_default_weight")]
    pub default_weight: f64,
    /// Explicit weights for canonical source names.
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    /// Aliases mapping non-canonical names → canonical names.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_default_weight() -> f64 {
    1.0
}

impl Default for SourceWeightsConfig {
    fn default() -> Self {
        Self {
            default_weight: default_default_weight(),
            weights: HashMap::new(),
            aliases: HashMap::new(),
        }
    }
}

impl SourceWeightsConfig {
    /// Overlay `[[feeds]]` weights; a feed's own weight wins over the seed.
    pub fn merge_feeds(&mut self, feeds: &[FeedSpec]) {
        for f in feeds {
            if let Some(w) = f.weight {
                self.weights.insert(normalize(&f.source), w);
            }
        }
        // Keys from config files may not be normalized yet.
        self.weights = std::mem::take(&mut self.weights)
            .into_iter()
            .map(|(k, v)| (normalize(&k), v))
            .collect();
        self.aliases = std::mem::take(&mut self.aliases)
            .into_iter()
            .map(|(k, v)| (normalize(&k), v))
            .collect();
    }

    /// Get the weight for a given source name.
    ///
    /// Steps:
    /// 1. Alias lookup (normalized) → canonical → weight.
    /// 2. Exact weight match.
    /// 3. Substring fallback (longest key wins, e.g. "Ars Technica Security" → "ars technica").
    /// 4. Default weight.
    pub fn weight_for(&self, source: &str) -> f64 {
        let s = normalize(source);

        // 1) Alias resolution.
        if let Some(canon) = self.aliases.get(&s) {
            let c = normalize(canon);
            if let Some(&w) = self.weights.get(&c) {
                return clamp01(w);
            }
        }

        // 2) Exact weight match.
        if let Some(&w) = self.weights.get(&s) {
            return clamp01(w);
        }

        // 3) Substring fallback.
        let best = self
            .weights
            .iter()
            .filter(|(k, _)| !k.is_empty() && s.contains(k.as_str()))
            .max_by_key(|(k, _)| k.len());
        if let Some((_, &w)) = best {
            return clamp01(w);
        }

        // 4) Default.
        clamp01(self.default_weight)
    }

    /// Built-in seed with common security and web-platform sources.
    pub fn default_seed() -> Self {
        let mut weights = HashMap::new();
        let mut aliases = HashMap::new();

        for (k, v) in [
            ("cert fr", 1.0),
            ("anssi", 1.0),
            ("cisa", 0.9),
            ("ncsc uk", 0.9),
            ("krebs on security", 0.8),
            ("schneier on security", 0.8),
            ("ars technica", 0.7),
            ("web dev", 1.0),
            ("mdn blog", 1.0),
            ("chrome developers", 0.9),
            ("webkit blog", 0.9),
            ("smashing magazine", 0.8),
            ("css tricks", 0.7),
            ("a list apart", 0.7),
        ] {
            weights.insert(k.to_string(), v);
        }

        for (a, c) in [
            ("krebsonsecurity", "krebs on security"),
            ("schneier", "schneier on security"),
            ("mdn", "mdn blog"),
            ("mozilla developer network", "mdn blog"),
            ("webkit", "webkit blog"),
            ("ncsc", "ncsc uk"),
            ("smashing", "smashing magazine"),
            ("csstricks", "css tricks"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            default_weight: 1.0,
            weights,
            aliases,
        }
    }
}

/// Normalize input string: lowercase, replace punctuation/dashes with spaces,
/// collapse multiple spaces into one.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_lowercase();

    // Replace common separators with spaces.
    for ch in ['—', '–', '-', '_', '/', '\\'] {
        out = out.replace(ch, " ");
    }

    // Replace disruptive punctuation/whitespace with spaces.
    out = out.replace(['\n', '\r', '\t', '.', ',', '’', '\''], " ");

    // Collapse multiple spaces.
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clamp to [0.0, 1.0].
fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        return 0.0;
    }
    x.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SourceWeightsConfig {
        SourceWeightsConfig::default_seed()
    }

    #[test]
    fn exact_match() {
        assert!((cfg().weight_for("CISA") - 0.9).abs() < 1e-9);
    }

    #[test]
    fn alias_match() {
        let c = cfg();
        assert!((c.weight_for("MDN") - 1.0).abs() < 1e-9);
        assert!((c.weight_for("KrebsOnSecurity") - 0.8).abs() < 1e-9);
    }

    #[test]
    fn dash_and_typography_normalization() {
        let c = cfg();
        assert!((c.weight_for("CSS-Tricks") - 0.7).abs() < 1e-9);
        assert!((c.weight_for("Web.dev") - 1.0).abs() < 1e-9);
        assert!((c.weight_for("CERT-FR") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn substring_match() {
        assert!((cfg().weight_for("Ars Technica Security") - 0.7).abs() < 1e-9);
    }

    #[test]
    fn unknown_source_defaults_to_full_trust() {
        assert!((cfg().weight_for("Totally Unknown Blog") - 1.0).abs() < 1e-9);
        assert!((SourceWeightsConfig::default().weight_for("x") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn feed_weights_override_seed() {
        let mut c = cfg();
        c.merge_feeds(&[FeedSpec {
            url: "https://krebsonsecurity.com/feed/".into(),
            source: "Krebs on Security".into(),
            weight: Some(0.55),
        }]);
        assert!((c.weight_for("krebs on security") - 0.55).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_weights_are_clamped() {
        let mut c = SourceWeightsConfig::default();
        c.weights.insert("hype".into(), 3.0);
        c.weights.insert("spam".into(), -1.0);
        assert_eq!(c.weight_for("Hype"), 1.0);
        assert_eq!(c.weight_for("Spam"), 0.0);
    }
}
