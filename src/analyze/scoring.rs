//! Composite item score.
//!
//! `ScoreInputs` are three normalized signals in [0,1]:
//! - `freshness`     : `1 - age_hours/48`, floored at 0
//! - `source_weight` : trust coefficient of the source
//! - `relevance`     : 0.5 + 0.1 per category keyword found, capped at 1
//!
//! base = 0.3*freshness + 0.3*source_weight + 0.4*relevance, times the category multiplier,
//! then the recency boost/penalty, then clamped to >= 0.

use chrono::{DateTime, Utc};

use crate::config::{Catalog, Settings};
use crate::item::Item;
use crate::source_weights::SourceWeightsConfig;

pub const FRESHNESS_HORIZON_HOURS: f64 = 48.0;
pub const RECENT_HOURS: f64 = 6.0;
pub const OLD_HOURS: f64 = 24.0;

/// Normalized inputs in [0,1].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScoreInputs {
    pub freshness: f64,
    pub source_weight: f64,
    pub relevance: f64,
}

impl ScoreInputs {
    /// Safe constructor with clamping.
    pub fn new(freshness: f64, source_weight: f64, relevance: f64) -> Self {
        fn c(x: f64) -> f64 {
            if x.is_nan() {
                0.0
            } else {
                x.clamp(0.0, 1.0)
            }
        }
        Self {
            freshness: c(freshness),
            source_weight: c(source_weight),
            relevance: c(relevance),
        }
    }

    pub fn base(&self) -> f64 {
        0.3 * self.freshness + 0.3 * self.source_weight + 0.4 * self.relevance
    }
}

/// `max(0, 1 - age/48)`; future timestamps count as brand new.
pub fn freshness(age_hours: f64) -> f64 {
    (1.0 - age_hours.max(0.0) / FRESHNESS_HORIZON_HOURS).clamp(0.0, 1.0)
}

pub fn relevance(text_lower: &str, keywords: &[String]) -> f64 {
    let hits = keywords
        .iter()
        .filter(|k| text_lower.contains(k.as_str()))
        .count();
    (0.5 + 0.1 * hits as f64).min(1.0)
}

/// Applies multiplier and recency adjustment to a base score.
pub fn finalize(base: f64, multiplier: f64, age_hours: f64, settings: &Settings) -> f64 {
    let mut score = base * multiplier;
    if age_hours < RECENT_HOURS {
        score += settings.recent_article_boost;
    }
    if age_hours > OLD_HOURS {
        score -= settings.old_article_penalty.abs();
    }
    if score.is_nan() {
        return 0.0;
    }
    score.max(0.0)
}

pub struct Scorer<'a> {
    pub catalog: &'a Catalog,
    pub settings: &'a Settings,
    pub weights: &'a SourceWeightsConfig,
}

impl<'a> Scorer<'a> {
    pub fn new(
        catalog: &'a Catalog,
        settings: &'a Settings,
        weights: &'a SourceWeightsConfig,
    ) -> Self {
        Self {
            catalog,
            settings,
            weights,
        }
    }

    pub fn inputs(&self, item: &Item, now: DateTime<Utc>) -> ScoreInputs {
        let keywords: &[String] = self
            .catalog
            .get(&item.category)
            .map(|c| c.keywords.as_slice())
            .unwrap_or(&[]);
        ScoreInputs::new(
            freshness(item.age_hours(now)),
            self.weights.weight_for(&item.source),
            relevance(&item.keyword_text(), keywords),
        )
    }

    pub fn score(&self, item: &Item, now: DateTime<Utc>) -> f64 {
        let multiplier = self
            .catalog
            .get(&item.category)
            .map(|c| c.score_multiplier)
            .unwrap_or(1.0);
        finalize(
            self.inputs(item, now).base(),
            multiplier,
            item.age_hours(now),
            self.settings,
        )
    }

    /// Returns the items with `score` filled in.
    pub fn score_all(&self, items: Vec<Item>, now: DateTime<Utc>) -> Vec<Item> {
        items
            .into_iter()
            .map(|mut it| {
                it.score = self.score(&it, now);
                it
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshness_floors_at_zero() {
        assert_eq!(freshness(0.0), 1.0);
        assert!((freshness(24.0) - 0.5).abs() < 1e-9);
        assert_eq!(freshness(72.0), 0.0);
        assert_eq!(freshness(-3.0), 1.0);
    }

    #[test]
    fn relevance_is_capped() {
        let kws: Vec<String> = ["a", "b", "c", "d", "e", "f", "g"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(relevance("abcdefg", &kws), 1.0);
        assert_eq!(relevance("zzz", &kws), 0.5);
        assert!((relevance("a b", &kws) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn penalty_never_goes_negative() {
        let s = Settings {
            old_article_penalty: -5.0,
            ..Settings::default()
        };
        assert_eq!(finalize(0.4, 1.0, 30.0, &s), 0.0);
    }

    #[test]
    fn recent_boost_applies_under_six_hours() {
        let s = Settings {
            recent_article_boost: 0.2,
            ..Settings::default()
        };
        assert!((finalize(0.5, 2.0, 1.0, &s) - 1.2).abs() < 1e-9);
        assert!((finalize(0.5, 2.0, 7.0, &s) - 1.0).abs() < 1e-9);
    }
}
