//! # Item
//! The unit of curation. Built once from a [`RawItem`] at ingestion, then threaded by value
//! through categorization, deduplication, scoring, selection and summarization.
//!
//! `content_hash` is fixed at construction (SHA-256 of `title + url`) and is the key for
//! exact-duplicate detection.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::ingest::types::RawItem;

/// Category value of an item nobody has categorized yet.
pub const UNCATEGORIZED: &str = "uncategorized";

/// At most this many tags are kept per item.
pub const MAX_TAGS: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("item has an empty title")]
    EmptyTitle,
    #[error("item url is not http(s): {0:?}")]
    InvalidUrl(String),
    #[error("item has no publish time")]
    MissingPublished,
}

/// How an item's category was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Assignment {
    #[default]
    Unassigned,
    /// Backend label matched a configured category exactly.
    Backend,
    /// Backend label only matched by substring, or not at all (first category used).
    BackendGuess,
    /// Keyword fallback found at least one keyword.
    Keywords,
    /// Keyword fallback found nothing; configured default category.
    Default,
}

impl Assignment {
    /// Items assigned this way feed the discovery engine.
    pub fn is_low_confidence(self) -> bool {
        matches!(
            self,
            Assignment::Unassigned | Assignment::BackendGuess | Assignment::Default
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Assignment::Unassigned => "unassigned",
            Assignment::Backend => "backend",
            Assignment::BackendGuess => "backend_guess",
            Assignment::Keywords => "keywords",
            Assignment::Default => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub title: String,
    pub url: String,
    pub source: String,
    pub category: String,
    pub published: DateTime<Utc>,
    pub description: String,
    pub tags: Vec<String>,
    pub summary: String,
    pub score: f64,
    pub assignment: Assignment,
    content_hash: String,
}

impl Item {
    /// Validate a raw feed entry and turn it into an uncategorized item.
    pub fn from_raw(raw: RawItem) -> Result<Self, ItemError> {
        let title = raw.title.trim().to_string();
        if title.is_empty() {
            return Err(ItemError::EmptyTitle);
        }
        let url = raw.url.trim().to_string();
        if !is_http_url(&url) {
            return Err(ItemError::InvalidUrl(url));
        }
        let published = raw.published.ok_or(ItemError::MissingPublished)?;

        let mut tags = raw.tags;
        tags.retain(|t| !t.trim().is_empty());
        tags.truncate(MAX_TAGS);

        let content_hash = content_hash(&title, &url);
        Ok(Self {
            title,
            url,
            source: raw.source,
            category: UNCATEGORIZED.to_string(),
            published,
            description: raw.description,
            tags,
            summary: String::new(),
            score: 0.0,
            assignment: Assignment::Unassigned,
            content_hash,
        })
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Lower-cased `title + " " + description`, the text keyword matching runs against.
    pub fn keyword_text(&self) -> String {
        format!(
            "{} {}",
            self.title.to_lowercase(),
            self.description.to_lowercase()
        )
    }

    /// Hours since publication relative to `now` (negative for future timestamps).
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.published).num_seconds() as f64 / 3600.0
    }
}

/// SHA-256 hex digest of `title` immediately followed by `url`.
pub fn content_hash(title: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn is_http_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(title: &str, url: &str) -> RawItem {
        RawItem::new(
            title,
            url,
            "Test",
            Utc.with_ymd_and_hms(2025, 8, 12, 10, 0, 0).unwrap(),
        )
    }

    #[test]
    fn hash_ignores_description_casing() {
        let a = Item::from_raw(raw("Rust 1.89", "https://blog.rust-lang.org/x").with_description("Hello"))
            .unwrap();
        let b = Item::from_raw(raw("Rust 1.89", "https://blog.rust-lang.org/x").with_description("HELLO"))
            .unwrap();
        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }

    #[test]
    fn hash_differs_on_title_or_url() {
        let a = content_hash("a", "https://x");
        assert_ne!(a, content_hash("b", "https://x"));
        assert_ne!(a, content_hash("a", "https://y"));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            Item::from_raw(raw("   ", "https://x.org")).unwrap_err(),
            ItemError::EmptyTitle
        );
        assert!(matches!(
            Item::from_raw(raw("t", "ftp://x.org")).unwrap_err(),
            ItemError::InvalidUrl(_)
        ));
        assert!(matches!(
            Item::from_raw(raw("t", "https://")).unwrap_err(),
            ItemError::InvalidUrl(_)
        ));
        let mut r = raw("t", "https://x.org");
        r.published = None;
        assert_eq!(Item::from_raw(r).unwrap_err(), ItemError::MissingPublished);
    }

    #[test]
    fn keeps_at_most_five_tags() {
        let it = Item::from_raw(
            raw("t", "http://x.org").with_tags(["a", "", "b", "c", "d", "e", "f"]),
        )
        .unwrap();
        assert_eq!(it.tags, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(it.category, UNCATEGORIZED);
        assert_eq!(it.assignment, Assignment::Unassigned);
    }
}
