//! # Configuration
//!
//! One file (TOML or JSON, picked by extension) describes the whole run:
//! global `[settings]`, the ordered `[[categories]]` catalog, the backend (`[ai]`), and the
//! knobs of dedup, discovery, storage and feed acquisition.
//!
//! Lookup order for [`AppConfig::load_default`]:
//! 1) `$CURATOR_CONFIG_PATH`
//! 2) `config/curator.toml`
//! 3) `config/curator.json`
//!
//! A catalog without categories is fatal; everything else has a default.

pub mod ai;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analyze::dedup::DedupConfig;
use crate::discovery::DiscoveryConfig;
use crate::ingest::config::{FeedSpec, IngestConfig};
use crate::source_weights::SourceWeightsConfig;
use crate::storage::StorageConfig;

pub use ai::AiConfig;

pub const ENV_CONFIG_PATH: &str = "CURATOR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/curator.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

fn default_multiplier() -> f64 {
    1.0
}

/// One topic bucket of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Matched as lower-case substrings of `title + description`.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    /// Per-category output cap; `None` falls back to `settings.default_max_articles`.
    #[serde(default)]
    pub max_articles: Option<usize>,
    #[serde(default = "default_multiplier")]
    pub score_multiplier: f64,
}

impl CategorySpec {
    pub fn new(name: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            priority: Priority::default(),
            max_articles: None,
            score_multiplier: 1.0,
        }
    }
}

/// Validated, ordered category set. Order is significant: the first category is the hard
/// default of label parsing and the substring-match tie-breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    categories: Vec<CategorySpec>,
}

impl Catalog {
    /// Lower-cases names and keywords, rejects empty or duplicate names and bad caps.
    pub fn new(categories: Vec<CategorySpec>) -> Result<Self> {
        if categories.is_empty() {
            bail!("category catalog is empty");
        }
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(categories.len());
        for mut c in categories {
            c.name = c.name.trim().to_lowercase();
            if c.name.is_empty() {
                bail!("category with empty name");
            }
            if !seen.insert(c.name.clone()) {
                bail!("duplicate category name: {}", c.name);
            }
            if c.max_articles == Some(0) {
                bail!("category {}: max_articles must be positive", c.name);
            }
            if !c.score_multiplier.is_finite() || c.score_multiplier < 0.0 {
                bail!("category {}: invalid score_multiplier", c.name);
            }
            c.keywords = c
                .keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect();
            out.push(c);
        }
        Ok(Self { categories: out })
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategorySpec> {
        self.categories.iter()
    }

    pub fn get(&self, name: &str) -> Option<&CategorySpec> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn first(&self) -> &CategorySpec {
        // Non-empty by construction.
        &self.categories[0]
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

fn default_max_articles() -> usize {
    5
}
fn default_category() -> String {
    "webdev".to_string()
}

/// `[settings]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_max_articles")]
    pub default_max_articles: usize,
    /// Reserved category for items no keyword matched.
    #[serde(default = "default_category")]
    pub default_category: String,
    /// Items scoring below this never reach the output.
    #[serde(default)]
    pub min_score_threshold: f64,
    /// Added to items younger than 6 hours.
    #[serde(default)]
    pub recent_article_boost: f64,
    /// Subtracted (by magnitude) from items older than 24 hours.
    #[serde(default)]
    pub old_article_penalty: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_max_articles: default_max_articles(),
            default_category: default_category(),
            min_score_threshold: 0.0,
            recent_article_boost: 0.0,
            old_article_penalty: 0.0,
        }
    }
}

/// On-disk shape, before validation.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    categories: Vec<CategorySpec>,
    #[serde(default)]
    ai: AiConfig,
    #[serde(default)]
    dedup: DedupConfig,
    #[serde(default)]
    discovery: DiscoveryConfig,
    #[serde(default)]
    storage: StorageConfig,
    #[serde(default)]
    ingest: IngestConfig,
    #[serde(default)]
    feeds: Vec<FeedSpec>,
    #[serde(default)]
    source_weights: Option<SourceWeightsConfig>,
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub settings: Settings,
    pub catalog: Catalog,
    pub ai: AiConfig,
    pub dedup: DedupConfig,
    pub discovery: DiscoveryConfig,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    pub feeds: Vec<FeedSpec>,
    pub source_weights: SourceWeightsConfig,
}

impl AppConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self::parse(&content, ext.as_str())
            .with_context(|| format!("parsing config {}", path.display()))
    }

    /// Load using env var + fallbacks (see module docs).
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let toml_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from("config/curator.json");
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Err(anyhow!(
            "no configuration found (set {ENV_CONFIG_PATH} or create {DEFAULT_CONFIG_PATH})"
        ))
    }

    /// Parse a config document; `hint_ext` is "toml" or "json".
    pub fn parse(s: &str, hint_ext: &str) -> Result<Self> {
        let file: ConfigFile = if hint_ext == "json" {
            serde_json::from_str(s).context("invalid JSON config")?
        } else {
            toml::from_str(s).context("invalid TOML config")?
        };
        Self::validate(file)
    }

    fn validate(file: ConfigFile) -> Result<Self> {
        let catalog = Catalog::new(file.categories)?;

        let mut settings = file.settings;
        settings.default_category = settings.default_category.trim().to_lowercase();
        if settings.default_max_articles == 0 {
            bail!("settings.default_max_articles must be positive");
        }
        if !catalog.contains(&settings.default_category) {
            tracing::warn!(
                default_category = %settings.default_category,
                "default category is not in the catalog; it will use the global cap"
            );
        }

        let mut ai = file.ai;
        ai.sanitize();

        let mut source_weights = file
            .source_weights
            .unwrap_or_else(SourceWeightsConfig::default_seed);
        source_weights.merge_feeds(&file.feeds);

        Ok(Self {
            settings,
            catalog,
            ai,
            dedup: file.dedup,
            discovery: file.discovery,
            storage: file.storage,
            ingest: file.ingest,
            feeds: file.feeds,
            source_weights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[settings]
default_category = "WebDev"

[[categories]]
name = "cybersecurity"
keywords = ["Vulnerability", " CVE "]
max_articles = 3
score_multiplier = 1.2

[[categories]]
name = "webdev"
keywords = ["css"]
"#;

    #[test]
    fn parses_ordered_catalog() {
        let cfg = AppConfig::parse(MINIMAL, "toml").unwrap();
        let names: Vec<&str> = cfg.catalog.names().collect();
        assert_eq!(names, vec!["cybersecurity", "webdev"]);
        assert_eq!(cfg.catalog.first().name, "cybersecurity");
        let cyber = cfg.catalog.get("cybersecurity").unwrap();
        assert_eq!(cyber.keywords, vec!["vulnerability", "cve"]);
        assert_eq!(cyber.max_articles, Some(3));
        assert_eq!(cfg.settings.default_category, "webdev");
        assert_eq!(cfg.settings.default_max_articles, 5);
        assert!(cfg.dedup.same_topic_backend);
    }

    #[test]
    fn empty_catalog_is_fatal() {
        let err = AppConfig::parse("[settings]\n", "toml").unwrap_err();
        assert!(format!("{err:#}").contains("empty"));
    }

    #[test]
    fn duplicate_names_rejected() {
        let cats = vec![CategorySpec::new("ai", &[]), CategorySpec::new("AI", &[])];
        assert!(Catalog::new(cats).is_err());
    }

    #[test]
    fn zero_cap_rejected() {
        let mut c = CategorySpec::new("ai", &[]);
        c.max_articles = Some(0);
        assert!(Catalog::new(vec![c]).is_err());
    }

    #[test]
    fn json_config_is_accepted() {
        let json = r#"{"categories":[{"name":"ai","keywords":["llm"]}],
                        "feeds":[{"url":"https://example.org/rss","source":"Example","weight":0.4}]}"#;
        let cfg = AppConfig::parse(json, "json").unwrap();
        assert_eq!(cfg.catalog.len(), 1);
        assert!((cfg.source_weights.weight_for("Example") - 0.4).abs() < 1e-9);
    }
}
