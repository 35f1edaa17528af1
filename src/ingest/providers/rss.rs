// src/ingest/providers/rss.rs
//! RSS 2.0 / Atom parsing into [`RawItem`]s.
//!
//! A feed body reaches the parser as a [`FeedSnapshot`], whether it was just downloaded or
//! read back from the on-disk cache; both variants produce the same records.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::ingest::clean_text;
use crate::ingest::types::RawItem;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<Text>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<Text>,
    content: Option<Text>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
}

#[derive(Debug, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term", default)]
    term: String,
}

/// Feed body with its origin.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedSnapshot {
    Live {
        source: String,
        body: String,
        fetched_at: DateTime<Utc>,
    },
    Cached {
        source: String,
        body: String,
        cached_at: DateTime<Utc>,
    },
}

impl FeedSnapshot {
    pub fn live(source: impl Into<String>, body: impl Into<String>, fetched_at: DateTime<Utc>) -> Self {
        Self::Live {
            source: source.into(),
            body: body.into(),
            fetched_at,
        }
    }

    pub fn cached(source: impl Into<String>, body: impl Into<String>, cached_at: DateTime<Utc>) -> Self {
        Self::Cached {
            source: source.into(),
            body: body.into(),
            cached_at,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            Self::Live { source, .. } | Self::Cached { source, .. } => source,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Self::Live { body, .. } | Self::Cached { body, .. } => body,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached { .. })
    }

    pub fn items(&self) -> Result<Vec<RawItem>> {
        parse_feed(self.body(), self.source())
    }
}

/// RFC 2822 (RSS) first, RFC 3339 (Atom, some RSS) second.
pub fn parse_feed_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if let Ok(dt) = OffsetDateTime::parse(ts, &Rfc2822) {
        return DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond());
    }
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parses an RSS 2.0 or Atom document. Entries without a title or link are skipped.
pub fn parse_feed(xml: &str, source: &str) -> Result<Vec<RawItem>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let head: String = xml_clean.chars().take(1024).collect();

    let out = if head.contains("<rss") {
        let rss: Rss = from_str(&xml_clean).with_context(|| format!("parsing rss xml for {source}"))?;
        rss.channel
            .items
            .into_iter()
            .filter_map(|it| rss_item(it, source))
            .collect::<Vec<_>>()
    } else if head.contains("<feed") {
        let feed: AtomFeed =
            from_str(&xml_clean).with_context(|| format!("parsing atom xml for {source}"))?;
        feed.entries
            .into_iter()
            .filter_map(|e| atom_entry(e, source))
            .collect::<Vec<_>>()
    } else {
        bail!("{source}: document is neither RSS nor Atom");
    };

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);
    counter!("ingest_items_total").increment(out.len() as u64);
    Ok(out)
}

fn rss_item(it: RssItem, source: &str) -> Option<RawItem> {
    let title = clean_text(it.title.as_deref().unwrap_or_default());
    let url = it.link.unwrap_or_default().trim().to_string();
    if title.is_empty() || url.is_empty() {
        return None;
    }
    Some(RawItem {
        title,
        url,
        source: source.to_string(),
        published: it.pub_date.as_deref().and_then(parse_feed_date),
        description: it.description.unwrap_or_default(),
        tags: it
            .categories
            .into_iter()
            .map(|c| c.value.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
    })
}

fn atom_entry(e: AtomEntry, source: &str) -> Option<RawItem> {
    let title = clean_text(e.title.map(|t| t.value).as_deref().unwrap_or_default());
    let url = e
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| e.links.first())
        .map(|l| l.href.trim().to_string())
        .unwrap_or_default();
    if title.is_empty() || url.is_empty() {
        return None;
    }
    let published = e
        .published
        .as_deref()
        .or(e.updated.as_deref())
        .and_then(parse_feed_date);
    let description = e
        .summary
        .or(e.content)
        .map(|t| t.value)
        .unwrap_or_default();
    Some(RawItem {
        title,
        url,
        source: source.to_string(),
        published,
        description,
        tags: e
            .categories
            .into_iter()
            .map(|c| c.term.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
    })
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
