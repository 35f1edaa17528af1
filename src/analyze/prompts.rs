//! Backend operations built on [`Completion::complete`]: prompt construction and strict-ish
//! parsing of the replies. Every function returns `Result<_, BackendError>`; turning an
//! error into a heuristic answer is the caller's job.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write as _;

use crate::analyze::ai_adapter::{BackendError, Completion};
use crate::config::Catalog;
use crate::item::Item;

static RE_ORDINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d+\s*[.)]\s*").expect("ordinal regex"));

/// Backend label for one item, after matching against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMatch {
    pub name: String,
    /// `true` only when the label equals a configured name.
    pub exact: bool,
}

fn excerpt(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// One category label per input item, in input order.
pub async fn categorize_batch(
    backend: &dyn Completion,
    items: &[Item],
    catalog: &Catalog,
) -> Result<Vec<LabelMatch>, BackendError> {
    let prompt = categorize_prompt(items, catalog);
    let reply = backend.complete(&prompt, 200).await?;
    Ok(parse_category_labels(&reply, catalog))
}

pub fn categorize_prompt(items: &[Item], catalog: &Catalog) -> String {
    let mut categories = String::new();
    for c in catalog.iter() {
        let _ = writeln!(categories, "- {}: {}", c.name, c.description);
    }
    let mut articles = String::new();
    for (i, it) in items.iter().enumerate() {
        let _ = write!(
            articles,
            "\n{}. Title: {}\n   Source: {}\n   Description: {}...\n",
            i + 1,
            it.title,
            it.source,
            excerpt(&it.description, 200)
        );
    }
    format!(
        "You are an expert tech content categorizer. Analyze each article and assign it to the MOST APPROPRIATE category from this list:\n\n\
Available categories:\n{categories}\n\
Articles to categorize:\n{articles}\n\
For each article, return ONLY the category name. If an article doesn't clearly fit any category, choose the closest match.\n\n\
Format your response as:\n1. category_name\n2. category_name\n3. category_name\n...and so on.\n\n\
Your categorization:"
    )
}

/// One [`LabelMatch`] per non-empty reply line.
///
/// Ordinal prefixes ("1.", "2) ") are stripped and the rest lower-cased. An exact catalog
/// name wins; otherwise the first configured name that contains, or is contained in, the
/// label; otherwise the first configured category. Never yields an unknown name.
pub fn parse_category_labels(reply: &str, catalog: &Catalog) -> Vec<LabelMatch> {
    reply
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            let label = RE_ORDINAL.replace(line, "").trim().to_lowercase();
            if catalog.contains(&label) {
                return LabelMatch {
                    name: label,
                    exact: true,
                };
            }
            let name = catalog
                .names()
                .find(|n| label.contains(n) || n.contains(label.as_str()))
                .unwrap_or(catalog.first().name.as_str())
                .to_string();
            LabelMatch { name, exact: false }
        })
        .collect()
}

/// One summary per item, in input order. The reply may hold fewer entries than items.
pub async fn summarize_batch(
    backend: &dyn Completion,
    items: &[Item],
) -> Result<Vec<String>, BackendError> {
    let prompt = summarize_prompt(items);
    let max_tokens = (items.len() as u32).saturating_mul(80).max(80);
    let reply = backend.complete(&prompt, max_tokens).await?;
    let summaries = parse_batch_summaries(&reply);
    if summaries.is_empty() {
        return Err(BackendError::Malformed("no numbered summaries".to_string()));
    }
    Ok(summaries)
}

pub fn summarize_prompt(items: &[Item]) -> String {
    let mut articles = String::new();
    for (i, it) in items.iter().enumerate() {
        let _ = write!(
            articles,
            "\nArticle {}:\nTitle: {}\nDescription: {}...\nCategory: {}\n\n",
            i + 1,
            it.title,
            excerpt(&it.description, 300),
            it.category
        );
    }
    format!(
        "Summarize each of these {} tech articles in exactly 2-3 concise sentences.\n\
Focus on key technical points and implications for each.\n{articles}\n\
Provide summaries in this exact format:\n\
1. [2-3 sentence summary for article 1]\n\
2. [2-3 sentence summary for article 2]\n\
3. [2-3 sentence summary for article 3]\n\
...and so on.\n\nSummaries:",
        items.len()
    )
}

/// Numbered lines open a new summary; unnumbered lines continue the current one.
/// Text before the first numbered line is ignored.
pub fn parse_batch_summaries(reply: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Option<String> = None;
    for line in reply.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if RE_ORDINAL.is_match(line) {
            if let Some(done) = current.take() {
                out.push(done);
            }
            current = Some(RE_ORDINAL.replace(line, "").trim().to_string());
        } else if let Some(cur) = current.as_mut() {
            cur.push(' ');
            cur.push_str(line);
        }
    }
    if let Some(done) = current {
        out.push(done);
    }
    out
}

/// Asks whether two titles describe the same event.
pub async fn judge_same_topic(
    backend: &dyn Completion,
    title_a: &str,
    title_b: &str,
) -> Result<bool, BackendError> {
    let prompt = format!(
        "Compare these two news articles and determine if they cover the same topic or event.\n\n\
Article 1: \"{title_a}\"\nArticle 2: \"{title_b}\"\n\n\
Respond with only \"YES\" if they cover the same topic/event (like the same security patch, same product release, same incident), or \"NO\" if they are different topics.\n\n\
Examples:\n\
- \"Microsoft Patch Tuesday August 2025\" vs \"Microsoft fixes 107 vulnerabilities in August update\" → YES\n\
- \"Chrome 116 released\" vs \"Firefox 117 released\" → NO\n\
- \"New iPhone announced\" vs \"Apple announces new iPhone\" → YES"
    );
    let reply = backend.complete(&prompt, 10).await?;
    parse_yes_no(&reply)
}

/// First word of the reply must be YES or NO (any case, trailing punctuation allowed).
pub fn parse_yes_no(reply: &str) -> Result<bool, BackendError> {
    let word: String = reply
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    match word.as_str() {
        "YES" => Ok(true),
        "NO" => Ok(false),
        _ => Err(BackendError::Malformed(format!(
            "expected YES/NO, got {:?}",
            excerpt(reply, 40)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategorySpec;

    fn catalog() -> Catalog {
        Catalog::new(vec![
            CategorySpec::new("cybersecurity", &["vulnerability"]),
            CategorySpec::new("ai", &["llm"]),
            CategorySpec::new("webdev", &["css"]),
        ])
        .unwrap()
    }

    #[test]
    fn labels_strip_ordinals_and_case() {
        let got = parse_category_labels("1. AI\n2) webdev\n\n 3.  Cybersecurity ", &catalog());
        let names: Vec<&str> = got.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["ai", "webdev", "cybersecurity"]);
        assert!(got.iter().all(|m| m.exact));
    }

    #[test]
    fn labels_fall_back_to_substring_then_first() {
        let got = parse_category_labels("1. web development\n2. cyber\n3. gardening", &catalog());
        assert_eq!(got[0], LabelMatch { name: "webdev".into(), exact: false });
        assert_eq!(got[1], LabelMatch { name: "cybersecurity".into(), exact: false });
        assert_eq!(got[2], LabelMatch { name: "cybersecurity".into(), exact: false });
    }

    #[test]
    fn summaries_join_continuation_lines() {
        let reply = "Here you go:\n1. First sentence.\nSecond sentence.\n\n2. Other item.";
        assert_eq!(
            parse_batch_summaries(reply),
            vec!["First sentence. Second sentence.", "Other item."]
        );
    }

    #[test]
    fn yes_no_parsing() {
        assert_eq!(parse_yes_no("YES"), Ok(true));
        assert_eq!(parse_yes_no(" no."), Ok(false));
        assert!(parse_yes_no("Maybe").is_err());
        assert!(parse_yes_no("").is_err());
    }
}
