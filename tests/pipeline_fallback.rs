// tests/pipeline_fallback.rs
// Full pipeline with the backend switched off: everything runs on heuristics.
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tech_news_curator::ai_adapter::{DisabledClient, DynCompletion};
use tech_news_curator::clock::FixedClock;
use tech_news_curator::config::AppConfig;
use tech_news_curator::engine::Pipeline;
use tech_news_curator::ingest::types::RawItem;
use tech_news_curator::item::{Assignment, UNCATEGORIZED};

const CONFIG: &str = r#"
[settings]
default_category = "webdev"
default_max_articles = 5

[[categories]]
name = "cybersecurity"
keywords = ["vulnerability", "patch", "ransomware", "cve"]
max_articles = 2

[[categories]]
name = "ai"
keywords = ["llm", "model"]

[[categories]]
name = "webdev"
keywords = ["css", "javascript"]

[dedup]
same_topic_backend = true
"#;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 8, 13, 9, 0, 0).unwrap()
}

fn raw(title: &str, url: &str, source: &str, hours_ago: i64, desc: &str) -> RawItem {
    RawItem::new(title, url, source, now() - Duration::hours(hours_ago)).with_description(desc)
}

fn pipeline() -> Pipeline {
    let cfg = AppConfig::parse(CONFIG, "toml").unwrap();
    let backend: DynCompletion = Arc::new(DisabledClient);
    Pipeline::new(&cfg, backend, Arc::new(FixedClock(now())))
}

#[tokio::test]
async fn unavailable_backend_still_categorizes_and_summarizes_everything() {
    let input = vec![
        raw("Ransomware gang hits hospital", "https://a.example/1", "CISA", 2, "<p>A new <b>ransomware</b> strain.</p>"),
        raw("New LLM tops the model leaderboard", "https://a.example/2", "Ars Technica", 5, "LLM news"),
        raw("CSS anchor positioning ships", "https://a.example/3", "Web.dev", 10, ""),
        raw("Gardening with sensors", "https://a.example/4", "Unknown Blog", 20, "Tomatoes"),
    ];
    let run = pipeline().run(input).await;

    assert_eq!(run.items.len(), 4);
    for it in &run.items {
        assert_ne!(it.category, UNCATEGORIZED);
        assert!(!it.summary.is_empty(), "{} has no summary", it.title);
        assert!(it.score >= 0.0);
    }
    let garden = run.items.iter().find(|i| i.title.starts_with("Gardening")).unwrap();
    assert_eq!(garden.category, "webdev");
    assert_eq!(garden.assignment, Assignment::Default);

    let ransom = run.items.iter().find(|i| i.title.starts_with("Ransomware")).unwrap();
    assert_eq!(ransom.category, "cybersecurity");
    assert_eq!(ransom.summary, "A new ransomware strain....");

    let css = run.items.iter().find(|i| i.title.starts_with("CSS")).unwrap();
    assert_eq!(css.summary, css.title);

    assert_eq!(run.stats.fallback_summaries, 4);
    assert_eq!(run.stats.backend_summaries, 0);
}

#[tokio::test]
async fn invalid_items_are_skipped_not_fatal() {
    let mut no_date = raw("Dateless", "https://a.example/9", "X", 1, "");
    no_date.published = None;
    let input = vec![
        raw("  ", "https://a.example/1", "X", 1, ""),
        raw("Bad scheme", "ftp://a.example/2", "X", 1, ""),
        no_date,
        raw("CSS nesting lands", "https://a.example/3", "Web.dev", 1, ""),
    ];
    let run = pipeline().run(input).await;
    assert_eq!(run.stats.raw, 4);
    assert_eq!(run.stats.invalid, 3);
    assert_eq!(run.items.len(), 1);
}

#[tokio::test]
async fn duplicates_collapse_across_stages() {
    let input = vec![
        raw("Microsoft Patch Tuesday August 2025", "https://a.example/1", "Krebs on Security", 3, "patch"),
        // same (title, url), different description casing
        raw("Microsoft Patch Tuesday August 2025", "https://a.example/1", "Krebs on Security", 3, "PATCH"),
        raw("Microsoft fixes 107 vulnerabilities in August update", "https://b.example/2", "CISA", 4, "patch"),
        raw("Chrome 116 released", "https://c.example/3", "Chrome Developers", 5, "javascript"),
        raw("Firefox 117 released", "https://c.example/4", "MDN Blog", 5, "javascript"),
    ];
    let run = pipeline().run(input).await;

    assert_eq!(run.stats.exact_duplicates, 1);
    assert_eq!(run.stats.same_topic_duplicates, 1);
    let titles: Vec<&str> = run.items.iter().map(|i| i.title.as_str()).collect();
    assert!(titles.contains(&"Microsoft Patch Tuesday August 2025"));
    assert!(!titles.contains(&"Microsoft fixes 107 vulnerabilities in August update"));
    assert!(titles.contains(&"Chrome 116 released"));
    assert!(titles.contains(&"Firefox 117 released"));
}

#[tokio::test]
async fn category_caps_hold_in_output() {
    let input: Vec<RawItem> = (0..6)
        .map(|i| {
            raw(
                &format!("Vulnerability report number {i} for product {}", i * 7),
                &format!("https://sec.example/{i}"),
                "CISA",
                i,
                "cve",
            )
        })
        .collect();
    let run = pipeline().run(input).await;
    let cyber = run.items.iter().filter(|i| i.category == "cybersecurity").count();
    assert_eq!(cyber, 2);
    assert_eq!(run.stats.over_cap, 4);
    // Output is score-descending.
    assert!(run.items.windows(2).all(|w| w[0].score >= w[1].score));
}
