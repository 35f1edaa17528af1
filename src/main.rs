//! Tech News Curator: binary entrypoint.
//! One full run: fetch feeds, curate, store, prune, discover emerging topics.
//!
//! Config comes from `CURATOR_CONFIG_PATH` or `config/curator.toml`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tech_news_curator::ai_adapter::build_client;
use tech_news_curator::clock::{Clock, SystemClock};
use tech_news_curator::config::AppConfig;
use tech_news_curator::discovery::DiscoveryEngine;
use tech_news_curator::engine::Pipeline;
use tech_news_curator::ingest::{self, providers::providers_from_config};
use tech_news_curator::storage::ArticleStore;

/// Compact logs by default, JSON lines with `CURATOR_LOG_JSON=1`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tech_news_curator=info,warn"));
    let json = std::env::var("CURATOR_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional (local runs keep ANTHROPIC_API_KEY there).
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default().context("loading configuration")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let backend = build_client(&cfg.ai, clock.clone());

    // --- Acquire ---
    let providers = providers_from_config(&cfg.feeds, &cfg.ingest, clock.clone())?;
    let fetched = ingest::run_once(&providers, &cfg.ingest, clock.now())
        .await
        .context("fetching feeds")?;

    // --- Curate ---
    let pipeline = Pipeline::new(&cfg, backend.clone(), clock.clone());
    let run = pipeline.run(fetched.items).await;

    // --- Store ---
    let store = ArticleStore::new(&cfg.storage, clock.clone());
    match store.save(&run.items) {
        Ok(out) => info!(added = out.added, total = out.total, "news file updated"),
        Err(e) => warn!(error = ?e, "news file not saved"),
    }
    if let Err(e) = store.prune(cfg.storage.retention_days) {
        warn!(error = ?e, "retention pruning failed");
    }

    // --- Discover ---
    if cfg.discovery.enabled {
        let candidates = pipeline.discovery_candidates(&run);
        let engine = DiscoveryEngine::new(cfg.discovery.clone(), backend.clone(), clock.clone());
        let (report, history) = engine.run(&candidates, &cfg.discovery.history_path).await;
        for s in &report.suggestions {
            info!(
                name = %s.name,
                articles = s.article_count,
                confidence = s.confidence,
                terms = ?s.key_terms,
                "topic suggestion"
            );
        }
        for t in history.trending(cfg.discovery.trending_days, clock.now()) {
            info!(name = %t.name, confidence = t.confidence, "trending topic");
        }
        for u in history.suggest_updates(
            &cfg.catalog,
            cfg.discovery.promote_confidence,
            cfg.discovery.promote_min_articles,
        ) {
            info!(category = %u.category.name, reason = %u.reason, "suggested category addition");
        }
    }

    let usage = backend.stats();
    info!(
        provider = backend.provider_name(),
        calls = usage.total_calls,
        cache_hits = usage.cache_hits,
        errors = usage.errors,
        "backend usage"
    );

    // --- Report ---
    for (category, count) in &run.stats.trends.by_category {
        println!("\n## {category} ({count})");
        if let Some(words) = run.stats.keywords.get(category) {
            let words: Vec<&str> = words.iter().map(|(w, _)| w.as_str()).collect();
            println!("keywords: {}", words.join(", "));
        }
        for it in run.items.iter().filter(|i| &i.category == category) {
            println!("- [{:.3}] {} ({})", it.score, it.title, it.source);
        }
    }
    println!(
        "\n{} curated of {} fetched ({} invalid, {} duplicates)",
        run.stats.selected,
        run.stats.raw,
        run.stats.invalid,
        run.stats.exact_duplicates + run.stats.same_topic_duplicates + run.stats.similar_titles
    );
    Ok(())
}
