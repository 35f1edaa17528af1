// tests/config_loading.rs
use std::path::PathBuf;

use serial_test::serial;
use tech_news_curator::config::{AppConfig, Priority, ENV_CONFIG_PATH};

fn shipped() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/curator.toml")
}

#[test]
#[serial]
fn env_var_selects_shipped_config() {
    std::env::set_var(ENV_CONFIG_PATH, shipped());
    let cfg = AppConfig::load_default();
    std::env::remove_var(ENV_CONFIG_PATH);
    let cfg = cfg.unwrap();

    let names: Vec<&str> = cfg.catalog.names().collect();
    assert_eq!(names, vec!["cybersecurity", "ai", "cloud", "webdev"]);
    assert_eq!(cfg.catalog.first().priority, Priority::High);
    assert_eq!(cfg.settings.default_category, "webdev");
    assert!(!cfg.dedup.same_topic_backend);
    assert!(!cfg.feeds.is_empty());
    for f in &cfg.feeds {
        assert!(f.url.starts_with("https://"), "{}", f.url);
    }
}

#[test]
#[serial]
fn env_var_pointing_nowhere_is_an_error() {
    std::env::set_var(ENV_CONFIG_PATH, "/definitely/not/here/curator.toml");
    let res = AppConfig::load_default();
    std::env::remove_var(ENV_CONFIG_PATH);
    assert!(res.is_err());
}

#[test]
fn json_file_is_loaded_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("curator.json");
    std::fs::write(
        &path,
        r#"{"settings":{"default_max_articles":2},
            "categories":[{"name":"Cloud","keywords":["AWS"],"max_articles":1}]}"#,
    )
    .unwrap();
    let cfg = AppConfig::load_from(&path).unwrap();
    assert_eq!(cfg.settings.default_max_articles, 2);
    assert_eq!(cfg.catalog.get("cloud").unwrap().keywords, vec!["aws"]);
}

#[test]
fn malformed_file_reports_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[[categories]\nname = ").unwrap();
    let err = AppConfig::load_from(&path).unwrap_err();
    assert!(format!("{err:#}").contains("broken.toml"));
}

#[test]
fn zero_default_cap_is_rejected() {
    let doc = "[settings]\ndefault_max_articles = 0\n[[categories]]\nname = \"ai\"\n";
    assert!(AppConfig::parse(doc, "toml").is_err());
}
