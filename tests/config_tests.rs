use std::{fs, path::PathBuf};

use sql_query_guard::{
    config::{Config, SelectorConfig},
    correction::CorrectionStrategy
};
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = Config::default();

    assert!(config.security.require_limit);
    assert_eq!(config.security.max_limit_value, 1000);
    assert_eq!(config.execution.max_retry_attempts, 3);
    assert!(config.execution.auto_correction);
    assert_eq!(config.correction.default_strategy, CorrectionStrategy::Moderate);
    assert_eq!(config.correction.default_limit, 100);
}

#[test]
fn test_default_selector_config() {
    let config = SelectorConfig::default();

    assert!(config.enabled);
    assert!((config.similarity_threshold - 0.3).abs() < f32::EPSILON);
    assert_eq!(config.max_tables, 8);
    assert_eq!(config.max_cache_age_days, 7);
    assert_eq!(
        config.cache_dir,
        PathBuf::from("vector_store_data/table_embeddings")
    );
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = Config::from_toml(
        r#"
[security]
max_limit_value = 500

[correction]
default_strategy = "conservative"

[selector]
max_tables = 4
"#
    )
    .unwrap();

    assert_eq!(config.security.max_limit_value, 500);
    assert!(config.security.require_limit);
    assert_eq!(config.correction.default_strategy, CorrectionStrategy::Conservative);
    assert_eq!(config.selector.max_tables, 4);
    assert!((config.selector.similarity_threshold - 0.3).abs() < f32::EPSILON);
}

#[test]
fn test_invalid_toml_rejected() {
    assert!(Config::from_toml("[security\nrequire_limit = yes").is_err());
    assert!(Config::from_toml("[correction]\ndefault_strategy = \"reckless\"").is_err());
}

#[test]
fn test_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[execution]\nmax_retry_attempts = 1\n").unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.execution.max_retry_attempts, 1);
}

#[test]
fn test_from_missing_file() {
    assert!(Config::from_file(&PathBuf::from("/nonexistent/config.toml")).is_err());
}

#[test]
fn test_env_overrides() {
    let mut config = Config::default();
    config
        .apply_env(|key| match key {
            "SQL_GUARD_REQUIRE_LIMIT" => Some("off".to_string()),
            "MAX_RELEVANT_TABLES" => Some(" 5 ".to_string()),
            _ => None
        })
        .unwrap();

    assert!(!config.security.require_limit);
    assert_eq!(config.selector.max_tables, 5);
}

#[test]
fn test_env_invalid_value() {
    let mut config = Config::default();
    let result = config.apply_env(|key| (key == "SIMILARITY_THRESHOLD").then(|| "high".to_string()));
    assert!(result.is_err());
}
