//! Configuration loading and management.
//!
//! Configuration is loaded from multiple sources with the following precedence
//! (highest to lowest):
//!
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. `.sql-query-guard.toml` in current directory
//! 4. `~/.config/sql-query-guard/config.toml`
//! 5. Default values
//!
//! # Configuration File Format
//!
//! ```toml
//! [security]
//! max_query_length = 5000
//! require_limit = true
//! max_limit_value = 1000
//!
//! [execution]
//! max_retry_attempts = 3
//! confidence_threshold = 0.6
//!
//! [selector]
//! enabled = true
//! similarity_threshold = 0.3
//! max_tables = 8
//! cache_dir = "vector_store_data/table_embeddings"
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `SEMANTIC_TABLE_SELECTION_ENABLED` | Enable the semantic table filter |
//! | `SIMILARITY_THRESHOLD` | Minimum cosine similarity for a table |
//! | `MAX_RELEVANT_TABLES` | Upper bound of selected tables |
//! | `VS_CACHE_DIR` | Directory of the embedding cache file |
//! | `SQL_GUARD_MAX_RETRIES` | Retry budget of the execution coordinator |
//! | `SQL_GUARD_REQUIRE_LIMIT` | Require LIMIT on top-level SELECT |

use std::{env, fs, path::PathBuf, str::FromStr};

use serde::Deserialize;

use crate::{
    correction::CorrectionStrategy,
    error::{AppResult, config_error}
};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub security:   SecurityConfig,
    #[serde(default)]
    pub recovery:   RecoveryConfig,
    #[serde(default)]
    pub correction: CorrectionConfig,
    #[serde(default)]
    pub execution:  ExecutionConfig,
    #[serde(default)]
    pub selector:   SelectorConfig,
    #[serde(default)]
    pub monitor:    MonitorConfig
}

/// Structural limits enforced by the security validator
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub max_query_length: usize,
    pub require_limit:    bool,
    pub max_limit_value:  u64,
    pub max_joins:        usize,
    pub max_subqueries:   usize
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_query_length: 5000,
            require_limit:    true,
            max_limit_value:  1000,
            max_joins:        5,
            max_subqueries:   3
        }
    }
}

/// Error recovery tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Minimum normalized similarity for a fuzzy identifier match
    pub similarity_cutoff: f64,
    /// Number of fuzzy candidates considered
    pub max_candidates:    usize,
    /// LIMIT injected when a statement times out
    pub timeout_limit:     u64,
    /// Column list substituted for `SELECT *` on timeout
    pub fallback_columns:  Vec<String>
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            similarity_cutoff: 0.6,
            max_candidates:    3,
            timeout_limit:     1000,
            fallback_columns:  vec![String::from("id"), String::from("name")]
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    pub default_strategy: CorrectionStrategy,
    /// LIMIT appended by the missing-limit rule
    pub default_limit:    u64
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            default_strategy: CorrectionStrategy::Moderate,
            default_limit:    100
        }
    }
}

/// Retry loop settings of the execution coordinator
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_retry_attempts:     u32,
    pub auto_correction:        bool,
    pub progressive_strategies: bool,
    pub confidence_threshold:   f64
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts:     3,
            auto_correction:        true,
            progressive_strategies: true,
            confidence_threshold:   0.6
        }
    }
}

/// Semantic table selection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub enabled:              bool,
    pub similarity_threshold: f32,
    pub max_tables:           usize,
    pub cache_dir:            PathBuf,
    pub dimensions:           usize,
    pub max_cache_age_days:   u64
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            enabled:              true,
            similarity_threshold: 0.3,
            max_tables:           8,
            cache_dir:            PathBuf::from("vector_store_data/table_embeddings"),
            dimensions:           384,
            max_cache_age_days:   7
        }
    }
}

/// Security event monitor settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled:                bool,
    /// Number of recent events kept in memory
    pub capacity:               usize,
    pub blocked_per_minute:     usize,
    pub high_risk_per_minute:   usize,
    pub violations_per_session: usize
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled:                true,
            capacity:               1000,
            blocked_per_minute:     10,
            high_risk_per_minute:   20,
            violations_per_session: 5
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file in current directory (.sql-query-guard.toml)
    /// 3. Config file in home directory
    ///    (~/.config/sql-query-guard/config.toml)
    /// 4. Default values
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(home) = env::var_os("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("sql-query-guard")
                .join("config.toml");

            if home_config.exists() {
                config = Self::from_file(&home_config)?;
            }
        }

        let local_config = PathBuf::from(".sql-query-guard.toml");
        if local_config.exists() {
            config = Self::from_file(&local_config)?;
        }

        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a single TOML config file
    pub fn from_file(path: &std::path::Path) -> AppResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| config_error(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| config_error(format!("Invalid config file: {}", e)))
    }

    /// Override values from an environment lookup
    ///
    /// The lookup is injected so overrides can be exercised without touching
    /// the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>
    {
        if let Some(value) = lookup("SEMANTIC_TABLE_SELECTION_ENABLED") {
            self.selector.enabled = parse_bool("SEMANTIC_TABLE_SELECTION_ENABLED", &value)?;
        }

        if let Some(value) = lookup("SIMILARITY_THRESHOLD") {
            self.selector.similarity_threshold = parse_value("SIMILARITY_THRESHOLD", &value)?;
        }

        if let Some(value) = lookup("MAX_RELEVANT_TABLES") {
            self.selector.max_tables = parse_value("MAX_RELEVANT_TABLES", &value)?;
        }

        if let Some(value) = lookup("VS_CACHE_DIR") {
            self.selector.cache_dir = PathBuf::from(value);
        }

        if let Some(value) = lookup("SQL_GUARD_MAX_RETRIES") {
            self.execution.max_retry_attempts = parse_value("SQL_GUARD_MAX_RETRIES", &value)?;
        }

        if let Some(value) = lookup("SQL_GUARD_REQUIRE_LIMIT") {
            self.security.require_limit = parse_bool("SQL_GUARD_REQUIRE_LIMIT", &value)?;
        }

        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> AppResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| config_error(format!("Invalid value for {}: '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> AppResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(config_error(format!("Invalid value for {}: '{}'", key, value)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_selector() {
        let mut config = Config::default();
        config
            .apply_env(lookup(&[
                ("SEMANTIC_TABLE_SELECTION_ENABLED", "false"),
                ("SIMILARITY_THRESHOLD", "0.45"),
                ("MAX_RELEVANT_TABLES", "12"),
                ("VS_CACHE_DIR", "/tmp/vectors")
            ]))
            .unwrap();

        assert!(!config.selector.enabled);
        assert!((config.selector.similarity_threshold - 0.45).abs() < f32::EPSILON);
        assert_eq!(config.selector.max_tables, 12);
        assert_eq!(config.selector.cache_dir, PathBuf::from("/tmp/vectors"));
    }

    #[test]
    fn test_env_overrides_execution() {
        let mut config = Config::default();
        config
            .apply_env(lookup(&[
                ("SQL_GUARD_MAX_RETRIES", "5"),
                ("SQL_GUARD_REQUIRE_LIMIT", "no")
            ]))
            .unwrap();

        assert_eq!(config.execution.max_retry_attempts, 5);
        assert!(!config.security.require_limit);
    }

    #[test]
    fn test_env_invalid_number() {
        let mut config = Config::default();
        let result = config.apply_env(lookup(&[("MAX_RELEVANT_TABLES", "many")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_env_invalid_bool() {
        let mut config = Config::default();
        let result = config.apply_env(lookup(&[("SEMANTIC_TABLE_SELECTION_ENABLED", "maybe")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_env_keeps_defaults() {
        let mut config = Config::default();
        config.apply_env(lookup(&[])).unwrap();
        assert!(config.selector.enabled);
        assert_eq!(config.execution.max_retry_attempts, 3);
    }
}
