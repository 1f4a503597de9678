//! Security validation gate.
//!
//! [`SecurityValidator`] wraps the [`InjectionDetector`] with its own rule
//! tables and structural limits. Every step runs for every query so the
//! caller always receives one consolidated [`SecurityReport`].
//!
//! # Steps
//!
//! 1. Empty query is rejected outright
//! 2. Injection detector: critical/high hits are violations, the rest warnings
//! 3. Maximum query length
//! 4. Critical rule table, an unconditional block
//! 5. Medium rule table (warnings, except the always-true condition)
//! 6. `SELECT *` performance warning
//! 7. Suspicious function calls, three or more lift the level to medium
//! 8. Required LIMIT/TOP on top-level SELECT
//! 9. Maximum LIMIT value
//! 10. JOIN count and parenthesis heuristics (advisory only)
//!
//! A rule whose regex failed to compile makes every query unsafe.

mod report;
mod rules;

use std::sync::Arc;

use rayon::prelude::*;
pub use report::{SecurityReport, query_hash};
use report::ReportBuilder;
use tracing::{debug, warn};

use crate::{
    config::SecurityConfig,
    injection::{InjectionDetector, RiskLevel},
    stats::StatsCollector
};

/// Allow/block decision maker for candidate queries.
#[derive(Debug, Clone)]
pub struct SecurityValidator {
    config:   SecurityConfig,
    detector: InjectionDetector,
    stats:    Option<Arc<StatsCollector>>
}

impl Default for SecurityValidator {
    fn default() -> Self {
        Self::new(SecurityConfig::default())
    }
}

impl SecurityValidator {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            config,
            detector: InjectionDetector::new(),
            stats: None
        }
    }

    /// Replace the injection detector
    pub fn with_detector(mut self, detector: InjectionDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Report every validation into a shared collector
    pub fn with_stats(mut self, stats: Arc<StatsCollector>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn detector(&self) -> &InjectionDetector {
        &self.detector
    }

    /// Validate one query.
    pub fn validate(&self, query: &str) -> SecurityReport {
        let report = self.run_checks(query);

        if report.is_safe {
            debug!(
                query_hash = %report.query_hash,
                warnings = report.warnings.len(),
                "security validation passed"
            );
        } else {
            warn!(
                query_hash = %report.query_hash,
                risk_level = %report.risk_level,
                violations = report.violations.len(),
                "query blocked by security validation"
            );
        }

        if let Some(stats) = &self.stats {
            stats.record_validation(&report);
        }
        report
    }

    /// Validate a batch in parallel, keeping input order
    pub fn validate_many(&self, queries: &[&str]) -> Vec<SecurityReport> {
        queries.par_iter().map(|q| self.validate(q)).collect()
    }

    fn run_checks(&self, query: &str) -> SecurityReport {
        let normalized = query.trim();
        let mut builder = ReportBuilder::default();

        // 1. Empty
        if normalized.is_empty() {
            builder.violation("Empty query not allowed", RiskLevel::Medium);
            return builder.finish(normalized, 0, false);
        }

        // Broken rule tables fail closed
        let broken: Vec<&str> = self
            .detector
            .broken_patterns()
            .into_iter()
            .chain(rules::broken_rules())
            .collect();
        for description in broken {
            builder.violation(
                format!("Security rule unavailable: {}", description),
                RiskLevel::Critical
            );
        }

        // 2. Injection detector
        let matches = self.detector.detect(normalized);
        let (risk_score, _) = InjectionDetector::risk_score(&matches);
        for m in &matches {
            if m.risk_level.is_blocking() {
                builder.violation(
                    format!("SQL injection pattern detected: {}", m.description),
                    m.risk_level
                );
            } else {
                builder.warning(format!("Potential issue: {}", m.description), m.risk_level);
            }
        }
        if matches.iter().any(|m| m.risk_level.is_blocking()) {
            builder.recommend("Use parameterized queries instead of string concatenation");
        }

        // 3. Length
        if normalized.chars().count() > self.config.max_query_length {
            builder.violation(
                format!(
                    "Query length exceeds {} characters",
                    self.config.max_query_length
                ),
                RiskLevel::Medium
            );
        }

        // 4. Critical table
        for rule in rules::CRITICAL_RULES.iter() {
            if rule.is_match(normalized) {
                builder.violation(rule.description, rule.risk_level);
            }
        }

        // 5. Medium table
        for rule in rules::MEDIUM_RULES.iter() {
            if rule.is_match(normalized) {
                if rule.risk_level.is_blocking() {
                    builder.violation(rule.description, rule.risk_level);
                } else {
                    builder.warning(rule.description, rule.risk_level);
                }
            }
        }

        // 6. Unbounded column list
        if rules::SELECT_STAR.is_match(normalized) {
            builder.warning(rules::SELECT_STAR.description, rules::SELECT_STAR.risk_level);
            builder.recommend("Consider optimizing query performance");
        }

        // 7. Suspicious functions
        let suspicious: Vec<&str> = rules::SUSPICIOUS_CALLS
            .iter()
            .filter(|(_, regex)| regex.as_ref().is_some_and(|r| r.is_match(normalized)))
            .map(|(name, _)| *name)
            .collect();
        if !suspicious.is_empty() {
            let level = if suspicious.len() >= 3 {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            };
            builder.warning(
                format!("Suspicious functions detected: {}", suspicious.join(", ")),
                level
            );
        }

        // 8. Required LIMIT
        if self.config.require_limit && is_top_level_select(normalized) && !has_row_bound(normalized)
        {
            builder.violation("SELECT queries must include LIMIT clause", RiskLevel::Medium);
            builder.recommend("Add LIMIT clause to prevent excessive resource usage");
        }

        // 9. LIMIT value
        if let Some(value) = limit_value(normalized)
            && value > self.config.max_limit_value
        {
            builder.violation(
                format!(
                    "LIMIT value {} exceeds maximum allowed {}",
                    value, self.config.max_limit_value
                ),
                RiskLevel::Medium
            );
        }

        // 10. Complexity heuristics
        let joins = count_matches(&rules::JOIN_KEYWORD, normalized);
        if joins > self.config.max_joins {
            builder.warning(
                format!(
                    "Query has {} JOINs (max recommended: {})",
                    joins, self.config.max_joins
                ),
                RiskLevel::Low
            );
            builder.recommend("Consider breaking complex queries into smaller parts");
        }

        let open = normalized.matches('(').count() as i64;
        let close = normalized.matches(')').count() as i64;
        let subqueries = count_matches(&rules::NESTED_SELECT, normalized);
        if (open - close).unsigned_abs() as usize > self.config.max_subqueries
            || subqueries > self.config.max_subqueries
        {
            builder.warning("Complex nested subqueries detected", RiskLevel::Low);
            builder.recommend("Consider simplifying query structure");
        }

        let whitelisted = self.detector.is_whitelisted(normalized);
        builder.finish(normalized, risk_score, whitelisted)
    }
}

fn is_top_level_select(query: &str) -> bool {
    query
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("SELECT"))
}

fn has_row_bound(query: &str) -> bool {
    rules::LIMIT_KEYWORD
        .as_ref()
        .is_some_and(|r| r.is_match(query))
}

/// First LIMIT value; an unparsable number is treated as unbounded
fn limit_value(query: &str) -> Option<u64> {
    let caps = rules::LIMIT_VALUE.as_ref()?.captures(query)?;
    Some(caps[1].parse().unwrap_or(u64::MAX))
}

fn count_matches(regex: &Option<regex::Regex>, query: &str) -> usize {
    regex.as_ref().map_or(0, |r| r.find_iter(query).count())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SecurityValidator {
        SecurityValidator::default()
    }

    #[test]
    fn test_validator_tables_compile() {
        assert!(rules::broken_rules().is_empty());
    }

    #[test]
    fn test_empty_query_rejected() {
        let report = validator().validate("   ");
        assert!(!report.is_safe);
        assert_eq!(report.violations, vec!["Empty query not allowed"]);
    }

    #[test]
    fn test_length_limit() {
        let config = SecurityConfig {
            max_query_length: 20,
            ..Default::default()
        };
        let report = SecurityValidator::new(config).validate("SELECT id, name FROM users LIMIT 5");
        assert!(
            report
                .violations
                .iter()
                .any(|v| v.starts_with("Query length exceeds 20"))
        );
    }

    #[test]
    fn test_limit_value_too_large() {
        let report = validator().validate("SELECT id FROM users LIMIT 5000");
        assert!(!report.is_safe);
        assert!(
            report
                .violations
                .contains(&"LIMIT value 5000 exceeds maximum allowed 1000".to_string())
        );
    }

    #[test]
    fn test_top_counts_as_bound() {
        let report = validator().validate("SELECT TOP 10 id FROM users");
        assert!(report.is_safe, "{:?}", report.violations);
    }

    #[test]
    fn test_require_limit_disabled() {
        let config = SecurityConfig {
            require_limit: false,
            ..Default::default()
        };
        let report = SecurityValidator::new(config).validate("SELECT id FROM users");
        assert!(report.is_safe);
    }

    #[test]
    fn test_suspicious_functions_raise_medium() {
        let report = validator().validate("SELECT HEX(name), ASCII(name), VERSION() FROM t LIMIT 1");
        assert!(
            report
                .warnings
                .iter()
                .any(|w| w.starts_with("Suspicious functions detected"))
        );
        assert!(report.risk_level >= RiskLevel::Medium);
    }

    #[test]
    fn test_many_joins_warn_only() {
        let query = "SELECT a.id FROM a JOIN b ON a.id=b.id JOIN c ON a.id=c.id JOIN d ON a.id=d.id \
                     JOIN e ON a.id=e.id JOIN f ON a.id=f.id JOIN g ON a.id=g.id LIMIT 10";
        let report = validator().validate(query);
        assert!(report.is_safe);
        assert!(report.warnings.iter().any(|w| w.contains("6 JOINs")));
    }

    #[test]
    fn test_validate_many_keeps_order() {
        let reports = validator().validate_many(&["SELECT id FROM t LIMIT 1", "DROP TABLE t"]);
        assert!(reports[0].is_safe);
        assert!(!reports[1].is_safe);
    }

    #[test]
    fn test_stats_recorded() {
        let stats = Arc::new(StatsCollector::new());
        let validator = validator().with_stats(stats.clone());
        validator.validate("SELECT * FROM orders");
        validator.validate("SELECT id FROM orders LIMIT 1");
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.security.total_queries, 2);
        assert_eq!(snapshot.security.blocked_queries, 1);
    }
}
