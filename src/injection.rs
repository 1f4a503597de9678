//! SQL injection pattern detection.
//!
//! The detector scans raw query text against a fixed, categorized table of
//! [`RiskPattern`]s and reports every hit with its span. It never rewrites the
//! query. Scoring sums per-match weights and caps the result at 100, while the
//! reported level is the highest individual severity seen.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │ Query text  │────▶│ InjectionDetector│────▶│ Vec<PatternMatch>│
//! └─────────────┘     └──────────────────┘     └──────────────────┘
//!                            │                          │
//!                     ┌──────┴──────┐            ┌──────┴──────┐
//!                     │ RISK_PATTERNS│           │ risk_score  │
//!                     │  (parallel) │            │ (score,lvl) │
//!                     └─────────────┘            └─────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use sql_query_guard::injection::{InjectionDetector, RiskLevel};
//!
//! let detector = InjectionDetector::new();
//! let matches = detector.detect("SELECT name FROM users WHERE 1=1 OR 1=1");
//! let (score, level) = InjectionDetector::risk_score(&matches);
//!
//! assert_eq!(level, RiskLevel::Critical);
//! assert_eq!(score, 100);
//! ```

mod patterns;
mod types;

use std::borrow::Cow;

use indexmap::IndexMap;
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
pub use patterns::{RISK_PATTERNS, WHITELIST};
pub use types::{PatternMatch, RiskCategory, RiskLevel, RiskPattern};

/// Categorized scan of one query.
#[derive(Debug, Clone, Serialize)]
pub struct InjectionReport {
    pub query_preview:        String,
    pub risk_score:           u32,
    pub risk_level:           RiskLevel,
    pub is_whitelisted:       bool,
    pub patterns_detected:    usize,
    pub patterns_by_category: IndexMap<RiskCategory, Vec<PatternMatch>>,
    pub detailed_patterns:    Vec<PatternMatch>,
    pub recommendations:      Vec<String>,
    /// Score below the high threshold and no critical hit
    pub safe_to_execute:      bool
}

/// Pattern-based injection detector.
///
/// Holds borrowed views of the process-wide tables by default. A custom table
/// can be supplied for testing or for deployments with extra rules.
#[derive(Debug, Clone)]
pub struct InjectionDetector {
    patterns:  Cow<'static, [RiskPattern]>,
    whitelist: Cow<'static, [Regex]>
}

impl Default for InjectionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl InjectionDetector {
    /// Create a detector over the built-in tables
    pub fn new() -> Self {
        Self {
            patterns:  Cow::Borrowed(RISK_PATTERNS.as_slice()),
            whitelist: Cow::Borrowed(WHITELIST.as_slice())
        }
    }

    /// Create a detector over a custom pattern table
    pub fn with_patterns(patterns: Vec<RiskPattern>) -> Self {
        Self {
            patterns:  Cow::Owned(patterns),
            whitelist: Cow::Borrowed(WHITELIST.as_slice())
        }
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Descriptions of rules whose regex failed to compile
    pub fn broken_patterns(&self) -> Vec<&'static str> {
        self.patterns
            .iter()
            .filter(|p| p.is_broken())
            .map(|p| p.description)
            .collect()
    }

    /// Run every pattern against the trimmed query.
    ///
    /// Results keep the table's category order and, within one pattern, the
    /// order of occurrence in the text.
    pub fn detect(&self, query: &str) -> Vec<PatternMatch> {
        let normalized = query.trim();
        if normalized.is_empty() {
            return Vec::new();
        }

        self.patterns
            .par_iter()
            .flat_map_iter(|pattern| {
                pattern
                    .regex
                    .iter()
                    .flat_map(|regex| regex.find_iter(normalized))
                    .map(|m| PatternMatch {
                        category:    pattern.category,
                        description: pattern.description,
                        risk_level:  pattern.risk_level,
                        matched:     m.as_str().to_string(),
                        span:        (m.start(), m.end())
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Aggregate score capped at 100 and the highest individual level
    pub fn risk_score(matches: &[PatternMatch]) -> (u32, RiskLevel) {
        let total: u32 = matches.iter().map(|m| m.risk_level.weight()).sum();
        let level = matches
            .iter()
            .map(|m| m.risk_level)
            .max()
            .unwrap_or(RiskLevel::Safe);
        (total.min(100), level)
    }

    /// Whether the query has one of the conservative safe shapes.
    ///
    /// Informational only: a whitelisted query may still carry violations.
    pub fn is_whitelisted(&self, query: &str) -> bool {
        let normalized = query.trim();
        self.whitelist.iter().any(|regex| regex.is_match(normalized))
    }

    /// Full categorized report for one query
    pub fn report(&self, query: &str) -> InjectionReport {
        let matches = self.detect(query);
        let (risk_score, risk_level) = Self::risk_score(&matches);

        let mut by_category: IndexMap<RiskCategory, Vec<PatternMatch>> = IndexMap::new();
        for m in &matches {
            by_category.entry(m.category).or_default().push(m.clone());
        }

        let mut recommendations = Vec::new();
        if !matches.is_empty() {
            recommendations.push("Review query for potential security vulnerabilities".to_string());
            if matches.iter().any(|m| m.risk_level.is_blocking()) {
                recommendations
                    .push("Consider using parameterized queries or prepared statements".to_string());
            }
            if by_category.keys().any(|c| c.is_injection()) {
                recommendations.push("Validate and sanitize all user inputs".to_string());
            }
            if by_category.contains_key(&RiskCategory::Obfuscation) {
                recommendations
                    .push("Remove unnecessary comments that might hide malicious code".to_string());
            }
        }

        let safe_to_execute =
            risk_score < 75 && !matches.iter().any(|m| m.risk_level == RiskLevel::Critical);

        InjectionReport {
            query_preview: preview(query, 100),
            risk_score,
            risk_level,
            is_whitelisted: self.is_whitelisted(query),
            patterns_detected: matches.len(),
            patterns_by_category: by_category,
            detailed_patterns: matches,
            recommendations,
            safe_to_execute
        }
    }

    /// True when no critical pattern fires
    pub fn quick_check(&self, query: &str) -> bool {
        !self
            .detect(query)
            .iter()
            .any(|m| m.risk_level == RiskLevel::Critical)
    }

    /// One-line summary suitable for log output
    pub fn summary(&self, query: &str) -> String {
        let report = self.report(query);
        if report.risk_score == 0 {
            return "No security risks detected".to_string();
        }
        format!(
            "Risk Level: {} (Score: {}/100), Patterns: {}",
            report.risk_level.as_str().to_uppercase(),
            report.risk_score,
            report.patterns_detected
        )
    }
}

/// Truncate to `max` characters, marking the cut with an ellipsis
pub fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}
