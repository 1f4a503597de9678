//! Database error classification and targeted repair.
//!
//! ```text
//! error message ──► classify ──► ErrorPattern ──► RecoveryFn ──► rewritten query
//!                      │                              │
//!                      └─ highest confidence wins     └─ SchemaCache (fuzzy names)
//! ```
//!
//! Recovery never executes SQL. A [`RecoveryResult`] is only successful when
//! the rewrite actually changed the query text.

mod fixes;
mod patterns;

use std::{borrow::Cow, sync::Arc};

pub(crate) use fixes::{add_select_comma, fix_group_by, unquote_numbers};
pub use fixes::{group_by_columns, replace_word, split_top_level};
pub use patterns::{ERROR_PATTERNS, ErrorPattern, ErrorType, RecoveryFn};
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::{config::RecoveryConfig, schema::SchemaCache, stats::StatsCollector};

/// Human readable descriptions of the rewrites that were applied
pub type Corrections = SmallVec<[String; 2]>;

/// Outcome of matching an error message against the pattern table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub error_type:    ErrorType,
    pub confidence:    f64,
    /// Capture groups of the winning pattern, empty groups as ""
    pub captures:      Vec<String>,
    #[serde(skip)]
    pub pattern_index: Option<usize>
}

impl Classification {
    fn unknown() -> Self {
        Self {
            error_type:    ErrorType::UnknownError,
            confidence:    0.0,
            captures:      Vec::new(),
            pattern_index: None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryResult {
    pub success:             bool,
    pub corrected_query:     Option<String>,
    pub error_type:          ErrorType,
    pub corrections_applied: Corrections,
    pub confidence:          f64,
    pub suggestion:          Option<String>,
    pub original_error:      String
}

/// Pattern based recovery engine.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    patterns: Cow<'static, [ErrorPattern]>,
    schema:   Arc<SchemaCache>,
    config:   RecoveryConfig,
    stats:    Option<Arc<StatsCollector>>
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(Arc::new(SchemaCache::new()), RecoveryConfig::default())
    }
}

impl ErrorClassifier {
    pub fn new(schema: Arc<SchemaCache>, config: RecoveryConfig) -> Self {
        Self {
            patterns: Cow::Borrowed(ERROR_PATTERNS.as_slice()),
            schema,
            config,
            stats: None
        }
    }

    /// Use a custom pattern table instead of the built-in one
    pub fn with_patterns(mut self, patterns: Vec<ErrorPattern>) -> Self {
        self.patterns = Cow::Owned(patterns);
        self
    }

    pub fn with_stats(mut self, stats: Arc<StatsCollector>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn schema(&self) -> &Arc<SchemaCache> {
        &self.schema
    }

    pub fn patterns(&self) -> &[ErrorPattern] {
        &self.patterns
    }

    /// Classify an error message.
    ///
    /// Patterns whose regex failed to compile never match.
    pub fn classify(&self, error_message: &str) -> Classification {
        let mut best = Classification::unknown();

        for (index, pattern) in self.patterns.iter().enumerate() {
            let Some(regex) = &pattern.regex else {
                continue;
            };
            let Some(caps) = regex.captures(error_message) else {
                continue;
            };
            if best.pattern_index.is_some() && pattern.confidence <= best.confidence {
                continue;
            }
            best = Classification {
                error_type:    pattern.error_type,
                confidence:    pattern.confidence,
                captures:      caps
                    .iter()
                    .skip(1)
                    .map(|m| m.map_or(String::new(), |m| m.as_str().to_string()))
                    .collect(),
                pattern_index: Some(index)
            };
        }

        best
    }

    /// Classify the error and rewrite the query with the bound fix.
    pub fn recover(&self, error_message: &str, query: &str) -> RecoveryResult {
        let classification = self.classify(error_message);
        let recovery = classification
            .pattern_index
            .and_then(|i| self.patterns.get(i))
            .and_then(|p| p.recovery);

        let mut result = RecoveryResult {
            success:             false,
            corrected_query:     None,
            error_type:          classification.error_type,
            corrections_applied: Corrections::new(),
            confidence:          classification.confidence,
            suggestion:          None,
            original_error:      error_message.to_string()
        };

        match recovery {
            None => {
                result.suggestion =
                    Some("No automatic recovery available for this error type.".to_string());
            }
            Some(recovery) => {
                let ctx = fixes::FixContext {
                    schema: &self.schema,
                    config: &self.config
                };
                let (corrected, corrections) =
                    fixes::apply(recovery, query, &classification.captures, &ctx);

                if corrected != query {
                    info!(
                        error_type = %result.error_type,
                        fix = recovery.as_str(),
                        "query repaired from database error"
                    );
                    result.success = true;
                    result.corrected_query = Some(corrected);
                    result.corrections_applied = corrections;
                } else {
                    debug!(fix = recovery.as_str(), "recovery left query unchanged");
                    result.suggestion = Some(format!(
                        "Could not automatically fix {}. Manual intervention required.",
                        result.error_type
                    ));
                }
            }
        }

        if let Some(stats) = &self.stats {
            stats.record_recovery(&result);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier_with_users() -> ErrorClassifier {
        let schema = Arc::new(SchemaCache::new());
        schema.insert_table("users", ["id", "user_name", "email"]);
        schema.insert_table("orders", ["id", "user_id", "total"]);
        ErrorClassifier::new(schema, RecoveryConfig::default())
    }

    #[test]
    fn test_builtin_patterns_compile() {
        assert!(ERROR_PATTERNS.iter().all(|p| p.regex.is_some()));
    }

    #[test]
    fn test_classify_unknown() {
        let c = ErrorClassifier::default().classify("something odd happened");
        assert_eq!(c.error_type, ErrorType::UnknownError);
        assert_eq!(c.confidence, 0.0);
        assert!(c.captures.is_empty());
    }

    #[test]
    fn test_classify_captures_identifier() {
        let c = ErrorClassifier::default().classify(r#"ERROR: column "usr_nam" does not exist"#);
        assert_eq!(c.error_type, ErrorType::ColumnNotFound);
        assert_eq!(c.captures, vec!["usr_nam"]);
    }

    #[test]
    fn test_classify_highest_confidence_wins() {
        let patterns = vec![
            ErrorPattern::new("boom", ErrorType::SyntaxError, "low", None, 0.3),
            ErrorPattern::new("boom", ErrorType::TimeoutError, "high", None, 0.9),
            ErrorPattern::new("boom", ErrorType::TypeMismatch, "tie", None, 0.9)
        ];
        let classifier = ErrorClassifier::default().with_patterns(patterns);
        let c = classifier.classify("BOOM");
        assert_eq!(c.error_type, ErrorType::TimeoutError);
    }

    #[test]
    fn test_broken_pattern_never_matches() {
        let patterns = vec![ErrorPattern::new("(unclosed", ErrorType::SyntaxError, "bad", None, 1.0)];
        let classifier = ErrorClassifier::default().with_patterns(patterns);
        assert_eq!(classifier.classify("(unclosed").error_type, ErrorType::UnknownError);
    }

    #[test]
    fn test_recover_column_from_schema() {
        let result = classifier_with_users().recover(
            r#"column "usr_nam" does not exist"#,
            "SELECT usr_nam FROM users LIMIT 10"
        );
        assert!(result.success);
        let corrected = result.corrected_query.unwrap();
        assert!(corrected.contains("user_name"));
        assert!(!corrected.contains("usr_nam"));
        assert_eq!(result.corrections_applied[0], "Replaced 'usr_nam' with 'user_name'");
    }

    #[test]
    fn test_recover_table_name() {
        let result = classifier_with_users().recover(
            "no such table: userz",
            "SELECT id FROM userz LIMIT 5"
        );
        assert!(result.success);
        assert_eq!(
            result.corrected_query.as_deref(),
            Some("SELECT id FROM users LIMIT 5")
        );
    }

    #[test]
    fn test_recover_without_fix_has_suggestion() {
        let result = ErrorClassifier::default()
            .recover("permission denied for table salaries", "SELECT * FROM salaries");
        assert!(!result.success);
        assert_eq!(result.error_type, ErrorType::PermissionError);
        assert_eq!(
            result.suggestion.as_deref(),
            Some("No automatic recovery available for this error type.")
        );
    }

    #[test]
    fn test_recover_unchanged_is_failure() {
        let result = ErrorClassifier::default().recover(
            r#"column "zzz" does not exist"#,
            "SELECT zzz FROM t"
        );
        assert!(!result.success);
        assert!(result.corrected_query.is_none());
        assert!(
            result
                .suggestion
                .unwrap()
                .starts_with("Could not automatically fix column_not_found")
        );
    }

    #[test]
    fn test_recover_group_by() {
        let result = ErrorClassifier::default().recover(
            r#"column "orders.region" must appear in the GROUP BY clause or be used in an aggregate function"#,
            "SELECT region, SUM(total) FROM orders LIMIT 10;"
        );
        assert!(result.success);
        assert_eq!(
            result.corrected_query.as_deref(),
            Some("SELECT region, SUM(total) FROM orders GROUP BY region LIMIT 10;")
        );
    }

    #[test]
    fn test_recover_records_stats() {
        let stats = Arc::new(StatsCollector::new());
        let classifier = classifier_with_users().with_stats(stats.clone());
        classifier.recover(r#"column "user_nme" does not exist"#, "SELECT user_nme FROM users");
        classifier.recover("could not connect to server", "SELECT 1");
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.recovery.total_attempts, 2);
        assert_eq!(snapshot.recovery.successful_recoveries, 1);
    }
}
