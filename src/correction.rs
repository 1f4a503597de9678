//! Multi-strategy query correction.
//!
//! ```text
//!                   ┌─────────────────────────────┐
//! error message ───►│ ErrorClassifier (optional)  │──► attempt 0
//!                   └─────────────────────────────┘
//!                   ┌─────────────────────────────┐
//! query ───────────►│ typos + syntax >= 0.8       │ conservative
//!                   │ + performance >= 0.7        │ moderate
//!                   │ + semantic >= 0.6           │ moderate
//!                   │ + everything < 0.6          │ aggressive
//!                   └─────────────────────────────┘
//!                                 │
//!                                 ▼
//!          stable sort by (confidence, estimated_success_rate) desc
//! ```
//!
//! Strategies are strictly additive: every attempt produced by a weaker
//! strategy is also produced by the stronger ones.

mod rules;
mod typos;

use std::{fmt, str::FromStr, sync::Arc};

pub use rules::{CORRECTION_RULES, CorrectionRule, RuleCategory, RuleFix};
use serde::{Deserialize, Serialize};
use smallvec::smallvec;
use tracing::debug;
pub use typos::{KEYWORD_TYPOS, find_typos, fix_common_typos, map_outside_literals};

use crate::{
    config::CorrectionConfig,
    error::{AppError, input_error},
    injection::RiskLevel,
    recovery::{Corrections, ErrorClassifier},
    stats::StatsCollector,
    validator::SecurityReport
};

/// How far the correction service may go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionStrategy {
    /// Typos and high-confidence syntax repairs
    Conservative,
    /// Adds performance and semantic rewrites
    #[default]
    Moderate,
    /// Adds every remaining low-confidence rule
    Aggressive
}

impl CorrectionStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Moderate => "moderate",
            Self::Aggressive => "aggressive"
        }
    }

    /// Strategy for the n-th progressive retry
    pub fn for_attempt(index: u32) -> Self {
        match index {
            0 => Self::Conservative,
            1 => Self::Moderate,
            _ => Self::Aggressive
        }
    }
}

impl fmt::Display for CorrectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CorrectionStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "moderate" => Ok(Self::Moderate),
            "aggressive" => Ok(Self::Aggressive),
            other => Err(input_error(format!("unknown correction strategy: {}", other)))
        }
    }
}

/// One candidate rewrite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionAttempt {
    pub strategy:               CorrectionStrategy,
    pub original_query:         String,
    pub corrected_query:        String,
    pub confidence:             f64,
    pub corrections_applied:    Corrections,
    pub estimated_success_rate: f64,
    /// `error_recovery`, `typo_fix` or the rule name
    pub source:                 &'static str
}

impl CorrectionAttempt {
    pub fn changed(&self) -> bool {
        self.corrected_query != self.original_query
    }
}

/// Advisory, non-destructive finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub kind:        String,
    pub description: String,
    pub confidence:  f64,
    pub severity:    RiskLevel
}

impl Suggestion {
    pub fn new(kind: impl Into<String>, description: impl Into<String>, confidence: f64) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
            confidence,
            severity: severity_for(confidence)
        }
    }
}

fn severity_for(confidence: f64) -> RiskLevel {
    if confidence > 0.8 {
        RiskLevel::High
    } else if confidence > 0.6 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Severity first, then confidence, both descending; stable.
pub fn sort_suggestions(suggestions: &mut [Suggestion]) {
    suggestions.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
    });
}

/// Findings of a validation pass as suggestions: violations are critical,
/// warnings medium.
pub fn security_suggestions(report: &SecurityReport) -> Vec<Suggestion> {
    let violations = report.violations.iter().map(|v| Suggestion {
        kind:        "security_violation".to_string(),
        description: format!("Security issue: {}", v),
        confidence:  1.0,
        severity:    RiskLevel::Critical
    });
    let warnings = report.warnings.iter().map(|w| Suggestion {
        kind:        "security_warning".to_string(),
        description: format!("Security warning: {}", w),
        confidence:  0.8,
        severity:    RiskLevel::Medium
    });
    violations.chain(warnings).collect()
}

/// Produces ranked correction attempts for a query.
#[derive(Debug, Clone)]
pub struct CorrectionService {
    classifier: ErrorClassifier,
    config:     CorrectionConfig,
    stats:      Option<Arc<StatsCollector>>
}

impl Default for CorrectionService {
    fn default() -> Self {
        Self::new(ErrorClassifier::default(), CorrectionConfig::default())
    }
}

impl CorrectionService {
    pub fn new(classifier: ErrorClassifier, config: CorrectionConfig) -> Self {
        Self {
            classifier,
            config,
            stats: None
        }
    }

    pub fn with_stats(mut self, stats: Arc<StatsCollector>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    pub fn default_strategy(&self) -> CorrectionStrategy {
        self.config.default_strategy
    }

    /// Candidate rewrites, best first.
    ///
    /// `strategy` defaults to the configured one. When `error_message` is
    /// given and the classifier repairs the query, that repair is the first
    /// attempt discovered.
    pub fn correct(
        &self,
        query: &str,
        error_message: Option<&str>,
        strategy: Option<CorrectionStrategy>
    ) -> Vec<CorrectionAttempt> {
        let strategy = strategy.unwrap_or(self.config.default_strategy);
        let mut attempts = Vec::new();

        if let Some(message) = error_message {
            let recovery = self.classifier.recover(message, query);
            if recovery.success
                && let Some(corrected) = recovery.corrected_query
            {
                attempts.push(CorrectionAttempt {
                    strategy,
                    original_query: query.to_string(),
                    corrected_query: corrected,
                    confidence: recovery.confidence,
                    corrections_applied: recovery.corrections_applied,
                    estimated_success_rate: recovery.confidence,
                    source: "error_recovery"
                });
            }
        }

        self.conservative(query, &mut attempts);
        if strategy != CorrectionStrategy::Conservative {
            self.moderate(query, &mut attempts);
        }
        if strategy == CorrectionStrategy::Aggressive {
            self.aggressive(query, &mut attempts);
        }

        attempts.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| b.estimated_success_rate.total_cmp(&a.estimated_success_rate))
        });

        debug!(
            strategy = %strategy,
            attempts = attempts.len(),
            "correction candidates generated"
        );
        if let Some(stats) = &self.stats {
            stats.record_correction(strategy, &attempts);
        }
        attempts
    }

    fn conservative(&self, query: &str, attempts: &mut Vec<CorrectionAttempt>) {
        self.apply_rules(
            query,
            attempts,
            CorrectionStrategy::Conservative,
            |rule| rule.category == RuleCategory::Syntax && rule.confidence >= 0.8,
            0.9
        );

        let corrected = fix_common_typos(query);
        if corrected != query {
            attempts.push(CorrectionAttempt {
                strategy:               CorrectionStrategy::Conservative,
                original_query:         query.to_string(),
                corrected_query:        corrected,
                confidence:             0.95,
                corrections_applied:    smallvec!["Fixed common typos".to_string()],
                estimated_success_rate: 0.9,
                source:                 "typo_fix"
            });
        }
    }

    fn moderate(&self, query: &str, attempts: &mut Vec<CorrectionAttempt>) {
        self.apply_rules(
            query,
            attempts,
            CorrectionStrategy::Moderate,
            |rule| rule.category == RuleCategory::Performance && rule.confidence >= 0.7,
            0.8
        );
        self.apply_rules(
            query,
            attempts,
            CorrectionStrategy::Moderate,
            |rule| rule.category == RuleCategory::Semantic && rule.confidence >= 0.6,
            0.7
        );
    }

    fn aggressive(&self, query: &str, attempts: &mut Vec<CorrectionAttempt>) {
        self.apply_rules(
            query,
            attempts,
            CorrectionStrategy::Aggressive,
            |rule| rule.confidence < 0.6,
            0.5
        );
    }

    fn apply_rules(
        &self,
        query: &str,
        attempts: &mut Vec<CorrectionAttempt>,
        strategy: CorrectionStrategy,
        select: impl Fn(&CorrectionRule) -> bool,
        success_factor: f64
    ) {
        let ctx = rules::RuleContext {
            schema:        self.classifier.schema(),
            default_limit: self.config.default_limit
        };
        for rule in CORRECTION_RULES.iter().filter(|r| select(r)) {
            let corrected = rule.fix.apply(query, &ctx);
            if corrected == query {
                continue;
            }
            attempts.push(CorrectionAttempt {
                strategy,
                original_query: query.to_string(),
                corrected_query: corrected,
                confidence: rule.confidence,
                corrections_applied: smallvec![rule.description.to_string()],
                estimated_success_rate: rule.confidence * success_factor,
                source: rule.name()
            });
        }
    }

    /// Advisory findings for `query` without rewriting it.
    pub fn get_correction_suggestions(&self, query: &str) -> Vec<Suggestion> {
        let mut suggestions: Vec<Suggestion> = CORRECTION_RULES
            .iter()
            .filter(|rule| rule.fix.detect(query))
            .map(|rule| Suggestion::new(rule.name(), rule.description, rule.confidence))
            .collect();

        let typos = find_typos(query);
        if !typos.is_empty() {
            suggestions.push(Suggestion {
                kind:        "typo_correction".to_string(),
                description: format!("Found potential typos: {}", typos.join(", ")),
                confidence:  0.9,
                severity:    RiskLevel::High
            });
        }

        sort_suggestions(&mut suggestions);
        suggestions
    }
}
