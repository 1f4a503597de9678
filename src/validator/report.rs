use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::injection::RiskLevel;

/// Consolidated verdict of one validation pass.
///
/// `is_safe` is false exactly when `violations` is non-empty, and
/// `risk_level` is the maximum severity over every rule that matched.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityReport {
    pub is_safe:         bool,
    pub message:         String,
    pub violations:      Vec<String>,
    pub warnings:        Vec<String>,
    pub risk_level:      RiskLevel,
    /// Capped injection score of the detector pass
    pub risk_score:      u32,
    pub query_hash:      String,
    pub recommendations: Vec<String>,
    pub whitelisted:     bool,
    pub checked_at:      DateTime<Utc>
}

impl SecurityReport {
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }

    /// Text returned to the agent when a query is refused
    pub fn block_message(&self) -> String {
        let mut out =
            String::from("Security Error: Query blocked due to security violations.\n\nViolations:\n");
        for violation in &self.violations {
            out.push_str(&format!("• {}\n", violation));
        }
        if !self.recommendations.is_empty() {
            out.push_str("\nRecommendations:\n");
            for rec in self.recommendations.iter().take(3) {
                out.push_str(&format!("• {}\n", rec));
            }
        }
        out.trim_end().to_string()
    }
}

/// Short stable digest used to correlate log lines and monitor events
pub fn query_hash(query: &str) -> String {
    let digest = Sha256::digest(query.as_bytes());
    digest[..4].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Accumulates findings while the validation steps run.
#[derive(Debug, Default)]
pub(crate) struct ReportBuilder {
    violations:      Vec<String>,
    warnings:        Vec<String>,
    recommendations: Vec<String>,
    risk_level:      RiskLevel
}

impl ReportBuilder {
    pub fn raise(&mut self, level: RiskLevel) {
        self.risk_level = self.risk_level.max(level);
    }

    pub fn violation(&mut self, message: impl Into<String>, level: RiskLevel) {
        push_unique(&mut self.violations, message.into());
        self.raise(level);
    }

    pub fn warning(&mut self, message: impl Into<String>, level: RiskLevel) {
        push_unique(&mut self.warnings, message.into());
        self.raise(level);
    }

    pub fn recommend(&mut self, message: impl Into<String>) {
        push_unique(&mut self.recommendations, message.into());
    }

    pub fn finish(
        mut self,
        query: &str,
        risk_score: u32,
        whitelisted: bool
    ) -> SecurityReport {
        // Any blocking finding is at least medium, whatever rule produced it
        if !self.violations.is_empty() {
            self.raise(RiskLevel::Medium);
        }

        let is_safe = self.violations.is_empty();
        let message = if is_safe {
            if self.warnings.is_empty() {
                "Security validation passed".to_string()
            } else {
                format!(
                    "Security validation passed (with {} warnings)",
                    self.warnings.len()
                )
            }
        } else {
            format!(
                "Security validation failed: {} violations detected",
                self.violations.len()
            )
        };

        SecurityReport {
            is_safe,
            message,
            violations: self.violations,
            warnings: self.warnings,
            risk_level: self.risk_level,
            risk_score,
            query_hash: query_hash(query),
            recommendations: self.recommendations,
            whitelisted,
            checked_at: Utc::now()
        }
    }
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}
