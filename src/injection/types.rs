//! Type definitions for the injection detector.
//!
//! - [`RiskLevel`] - Ordinal severity of a finding (Safe < Low < ... <
//!   Critical)
//! - [`RiskCategory`] - Named family a pattern belongs to
//! - [`RiskPattern`] - One compiled detection rule
//! - [`PatternMatch`] - A rule hit with its span in the query

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Severity of a security finding.
///
/// Ordered from lowest to highest so that `max` yields the dominant level.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Safe,
    Low,
    Medium,
    High,
    Critical
}

impl RiskLevel {
    /// Score contributed by one match of this level
    pub fn weight(self) -> u32 {
        match self {
            Self::Safe => 0,
            Self::Low => 25,
            Self::Medium => 50,
            Self::High => 75,
            Self::Critical => 100
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical"
        }
    }

    /// True for levels that turn a finding into a blocking violation
    pub fn is_blocking(self) -> bool {
        self >= Self::High
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Family of a risk pattern.
///
/// Declaration order is the order in which the detector scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    ClassicInjection,
    UnionInjection,
    BlindInjection,
    TimeInjection,
    ErrorInjection,
    SecondOrder,
    NosqlInjection,
    CodeExecution,
    FileAccess,
    InfoDisclosure,
    Obfuscation,
    EncodingEvasion
}

impl RiskCategory {
    pub fn name(self) -> &'static str {
        match self {
            Self::ClassicInjection => "classic_injection",
            Self::UnionInjection => "union_injection",
            Self::BlindInjection => "blind_injection",
            Self::TimeInjection => "time_injection",
            Self::ErrorInjection => "error_injection",
            Self::SecondOrder => "second_order",
            Self::NosqlInjection => "nosql_injection",
            Self::CodeExecution => "code_execution",
            Self::FileAccess => "file_access",
            Self::InfoDisclosure => "info_disclosure",
            Self::Obfuscation => "obfuscation",
            Self::EncodingEvasion => "encoding_evasion"
        }
    }

    /// Injection-style categories that call for input sanitization advice
    pub fn is_injection(self) -> bool {
        matches!(
            self,
            Self::ClassicInjection
                | Self::UnionInjection
                | Self::BlindInjection
                | Self::TimeInjection
                | Self::ErrorInjection
                | Self::SecondOrder
                | Self::NosqlInjection
        )
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A compiled detection rule.
///
/// `regex` is `None` when the source failed to compile; such a rule never
/// matches and the owning detector reports itself as degraded.
#[derive(Debug, Clone)]
pub struct RiskPattern {
    pub regex:       Option<Regex>,
    pub source:      &'static str,
    pub description: &'static str,
    pub risk_level:  RiskLevel,
    pub category:    RiskCategory
}

impl RiskPattern {
    pub fn new(
        category: RiskCategory,
        source: &'static str,
        description: &'static str,
        risk_level: RiskLevel
    ) -> Self {
        let regex = match Regex::new(&format!("(?im){}", source)) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::error!(pattern = source, error = %e, "risk pattern failed to compile");
                None
            }
        };
        Self {
            regex,
            source,
            description,
            risk_level,
            category
        }
    }

    pub fn is_broken(&self) -> bool {
        self.regex.is_none()
    }
}

/// A single pattern hit inside a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternMatch {
    pub category:    RiskCategory,
    pub description: &'static str,
    pub risk_level:  RiskLevel,
    /// Matched text
    pub matched:     String,
    /// Byte offsets of the match in the trimmed query
    pub span:        (usize, usize)
}
