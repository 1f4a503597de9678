//! Validator rule tables.
//!
//! These deliberately overlap with the injection detector's table: a critical
//! hit here blocks on its own regardless of what the detector reported.

use std::sync::LazyLock;

use regex::Regex;

use crate::injection::RiskLevel;

/// One structural or textual validator rule.
#[derive(Debug)]
pub struct ValidationRule {
    pub regex:       Option<Regex>,
    pub description: &'static str,
    pub risk_level:  RiskLevel
}

impl ValidationRule {
    fn new(source: &str, description: &'static str, risk_level: RiskLevel) -> Self {
        Self {
            regex: compile(source),
            description,
            risk_level
        }
    }

    pub fn is_match(&self, query: &str) -> bool {
        self.regex.as_ref().is_some_and(|r| r.is_match(query))
    }
}

fn compile(source: &str) -> Option<Regex> {
    match Regex::new(&format!("(?im){}", source)) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::error!(pattern = source, error = %e, "validator rule failed to compile");
            None
        }
    }
}

/// Unconditional blocks
pub static CRITICAL_RULES: LazyLock<Vec<ValidationRule>> = LazyLock::new(|| {
    vec![
        ValidationRule::new(
            r";\s*(?:DROP|DELETE|UPDATE|INSERT|ALTER|CREATE|TRUNCATE|REPLACE)\s+",
            "DML/DDL operations not allowed",
            RiskLevel::Critical
        ),
        ValidationRule::new(
            r"\bUNION\s+(?:ALL\s+)?SELECT.*(?:--|#|/\*)",
            "SQL injection attempt via UNION with comments",
            RiskLevel::Critical
        ),
        ValidationRule::new(
            r"\b(?:EXEC|EXECUTE|EVAL)\s*\(",
            "Code execution functions not allowed",
            RiskLevel::Critical
        ),
        ValidationRule::new(
            r"\b(?:xp_|sp_)\w+",
            "SQL Server extended/stored procedures not allowed",
            RiskLevel::Critical
        ),
        ValidationRule::new(
            r"\b(?:LOAD_FILE|INTO\s+(?:OUTFILE|DUMPFILE)|LOAD\s+DATA)\b",
            "File system operations not allowed",
            RiskLevel::Critical
        ),
        ValidationRule::new(
            r"\b(?:OPENROWSET|OPENDATASOURCE|OPENXML)\b",
            "External data access functions not allowed",
            RiskLevel::Critical
        )
    ]
});

/// Review-worthy constructs; the always-true condition is the one that blocks
pub static MEDIUM_RULES: LazyLock<Vec<ValidationRule>> = LazyLock::new(|| {
    vec![
        ValidationRule::new(
            r"/\*.*?\*/|--.*$",
            "SQL comments detected (potential obfuscation)",
            RiskLevel::Medium
        ),
        ValidationRule::new(
            r"\bUNION\s+(?:ALL\s+)?SELECT",
            "UNION operations require careful review",
            RiskLevel::Medium
        ),
        ValidationRule::new(
            r"\b(?:CONCAT|GROUP_CONCAT|STRING_AGG)\s*\([^)]*SELECT",
            "Nested SELECT in string functions",
            RiskLevel::Medium
        ),
        ValidationRule::new(
            r"\b(?:SLEEP|WAITFOR|BENCHMARK)\s*\(",
            "Time-based functions (potential DoS)",
            RiskLevel::Medium
        ),
        ValidationRule::new(
            r"\bWHERE\s+[^=<>!]*\s*=\s*[^=<>!]*\s+OR\s+1\s*=\s*1",
            "Always-true conditions (potential injection)",
            RiskLevel::High
        )
    ]
});

pub static SELECT_STAR: LazyLock<ValidationRule> = LazyLock::new(|| {
    ValidationRule::new(
        r"\bSELECT\s+(?:DISTINCT\s+)?\*",
        "SELECT * without specific column selection",
        RiskLevel::Low
    )
});

/// Function names worth flagging when called
pub const SUSPICIOUS_FUNCTIONS: [&str; 18] = [
    "CHAR",
    "CHR",
    "ASCII",
    "UNHEX",
    "HEX",
    "LOAD_FILE",
    "FILE_PRIV",
    "DUMPFILE",
    "SCRIPT",
    "SHELL",
    "SYSTEM",
    "BENCHMARK",
    "SLEEP",
    "WAITFOR",
    "USER",
    "DATABASE",
    "VERSION",
    "CONNECTION_ID"
];

pub static SUSPICIOUS_CALLS: LazyLock<Vec<(&'static str, Option<Regex>)>> = LazyLock::new(|| {
    SUSPICIOUS_FUNCTIONS
        .iter()
        .map(|name| (*name, compile(&format!(r"\b{}\s*\(", name))))
        .collect()
});

pub static LIMIT_KEYWORD: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"\b(?:LIMIT|TOP)\b"));

pub static LIMIT_VALUE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"\bLIMIT\s+(\d+)"));

pub static JOIN_KEYWORD: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"\bJOIN\b"));

pub static NESTED_SELECT: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"\(\s*SELECT\b"));

/// Descriptions of validator rules that failed to compile
pub fn broken_rules() -> Vec<&'static str> {
    let mut broken: Vec<&'static str> = CRITICAL_RULES
        .iter()
        .chain(MEDIUM_RULES.iter())
        .chain(std::iter::once(&*SELECT_STAR))
        .filter(|rule| rule.regex.is_none())
        .map(|rule| rule.description)
        .collect();

    broken.extend(
        SUSPICIOUS_CALLS
            .iter()
            .filter(|(_, regex)| regex.is_none())
            .map(|(name, _)| *name)
    );

    for (name, regex) in [
        ("LIMIT keyword", &*LIMIT_KEYWORD),
        ("LIMIT value", &*LIMIT_VALUE),
        ("JOIN keyword", &*JOIN_KEYWORD),
        ("nested SELECT", &*NESTED_SELECT)
    ] {
        if regex.is_none() {
            broken.push(name);
        }
    }

    broken
}
