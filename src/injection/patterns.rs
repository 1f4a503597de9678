//! Built-in risk pattern and whitelist tables.
//!
//! Patterns are compiled once on first use with case-insensitive, multi-line
//! matching. Keyword-led patterns are anchored on word boundaries so that
//! identifiers such as `bulk_orders` or `wasp_count` do not trip them.

use std::sync::LazyLock;

use regex::Regex;

use super::types::{RiskCategory as C, RiskLevel as L, RiskPattern};

/// Process-wide detection rules in scan order
pub static RISK_PATTERNS: LazyLock<Vec<RiskPattern>> = LazyLock::new(|| {
    vec![
        // Classic injection
        RiskPattern::new(
            C::ClassicInjection,
            r"\b(?:OR|AND)\s+(?:'1'\s*=\s*'1'|1\s*=\s*1|'a'\s*=\s*'a')",
            "Classic tautology-based SQL injection",
            L::Critical
        ),
        RiskPattern::new(
            C::ClassicInjection,
            r"'\s*(?:OR|AND)\s+\w+\s*(?:LIKE|=)\s*'%",
            "Wildcard injection pattern",
            L::High
        ),
        RiskPattern::new(
            C::ClassicInjection,
            r"(?:^|;|\s)(?:DROP|DELETE|UPDATE|INSERT|ALTER|CREATE)\s+",
            "Statement termination with dangerous command",
            L::Critical
        ),
        // Union based
        RiskPattern::new(
            C::UnionInjection,
            r"\bUNION\s+(?:ALL\s+)?SELECT",
            "UNION-based SQL injection attempt",
            L::Critical
        ),
        RiskPattern::new(
            C::UnionInjection,
            r"\bUNION\s+(?:ALL\s+)?SELECT.*(?:--|#|/\*)",
            "UNION injection with comment obfuscation",
            L::Critical
        ),
        RiskPattern::new(
            C::UnionInjection,
            r"'\s*UNION\s+SELECT\s+(?:CONCAT|GROUP_CONCAT)",
            "UNION injection with string concatenation",
            L::Critical
        ),
        // Boolean blind
        RiskPattern::new(
            C::BlindInjection,
            r"\b(?:AND|OR)\s+\d+\s*[<>=!]+\s*\d+",
            "Boolean-based blind SQL injection",
            L::High
        ),
        RiskPattern::new(
            C::BlindInjection,
            r"\b(?:AND|OR)\s+(?:ASCII|ORD|CHAR)\s*\(",
            "Character-based blind injection",
            L::High
        ),
        RiskPattern::new(
            C::BlindInjection,
            r"\b(?:AND|OR)\s+(?:LENGTH|LEN|CHAR_LENGTH)\s*\(",
            "Length-based blind injection",
            L::High
        ),
        // Time based
        RiskPattern::new(
            C::TimeInjection,
            r"\b(?:SLEEP|WAITFOR|BENCHMARK|pg_sleep)\s*\(\s*\d+",
            "Time-based SQL injection",
            L::Critical
        ),
        RiskPattern::new(
            C::TimeInjection,
            r"\bIF\s*\([^)]*,\s*(?:SLEEP|WAITFOR|BENCHMARK)",
            "Conditional time-based injection",
            L::Critical
        ),
        // Error based
        RiskPattern::new(
            C::ErrorInjection,
            r"\b(?:AND|OR)\s+(?:EXTRACTVALUE|UPDATEXML)\s*\(",
            "XML function-based error injection",
            L::High
        ),
        RiskPattern::new(
            C::ErrorInjection,
            r"\b(?:AND|OR)\s+(?:EXP|FLOOR|RAND)\s*\([^)]*\)",
            "Mathematical function-based error injection",
            L::High
        ),
        RiskPattern::new(
            C::ErrorInjection,
            r"\bCAST\s*\([^)]*AS\s+(?:INT|INTEGER|DECIMAL)\s*\)",
            "Type casting error injection",
            L::Medium
        ),
        // Second order
        RiskPattern::new(
            C::SecondOrder,
            r"\b(?:INSERT|UPDATE).*VALUES.*(?:CONCAT|CHR|CHAR)\s*\(",
            "Potential second-order injection via data insertion",
            L::Medium
        ),
        // Document store operators
        RiskPattern::new(
            C::NosqlInjection,
            r"\$(?:ne|gt|lt|gte|lte|in|nin|regex|where)\b",
            "MongoDB operator injection",
            L::High
        ),
        RiskPattern::new(
            C::NosqlInjection,
            r"(?:\bthis\.|\bfunction\s*\()",
            "JavaScript injection in NoSQL",
            L::High
        ),
        // Code execution
        RiskPattern::new(
            C::CodeExecution,
            r"\b(?:EXEC|EXECUTE|EVAL)\s*\(",
            "Code execution function",
            L::Critical
        ),
        RiskPattern::new(
            C::CodeExecution,
            r"\b(?:xp_|sp_)\w+",
            "SQL Server extended/stored procedure",
            L::Critical
        ),
        RiskPattern::new(
            C::CodeExecution,
            r"\b(?:OPENROWSET|OPENDATASOURCE|OPENXML|BULK)\b",
            "External data access function",
            L::Critical
        ),
        // File access
        RiskPattern::new(
            C::FileAccess,
            r"\b(?:LOAD_FILE|INTO\s+(?:OUTFILE|DUMPFILE)|LOAD\s+DATA)\b",
            "File system access function",
            L::Critical
        ),
        RiskPattern::new(
            C::FileAccess,
            r"\b(?:FILE_PRIV|FILE_PRIVILEGES)\b",
            "File privilege check",
            L::High
        ),
        // Information disclosure
        RiskPattern::new(
            C::InfoDisclosure,
            r"(?:@@|\bGLOBAL\.|\bSESSION\.)\w+",
            "System variable access",
            L::Medium
        ),
        RiskPattern::new(
            C::InfoDisclosure,
            r"\b(?:USER|CURRENT_USER|SESSION_USER|SYSTEM_USER)\s*\(\s*\)",
            "User information function",
            L::Low
        ),
        RiskPattern::new(
            C::InfoDisclosure,
            r"\b(?:DATABASE|SCHEMA|VERSION|CONNECTION_ID)\s*\(\s*\)",
            "Database information function",
            L::Low
        ),
        // Comment obfuscation
        RiskPattern::new(
            C::Obfuscation,
            r"/\*.*?\*/",
            "Block comment (potential obfuscation)",
            L::Medium
        ),
        RiskPattern::new(
            C::Obfuscation,
            r"--.*$",
            "Line comment (potential obfuscation)",
            L::Low
        ),
        RiskPattern::new(C::Obfuscation, r"#.*$", "Hash comment (MySQL)", L::Low),
        // Encoding evasion
        RiskPattern::new(
            C::EncodingEvasion,
            r"(?:\b0x[0-9a-fA-F]+|\bUNHEX\s*\(|\bHEX\s*\()",
            "Hexadecimal encoding",
            L::Medium
        ),
        RiskPattern::new(
            C::EncodingEvasion,
            r"\b(?:CHAR|CHR|ASCII)\s*\(\s*\d+",
            "Character code encoding",
            L::Medium
        ),
        RiskPattern::new(
            C::EncodingEvasion,
            r"\b(?:CONVERT|CAST)\s*\([^)]*USING\s+\w+",
            "Character set conversion",
            L::Low
        )
    ]
});

/// Conservative query shapes considered structurally safe
pub static WHITELIST: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^SELECT\s+(?:DISTINCT\s+)?[\w\s,.()]+\s+FROM\s+\w+(?:\s+WHERE\s+[\w\s=<>!',.()]+)?(?:\s+GROUP\s+BY\s+[\w\s,]+)?(?:\s+ORDER\s+BY\s+[\w\s,]+)?(?:\s+LIMIT\s+\d+)?;?$",
        r"(?i)^DESCRIBE\s+\w+;?$",
        r"(?i)^SHOW\s+(?:TABLES|COLUMNS|INDEX);?$",
        r"(?i)^EXPLAIN\s+SELECT\s+.*$"
    ]
    .iter()
    .filter_map(|source| match Regex::new(source) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(pattern = source, error = %e, "whitelist pattern skipped");
            None
        }
    })
    .collect()
});
