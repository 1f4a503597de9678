//! Error pattern table.
//!
//! Each entry binds a database error shape to an [`ErrorType`] and,
//! when the error is repairable, to a [`RecoveryFn`]. Among all entries that
//! match one message the highest confidence wins; equal confidences keep
//! table order.

use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::Serialize;

/// Classification of a database error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    SyntaxError,
    ColumnNotFound,
    TableNotFound,
    FunctionError,
    TypeMismatch,
    PermissionError,
    TimeoutError,
    ConnectionError,
    ConstraintViolation,
    UnknownError
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SyntaxError => "syntax_error",
            Self::ColumnNotFound => "column_not_found",
            Self::TableNotFound => "table_not_found",
            Self::FunctionError => "function_error",
            Self::TypeMismatch => "type_mismatch",
            Self::PermissionError => "permission_error",
            Self::TimeoutError => "timeout_error",
            Self::ConnectionError => "connection_error",
            Self::ConstraintViolation => "constraint_violation",
            Self::UnknownError => "unknown_error"
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a pure query rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryFn {
    FixColumnName,
    FixTableName,
    FixSyntaxError,
    FixFunctionError,
    FixTypeMismatch,
    OptimizeForTimeout,
    FixGroupBy
}

impl RecoveryFn {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FixColumnName => "fix_column_name",
            Self::FixTableName => "fix_table_name",
            Self::FixSyntaxError => "fix_syntax_error",
            Self::FixFunctionError => "fix_function_error",
            Self::FixTypeMismatch => "fix_type_mismatch",
            Self::OptimizeForTimeout => "optimize_for_timeout",
            Self::FixGroupBy => "fix_group_by"
        }
    }
}

/// One entry of the error taxonomy.
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    pub regex:       Option<Regex>,
    pub description: &'static str,
    pub error_type:  ErrorType,
    pub recovery:    Option<RecoveryFn>,
    pub confidence:  f64,
    pub auto_fix:    bool
}

impl ErrorPattern {
    pub fn new(
        source: &str,
        error_type: ErrorType,
        description: &'static str,
        recovery: Option<RecoveryFn>,
        confidence: f64
    ) -> Self {
        let regex = match Regex::new(&format!("(?i){}", source)) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!(pattern = source, error = %e, "error pattern skipped");
                None
            }
        };
        Self {
            regex,
            description,
            error_type,
            recovery,
            confidence,
            auto_fix: recovery.is_some()
        }
    }
}

pub static ERROR_PATTERNS: LazyLock<Vec<ErrorPattern>> = LazyLock::new(|| {
    use ErrorType as E;
    use RecoveryFn as R;

    vec![
        // PostgreSQL
        ErrorPattern::new(
            r#"column "([^"]+)" does not exist"#,
            E::ColumnNotFound,
            "Column name not found",
            Some(R::FixColumnName),
            0.9
        ),
        ErrorPattern::new(
            r#"relation "([^"]+)" does not exist"#,
            E::TableNotFound,
            "Table name not found",
            Some(R::FixTableName),
            0.9
        ),
        ErrorPattern::new(
            r#"syntax error at or near "([^"]*)""#,
            E::SyntaxError,
            "SQL syntax error",
            Some(R::FixSyntaxError),
            0.7
        ),
        ErrorPattern::new(
            r"function ([^\s(]+)\([^)]*\) does not exist",
            E::FunctionError,
            "Function not found or wrong signature",
            Some(R::FixFunctionError),
            0.8
        ),
        // MySQL
        ErrorPattern::new(
            r"Unknown column '([^']+)' in '([^']+)'",
            E::ColumnNotFound,
            "MySQL column not found",
            Some(R::FixColumnName),
            0.9
        ),
        ErrorPattern::new(
            r"Table '([^']+)' doesn't exist",
            E::TableNotFound,
            "MySQL table not found",
            Some(R::FixTableName),
            0.9
        ),
        ErrorPattern::new(
            r"FUNCTION ([\w.]+) does not exist",
            E::FunctionError,
            "MySQL function not found",
            Some(R::FixFunctionError),
            0.8
        ),
        ErrorPattern::new(
            r"You have an error in your SQL syntax.*near '([^']*)'",
            E::SyntaxError,
            "MySQL syntax error",
            Some(R::FixSyntaxError),
            0.65
        ),
        ErrorPattern::new(
            r"isn't in GROUP BY|incompatible with sql_mode=only_full_group_by",
            E::SyntaxError,
            "MySQL column not in GROUP BY",
            Some(R::FixGroupBy),
            0.85
        ),
        // SQL Server
        ErrorPattern::new(
            r"Invalid column name '([^']+)'",
            E::ColumnNotFound,
            "SQL Server column not found",
            Some(R::FixColumnName),
            0.9
        ),
        ErrorPattern::new(
            r"Invalid object name '([^']+)'",
            E::TableNotFound,
            "SQL Server table not found",
            Some(R::FixTableName),
            0.85
        ),
        ErrorPattern::new(
            r"not contained in either an aggregate function or the GROUP BY clause",
            E::SyntaxError,
            "SQL Server column not in GROUP BY",
            Some(R::FixGroupBy),
            0.85
        ),
        // SQLite
        ErrorPattern::new(
            r"no such column: ([\w.]+)",
            E::ColumnNotFound,
            "SQLite column not found",
            Some(R::FixColumnName),
            0.9
        ),
        ErrorPattern::new(
            r"no such table: ([\w.]+)",
            E::TableNotFound,
            "SQLite table not found",
            Some(R::FixTableName),
            0.9
        ),
        // Generic
        ErrorPattern::new(
            r#"invalid input syntax for (?:type )?(\w+): "([^"]*)""#,
            E::TypeMismatch,
            "Type conversion error",
            Some(R::FixTypeMismatch),
            0.8
        ),
        ErrorPattern::new(
            r"permission denied for (?:relation|table) (\w+)",
            E::PermissionError,
            "Permission denied",
            None,
            0.95
        ),
        ErrorPattern::new(
            r"canceling statement due to statement timeout|maximum statement execution time exceeded|query timeout expired",
            E::TimeoutError,
            "Query timeout",
            Some(R::OptimizeForTimeout),
            0.75
        ),
        ErrorPattern::new(
            r"GROUP BY position (\d+) is not in select list",
            E::SyntaxError,
            "GROUP BY column not in SELECT",
            Some(R::FixGroupBy),
            0.8
        ),
        ErrorPattern::new(
            r"must appear in the GROUP BY clause or be used in an aggregate function",
            E::SyntaxError,
            "Column not in GROUP BY",
            Some(R::FixGroupBy),
            0.85
        ),
        // Never auto-fixed
        ErrorPattern::new(
            r"could not connect to server|connection refused|server closed the connection|lost connection to (?:MySQL )?server",
            E::ConnectionError,
            "Database connection failure",
            None,
            0.9
        ),
        ErrorPattern::new(
            r"violates (?:foreign key|unique|not-null|check) constraint|Duplicate entry|UNIQUE constraint failed|FOREIGN KEY constraint failed",
            E::ConstraintViolation,
            "Constraint violation",
            None,
            0.9
        )
    ]
});
