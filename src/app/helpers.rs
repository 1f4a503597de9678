//! Helper functions for CLI operations.
//!
//! Reading query input, mapping CLI enums onto library types and
//! calculating exit codes.

use std::{
    fs::read_to_string,
    io::{self, Read}
};

use super::types::QuerySource;
use crate::{
    cli::{Format, OutputArgs, QueryArgs, Strategy},
    correction::CorrectionStrategy,
    error::{AppResult, file_read_error, input_error},
    output::{OutputFormat, OutputOptions},
    preprocessor::clean,
    validator::SecurityReport
};

/// Calculates the process exit code from a validation report.
///
/// - `0` - Safe with no warnings
/// - `1` - Safe, but warnings present
/// - `2` - Blocked
///
/// # Example
///
/// ```
/// use sql_query_guard::{app::calculate_exit_code, validator::SecurityValidator};
///
/// let report = SecurityValidator::default().validate("SELECT id FROM users LIMIT 10;");
/// assert_eq!(calculate_exit_code(&report), 0);
/// ```
pub fn calculate_exit_code(report: &SecurityReport) -> i32 {
    if !report.is_safe {
        2
    } else if !report.warnings.is_empty() {
        1
    } else {
        0
    }
}

/// Resolve CLI query arguments; stdin when nothing was given.
pub fn query_source(args: QueryArgs) -> QuerySource {
    match (args.query, args.file) {
        (Some(query), _) => QuerySource::Inline(query),
        (None, Some(path)) if path.to_str() == Some("-") => QuerySource::Stdin,
        (None, Some(path)) => QuerySource::File(path),
        (None, None) => QuerySource::Stdin
    }
}

/// Reads the query and normalizes it with [`clean`].
///
/// # Errors
///
/// Returns an error if the input cannot be read or holds no SQL.
pub fn read_query(source: &QuerySource) -> AppResult<String> {
    let raw = match source {
        QuerySource::Inline(query) => query.clone(),
        QuerySource::File(path) => {
            read_to_string(path).map_err(|e| file_read_error(&path.display().to_string(), e))?
        }
        QuerySource::Stdin => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| file_read_error("stdin", e))?;
            buffer
        }
    };

    let query = clean(&raw);
    if query.is_empty() {
        return Err(input_error("query is empty"));
    }
    Ok(query)
}

pub fn convert_format(format: Format) -> OutputFormat {
    match format {
        Format::Text => OutputFormat::Text,
        Format::Json => OutputFormat::Json,
        Format::Yaml => OutputFormat::Yaml
    }
}

pub fn convert_strategy(strategy: Strategy) -> CorrectionStrategy {
    match strategy {
        Strategy::Conservative => CorrectionStrategy::Conservative,
        Strategy::Moderate => CorrectionStrategy::Moderate,
        Strategy::Aggressive => CorrectionStrategy::Aggressive
    }
}

/// Creates output options from CLI parameters.
pub fn create_output_options(args: &OutputArgs) -> OutputOptions {
    OutputOptions {
        format:  convert_format(args.output_format),
        colored: !args.no_color,
        verbose: args.verbose
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::validator::SecurityValidator;

    #[test]
    fn test_calculate_exit_code_levels() {
        let validator = SecurityValidator::default();
        assert_eq!(calculate_exit_code(&validator.validate("SELECT id FROM t WHERE id=1 LIMIT 10;")), 0);
        assert_eq!(calculate_exit_code(&validator.validate("SELECT * FROM orders")), 2);
    }

    #[test]
    fn test_query_source_resolution() {
        let args = |query: Option<&str>, file: Option<&str>| QueryArgs {
            query: query.map(str::to_string),
            file:  file.map(PathBuf::from)
        };
        assert_eq!(query_source(args(Some("SELECT 1"), None)), QuerySource::Inline("SELECT 1".into()));
        assert_eq!(query_source(args(None, Some("-"))), QuerySource::Stdin);
        assert_eq!(query_source(args(None, None)), QuerySource::Stdin);
        assert_eq!(
            query_source(args(None, Some("q.sql"))),
            QuerySource::File(PathBuf::from("q.sql"))
        );
    }

    #[test]
    fn test_read_query_cleans_inline() {
        let query = read_query(&QuerySource::Inline("```sql\nSELECT id\nFROM users\n```".into())).unwrap();
        assert_eq!(query, "SELECT id FROM users;");
    }

    #[test]
    fn test_read_query_rejects_blank() {
        assert!(read_query(&QuerySource::Inline("   ".into())).is_err());
    }

    #[test]
    fn test_read_query_missing_file() {
        assert!(read_query(&QuerySource::File(PathBuf::from("/nonexistent/q.sql"))).is_err());
    }

    #[test]
    fn test_create_output_options() {
        let opts = create_output_options(&OutputArgs {
            output_format: Format::Json,
            verbose:       true,
            no_color:      true
        });
        assert_eq!(opts.format, OutputFormat::Json);
        assert!(!opts.colored);
        assert!(opts.verbose);
    }

    #[test]
    fn test_convert_strategy() {
        assert_eq!(convert_strategy(Strategy::Aggressive), CorrectionStrategy::Aggressive);
    }
}
