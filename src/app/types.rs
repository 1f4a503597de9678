//! Application types for CLI commands.
//!
//! Parameters handed from the parsed command line to the command runners,
//! and the [`CommandOutput`] they return.

use std::path::PathBuf;

use crate::{correction::CorrectionStrategy, output::OutputOptions};

/// Where a command reads its query from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    Inline(String),
    File(PathBuf),
    Stdin
}

/// Parameters for `check`, `suggest` and the shared part of `correct`.
///
/// # Example
///
/// ```
/// use sql_query_guard::{
///     app::{QueryParams, QuerySource},
///     output::OutputOptions
/// };
///
/// let params = QueryParams {
///     source: QuerySource::Inline("SELECT id FROM users LIMIT 10".to_string()),
///     output: OutputOptions::default()
/// };
/// assert!(matches!(params.source, QuerySource::Inline(_)));
/// ```
#[derive(Debug, Clone)]
pub struct QueryParams {
    pub source: QuerySource,
    pub output: OutputOptions
}

/// Parameters for the correct command
#[derive(Debug, Clone)]
pub struct CorrectParams {
    pub query:    QueryParams,
    /// Database error the query produced, if any
    pub error:    Option<String>,
    pub strategy: Option<CorrectionStrategy>
}

/// Parameters for the tables command
#[derive(Debug, Clone)]
pub struct TablesParams {
    pub schema_path: PathBuf,
    pub question:    String,
    pub max_tables:  Option<usize>,
    pub cache_dir:   Option<PathBuf>,
    pub rebuild:     bool,
    pub output:      OutputOptions
}

/// Output from CLI command execution.
///
/// # Example
///
/// ```
/// use sql_query_guard::app::CommandOutput;
///
/// let output = CommandOutput {
///     exit_code: 0,
///     stdout:    vec!["SAFE".to_string()]
/// };
/// ```
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code for the process (0=clean, 1=warnings, 2=blocked).
    pub exit_code: i32,
    /// Lines to print to stdout.
    pub stdout:    Vec<String>
}
