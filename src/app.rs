//! Application logic for the SQL Query Guard CLI.
//!
//! Each subcommand is a plain function from parameters and [`Config`] to a
//! [`CommandOutput`], so the binary stays a thin shell and every command is
//! testable without spawning a process.

mod helpers;
mod types;

use std::{sync::Arc, time::Duration};

pub use helpers::{
    calculate_exit_code, convert_format, convert_strategy, create_output_options, query_source,
    read_query
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
pub use types::{CommandOutput, CorrectParams, QueryParams, QuerySource, TablesParams};

use crate::{
    config::Config,
    correction::{CorrectionService, security_suggestions, sort_suggestions},
    error::AppResult,
    output::{
        TableSelection, format_corrections, format_security_report, format_suggestions,
        format_table_selection
    },
    recovery::ErrorClassifier,
    schema::{SchemaCache, TableDescriptors},
    selector::{IndexingStatus, SemanticTableSelector},
    validator::SecurityValidator
};

/// Run the check command
pub fn run_check(params: &QueryParams, config: &Config) -> AppResult<CommandOutput> {
    let query = read_query(&params.source)?;
    let report = SecurityValidator::new(config.security.clone()).validate(&query);

    Ok(CommandOutput {
        exit_code: calculate_exit_code(&report),
        stdout:    vec![format_security_report(&report, &params.output)]
    })
}

/// Run the correct command.
///
/// The exit code reflects validation of the best-ranked rewrite, or of the
/// original query when nothing was proposed.
pub fn run_correct(params: &CorrectParams, config: &Config) -> AppResult<CommandOutput> {
    let query = read_query(&params.query.source)?;
    let service = correction_service(config);
    let strategy = params.strategy.unwrap_or(service.default_strategy());
    let attempts = service.correct(&query, params.error.as_deref(), Some(strategy));

    let best = attempts
        .first()
        .map(|a| a.corrected_query.as_str())
        .unwrap_or(query.as_str());
    let report = SecurityValidator::new(config.security.clone()).validate(best);
    debug!(attempts = attempts.len(), best_safe = report.is_safe, "correction finished");

    Ok(CommandOutput {
        exit_code: calculate_exit_code(&report),
        stdout:    vec![format_corrections(
            &query,
            strategy.as_str(),
            &attempts,
            &params.query.output
        )]
    })
}

/// Run the suggest command.
///
/// Correction suggestions are merged with the validator's findings, then
/// ranked by severity and confidence.
pub fn run_suggest(params: &QueryParams, config: &Config) -> AppResult<CommandOutput> {
    let query = read_query(&params.source)?;
    let report = SecurityValidator::new(config.security.clone()).validate(&query);
    let mut suggestions = correction_service(config).get_correction_suggestions(&query);
    suggestions.extend(security_suggestions(&report));
    sort_suggestions(&mut suggestions);

    Ok(CommandOutput {
        exit_code: calculate_exit_code(&report),
        stdout:    vec![format_suggestions(&suggestions, &params.output)]
    })
}

/// Run the tables command
pub async fn run_tables(params: TablesParams, mut config: Config) -> AppResult<CommandOutput> {
    let tables = TableDescriptors::load(&params.schema_path)?;
    if let Some(dir) = params.cache_dir.clone() {
        config.selector.cache_dir = dir;
    }

    let selector = SemanticTableSelector::new(config.selector.clone());
    if params.rebuild {
        selector.force_rebuild_index()?;
    }
    if selector.build_index_async(tables.clone())? {
        wait_with_progress(&selector, tables.len()).await;
    }

    let names = tables.table_names();
    let selected = selector.select_relevant_tables(&params.question, &names, params.max_tables);
    let scores = if selector.indexing_status().status == IndexingStatus::Completed {
        selector.relevance_scores(&params.question).unwrap_or_default()
    } else {
        Vec::new()
    };

    let selection = TableSelection {
        question: params.question,
        selected,
        scores
    };
    Ok(CommandOutput {
        exit_code: 0,
        stdout:    vec![format_table_selection(&selection, &params.output)]
    })
}

fn correction_service(config: &Config) -> CorrectionService {
    let classifier = ErrorClassifier::new(Arc::new(SchemaCache::new()), config.recovery.clone());
    CorrectionService::new(classifier, config.correction.clone())
}

async fn wait_with_progress(selector: &SemanticTableSelector, total: usize) {
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} {msg} [{bar:30}] {pos}/{len}")
    {
        pb.set_style(style);
    }
    pb.set_message("Indexing tables");
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut rx = selector.subscribe_progress();
    loop {
        let progress = rx.borrow_and_update().clone();
        pb.set_position(progress.processed_tables as u64);
        if let Some(table) = progress.current_table {
            pb.set_message(format!("Indexing {}", table));
        }
        if progress.status != IndexingStatus::InProgress || rx.changed().await.is_err() {
            break;
        }
    }
    pb.finish_and_clear();
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::output::OutputOptions;

    fn plain() -> OutputOptions {
        OutputOptions {
            colored: false,
            ..OutputOptions::default()
        }
    }

    fn inline(query: &str) -> QueryParams {
        QueryParams {
            source: QuerySource::Inline(query.to_string()),
            output: plain()
        }
    }

    #[test]
    fn test_run_check_blocked() {
        let output = run_check(&inline("SELECT name FROM users WHERE 1=1 OR 1=1"), &Config::default())
            .unwrap();
        assert_eq!(output.exit_code, 2);
        assert!(output.stdout[0].contains("BLOCKED"));
    }

    #[test]
    fn test_run_check_safe() {
        let output =
            run_check(&inline("SELECT id, name FROM t WHERE id=1 LIMIT 10;"), &Config::default())
                .unwrap();
        assert_eq!(output.exit_code, 0);
    }

    #[test]
    fn test_run_correct_typos() {
        let params = CorrectParams {
            query:    inline("SELCET id FORM users"),
            error:    None,
            strategy: Some(crate::correction::CorrectionStrategy::Conservative)
        };
        let output = run_correct(&params, &Config::default()).unwrap();
        assert!(output.stdout[0].contains("SELECT id FROM users"));
    }

    #[test]
    fn test_run_suggest_includes_security() {
        let output = run_suggest(&inline("SELECT * FROM orders"), &Config::default()).unwrap();
        assert_eq!(output.exit_code, 2);
        assert!(output.stdout[0].starts_with("[CRITICAL] security_violation:"));
    }

    #[tokio::test]
    async fn test_run_tables() {
        let dir = TempDir::new().unwrap();
        let schema = dir.path().join("tables.json");
        fs::write(
            &schema,
            r#"{"users": {"columns": ["id", "email"]}, "orders": {"columns": ["id", "total_amount", "customer_id"]}}"#
        )
        .unwrap();

        let params = TablesParams {
            schema_path: schema,
            question:    "total amount of orders".to_string(),
            max_tables:  None,
            cache_dir:   Some(dir.path().join("cache")),
            rebuild:     false,
            output:      plain()
        };
        let output = run_tables(params, Config::default()).await.unwrap();
        assert!(output.stdout[0].starts_with("orders"));
    }
}
