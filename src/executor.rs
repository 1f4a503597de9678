//! Validate, execute and repair in one bounded loop.
//!
//! ```text
//! query ─► clean ─► validate ──blocked──► Blocked (never executed)
//!                      │
//!                      ▼
//!               ┌─► execute ──ok──► Success
//!               │      │
//!               │     err
//!               │      ▼
//!               │  ErrorClassifier ──changed──┐
//!               │      │ unchanged            │
//!               │      ▼                      │
//!               │  progressive strategy ──────┤
//!               │      │ unchanged            │
//!               └──────┴──────────────────────┘   (max_retry_attempts + 1 runs)
//! ```
//!
//! The database call itself belongs to the caller through [`QueryExecutor`];
//! deadlines and cancellation of that call are the caller's concern. The
//! coordinator never returns an error: every path ends in an
//! [`ExecutionOutcome`].

use std::{
    fmt,
    future::Future,
    sync::Arc,
    time::{Duration, Instant}
};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    config::ExecutionConfig,
    correction::{
        CorrectionService, CorrectionStrategy, Suggestion, security_suggestions, sort_suggestions
    },
    error::format_database_error,
    monitor::SecurityMonitor,
    preprocessor,
    stats::{ExecutionKind, StatsCollector},
    validator::{SecurityReport, SecurityValidator}
};

const MAX_FAILURE_SUGGESTIONS: usize = 3;

/// Error text reported by the database for one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    message: String
}

impl DatabaseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into()
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DatabaseError {}

/// Runs SQL against a real database.
pub trait QueryExecutor: Send + Sync {
    /// Execute `sql` and return the rendered result rows.
    fn execute(&self, sql: &str) -> impl Future<Output = Result<String, DatabaseError>> + Send;
}

/// Final state of every retry loop.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success {
        result:         String,
        executed_query: String,
        attempts:       u32,
        report:         SecurityReport
    },
    Blocked {
        report: SecurityReport
    },
    Failed(FailureReport)
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Text handed back to the agent layer
    pub fn render(&self) -> String {
        match self {
            Self::Success {
                result, ..
            } => result.clone(),
            Self::Blocked {
                report
            } => report.block_message(),
            Self::Failed(failure) => failure.render()
        }
    }
}

/// Everything the caller needs after the retry budget ran out.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub original_query: String,
    pub final_query:    String,
    pub final_error:    String,
    pub attempts:       u32,
    pub elapsed:        Duration,
    pub suggestions:    Vec<Suggestion>
}

impl FailureReport {
    pub fn query_modified(&self) -> bool {
        self.original_query != self.final_query
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "Query execution failed after {} attempts.\nTotal time: {:.2}s\nFinal error: {}\n",
            self.attempts,
            self.elapsed.as_secs_f64(),
            format_database_error(&self.final_error)
        );
        if self.query_modified() {
            out.push_str("Query was modified during retry attempts.\n");
        }
        if !self.suggestions.is_empty() {
            out.push_str("\nSuggestions for manual correction:\n");
            for (i, s) in self.suggestions.iter().take(MAX_FAILURE_SUGGESTIONS).enumerate() {
                out.push_str(&format!(
                    "  {}. {} (confidence: {:.1}%)\n",
                    i + 1,
                    s.description,
                    s.confidence * 100.0
                ));
            }
        }
        out
    }
}

/// Security gate plus correction driven retry loop around a [`QueryExecutor`].
pub struct QueryExecutionCoordinator<E> {
    executor:  E,
    validator: SecurityValidator,
    corrector: CorrectionService,
    config:    ExecutionConfig,
    monitor:   Option<Arc<SecurityMonitor>>,
    stats:     Option<Arc<StatsCollector>>
}

impl<E: QueryExecutor> QueryExecutionCoordinator<E> {
    pub fn new(
        executor: E,
        validator: SecurityValidator,
        corrector: CorrectionService,
        config: ExecutionConfig
    ) -> Self {
        Self {
            executor,
            validator,
            corrector,
            config,
            monitor: None,
            stats: None
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<SecurityMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_stats(mut self, stats: Arc<StatsCollector>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub async fn execute(&self, query: &str) -> ExecutionOutcome {
        self.execute_in_session(query, None).await
    }

    /// Run `query`, attributing security events to `session_id`.
    pub async fn execute_in_session(&self, query: &str, session_id: Option<&str>) -> ExecutionOutcome {
        let started = Instant::now();
        let cleaned = preprocessor::clean(query);

        let report = self.validator.validate(&cleaned);
        if let Some(monitor) = &self.monitor {
            monitor.record(&cleaned, &report, session_id, started.elapsed());
        }
        if !report.is_safe {
            warn!(
                query_hash = %report.query_hash,
                violations = report.violations.len(),
                "execution refused"
            );
            self.record(ExecutionKind::Blocked, 0);
            return ExecutionOutcome::Blocked {
                report
            };
        }

        let max_retries = self.config.max_retry_attempts;
        let mut current = cleaned.clone();
        let mut progressive_step = 0u32;
        let mut last_error = String::from("Max retries exceeded");

        for attempt in 0..=max_retries {
            debug!(attempt = attempt + 1, total = max_retries + 1, "executing query");

            let err = match self.executor.execute(&current).await {
                Ok(result) => {
                    if attempt == 0 {
                        debug!("query succeeded on first attempt");
                        self.record(ExecutionKind::FirstTry, 0);
                    } else {
                        info!(attempt = attempt + 1, "query succeeded after retry");
                        self.record(ExecutionKind::AfterCorrection, attempt);
                    }
                    return ExecutionOutcome::Success {
                        result,
                        executed_query: current,
                        attempts: attempt + 1,
                        report
                    };
                }
                Err(err) => err
            };

            warn!(attempt = attempt + 1, error = %err, "query execution failed");
            last_error = err.message().to_string();
            if attempt >= max_retries {
                break;
            }

            if self.config.auto_correction {
                let recovery = self.corrector.classifier().recover(err.message(), &current);
                if recovery.success
                    && let Some(corrected) = recovery.corrected_query
                {
                    info!(
                        corrections = %recovery.corrections_applied.join(", "),
                        "query auto-corrected"
                    );
                    current = corrected;
                    continue;
                }
            }

            if self.config.progressive_strategies {
                let strategy = CorrectionStrategy::for_attempt(progressive_step);
                progressive_step += 1;
                if let Some(corrected) = self.progressive(&current, strategy, err.message())
                    && corrected != current
                {
                    info!(strategy = %strategy, "applied progressive correction");
                    current = corrected;
                    continue;
                }
            }

            debug!(attempt = attempt + 2, "no correction found, retrying unchanged");
        }

        error!(attempts = max_retries + 1, error = %last_error, "query failed after retries");
        self.record(ExecutionKind::Failed, max_retries);
        ExecutionOutcome::Failed(FailureReport {
            suggestions: self.corrector.get_correction_suggestions(&current),
            original_query: cleaned,
            final_query: current,
            final_error: last_error,
            attempts: max_retries + 1,
            elapsed: started.elapsed()
        })
    }

    /// First candidate at or above the confidence threshold; aggressive
    /// mode falls back to the best candidate.
    fn progressive(
        &self,
        query: &str,
        strategy: CorrectionStrategy,
        error_message: &str
    ) -> Option<String> {
        let attempts = self
            .corrector
            .correct(query, Some(error_message), Some(strategy));
        let threshold = self.config.confidence_threshold;

        if let Some(found) = attempts.iter().find(|a| a.confidence >= threshold) {
            debug!(confidence = found.confidence, strategy = %strategy, "correction accepted");
            return Some(found.corrected_query.clone());
        }
        if strategy == CorrectionStrategy::Aggressive {
            return attempts.into_iter().next().map(|a| a.corrected_query);
        }
        None
    }

    fn record(&self, kind: ExecutionKind, retries: u32) {
        if let Some(stats) = &self.stats {
            stats.record_execution(kind, retries);
        }
    }

    /// Correction advice merged with security findings, most severe first.
    pub fn query_suggestions(&self, query: &str) -> Vec<Suggestion> {
        let mut suggestions = self.corrector.get_correction_suggestions(query);
        suggestions.extend(security_suggestions(&self.validator.validate(query)));
        sort_suggestions(&mut suggestions);
        suggestions
    }
}
