// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering}
};

use sql_query_guard::{
    config::{CorrectionConfig, ExecutionConfig, RecoveryConfig},
    correction::CorrectionService,
    executor::{DatabaseError, ExecutionOutcome, QueryExecutionCoordinator, QueryExecutor},
    injection::RiskLevel,
    monitor::SecurityMonitor,
    recovery::ErrorClassifier,
    schema::SchemaCache,
    stats::StatsCollector,
    validator::SecurityValidator
};

const COLUMNS: [&str; 3] = ["id", "user_name", "email"];

/// Accepts a query only when every selected column exists in `users`
#[derive(Default)]
struct UsersTable {
    calls: AtomicUsize
}

impl QueryExecutor for UsersTable {
    async fn execute(&self, sql: &str) -> Result<String, DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let select_list = sql
            .strip_prefix("SELECT ")
            .and_then(|rest| rest.split(" FROM ").next())
            .unwrap_or_default();
        for column in select_list.split(',').map(str::trim) {
            if !COLUMNS.contains(&column) {
                return Err(DatabaseError::new(format!(
                    "ERROR: column \"{}\" does not exist\nLINE 1: {}",
                    column, sql
                )));
            }
        }
        Ok(format!("[(1, 'ada', 'ada@example.com')] via {}", sql))
    }
}

/// Fails every call with the same message
struct Unreachable;

impl QueryExecutor for Unreachable {
    async fn execute(&self, _sql: &str) -> Result<String, DatabaseError> {
        Err(DatabaseError::new("could not connect to server: Connection refused"))
    }
}

fn corrector() -> CorrectionService {
    let schema = Arc::new(SchemaCache::new());
    schema.insert_table("users", COLUMNS);
    CorrectionService::new(
        ErrorClassifier::new(schema, RecoveryConfig::default()),
        CorrectionConfig::default()
    )
}

fn coordinator<E: QueryExecutor>(executor: E, config: ExecutionConfig) -> QueryExecutionCoordinator<E> {
    QueryExecutionCoordinator::new(executor, SecurityValidator::default(), corrector(), config)
}

#[tokio::test]
async fn test_misspelled_column_repaired_and_executed() {
    let stats = Arc::new(StatsCollector::new());
    let c = coordinator(UsersTable::default(), ExecutionConfig::default()).with_stats(stats.clone());

    let outcome = c.execute("SELECT id, usr_nam FROM users LIMIT 5").await;
    match &outcome {
        ExecutionOutcome::Success {
            executed_query,
            attempts,
            ..
        } => {
            assert_eq!(executed_query, "SELECT id, user_name FROM users LIMIT 5;");
            assert_eq!(*attempts, 2);
        }
        other => panic!("unexpected outcome: {:?}", other)
    }
    assert!(outcome.is_success());
    assert_eq!(stats.snapshot().execution.successful_after_correction, 1);
}

#[tokio::test]
async fn test_markdown_wrapped_query_is_cleaned() {
    let c = coordinator(UsersTable::default(), ExecutionConfig::default());
    let outcome = c.execute("```sql\nSELECT id, email\nFROM users\nLIMIT 1\n```").await;
    assert!(outcome.render().ends_with("via SELECT id, email FROM users LIMIT 1;"));
}

#[tokio::test]
async fn test_blocked_query_recorded_by_monitor() {
    let monitor = Arc::new(SecurityMonitor::default());
    let c = coordinator(UsersTable::default(), ExecutionConfig::default()).with_monitor(monitor.clone());

    let outcome = c
        .execute_in_session("SELECT name FROM users WHERE 1=1 OR 1=1", Some("s-1"))
        .await;
    assert!(matches!(outcome, ExecutionOutcome::Blocked { .. }));
    assert_eq!(c.executor().calls.load(Ordering::SeqCst), 0);

    let events = monitor.recent_events(10);
    assert_eq!(events.len(), 1);
    assert!(events[0].blocked);
    assert_eq!(events[0].session_id.as_deref(), Some("s-1"));
}

#[tokio::test]
async fn test_retry_budget_is_bounded() {
    let config = ExecutionConfig {
        max_retry_attempts: 2,
        ..ExecutionConfig::default()
    };
    let c = coordinator(Unreachable, config);
    let outcome = c.execute("SELECT id FROM users LIMIT 1").await;

    let ExecutionOutcome::Failed(failure) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(failure.attempts, 3);
    assert!(!failure.query_modified());
    let text = failure.render();
    assert!(text.starts_with("Query execution failed after 3 attempts."));
    assert!(text.contains("Final error: could not connect to server"));
}

#[tokio::test]
async fn test_zero_retries_single_attempt() {
    let config = ExecutionConfig {
        max_retry_attempts: 0,
        ..ExecutionConfig::default()
    };
    let c = coordinator(UsersTable::default(), config);
    let outcome = c.execute("SELECT usr_nam FROM users LIMIT 1").await;

    assert!(matches!(outcome, ExecutionOutcome::Failed(ref f) if f.attempts == 1));
    assert_eq!(c.executor().calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_auto_correction_disabled_retries_unchanged() {
    let config = ExecutionConfig {
        max_retry_attempts: 1,
        auto_correction: false,
        progressive_strategies: false,
        ..ExecutionConfig::default()
    };
    let c = coordinator(UsersTable::default(), config);
    let outcome = c.execute("SELECT usr_nam FROM users LIMIT 1").await;

    let ExecutionOutcome::Failed(failure) = outcome else {
        panic!("expected failure");
    };
    assert_eq!(failure.final_query, failure.original_query);
    assert_eq!(c.executor().calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_query_suggestions_security_first() {
    let c = coordinator(UsersTable::default(), ExecutionConfig::default());
    let suggestions = c.query_suggestions("SELECT * FROM users");

    assert_eq!(suggestions[0].severity, RiskLevel::Critical);
    assert!(suggestions.iter().any(|s| s.kind == "security_violation"));
    for pair in suggestions.windows(2) {
        assert!(pair[0].severity >= pair[1].severity);
    }
}
