//! Pipeline telemetry.
//!
//! A [`StatsCollector`] is created by the caller and shared through an `Arc`
//! with every component that reports into it. Counters are advisory: a
//! poisoned lock drops the update instead of failing the pipeline.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    correction::{CorrectionAttempt, CorrectionStrategy},
    injection::RiskLevel,
    recovery::RecoveryResult,
    validator::SecurityReport
};

#[derive(Debug, Clone, Default, Serialize)]
pub struct SecurityStats {
    pub total_queries:      u64,
    pub blocked_queries:    u64,
    pub violations_by_type: IndexMap<String, u64>,
    pub last_violation:     Option<LastViolation>
}

#[derive(Debug, Clone, Serialize)]
pub struct LastViolation {
    pub query_hash: String,
    pub risk_level: RiskLevel,
    pub violations: Vec<String>,
    pub at:         DateTime<Utc>
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryStats {
    pub total_attempts:        u64,
    pub successful_recoveries: u64,
    pub errors_by_type:        IndexMap<String, u64>,
    pub corrections_applied:   IndexMap<String, u64>
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CorrectionStats {
    pub total_corrections:      u64,
    pub successful_corrections: u64,
    pub by_strategy:            IndexMap<String, u64>,
    pub common_corrections:     IndexMap<String, u64>
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionStats {
    pub total_queries:               u64,
    pub successful_first_try:        u64,
    pub successful_after_correction: u64,
    pub failed_after_retries:        u64,
    pub blocked:                     u64,
    pub total_retries:               u64
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SelectorStats {
    pub total_selections: u64,
    pub tables_filtered:  u64,
    pub cache_hits:       u64,
    pub fallback_used:    u64,
    similarity_sum:       f64,
    scored_selections:    u64
}

impl SelectorStats {
    pub fn avg_similarity_score(&self) -> f64 {
        if self.scored_selections == 0 {
            0.0
        } else {
            self.similarity_sum / self.scored_selections as f64
        }
    }
}

#[derive(Debug, Clone, Default)]
struct StatsState {
    security:   SecurityStats,
    recovery:   RecoveryStats,
    correction: CorrectionStats,
    execution:  ExecutionStats,
    selector:   SelectorStats
}

/// Point-in-time copy of all counters with derived rates.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub security:                SecurityStats,
    pub recovery:                RecoveryStats,
    pub correction:              CorrectionStats,
    pub execution:               ExecutionStats,
    pub selector:                SelectorStats,
    /// Percentage of validated queries that were blocked
    pub block_rate:              f64,
    pub recovery_success_rate:   f64,
    pub correction_success_rate: f64,
    pub execution_success_rate:  f64,
    pub avg_similarity_score:    f64,
    pub top_violations:          Vec<(String, u64)>,
    pub top_errors:              Vec<(String, u64)>,
    pub top_fixes:               Vec<(String, u64)>
}

/// Final state of one coordinated execution, as counted by the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionKind {
    FirstTry,
    AfterCorrection,
    Failed,
    Blocked
}

/// Shared, resettable counters.
#[derive(Debug, Default)]
pub struct StatsCollector {
    state: Mutex<StatsState>
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut StatsState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }

    pub fn record_validation(&self, report: &SecurityReport) {
        self.update(|s| {
            s.security.total_queries += 1;
            if report.is_safe {
                return;
            }
            s.security.blocked_queries += 1;
            for violation in &report.violations {
                let key = violation
                    .split_once(':')
                    .map_or(violation.as_str(), |(head, _)| head);
                *s.security
                    .violations_by_type
                    .entry(key.to_string())
                    .or_default() += 1;
            }
            s.security.last_violation = Some(LastViolation {
                query_hash: report.query_hash.clone(),
                risk_level: report.risk_level,
                violations: report.violations.clone(),
                at:         report.checked_at
            });
        });
    }

    pub fn record_recovery(&self, result: &RecoveryResult) {
        self.update(|s| {
            s.recovery.total_attempts += 1;
            *s.recovery
                .errors_by_type
                .entry(result.error_type.as_str().to_string())
                .or_default() += 1;
            if result.success {
                s.recovery.successful_recoveries += 1;
                for fix in &result.corrections_applied {
                    *s.recovery
                        .corrections_applied
                        .entry(fix.clone())
                        .or_default() += 1;
                }
            }
        });
    }

    pub fn record_correction(&self, strategy: CorrectionStrategy, attempts: &[CorrectionAttempt]) {
        self.update(|s| {
            s.correction.total_corrections += 1;
            *s.correction
                .by_strategy
                .entry(strategy.as_str().to_string())
                .or_default() += 1;
            if attempts.iter().any(|a| a.changed()) {
                s.correction.successful_corrections += 1;
            }
            for attempt in attempts {
                for fix in &attempt.corrections_applied {
                    *s.correction
                        .common_corrections
                        .entry(fix.clone())
                        .or_default() += 1;
                }
            }
        });
    }

    pub fn record_execution(&self, kind: ExecutionKind, retries: u32) {
        self.update(|s| {
            s.execution.total_queries += 1;
            s.execution.total_retries += u64::from(retries);
            match kind {
                ExecutionKind::FirstTry => s.execution.successful_first_try += 1,
                ExecutionKind::AfterCorrection => s.execution.successful_after_correction += 1,
                ExecutionKind::Failed => s.execution.failed_after_retries += 1,
                ExecutionKind::Blocked => s.execution.blocked += 1
            }
        });
    }

    /// Count a scored selection that dropped `filtered` tables
    pub fn record_selection(&self, filtered: usize, avg_score: Option<f32>) {
        self.update(|s| {
            s.selector.total_selections += 1;
            s.selector.tables_filtered += filtered as u64;
            if let Some(score) = avg_score {
                s.selector.similarity_sum += f64::from(score);
                s.selector.scored_selections += 1;
            }
        });
    }

    pub fn record_selection_fallback(&self) {
        self.update(|s| {
            s.selector.total_selections += 1;
            s.selector.fallback_used += 1;
        });
    }

    pub fn record_embedding_cache_hit(&self) {
        self.update(|s| s.selector.cache_hits += 1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let state = match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone()
        };

        let exec = &state.execution;
        let executed = exec.total_queries.saturating_sub(exec.blocked);

        StatsSnapshot {
            block_rate:              percent(
                state.security.blocked_queries,
                state.security.total_queries
            ),
            recovery_success_rate:   percent(
                state.recovery.successful_recoveries,
                state.recovery.total_attempts
            ),
            correction_success_rate: percent(
                state.correction.successful_corrections,
                state.correction.total_corrections
            ),
            execution_success_rate:  percent(
                exec.successful_first_try + exec.successful_after_correction,
                executed
            ),
            avg_similarity_score:    state.selector.avg_similarity_score(),
            top_violations:          top_n(&state.security.violations_by_type, 5),
            top_errors:              top_n(&state.recovery.errors_by_type, 5),
            top_fixes:               top_n(&state.recovery.corrections_applied, 5),
            security:                state.security,
            recovery:                state.recovery,
            correction:              state.correction,
            execution:               state.execution,
            selector:                state.selector
        }
    }

    pub fn reset(&self) {
        self.update(|s| *s = StatsState::default());
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Highest counts first; equal counts keep insertion order
fn top_n(counts: &IndexMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut items: Vec<(String, u64)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    items.sort_by(|a, b| b.1.cmp(&a.1));
    items.truncate(n);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_n_orders_by_count() {
        let mut counts = IndexMap::new();
        counts.insert("a".to_string(), 1);
        counts.insert("b".to_string(), 3);
        counts.insert("c".to_string(), 3);
        let top = top_n(&counts, 2);
        assert_eq!(top, vec![("b".to_string(), 3), ("c".to_string(), 3)]);
    }

    #[test]
    fn test_percent_handles_zero() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(1, 4), 25.0);
    }

    #[test]
    fn test_execution_counters_and_reset() {
        let stats = StatsCollector::new();
        stats.record_execution(ExecutionKind::FirstTry, 0);
        stats.record_execution(ExecutionKind::AfterCorrection, 2);
        stats.record_execution(ExecutionKind::Blocked, 0);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.execution.total_queries, 3);
        assert_eq!(snapshot.execution.total_retries, 2);
        assert_eq!(snapshot.execution_success_rate, 100.0);

        stats.reset();
        assert_eq!(stats.snapshot().execution.total_queries, 0);
    }

    #[test]
    fn test_selection_average() {
        let stats = StatsCollector::new();
        stats.record_selection(2, Some(0.5));
        stats.record_selection(0, Some(0.25));
        stats.record_selection_fallback();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.selector.total_selections, 3);
        assert_eq!(snapshot.selector.fallback_used, 1);
        assert!((snapshot.avg_similarity_score - 0.375).abs() < 1e-9);
    }
}
