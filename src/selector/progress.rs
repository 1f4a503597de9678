//! Indexing progress published as immutable snapshots.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
    Disabled
}

impl IndexingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Disabled => "disabled"
        }
    }
}

/// Point-in-time view of an index build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexingProgress {
    pub status:             IndexingStatus,
    pub total_tables:       usize,
    pub processed_tables:   usize,
    pub successful_tables:  usize,
    pub failed_tables:      usize,
    pub current_table:      Option<String>,
    pub error_message:      Option<String>,
    pub failed_table_names: Vec<String>,
    pub started_at:         Option<DateTime<Utc>>,
    pub finished_at:        Option<DateTime<Utc>>
}

impl IndexingProgress {
    pub fn new(status: IndexingStatus) -> Self {
        Self {
            status,
            total_tables: 0,
            processed_tables: 0,
            successful_tables: 0,
            failed_tables: 0,
            current_table: None,
            error_message: None,
            failed_table_names: Vec::new(),
            started_at: None,
            finished_at: None
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.total_tables == 0 {
            0.0
        } else {
            self.processed_tables as f64 / self.total_tables as f64 * 100.0
        }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        let start = self.started_at?;
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - start).to_std().ok()
    }

    /// Linear estimate from the average time per processed table
    pub fn estimated_remaining(&self) -> Option<Duration> {
        if self.status != IndexingStatus::InProgress || self.processed_tables == 0 {
            return None;
        }
        let per_table = self.elapsed()?.as_secs_f64() / self.processed_tables as f64;
        let remaining = self.total_tables.saturating_sub(self.processed_tables);
        Some(Duration::from_secs_f64(per_table * remaining as f64))
    }
}

/// Single writer of [`IndexingProgress`]; readers clone the latest snapshot.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    tx: watch::Sender<IndexingProgress>
}

impl ProgressTracker {
    pub(crate) fn new(status: IndexingStatus) -> Self {
        Self {
            tx: watch::Sender::new(IndexingProgress::new(status))
        }
    }

    pub(crate) fn snapshot(&self) -> IndexingProgress {
        self.tx.borrow().clone()
    }

    pub(crate) fn status(&self) -> IndexingStatus {
        self.tx.borrow().status
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<IndexingProgress> {
        self.tx.subscribe()
    }

    /// Move to `InProgress` unless a build is already running or selection
    /// is disabled. Returns whether this caller owns the build.
    pub(crate) fn try_begin(&self, total: usize) -> bool {
        self.tx.send_if_modified(|p| {
            if matches!(p.status, IndexingStatus::InProgress | IndexingStatus::Disabled) {
                return false;
            }
            *p = IndexingProgress {
                status: IndexingStatus::InProgress,
                total_tables: total,
                started_at: Some(Utc::now()),
                ..IndexingProgress::new(IndexingStatus::InProgress)
            };
            true
        })
    }

    pub(crate) fn table_started(&self, table: &str) {
        self.tx.send_modify(|p| p.current_table = Some(table.to_string()));
    }

    pub(crate) fn table_finished(&self, table: &str, ok: bool) {
        self.tx.send_modify(|p| {
            p.processed_tables += 1;
            if ok {
                p.successful_tables += 1;
            } else {
                p.failed_tables += 1;
                p.failed_table_names.push(table.to_string());
            }
        });
    }

    pub(crate) fn complete(&self) {
        self.finish(IndexingStatus::Completed, None);
    }

    pub(crate) fn fail(&self, message: impl Into<String>) {
        self.finish(IndexingStatus::Failed, Some(message.into()));
    }

    fn finish(&self, status: IndexingStatus, error: Option<String>) {
        self.tx.send_modify(|p| {
            p.status = status;
            p.current_table = None;
            p.error_message = error;
            p.finished_at = Some(Utc::now());
        });
    }

    /// Replace the whole snapshot, keeping `Disabled` sticky
    pub(crate) fn reset(&self, status: IndexingStatus, error: Option<String>) {
        self.tx.send_if_modified(|p| {
            if p.status == IndexingStatus::Disabled {
                return false;
            }
            *p = IndexingProgress {
                error_message: error,
                ..IndexingProgress::new(status)
            };
            true
        });
    }
}
