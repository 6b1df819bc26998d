//! Progress tracking for one scraping session.

use std::collections::HashSet;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    #[default]
    Idle,
    Running,
    Stopping,
    Completed,
    Stopped,
    Error,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    /// Whether the session has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Error)
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable progress state. Only the session controller touches this.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    pub current_item: Option<String>,
    pub current_index: usize,
    pub total_items: usize,
    pub target: usize,
    /// Profiles recorded by this session.
    pub items_scraped: usize,
    /// Checkpoint rows present before the session started.
    pub existing_items: usize,
    pub successes: usize,
    pub failures: usize,
    pub percentage: f64,
    pub status: ProgressStatus,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
    pub error_message: Option<String>,
    pub scraped_ids: HashSet<String>,
}

/// Immutable copy of [`Progress`] handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub session_id: String,
    pub current_item: Option<String>,
    pub current_index: usize,
    pub total_items: usize,
    pub target: usize,
    pub items_scraped: usize,
    pub existing_items: usize,
    pub successes: usize,
    pub failures: usize,
    pub percentage: f64,
    pub status: ProgressStatus,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
    pub error_message: Option<String>,
    pub scraped_ids: usize,
    pub total_results: usize,
}

impl ProgressSnapshot {
    pub(crate) fn capture(session_id: &str, progress: &Progress, total_results: usize) -> Self {
        Self {
            session_id: session_id.to_string(),
            current_item: progress.current_item.clone(),
            current_index: progress.current_index,
            total_items: progress.total_items,
            target: progress.target,
            items_scraped: progress.items_scraped,
            existing_items: progress.existing_items,
            successes: progress.successes,
            failures: progress.failures,
            percentage: progress.percentage,
            status: progress.status,
            start_time: progress.start_time,
            end_time: progress.end_time,
            error_message: progress.error_message.clone(),
            scraped_ids: progress.scraped_ids.len(),
            total_results,
        }
    }

    /// Wall-clock duration so far, or of the finished session.
    pub fn duration_seconds(&self) -> Option<f64> {
        let start = self.start_time?;
        let end = self.end_time.unwrap_or_else(Local::now);
        Some((end - start).num_milliseconds() as f64 / 1000.0)
    }
}
