//! Session state shared between the job task and its controller.
//!
//! Progress and the result buffer live under a single lock so every
//! mutation is totally ordered. The stop flag is a separate atomic so the
//! scraping loop can poll it without contending on that lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Local;
use tracing::{debug, info, warn};

use crate::models::{Progress, ProgressSnapshot, ProgressStatus, Record};

/// Number of sessions the registry keeps around for status queries.
pub const MAX_SESSIONS: usize = 10;

#[derive(Debug, Default)]
struct SessionState {
    progress: Progress,
    results: Vec<Record>,
    /// Number of leading `results` already written to the checkpoint.
    flushed: usize,
}

/// Owns the progress, result buffer and stop flag of one scraping run.
#[derive(Debug)]
pub struct SessionController {
    id: String,
    state: Mutex<SessionState>,
    stop: AtomicBool,
}

impl SessionController {
    /// Create a session with an auto-generated id.
    pub fn create_session() -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let id = format!(
            "session_{}_{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            &suffix[..8]
        );
        Self::with_id(id)
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(SessionState::default()),
            stop: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reset progress to a fresh running state and clear the stop flag.
    /// The dedup set survives so identifiers seeded earlier are kept.
    pub fn start(&self, total: usize, target: usize) {
        let mut state = self.lock();
        let scraped_ids = std::mem::take(&mut state.progress.scraped_ids);
        state.progress = Progress {
            total_items: total,
            target,
            status: ProgressStatus::Running,
            start_time: Some(Local::now()),
            scraped_ids,
            ..Default::default()
        };
        self.stop.store(false, Ordering::SeqCst);
        info!(session = %self.id, total, target, "Session started");
    }

    /// Set the number of input keys once it is known.
    pub fn set_total(&self, total: usize) {
        let mut state = self.lock();
        if state.progress.status.is_terminal() {
            return;
        }
        state.progress.total_items = total;
    }

    /// Profiles already in the checkpoint when the run started. Reported
    /// only; the target counts this session's profiles.
    pub fn set_existing(&self, existing: usize) {
        let mut state = self.lock();
        if state.progress.status.is_terminal() {
            return;
        }
        state.progress.existing_items = existing;
    }

    pub fn items_scraped(&self) -> usize {
        self.lock().progress.items_scraped
    }

    /// Whether this session recorded `target` profiles (0 = no limit).
    pub fn target_reached(&self) -> bool {
        let state = self.lock();
        state.progress.target > 0 && state.progress.items_scraped >= state.progress.target
    }

    /// Record the key about to be processed. `percentage` and
    /// `current_index` never move backwards within a session.
    pub fn update(&self, item: &str, index: usize, scraped_count: usize) {
        let mut state = self.lock();
        let progress = &mut state.progress;
        if progress.status.is_terminal() {
            return;
        }
        progress.current_item = Some(item.to_string());
        progress.current_index = progress.current_index.max(index);
        progress.items_scraped = progress.items_scraped.max(scraped_count);
        if progress.total_items > 0 {
            let pct = round2(index as f64 / progress.total_items as f64 * 100.0).clamp(0.0, 100.0);
            progress.percentage = progress.percentage.max(pct);
        }
    }

    pub fn mark_success(&self, item: &str, count: usize) {
        let mut state = self.lock();
        if state.progress.status.is_terminal() {
            return;
        }
        state.progress.successes += 1;
        state.progress.items_scraped += count;
        debug!(session = %self.id, "Recorded {} ({} item(s))", item, count);
    }

    pub fn mark_failure(&self, item: &str, error: &str) {
        let mut state = self.lock();
        if state.progress.status.is_terminal() {
            return;
        }
        state.progress.failures += 1;
        warn!(session = %self.id, "Failed to process {}: {}", item, error);
    }

    /// Ask the job to stop at its next check point.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let mut state = self.lock();
        if state.progress.status == ProgressStatus::Running {
            state.progress.status = ProgressStatus::Stopping;
        }
        info!(session = %self.id, "Stop requested");
    }

    /// Cheap poll for the loop. A stop observed here lets the candidate in
    /// flight finish; the next key or candidate is not started.
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Freeze the session in its final state.
    pub fn complete(&self, success: bool, error: Option<String>) {
        let stop_requested = self.should_stop();
        let mut state = self.lock();
        let progress = &mut state.progress;
        if progress.status.is_terminal() {
            return;
        }
        progress.end_time = Some(Local::now());
        progress.status = match (&error, stop_requested, success) {
            (Some(_), _, _) => ProgressStatus::Error,
            (None, true, _) => ProgressStatus::Stopped,
            (None, false, true) => ProgressStatus::Completed,
            (None, false, false) => ProgressStatus::Error,
        };
        progress.error_message = error;
        info!(
            session = %self.id,
            status = %progress.status,
            scraped = progress.items_scraped,
            "Session finished"
        );
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.lock();
        ProgressSnapshot::capture(&self.id, &state.progress, state.results.len())
    }

    pub fn is_scraped(&self, identifier: &str) -> bool {
        self.lock().progress.scraped_ids.contains(identifier)
    }

    pub fn add_scraped(&self, identifier: &str) {
        self.lock()
            .progress
            .scraped_ids
            .insert(identifier.to_string());
    }

    /// Seed the dedup set, e.g. with identifiers already in the checkpoint.
    pub fn seed_scraped<I, S>(&self, identifiers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.lock();
        state
            .progress
            .scraped_ids
            .extend(identifiers.into_iter().map(Into::into));
    }

    pub fn add_result(&self, record: Record) {
        self.lock().results.push(record);
    }

    /// Records buffered but not yet written to the checkpoint.
    pub fn pending(&self) -> Vec<Record> {
        let state = self.lock();
        state.results[state.flushed..].to_vec()
    }

    pub fn pending_count(&self) -> usize {
        let state = self.lock();
        state.results.len() - state.flushed
    }

    /// Mark the first `count` pending records as persisted.
    pub fn mark_flushed(&self, count: usize) {
        let mut state = self.lock();
        state.flushed = (state.flushed + count).min(state.results.len());
    }

    /// The most recent `limit` buffered records, oldest first.
    pub fn results(&self, limit: usize) -> Vec<Record> {
        let state = self.lock();
        let start = state.results.len().saturating_sub(limit);
        state.results[start..].to_vec()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Keeps the most recent sessions so past runs can still be queried.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<VecDeque<Arc<SessionController>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a new session; it becomes the current one.
    pub fn create_session(&self) -> Arc<SessionController> {
        let session = Arc::new(SessionController::create_session());
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.push_back(Arc::clone(&session));
        while sessions.len() > MAX_SESSIONS {
            if let Some(old) = sessions.pop_front() {
                debug!("Retiring session {}", old.id());
            }
        }
        session
    }

    pub fn current(&self) -> Option<Arc<SessionController>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }
}
