//! Error taxonomy and the failure policy table.
//!
//! Soft failures (navigation, extraction, locator) are absorbed at the
//! innermost scope that can handle them. Fatal failures (driver,
//! authentication, storage) unwind to the orchestrator and end the job.

use thiserror::Error;

/// The browser handle could not be created or recovered.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Browser launch failed: {0}")]
    Launch(String),
    #[error("Browser initialization failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
    #[error("Browser session lost: {0}")]
    Lost(String),
    #[error("Browser support not compiled. Rebuild with: cargo build --features browser")]
    Unsupported,
}

/// Checkpoint file errors.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Checkpoint CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to persist checkpoint: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Errors raised while running a scraping job.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("Navigation failed: {0}")]
    Navigation(String),
    #[error("Extraction failed: {0}")]
    Extraction(String),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Selector detection failed: {0}")]
    Locator(String),
    #[error("Storage error: {0}")]
    Storage(#[from] CheckpointError),
    #[error("Input error: {0}")]
    Input(String),
}

impl ScrapeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ScrapeError::Driver(_) => FailureKind::Driver,
            ScrapeError::Navigation(_) => FailureKind::Navigation,
            ScrapeError::Extraction(_) => FailureKind::Extraction,
            ScrapeError::Authentication(_) => FailureKind::Authentication,
            ScrapeError::Locator(_) => FailureKind::Locator,
            ScrapeError::Storage(_) | ScrapeError::Input(_) => FailureKind::Storage,
        }
    }

    /// Whether this error must end the job.
    pub fn is_fatal(&self) -> bool {
        self.kind().policy() == FailurePolicy::AbortJob
    }
}

/// Failure classes used to pick a recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Driver,
    Navigation,
    Extraction,
    Authentication,
    Locator,
    Storage,
}

/// What the caller does when a failure of a given kind occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Substitute a placeholder or default and keep going.
    Skip,
    /// Give up on the current search key only.
    AbortKey,
    /// End the job with `status=error`.
    AbortJob,
}

impl FailureKind {
    pub fn policy(self) -> FailurePolicy {
        match self {
            FailureKind::Extraction | FailureKind::Locator => FailurePolicy::Skip,
            FailureKind::Navigation => FailurePolicy::AbortKey,
            FailureKind::Driver | FailureKind::Authentication | FailureKind::Storage => {
                FailurePolicy::AbortJob
            }
        }
    }
}

/// Errors surfaced by the job runner façade.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("A scraping job is already running (session {0})")]
    AlreadyRunning(String),
    #[error("No scraping job is running")]
    NotRunning,
    #[error(transparent)]
    Storage(#[from] CheckpointError),
}
