//! Background job runner.
//!
//! Owns the shared browser session and a single job slot. Callers start a
//! job, poll its status, and stop it; the job itself runs the orchestrator
//! on a tokio task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::checkpoint::CheckpointStore;
use crate::error::JobError;
use crate::models::{ProgressSnapshot, Record};
use crate::orchestrator::Orchestrator;
use crate::session::{SessionController, SessionRegistry};

/// Default time `stop` waits for the job task before detaching it.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

struct ActiveJob {
    session: Arc<SessionController>,
    handle: JoinHandle<ProgressSnapshot>,
}

pub struct JobRunner {
    browser: Arc<Mutex<BrowserSession>>,
    registry: SessionRegistry,
    store: Arc<dyn CheckpointStore>,
    active: Option<ActiveJob>,
    stop_timeout: Duration,
}

impl JobRunner {
    pub fn new(browser: BrowserSession, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            browser: Arc::new(Mutex::new(browser)),
            registry: SessionRegistry::new(),
            store,
            active: None,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Shared browser session. A job holds the lock for its whole run.
    pub fn browser(&self) -> Arc<Mutex<BrowserSession>> {
        Arc::clone(&self.browser)
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|job| !job.handle.is_finished())
    }

    /// Spawn `orchestrator` on a background task.
    pub fn start(&mut self, orchestrator: Orchestrator) -> Result<Arc<SessionController>, JobError> {
        if let Some(job) = &self.active {
            if !job.handle.is_finished() {
                return Err(JobError::AlreadyRunning(job.session.id().to_string()));
            }
        }

        let session = self.registry.create_session();
        session.start(0, orchestrator.options().target);
        self.store = orchestrator.store();

        let browser = Arc::clone(&self.browser);
        let task_session = Arc::clone(&session);
        let handle = tokio::spawn(async move {
            let mut browser = browser.lock().await;
            orchestrator.run(&mut browser, &task_session).await
        });

        info!(session = session.id(), "Job started");
        self.active = Some(ActiveJob {
            session: Arc::clone(&session),
            handle,
        });
        Ok(session)
    }

    /// Request a stop and wait up to the stop timeout for the task to end.
    /// A task still running after that is detached, not killed.
    pub async fn stop(&mut self) -> Result<ProgressSnapshot, JobError> {
        let job = self.active.take().ok_or(JobError::NotRunning)?;
        job.session.request_stop();

        let mut handle = job.handle;
        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(e)) => {
                warn!("Job task ended abnormally: {}", e);
                job.session
                    .complete(false, Some(format!("job task failed: {}", e)));
                Ok(job.session.snapshot())
            }
            Err(_) => {
                warn!(
                    "Job did not stop within {:?}; detaching it",
                    self.stop_timeout
                );
                drop(handle);
                Ok(job.session.snapshot())
            }
        }
    }

    /// Wait for the active job to finish on its own.
    pub async fn wait(&mut self) -> Result<ProgressSnapshot, JobError> {
        let job = self.active.take().ok_or(JobError::NotRunning)?;
        match job.handle.await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                warn!("Job task ended abnormally: {}", e);
                job.session
                    .complete(false, Some(format!("job task failed: {}", e)));
                Ok(job.session.snapshot())
            }
        }
    }

    /// Snapshot of the most recent session.
    pub fn status(&self) -> Option<ProgressSnapshot> {
        self.registry.current().map(|s| s.snapshot())
    }

    /// The last `limit` buffered records of the current session, or of the
    /// checkpoint when nothing is buffered.
    pub fn results(&self, limit: usize) -> Result<Vec<Record>, JobError> {
        if let Some(session) = self.registry.current() {
            let buffered = session.results(limit);
            if !buffered.is_empty() {
                return Ok(buffered);
            }
        }
        let stored = self.store.load()?;
        let start = stored.len().saturating_sub(limit);
        Ok(stored[start..].to_vec())
    }

    /// Stop any active job and close the browser.
    pub async fn shutdown(&mut self) {
        if self.active.is_some() {
            if let Err(e) = self.stop().await {
                debug!("Stop during shutdown: {}", e);
            }
        }
        match tokio::time::timeout(self.stop_timeout, self.browser.lock()).await {
            Ok(mut browser) => browser.cleanup().await,
            Err(_) => warn!("Browser still in use; leaving it open"),
        }
    }
}
