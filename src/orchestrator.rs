//! Job state machine.
//!
//! AUTHENTICATE -> LOCATE -> RESOLVE_INPUT -> RESUME -> MAIN_LOOP -> FINALIZE.
//! A fatal error in any stage jumps straight to FINALIZE, which always
//! flushes whatever is buffered and freezes the session.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::checkpoint::{resume_point, CheckpointStore, CsvCheckpointStore, ProgressNote};
use crate::config::Settings;
use crate::delay::{DelayCategory, DelayPolicy};
use crate::error::{FailurePolicy, ScrapeError};
use crate::input::{CsvInputSource, InputSource};
use crate::models::{ProgressSnapshot, ProgressStatus};
use crate::scrape::{
    Authenticator, ExtractionLoop, Extractor, HeuristicLocator, HtmlProfileExtractor, KeyOutcome,
    KeyReport, ListingSelectors, Locator, LoopOptions, PageSelectors, PasswordAuthenticator,
};
use crate::session::SessionController;

/// Orchestrator stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authenticate,
    Locate,
    ResolveInput,
    Resume,
    MainLoop,
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Authenticate => "authenticate",
            Stage::Locate => "locate",
            Stage::ResolveInput => "resolve_input",
            Stage::Resume => "resume",
            Stage::MainLoop => "main_loop",
            Stage::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// Per-run knobs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Profiles to record in this run (0 = no limit). Rows already in the
    /// checkpoint do not count.
    pub target: usize,
    pub resume: bool,
    pub flush_every_keys: usize,
    pub flush_pending: usize,
    /// Skip detection and use these selectors.
    pub selector_override: Option<PageSelectors>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            target: 10,
            resume: true,
            flush_every_keys: 3,
            flush_pending: 5,
            selector_override: None,
        }
    }
}

/// Sequences one scraping run.
pub struct Orchestrator {
    authenticator: Arc<dyn Authenticator>,
    locator: Arc<dyn Locator>,
    input: Arc<dyn InputSource>,
    store: Arc<dyn CheckpointStore>,
    note: Option<ProgressNote>,
    extraction: ExtractionLoop,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        locator: Arc<dyn Locator>,
        input: Arc<dyn InputSource>,
        store: Arc<dyn CheckpointStore>,
        extraction: ExtractionLoop,
        options: RunOptions,
    ) -> Self {
        Self {
            authenticator,
            locator,
            input,
            store,
            note: None,
            extraction,
            options,
        }
    }

    pub fn with_progress_note(mut self, note: ProgressNote) -> Self {
        self.note = Some(note);
        self
    }

    /// Wire the default capabilities from settings.
    pub fn from_settings(settings: &Settings, selector_override: Option<PageSelectors>) -> Self {
        let job = &settings.job;
        let delays = DelayPolicy::new(&settings.delays);
        let listing = ListingSelectors::from(&settings.selectors);
        let output = settings.output_path();

        let input = CsvInputSource::new(settings.input_path());
        let sample_keys = input.load_keys().unwrap_or_default();

        let authenticator =
            PasswordAuthenticator::new(settings.site.clone(), settings.credentials.clone());
        let locator = HeuristicLocator::new(settings.site.clone(), listing.clone())
            .with_sample_keys(&sample_keys);
        let extractor: Arc<dyn Extractor> =
            Arc::new(HtmlProfileExtractor::new(delays, job.fast_mode));
        let extraction = ExtractionLoop::new(
            settings.site.clone(),
            listing,
            extractor,
            LoopOptions::from(job),
        );

        Self::new(
            Arc::new(authenticator),
            Arc::new(locator),
            Arc::new(input),
            Arc::new(CsvCheckpointStore::new(&output)),
            extraction,
            RunOptions {
                target: job.target,
                resume: job.resume,
                flush_every_keys: job.flush_every_keys.max(1),
                flush_pending: job.flush_pending.max(1),
                selector_override,
            },
        )
        .with_progress_note(ProgressNote::for_checkpoint(&output))
    }

    pub fn store(&self) -> Arc<dyn CheckpointStore> {
        Arc::clone(&self.store)
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run every stage and return the final snapshot. Never panics on job
    /// failures; they end up in the snapshot's status and error message.
    pub async fn run(
        &self,
        browser: &mut BrowserSession,
        session: &SessionController,
    ) -> ProgressSnapshot {
        if session.snapshot().status == ProgressStatus::Idle {
            session.start(0, self.options.target);
        }

        let result = self.execute(browser, session).await;

        info!(stage = %Stage::Finalize, session = session.id(), "Entering stage");
        let flushed = self.flush(session);
        match (result, flushed) {
            (Ok(()), Ok(())) => session.complete(true, None),
            (Err(e), _) | (Ok(()), Err(e)) => {
                warn!("Job failed: {}", e);
                session.complete(false, Some(e.to_string()));
            }
        }
        session.snapshot()
    }

    async fn execute(
        &self,
        browser: &mut BrowserSession,
        session: &SessionController,
    ) -> Result<(), ScrapeError> {
        info!(stage = %Stage::Authenticate, "Entering stage");
        self.authenticator.ensure_authenticated(browser).await?;

        info!(stage = %Stage::Locate, "Entering stage");
        let selectors = self.resolve_selectors(browser).await?;

        info!(stage = %Stage::ResolveInput, "Entering stage");
        let keys = self.input.load_keys()?;
        if keys.is_empty() {
            return Err(ScrapeError::Input("No names found in input file".into()));
        }
        session.set_total(keys.len());
        let existing = self.store.identifiers()?;
        session.set_existing(existing.len());
        session.seed_scraped(existing);

        info!(stage = %Stage::Resume, "Entering stage");
        let start = if self.options.resume {
            let last = self.store.read_last_identifier()?;
            resume_point(&keys, last.as_deref())
        } else {
            0
        };
        info!(
            start,
            remaining = keys.len().saturating_sub(start),
            existing = session.snapshot().existing_items,
            target = self.options.target,
            "Resume point computed"
        );

        info!(stage = %Stage::MainLoop, "Entering stage");
        self.main_loop(browser, session, &selectors, &keys, start).await
    }

    async fn resolve_selectors(
        &self,
        browser: &mut BrowserSession,
    ) -> Result<PageSelectors, ScrapeError> {
        if let Some(selectors) = &self.options.selector_override {
            info!("Using provided selectors");
            return Ok(selectors.clone());
        }
        match self.locator.resolve_selectors(browser).await {
            Ok(selectors) => Ok(selectors),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("{}; using fallback selectors", e);
                Ok(PageSelectors::fallback())
            }
        }
    }

    async fn main_loop(
        &self,
        browser: &mut BrowserSession,
        session: &SessionController,
        selectors: &PageSelectors,
        keys: &[String],
        start: usize,
    ) -> Result<(), ScrapeError> {
        let mut keys_since_flush = 0;

        for (index, key) in keys.iter().enumerate().skip(start) {
            if session.should_stop() {
                info!("Stop requested; not starting '{}'", key);
                break;
            }
            if session.target_reached() {
                info!("Target of {} profiles reached", self.options.target);
                break;
            }

            session.update(key, index, session.items_scraped());
            info!(key = %key, index, total = keys.len(), "Processing key");

            let report = match self.extraction.run_key(browser, session, selectors, key).await {
                Ok(report) => report,
                Err(e) if e.kind().policy() == FailurePolicy::AbortJob => return Err(e),
                Err(e) => KeyReport {
                    outcome: KeyOutcome::Failed(e.to_string()),
                    recorded: 0,
                },
            };

            if report.recorded > 0 {
                if let Some(note) = &self.note {
                    note.write(key);
                }
            } else {
                match &report.outcome {
                    KeyOutcome::Failed(msg) => session.mark_failure(key, msg),
                    KeyOutcome::Exhausted => session.mark_failure(key, "No profiles found"),
                    KeyOutcome::Stopped | KeyOutcome::TargetReached => {}
                }
            }
            session.update(key, index + 1, session.items_scraped());

            keys_since_flush += 1;
            if keys_since_flush >= self.options.flush_every_keys
                || session.pending_count() >= self.options.flush_pending
            {
                self.flush(session)?;
                keys_since_flush = 0;
            }

            if matches!(report.outcome, KeyOutcome::Stopped | KeyOutcome::TargetReached) {
                break;
            }
            if index + 1 < keys.len() {
                browser.pause(DelayCategory::Interaction).await;
            }
        }
        Ok(())
    }

    /// Write pending records to the checkpoint.
    fn flush(&self, session: &SessionController) -> Result<(), ScrapeError> {
        let pending = session.pending();
        if pending.is_empty() {
            return Ok(());
        }
        let summary = self.store.append(&pending)?;
        session.mark_flushed(pending.len());
        info!(
            inserted = summary.inserted,
            replaced = summary.replaced,
            "Checkpoint flushed"
        );
        Ok(())
    }
}
