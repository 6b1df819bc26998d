//! Per-key search, pagination and candidate extraction.
//!
//! Stop and target are polled before every pagination attempt and every
//! candidate, so a stop request waits for at most one candidate. A
//! candidate in flight always finishes: its detail tab is closed and the
//! base tab brought back whatever the extractor returned.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::listing::{parse_candidates, Candidate, ListingSelectors, ScrollPlan};
use super::{Extractor, PageSelectors};
use crate::browser::{BrowserSession, DetailTab, HandleState, PageContext};
use crate::config::{JobConfig, SiteConfig};
use crate::delay::DelayCategory;
use crate::error::{DriverError, FailurePolicy, ScrapeError};
use crate::models::{ProfileDetails, Record};
use crate::session::SessionController;

/// Limits applied while processing one key. The profile target is the
/// session's, set when the session starts.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    pub max_load_more_clicks: usize,
    /// Restarts of one key after the browser had to be recovered.
    pub max_key_restarts: usize,
    pub extraction_timeout: Duration,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self::from(&JobConfig::default())
    }
}

impl From<&JobConfig> for LoopOptions {
    fn from(job: &JobConfig) -> Self {
        Self {
            max_load_more_clicks: job.max_load_more_clicks,
            max_key_restarts: job.max_key_restarts,
            extraction_timeout: Duration::from_secs(job.extraction_timeout_secs.max(1)),
        }
    }
}

/// Why processing of a key ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Pagination produced no new candidates.
    Exhausted,
    TargetReached,
    Stopped,
    /// The key's results could not be loaded.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyReport {
    pub outcome: KeyOutcome,
    /// Profiles recorded for this key, across restarts.
    pub recorded: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateOutcome {
    Recorded,
    Duplicate,
    /// Profile page could not be opened; the candidate is dropped.
    Skipped,
    BrowserLost,
}

/// Result of one pass over a key.
enum Scan {
    Done(KeyOutcome),
    /// The browser the pass was using (by generation) went away.
    BrowserLost { generation: u64 },
}

/// Drives search, pagination and extraction for one key at a time.
pub struct ExtractionLoop {
    site: SiteConfig,
    listing: ListingSelectors,
    extractor: Arc<dyn Extractor>,
    options: LoopOptions,
}

impl ExtractionLoop {
    pub fn new(
        site: SiteConfig,
        listing: ListingSelectors,
        extractor: Arc<dyn Extractor>,
        options: LoopOptions,
    ) -> Self {
        Self {
            site,
            listing,
            extractor,
            options,
        }
    }

    fn interrupted(&self, session: &SessionController) -> Option<KeyOutcome> {
        if session.should_stop() {
            Some(KeyOutcome::Stopped)
        } else if session.target_reached() {
            Some(KeyOutcome::TargetReached)
        } else {
            None
        }
    }

    /// Process one search key.
    ///
    /// Only fatal errors (the browser cannot be recovered) are returned as
    /// `Err`; everything else is reported in the [`KeyReport`].
    pub async fn run_key(
        &self,
        browser: &mut BrowserSession,
        session: &SessionController,
        selectors: &PageSelectors,
        key: &str,
    ) -> Result<KeyReport, ScrapeError> {
        let mut recorded = 0;
        let mut restarts = 0;
        loop {
            match self.scan(browser, session, selectors, key, &mut recorded).await? {
                Scan::Done(outcome) => {
                    info!(key, recorded, ?outcome, "Finished key");
                    return Ok(KeyReport { outcome, recorded });
                }
                Scan::BrowserLost { generation } => {
                    if restarts >= self.options.max_key_restarts {
                        let msg = format!("browser lost {} times", restarts + 1);
                        warn!(key, "Giving up on key: {}", msg);
                        browser.mark_dead();
                        return Ok(KeyReport {
                            outcome: KeyOutcome::Failed(msg),
                            recorded,
                        });
                    }
                    restarts += 1;
                    if browser.state() == HandleState::Alive && browser.generation() > generation {
                        warn!(key, restarts, "Browser was relaunched mid-key; restarting key");
                    } else {
                        warn!(key, restarts, "Browser lost mid-key; recovering and restarting key");
                        browser.recover().await?;
                    }
                }
            }
        }
    }

    async fn scan(
        &self,
        browser: &mut BrowserSession,
        session: &SessionController,
        selectors: &PageSelectors,
        key: &str,
        recorded: &mut usize,
    ) -> Result<Scan, ScrapeError> {
        if let Some(outcome) = self.interrupted(session) {
            return Ok(Scan::Done(outcome));
        }

        let url = self.site.search_url(key);
        if !browser.navigate(&url, true).await {
            if browser.state() == HandleState::Dead {
                return Ok(Scan::BrowserLost {
                    generation: browser.generation(),
                });
            }
            return key_failure(ScrapeError::Navigation(format!(
                "could not load search results for '{}'",
                key
            )));
        }
        let generation = browser.generation();

        let mut attempted: HashSet<String> = HashSet::new();
        let mut clicks = 0;
        loop {
            if let Some(outcome) = self.interrupted(session) {
                return Ok(Scan::Done(outcome));
            }

            let page = match base_page(browser, generation).await? {
                Some(page) => page,
                None => return Ok(Scan::BrowserLost { generation }),
            };
            if let Err(e) = ScrollPlan::random()
                .run(page.as_ref(), browser.delays(), browser.fast_mode())
                .await
            {
                debug!("Scrolling results failed: {}", e);
            }
            browser.pause(DelayCategory::Interaction).await;

            let html = match page.content().await {
                Ok(html) => html,
                Err(e) => {
                    if !browser.is_alive().await {
                        browser.mark_dead();
                        return Ok(Scan::BrowserLost { generation });
                    }
                    return key_failure(ScrapeError::Navigation(format!(
                        "could not read search results: {}",
                        e
                    )));
                }
            };

            let fresh: Vec<Candidate> = parse_candidates(&html, &url, &self.listing)
                .into_iter()
                .filter(|c| !session.is_scraped(&c.identifier) && !attempted.contains(&c.identifier))
                .collect();
            if fresh.is_empty() {
                debug!(key, "No new profiles on this pass");
                return Ok(Scan::Done(KeyOutcome::Exhausted));
            }

            for candidate in fresh {
                if let Some(outcome) = self.interrupted(session) {
                    return Ok(Scan::Done(outcome));
                }
                attempted.insert(candidate.identifier.clone());
                match self
                    .process_candidate(browser, session, selectors, key, candidate, generation)
                    .await?
                {
                    CandidateOutcome::Recorded => *recorded += 1,
                    CandidateOutcome::Duplicate | CandidateOutcome::Skipped => {}
                    CandidateOutcome::BrowserLost => return Ok(Scan::BrowserLost { generation }),
                }
            }

            if clicks < self.options.max_load_more_clicks {
                match page.click(&self.listing.load_more).await {
                    Ok(true) => {
                        clicks += 1;
                        debug!(key, clicks, "Clicked load more");
                        browser.pause(DelayCategory::Click).await;
                    }
                    Ok(false) => {}
                    Err(e) => debug!("Load more click failed: {}", e),
                }
            }
        }
    }

    async fn process_candidate(
        &self,
        browser: &mut BrowserSession,
        session: &SessionController,
        selectors: &PageSelectors,
        key: &str,
        candidate: Candidate,
        generation: u64,
    ) -> Result<CandidateOutcome, ScrapeError> {
        if session.is_scraped(&candidate.identifier) {
            return Ok(CandidateOutcome::Duplicate);
        }

        let handle = match browser.get().await {
            Ok(handle) if browser.generation() == generation => handle,
            Ok(_) | Err(DriverError::Lost(_)) => return Ok(CandidateOutcome::BrowserLost),
            Err(e) => return Err(e.into()),
        };

        let page = match handle.open_page(&candidate.profile_url).await {
            Ok(page) => page,
            Err(e) => {
                if !browser.is_alive().await {
                    browser.mark_dead();
                    return Ok(CandidateOutcome::BrowserLost);
                }
                warn!("Could not open {}: {}", candidate.profile_url, e);
                return Ok(CandidateOutcome::Skipped);
            }
        };
        let tab = DetailTab::new(page, candidate.profile_url.clone());
        browser.pause(DelayCategory::Interaction).await;

        let result = match tab.page() {
            Some(page) => self.extract_with_timeout(page, selectors).await,
            None => Err(ScrapeError::Extraction("detail tab already closed".into())),
        };

        tab.close().await;
        if let Ok(base) = handle.base_page().await {
            if let Err(e) = base.activate().await {
                debug!("Could not re-activate base tab: {}", e);
            }
        }

        let details = match result {
            Ok(details) => details,
            Err(e) => {
                if !browser.is_alive().await {
                    browser.mark_dead();
                    return Ok(CandidateOutcome::BrowserLost);
                }
                // One profile page is one item: anything short of a job abort
                // still records the candidate.
                if e.kind().policy() == FailurePolicy::AbortJob {
                    return Err(e);
                }
                warn!(
                    "Extraction failed for {}: {}; recording placeholders",
                    candidate.profile_url, e
                );
                ProfileDetails::placeholder()
            }
        };

        let record = Record::new(
            candidate.identifier.clone(),
            candidate.name.clone(),
            candidate.headline,
            candidate.thumbnail,
            details,
            key,
        );
        session.add_scraped(&candidate.identifier);
        session.add_result(record);
        session.mark_success(&candidate.name, 1);
        info!(key, "Recorded {} ({})", candidate.name, candidate.identifier);
        Ok(CandidateOutcome::Recorded)
    }

    async fn extract_with_timeout(
        &self,
        page: &dyn PageContext,
        selectors: &PageSelectors,
    ) -> Result<ProfileDetails, ScrapeError> {
        match tokio::time::timeout(
            self.options.extraction_timeout,
            self.extractor.extract(page, selectors),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::Extraction(format!(
                "timed out after {:?}",
                self.options.extraction_timeout
            ))),
        }
    }
}

/// Outcome for a key-level error, per the failure policy table.
fn key_failure(err: ScrapeError) -> Result<Scan, ScrapeError> {
    match err.kind().policy() {
        FailurePolicy::AbortJob => Err(err),
        FailurePolicy::AbortKey | FailurePolicy::Skip => {
            Ok(Scan::Done(KeyOutcome::Failed(err.to_string())))
        }
    }
}

/// Base tab of the browser that loaded the current key, or `None` if that
/// browser is gone.
async fn base_page(
    browser: &mut BrowserSession,
    generation: u64,
) -> Result<Option<Arc<dyn PageContext>>, ScrapeError> {
    match browser.base_page().await {
        Ok(page) if browser.generation() == generation => Ok(Some(page)),
        Ok(_) | Err(DriverError::Lost(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
