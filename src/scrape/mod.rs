//! Scraping capabilities: authentication, selector detection, listing
//! parsing, profile extraction and the per-key extraction loop.
//!
//! The loop only depends on the [`Extractor`], [`Locator`] and
//! [`Authenticator`] traits, so each capability can be replaced without
//! touching the orchestration.

mod auth;
mod extraction_loop;
mod extractor;
mod listing;
mod locator;

pub use auth::PasswordAuthenticator;
pub use extraction_loop::{ExtractionLoop, KeyOutcome, KeyReport, LoopOptions};
pub use extractor::HtmlProfileExtractor;
pub use listing::{parse_candidates, Candidate, ListingSelectors, ScrollPlan};
pub use locator::{FixedLocator, HeuristicLocator};

use async_trait::async_trait;

use crate::browser::{BrowserSession, PageContext};
use crate::config::{default_location_class, default_section_class};
use crate::error::ScrapeError;
use crate::models::ProfileDetails;

/// Class names used to find fields on a profile page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelectors {
    /// Class string of the element holding the profile location.
    pub location_class: String,
    /// Class string of one entry in the experience/education/certification lists.
    pub section_class: String,
}

impl PageSelectors {
    pub fn new(location_class: impl Into<String>, section_class: impl Into<String>) -> Self {
        Self {
            location_class: location_class.into(),
            section_class: section_class.into(),
        }
    }

    /// Classes used when detection fails.
    pub fn fallback() -> Self {
        Self::new(default_location_class(), default_section_class())
    }
}

impl Default for PageSelectors {
    fn default() -> Self {
        Self::fallback()
    }
}

/// Turns a rendered profile page into structured fields.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        page: &dyn PageContext,
        selectors: &PageSelectors,
    ) -> Result<ProfileDetails, ScrapeError>;
}

/// Resolves the profile page selectors for the current site layout.
#[async_trait]
pub trait Locator: Send + Sync {
    async fn resolve_selectors(
        &self,
        browser: &mut BrowserSession,
    ) -> Result<PageSelectors, ScrapeError>;
}

/// Makes sure the browser holds an authenticated session.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn ensure_authenticated(&self, browser: &mut BrowserSession) -> Result<(), ScrapeError>;
}
