//! Selector detection from a sample profile page.

use async_trait::async_trait;
use scraper::{ElementRef, Html};
use tracing::{debug, info, warn};

use super::listing::{parse_candidates, ListingSelectors, ScrollPlan};
use super::{Locator, PageSelectors};
use crate::browser::{BrowserSession, DetailTab};
use crate::config::{default_location_class, default_section_class, SiteConfig};
use crate::delay::DelayCategory;
use crate::error::ScrapeError;

/// Class fragments seen on the location line, most specific first.
const LOCATION_PATTERNS: &[&str] = &[
    "text-body-small inline t-black--light break-words",
    "pv-text-details__left-panel",
    "text-body-small",
    "text-color-text-low-emphasis",
];

const LOCATION_KEYWORDS: &[&str] = &["area", "region", "city", "province", "indonesia", "jakarta"];

const SECTION_KEYWORDS: &[&str] = &["list", "item", "pvs"];

/// Number of input keys tried when looking for a sample profile.
const SAMPLE_KEYS: usize = 3;

/// Uses caller-supplied selectors as-is.
#[derive(Debug, Clone)]
pub struct FixedLocator(pub PageSelectors);

#[async_trait]
impl Locator for FixedLocator {
    async fn resolve_selectors(
        &self,
        _browser: &mut BrowserSession,
    ) -> Result<PageSelectors, ScrapeError> {
        Ok(self.0.clone())
    }
}

/// Opens one real profile and guesses the location and section classes.
#[derive(Debug, Clone)]
pub struct HeuristicLocator {
    site: SiteConfig,
    listing: ListingSelectors,
    sample_keys: Vec<String>,
}

impl HeuristicLocator {
    pub fn new(site: SiteConfig, listing: ListingSelectors) -> Self {
        Self {
            site,
            listing,
            sample_keys: Vec::new(),
        }
    }

    /// Search these keys for a sample before falling back to the people page.
    pub fn with_sample_keys(mut self, keys: &[String]) -> Self {
        self.sample_keys = keys.iter().take(SAMPLE_KEYS).cloned().collect();
        self
    }

    async fn first_candidate_on(&self, browser: &mut BrowserSession, url: &str) -> Option<String> {
        if !browser.navigate(url, true).await {
            return None;
        }
        let page = browser.base_page().await.ok()?;
        if let Err(e) = ScrollPlan::down(2, 800)
            .run(page.as_ref(), browser.delays(), browser.fast_mode())
            .await
        {
            debug!("Scrolling {} failed: {}", url, e);
        }
        let html = page.content().await.ok()?;
        parse_candidates(&html, url, &self.listing)
            .into_iter()
            .next()
            .map(|c| c.profile_url)
    }

    async fn find_sample_profile(&self, browser: &mut BrowserSession) -> Option<String> {
        for key in &self.sample_keys {
            if let Some(url) = self.first_candidate_on(browser, &self.site.search_url(key)).await {
                info!("Found sample profile via '{}': {}", key, url);
                return Some(url);
            }
        }
        let people = self.site.people_url();
        let url = self.first_candidate_on(browser, &people).await?;
        info!("Found sample profile on alumni page: {}", url);
        Some(url)
    }
}

#[async_trait]
impl Locator for HeuristicLocator {
    async fn resolve_selectors(
        &self,
        browser: &mut BrowserSession,
    ) -> Result<PageSelectors, ScrapeError> {
        let sample = self
            .find_sample_profile(browser)
            .await
            .ok_or_else(|| ScrapeError::Locator("no sample profile found".into()))?;

        let handle = browser.get().await?;
        let page = handle
            .open_page(&sample)
            .await
            .map_err(|e| ScrapeError::Locator(format!("could not open {}: {}", sample, e)))?;
        let tab = DetailTab::new(page, sample.clone());
        browser.pause(DelayCategory::PageLoad).await;

        let html = match tab.page() {
            Some(page) => {
                if let Err(e) = ScrollPlan::down(3, 900)
                    .run(page, browser.delays(), browser.fast_mode())
                    .await
                {
                    debug!("Scrolling sample profile failed: {}", e);
                }
                page.content().await
            }
            None => Err(anyhow::anyhow!("detail tab already closed")),
        };
        tab.close().await;
        if let Ok(base) = browser.base_page().await {
            let _ = base.activate().await;
        }

        let html = html.map_err(|e| ScrapeError::Locator(format!("could not read {}: {}", sample, e)))?;
        let selectors = detect_selectors(&html);
        info!(
            location = %selectors.location_class,
            section = %selectors.section_class,
            "Resolved profile selectors"
        );
        Ok(selectors)
    }
}

/// Detect both classes, substituting the fallback for whichever is missing.
pub fn detect_selectors(html: &str) -> PageSelectors {
    let document = Html::parse_document(html);
    let location = detect_location_class(&document).unwrap_or_else(|| {
        warn!("Location class not detected, using fallback");
        default_location_class()
    });
    let section = detect_section_class(&document).unwrap_or_else(|| {
        warn!("Section class not detected, using fallback");
        default_section_class()
    });
    PageSelectors::new(location, section)
}

fn elements<'a>(root: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    root.descendants().skip(1).filter_map(ElementRef::wrap)
}

fn class_string(element: &ElementRef<'_>) -> Option<String> {
    let class = element.value().attr("class")?;
    let joined = class.split_whitespace().collect::<Vec<_>>().join(" ");
    (!joined.is_empty()).then_some(joined)
}

fn detect_location_class(document: &Html) -> Option<String> {
    let root = document.root_element();
    for pattern in LOCATION_PATTERNS {
        for div in elements(root).filter(|e| e.value().name() == "div") {
            let Some(class) = class_string(&div) else {
                continue;
            };
            if !class.contains(pattern) {
                continue;
            }
            let text = div.text().collect::<String>().to_lowercase();
            if LOCATION_KEYWORDS.iter().any(|k| text.contains(k)) {
                debug!("Detected location class: {}", class);
                return Some(class);
            }
        }
    }
    None
}

fn detect_section_class(document: &Html) -> Option<String> {
    let root = document.root_element();
    for anchor in ["experience", "education"] {
        let Some(section) = elements(root)
            .filter(|e| e.value().name() == "section")
            .find(|s| elements(*s).any(|e| e.value().id() == Some(anchor)))
        else {
            continue;
        };
        for item in elements(section).filter(|e| e.value().name() == "li") {
            let Some(class) = class_string(&item) else {
                continue;
            };
            let lower = class.to_lowercase();
            if SECTION_KEYWORDS.iter().any(|k| lower.contains(k)) {
                debug!("Detected section class: {}", class);
                return Some(class);
            }
        }
    }
    None
}
