//! People-search listing: candidate parsing and human-like scrolling.

use std::collections::HashSet;

use rand::Rng;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, trace};
use url::Url;

use crate::browser::PageContext;
use crate::config::SelectorConfig;
use crate::delay::{DelayCategory, DelayPolicy};
use crate::models::normalize_profile_url;

const NOT_AVAILABLE: &str = "N/A";

/// One listing entry, before its profile page is visited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Normalized profile URL; the dedup key.
    pub identifier: String,
    pub profile_url: String,
    pub name: String,
    pub headline: String,
    pub thumbnail: String,
}

/// CSS selectors for the people listing.
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    pub card: String,
    pub link: String,
    pub subtitle: String,
    pub image: String,
    pub load_more: String,
}

impl From<&SelectorConfig> for ListingSelectors {
    fn from(config: &SelectorConfig) -> Self {
        Self {
            card: config.card.clone(),
            link: config.link.clone(),
            subtitle: config.subtitle.clone(),
            image: config.image.clone(),
            load_more: config.load_more.clone(),
        }
    }
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self::from(&SelectorConfig::default())
    }
}

fn parse_selector(raw: &str) -> Option<Selector> {
    match Selector::parse(raw) {
        Ok(s) => Some(s),
        Err(e) => {
            debug!("Invalid selector {:?}: {}", raw, e);
            None
        }
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn or_na(value: String) -> String {
    if value.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        value
    }
}

/// Extract candidates from a rendered listing page, in page order.
///
/// Cards without a profile link are skipped; a profile shown twice on the
/// same page yields one candidate. Missing text fields become "N/A".
pub fn parse_candidates(html: &str, page_url: &str, selectors: &ListingSelectors) -> Vec<Candidate> {
    let (Some(card_sel), Some(link_sel)) =
        (parse_selector(&selectors.card), parse_selector(&selectors.link))
    else {
        return Vec::new();
    };
    let subtitle_sel = parse_selector(&selectors.subtitle);
    let image_sel = parse_selector(&selectors.image);
    let base = Url::parse(page_url).ok();

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for card in document.select(&card_sel) {
        let Some(link) = card.select(&link_sel).next() else {
            trace!("Card without profile link skipped");
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let full_url = match base.as_ref().map(|b| b.join(href)) {
            Some(Ok(u)) => u.to_string(),
            _ => match Url::parse(href) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            },
        };
        let identifier = normalize_profile_url(&full_url);
        if !seen.insert(identifier.clone()) {
            continue;
        }

        let headline = subtitle_sel
            .as_ref()
            .and_then(|s| card.select(s).next())
            .map(element_text)
            .unwrap_or_default();
        let thumbnail = image_sel
            .as_ref()
            .and_then(|s| card.select(s).next())
            .and_then(|img| img.value().attr("src"))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        candidates.push(Candidate {
            profile_url: identifier.clone(),
            identifier,
            name: or_na(element_text(link)),
            headline: or_na(headline),
            thumbnail: or_na(thumbnail),
        });
    }

    candidates
}

/// A randomized sequence of vertical scroll offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollPlan {
    pub steps: Vec<i64>,
}

impl ScrollPlan {
    /// 10-20 steps of 300-700px, each with a 1 in 5 chance of going up.
    pub fn random() -> Self {
        let mut rng = rand::rng();
        let count = rng.random_range(10..=20);
        let steps = (0..count)
            .map(|_| {
                let dy: i64 = rng.random_range(300..=700);
                if rng.random_bool(0.2) {
                    -dy
                } else {
                    dy
                }
            })
            .collect();
        Self { steps }
    }

    /// Fixed number of equal downward steps.
    pub fn down(steps: usize, dy: i64) -> Self {
        Self {
            steps: vec![dy.abs(); steps],
        }
    }

    /// Run the plan, pausing after every step.
    pub async fn run(
        &self,
        page: &dyn PageContext,
        delays: &DelayPolicy,
        fast_mode: bool,
    ) -> anyhow::Result<()> {
        for dy in &self.steps {
            page.scroll_by(*dy).await?;
            delays.pause(DelayCategory::Scroll, fast_mode).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://www.linkedin.com/school/sample/people/?keywords=Budi";

    fn card(href: &str, name: &str, extra: &str) -> String {
        format!(
            r#"<div class="org-people-profile-card__profile-info">
                 {extra}
                 <div class="artdeco-entity-lockup__title"><a href="{href}">
                   <span>{name}</span>
                 </a></div>
               </div>"#
        )
    }

    #[test]
    fn parses_cards_and_normalizes_links() {
        let html = format!(
            "<html><body>{}{}</body></html>",
            card(
                "/in/budi-santoso?miniProfileUrn=urn",
                "Budi   Santoso",
                r#"<img src="https://media.test/budi.jpg">
                   <div class="artdeco-entity-lockup__subtitle"> Data Engineer at Acme </div>"#
            ),
            card("https://www.linkedin.com/in/siti/", "Siti", "")
        );

        let candidates = parse_candidates(&html, PAGE, &ListingSelectors::default());
        assert_eq!(candidates.len(), 2);

        let budi = &candidates[0];
        assert_eq!(budi.identifier, "https://www.linkedin.com/in/budi-santoso");
        assert_eq!(budi.name, "Budi Santoso");
        assert_eq!(budi.headline, "Data Engineer at Acme");
        assert_eq!(budi.thumbnail, "https://media.test/budi.jpg");

        let siti = &candidates[1];
        assert_eq!(siti.identifier, "https://www.linkedin.com/in/siti");
        assert_eq!(siti.headline, "N/A");
        assert_eq!(siti.thumbnail, "N/A");
    }

    #[test]
    fn skips_cards_without_profile_link_and_duplicates() {
        let html = format!(
            "<html><body>{}{}{}</body></html>",
            card("/company/acme", "Acme", ""),
            card("/in/a", "A", ""),
            card("/in/a?trk=people", "A again", "")
        );
        let candidates = parse_candidates(&html, PAGE, &ListingSelectors::default());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "A");
    }

    #[test]
    fn invalid_selector_yields_nothing() {
        let selectors = ListingSelectors {
            card: "div[".into(),
            ..ListingSelectors::default()
        };
        assert!(parse_candidates("<div></div>", PAGE, &selectors).is_empty());
    }

    #[test]
    fn random_scroll_plan_is_bounded() {
        for _ in 0..20 {
            let plan = ScrollPlan::random();
            assert!((10..=20).contains(&plan.steps.len()));
            assert!(plan
                .steps
                .iter()
                .all(|dy| (300..=700).contains(&dy.abs())));
        }
    }
}
