//! Default profile extractor built on `scraper`.
//!
//! Class matching is on the whole `class` attribute (same tokens, same
//! order), so a configured class string only matches the element it was
//! taken from and not every element sharing one of its tokens.

use async_trait::async_trait;
use scraper::{ElementRef, Html};
use tracing::debug;

use super::listing::ScrollPlan;
use super::{Extractor, PageSelectors};
use crate::browser::PageContext;
use crate::delay::DelayPolicy;
use crate::error::ScrapeError;
use crate::models::{
    CertificationEntry, EducationEntry, ExperienceEntry, ProfileDetails, Section,
};

const NOT_AVAILABLE: &str = "N/A";
const PRIMARY_CLASS: &str = "visually-hidden";
const SECONDARY_CLASS: &str = "t-14 t-normal";
const TERTIARY_CLASS: &str = "t-14 t-normal t-black--light";

/// Parses profile pages after scrolling them to load lazy sections.
#[derive(Debug, Clone)]
pub struct HtmlProfileExtractor {
    delays: DelayPolicy,
    fast_mode: bool,
    scroll_steps: usize,
}

impl HtmlProfileExtractor {
    pub fn new(delays: DelayPolicy, fast_mode: bool) -> Self {
        Self {
            delays,
            fast_mode,
            scroll_steps: 5,
        }
    }

    pub fn with_scroll_steps(mut self, steps: usize) -> Self {
        self.scroll_steps = steps;
        self
    }
}

#[async_trait]
impl Extractor for HtmlProfileExtractor {
    async fn extract(
        &self,
        page: &dyn PageContext,
        selectors: &PageSelectors,
    ) -> Result<ProfileDetails, ScrapeError> {
        if self.scroll_steps > 0 {
            let plan = ScrollPlan::down(self.scroll_steps, 900);
            if let Err(e) = plan.run(page, &self.delays, self.fast_mode).await {
                debug!("Scrolling profile page failed: {}", e);
            }
        }
        let html = page
            .content()
            .await
            .map_err(|e| ScrapeError::Extraction(format!("Could not read profile page: {}", e)))?;
        parse_profile(&html, selectors)
    }
}

/// Parse a rendered profile page.
///
/// A missing section is an empty list. A page with neither a location nor
/// any of the known sections is not a profile and is an error.
pub fn parse_profile(html: &str, selectors: &PageSelectors) -> Result<ProfileDetails, ScrapeError> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let location = extract_location(root, &selectors.location_class);
    let experience = find_section(root, "experience");
    let education = find_section(root, "education");
    let certifications = find_section(root, "licenses_and_certifications");

    if location.is_none() && experience.is_none() && education.is_none() && certifications.is_none() {
        return Err(ScrapeError::Extraction(
            "no profile content found on page".to_string(),
        ));
    }

    let class = selectors.section_class.as_str();
    Ok(ProfileDetails {
        location: location.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        experience: Section::Entries(experience.map(|s| experience_entries(s, class)).unwrap_or_default()),
        education: Section::Entries(education.map(|s| education_entries(s, class)).unwrap_or_default()),
        certifications: Section::Entries(
            certifications
                .map(|s| certification_entries(s, class))
                .unwrap_or_default(),
        ),
    })
}

fn descendants(element: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    element.descendants().skip(1).filter_map(ElementRef::wrap)
}

fn has_class(element: &ElementRef<'_>, class: &str) -> bool {
    element
        .value()
        .attr("class")
        .is_some_and(|c| c.split_whitespace().eq(class.split_whitespace()))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of the first `<span>` carrying `class`. The screen-reader copy nested
/// inside is preferred, since the visible copy is often duplicated.
fn span_text(element: ElementRef<'_>, class: &str) -> Option<String> {
    let span = descendants(element).find(|e| e.value().name() == "span" && has_class(e, class))?;
    let hidden = descendants(span).find(|e| e.value().name() == "span" && has_class(e, PRIMARY_CLASS));
    let text = text_of(hidden.unwrap_or(span));
    (!text.is_empty()).then_some(text)
}

fn extract_location(root: ElementRef<'_>, class: &str) -> Option<String> {
    let div = descendants(root).find(|e| e.value().name() == "div" && has_class(e, class))?;
    let span = descendants(div).find(|e| e.value().name() == "span")?;
    let text = text_of(span);
    (!text.is_empty()).then_some(text)
}

/// The `<section>` that contains `<div id="{anchor}">`.
fn find_section<'a>(root: ElementRef<'a>, anchor: &str) -> Option<ElementRef<'a>> {
    descendants(root)
        .filter(|e| e.value().name() == "section")
        .find(|section| descendants(*section).any(|e| e.value().id() == Some(anchor)))
}

fn items<'a>(section: ElementRef<'a>, class: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    descendants(section).filter(move |e| has_class(e, class))
}

fn or_na(value: Option<String>) -> String {
    value.unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn experience_entries(section: ElementRef<'_>, class: &str) -> Vec<ExperienceEntry> {
    items(section, class)
        .map(|item| ExperienceEntry {
            title: or_na(span_text(item, PRIMARY_CLASS)),
            company: or_na(span_text(item, SECONDARY_CLASS)),
            duration: or_na(span_text(item, TERTIARY_CLASS)),
        })
        .collect()
}

fn education_entries(section: ElementRef<'_>, class: &str) -> Vec<EducationEntry> {
    items(section, class)
        .filter_map(|item| {
            let school = span_text(item, PRIMARY_CLASS);
            let degree = span_text(item, SECONDARY_CLASS);
            if school.is_none() && degree.is_none() {
                return None;
            }
            Some(EducationEntry {
                school: or_na(school),
                degree: or_na(degree),
                duration: or_na(span_text(item, TERTIARY_CLASS)),
            })
        })
        .collect()
}

fn certification_entries(section: ElementRef<'_>, class: &str) -> Vec<CertificationEntry> {
    items(section, class)
        .filter_map(|item| {
            let name = span_text(item, PRIMARY_CLASS);
            let issuer = span_text(item, SECONDARY_CLASS);
            if name.is_none() && issuer.is_none() {
                return None;
            }
            Some(CertificationEntry {
                name: or_na(name),
                issuer: or_na(issuer),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{profile_html, FakeLauncher, FakeSite};

    #[test]
    fn parses_fixture_profile() {
        let details = parse_profile(&profile_html("budi"), &PageSelectors::fallback()).unwrap();
        assert_eq!(details.location, "Jakarta, Indonesia");

        let experience = details.experience.entries();
        assert_eq!(experience.len(), 1);
        assert_eq!(experience[0].title, "Engineer");
        assert_eq!(experience[0].company, "Acme budi");
        assert_eq!(experience[0].duration, "2020 - Present");

        let education = details.education.entries();
        assert_eq!(education.len(), 1);
        assert_eq!(education[0].school, "Test University");
        assert_eq!(education[0].degree, "Bachelor of Computer Science");
        assert_eq!(education[0].duration, "2014 - 2018");

        assert!(details.certifications.entries().is_empty());
        assert!(!details.certifications.is_error());
    }

    #[test]
    fn class_match_is_on_the_whole_attribute() {
        let html = r#"<html><body>
            <div class="text-body-small"><span>Wrong</span></div>
            <div class="text-body-small inline t-black--light break-words"><span>Bandung</span></div>
            <section><div id="licenses_and_certifications"></div>
              <div class="cert-item"><span class="visually-hidden">AWS SAA</span>
                <span class="t-14 t-normal">Amazon Web Services</span></div>
              <div class="cert-item other"><span class="visually-hidden">Ignored</span></div>
            </section>
        </body></html>"#;
        let selectors = PageSelectors::new(
            "text-body-small inline t-black--light break-words",
            "cert-item",
        );
        let details = parse_profile(html, &selectors).unwrap();
        assert_eq!(details.location, "Bandung");
        let certs = details.certifications.entries();
        assert_eq!(certs.len(), 1);
        assert_eq!(certs[0].name, "AWS SAA");
        assert_eq!(certs[0].issuer, "Amazon Web Services");
        assert!(details.experience.entries().is_empty());
    }

    #[test]
    fn missing_fields_become_na() {
        let html = r#"<section><div id="experience"></div>
            <li class="row"><span class="visually-hidden">Founder</span></li></section>"#;
        let details = parse_profile(html, &PageSelectors::new("loc", "row")).unwrap();
        assert_eq!(details.location, "N/A");
        let exp = &details.experience.entries()[0];
        assert_eq!(exp.title, "Founder");
        assert_eq!(exp.company, "N/A");
        assert_eq!(exp.duration, "N/A");
    }

    #[test]
    fn non_profile_page_is_an_error() {
        let err = parse_profile("<html><body><h1>Sign in</h1></body></html>", &PageSelectors::fallback())
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Extraction(_)));
    }

    #[tokio::test]
    async fn extracts_from_live_page() {
        let launcher = FakeLauncher::new(FakeSite::default());
        let handle = crate::browser::BrowserLauncher::launch(launcher.as_ref())
            .await
            .unwrap();
        let page = handle.open_page("https://site.test/in/siti").await.unwrap();

        let extractor = HtmlProfileExtractor::new(DelayPolicy::instant(), true);
        let details = extractor
            .extract(page.as_ref(), &PageSelectors::fallback())
            .await
            .unwrap();
        assert_eq!(details.experience.entries()[0].company, "Acme siti");
    }
}
