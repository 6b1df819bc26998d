//! Scraped profile records.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use url::Url;

/// Timestamp format used for the `Scraped At` column.
pub const SCRAPED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One job held at a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    #[serde(rename = "Job Title")]
    pub title: String,
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Duration")]
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducationEntry {
    #[serde(rename = "School")]
    pub school: String,
    #[serde(rename = "Degree")]
    pub degree: String,
    #[serde(rename = "Duration", default)]
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationEntry {
    #[serde(rename = "Certification")]
    pub name: String,
    #[serde(rename = "Issued By")]
    pub issuer: String,
}

/// A profile section: either the parsed entries or a marker that the
/// extractor failed for this profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "entries", rename_all = "snake_case")]
pub enum Section<T> {
    Entries(Vec<T>),
    ExtractionError,
}

impl<T> Section<T> {
    pub fn entries(&self) -> &[T] {
        match self {
            Section::Entries(entries) => entries,
            Section::ExtractionError => &[],
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Section::ExtractionError)
    }
}

impl<T> Default for Section<T> {
    fn default() -> Self {
        Section::Entries(Vec::new())
    }
}

/// Structured fields pulled from a profile detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDetails {
    pub location: String,
    pub experience: Section<ExperienceEntry>,
    pub education: Section<EducationEntry>,
    pub certifications: Section<CertificationEntry>,
}

impl ProfileDetails {
    /// Substitute used when the extractor fails for a candidate.
    pub fn placeholder() -> Self {
        Self {
            location: "N/A".to_string(),
            experience: Section::ExtractionError,
            education: Section::ExtractionError,
            certifications: Section::ExtractionError,
        }
    }
}

/// One scraped profile, keyed by its normalized profile URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub identifier: String,
    pub name: String,
    pub headline: String,
    pub thumbnail: String,
    pub location: String,
    pub experience: Section<ExperienceEntry>,
    pub education: Section<EducationEntry>,
    pub certifications: Section<CertificationEntry>,
    /// Input key whose search produced this profile.
    pub search_key: String,
    pub scraped_at: NaiveDateTime,
}

impl Record {
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        headline: impl Into<String>,
        thumbnail: impl Into<String>,
        details: ProfileDetails,
        search_key: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            headline: headline.into(),
            thumbnail: thumbnail.into(),
            location: details.location,
            experience: details.experience,
            education: details.education,
            certifications: details.certifications,
            search_key: search_key.into(),
            scraped_at: Local::now().naive_local(),
        }
    }

    /// True when any section fell back to a placeholder.
    pub fn has_placeholders(&self) -> bool {
        self.experience.is_error() || self.education.is_error() || self.certifications.is_error()
    }
}

/// Strip query and fragment so the same profile reached from different
/// search pages maps to a single identifier.
pub fn normalize_profile_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            let mut s = url.to_string();
            while s.ends_with('/') && url.path() != "/" {
                s.pop();
            }
            s
        }
        Err(_) => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_tracking() {
        assert_eq!(
            normalize_profile_url(
                "https://www.linkedin.com/in/jane-doe-123/?miniProfileUrn=urn%3Ali%3Afs#top"
            ),
            "https://www.linkedin.com/in/jane-doe-123"
        );
        assert_eq!(
            normalize_profile_url("  https://www.linkedin.com/in/jane-doe-123 "),
            "https://www.linkedin.com/in/jane-doe-123"
        );
    }

    #[test]
    fn normalize_leaves_non_urls() {
        assert_eq!(normalize_profile_url("not a url"), "not a url");
    }

    #[test]
    fn placeholder_marks_every_section() {
        let details = ProfileDetails::placeholder();
        let record = Record::new("id", "Jane", "Engineer", "N/A", details, "Jane");
        assert!(record.has_placeholders());
        assert_eq!(record.location, "N/A");
        assert!(record.experience.entries().is_empty());
    }

    #[test]
    fn section_serializes_tagged() {
        let section: Section<CertificationEntry> = Section::Entries(vec![CertificationEntry {
            name: "AWS SAA".into(),
            issuer: "Amazon".into(),
        }]);
        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json["state"], "entries");
        assert_eq!(json["entries"][0]["Issued By"], "Amazon");
    }
}
