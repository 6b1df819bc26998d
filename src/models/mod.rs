//! Data models for alumni-harvest.

mod progress;
mod record;

pub use progress::{Progress, ProgressSnapshot, ProgressStatus};
pub use record::{
    normalize_profile_url, CertificationEntry, EducationEntry, ExperienceEntry, ProfileDetails,
    Record, Section, SCRAPED_AT_FORMAT,
};
