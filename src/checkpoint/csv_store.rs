//! CSV-backed checkpoint store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{AppendSummary, CheckpointStore};
use crate::error::CheckpointError;
use crate::models::{normalize_profile_url, Record, Section, SCRAPED_AT_FORMAT};

pub const CHECKPOINT_COLUMNS: &[&str] = &[
    "City",
    "Name",
    "Headlines",
    "Linkedin Link",
    "Profile Picture",
    "Experience",
    "Education",
    "Licenses & Certifications",
    "Search Key",
    "Scraped At",
];

const EXPERIENCE_PLACEHOLDER: &str = "Error extracting experience";
const EDUCATION_PLACEHOLDER: &str = "Error extracting education";
const CERTIFICATIONS_PLACEHOLDER: &str = "Error extracting certifications";

/// One row of the checkpoint file, kept as raw cells so rows written by
/// older runs survive a merge untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRow {
    #[serde(rename = "City", default)]
    pub city: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Headlines", default)]
    pub headline: String,
    #[serde(rename = "Linkedin Link")]
    pub link: String,
    #[serde(rename = "Profile Picture", default)]
    pub picture: String,
    #[serde(rename = "Experience", default)]
    pub experience: String,
    #[serde(rename = "Education", default)]
    pub education: String,
    #[serde(rename = "Licenses & Certifications", default)]
    pub certifications: String,
    #[serde(rename = "Search Key", default)]
    pub search_key: String,
    #[serde(rename = "Scraped At", default)]
    pub scraped_at: String,
}

impl CheckpointRow {
    pub fn from_record(record: &Record) -> Self {
        Self {
            city: record.location.clone(),
            name: record.name.clone(),
            headline: record.headline.clone(),
            link: record.identifier.clone(),
            picture: record.thumbnail.clone(),
            experience: section_cell(&record.experience, EXPERIENCE_PLACEHOLDER),
            education: section_cell(&record.education, EDUCATION_PLACEHOLDER),
            certifications: section_cell(&record.certifications, CERTIFICATIONS_PLACEHOLDER),
            search_key: record.search_key.clone(),
            scraped_at: record.scraped_at.format(SCRAPED_AT_FORMAT).to_string(),
        }
    }

    /// Lenient conversion back to a record. Cells that are neither JSON
    /// nor a placeholder become empty sections.
    pub fn to_record(&self) -> Record {
        let scraped_at = NaiveDateTime::parse_from_str(&self.scraped_at, SCRAPED_AT_FORMAT)
            .unwrap_or_default();
        Record {
            identifier: normalize_profile_url(&self.link),
            name: self.name.clone(),
            headline: self.headline.clone(),
            thumbnail: self.picture.clone(),
            location: self.city.clone(),
            experience: parse_section(&self.experience),
            education: parse_section(&self.education),
            certifications: parse_section(&self.certifications),
            search_key: self.search_key.clone(),
            scraped_at,
        }
    }
}

fn section_cell<T: Serialize>(section: &Section<T>, placeholder: &str) -> String {
    match section {
        Section::Entries(entries) => {
            serde_json::to_string(entries).unwrap_or_else(|_| "[]".to_string())
        }
        Section::ExtractionError => placeholder.to_string(),
    }
}

fn parse_section<T: DeserializeOwned>(cell: &str) -> Section<T> {
    let cell = cell.trim();
    if cell.starts_with("Error extracting") {
        return Section::ExtractionError;
    }
    serde_json::from_str::<Vec<T>>(cell)
        .map(Section::Entries)
        .unwrap_or_default()
}

/// Checkpoint stored as a flat CSV file.
#[derive(Debug, Clone)]
pub struct CsvCheckpointStore {
    path: PathBuf,
}

impl CsvCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_rows(&self) -> Result<Vec<CheckpointRow>, CheckpointError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Rewrite the whole file through a temp file in the same directory.
    fn write_rows(&self, rows: &[CheckpointRow]) -> Result<(), CheckpointError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file());
            if rows.is_empty() {
                writer.write_record(CHECKPOINT_COLUMNS)?;
            }
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        tmp.persist(&self.path)?;
        Ok(())
    }
}

impl CheckpointStore for CsvCheckpointStore {
    fn append(&self, records: &[Record]) -> Result<AppendSummary, CheckpointError> {
        let mut summary = AppendSummary::default();
        if records.is_empty() {
            return Ok(summary);
        }

        let mut rows = self.load_rows()?;
        let mut index: HashMap<String, usize> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (normalize_profile_url(&row.link), i))
            .collect();

        for record in records {
            let row = CheckpointRow::from_record(record);
            match index.get(&record.identifier) {
                Some(&pos) => {
                    rows[pos] = row;
                    summary.replaced += 1;
                }
                None => {
                    index.insert(record.identifier.clone(), rows.len());
                    rows.push(row);
                    summary.inserted += 1;
                }
            }
        }

        self.write_rows(&rows)?;
        info!(
            "Saved {} profile(s) to {} ({} new, {} updated)",
            records.len(),
            self.path.display(),
            summary.inserted,
            summary.replaced
        );
        Ok(summary)
    }

    fn read_last_identifier(&self) -> Result<Option<String>, CheckpointError> {
        let rows = self.load_rows()?;
        let Some(last) = rows.last() else {
            return Ok(None);
        };
        if !last.search_key.trim().is_empty() {
            return Ok(Some(last.search_key.trim().to_string()));
        }
        // Files written before the search key column existed.
        debug!("Checkpoint has no search key column; falling back to Name");
        let name = last.name.trim();
        Ok((!name.is_empty()).then(|| name.to_string()))
    }

    fn load(&self) -> Result<Vec<Record>, CheckpointError> {
        Ok(self.load_rows()?.iter().map(CheckpointRow::to_record).collect())
    }

    fn identifiers(&self) -> Result<Vec<String>, CheckpointError> {
        Ok(self
            .load_rows()?
            .iter()
            .map(|row| normalize_profile_url(&row.link))
            .collect())
    }
}
