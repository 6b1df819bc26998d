//! Search-key input loading.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ScrapeError;

/// Ordered source of search keys.
pub trait InputSource: Send + Sync {
    fn load_keys(&self) -> Result<Vec<String>, ScrapeError>;
}

#[derive(Debug, Deserialize)]
struct InputRow {
    #[serde(rename = "Name", alias = "name", alias = "Keyword", alias = "keyword")]
    name: String,
}

/// CSV file with a `Name` column.
#[derive(Debug, Clone)]
pub struct CsvInputSource {
    path: PathBuf,
}

impl CsvInputSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InputSource for CsvInputSource {
    fn load_keys(&self) -> Result<Vec<String>, ScrapeError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| {
                ScrapeError::Input(format!("Could not open {}: {}", self.path.display(), e))
            })?;

        let mut keys = Vec::new();
        for (line, row) in reader.deserialize::<InputRow>().enumerate() {
            match row {
                Ok(row) if !row.name.is_empty() => keys.push(row.name),
                Ok(_) => {}
                Err(e) => warn!("Skipping input row {}: {}", line + 2, e),
            }
        }
        info!("Loaded {} search key(s) from {}", keys.len(), self.path.display());
        Ok(keys)
    }
}

/// Fixed in-memory key list.
#[derive(Debug, Clone, Default)]
pub struct StaticInput(pub Vec<String>);

impl InputSource for StaticInput {
    fn load_keys(&self) -> Result<Vec<String>, ScrapeError> {
        Ok(self.0.clone())
    }
}
