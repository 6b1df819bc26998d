//! Human-readable progress note written next to the checkpoint.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::debug;

/// `<stem>_progress.txt` beside the checkpoint file. Never read back for
/// resuming.
#[derive(Debug, Clone)]
pub struct ProgressNote {
    path: PathBuf,
    output: PathBuf,
}

impl ProgressNote {
    pub fn for_checkpoint(output: &Path) -> Self {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scraping".to_string());
        let path = output.with_file_name(format!("{}_progress.txt", stem));
        Self {
            path,
            output: output.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the last processed key. Failures are logged and ignored.
    pub fn write(&self, key: &str) {
        let body = format!(
            "Last scraped: {}\nOutput file: {}\nTimestamp: {}\n",
            key,
            self.output.display(),
            Local::now().to_rfc3339()
        );
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        if let Err(e) = std::fs::write(&self.path, body) {
            debug!("Could not write progress note {}: {}", self.path.display(), e);
        }
    }
}
