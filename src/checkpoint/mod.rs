//! Durable result sink and resume-point computation.
//!
//! The checkpoint CSV is the source of truth for resuming: its last row's
//! search key says how far a previous run got. The companion progress note
//! is informational only.

mod csv_store;
mod note;

pub use csv_store::{CheckpointRow, CsvCheckpointStore, CHECKPOINT_COLUMNS};
pub use note::ProgressNote;

use tracing::warn;

use crate::error::CheckpointError;
use crate::models::Record;

/// Outcome of merging a batch into the checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendSummary {
    pub inserted: usize,
    pub replaced: usize,
}

/// Append/merge sink keyed by record identifier.
pub trait CheckpointStore: Send + Sync {
    /// Merge records by identifier. Existing rows are replaced in place,
    /// new ones appended in order.
    fn append(&self, records: &[Record]) -> Result<AppendSummary, CheckpointError>;

    /// Search key recorded on the last row, if any.
    fn read_last_identifier(&self) -> Result<Option<String>, CheckpointError>;

    /// All stored records, in file order.
    fn load(&self) -> Result<Vec<Record>, CheckpointError>;

    /// Identifiers of all stored records.
    fn identifiers(&self) -> Result<Vec<String>, CheckpointError> {
        Ok(self.load()?.into_iter().map(|r| r.identifier).collect())
    }
}

/// Index of the first key still to process.
///
/// Returns `position(last) + 1`, or 0 when the checkpoint is empty or its
/// last key is no longer in `keys`. With duplicate keys the first match
/// wins, which may repeat work but never skips it. Matching the last
/// occurrence instead would skip every key between the two.
pub fn resume_point<S: AsRef<str>>(keys: &[S], last: Option<&str>) -> usize {
    let Some(last) = last else {
        return 0;
    };
    let mut matches = keys
        .iter()
        .enumerate()
        .filter(|(_, k)| k.as_ref() == last)
        .map(|(i, _)| i);
    match matches.next() {
        Some(first) => {
            if matches.next().is_some() {
                warn!(
                    "Key '{}' appears more than once in the input; resuming after its first occurrence",
                    last
                );
            }
            first + 1
        }
        None => 0,
    }
}
