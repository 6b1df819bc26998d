//! Checkpoint inspection commands.

use console::style;

use crate::checkpoint::{resume_point, CheckpointStore, CsvCheckpointStore, ProgressNote};
use crate::config::Settings;
use crate::input::{CsvInputSource, InputSource};

/// Show checkpoint size and the resume point.
pub async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    let output = settings.output_path();
    let store = CsvCheckpointStore::new(&output);
    let records = store.load()?;
    let last_key = store.read_last_identifier()?;

    println!("\n{}", style("Harvest Status").bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Output File:", output.display());
    println!("{:<20} {}", "Profiles:", records.len());
    if settings.job.target > 0 {
        println!("{:<20} {}", "Target:", settings.job.target);
    }

    let placeholders = records.iter().filter(|r| r.has_placeholders()).count();
    if placeholders > 0 {
        println!(
            "{:<20} {}",
            "  With errors:",
            style(placeholders).yellow()
        );
    }

    match &last_key {
        Some(key) => println!("{:<20} {}", "Last Key:", key),
        None => println!("{:<20} {}", "Last Key:", style("none").dim()),
    }

    let input = CsvInputSource::new(settings.input_path());
    match input.load_keys() {
        Ok(keys) => {
            let start = resume_point(&keys, last_key.as_deref());
            let next = match keys.get(start) {
                Some(key) => format!("{} ({} of {})", key, start + 1, keys.len()),
                None if keys.is_empty() => style("input is empty").yellow().to_string(),
                None => style("all names processed").green().to_string(),
            };
            println!("{:<20} {}", "Next Key:", next);
        }
        Err(e) => println!("{:<20} {}", "Next Key:", style(e).red()),
    }

    let note = ProgressNote::for_checkpoint(&output);
    if note.path().exists() {
        println!("{:<20} {}", "Progress Note:", note.path().display());
    }

    Ok(())
}

/// Print the last `limit` checkpointed records as JSON.
pub async fn cmd_results(settings: &Settings, limit: usize) -> anyhow::Result<()> {
    let store = CsvCheckpointStore::new(settings.output_path());
    let records = store.load()?;
    let start = records.len().saturating_sub(limit);
    println!("{}", serde_json::to_string_pretty(&records[start..])?);
    Ok(())
}
