//! The `run` command: scrape with a live progress bar.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::checkpoint::CsvCheckpointStore;
use crate::config::Settings;
use crate::job::JobRunner;
use crate::models::ProgressStatus;
use crate::orchestrator::Orchestrator;
use crate::scrape::PageSelectors;

use super::helpers::{browser_session, truncate};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Profiles to record in this run (0 = no limit)
    #[arg(short, long)]
    target: Option<usize>,

    /// CSV file with a Name column
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Checkpoint CSV to write
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Use short delays between actions
    #[arg(long)]
    fast: bool,

    /// Start from the first name even if the output file has rows
    #[arg(long)]
    no_resume: bool,

    /// Class of the location element on profile pages (skips detection)
    #[arg(long)]
    location_class: Option<String>,

    /// Class of section items on profile pages (skips detection)
    #[arg(long)]
    section_class: Option<String>,
}

impl RunArgs {
    /// Fold the flags into `settings` and return the selector override.
    fn apply(self, settings: &mut Settings) -> Option<PageSelectors> {
        let job = &mut settings.job;
        if let Some(target) = self.target {
            job.target = target;
        }
        if let Some(input) = self.input {
            job.input_file = input.to_string_lossy().into_owned();
        }
        if let Some(output) = self.output {
            job.output_file = output.to_string_lossy().into_owned();
        }
        if self.fast {
            job.fast_mode = true;
        }
        if self.no_resume {
            job.resume = false;
        }

        if self.location_class.is_none() && self.section_class.is_none() {
            return None;
        }
        Some(PageSelectors::new(
            self.location_class
                .unwrap_or_else(|| settings.selectors.location_class.clone()),
            self.section_class
                .unwrap_or_else(|| settings.selectors.section_class.clone()),
        ))
    }
}

/// Start a job, render progress until it ends, stop it on Ctrl-C.
pub async fn cmd_run(mut settings: Settings, args: RunArgs) -> anyhow::Result<()> {
    let selector_override = args.apply(&mut settings);
    let input = settings.input_path();
    let output = settings.output_path();

    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    if !settings.credentials.is_complete() {
        println!(
            "{} No credentials configured; relying on an existing browser session",
            style("!").yellow()
        );
    }

    println!(
        "{} Scraping names from {} into {}",
        style("→").cyan(),
        input.display(),
        output.display()
    );

    let store = Arc::new(CsvCheckpointStore::new(&output));
    let mut runner = JobRunner::new(browser_session(&settings), store)
        .with_stop_timeout(Duration::from_secs(settings.job.stop_timeout_secs));
    let session = runner.start(Orchestrator::from_settings(&settings, selector_override))?;

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let snapshot = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                pb.set_message("stopping after the current profile...");
                break runner.stop().await?;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                let snapshot = session.snapshot();
                pb.set_position(snapshot.percentage.round() as u64);
                pb.set_message(format!(
                    "{} | {} scraped, {} failed",
                    truncate(snapshot.current_item.as_deref().unwrap_or("starting"), 30),
                    snapshot.items_scraped,
                    snapshot.failures
                ));
                if !runner.is_running() {
                    break runner.wait().await?;
                }
            }
        }
    };
    pb.finish_and_clear();
    runner.shutdown().await;

    let duration = snapshot
        .duration_seconds()
        .map(|s| format!("{:.1}s", s))
        .unwrap_or_else(|| "-".to_string());
    match snapshot.status {
        ProgressStatus::Completed => println!(
            "{} Completed: {} new profile(s) in {} ({} already there, {} key(s) without results, {})",
            style("✓").green(),
            snapshot.items_scraped,
            output.display(),
            snapshot.existing_items,
            snapshot.failures,
            duration
        ),
        ProgressStatus::Stopped | ProgressStatus::Stopping => println!(
            "{} Stopped: {} profile(s) saved to {}; run again to resume",
            style("!").yellow(),
            snapshot.items_scraped,
            output.display()
        ),
        _ => {
            println!(
                "{} Job failed after {} profile(s): {}",
                style("✗").red(),
                snapshot.items_scraped,
                snapshot.error_message.as_deref().unwrap_or("unknown error")
            );
            anyhow::bail!("scraping job failed");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_location_class;

    #[test]
    fn flags_override_settings() {
        let mut settings = Settings::default();
        let args = RunArgs {
            target: Some(0),
            input: Some(PathBuf::from("/tmp/names.csv")),
            fast: true,
            no_resume: true,
            section_class: Some("pvs-entity".into()),
            ..RunArgs::default()
        };

        let selectors = args.apply(&mut settings).unwrap();
        assert_eq!(settings.job.target, 0);
        assert_eq!(settings.input_path(), PathBuf::from("/tmp/names.csv"));
        assert!(settings.job.fast_mode);
        assert!(!settings.job.resume);
        assert_eq!(selectors.location_class, default_location_class());
        assert_eq!(selectors.section_class, "pvs-entity");
    }

    #[test]
    fn no_selector_flags_means_detection() {
        let mut settings = Settings::default();
        assert!(RunArgs::default().apply(&mut settings).is_none());
        assert_eq!(settings.job.target, 10);
        assert!(settings.job.resume);
    }
}
