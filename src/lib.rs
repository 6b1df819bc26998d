//! alumni-harvest - resumable alumni profile harvester.
//!
//! Searches a school's people page for each input name through a single
//! automated browser session and checkpoints the scraped profiles to CSV,
//! so an interrupted run picks up where it stopped.

pub mod browser;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod delay;
pub mod error;
pub mod input;
pub mod job;
pub mod models;
pub mod orchestrator;
pub mod scrape;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;
