//! Shared helper functions for CLI commands.

use std::sync::Arc;

use crate::browser::{BrowserSession, ChromiumLauncher};
use crate::config::Settings;
use crate::delay::DelayPolicy;

/// Browser session wired to the configured Chrome.
pub fn browser_session(settings: &Settings) -> BrowserSession {
    let launcher = ChromiumLauncher::new(settings.browser.clone());
    let mut session = BrowserSession::new(Arc::new(launcher), DelayPolicy::new(&settings.delays))
        .with_engine_config(&settings.browser);
    session.set_fast_mode(settings.job.fast_mode);
    session
}

/// Truncate to `max` characters, marking the cut with "...".
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
