//! Browser automation seam.
//!
//! The scraping core talks to the browser only through these traits so the
//! chromiumoxide engine can be swapped for an in-memory fake in tests.

mod chromium;
mod config;
mod session;
pub mod stealth;

pub use chromium::ChromiumLauncher;
pub use config::{BrowserEngineConfig, DEFAULT_USER_AGENT};
pub use session::{BrowserSession, HandleState};

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{trace, warn};

use crate::error::DriverError;

/// One browser tab.
#[async_trait]
pub trait PageContext: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Rendered HTML of the document.
    async fn content(&self) -> Result<String>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Scroll vertically by `dy` pixels (negative scrolls up).
    async fn scroll_by(&self, dy: i64) -> Result<()>;

    /// Click the first element matching `selector` if it is visible.
    /// Returns false when nothing clickable matched.
    async fn click(&self, selector: &str) -> Result<bool>;

    /// Focus and clear an input. Returns false when it does not exist.
    async fn focus(&self, selector: &str) -> Result<bool>;

    /// Insert text at the focused element.
    async fn insert_text(&self, text: &str) -> Result<()>;

    /// Bring this tab to the front.
    async fn activate(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// A live automation connection.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Number of open windows/tabs. Used as the liveness probe, so it must
    /// not navigate, reload or read page state.
    async fn window_count(&self) -> Result<usize>;

    /// The long-lived tab used for listings and login.
    async fn base_page(&self) -> Result<Arc<dyn PageContext>>;

    /// Open `url` in a new isolated tab.
    async fn open_page(&self, url: &str) -> Result<Box<dyn PageContext>>;

    /// Close every tab except the base one. Returns how many were closed.
    async fn close_auxiliary(&self) -> Result<usize>;

    async fn quit(&self) -> Result<()>;
}

/// Creates browser handles.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> std::result::Result<Arc<dyn BrowserHandle>, DriverError>;
}

/// Owns a detail tab and closes it on every exit path.
///
/// `close` is the normal path. If the guard is dropped instead (early
/// return, panic in the extractor), the close is spawned on the runtime.
pub struct DetailTab {
    page: Option<Box<dyn PageContext>>,
    url: String,
}

impl DetailTab {
    pub fn new(page: Box<dyn PageContext>, url: impl Into<String>) -> Self {
        Self {
            page: Some(page),
            url: url.into(),
        }
    }

    /// The wrapped page. `None` only after `close` consumed it.
    pub fn page(&self) -> Option<&dyn PageContext> {
        self.page.as_deref()
    }

    pub async fn close(mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!("Failed to close detail tab for {}: {}", self.url, e);
            }
        }
    }
}

impl Drop for DetailTab {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            let url = std::mem::take(&mut self.url);
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = page.close().await {
                        warn!("Detail tab drop cleanup failed for {}: {}", url, e);
                    } else {
                        trace!("Detail tab drop cleanup succeeded for {}", url);
                    }
                });
            }
        }
    }
}
