//! chromiumoxide implementation of the browser traits.
//!
//! Launches a local Chrome (or attaches to a remote DevTools endpoint)
//! with the stealth flags, a user-agent override on every tab, and the
//! evasion scripts re-applied after each navigation.

use std::sync::Arc;

use async_trait::async_trait;

#[cfg(feature = "browser")]
use super::PageContext;
use super::{BrowserEngineConfig, BrowserHandle, BrowserLauncher};
use crate::error::DriverError;

#[cfg(feature = "browser")]
pub use engine::ChromiumLauncher;

#[cfg(feature = "browser")]
mod engine {
    use super::*;

    use std::path::PathBuf;

    use anyhow::{anyhow, Context, Result};
    use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
    use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
    use chromiumoxide::{Browser, BrowserConfig, Page};
    use futures::StreamExt;
    use tokio::sync::Mutex;
    use tokio::task::JoinHandle;
    use tracing::{debug, info};

    use crate::browser::stealth::{launch_args, STEALTH_SCRIPTS};

    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &[&str] = &[
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        // Common install locations
        "/opt/google/chrome/google-chrome",
    ];

    /// Launches stealth-configured Chrome sessions.
    pub struct ChromiumLauncher {
        config: BrowserEngineConfig,
    }

    impl ChromiumLauncher {
        pub fn new(config: BrowserEngineConfig) -> Self {
            Self { config }
        }

        /// Find a Chrome executable on well-known paths or `PATH`.
        fn find_chrome() -> Result<PathBuf> {
            for path in CHROME_PATHS {
                let p = std::path::Path::new(path);
                if p.exists() {
                    info!("Found Chrome at: {}", path);
                    return Ok(p.to_path_buf());
                }
            }

            for cmd in &[
                "google-chrome",
                "google-chrome-stable",
                "chromium",
                "chromium-browser",
            ] {
                if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                    if output.status.success() {
                        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                        if !path.is_empty() {
                            info!("Found Chrome in PATH: {}", path);
                            return Ok(PathBuf::from(path));
                        }
                    }
                }
            }

            Err(anyhow!(
                "Chrome/Chromium not found. Please install it:\n\
                 - Arch/Manjaro: sudo pacman -S chromium\n\
                 - Ubuntu/Debian: sudo apt install chromium-browser\n\
                 - Fedora: sudo dnf install chromium\n\
                 - Or download from: https://www.google.com/chrome/"
            ))
        }

        async fn launch_local(&self) -> Result<(Browser, JoinHandle<()>)> {
            info!("Launching browser (headless={})", self.config.headless);
            let chrome_path = Self::find_chrome()?;

            let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);

            // with_head means NOT headless
            if !self.config.headless {
                builder = builder.with_head();
            }

            if let Some(ref proxy) = self.config.proxy {
                builder = builder.arg(format!("--proxy-server={}", proxy));
            }

            for arg in launch_args() {
                builder = builder.arg(arg);
            }
            builder = builder.arg(format!("--user-agent={}", self.config.user_agent));
            for arg in &self.config.chrome_args {
                builder = builder.arg(arg);
            }

            let config = builder
                .build()
                .map_err(|e| anyhow!("Failed to build browser config: {}", e))?;

            let (browser, handler) = Browser::launch(config)
                .await
                .context("Failed to launch browser")?;
            Ok((browser, spawn_handler(handler)))
        }

        /// Attach to a running Chrome through its DevTools endpoint.
        async fn connect_remote(&self, url: &str) -> Result<(Browser, JoinHandle<()>)> {
            info!("Connecting to remote browser at {}", url);

            let http_url = url
                .replace("ws://", "http://")
                .replace("wss://", "https://");
            let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

            let client = reqwest::Client::new();
            let resp: serde_json::Value = client
                .get(&version_url)
                .send()
                .await
                .context("Failed to connect to remote browser")?
                .json()
                .await
                .context("Failed to parse browser version info")?;

            let ws_url = resp
                .get("webSocketDebuggerUrl")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow!("No webSocketDebuggerUrl in response"))?;

            info!("Connecting to WebSocket: {}", ws_url);
            let (browser, handler) = Browser::connect(ws_url)
                .await
                .context("Failed to connect to remote browser")?;
            Ok((browser, spawn_handler(handler)))
        }

        async fn open(&self) -> Result<ChromiumHandle> {
            let remote = self.config.remote_url.clone();
            let (browser, handler) = match remote.as_deref() {
                Some(url) => self.connect_remote(url).await?,
                None => self.launch_local().await?,
            };

            let page = browser
                .new_page("about:blank")
                .await
                .context("Failed to open base tab")?;
            let base = Arc::new(ChromiumPage::prepare(page, &self.config).await?);

            Ok(ChromiumHandle {
                browser: Mutex::new(browser),
                handler,
                base,
                config: self.config.clone(),
                remote: remote.is_some(),
            })
        }
    }

    #[async_trait]
    impl BrowserLauncher for ChromiumLauncher {
        async fn launch(&self) -> std::result::Result<Arc<dyn BrowserHandle>, DriverError> {
            match self.open().await {
                Ok(handle) => Ok(Arc::new(handle)),
                Err(e) => Err(DriverError::Launch(format!("{:#}", e))),
            }
        }
    }

    fn spawn_handler(mut handler: chromiumoxide::Handler) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
            debug!("Browser event handler finished");
        })
    }

    /// One CDP target.
    pub struct ChromiumPage {
        page: Page,
        stealth: bool,
    }

    impl ChromiumPage {
        async fn prepare(page: Page, config: &BrowserEngineConfig) -> Result<Self> {
            page.execute(SetUserAgentOverrideParams::new(config.user_agent.clone()))
                .await
                .context("Failed to override user agent")?;
            Ok(Self {
                page,
                stealth: config.stealth,
            })
        }

        async fn apply_stealth(&self) {
            if !self.stealth {
                return;
            }
            for script in STEALTH_SCRIPTS {
                // Fails on non-HTML pages and mid-transition; evasion is best effort
                if let Err(e) = self.page.evaluate(script.to_string()).await {
                    debug!("Stealth script injection skipped: {}", e);
                }
            }
        }

        async fn eval_bool(&self, script: String) -> Result<bool> {
            let result = self.page.evaluate(script).await?;
            Ok(result
                .value()
                .and_then(|v| v.as_bool())
                .unwrap_or(false))
        }
    }

    #[async_trait]
    impl PageContext for ChromiumPage {
        async fn goto(&self, url: &str) -> Result<()> {
            debug!("Navigating to {}", url);
            self.page
                .goto(url)
                .await
                .with_context(|| format!("Failed to navigate to {}", url))?;
            self.apply_stealth().await;
            Ok(())
        }

        async fn current_url(&self) -> Result<String> {
            Ok(self.page.url().await?.unwrap_or_default())
        }

        async fn content(&self) -> Result<String> {
            Ok(self.page.content().await?)
        }

        async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
            let result = self.page.evaluate(script.to_string()).await?;
            Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
        }

        async fn scroll_by(&self, dy: i64) -> Result<()> {
            self.page
                .evaluate(format!("window.scrollBy(0, {})", dy))
                .await?;
            Ok(())
        }

        async fn click(&self, selector: &str) -> Result<bool> {
            let selector = serde_json::to_string(selector)?;
            self.eval_bool(format!(
                r#"(() => {{
                    const el = document.querySelector({selector});
                    if (!el || el.offsetParent === null || el.disabled) return false;
                    el.scrollIntoView({{block: 'center'}});
                    el.click();
                    return true;
                }})()"#
            ))
            .await
        }

        async fn focus(&self, selector: &str) -> Result<bool> {
            let selector = serde_json::to_string(selector)?;
            self.eval_bool(format!(
                r#"(() => {{
                    const el = document.querySelector({selector});
                    if (!el) return false;
                    el.focus();
                    if ('value' in el) el.value = '';
                    return true;
                }})()"#
            ))
            .await
        }

        async fn insert_text(&self, text: &str) -> Result<()> {
            self.page.execute(InsertTextParams::new(text)).await?;
            Ok(())
        }

        async fn activate(&self) -> Result<()> {
            self.page.bring_to_front().await?;
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.page.clone().close().await?;
            Ok(())
        }
    }

    /// Live Chrome connection plus its long-lived base tab.
    pub struct ChromiumHandle {
        browser: Mutex<Browser>,
        handler: JoinHandle<()>,
        base: Arc<ChromiumPage>,
        config: BrowserEngineConfig,
        remote: bool,
    }

    #[async_trait]
    impl BrowserHandle for ChromiumHandle {
        async fn window_count(&self) -> Result<usize> {
            if self.handler.is_finished() {
                return Err(anyhow!("browser connection closed"));
            }
            let browser = self.browser.lock().await;
            Ok(browser.pages().await?.len())
        }

        async fn base_page(&self) -> Result<Arc<dyn PageContext>> {
            Ok(self.base.clone())
        }

        async fn open_page(&self, url: &str) -> Result<Box<dyn PageContext>> {
            let page = {
                let browser = self.browser.lock().await;
                browser.new_page("about:blank").await?
            };
            let page = ChromiumPage::prepare(page, &self.config).await?;
            if let Err(e) = page.goto(url).await {
                let _ = page.close().await;
                return Err(e);
            }
            Ok(Box::new(page))
        }

        async fn close_auxiliary(&self) -> Result<usize> {
            let pages = self.browser.lock().await.pages().await?;
            let base_id = self.base.page.target_id().clone();
            let mut closed = 0;
            for page in pages {
                if page.target_id() == &base_id {
                    continue;
                }
                match page.close().await {
                    Ok(()) => closed += 1,
                    Err(e) => debug!("Failed to close auxiliary tab: {}", e),
                }
            }
            Ok(closed)
        }

        async fn quit(&self) -> Result<()> {
            let result = if self.remote {
                // Leave someone else's browser running
                Ok(())
            } else {
                let mut browser = self.browser.lock().await;
                match browser.close().await {
                    Ok(_) => {
                        let _ = browser.wait().await;
                        Ok(())
                    }
                    Err(e) => Err(anyhow!("Failed to close browser: {}", e)),
                }
            };
            self.handler.abort();
            result
        }
    }
}

/// Stub for when the browser feature is disabled.
#[cfg(not(feature = "browser"))]
pub struct ChromiumLauncher {
    #[allow(dead_code)]
    config: BrowserEngineConfig,
}

#[cfg(not(feature = "browser"))]
impl ChromiumLauncher {
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self { config }
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserHandle>, DriverError> {
        Err(DriverError::Unsupported)
    }
}
