//! Browser session lifecycle: lazy creation, liveness probing, recovery.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{BrowserEngineConfig, BrowserHandle, BrowserLauncher, PageContext};
use crate::delay::{DelayCategory, DelayPolicy};
use crate::error::DriverError;

/// How long a liveness probe or teardown may take before the handle is
/// treated as dead.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle state of the browser handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Absent,
    Initializing,
    Alive,
    Dead,
}

/// Owns at most one browser handle for the process.
pub struct BrowserSession {
    launcher: Arc<dyn BrowserLauncher>,
    handle: Option<Arc<dyn BrowserHandle>>,
    state: HandleState,
    delays: DelayPolicy,
    fast_mode: bool,
    init_attempts: u32,
    retry_delay: Duration,
    nav_timeout: Duration,
    generation: u64,
}

impl BrowserSession {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, delays: DelayPolicy) -> Self {
        Self {
            launcher,
            handle: None,
            state: HandleState::Absent,
            delays,
            fast_mode: false,
            init_attempts: 3,
            retry_delay: Duration::from_secs(5),
            nav_timeout: Duration::from_secs(30),
            generation: 0,
        }
    }

    /// Take retry and timeout settings from the engine config.
    pub fn with_engine_config(mut self, config: &BrowserEngineConfig) -> Self {
        self.init_attempts = config.init_attempts.max(1);
        self.retry_delay = Duration::from_secs(config.retry_delay_secs);
        self.nav_timeout = Duration::from_secs(config.timeout.max(1));
        self
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.init_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Bumped on every successful launch. A change means pages obtained
    /// earlier belong to a browser that no longer exists.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_fast_mode(&mut self, fast_mode: bool) {
        self.fast_mode = fast_mode;
    }

    pub fn fast_mode(&self) -> bool {
        self.fast_mode
    }

    pub fn delays(&self) -> &DelayPolicy {
        &self.delays
    }

    /// Sleep for a jittered duration of the given category.
    pub async fn pause(&self, category: DelayCategory) {
        self.delays.pause(category, self.fast_mode).await;
    }

    /// Current handle, creating or recovering it as needed.
    pub async fn get(&mut self) -> Result<Arc<dyn BrowserHandle>, DriverError> {
        match (self.state, self.handle.clone()) {
            (HandleState::Alive, Some(handle)) => {
                if self.is_alive().await {
                    return Ok(handle);
                }
                warn!("Browser handle stopped responding; recovering");
                self.state = HandleState::Dead;
                self.recover().await
            }
            (HandleState::Dead, _) => self.recover().await,
            _ => {
                self.initialize_with_retry().await?;
                self.current()
            }
        }
    }

    /// Base tab of the current handle.
    pub async fn base_page(&mut self) -> Result<Arc<dyn PageContext>, DriverError> {
        let handle = self.get().await?;
        match handle.base_page().await {
            Ok(page) => Ok(page),
            Err(e) => {
                self.mark_dead();
                Err(DriverError::Lost(e.to_string()))
            }
        }
    }

    fn current(&self) -> Result<Arc<dyn BrowserHandle>, DriverError> {
        self.handle
            .clone()
            .ok_or_else(|| DriverError::Lost("no browser handle after initialization".into()))
    }

    /// Side-effect-free probe: counts open windows, never touches page URLs.
    pub async fn is_alive(&self) -> bool {
        let Some(handle) = self.handle.as_ref() else {
            return false;
        };
        match tokio::time::timeout(PROBE_TIMEOUT, handle.window_count()).await {
            Ok(Ok(count)) => count > 0,
            Ok(Err(e)) => {
                debug!("Liveness probe failed: {}", e);
                false
            }
            Err(_) => {
                debug!("Liveness probe timed out");
                false
            }
        }
    }

    /// Flag the handle as dead after an operation on it failed.
    pub fn mark_dead(&mut self) {
        if self.handle.is_some() {
            self.state = HandleState::Dead;
        }
    }

    /// Launch a new handle with the anti-detection configuration.
    pub async fn initialize(&mut self) -> Result<(), DriverError> {
        self.state = HandleState::Initializing;
        info!("Initializing browser session");
        match self.launcher.launch().await {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = HandleState::Alive;
                self.generation += 1;
                info!("Browser session ready");
                Ok(())
            }
            Err(e) => {
                self.handle = None;
                self.state = HandleState::Absent;
                error!("Browser initialization failed: {}", e);
                Err(e)
            }
        }
    }

    /// `initialize` with a bounded number of attempts.
    pub async fn initialize_with_retry(&mut self) -> Result<(), DriverError> {
        let mut last = String::new();
        for attempt in 1..=self.init_attempts {
            match self.initialize().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last = e.to_string();
                    if attempt < self.init_attempts {
                        warn!(
                            "Browser init attempt {}/{} failed, retrying in {:?}",
                            attempt, self.init_attempts, self.retry_delay
                        );
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        Err(DriverError::RetriesExhausted {
            attempts: self.init_attempts,
            last,
        })
    }

    /// Tear down whatever is left of the old handle and start a new one.
    pub async fn recover(&mut self) -> Result<Arc<dyn BrowserHandle>, DriverError> {
        info!("Recovering browser session");
        self.teardown().await;
        self.initialize_with_retry().await?;
        self.current()
    }

    /// Navigate the base tab and wait for the page to settle.
    /// Failures are logged and reported as `false`.
    pub async fn navigate(&mut self, url: &str, wait: bool) -> bool {
        let page = match self.base_page().await {
            Ok(page) => page,
            Err(e) => {
                warn!("Cannot navigate to {}: {}", url, e);
                return false;
            }
        };
        match tokio::time::timeout(self.nav_timeout, page.goto(url)).await {
            Ok(Ok(())) => {
                if wait {
                    self.pause(DelayCategory::PageLoad).await;
                }
                true
            }
            Ok(Err(e)) => {
                warn!("Navigation to {} failed: {}", url, e);
                if !self.is_alive().await {
                    self.mark_dead();
                }
                false
            }
            Err(_) => {
                warn!("Navigation to {} timed out", url);
                false
            }
        }
    }

    /// Close auxiliary tabs and the handle. Safe to call repeatedly.
    pub async fn cleanup(&mut self) {
        if let Some(handle) = self.handle.as_ref() {
            match tokio::time::timeout(PROBE_TIMEOUT, handle.close_auxiliary()).await {
                Ok(Ok(n)) if n > 0 => debug!("Closed {} auxiliary tab(s)", n),
                Ok(Err(e)) => debug!("Closing auxiliary tabs failed: {}", e),
                _ => {}
            }
        }
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        if let Some(handle) = self.handle.take() {
            match tokio::time::timeout(PROBE_TIMEOUT, handle.quit()).await {
                Ok(Ok(())) => debug!("Browser closed"),
                Ok(Err(e)) => debug!("Ignoring error while closing browser: {}", e),
                Err(_) => debug!("Timed out closing browser"),
            }
        }
        self.state = HandleState::Absent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLauncher, FakeSite};

    fn session(launcher: &Arc<FakeLauncher>) -> BrowserSession {
        BrowserSession::new(launcher.clone(), DelayPolicy::instant())
            .with_retry(3, Duration::ZERO)
    }

    #[tokio::test]
    async fn get_initializes_lazily_and_reuses_handle() {
        let launcher = FakeLauncher::new(FakeSite::default());
        let mut session = session(&launcher);
        assert_eq!(session.state(), HandleState::Absent);

        session.get().await.unwrap();
        session.get().await.unwrap();
        assert_eq!(session.state(), HandleState::Alive);
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test]
    async fn liveness_probe_does_not_navigate() {
        let launcher = FakeLauncher::new(FakeSite::default());
        let mut session = session(&launcher);
        assert!(session.navigate("https://site.test/feed", true).await);
        let before = launcher.site().navigations();

        assert!(session.is_alive().await);
        assert!(session.is_alive().await);
        assert_eq!(launcher.site().navigations(), before);
    }

    #[tokio::test]
    async fn dead_handle_is_recovered_on_get() {
        let launcher = FakeLauncher::new(FakeSite::default());
        let mut session = session(&launcher);
        session.get().await.unwrap();

        launcher.kill_current();
        assert!(!session.is_alive().await);

        session.get().await.unwrap();
        assert_eq!(session.state(), HandleState::Alive);
        assert_eq!(launcher.launches(), 2);
        assert_eq!(session.generation(), 2);
        assert!(session.is_alive().await);
    }

    #[tokio::test]
    async fn init_retry_is_bounded() {
        let launcher = FakeLauncher::new(FakeSite::default());
        launcher.fail_next_launches(5);
        let mut session = session(&launcher);

        let err = session.get().await.err().unwrap();
        assert!(matches!(err, DriverError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(session.state(), HandleState::Absent);
        assert_eq!(launcher.launch_attempts(), 3);
    }

    #[tokio::test]
    async fn init_retry_recovers_from_transient_failure() {
        let launcher = FakeLauncher::new(FakeSite::default());
        launcher.fail_next_launches(2);
        let mut session = session(&launcher);
        assert!(session.get().await.is_ok());
        assert_eq!(launcher.launch_attempts(), 3);
    }

    #[tokio::test]
    async fn navigate_reports_failure_as_false() {
        let launcher = FakeLauncher::new(FakeSite::default());
        let mut session = session(&launcher);
        assert!(!session.navigate("https://unreachable.test/", false).await);
        assert_eq!(session.state(), HandleState::Alive);
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let launcher = FakeLauncher::new(FakeSite::default());
        let mut session = session(&launcher);
        session.get().await.unwrap();
        let handle = session.get().await.unwrap();
        handle.open_page("https://site.test/in/x").await.unwrap();

        session.cleanup().await;
        session.cleanup().await;
        assert_eq!(session.state(), HandleState::Absent);
        assert!(!session.is_alive().await);
        assert_eq!(launcher.site().open_tabs(), 0);
    }
}
