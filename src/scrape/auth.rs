//! Password login for the target site.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::Authenticator;
use crate::browser::{BrowserSession, PageContext};
use crate::config::{Credentials, SiteConfig};
use crate::delay::DelayCategory;
use crate::error::ScrapeError;

/// URL fragments only seen by a signed-in member.
const LOGGED_IN_MARKERS: &[&str] = &["/feed", "/mynetwork", "/in/"];

/// URL fragments of the security interstitials. These need a human.
const CHALLENGE_MARKERS: &[&str] = &["challenge", "checkpoint"];

const USERNAME_FIELD: &str = "#username";
const PASSWORD_FIELD: &str = "#password";
const SUBMIT_BUTTON: &str = "button[type=submit]";

/// Removes the save-password bubble and other dialogs covering the page.
const DISMISS_PROMPTS_SCRIPT: &str = r#"
    document
        .querySelectorAll('[role="dialog"], .save-password-bubble, [data-testid="save-password-bubble"]')
        .forEach((el) => el.remove());
"#;

/// Where a URL says the session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoginState {
    LoggedIn,
    Challenge,
    LoggedOut,
}

pub(crate) fn classify_url(url: &str) -> LoginState {
    if CHALLENGE_MARKERS.iter().any(|m| url.contains(m)) {
        LoginState::Challenge
    } else if LOGGED_IN_MARKERS.iter().any(|m| url.contains(m)) && !url.contains("/login") {
        LoginState::LoggedIn
    } else {
        LoginState::LoggedOut
    }
}

/// Logs in with email and password when the feed is not reachable.
#[derive(Debug, Clone)]
pub struct PasswordAuthenticator {
    site: SiteConfig,
    credentials: Credentials,
    verify_attempts: usize,
}

impl PasswordAuthenticator {
    pub fn new(site: SiteConfig, credentials: Credentials) -> Self {
        Self {
            site,
            credentials,
            verify_attempts: 3,
        }
    }

    /// Whether the current browser session is already signed in.
    pub async fn is_logged_in(&self, browser: &mut BrowserSession) -> Result<bool, ScrapeError> {
        if !browser.navigate(&self.site.feed_url(), true).await {
            return Err(ScrapeError::Navigation(format!(
                "could not open {}",
                self.site.feed_url()
            )));
        }
        let page = browser.base_page().await?;
        let url = page
            .current_url()
            .await
            .map_err(|e| ScrapeError::Navigation(e.to_string()))?;
        debug!("Login check landed on {}", url);
        Ok(classify_url(&url) == LoginState::LoggedIn)
    }

    async fn type_into(
        &self,
        browser: &BrowserSession,
        page: &dyn PageContext,
        selector: &str,
        text: &str,
    ) -> Result<(), ScrapeError> {
        let found = page
            .focus(selector)
            .await
            .map_err(|e| ScrapeError::Authentication(format!("login form unavailable: {}", e)))?;
        if !found {
            return Err(ScrapeError::Authentication(format!(
                "login field {} not found",
                selector
            )));
        }
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            page.insert_text(ch.encode_utf8(&mut buf))
                .await
                .map_err(|e| ScrapeError::Authentication(format!("typing failed: {}", e)))?;
            browser.pause(DelayCategory::Typing).await;
        }
        Ok(())
    }

    async fn login(&self, browser: &mut BrowserSession) -> Result<(), ScrapeError> {
        let (Some(email), Some(password)) = (
            self.credentials.email.as_deref().filter(|s| !s.is_empty()),
            self.credentials.password.as_deref().filter(|s| !s.is_empty()),
        ) else {
            return Err(ScrapeError::Authentication(
                "credentials not configured (set LINKEDIN_EMAIL and LINKEDIN_PASSWORD)".into(),
            ));
        };

        info!("Logging in as {}", self.credentials.masked_email());
        if !browser.navigate(&self.site.login_url(), true).await {
            return Err(ScrapeError::Navigation(format!(
                "could not open {}",
                self.site.login_url()
            )));
        }
        let page = browser.base_page().await?;

        self.type_into(browser, page.as_ref(), USERNAME_FIELD, email).await?;
        browser.pause(DelayCategory::Interaction).await;
        self.type_into(browser, page.as_ref(), PASSWORD_FIELD, password).await?;
        browser.pause(DelayCategory::Click).await;

        let submitted = page
            .click(SUBMIT_BUTTON)
            .await
            .map_err(|e| ScrapeError::Authentication(format!("could not submit login form: {}", e)))?;
        if !submitted {
            return Err(ScrapeError::Authentication("login button not found".into()));
        }
        let _ = page.evaluate(DISMISS_PROMPTS_SCRIPT).await;

        self.verify(browser, page.as_ref()).await
    }

    async fn verify(&self, browser: &BrowserSession, page: &dyn PageContext) -> Result<(), ScrapeError> {
        let mut last_url = String::new();
        for attempt in 1..=self.verify_attempts {
            browser.pause(DelayCategory::PageLoad).await;
            last_url = page
                .current_url()
                .await
                .map_err(|e| ScrapeError::Authentication(e.to_string()))?;
            match classify_url(&last_url) {
                LoginState::LoggedIn => {
                    info!("Login successful");
                    return Ok(());
                }
                LoginState::Challenge => {
                    return Err(ScrapeError::Authentication(format!(
                        "security challenge at {}; complete it in a visible browser (HEADLESS=false)",
                        last_url
                    )));
                }
                LoginState::LoggedOut => {
                    warn!(
                        "Not signed in after attempt {}/{} ({})",
                        attempt, self.verify_attempts, last_url
                    );
                }
            }
        }
        Err(ScrapeError::Authentication(format!(
            "login not confirmed after {} checks (last URL {})",
            self.verify_attempts, last_url
        )))
    }
}

#[async_trait]
impl Authenticator for PasswordAuthenticator {
    async fn ensure_authenticated(&self, browser: &mut BrowserSession) -> Result<(), ScrapeError> {
        match self.is_logged_in(browser).await {
            Ok(true) => {
                info!("Already logged in");
                return Ok(());
            }
            Ok(false) => info!("Not logged in, attempting login"),
            Err(ScrapeError::Navigation(e)) => {
                return Err(ScrapeError::Authentication(format!(
                    "login check failed: {}",
                    e
                )))
            }
            Err(e) => return Err(e),
        }
        self.login(browser).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::delay::DelayPolicy;
    use crate::testing::{FakeLauncher, FakeSite, BASE_URL, SCHOOL_ID};

    fn site() -> SiteConfig {
        SiteConfig {
            base_url: BASE_URL.into(),
            school_id: SCHOOL_ID.into(),
        }
    }

    fn creds(email: &str, password: &str) -> Credentials {
        Credentials {
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    fn session(launcher: &Arc<FakeLauncher>) -> BrowserSession {
        BrowserSession::new(launcher.clone(), DelayPolicy::instant()).with_retry(1, Duration::ZERO)
    }

    #[test]
    fn classifies_urls() {
        assert_eq!(classify_url("https://www.linkedin.com/feed/"), LoginState::LoggedIn);
        assert_eq!(classify_url("https://www.linkedin.com/in/jane"), LoginState::LoggedIn);
        assert_eq!(
            classify_url("https://www.linkedin.com/checkpoint/challenge/abc"),
            LoginState::Challenge
        );
        assert_eq!(
            classify_url("https://www.linkedin.com/login?session_redirect=%2Ffeed"),
            LoginState::LoggedOut
        );
    }

    #[tokio::test]
    async fn existing_session_skips_login() {
        let launcher = FakeLauncher::new(FakeSite::default());
        let mut browser = session(&launcher);
        let auth = PasswordAuthenticator::new(site(), Credentials::default());
        auth.ensure_authenticated(&mut browser).await.unwrap();
    }

    #[tokio::test]
    async fn logs_in_with_valid_credentials() {
        let launcher = FakeLauncher::new(FakeSite::default().with_login("jane@example.com", "s3cret"));
        let mut browser = session(&launcher);
        let auth = PasswordAuthenticator::new(site(), creds("jane@example.com", "s3cret"));

        auth.ensure_authenticated(&mut browser).await.unwrap();
        assert!(launcher.site().logged_in());
        assert!(auth.is_logged_in(&mut browser).await.unwrap());
    }

    #[tokio::test]
    async fn wrong_password_is_fatal() {
        let launcher = FakeLauncher::new(FakeSite::default().with_login("jane@example.com", "s3cret"));
        let mut browser = session(&launcher);
        let auth = PasswordAuthenticator::new(site(), creds("jane@example.com", "wrong"));

        let err = auth.ensure_authenticated(&mut browser).await.unwrap_err();
        assert!(matches!(err, ScrapeError::Authentication(_)));
        assert!(err.is_fatal());
        assert!(!launcher.site().logged_in());
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_typing() {
        let launcher = FakeLauncher::new(FakeSite::default().with_login("jane@example.com", "s3cret"));
        let mut browser = session(&launcher);
        let auth = PasswordAuthenticator::new(site(), Credentials::default());

        let err = auth.ensure_authenticated(&mut browser).await.unwrap_err();
        assert!(err.to_string().contains("credentials not configured"));
    }
}
