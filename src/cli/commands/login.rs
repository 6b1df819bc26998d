//! The `check-login` command.

use console::style;

use crate::browser::BrowserSession;
use crate::config::Settings;
use crate::scrape::{Authenticator, PasswordAuthenticator};

use super::helpers::browser_session;

/// Report whether the browser session is signed in, optionally signing in.
pub async fn cmd_check_login(settings: &Settings, login: bool) -> anyhow::Result<()> {
    let mut browser = browser_session(settings);
    let result = check(settings, &mut browser, login).await;
    browser.cleanup().await;
    result
}

async fn check(settings: &Settings, browser: &mut BrowserSession, login: bool) -> anyhow::Result<()> {
    let auth = PasswordAuthenticator::new(settings.site.clone(), settings.credentials.clone());

    if auth.is_logged_in(browser).await? {
        println!("{} Signed in", style("✓").green());
        return Ok(());
    }
    if !login {
        println!(
            "{} Not signed in (use --login to sign in as {})",
            style("!").yellow(),
            settings.credentials.masked_email()
        );
        return Ok(());
    }

    auth.ensure_authenticated(browser).await?;
    println!(
        "{} Signed in as {}",
        style("✓").green(),
        settings.credentials.masked_email()
    );
    Ok(())
}
