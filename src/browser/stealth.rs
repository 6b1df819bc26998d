//! Anti-detection configuration applied when the browser starts.

/// Chrome flags that hide the usual automation fingerprints.
pub const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-dev-shm-usage",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-background-networking",
    "--disable-sync",
    "--disable-translate",
    "--no-sandbox",
    "--disable-gpu",
    "--window-size=1366,900",
];

/// Flags that keep credential-manager and save-password prompts from
/// covering the login form.
pub const CREDENTIAL_PROMPT_ARGS: &[&str] = &[
    "--password-store=basic",
    "--disable-save-password-bubble",
    "--disable-features=PasswordManagerOnboarding,PasswordLeakDetection,AutofillServerCommunication",
    "--disable-notifications",
];

/// Scripts evaluated on each page after navigation.
pub const STEALTH_SCRIPTS: &[&str] = &[
    // navigator.webdriver is the first thing bot checks look at
    r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
        configurable: true
    });
    "#,
    r#"
    if (!window.chrome) {
        window.chrome = { runtime: {}, app: {} };
    }
    "#,
    r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en', 'id'],
        configurable: true
    });
    "#,
    r#"
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' }
        ],
        configurable: true
    });
    "#,
    r#"
    if (navigator.credentials) {
        navigator.credentials.get = () => Promise.resolve(null);
        navigator.credentials.store = (c) => Promise.resolve(c);
    }
    "#,
];

/// All launch flags, stealth first, then prompt suppression.
pub fn launch_args() -> impl Iterator<Item = &'static str> {
    STEALTH_ARGS
        .iter()
        .chain(CREDENTIAL_PROMPT_ARGS.iter())
        .copied()
}
