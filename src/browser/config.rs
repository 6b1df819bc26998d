//! Browser engine configuration.
//!
//! Always compiled, so settings files parse the same with or without the
//! `browser` feature.

use serde::{Deserialize, Serialize};

/// Default identity string sent instead of the headless Chrome one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Browser engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowserEngineConfig {
    /// Run in headless mode (default: true).
    /// Set to false to watch the session or solve a login challenge by hand.
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Page load timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// User agent override applied to every page.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Inject stealth scripts after each navigation.
    #[serde(default = "default_stealth")]
    pub stealth: bool,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Attempts made by a bounded initialization retry.
    #[serde(default = "default_init_attempts")]
    pub init_attempts: u32,

    /// Seconds to wait between initialization attempts.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            proxy: None,
            timeout: default_timeout(),
            user_agent: default_user_agent(),
            stealth: default_stealth(),
            chrome_args: Vec::new(),
            remote_url: None,
            init_attempts: default_init_attempts(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

impl BrowserEngineConfig {
    /// Apply environment variable overrides.
    ///
    /// - `HEADLESS` - "0"/"false" shows the browser window
    /// - `CHROME_REMOTE_URL` - connect to an existing DevTools endpoint
    /// - `SOCKS_PROXY` - proxy for browser traffic, if none configured
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("HEADLESS") {
            match val.to_lowercase().as_str() {
                "0" | "false" | "no" => self.headless = false,
                "1" | "true" | "yes" => self.headless = true,
                _ => {}
            }
        }

        if let Ok(val) = std::env::var("CHROME_REMOTE_URL") {
            if !val.is_empty() {
                self.remote_url = Some(val);
            }
        }

        if self.proxy.is_none() {
            if let Ok(proxy) = std::env::var("SOCKS_PROXY") {
                if !proxy.is_empty() {
                    self.proxy = Some(proxy);
                }
            }
        }

        self
    }
}

pub fn default_headless() -> bool {
    true
}

pub fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_stealth() -> bool {
    true
}

fn default_init_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_engine_config_serde_defaults() {
        let config: BrowserEngineConfig = toml::from_str("").unwrap();
        assert!(config.headless);
        assert!(config.stealth);
        assert_eq!(config.timeout, 30);
        assert_eq!(config.init_attempts, 3);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config, BrowserEngineConfig::default());
    }

    #[test]
    fn test_browser_engine_config_serde_with_values() {
        let config: BrowserEngineConfig = toml::from_str(
            r#"
            headless = false
            proxy = "socks5://127.0.0.1:1080"
            timeout = 60
            remote_url = "ws://localhost:9222"
            chrome_args = ["--lang=en-US"]
            "#,
        )
        .unwrap();
        assert!(!config.headless);
        assert_eq!(config.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(config.timeout, 60);
        assert_eq!(config.remote_url.as_deref(), Some("ws://localhost:9222"));
        assert_eq!(config.chrome_args, vec!["--lang=en-US"]);
    }
}
