//! Configuration management.
//!
//! Settings come from an optional config file with serde defaults for every
//! field, then environment overrides (`.env` is loaded by `main`). Without
//! `--config`, the `prefer` crate discovers `alumni-harvest.*` in its
//! standard locations.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::BrowserEngineConfig;
use crate::delay::DelayConfig;

/// Name `prefer` discovers config files under.
pub const CONFIG_NAME: &str = "alumni-harvest";

/// Target site addresses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// School page id, as in `/school/<id>/people/`.
    #[serde(default = "default_school_id")]
    pub school_id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            school_id: default_school_id(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.linkedin.com".to_string()
}

fn default_school_id() -> String {
    "default-id".to_string()
}

impl SiteConfig {
    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn login_url(&self) -> String {
        format!("{}/login", self.base())
    }

    pub fn feed_url(&self) -> String {
        format!("{}/feed/", self.base())
    }

    pub fn people_url(&self) -> String {
        format!("{}/school/{}/people/", self.base(), self.school_id)
    }

    /// People search filtered by one keyword.
    pub fn search_url(&self, keyword: &str) -> String {
        format!(
            "{}?keywords={}",
            self.people_url(),
            urlencoding::encode(keyword)
        )
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(id) = std::env::var("UNIVERSITY_LINKEDIN_ID") {
            if !id.is_empty() {
                self.school_id = id;
            }
        }
        self
    }
}

/// Login credentials. Never serialized back out.
#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.masked_email())
            .field("password", &self.password.as_ref().map(|_| "********"))
            .finish()
    }
}

impl Credentials {
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(email) = std::env::var("LINKEDIN_EMAIL") {
            if !email.is_empty() {
                self.email = Some(email);
            }
        }
        if let Ok(password) = std::env::var("LINKEDIN_PASSWORD") {
            if !password.is_empty() {
                self.password = Some(password);
            }
        }
        self
    }

    pub fn is_complete(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.is_empty())
            && self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// `j******e@example.com` style rendering for logs.
    pub fn masked_email(&self) -> String {
        let Some(email) = self.email.as_deref() else {
            return "Not configured".to_string();
        };
        let Some((user, domain)) = email.split_once('@') else {
            return "Invalid email".to_string();
        };
        let chars: Vec<char> = user.chars().collect();
        let masked = match chars.len() {
            0 => String::new(),
            1 | 2 => format!("{}*", chars[0]),
            n => format!("{}{}{}", chars[0], "*".repeat(n - 2), chars[n - 1]),
        };
        format!("{}@{}", masked, domain)
    }
}

/// Selectors for the people listing, plus fallback profile classes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectorConfig {
    #[serde(default = "default_card")]
    pub card: String,
    #[serde(default = "default_link")]
    pub link: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_subtitle")]
    pub subtitle: String,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_load_more")]
    pub load_more: String,
    #[serde(default = "default_location_class")]
    pub location_class: String,
    #[serde(default = "default_section_class")]
    pub section_class: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            card: default_card(),
            link: default_link(),
            title: default_title(),
            subtitle: default_subtitle(),
            image: default_image(),
            load_more: default_load_more(),
            location_class: default_location_class(),
            section_class: default_section_class(),
        }
    }
}

fn default_card() -> String {
    "div.org-people-profile-card__profile-info".to_string()
}

fn default_link() -> String {
    ".artdeco-entity-lockup__title a[href*='/in/']".to_string()
}

fn default_title() -> String {
    ".artdeco-entity-lockup__title".to_string()
}

fn default_subtitle() -> String {
    ".artdeco-entity-lockup__subtitle".to_string()
}

fn default_image() -> String {
    "img[src]".to_string()
}

fn default_load_more() -> String {
    "button.scaffold-finite-scroll__load-button".to_string()
}

pub fn default_location_class() -> String {
    "text-body-small inline t-black--light break-words".to_string()
}

pub fn default_section_class() -> String {
    "artdeco-list__item pvs-list__item--line-separated pvs-list__item--one-column".to_string()
}

/// Job defaults; most can be overridden per run from the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobConfig {
    #[serde(default = "default_input_file")]
    pub input_file: String,
    #[serde(default = "default_output_file")]
    pub output_file: String,
    /// Profiles to record per run (0 = no limit).
    #[serde(default = "default_target")]
    pub target: usize,
    #[serde(default)]
    pub fast_mode: bool,
    #[serde(default = "default_true")]
    pub resume: bool,
    /// Flush to the checkpoint after this many keys...
    #[serde(default = "default_flush_every_keys")]
    pub flush_every_keys: usize,
    /// ...or once this many records are pending.
    #[serde(default = "default_flush_pending")]
    pub flush_pending: usize,
    #[serde(default = "default_max_load_more_clicks")]
    pub max_load_more_clicks: usize,
    /// Times a key is restarted after the browser had to be recovered.
    #[serde(default = "default_max_key_restarts")]
    pub max_key_restarts: usize,
    #[serde(default = "default_extraction_timeout")]
    pub extraction_timeout_secs: u64,
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            input_file: default_input_file(),
            output_file: default_output_file(),
            target: default_target(),
            fast_mode: false,
            resume: true,
            flush_every_keys: default_flush_every_keys(),
            flush_pending: default_flush_pending(),
            max_load_more_clicks: default_max_load_more_clicks(),
            max_key_restarts: default_max_key_restarts(),
            extraction_timeout_secs: default_extraction_timeout(),
            stop_timeout_secs: default_stop_timeout(),
        }
    }
}

fn default_input_file() -> String {
    "data/names.csv".to_string()
}

fn default_output_file() -> String {
    "data/alumni.csv".to_string()
}

fn default_target() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_flush_every_keys() -> usize {
    3
}

fn default_flush_pending() -> usize {
    5
}

fn default_max_load_more_clicks() -> usize {
    10
}

fn default_max_key_restarts() -> usize {
    2
}

fn default_extraction_timeout() -> u64 {
    120
}

fn default_stop_timeout() -> u64 {
    10
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub browser: BrowserEngineConfig,
    #[serde(default)]
    pub delays: DelayConfig,
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub selectors: SelectorConfig,
    /// File the settings were read from, if any.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Settings {
    /// Load from `path`, or from a discovered config file, then apply
    /// environment overrides.
    pub async fn load(path: Option<&Path>) -> Result<Self, String> {
        let settings = match path {
            Some(path) => Self::load_from_path(path).await?,
            None => match Self::discover().await {
                Some(found) => {
                    debug!("Using config file {}", found.display());
                    Self::load_from_path(&found).await?
                }
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        Ok(settings.with_env_overrides())
    }

    /// Use prefer for file discovery; parsing stays with serde.
    async fn discover() -> Option<PathBuf> {
        match prefer::load(CONFIG_NAME).await {
            Ok(found) => found.source_path().map(|p| p.to_path_buf()),
            Err(_) => None,
        }
    }

    /// Parse a TOML (or, by extension, JSON) settings file without applying
    /// env overrides.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        let path = PathBuf::from(expanded);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
        let mut settings: Settings = match ext {
            "json" => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
            _ => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
        };
        settings.source_path = Some(path);
        Ok(settings)
    }

    pub fn with_env_overrides(mut self) -> Self {
        self.site = self.site.with_env_overrides();
        self.credentials = self.credentials.with_env_overrides();
        self.browser = self.browser.with_env_overrides();
        self.delays = self.delays.with_env_overrides();
        self
    }

    /// Base directory for relative paths: the config file's directory, or
    /// the working directory.
    pub fn base_dir(&self) -> PathBuf {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are joined onto `base_dir`
    pub fn resolve_path(&self, path_str: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }

    pub fn input_path(&self) -> PathBuf {
        self.resolve_path(&self.job.input_file)
    }

    pub fn output_path(&self) -> PathBuf {
        self.resolve_path(&self.job.output_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn search_url_encodes_keyword() {
        let site = SiteConfig {
            base_url: "https://www.linkedin.com/".into(),
            school_id: "sample-university".into(),
        };
        assert_eq!(
            site.search_url("Budi Santoso"),
            "https://www.linkedin.com/school/sample-university/people/?keywords=Budi%20Santoso"
        );
        assert_eq!(site.login_url(), "https://www.linkedin.com/login");
    }

    #[test]
    fn masked_email() {
        let creds = |email: &str| Credentials {
            email: Some(email.into()),
            password: None,
        };
        assert_eq!(creds("jane@example.com").masked_email(), "j**e@example.com");
        assert_eq!(creds("jo@example.com").masked_email(), "j*@example.com");
        assert_eq!(creds("nope").masked_email(), "Invalid email");
        assert_eq!(Credentials::default().masked_email(), "Not configured");
    }

    #[test]
    fn debug_redacts_password() {
        let creds = Credentials {
            email: Some("jane@example.com".into()),
            password: Some("hunter2".into()),
        };
        let out = format!("{:?}", creds);
        assert!(!out.contains("hunter2"));
        assert!(!out.contains("jane@"));
    }

    #[tokio::test]
    async fn load_from_path_fills_defaults_and_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alumni-harvest.toml");
        std::fs::write(
            &path,
            r#"
            [site]
            school_id = "sample-university"

            [job]
            output_file = "out/alumni.csv"
            target = 25

            [browser]
            headless = false
            "#,
        )
        .unwrap();

        let settings = Settings::load_from_path(&path).await.unwrap();
        assert_eq!(settings.site.school_id, "sample-university");
        assert_eq!(settings.site.base_url, "https://www.linkedin.com");
        assert_eq!(settings.job.target, 25);
        assert_eq!(settings.job.flush_every_keys, 3);
        assert_eq!(settings.job.flush_pending, 5);
        assert!(!settings.browser.headless);
        assert_eq!(settings.output_path(), dir.path().join("out/alumni.csv"));
        assert_eq!(
            settings.selectors.section_class,
            "artdeco-list__item pvs-list__item--line-separated pvs-list__item--one-column"
        );
    }

    #[tokio::test]
    async fn json_config_is_parsed_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alumni-harvest.json");
        std::fs::write(&path, r#"{"job": {"target": 3, "fast_mode": true}}"#).unwrap();

        let settings = Settings::load_from_path(&path).await.unwrap();
        assert_eq!(settings.job.target, 3);
        assert!(settings.job.fast_mode);
        assert_eq!(settings.site, SiteConfig::default());
    }

    #[tokio::test]
    async fn explicit_path_skips_discovery() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[job]\nflush_pending = 7\n").unwrap();

        let settings = Settings::load(Some(&path)).await.unwrap();
        assert_eq!(settings.job.flush_pending, 7);
        assert_eq!(settings.source_path.as_deref(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let err = Settings::load_from_path(Path::new("/nonexistent/harvest.toml"))
            .await
            .unwrap_err();
        assert!(err.contains("Failed to read config file"));
    }
}
