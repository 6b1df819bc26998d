//! In-memory browser used by the async tests.
//!
//! `FakeSite` serves people-search listings keyed by the `keywords` query
//! parameter, profile pages under `/in/<slug>`, and a login form. The
//! launcher can fail launches or kill the live handle to exercise recovery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use url::Url;

use crate::browser::{BrowserHandle, BrowserLauncher, PageContext};
use crate::error::{DriverError, ScrapeError};
use crate::models::{ProfileDetails, Section};
use crate::scrape::{Extractor, PageSelectors};

pub const BASE_URL: &str = "https://site.test";
pub const SCHOOL_ID: &str = "test-university";
pub const LOCATION_CLASS: &str = "text-body-small inline t-black--light break-words";
pub const SECTION_CLASS: &str =
    "artdeco-list__item pvs-list__item--line-separated pvs-list__item--one-column";

#[derive(Debug, Clone)]
pub struct FakeProfile {
    pub slug: String,
    pub name: String,
    pub headline: String,
}

impl FakeProfile {
    pub fn new(slug: &str, name: &str) -> Self {
        Self {
            slug: slug.to_string(),
            name: name.to_string(),
            headline: format!("Engineer at {}", name),
        }
    }

    pub fn url(&self) -> String {
        format!("{}/in/{}", BASE_URL, self.slug)
    }
}

#[derive(Debug, Default)]
struct SiteState {
    listings: HashMap<String, Vec<FakeProfile>>,
    logged_in: bool,
    username: String,
    password: String,
    open_tabs: usize,
    detail_opens: usize,
    kill_on_detail_open: Option<usize>,
    unopenable: Vec<String>,
    navigations: usize,
}

/// Shared state of the fake web site.
#[derive(Debug, Clone)]
pub struct FakeSite {
    state: Arc<Mutex<SiteState>>,
    page_size: usize,
}

impl Default for FakeSite {
    fn default() -> Self {
        let site = Self {
            state: Arc::new(Mutex::new(SiteState::default())),
            page_size: 10,
        };
        site.state().logged_in = true;
        site
    }
}

impl FakeSite {
    fn state(&self) -> std::sync::MutexGuard<'_, SiteState> {
        self.state.lock().unwrap()
    }

    /// Number of cards shown before each "load more" click.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_listing(self, keyword: &str, profiles: Vec<FakeProfile>) -> Self {
        self.state().listings.insert(keyword.to_string(), profiles);
        self
    }

    /// Require a login with these credentials.
    pub fn with_login(self, username: &str, password: &str) -> Self {
        {
            let mut state = self.state();
            state.logged_in = false;
            state.username = username.to_string();
            state.password = password.to_string();
        }
        self
    }

    /// Kill the browser when the `n`th detail tab (1-based) is opened.
    pub fn kill_on_detail_open(&self, n: usize) {
        self.state().kill_on_detail_open = Some(n);
    }

    /// Make opening the profile page of `slug` fail while the browser stays up.
    pub fn fail_detail_open(&self, slug: &str) {
        self.state().unopenable.push(format!("/in/{}", slug));
    }

    pub fn logged_in(&self) -> bool {
        self.state().logged_in
    }

    pub fn navigations(&self) -> usize {
        self.state().navigations
    }

    /// Detail tabs currently open.
    pub fn open_tabs(&self) -> usize {
        self.state().open_tabs
    }

    pub fn detail_opens(&self) -> usize {
        self.state().detail_opens
    }

    fn listing_html(&self, keyword: &str, visible: usize) -> (String, bool) {
        let state = self.state();
        let profiles = state.listings.get(keyword).cloned().unwrap_or_default();
        let shown = visible.min(profiles.len());
        let mut html = String::from("<html><body><main>");
        for p in &profiles[..shown] {
            html.push_str(&format!(
                r#"<div class="org-people-profile-card__profile-info">
                     <img src="https://media.test/{slug}.jpg">
                     <div class="artdeco-entity-lockup__title"><a href="/in/{slug}?miniProfileUrn=abc">{name}</a></div>
                     <div class="artdeco-entity-lockup__subtitle">{headline}</div>
                   </div>"#,
                slug = p.slug,
                name = p.name,
                headline = p.headline
            ));
        }
        let more = shown < profiles.len();
        if more {
            html.push_str(
                r#"<button class="artdeco-button scaffold-finite-scroll__load-button">Show more results</button>"#,
            );
        }
        html.push_str("</main></body></html>");
        (html, more)
    }
}

/// Profile page markup for a slug.
pub fn profile_html(slug: &str) -> String {
    format!(
        r#"<html><body>
        <div class="{location}"><span>Jakarta, Indonesia</span></div>
        <section><div id="experience"></div><ul>
          <li class="{section}">
            <span class="visually-hidden">Engineer</span>
            <span class="t-14 t-normal"><span class="visually-hidden">Acme {slug}</span></span>
            <span class="t-14 t-normal t-black--light"><span class="visually-hidden">2020 - Present</span></span>
          </li>
        </ul></section>
        <section><div id="education"></div><ul>
          <li class="{section}">
            <span class="visually-hidden">Test University</span>
            <span class="t-14 t-normal">Bachelor of Computer Science</span>
            <span class="t-14 t-normal t-black--light">2014 - 2018</span>
          </li>
        </ul></section>
        </body></html>"#,
        location = LOCATION_CLASS,
        section = SECTION_CLASS,
        slug = slug
    )
}

struct FakePage {
    site: FakeSite,
    alive: Arc<AtomicBool>,
    url: Mutex<String>,
    visible: AtomicUsize,
    focused: Mutex<Option<String>>,
    fields: Mutex<HashMap<String, String>>,
    closed: AtomicBool,
    detail: bool,
}

impl FakePage {
    fn new(site: FakeSite, alive: Arc<AtomicBool>, detail: bool) -> Self {
        let visible = site.page_size;
        Self {
            site,
            alive,
            url: Mutex::new("about:blank".to_string()),
            visible: AtomicUsize::new(visible),
            focused: Mutex::new(None),
            fields: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            detail,
        }
    }

    fn check(&self) -> Result<()> {
        if !self.alive.load(Ordering::SeqCst) {
            bail!("browser disconnected");
        }
        if self.closed.load(Ordering::SeqCst) {
            bail!("target closed");
        }
        Ok(())
    }

    fn keyword(&self) -> Option<String> {
        let url = Url::parse(&self.url.lock().unwrap()).ok()?;
        let keyword = url
            .query_pairs()
            .find(|(k, _)| k == "keywords")
            .map(|(_, v)| v.into_owned());
        keyword
    }
}

#[async_trait]
impl PageContext for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.check()?;
        let parsed = Url::parse(url)?;
        if parsed.host_str() == Some("unreachable.test") {
            bail!("net::ERR_NAME_NOT_RESOLVED");
        }
        let mut target = url.to_string();
        {
            let mut state = self.site.state();
            state.navigations += 1;
            if !state.logged_in && parsed.path().starts_with("/feed") {
                target = format!("{}/login?session_redirect=feed", BASE_URL);
            }
        }
        *self.url.lock().unwrap() = target;
        self.visible.store(self.site.page_size, Ordering::SeqCst);
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        self.check()?;
        Ok(self.url.lock().unwrap().clone())
    }

    async fn content(&self) -> Result<String> {
        self.check()?;
        let url = self.url.lock().unwrap().clone();
        if let Some(keyword) = self.keyword() {
            return Ok(self.site.listing_html(&keyword, self.visible.load(Ordering::SeqCst)).0);
        }
        if let Some(slug) = url.split("/in/").nth(1) {
            let slug = slug.trim_end_matches('/');
            return Ok(profile_html(slug));
        }
        Ok("<html><body></body></html>".to_string())
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value> {
        self.check()?;
        Ok(serde_json::Value::Null)
    }

    async fn scroll_by(&self, _dy: i64) -> Result<()> {
        self.check()
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        self.check()?;
        if selector.contains("scaffold-finite-scroll__load-button") {
            let Some(keyword) = self.keyword() else {
                return Ok(false);
            };
            let visible = self.visible.load(Ordering::SeqCst);
            let (_, more) = self.site.listing_html(&keyword, visible);
            if more {
                self.visible
                    .store(visible + self.site.page_size, Ordering::SeqCst);
            }
            return Ok(more);
        }
        if selector.contains("submit") {
            let fields = self.fields.lock().unwrap().clone();
            let mut state = self.site.state();
            let ok = fields.get("#username") == Some(&state.username)
                && fields.get("#password") == Some(&state.password);
            let target = if ok {
                state.logged_in = true;
                format!("{}/feed/", BASE_URL)
            } else {
                format!("{}/login?error=true", BASE_URL)
            };
            drop(state);
            *self.url.lock().unwrap() = target;
            return Ok(true);
        }
        Ok(false)
    }

    async fn focus(&self, selector: &str) -> Result<bool> {
        self.check()?;
        if !self.url.lock().unwrap().contains("/login") {
            return Ok(false);
        }
        self.fields
            .lock()
            .unwrap()
            .insert(selector.to_string(), String::new());
        *self.focused.lock().unwrap() = Some(selector.to_string());
        Ok(true)
    }

    async fn insert_text(&self, text: &str) -> Result<()> {
        self.check()?;
        let focused = self
            .focused
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("nothing focused"))?;
        self.fields
            .lock()
            .unwrap()
            .entry(focused)
            .or_default()
            .push_str(text);
        Ok(())
    }

    async fn activate(&self) -> Result<()> {
        self.check()
    }

    async fn close(&self) -> Result<()> {
        if self.detail && !self.closed.swap(true, Ordering::SeqCst) {
            let mut state = self.site.state();
            state.open_tabs = state.open_tabs.saturating_sub(1);
        }
        Ok(())
    }
}

struct FakeHandle {
    site: FakeSite,
    alive: Arc<AtomicBool>,
    base: Arc<FakePage>,
    tabs: Mutex<Vec<Arc<FakePage>>>,
}

/// Detail tab handed out by `open_page`; shares state with the handle's
/// bookkeeping so `close_auxiliary` can see it.
struct TabRef(Arc<FakePage>);

#[async_trait]
impl PageContext for TabRef {
    async fn goto(&self, url: &str) -> Result<()> {
        self.0.goto(url).await
    }
    async fn current_url(&self) -> Result<String> {
        self.0.current_url().await
    }
    async fn content(&self) -> Result<String> {
        self.0.content().await
    }
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        self.0.evaluate(script).await
    }
    async fn scroll_by(&self, dy: i64) -> Result<()> {
        self.0.scroll_by(dy).await
    }
    async fn click(&self, selector: &str) -> Result<bool> {
        self.0.click(selector).await
    }
    async fn focus(&self, selector: &str) -> Result<bool> {
        self.0.focus(selector).await
    }
    async fn insert_text(&self, text: &str) -> Result<()> {
        self.0.insert_text(text).await
    }
    async fn activate(&self) -> Result<()> {
        self.0.activate().await
    }
    async fn close(&self) -> Result<()> {
        self.0.close().await
    }
}

#[async_trait]
impl BrowserHandle for FakeHandle {
    async fn window_count(&self) -> Result<usize> {
        if !self.alive.load(Ordering::SeqCst) {
            bail!("browser disconnected");
        }
        let tabs = self.tabs.lock().unwrap();
        Ok(1 + tabs.iter().filter(|t| !t.closed.load(Ordering::SeqCst)).count())
    }

    async fn base_page(&self) -> Result<Arc<dyn PageContext>> {
        if !self.alive.load(Ordering::SeqCst) {
            bail!("browser disconnected");
        }
        Ok(self.base.clone())
    }

    async fn open_page(&self, url: &str) -> Result<Box<dyn PageContext>> {
        if !self.alive.load(Ordering::SeqCst) {
            bail!("browser disconnected");
        }
        let (kill, unopenable) = {
            let mut state = self.site.state();
            state.detail_opens += 1;
            let kill = state.kill_on_detail_open == Some(state.detail_opens);
            if kill {
                state.kill_on_detail_open = None;
            }
            let unopenable = state.unopenable.iter().any(|path| url.ends_with(path.as_str()));
            (kill, unopenable)
        };
        if kill {
            self.alive.store(false, Ordering::SeqCst);
            bail!("browser crashed while opening {}", url);
        }
        if unopenable {
            bail!("net::ERR_ABORTED opening {}", url);
        }
        let page = Arc::new(FakePage::new(self.site.clone(), self.alive.clone(), true));
        self.site.state().open_tabs += 1;
        page.goto(url).await?;
        self.tabs.lock().unwrap().push(page.clone());
        Ok(Box::new(TabRef(page)))
    }

    async fn close_auxiliary(&self) -> Result<usize> {
        let tabs: Vec<_> = self.tabs.lock().unwrap().drain(..).collect();
        let mut closed = 0;
        for tab in tabs {
            if !tab.closed.load(Ordering::SeqCst) {
                tab.close().await?;
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn quit(&self) -> Result<()> {
        let was_alive = self.alive.swap(false, Ordering::SeqCst);
        let tabs: Vec<_> = self.tabs.lock().unwrap().drain(..).collect();
        for tab in tabs {
            tab.close().await?;
        }
        if !was_alive {
            bail!("browser already gone");
        }
        Ok(())
    }
}

/// Launcher that hands out `FakeHandle`s.
pub struct FakeLauncher {
    site: FakeSite,
    launches: AtomicUsize,
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
    current: Mutex<Option<Arc<AtomicBool>>>,
}

impl FakeLauncher {
    pub fn new(site: FakeSite) -> Arc<Self> {
        Arc::new(Self {
            site,
            launches: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            fail_next: AtomicUsize::new(0),
            current: Mutex::new(None),
        })
    }

    pub fn site(&self) -> &FakeSite {
        &self.site
    }

    /// Successful launches.
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn launch_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn fail_next_launches(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Simulate the browser process dying.
    pub fn kill_current(&self) {
        if let Some(alive) = self.current.lock().unwrap().as_ref() {
            alive.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> std::result::Result<Arc<dyn BrowserHandle>, DriverError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let pending_failures = self.fail_next.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.fail_next.store(pending_failures - 1, Ordering::SeqCst);
            return Err(DriverError::Launch("chrome exited with status 1".into()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        let alive = Arc::new(AtomicBool::new(true));
        *self.current.lock().unwrap() = Some(alive.clone());
        Ok(Arc::new(FakeHandle {
            site: self.site.clone(),
            alive: alive.clone(),
            base: Arc::new(FakePage::new(self.site.clone(), alive, false)),
            tabs: Mutex::new(Vec::new()),
        }))
    }
}

type ExtractHook = Box<dyn Fn(&str) + Send + Sync>;

/// Extractor returning canned details, optionally failing for some URLs.
#[derive(Default)]
pub struct FakeExtractor {
    fail_for: Vec<String>,
    on_extract: Option<ExtractHook>,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn failing_for(mut self, slug: &str) -> Self {
        self.fail_for.push(slug.to_string());
        self
    }

    /// Run `hook` with the page URL at the start of every extraction.
    pub fn on_extract(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_extract = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(
        &self,
        page: &dyn PageContext,
        _selectors: &PageSelectors,
    ) -> std::result::Result<ProfileDetails, ScrapeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let url = page
            .current_url()
            .await
            .map_err(|e| ScrapeError::Extraction(e.to_string()))?;
        if let Some(hook) = &self.on_extract {
            hook(&url);
        }
        if self.fail_for.iter().any(|slug| url.contains(slug.as_str())) {
            return Err(ScrapeError::Extraction(format!("no sections on {}", url)));
        }
        Ok(ProfileDetails {
            location: "Jakarta".to_string(),
            experience: Section::Entries(Vec::new()),
            education: Section::Entries(Vec::new()),
            certifications: Section::Entries(Vec::new()),
        })
    }
}
