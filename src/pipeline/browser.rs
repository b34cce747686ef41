//! Headless Chromium session: rendered fetches and HTML → PDF printing.
//!
//! One [`BrowserSession`] owns one Chromium process. Every navigation or
//! print runs in its own short-lived isolated browser context (separate
//! cookies, cache and storage), configured with the [`EvasionProfile`] before
//! anything loads. The context is disposed on every exit path.
//!
//! ```text
//!  Uninitialized ──initialize()──▶ Initialized ──close()──▶ Closed
//!        │                              ▲                     │
//!        └── render_page / print_to_pdf ┘ (lazy)              └─ close() again: no-op
//! ```
//!
//! Methods take `&mut self`: one session serves one request at a time.

use crate::config::{DeclutterConfig, IdleSettings};
use crate::error::DeclutterError;
use crate::output::write_atomic;
use crate::pipeline::evasion::EvasionProfile;
use crate::pipeline::fetch::{FetchRequest, RenderedFetcher};
use crate::pipeline::idle::{InflightCounter, NetworkEvent, NetworkIdleDetector};
use crate::pipeline::interaction::{
    InteractionPlan, InteractionTarget, VIEWPORT_HEIGHT, VIEWPORT_WIDTH,
};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, Headers,
    SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams, PrintToPdfParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Chromium flags. Replaces chromiumoxide's defaults entirely, so
/// `--enable-automation` is never passed.
pub const LAUNCH_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--window-size=1920,1080",
    "--disable-web-security",
    "--disable-features=IsolateOrigins,site-per-process",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--no-zygote",
    "--disable-gpu",
    "--lang=en-US,en;q=0.9",
];

/// Resolves once the DOM is parsed (or already was).
const DOM_READY_SCRIPT: &str = r#"new Promise((resolve) => {
  if (document.readyState !== 'loading') { resolve(document.readyState); }
  else { document.addEventListener('DOMContentLoaded', () => resolve(document.readyState)); }
})"#;

/// A4 (8.27 × 11.69 in), 50 px margins, backgrounds on.
pub fn a4_print_params() -> PrintToPdfParams {
    let margin = 50.0 / 96.0;
    PrintToPdfParams {
        print_background: Some(true),
        paper_width: Some(8.27),
        paper_height: Some(11.69),
        margin_top: Some(margin),
        margin_bottom: Some(margin),
        margin_left: Some(margin),
        margin_right: Some(margin),
        ..Default::default()
    }
}

/// Lifecycle of a [`BrowserSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Closed,
}

/// Owner of the Chromium process.
pub struct BrowserSession {
    state: SessionState,
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
    browser_path: Option<PathBuf>,
    profile: EvasionProfile,
    idle: IdleSettings,
    request_timeout: Duration,
}

impl std::fmt::Debug for BrowserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSession")
            .field("state", &self.state)
            .field("browser_path", &self.browser_path)
            .field("idle", &self.idle)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for BrowserSession {
    fn default() -> Self {
        Self::new(&DeclutterConfig::default())
    }
}

impl BrowserSession {
    /// A session that will launch lazily with the config's browser path,
    /// idle settings and navigation timeout.
    pub fn new(config: &DeclutterConfig) -> Self {
        Self {
            state: SessionState::Uninitialized,
            browser: None,
            handler_task: None,
            browser_path: config.browser_path.clone(),
            profile: EvasionProfile::default(),
            idle: config.idle,
            request_timeout: config.navigation_timeout(),
        }
    }

    pub fn with_profile(mut self, profile: EvasionProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == SessionState::Initialized
    }

    /// Launch Chromium. No-op when already running.
    ///
    /// `browser_path` overrides the configured executable; with neither,
    /// chromiumoxide searches the usual install locations.
    pub async fn initialize(&mut self, browser_path: Option<&Path>) -> Result<(), DeclutterError> {
        match self.state {
            SessionState::Initialized => return Ok(()),
            SessionState::Closed => return Err(DeclutterError::SessionClosed),
            SessionState::Uninitialized => {}
        }

        let path = browser_path
            .map(Path::to_path_buf)
            .or_else(|| self.browser_path.clone());
        info!(
            "Launching headless browser ({})",
            path.as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "auto-detect".into())
        );

        let mut builder = BrowserConfig::builder()
            .disable_default_args()
            .args(LAUNCH_ARGS.iter().copied())
            .request_timeout(self.request_timeout);
        if let Some(p) = path {
            builder = builder.chrome_executable(p);
        }
        let config = builder.build().map_err(DeclutterError::BrowserLaunchFailed)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DeclutterError::BrowserLaunchFailed(e.to_string()))?;

        let task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler: {}", e);
                }
            }
        });

        self.browser = Some(browser);
        self.handler_task = Some(task);
        self.state = SessionState::Initialized;
        Ok(())
    }

    fn browser(&self) -> Result<&Browser, DeclutterError> {
        match (self.state, self.browser.as_ref()) {
            (SessionState::Closed, _) => Err(DeclutterError::SessionClosed),
            (_, Some(b)) => Ok(b),
            (_, None) => Err(DeclutterError::Internal(
                "browser session used before initialize()".into(),
            )),
        }
    }

    /// Navigate to `request.url` in a fresh isolated context and return the
    /// rendered markup.
    ///
    /// Sequence: navigate (DOMContentLoaded), network idle, human-like
    /// interaction, capture.
    pub async fn render_page(&mut self, request: &FetchRequest) -> Result<String, DeclutterError> {
        self.initialize(request.browser_path.as_deref()).await?;

        let ctx = self.open_context().await?;
        let result = self.capture(&ctx.page, request).await;
        ctx.dispose(self.browser()?).await;
        result
    }

    async fn capture(&self, page: &Page, request: &FetchRequest) -> Result<String, DeclutterError> {
        let watch = NetworkWatch::attach(page).await?;

        info!("Rendering {}", request.url);
        let nav = tokio::time::timeout(
            request.navigation_timeout,
            page.execute(NavigateParams::new(request.url.clone())),
        )
        .await;
        let nav = match nav {
            Err(_) => {
                return Err(DeclutterError::FetchTimeout {
                    what: format!("navigation to {}", request.url),
                    secs: request.navigation_timeout.as_secs(),
                })
            }
            Ok(Err(e)) => {
                return Err(DeclutterError::NavigationFailed {
                    url: request.url.clone(),
                    reason: e.to_string(),
                })
            }
            Ok(Ok(resp)) => resp,
        };
        if let Some(reason) = nav.result.error_text.clone() {
            return Err(DeclutterError::NavigationFailed {
                url: request.url.clone(),
                reason,
            });
        }

        match tokio::time::timeout(request.navigation_timeout, page.evaluate(DOM_READY_SCRIPT)).await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("readyState check failed: {}", e),
            Err(_) => {
                return Err(DeclutterError::FetchTimeout {
                    what: "DOMContentLoaded".into(),
                    secs: request.navigation_timeout.as_secs(),
                })
            }
        }

        NetworkIdleDetector::new(self.idle).wait(&watch.counter).await?;

        let plan = {
            let mut rng = rand::thread_rng();
            InteractionPlan::human_like(&mut rng)
        };
        plan.run(&mut PageDriver(page)).await?;

        let html = page.content().await?;
        debug!("Captured {} bytes of rendered HTML", html.len());
        Ok(html)
    }

    /// Render a complete HTML document to an A4 PDF at `output_path`.
    ///
    /// The document is loaded with `set_content`, given time to fetch its
    /// resources (network idle), then printed. Returns the PDF size in bytes.
    pub async fn print_to_pdf(&mut self, html: &str, output_path: &Path) -> Result<u64, DeclutterError> {
        let configured = self.browser_path.clone();
        self.initialize(configured.as_deref()).await?;

        let ctx = self.open_context().await?;
        let result = self.print(&ctx.page, html).await;
        ctx.dispose(self.browser()?).await;
        let bytes = result?;

        write_atomic(output_path, &bytes).await?;
        info!("Wrote {} ({} bytes)", output_path.display(), bytes.len());
        Ok(bytes.len() as u64)
    }

    async fn print(&self, page: &Page, html: &str) -> Result<Vec<u8>, DeclutterError> {
        let watch = NetworkWatch::attach(page).await?;
        page.set_content(html)
            .await
            .map_err(|e| DeclutterError::PdfPrintFailed(e.to_string()))?;
        NetworkIdleDetector::new(self.idle).wait(&watch.counter).await?;
        page.pdf(a4_print_params())
            .await
            .map_err(|e| DeclutterError::PdfPrintFailed(e.to_string()))
    }

    /// Create an isolated context with one configured blank page.
    async fn open_context(&self) -> Result<IsolatedContext, DeclutterError> {
        let browser = self.browser()?;
        let id = browser
            .execute(CreateBrowserContextParams::default())
            .await?
            .result
            .browser_context_id;

        let ctx = match self.open_page(browser, id.clone()).await {
            Ok(page) => IsolatedContext { id, page },
            Err(e) => {
                dispose_context(browser, id).await;
                return Err(e);
            }
        };

        if let Err(e) = self.configure_page(&ctx.page).await {
            ctx.dispose(browser).await;
            return Err(e);
        }
        Ok(ctx)
    }

    async fn open_page(&self, browser: &Browser, id: BrowserContextId) -> Result<Page, DeclutterError> {
        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(id)
            .build()
            .map_err(DeclutterError::Browser)?;
        Ok(browser.new_page(target).await?)
    }

    /// User agent, headers, viewport and the evasion script, all before the
    /// first navigation.
    async fn configure_page(&self, page: &Page) -> Result<(), DeclutterError> {
        let p = &self.profile;

        page.execute(EnableParams::default()).await?;

        let ua = SetUserAgentOverrideParams::builder()
            .user_agent(p.user_agent.clone())
            .accept_language(p.languages.join(","))
            .platform(p.platform.clone())
            .build()
            .map_err(DeclutterError::Browser)?;
        page.execute(ua).await?;

        let headers: serde_json::Map<String, serde_json::Value> = p
            .extra_headers
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(
            serde_json::Value::Object(headers),
        )))
        .await?;

        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(VIEWPORT_WIDTH),
            i64::from(VIEWPORT_HEIGHT),
            1.0,
            false,
        ))
        .await?;

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            p.to_init_script(),
        ))
        .await?;
        Ok(())
    }

    /// Shut Chromium down. Safe to call any number of times.
    pub async fn close(&mut self) -> Result<(), DeclutterError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close command failed: {}", e);
            }
            if let Err(e) = browser.wait().await {
                warn!("Waiting for browser exit failed: {}", e);
            }
            info!("Browser closed");
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        self.state = SessionState::Closed;
        Ok(())
    }
}

#[async_trait]
impl RenderedFetcher for BrowserSession {
    async fn fetch_rendered(&mut self, request: &FetchRequest) -> Result<String, DeclutterError> {
        self.render_page(request).await
    }
}

// ── Isolated context ─────────────────────────────────────────────────────

struct IsolatedContext {
    id: BrowserContextId,
    page: Page,
}

impl IsolatedContext {
    async fn dispose(self, browser: &Browser) {
        if let Err(e) = self.page.close().await {
            debug!("Page close failed: {}", e);
        }
        dispose_context(browser, self.id).await;
    }
}

async fn dispose_context(browser: &Browser, id: BrowserContextId) {
    if let Err(e) = browser.execute(DisposeBrowserContextParams::new(id)).await {
        warn!("Failed to dispose browser context: {}", e);
    }
}

// ── Network tracking ─────────────────────────────────────────────────────

/// Listener tasks feeding an [`InflightCounter`]; aborted on drop.
struct NetworkWatch {
    counter: InflightCounter,
    tasks: Vec<JoinHandle<()>>,
}

impl NetworkWatch {
    async fn attach(page: &Page) -> Result<Self, DeclutterError> {
        let counter = InflightCounter::new();
        let mut sent = page.event_listener::<EventRequestWillBeSent>().await?;
        let mut finished = page.event_listener::<EventLoadingFinished>().await?;
        let mut failed = page.event_listener::<EventLoadingFailed>().await?;

        let c = counter.clone();
        let t1 = tokio::spawn(async move {
            while let Some(ev) = sent.next().await {
                c.record(request_sent(&ev));
            }
        });
        let c = counter.clone();
        let t2 = tokio::spawn(async move {
            while finished.next().await.is_some() {
                c.record(NetworkEvent::RequestFinished);
            }
        });
        let c = counter.clone();
        let t3 = tokio::spawn(async move {
            while failed.next().await.is_some() {
                c.record(NetworkEvent::RequestFailed);
            }
        });

        Ok(Self {
            counter,
            tasks: vec![t1, t2, t3],
        })
    }
}

fn request_sent(ev: &EventRequestWillBeSent) -> NetworkEvent {
    NetworkEvent::RequestSent {
        redirect: ev.redirect_response.is_some(),
    }
}

impl Drop for NetworkWatch {
    fn drop(&mut self) {
        for t in &self.tasks {
            t.abort();
        }
    }
}

// ── Interaction over DevTools ────────────────────────────────────────────

struct PageDriver<'a>(&'a Page);

#[async_trait]
impl InteractionTarget for PageDriver<'_> {
    async fn move_mouse(&mut self, x: f64, y: f64) -> Result<(), DeclutterError> {
        self.0
            .execute(DispatchMouseEventParams::new(
                DispatchMouseEventType::MouseMoved,
                x,
                y,
            ))
            .await?;
        Ok(())
    }

    async fn scroll_by(&mut self, dy: f64) -> Result<(), DeclutterError> {
        self.0.evaluate(format!("window.scrollBy(0, {dy})")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_args_hide_automation() {
        assert!(LAUNCH_ARGS.contains(&"--disable-blink-features=AutomationControlled"));
        assert!(LAUNCH_ARGS.contains(&"--window-size=1920,1080"));
        assert!(!LAUNCH_ARGS.iter().any(|a| a.contains("enable-automation")));
    }

    #[test]
    fn print_params_are_a4_with_50px_margins() {
        let p = a4_print_params();
        assert_eq!(p.paper_width, Some(8.27));
        assert_eq!(p.paper_height, Some(11.69));
        assert_eq!(p.print_background, Some(true));
        let m = p.margin_left.unwrap();
        assert!((m * 96.0 - 50.0).abs() < 1e-9);
        assert_eq!(p.margin_top, p.margin_bottom);
        assert_eq!(p.margin_left, p.margin_right);
    }

    #[test]
    fn new_session_is_uninitialized() {
        let s = BrowserSession::default();
        assert_eq!(s.state(), SessionState::Uninitialized);
        assert!(!s.is_initialized());
    }

    #[tokio::test]
    async fn close_is_idempotent_without_launch() {
        let mut s = BrowserSession::default();
        s.close().await.unwrap();
        assert_eq!(s.state(), SessionState::Closed);
        s.close().await.unwrap();
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn closed_session_refuses_work() {
        let mut s = BrowserSession::default();
        s.close().await.unwrap();

        let err = s.initialize(None).await.unwrap_err();
        assert!(matches!(err, DeclutterError::SessionClosed));

        let err = s
            .render_page(&FetchRequest::new("https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeclutterError::SessionClosed));
    }
}
