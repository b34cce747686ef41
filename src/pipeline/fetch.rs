//! Fetch orchestration: fast HTTP first, headless browser as fallback.
//!
//! ```text
//!            FastPreferred                      ForceRender
//!                 │                                  │
//!        FastFetcher::fetch_fast                     │
//!                 │                                  │
//!      ┌── usable? ──┐                               │
//!     yes            no / error ── warn ──▶ RenderedFetcher::fetch_rendered
//!      │                                             │
//!  FetchedPage { Fast }                    FetchedPage { Rendered }
//! ```
//!
//! Both paths sit behind traits so the orchestrator can be driven by stub
//! fetchers in tests. A rejected fast fetch falls back exactly once; a failed
//! rendered fetch is final.

use crate::config::{DeclutterConfig, FetchStrategy};
use crate::error::{DeclutterError, FastFetchRejection};
use crate::pipeline::evasion::{ACCEPT_LANGUAGE, USER_AGENT};
use crate::progress::ProgressCallback;
use async_trait::async_trait;
use dom_query::Document;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE as ACCEPT_LANGUAGE_HEADER, USER_AGENT as USER_AGENT_HEADER};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Phrases that mark an interstitial instead of the requested page.
const BOT_WALL_PHRASES: &[&str] = &[
    "enable javascript",
    "access denied",
    "bot detection",
    "captcha",
    "are you human",
];

const NON_CONTENT: &str = "script, style, iframe, object, embed, noscript";

/// Which path produced the markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchSource {
    Fast,
    Rendered,
}

impl std::fmt::Display for FetchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchSource::Fast => f.write_str("fast"),
            FetchSource::Rendered => f.write_str("rendered"),
        }
    }
}

/// One fetch, fully specified. Immutable for the duration of the call.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub strategy: FetchStrategy,
    pub browser_path: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub navigation_timeout: Duration,
    pub min_visible_text: usize,
}

impl FetchRequest {
    /// A fast-preferred request with default timeouts.
    pub fn new(url: impl Into<String>) -> Self {
        Self::from_config(url, &DeclutterConfig::default())
    }

    pub fn from_config(url: impl Into<String>, config: &DeclutterConfig) -> Self {
        Self {
            url: url.into(),
            strategy: config.strategy,
            browser_path: config.browser_path.clone(),
            connect_timeout: config.connect_timeout(),
            navigation_timeout: config.navigation_timeout(),
            min_visible_text: config.min_visible_text,
        }
    }

    pub fn strategy(mut self, strategy: FetchStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Raw markup plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub url: String,
    pub html: String,
    pub source: FetchSource,
}

// ── Seams ────────────────────────────────────────────────────────────────

/// Plain HTTP retrieval. Failures are non-fatal rejections.
#[async_trait]
pub trait FastFetcher: Send + Sync {
    async fn fetch_fast(&self, request: &FetchRequest) -> Result<String, FastFetchRejection>;
}

/// Browser-rendered retrieval. Failures are fatal for the request.
#[async_trait]
pub trait RenderedFetcher: Send {
    async fn fetch_rendered(&mut self, request: &FetchRequest) -> Result<String, DeclutterError>;
}

#[async_trait]
impl<T: RenderedFetcher + ?Sized> RenderedFetcher for &mut T {
    async fn fetch_rendered(&mut self, request: &FetchRequest) -> Result<String, DeclutterError> {
        (**self).fetch_rendered(request).await
    }
}

// ── Fast path ────────────────────────────────────────────────────────────

/// `reqwest` GET with browser-like headers and normal redirect following.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFetcher;

#[async_trait]
impl FastFetcher for HttpFetcher {
    async fn fetch_fast(&self, request: &FetchRequest) -> Result<String, FastFetchRejection> {
        let client = reqwest::Client::builder()
            .connect_timeout(request.connect_timeout)
            .timeout(request.navigation_timeout)
            .build()
            .map_err(|e| FastFetchRejection::Network(e.to_string()))?;

        let response = client
            .get(&request.url)
            .header(USER_AGENT_HEADER, USER_AGENT)
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(ACCEPT_LANGUAGE_HEADER, ACCEPT_LANGUAGE)
            .send()
            .await
            .map_err(|e| FastFetchRejection::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(FastFetchRejection::Status {
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FastFetchRejection::Interrupted(e.to_string()))
    }
}

/// Decide whether fast-fetched markup is the real page.
///
/// Rejects empty bodies and bot walls. Otherwise accepts when the visible
/// body text (scripts, styles and embeds removed) reaches `min_visible_text`
/// chars, or when a `main`, `article` or `h1` element exists.
pub fn is_likely_usable_html(html: &str, min_visible_text: usize) -> Result<(), FastFetchRejection> {
    if html.trim().is_empty() {
        return Err(FastFetchRejection::LowSignal { visible_chars: 0 });
    }

    let lower = html.to_lowercase();
    if let Some(phrase) = BOT_WALL_PHRASES.iter().find(|p| lower.contains(*p)) {
        return Err(FastFetchRejection::BotWall {
            phrase: (*phrase).to_string(),
        });
    }

    let doc = Document::from(html);
    doc.select(NON_CONTENT).remove();
    let visible_chars = doc.select("body").text().trim().chars().count();
    let has_landmark = doc.select("main, article, h1").length() > 0;

    if visible_chars >= min_visible_text || has_landmark {
        Ok(())
    } else {
        Err(FastFetchRejection::LowSignal { visible_chars })
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────

/// Chooses between the fast and rendered paths for each request.
pub struct FetchOrchestrator<F, R> {
    fast: F,
    rendered: R,
    progress: Option<ProgressCallback>,
}

impl<F: FastFetcher, R: RenderedFetcher> FetchOrchestrator<F, R> {
    pub fn new(fast: F, rendered: R) -> Self {
        Self {
            fast,
            rendered,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Fetch `request.url` according to its strategy.
    ///
    /// # Errors
    /// Only rendered-path failures propagate; fast-path problems trigger the
    /// fallback instead.
    pub async fn fetch(&mut self, request: &FetchRequest) -> Result<FetchedPage, DeclutterError> {
        let force_render = request.strategy == FetchStrategy::ForceRender;
        info!(
            "Fetching {} ({})",
            request.url,
            if force_render { "render" } else { "fast first" }
        );
        if let Some(ref cb) = self.progress {
            cb.on_fetch_start(&request.url, force_render);
        }

        if !force_render {
            match self.try_fast(request).await {
                Ok(html) => return Ok(self.finish(request, html, FetchSource::Fast)),
                Err(rejection) => {
                    warn!(
                        "Fast fetch of {} rejected ({}); falling back to headless browser",
                        request.url, rejection
                    );
                    if let Some(ref cb) = self.progress {
                        cb.on_fallback(&request.url, &rejection.to_string());
                    }
                }
            }
        }

        let html = self.rendered.fetch_rendered(request).await?;
        Ok(self.finish(request, html, FetchSource::Rendered))
    }

    async fn try_fast(&self, request: &FetchRequest) -> Result<String, FastFetchRejection> {
        let html = self.fast.fetch_fast(request).await?;
        is_likely_usable_html(&html, request.min_visible_text)?;
        Ok(html)
    }

    fn finish(&self, request: &FetchRequest, html: String, source: FetchSource) -> FetchedPage {
        debug!("Fetched {} bytes from {} via {}", html.len(), request.url, source);
        if let Some(ref cb) = self.progress {
            cb.on_fetch_complete(&request.url, source, html.len());
        }
        FetchedPage {
            url: request.url.clone(),
            html,
            source,
        }
    }

    pub fn rendered_mut(&mut self) -> &mut R {
        &mut self.rendered
    }

    pub fn into_parts(self) -> (F, R) {
        (self.fast, self.rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const ARTICLE: &str =
        "<html><body><article><h1>Hello</h1><p>Real content.</p></article></body></html>";

    struct StubFast(Result<String, FastFetchRejection>);

    #[async_trait]
    impl FastFetcher for StubFast {
        async fn fetch_fast(&self, _r: &FetchRequest) -> Result<String, FastFetchRejection> {
            self.0.clone()
        }
    }

    #[derive(Clone, Default)]
    struct StubRendered {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl RenderedFetcher for StubRendered {
        async fn fetch_rendered(&mut self, _r: &FetchRequest) -> Result<String, DeclutterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DeclutterError::NavigationFailed {
                    url: "x".into(),
                    reason: "net::ERR_NAME_NOT_RESOLVED".into(),
                })
            } else {
                Ok("<html><body><main>rendered</main></body></html>".into())
            }
        }
    }

    fn request() -> FetchRequest {
        FetchRequest::new("https://example.com/a")
    }

    // ── usability ────────────────────────────────────────────────────────

    #[test]
    fn landmark_makes_short_page_usable() {
        assert!(is_likely_usable_html(ARTICLE, 400).is_ok());
    }

    #[test]
    fn long_text_without_landmark_is_usable() {
        let html = format!("<body><div>{}</div></body>", "word ".repeat(100));
        assert!(is_likely_usable_html(&html, 400).is_ok());
    }

    #[test]
    fn script_text_does_not_count() {
        let html = format!(
            "<body><div>hi</div><script>{}</script></body>",
            "x".repeat(2000)
        );
        match is_likely_usable_html(&html, 400) {
            Err(FastFetchRejection::LowSignal { visible_chars }) => assert_eq!(visible_chars, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bot_wall_rejected_even_with_landmark() {
        let html = "<body><h1>Are you human?</h1><p>Solve the CAPTCHA</p></body>";
        assert!(matches!(
            is_likely_usable_html(html, 400),
            Err(FastFetchRejection::BotWall { .. })
        ));
    }

    #[test]
    fn empty_body_rejected() {
        assert!(is_likely_usable_html("  ", 400).is_err());
    }

    // ── orchestration ────────────────────────────────────────────────────

    #[tokio::test]
    async fn usable_fast_result_skips_browser() {
        let rendered = StubRendered::default();
        let calls = Arc::clone(&rendered.calls);
        let mut orch = FetchOrchestrator::new(StubFast(Ok(ARTICLE.into())), rendered);

        let page = orch.fetch(&request()).await.unwrap();
        assert_eq!(page.source, FetchSource::Fast);
        assert_eq!(page.html, ARTICLE);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn status_rejection_falls_back_once() {
        let rendered = StubRendered::default();
        let calls = Arc::clone(&rendered.calls);
        let mut orch = FetchOrchestrator::new(
            StubFast(Err(FastFetchRejection::Status { status: 403 })),
            rendered,
        );

        let page = orch.fetch(&request()).await.unwrap();
        assert_eq!(page.source, FetchSource::Rendered);
        assert!(page.html.contains("rendered"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn low_signal_falls_back() {
        let mut orch = FetchOrchestrator::new(
            StubFast(Ok("<body><div>tiny</div></body>".into())),
            StubRendered::default(),
        );
        let page = orch.fetch(&request()).await.unwrap();
        assert_eq!(page.source, FetchSource::Rendered);
    }

    #[tokio::test]
    async fn force_render_never_calls_fast() {
        struct PanicFast;
        #[async_trait]
        impl FastFetcher for PanicFast {
            async fn fetch_fast(&self, _r: &FetchRequest) -> Result<String, FastFetchRejection> {
                panic!("fast path must not run");
            }
        }

        let mut orch = FetchOrchestrator::new(PanicFast, StubRendered::default());
        let req = request().strategy(FetchStrategy::ForceRender);
        let page = orch.fetch(&req).await.unwrap();
        assert_eq!(page.source, FetchSource::Rendered);
    }

    #[tokio::test]
    async fn rendered_failure_is_final() {
        let rendered = StubRendered {
            fail: true,
            ..Default::default()
        };
        let calls = Arc::clone(&rendered.calls);
        let mut orch = FetchOrchestrator::new(
            StubFast(Err(FastFetchRejection::Network("refused".into()))),
            rendered,
        );

        let err = orch.fetch(&request()).await.unwrap_err();
        assert!(matches!(err, DeclutterError::NavigationFailed { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn borrowed_renderer_works() {
        let mut rendered = StubRendered::default();
        {
            let mut orch = FetchOrchestrator::new(
                StubFast(Err(FastFetchRejection::Status { status: 500 })),
                &mut rendered,
            );
            orch.fetch(&request()).await.unwrap();
        }
        assert_eq!(rendered.calls.load(Ordering::SeqCst), 1);
    }
}
