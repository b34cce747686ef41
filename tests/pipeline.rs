//! Pipeline integration tests: no browser, no LLM.
//!
//! A `wiremock` server stands in for the web site, and a stub
//! `RenderedFetcher` stands in for Chromium.

use async_trait::async_trait;
use declutter::pipeline::fetch::{FetchOrchestrator, FetchRequest, HttpFetcher, RenderedFetcher};
use declutter::pipeline::filter::filter_markdown;
use declutter::pipeline::markdown::convert_page;
use declutter::{
    normalize_url, DeclutterConfig, DeclutterError, Declutterer, FetchSource, FetchStrategy,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ──────────────────────────────────────────────────────────────────

const RENDERED: &str = "<html><body><article><h1>Rendered</h1></article></body></html>";

const ARTICLE: &str = r#"<html><head><title>Post</title><script>var x = 1;</script></head>
<body>
  <nav><a href="/">Home</a><img src="/logo.png" alt="Site logo"></nav>
  <main>
    <h1>A real post</h1>
    <p>First paragraph with a <a href="/related">relative link</a>.</p>
    <p><img src="/img/chart.png" alt="Chart" width="640" height="480"></p>
    <table>
      <tr><th>Name</th><th>Value</th></tr>
      <tr><td>alpha</td><td>1</td></tr>
    </table>
  </main>
  <footer><img src="/footer-badge.png" alt="badge"></footer>
</body></html>"#;

#[derive(Default)]
struct StubRendered {
    calls: usize,
}

#[async_trait]
impl RenderedFetcher for StubRendered {
    async fn fetch_rendered(&mut self, _r: &FetchRequest) -> Result<String, DeclutterError> {
        self.calls += 1;
        Ok(RENDERED.to_string())
    }
}

async fn serve(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(status).set_body_raw(body.to_string(), "text/html"))
        .mount(&server)
        .await;
    server
}

fn token_count(md: &str) -> usize {
    md.matches("DCL").count()
}

// ── Fetch orchestration ──────────────────────────────────────────────────────

#[tokio::test]
async fn forbidden_falls_back_to_rendered() {
    let server = serve(403, "Forbidden").await;
    let mut orch = FetchOrchestrator::new(HttpFetcher, StubRendered::default());

    let page = orch
        .fetch(&FetchRequest::new(format!("{}/page", server.uri())))
        .await
        .unwrap();

    assert_eq!(page.source, FetchSource::Rendered);
    assert_eq!(page.html, RENDERED);
    assert_eq!(orch.rendered_mut().calls, 1);
}

#[tokio::test]
async fn usable_page_skips_browser() {
    let server = serve(200, ARTICLE).await;
    let mut orch = FetchOrchestrator::new(HttpFetcher, StubRendered::default());

    let page = orch
        .fetch(&FetchRequest::new(format!("{}/page", server.uri())))
        .await
        .unwrap();

    assert_eq!(page.source, FetchSource::Fast);
    assert!(page.html.contains("A real post"));
    assert_eq!(orch.rendered_mut().calls, 0);
}

#[tokio::test]
async fn bot_wall_falls_back() {
    let server = serve(
        200,
        "<html><body><h1>Just a moment</h1><p>Please enable JavaScript to continue.</p></body></html>",
    )
    .await;
    let mut orch = FetchOrchestrator::new(HttpFetcher, StubRendered::default());

    let page = orch
        .fetch(&FetchRequest::new(format!("{}/page", server.uri())))
        .await
        .unwrap();
    assert_eq!(page.source, FetchSource::Rendered);
}

#[tokio::test]
async fn empty_shell_falls_back() {
    let server = serve(200, "<html><body><div id=\"root\"></div></body></html>").await;
    let mut orch = FetchOrchestrator::new(HttpFetcher, StubRendered::default());

    let page = orch
        .fetch(&FetchRequest::new(format!("{}/page", server.uri())))
        .await
        .unwrap();
    assert_eq!(page.source, FetchSource::Rendered);
}

#[tokio::test]
async fn connection_refused_falls_back() {
    // Port 9 (discard) on loopback is closed in test environments.
    let mut orch = FetchOrchestrator::new(HttpFetcher, StubRendered::default());
    let page = orch
        .fetch(&FetchRequest::new("http://127.0.0.1:9/page"))
        .await
        .unwrap();
    assert_eq!(page.source, FetchSource::Rendered);
}

#[tokio::test]
async fn force_render_never_hits_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ARTICLE))
        .expect(0)
        .mount(&server)
        .await;

    let mut orch = FetchOrchestrator::new(HttpFetcher, StubRendered::default());
    let request =
        FetchRequest::new(format!("{}/page", server.uri())).strategy(FetchStrategy::ForceRender);
    let page = orch.fetch(&request).await.unwrap();

    assert_eq!(page.source, FetchSource::Rendered);
    assert_eq!(orch.rendered_mut().calls, 1);
}

// ── Conversion properties ────────────────────────────────────────────────────

#[test]
fn absolute_urls_unchanged() {
    for u in ["https://a.test/x?y=1#z", "http://b.test/"] {
        assert_eq!(normalize_url(u, "host.test"), u);
    }
}

#[test]
fn two_by_two_table_has_two_separator_cells() {
    let html = "<table><tr><td>a</td><td>b</td></tr><tr><td>c</td><td>d</td></tr></table>";
    let page = convert_page(html, "t.test").unwrap();
    let sep = page
        .markdown
        .lines()
        .find(|l| l.contains("---"))
        .expect("separator line");
    assert_eq!(sep.matches("---").count(), 2, "{sep}");
    assert_eq!(page.counts.tables, 1);
}

#[test]
fn chrome_images_removed_content_images_kept() {
    let page = convert_page(ARTICLE, "blog.test").unwrap();
    assert!(!page.markdown.contains("logo.png"), "{}", page.markdown);
    assert!(!page.markdown.contains("footer-badge"), "{}", page.markdown);
    assert!(
        page.markdown
            .contains("![Chart](https://blog.test/img/chart.png)"),
        "{}",
        page.markdown
    );
    assert!(page
        .markdown
        .contains("[relative link](https://blog.test/related)"));
}

#[test]
fn every_token_resolved() {
    let page = convert_page(ARTICLE, "blog.test").unwrap();
    assert!(page.counts.total() >= 3, "{:?}", page.counts);
    assert_eq!(token_count(&page.markdown), 0, "{}", page.markdown);
}

// ── Filter properties ────────────────────────────────────────────────────────

#[test]
fn webp_query_kept_pdf_dropped() {
    let md = "![a](https://cdn.test/i?format=webp)\n\n![b](https://cdn.test/file.pdf)\n";
    let out = filter_markdown(md);
    assert!(out.contains("format=webp"));
    assert!(!out.contains("file.pdf"));
}

#[test]
fn trailing_images_heading() {
    assert!(!filter_markdown("Body\n\n## Images\n\n\n").contains("## Images"));
    assert!(filter_markdown("Body\n\n## Images\n\n![x](https://a.test/x.jpg)\n")
        .contains("## Images"));
}

// ── Whole pipeline without LLM ───────────────────────────────────────────────

#[tokio::test]
async fn raw_declutter_writes_site_folder() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blog/first-post"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ARTICLE, "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = DeclutterConfig::builder().skip_llm(true).build().unwrap();
    let mut d = Declutterer::new(config);

    let url = format!("{}/blog/first-post", server.uri());
    let (out, files) = d.declutter_to_dir(&url, dir.path()).await.unwrap();
    d.close().await.unwrap();

    assert_eq!(out.source, FetchSource::Fast);
    assert!(!out.stats.llm_ran());
    assert!(!d.session().is_initialized());

    let folder = dir.path().join("Decluttered").join("127-0-0-1");
    assert_eq!(files.markdown, folder.join("first-post.md"));
    let md = std::fs::read_to_string(&files.markdown).unwrap();
    assert!(md.contains("# A real post"), "{md}");
    assert!(md.contains("| Name | Value |"), "{md}");

    let meta = std::fs::read_to_string(&files.metadata).unwrap();
    assert!(meta.contains("| Source | fast |"), "{meta}");
    assert!(!meta.contains("Provider"));
}

#[tokio::test]
async fn one_declutterer_serves_several_urls() {
    let server = MockServer::start().await;
    for route in ["/a", "/b"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(ARTICLE, "text/html"))
            .expect(1)
            .mount(&server)
            .await;
    }

    let config = DeclutterConfig::builder().skip_llm(true).build().unwrap();
    let mut d = Declutterer::new(config);
    for route in ["/a", "/b"] {
        let out = d.declutter(&format!("{}{route}", server.uri())).await.unwrap();
        assert_eq!(out.source, FetchSource::Fast);
        assert!(out.markdown.contains("# A real post"));
    }
    d.close().await.unwrap();
    d.close().await.unwrap();
}
