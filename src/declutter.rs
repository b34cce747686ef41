//! Entry points: URL in, decluttered Markdown out.
//!
//! [`Declutterer`] owns the fetchers and a lazily launched
//! [`BrowserSession`], so processing several URLs pays the Chromium start-up
//! cost at most once. The free functions build a throwaway `Declutterer`,
//! run it, and close the browser.

use crate::config::DeclutterConfig;
use crate::error::DeclutterError;
use crate::output::{self, DeclutterOutput, DeclutterStats, WrittenFiles};
use crate::pipeline::browser::BrowserSession;
use crate::pipeline::fetch::{FetchOrchestrator, FetchRequest, FetchSource, HttpFetcher};
use crate::pipeline::markdown::{self, FragmentCounts};
use crate::pipeline::{filter, input, llm, postprocess};
use chrono::Local;
use edgequake_llm::{LLMProvider, ProviderFactory};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Markdown straight from the converter, before any LLM pass.
#[derive(Debug, Clone, Serialize)]
pub struct PageMarkdown {
    pub url: String,
    pub hostname: String,
    pub source: FetchSource,
    pub markdown: String,
    pub fragments: FragmentCounts,
    pub fetch_duration_ms: u64,
}

/// Which provider/model answered, for the metadata table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
}

/// Reusable pipeline with one browser session.
pub struct Declutterer {
    config: DeclutterConfig,
    fast: HttpFetcher,
    session: BrowserSession,
    provider: Option<(Arc<dyn LLMProvider>, ProviderInfo)>,
}

impl Declutterer {
    pub fn new(config: DeclutterConfig) -> Self {
        let session = BrowserSession::new(&config);
        Self {
            config,
            fast: HttpFetcher,
            session,
            provider: None,
        }
    }

    pub fn config(&self) -> &DeclutterConfig {
        &self.config
    }

    pub fn session(&self) -> &BrowserSession {
        &self.session
    }

    /// Fetch `url` and convert it to Markdown. No LLM call; image references
    /// are filtered.
    pub async fn fetch_markdown(&mut self, url: &str) -> Result<PageMarkdown, DeclutterError> {
        let mut page = self.fetch_converted(url).await?;
        page.markdown = filter::filter_markdown(&page.markdown);
        Ok(page)
    }

    async fn fetch_converted(&mut self, url: &str) -> Result<PageMarkdown, DeclutterError> {
        let start = Instant::now();

        // ── Step 1: Validate URL ─────────────────────────────────────────
        let target = input::resolve_url(url)?;

        // ── Step 2: Fetch (fast, then rendered) ──────────────────────────
        let request = FetchRequest::from_config(target.as_str(), &self.config);
        let mut orchestrator = FetchOrchestrator::new(self.fast, &mut self.session)
            .with_progress(self.config.progress_callback.clone());
        let fetched = orchestrator.fetch(&request).await?;
        let fetch_duration_ms = start.elapsed().as_millis() as u64;

        // ── Step 3: HTML → Markdown ──────────────────────────────────────
        let converted = markdown::convert_page(&fetched.html, target.host())?;
        info!(
            "Converted {} to {} bytes of Markdown ({} protected fragments)",
            target,
            converted.markdown.len(),
            converted.counts.total()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_converted(converted.markdown.len());
        }

        Ok(PageMarkdown {
            url: target.to_string(),
            hostname: converted.hostname,
            source: fetched.source,
            markdown: converted.markdown,
            fragments: converted.counts,
            fetch_duration_ms,
        })
    }

    /// Full pipeline: fetch, convert, LLM declutter, tidy, filter.
    ///
    /// With `skip_llm` the LLM and tidy steps are skipped.
    pub async fn declutter(&mut self, url: &str) -> Result<DeclutterOutput, DeclutterError> {
        let total_start = Instant::now();
        let page = self.fetch_converted(url).await?;

        let mut stats = DeclutterStats {
            fetch_duration_ms: page.fetch_duration_ms,
            ..Default::default()
        };

        // ── Step 4: LLM declutter ────────────────────────────────────────
        let decluttered = if self.config.skip_llm {
            debug!("LLM stage skipped");
            page.markdown
        } else {
            let (provider, info) = self.provider()?;
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_llm_start(page.markdown.len());
            }
            let out = llm::declutter_markdown(&provider, &page.markdown, &page.hostname, &self.config)
                .await?;
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_llm_complete(out.input_tokens, out.output_tokens);
            }
            stats.provider = Some(info.name);
            stats.model = Some(info.model);
            stats.input_tokens = out.input_tokens;
            stats.output_tokens = out.output_tokens;
            stats.llm_retries = out.retries;
            stats.llm_duration_ms = out.duration_ms;

            // ── Step 5: Tidy ─────────────────────────────────────────────
            postprocess::tidy_markdown(&out.markdown)
        };

        // ── Step 6: Filter image references ──────────────────────────────
        let markdown = filter::filter_markdown(&decluttered);

        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
        info!(
            "Decluttered {}: {} bytes, {}ms total",
            page.url,
            markdown.len(),
            stats.total_duration_ms
        );

        Ok(DeclutterOutput {
            url: page.url,
            hostname: page.hostname,
            source: page.source,
            markdown,
            fragments: page.fragments,
            stats,
            fetched_at: Local::now(),
        })
    }

    /// [`Self::declutter`], then write the Markdown and metadata files under
    /// `dir`.
    pub async fn declutter_to_dir(
        &mut self,
        url: &str,
        dir: &Path,
    ) -> Result<(DeclutterOutput, WrittenFiles), DeclutterError> {
        let out = self.declutter(url).await?;
        let files = output::write_outputs(dir, &out).await?;
        info!("Wrote {}", files.markdown.display());
        Ok((out, files))
    }

    /// Print an HTML document to an A4 PDF with this instance's browser.
    pub async fn print_pdf(&mut self, html: &str, pdf_path: &Path) -> Result<u64, DeclutterError> {
        self.session.print_to_pdf(html, pdf_path).await
    }

    /// Shut the browser down if it was launched.
    pub async fn close(&mut self) -> Result<(), DeclutterError> {
        self.session.close().await
    }

    fn provider(&mut self) -> Result<(Arc<dyn LLMProvider>, ProviderInfo), DeclutterError> {
        if let Some((p, info)) = &self.provider {
            return Ok((Arc::clone(p), info.clone()));
        }
        let resolved = resolve_provider(&self.config)?;
        info!("Using LLM provider {} ({})", resolved.1.name, resolved.1.model);
        self.provider = Some((Arc::clone(&resolved.0), resolved.1.clone()));
        Ok(resolved)
    }
}

// ── One-shot entry points ────────────────────────────────────────────────

/// Fetch and convert one URL without the LLM stage.
pub async fn fetch_markdown(
    url: impl AsRef<str>,
    config: &DeclutterConfig,
) -> Result<PageMarkdown, DeclutterError> {
    let mut d = Declutterer::new(config.clone());
    let result = d.fetch_markdown(url.as_ref()).await;
    d.close().await?;
    result
}

/// Declutter one URL.
///
/// # Errors
/// Invalid URL, an unusable rendered fetch, a missing LLM provider, or an
/// LLM call that fails after all retries.
pub async fn declutter(
    url: impl AsRef<str>,
    config: &DeclutterConfig,
) -> Result<DeclutterOutput, DeclutterError> {
    let mut d = Declutterer::new(config.clone());
    let result = d.declutter(url.as_ref()).await;
    d.close().await?;
    result
}

/// Declutter one URL and write the result files under `dir`.
pub async fn declutter_to_dir(
    url: impl AsRef<str>,
    dir: impl AsRef<Path>,
    config: &DeclutterConfig,
) -> Result<(DeclutterOutput, WrittenFiles), DeclutterError> {
    let mut d = Declutterer::new(config.clone());
    let result = d.declutter_to_dir(url.as_ref(), dir.as_ref()).await;
    d.close().await?;
    result
}

/// Synchronous wrapper around [`declutter`].
///
/// Creates a temporary tokio runtime internally.
pub fn declutter_sync(
    url: impl AsRef<str>,
    config: &DeclutterConfig,
) -> Result<DeclutterOutput, DeclutterError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DeclutterError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(declutter(url, config))
}

/// Print an HTML document to an A4 PDF.
pub async fn print_pdf(
    html: &str,
    pdf_path: impl AsRef<Path>,
    config: &DeclutterConfig,
) -> Result<u64, DeclutterError> {
    let mut d = Declutterer::new(config.clone());
    let result = d.print_pdf(html, pdf_path.as_ref()).await;
    d.close().await?;
    result
}

/// Read `html_path` and print it to `pdf_path`.
pub async fn print_pdf_file(
    html_path: impl AsRef<Path>,
    pdf_path: impl AsRef<Path>,
    config: &DeclutterConfig,
) -> Result<u64, DeclutterError> {
    let html_path = html_path.as_ref();
    let html = tokio::fs::read_to_string(html_path)
        .await
        .map_err(|source| DeclutterError::InputReadFailed {
            path: html_path.to_path_buf(),
            source,
        })?;
    print_pdf(&html, pdf_path, config).await
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_provider(name: &str, model: &str) -> Result<(Arc<dyn LLMProvider>, ProviderInfo), DeclutterError> {
    let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        DeclutterError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok((
        provider,
        ProviderInfo {
            name: name.to_string(),
            model: model.to_string(),
        },
    ))
}

/// Resolve the LLM provider, most specific first:
///
/// 1. `config.provider`: a pre-built provider, used as-is
/// 2. `config.provider_name` (+ `config.model`)
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. `OPENAI_API_KEY` present → OpenAI
/// 5. whatever [`ProviderFactory::from_env`] detects
pub fn resolve_provider(
    config: &DeclutterConfig,
) -> Result<(Arc<dyn LLMProvider>, ProviderInfo), DeclutterError> {
    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref provider) = config.provider {
        return Ok((
            Arc::clone(provider),
            ProviderInfo {
                name: config.provider_name.clone().unwrap_or_else(|| "custom".into()),
                model: model.to_string(),
            },
        ));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DeclutterError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok((
        llm_provider,
        ProviderInfo {
            name: "auto".into(),
            model: config.model.clone().unwrap_or_else(|| "auto".into()),
        },
    ))
}
