//! # declutter
//!
//! Turn a web page into clean Markdown: fetch it (plain HTTP first, headless
//! Chromium when that fails), convert the markup with images, links and
//! tables preserved, then let an LLM strip navigation, banners and other
//! page furniture.
//!
//! ## Pipeline Overview
//!
//! ```text
//! URL
//!  │
//!  ├─ 1. Input     validate, default the scheme to https
//!  ├─ 2. Fetch     reqwest GET; on a block page or thin shell, render in Chromium
//!  ├─ 3. Convert   HTML → Markdown (placeholder-protected images/links/tables)
//!  ├─ 4. LLM       keep only the main content (skippable)
//!  ├─ 5. Tidy      deterministic cleanup of the model's answer
//!  ├─ 6. Filter    drop image references that are not images
//!  └─ 7. Output    Markdown + metadata table under Decluttered/<site>/
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use declutter::DeclutterConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = DeclutterConfig::default();
//!     let output = declutter::declutter("https://example.com/blog/post", &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("fetched via {}, {} tokens", output.source, output.stats.total_tokens());
//!     Ok(())
//! }
//! ```
//!
//! Markdown without the LLM stage:
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), declutter::DeclutterError> {
//! let page = declutter::fetch_markdown("example.com", &Default::default()).await?;
//! println!("{}", page.markdown);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `declutter` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! A Chromium or Chrome install is needed only for the rendered fallback and
//! for PDF printing.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod declutter;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DeclutterConfig, DeclutterConfigBuilder, FetchStrategy, IdleSettings};
pub use declutter::{
    declutter, declutter_sync, declutter_to_dir, fetch_markdown, print_pdf, print_pdf_file,
    resolve_provider, Declutterer, PageMarkdown, ProviderInfo,
};
pub use error::{DeclutterError, FastFetchRejection};
pub use output::{DeclutterOutput, DeclutterStats, WrittenFiles};
pub use pipeline::browser::{BrowserSession, SessionState};
pub use pipeline::fetch::{FetchOrchestrator, FetchRequest, FetchSource, FetchedPage};
pub use pipeline::markdown::{html_to_markdown, normalize_url, ConvertedPage};
pub use progress::{DeclutterProgressCallback, NoopProgressCallback, ProgressCallback};
