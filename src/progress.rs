//! Progress-callback trait for per-stage pipeline events.
//!
//! Inject an [`Arc<dyn DeclutterProgressCallback>`] via
//! [`crate::config::DeclutterConfigBuilder::progress_callback`] to receive
//! events as a page moves through fetch, conversion and the LLM stage.
//!
//! # Example
//!
//! ```rust
//! use declutter::{DeclutterConfig, DeclutterProgressCallback};
//! use std::sync::Arc;
//!
//! struct Log;
//!
//! impl DeclutterProgressCallback for Log {
//!     fn on_fallback(&self, url: &str, reason: &str) {
//!         eprintln!("{url}: rendering in browser ({reason})");
//!     }
//! }
//!
//! let config = DeclutterConfig::builder()
//!     .progress_callback(Arc::new(Log) as Arc<dyn DeclutterProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::fetch::FetchSource;
use std::sync::Arc;

/// Called by the pipeline as it processes one page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait DeclutterProgressCallback: Send + Sync {
    /// Called once before the first fetch attempt.
    fn on_fetch_start(&self, url: &str, force_render: bool) {
        let _ = (url, force_render);
    }

    /// Called when the fast fetch was rejected and the browser takes over.
    fn on_fallback(&self, url: &str, reason: &str) {
        let _ = (url, reason);
    }

    /// Called when raw markup is available.
    ///
    /// # Arguments
    /// * `source`   : which path produced the markup
    /// * `html_len` : byte length of the markup
    fn on_fetch_complete(&self, url: &str, source: FetchSource, html_len: usize) {
        let _ = (url, source, html_len);
    }

    /// Called after HTML → Markdown conversion.
    fn on_converted(&self, markdown_len: usize) {
        let _ = markdown_len;
    }

    /// Called just before the LLM request is sent.
    fn on_llm_start(&self, input_len: usize) {
        let _ = input_len;
    }

    /// Called when the LLM stage returns.
    fn on_llm_complete(&self, input_tokens: usize, output_tokens: usize) {
        let _ = (input_tokens, output_tokens);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl DeclutterProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DeclutterConfig`].
pub type ProgressCallback = Arc<dyn DeclutterProgressCallback>;
