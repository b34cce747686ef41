//! Error types for the declutter library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DeclutterError`]: **Fatal**: the page cannot be produced at all
//!   (bad URL, browser would not start, network never went idle, provider not
//!   configured). Returned as `Err(DeclutterError)` from every entry point.
//!
//! * [`FastFetchRejection`]: **Non-fatal**: the plain HTTP fetch failed or
//!   returned something that does not look like a real page. It never leaves
//!   [`crate::pipeline::fetch::FetchOrchestrator`]; its only effect is a single
//!   fallback to the rendered path.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the declutter library.
#[derive(Debug, Error)]
pub enum DeclutterError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input string is not an absolute http(s) URL with a host.
    #[error("Invalid URL '{input}': {reason}")]
    InvalidUrl { input: String, reason: String },

    // ── Fetch errors ──────────────────────────────────────────────────────
    /// A rendered fetch did not reach its goal before the deadline.
    #[error("Timed out after {secs}s waiting for {what}\nThe page kept loading resources; try again or use a faster network.")]
    FetchTimeout { what: String, secs: u64 },

    /// Chromium could not be started.
    #[error(
        "Failed to launch headless browser: {0}\n\n\
Install Chrome or Chromium, or point at an existing binary with\n\
  --browser-path /path/to/chrome   (or DECLUTTER_BROWSER_PATH)\n"
    )]
    BrowserLaunchFailed(String),

    /// The browser reported a navigation error for the target URL.
    #[error("Navigation to '{url}' failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    /// A DevTools command failed mid-session.
    #[error("Browser error: {0}")]
    Browser(String),

    /// The session was used after `close()`.
    #[error("Browser session is closed")]
    SessionClosed,

    /// Printing an HTML document to PDF failed.
    #[error("PDF printing failed: {0}")]
    PdfPrintFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API failed on every attempt.
    #[error("LLM API error after {retries} retries: {message}")]
    LlmApiError { retries: u32, message: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not read an input file (HTML for PDF printing).
    #[error("Failed to read '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<chromiumoxide::error::CdpError> for DeclutterError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        DeclutterError::Browser(e.to_string())
    }
}

/// Why a fast (plain HTTP) fetch was not good enough.
///
/// Logged at `warn` and then discarded: the orchestrator falls back to the
/// rendered path exactly once.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FastFetchRejection {
    /// Server answered with a 4xx/5xx status.
    #[error("HTTP status {status}")]
    Status { status: u16 },

    /// Connection, TLS or timeout failure before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be read to the end.
    #[error("body read interrupted: {0}")]
    Interrupted(String),

    /// The body matched a known bot-wall phrase.
    #[error("bot wall detected ('{phrase}')")]
    BotWall { phrase: String },

    /// Too little visible text and no main/article/h1 landmark.
    #[error("low signal: {visible_chars} visible chars, no content landmark")]
    LowSignal { visible_chars: usize },
}
