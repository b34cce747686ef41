//! Configuration types for fetching and decluttering a page.
//!
//! All pipeline behaviour is controlled through [`DeclutterConfig`], built via
//! its [`DeclutterConfigBuilder`]. Fetch timeouts, idle detection and LLM
//! settings live in one struct so a single value can be shared across calls.

use crate::error::DeclutterError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for fetching a page and turning it into Markdown.
///
/// # Example
/// ```rust
/// use declutter::{DeclutterConfig, FetchStrategy};
///
/// let config = DeclutterConfig::builder()
///     .strategy(FetchStrategy::ForceRender)
///     .model("gpt-4.1-nano")
///     .max_tokens(8000)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct DeclutterConfig {
    /// Fast-then-rendered (default) or rendered only.
    pub strategy: FetchStrategy,

    /// Explicit Chrome/Chromium executable. If None, chromiumoxide auto-detects.
    pub browser_path: Option<PathBuf>,

    /// Connect timeout for the fast HTTP fetch, in seconds. Default: 10.
    pub connect_timeout_secs: u64,

    /// Navigation timeout for the rendered fetch, in seconds. Default: 30.
    ///
    /// Also used as the per-command DevTools request timeout.
    pub navigation_timeout_secs: u64,

    /// Network-idle detection parameters for the rendered fetch.
    pub idle: IdleSettings,

    /// Minimum visible body text (chars) for a fast fetch to count as usable
    /// when no `main`/`article`/`h1` landmark exists. Default: 400.
    pub min_visible_text: usize,

    /// LLM model identifier, e.g. "gpt-4.1-nano".
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, uses `ProviderFactory::from_env()`.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate. Default: 10 000.
    pub max_tokens: usize,

    /// Retry attempts on a failed LLM call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom system prompt. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Skip the LLM stage and return the filtered converter output. Default: false.
    pub skip_llm: bool,

    /// Optional progress callback for per-stage events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DeclutterConfig {
    fn default() -> Self {
        Self {
            strategy: FetchStrategy::default(),
            browser_path: None,
            connect_timeout_secs: 10,
            navigation_timeout_secs: 30,
            idle: IdleSettings::default(),
            min_visible_text: 400,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 10_000,
            max_retries: 2,
            retry_backoff_ms: 500,
            system_prompt: None,
            skip_llm: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DeclutterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclutterConfig")
            .field("strategy", &self.strategy)
            .field("browser_path", &self.browser_path)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("navigation_timeout_secs", &self.navigation_timeout_secs)
            .field("idle", &self.idle)
            .field("min_visible_text", &self.min_visible_text)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("skip_llm", &self.skip_llm)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn DeclutterProgressCallback>"),
            )
            .finish()
    }
}

impl DeclutterConfig {
    /// Create a new builder for `DeclutterConfig`.
    pub fn builder() -> DeclutterConfigBuilder {
        DeclutterConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

/// Builder for [`DeclutterConfig`].
#[derive(Debug)]
pub struct DeclutterConfigBuilder {
    config: DeclutterConfig,
}

impl DeclutterConfigBuilder {
    pub fn strategy(mut self, strategy: FetchStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Shorthand for `strategy(FetchStrategy::ForceRender)` when `true`.
    pub fn force_render(mut self, v: bool) -> Self {
        self.config.strategy = if v {
            FetchStrategy::ForceRender
        } else {
            FetchStrategy::FastPreferred
        };
        self
    }

    pub fn browser_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser_path = Some(path.into());
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    pub fn navigation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.navigation_timeout_secs = secs;
        self
    }

    pub fn idle(mut self, idle: IdleSettings) -> Self {
        self.config.idle = idle;
        self
    }

    pub fn min_visible_text(mut self, chars: usize) -> Self {
        self.config.min_visible_text = chars;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn skip_llm(mut self, v: bool) -> Self {
        self.config.skip_llm = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DeclutterConfig, DeclutterError> {
        let c = &self.config;
        if c.connect_timeout_secs == 0 || c.navigation_timeout_secs == 0 {
            return Err(DeclutterError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(DeclutterError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        c.idle.validate()?;
        Ok(self.config)
    }
}

// ── Enums & sub-settings ─────────────────────────────────────────────────

/// Which fetch path(s) a request may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FetchStrategy {
    /// Plain HTTP first; fall back to the rendered fetch once if the result
    /// is unusable. (default)
    #[default]
    FastPreferred,
    /// Skip the fast path; always render in the headless browser.
    ForceRender,
}

/// Parameters of the network-idle wait that follows navigation.
///
/// The page is idle once at most `max_inflight` requests have been pending
/// for an uninterrupted `idle_window_ms`. Failing that within `timeout_secs`
/// is a [`DeclutterError::FetchTimeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleSettings {
    pub poll_interval_ms: u64,
    pub idle_window_ms: u64,
    pub max_inflight: usize,
    pub timeout_secs: u64,
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            idle_window_ms: 500,
            max_inflight: 1,
            timeout_secs: 30,
        }
    }
}

impl IdleSettings {
    pub fn validate(&self) -> Result<(), DeclutterError> {
        if self.poll_interval_ms == 0 {
            return Err(DeclutterError::InvalidConfig(
                "idle poll interval must be ≥ 1 ms".into(),
            ));
        }
        if self.idle_window_ms < self.poll_interval_ms {
            return Err(DeclutterError::InvalidConfig(format!(
                "idle window ({} ms) must be ≥ poll interval ({} ms)",
                self.idle_window_ms, self.poll_interval_ms
            )));
        }
        if self.timeout_secs == 0 {
            return Err(DeclutterError::InvalidConfig(
                "idle timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(())
    }
}
