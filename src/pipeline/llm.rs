//! LLM declutter stage: send the converted Markdown to the provider and
//! return the main content.
//!
//! Prompt text lives in [`crate::prompts`]; this module only builds the
//! message list and drives retries.
//!
//! ## Retry Strategy
//!
//! Failed calls are retried up to `max_retries` times with exponential
//! backoff (`retry_backoff_ms * 2^(attempt-1)`). With 500 ms base and two
//! retries the waits are 500 ms then 1 s.

use crate::config::DeclutterConfig;
use crate::error::DeclutterError;
use crate::prompts::{input_prompt, DEFAULT_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Provider response for one declutter call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LlmOutput {
    pub markdown: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub retries: u32,
    pub duration_ms: u64,
}

impl LlmOutput {
    pub fn total_tokens(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}

/// Ask the provider to strip everything but the main content of `markdown`.
///
/// Exhausting the retries is fatal: there is no partial result to fall
/// back on for a single page.
pub async fn declutter_markdown(
    provider: &Arc<dyn LLMProvider>,
    markdown: &str,
    hostname: &str,
    config: &DeclutterConfig,
) -> Result<LlmOutput, DeclutterError> {
    let start = Instant::now();
    let messages = build_messages(markdown, hostname, config);
    let options = build_options(config);

    let (response, retries) = with_retries(config.max_retries, config.retry_backoff_ms, || {
        provider.chat(&messages, Some(&options))
    })
    .await
    .map_err(|(retries, message)| DeclutterError::LlmApiError { retries, message })?;

    let duration = start.elapsed();
    debug!(
        "LLM: {} input tokens, {} output tokens, {:?}",
        response.prompt_tokens,
        response.completion_tokens,
        duration
    );

    Ok(LlmOutput {
        markdown: response.content,
        input_tokens: response.prompt_tokens,
        output_tokens: response.completion_tokens,
        retries,
        duration_ms: duration.as_millis() as u64,
    })
}

/// System prompt (or override), then the page as the user turn.
pub fn build_messages(markdown: &str, hostname: &str, config: &DeclutterConfig) -> Vec<ChatMessage> {
    let system = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    vec![
        ChatMessage::system(system),
        ChatMessage::user(input_prompt(markdown, hostname)),
    ]
}

fn build_options(config: &DeclutterConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Run `op` until it succeeds or `max_retries` retries are spent.
///
/// Returns the value with the number of retries used, or the retry count
/// with the last error message.
pub async fn with_retries<T, E, F, Fut>(
    max_retries: u32,
    backoff_ms: u64,
    mut op: F,
) -> Result<(T, u32), (u32, String)>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last_err = String::from("no attempt made");
    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff = backoff_ms.saturating_mul(2u64.saturating_pow(attempt - 1));
            warn!("LLM retry {}/{} after {}ms", attempt, max_retries, backoff);
            sleep(Duration::from_millis(backoff)).await;
        }
        match op().await {
            Ok(v) => return Ok((v, attempt)),
            Err(e) => {
                last_err = e.to_string();
                warn!("LLM attempt {} failed: {}", attempt + 1, last_err);
            }
        }
    }
    Err((max_retries, last_err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn build_options_defaults() {
        let config = DeclutterConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(10_000));
    }

    #[test]
    fn messages_use_override_prompt() {
        let config = DeclutterConfig::builder()
            .system_prompt("custom")
            .build()
            .unwrap();
        let msgs = build_messages("body", "a.test", &config);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "custom");
        assert!(msgs[1].content.contains("a.test"));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let (v, retries) = with_retries(3, 500, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("429 Too Many Requests")
                } else {
                    Ok("done")
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(v, "done");
        assert_eq!(retries, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles() {
        let start = tokio::time::Instant::now();
        let res: Result<((), u32), _> =
            with_retries(2, 500, || async { Err::<(), _>("boom") }).await;
        // 500 ms + 1000 ms
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
        assert_eq!(res.unwrap_err(), (2, "boom".to_string()));
    }

    #[tokio::test]
    async fn zero_retries_tries_once() {
        let calls = AtomicU32::new(0);
        let res: Result<((), u32), _> = with_retries(0, 10, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("nope") }
        })
        .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
