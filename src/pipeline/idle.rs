//! Network-idle detection for the rendered fetch.
//!
//! The browser session feeds DevTools network events into an
//! [`InflightCounter`]; [`NetworkIdleDetector::wait`] polls that counter until
//! it has stayed at or below the threshold for a full idle window.
//!
//! ```text
//!  count  3 ─┐     ┌─┐
//!        ≤1  └─────┘ └──────────────────▶ idle after `idle_window_ms`
//!             ▲ window restarts whenever count > threshold
//! ```

use crate::config::IdleSettings;
use crate::error::DeclutterError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

/// The subset of DevTools network events the counter cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// `Network.requestWillBeSent`. `redirect` is set when the event carries a
    /// `redirectResponse`: the same request id continues on a new URL and the
    /// replaced hop never gets its own finished/failed event.
    RequestSent { redirect: bool },
    RequestFinished,
    RequestFailed,
}

/// Shared count of in-flight network requests for one page.
///
/// Cloning is cheap; all clones observe the same value.
#[derive(Debug, Clone, Default)]
pub struct InflightCounter(Arc<AtomicUsize>);

impl InflightCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request was sent.
    pub fn started(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    /// A request finished or failed. Never goes below zero.
    pub fn finished(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
    }

    /// Apply one network event. A redirect hop keeps its request in flight
    /// without adding another.
    pub fn record(&self, event: NetworkEvent) {
        match event {
            NetworkEvent::RequestSent { redirect: false } => self.started(),
            NetworkEvent::RequestSent { redirect: true } => {}
            NetworkEvent::RequestFinished | NetworkEvent::RequestFailed => self.finished(),
        }
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Polls an [`InflightCounter`] until the page has settled.
#[derive(Debug, Clone, Copy)]
pub struct NetworkIdleDetector {
    settings: IdleSettings,
}

impl NetworkIdleDetector {
    pub fn new(settings: IdleSettings) -> Self {
        Self { settings }
    }

    /// Wait until at most `max_inflight` requests have been pending for an
    /// uninterrupted idle window.
    ///
    /// # Errors
    /// [`DeclutterError::FetchTimeout`] when no such window occurs within
    /// `timeout_secs`.
    pub async fn wait(&self, counter: &InflightCounter) -> Result<(), DeclutterError> {
        let poll = Duration::from_millis(self.settings.poll_interval_ms);
        let window = Duration::from_millis(self.settings.idle_window_ms);
        let timeout = Duration::from_secs(self.settings.timeout_secs);

        let start = Instant::now();
        let mut idle_since: Option<Instant> = None;

        loop {
            let now = Instant::now();
            let inflight = counter.get();

            if inflight <= self.settings.max_inflight {
                let since = *idle_since.get_or_insert(now);
                if now.duration_since(since) >= window {
                    debug!(
                        "Network idle after {:?} ({} in flight)",
                        now.duration_since(start),
                        inflight
                    );
                    return Ok(());
                }
            } else {
                idle_since = None;
            }

            if now.duration_since(start) >= timeout {
                return Err(DeclutterError::FetchTimeout {
                    what: format!(
                        "network idle (≤{} requests for {}ms)",
                        self.settings.max_inflight, self.settings.idle_window_ms
                    ),
                    secs: self.settings.timeout_secs,
                });
            }

            sleep(poll).await;
        }
    }
}

impl Default for NetworkIdleDetector {
    fn default() -> Self {
        Self::new(IdleSettings::default())
    }
}
