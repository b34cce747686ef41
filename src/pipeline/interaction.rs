//! Human-like interaction performed on a rendered page before capture.
//!
//! A plan is generated up front as plain data ([`InteractionPlan`]) and then
//! replayed against anything implementing [`InteractionTarget`]. The browser
//! session implements the target over DevTools; tests use a recorder.

use async_trait::async_trait;
use rand::Rng;
use std::ops::RangeInclusive;
use tokio::time::{sleep, Duration};
use tracing::debug;

use crate::error::DeclutterError;

/// Viewport the pointer moves within.
pub const VIEWPORT_WIDTH: u32 = 1920;
pub const VIEWPORT_HEIGHT: u32 = 1080;

const SCROLL_STEPS: u32 = 10;

/// A single timed action.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionStep {
    Delay(Duration),
    MoveMouse { x: f64, y: f64 },
    ScrollBy { dy: f64 },
}

/// Surface a plan is executed against.
#[async_trait]
pub trait InteractionTarget: Send {
    async fn move_mouse(&mut self, x: f64, y: f64) -> Result<(), DeclutterError>;
    async fn scroll_by(&mut self, dy: f64) -> Result<(), DeclutterError>;
}

/// Ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionPlan {
    pub steps: Vec<InteractionStep>,
}

fn delay_in<R: Rng>(rng: &mut R, ms: RangeInclusive<u64>) -> InteractionStep {
    InteractionStep::Delay(Duration::from_millis(rng.gen_range(ms)))
}

impl InteractionPlan {
    /// The default reading gesture:
    ///
    /// 1. pause 500–1500 ms
    /// 2. move the pointer to a random point inside the 1920×1080 viewport
    /// 3. pause 300–800 ms
    /// 4. scroll down 100–600 px in ten equal steps, one 50–150 ms gap
    ///    drawn once and used between every step
    /// 5. pause 500–1000 ms
    pub fn human_like<R: Rng>(rng: &mut R) -> Self {
        let mut steps = Vec::with_capacity(4 + 2 * SCROLL_STEPS as usize);

        steps.push(delay_in(rng, 500..=1500));
        steps.push(InteractionStep::MoveMouse {
            x: rng.gen_range(0.0..f64::from(VIEWPORT_WIDTH)),
            y: rng.gen_range(0.0..f64::from(VIEWPORT_HEIGHT)),
        });
        steps.push(delay_in(rng, 300..=800));

        let total: u32 = rng.gen_range(100..=600);
        let step = f64::from(total) / f64::from(SCROLL_STEPS);
        let gap = delay_in(rng, 50..=150);
        for _ in 0..SCROLL_STEPS {
            steps.push(InteractionStep::ScrollBy { dy: step });
            steps.push(gap.clone());
        }

        steps.push(delay_in(rng, 500..=1000));
        Self { steps }
    }

    /// Total vertical scroll distance of the plan.
    pub fn scroll_distance(&self) -> f64 {
        self.steps
            .iter()
            .map(|s| match s {
                InteractionStep::ScrollBy { dy } => *dy,
                _ => 0.0,
            })
            .sum()
    }

    /// Replay every step in order. Delays are real sleeps.
    pub async fn run<T: InteractionTarget + ?Sized>(
        &self,
        target: &mut T,
    ) -> Result<(), DeclutterError> {
        for step in &self.steps {
            match *step {
                InteractionStep::Delay(d) => sleep(d).await,
                InteractionStep::MoveMouse { x, y } => {
                    debug!("Interaction: mouse → ({x:.0}, {y:.0})");
                    target.move_mouse(x, y).await?;
                }
                InteractionStep::ScrollBy { dy } => target.scroll_by(dy).await?,
            }
        }
        debug!("Interaction: scrolled {:.0}px", self.scroll_distance());
        Ok(())
    }
}
