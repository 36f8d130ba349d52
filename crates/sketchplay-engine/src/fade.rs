//! Volume fade ramps.
//!
//! A [`FadeRamp`] is pure: it maps a step index to a level. [`drive`]
//! schedules the steps on tokio's clock and hands each level to a callback,
//! so the same ramp runs against a real timer or a paused test clock.

use std::time::Duration;

use sketchplay_kernel::audio_backend::clamp_volume;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Number of steps in a fade.
pub const FADE_STEPS: u32 = 60;

/// A linear volume ramp between two levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeRamp {
    start: f32,
    target: f32,
    duration: Duration,
    steps: u32,
}

impl FadeRamp {
    /// Create a ramp from `start` to `target` over `duration`.
    #[must_use]
    pub fn new(start: f32, target: f32, duration: Duration) -> Self {
        Self {
            start: clamp_volume(start),
            target: clamp_volume(target),
            duration,
            steps: FADE_STEPS,
        }
    }

    /// Use a different step count (at least one).
    #[must_use]
    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps.max(1);
        self
    }

    /// Starting level.
    #[must_use]
    pub fn start(&self) -> f32 {
        self.start
    }

    /// Final level.
    #[must_use]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Total ramp length.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Number of steps.
    #[must_use]
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Time between two steps.
    #[must_use]
    pub fn step_interval(&self) -> Duration {
        self.duration / self.steps
    }

    /// Check if the ramp applies its target at once.
    #[must_use]
    pub fn is_instant(&self) -> bool {
        self.step_interval().is_zero()
    }

    /// Level after `step` steps.
    ///
    /// Never overshoots the target and is exactly the target from the last
    /// step on.
    #[must_use]
    pub fn level_at(&self, step: u32) -> f32 {
        if step >= self.steps {
            return self.target;
        }
        let progress = step as f32 / self.steps as f32;
        let level = self.start + (self.target - self.start) * progress;
        if self.target >= self.start {
            level.min(self.target)
        } else {
            level.max(self.target)
        }
    }

    /// Check if the ramp is finished after `step` steps.
    #[must_use]
    pub fn is_complete_at(&self, step: u32) -> bool {
        step >= self.steps || self.level_at(step) == self.target
    }

    /// Levels applied by a full run, in order.
    pub fn levels(&self) -> impl Iterator<Item = f32> + '_ {
        let last = if self.is_instant() {
            1
        } else {
            (1..=self.steps)
                .find(|&step| self.is_complete_at(step))
                .unwrap_or(self.steps)
        };
        let instant = self.is_instant();
        (1..=last).map(move |step| if instant { self.target } else { self.level_at(step) })
    }
}

/// Run `ramp`, passing each level to `apply`.
///
/// Returns once the target has been applied. Dropping or aborting the
/// future stops the ramp where it is.
pub async fn drive<F>(ramp: FadeRamp, mut apply: F)
where
    F: FnMut(f32) + Send,
{
    if ramp.is_instant() {
        apply(ramp.target());
        return;
    }

    let period = ramp.step_interval();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    for step in 1..=ramp.steps() {
        ticker.tick().await;
        apply(ramp.level_at(step));
        if ramp.is_complete_at(step) {
            break;
        }
    }
}
