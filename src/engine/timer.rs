//! Frame timing.

use std::time::Instant;

use crate::engine::config::DeltaTime;


/// Measures the time between consecutive ticks.
#[derive(Debug)]
pub struct FrameTimer {
    last: Instant,
}

impl Default for FrameTimer {
    fn default() -> Self { Self::new() }
}

impl FrameTimer {
    /// Starts the clock now.
    pub fn new() -> Self {
        Self { last: Instant::now() }
    }

    /// Seconds since the previous reset (or construction), restarting the clock.
    pub fn reset(&mut self) -> f64 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        elapsed
    }

    /// Delta time for the next tick under `source`. The clock restarts in both modes.
    pub fn next_delta(&mut self, source: DeltaTime) -> f64 {
        let measured = self.reset();
        match source {
            DeltaTime::Measured => measured,
            DeltaTime::Fixed(seconds) => seconds,
        }
    }
}
