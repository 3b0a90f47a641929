//! Exponential backoff.

use std::time::Duration;

/// Successive retry delays: `base`, `base * m`, `base * m²`, ... capped at `max`.
///
/// No jitter is applied; each worker waits on its own timer, so runs never
/// block one another.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    multiplier: u32,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, multiplier: u32, max: Duration) -> Self {
        Self {
            current: base.min(max),
            multiplier: multiplier.max(1),
            max,
        }
    }

    /// Delay to wait before the next retry.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .checked_mul(self.multiplier)
            .unwrap_or(self.max)
            .min(self.max);
        delay
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}
