//! Linear reconnect backoff.

use std::time::Duration;

/// Delay schedule between reconnect attempts: `min`, `min + step`,
/// `min + 2 * step`, … capped at `max`.
///
/// There is no attempt limit; the connection task retries forever and resets
/// the schedule after every successful open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    /// Delay before the first retry.
    pub min: Duration,
    /// Added to the delay after every failed attempt.
    pub step: Duration,
    /// Upper bound for the delay.
    pub max: Duration,
}

impl LinearBackoff {
    pub const fn new(min: Duration, step: Duration, max: Duration) -> Self {
        Self { min, step, max }
    }

    /// Delay to wait before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.step
            .checked_mul(attempt)
            .and_then(|extra| self.min.checked_add(extra))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for LinearBackoff {
    /// 0 ms, then +1 s per attempt, capped at 12 s.
    fn default() -> Self {
        Self::new(
            Duration::ZERO,
            Duration::from_secs(1),
            Duration::from_secs(12),
        )
    }
}
