use std::time::Duration;

/// Backoff schedule applied when songs fail to play back to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before giving up on the guild.
    pub max_failures: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_failures: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_failures: u32, base_delay: Duration) -> Self {
        Self {
            max_failures,
            base_delay,
            ..Self::default()
        }
    }

    /// Delay before moving on after the `failures`-th consecutive failure.
    /// `None` once the budget is spent.
    pub fn delay_for(&self, failures: u32) -> Option<Duration> {
        if failures == 0 || failures > self.max_failures {
            return None;
        }

        let factor = self.multiplier.saturating_pow(failures - 1);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);

        Some(delay.min(self.max_delay))
    }
}
