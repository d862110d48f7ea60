use core::time::Duration;

/// Default polling interval of the replenishment loop.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Timing policy for the replenishment loop.
///
/// `interval` is the idle poll delay. After `n` consecutive failures the loop
/// waits `interval * 2^(n - 1)`, capped at `max_backoff`. With `max_backoff`
/// equal to `interval` every failure waits exactly one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL, DEFAULT_INTERVAL)
    }
}

impl RetryPolicy {
    pub const fn new(interval: Duration, max_backoff: Duration) -> Self {
        Self {
            interval,
            max_backoff,
        }
    }

    /// Delay before the next attempt after `failures` consecutive failures.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.interval;
        }
        let factor = 1_u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.interval
            .saturating_mul(factor)
            .min(self.max_backoff.max(self.interval))
    }
}
