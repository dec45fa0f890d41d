//! Exponential backoff between retries on the same provider.

use std::time::Duration;

use newswire_types::config::BackoffConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    factor: f64,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        Self {
            initial,
            max,
            factor: factor.max(1.0),
        }
    }

    /// No delay at all; used by tests that only care about attempt order.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 1.0)
    }

    /// Delay before retry number `attempt` (1-based: the delay after the
    /// first failure is `delay_for(1)`).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base =
            self.initial.as_millis() as f64 * self.factor.powi(attempt.saturating_sub(1) as i32);
        let clamped = base.min(self.max.as_millis() as f64);
        Duration::from_millis(clamped as u64)
    }
}

impl From<&BackoffConfig> for ExponentialBackoff {
    fn from(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_ms),
            Duration::from_millis(config.max_ms),
            config.multiplier,
        )
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from(&BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10), 2.0);

        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(800));
    }

    #[test]
    fn test_exponential_backoff_max() {
        let backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_millis(500), 2.0);

        assert_eq!(backoff.delay_for(10), Duration::from_millis(500));
    }

    #[test]
    fn test_default_follows_config_defaults() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(backoff.delay_for(1), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(1_000));
        assert_eq!(backoff.delay_for(20), Duration::from_millis(8_000));
        assert_eq!(ExponentialBackoff::none().delay_for(3), Duration::ZERO);
    }
}
