//! Exponential backoff strategy for retry policies.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    jitter: f64,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        Self {
            initial,
            max,
            factor: factor.max(1.0),
            jitter: 0.2,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Delay before retrying after attempt `attempt` (zero-based), without jitter:
    /// `min(initial * factor^attempt, max)`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base = self.initial.as_millis() as f64 * self.factor.powi(exponent);
        let clamped = base.min(self.max.as_millis() as f64);
        Duration::from_millis(clamped as u64)
    }

    /// [`base_delay`](Self::base_delay) shifted by a uniform offset in `±jitter`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let clamped = self.base_delay(attempt).as_millis() as f64;

        let jittered = if self.jitter > 0.0 {
            let jitter_range = clamped * self.jitter;
            let jitter_offset = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
            (clamped + jitter_offset).max(0.0)
        } else {
            clamped
        };

        Duration::from_millis(jittered as u64)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(10), 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff() {
        let backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10), 2.0)
                .with_jitter(0.0);

        assert_eq!(backoff.delay_for(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_exponential_backoff_max() {
        let backoff =
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_millis(500), 2.0)
                .with_jitter(0.0);

        assert_eq!(backoff.delay_for(10), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn test_next_delay_is_factor_times_previous() {
        let backoff = ExponentialBackoff::default();
        for attempt in 0..8 {
            let current = backoff.base_delay(attempt).as_millis() as f64;
            let next = backoff.base_delay(attempt + 1).as_millis() as f64;
            let expected = (current * backoff.factor()).min(backoff.max().as_millis() as f64);
            assert_eq!(next, expected, "attempt {attempt}");
        }
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let backoff = ExponentialBackoff::default();
        for _ in 0..200 {
            let delay = backoff.delay_for(1).as_millis();
            assert!((1600..=2400).contains(&delay), "{delay}");
        }
    }
}
