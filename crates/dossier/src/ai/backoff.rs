//! Declared retry/backoff policy shared by the queue-level retry and the
//! AI-call-level retry.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_secs: f64,
    /// Adds up to +50% random-ish spread to each delay.
    pub jitter: bool,
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base_secs: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_secs,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Delay before the retry following `attempt` (1-based): `base^attempt`
    /// seconds, strictly increasing for base > 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let secs = self.base_secs.powi(attempt.min(self.max_attempts) as i32);
        let secs = if self.jitter {
            secs * (1.0 + spread())
        } else {
            secs
        };
        Duration::from_secs_f64(secs.max(0.0))
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(3, 2.0)
    }
}

// Cheap spread in [0, 0.5) seeded from the clock; good enough to de-align
// retry herds without pulling in a RNG dependency.
fn spread() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 500) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_is_strictly_increasing() {
        let policy = BackoffPolicy::new(5, 2.0);
        let mut previous = Duration::ZERO;
        for attempt in 1..=5 {
            let delay = policy.delay(attempt);
            assert!(delay > previous, "attempt {attempt}");
            previous = delay;
        }
    }

    #[test]
    fn test_delay_is_exponential() {
        let policy = BackoffPolicy::new(3, 2.0);
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
    }

    #[test]
    fn test_exhaustion() {
        let policy = BackoffPolicy::new(3, 2.0);
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }

    #[test]
    fn test_at_least_one_attempt() {
        let policy = BackoffPolicy::new(0, 2.0);
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_jitter_bounded() {
        let policy = BackoffPolicy::new(3, 2.0).with_jitter();
        let delay = policy.delay(1);
        assert!(delay >= Duration::from_secs(2));
        assert!(delay <= Duration::from_secs(3));
    }
}
