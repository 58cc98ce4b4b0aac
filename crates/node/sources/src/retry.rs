//! Linear retry backoff.

use backon::BackoffBuilder;
use std::time::Duration;

/// How often and how patiently a fetch is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    /// Delay before the first retry.
    pub base: Duration,
    /// Added to the delay for every further retry.
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            base: Duration::from_millis(500),
            step: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Returns a [`BackoffBuilder`] for this policy.
    pub const fn backoff(&self) -> LinearBuilder {
        LinearBuilder {
            base: self.base,
            step: self.step,
            max_retries: self.max_attempts.saturating_sub(1),
        }
    }
}

/// Builds a [`LinearBackoff`].
#[derive(Debug, Clone, Copy)]
pub struct LinearBuilder {
    base: Duration,
    step: Duration,
    max_retries: usize,
}

impl BackoffBuilder for LinearBuilder {
    type Backoff = LinearBackoff;

    fn build(self) -> Self::Backoff {
        LinearBackoff { base: self.base, step: self.step, retry: 0, max_retries: self.max_retries }
    }
}

/// Yields `base + step * n` for the n-th retry, then stops.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    base: Duration,
    step: Duration,
    retry: usize,
    max_retries: usize,
}

impl Iterator for LinearBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.retry >= self.max_retries {
            return None;
        }
        let factor = u32::try_from(self.retry).unwrap_or(u32::MAX);
        self.retry += 1;
        Some(self.base.saturating_add(self.step.saturating_mul(factor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_delays() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base: Duration::from_millis(500),
            step: Duration::from_millis(100),
        };
        let delays: Vec<_> = policy.backoff().build().collect();
        assert_eq!(
            delays,
            vec![Duration::from_millis(500), Duration::from_millis(600), Duration::from_millis(700)]
        );
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let policy = RetryPolicy { max_attempts: 1, ..Default::default() };
        assert_eq!(policy.backoff().build().count(), 0);
    }

    #[test]
    fn test_default_policy_allows_one_hundred_attempts() {
        assert_eq!(RetryPolicy::default().backoff().build().count(), 99);
    }
}
