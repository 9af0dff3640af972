//! Retry policy for delivery operations.
//!
//! Two distinct kinds of retry happen for a destination:
//! - Send retries: within a single attempt, a send that comes back `ERROR` or
//!   `QUEUED` is tried again after the retry interval, up to `retry_count` times.
//! - Iteration backoff: when the queue consumer itself fails (storage, codec,
//!   a defective sender) on the same head message over and over, it backs off
//!   exponentially instead of spinning.

use std::time::Duration;

use courier_common::{QueueConnectorProperties, Status};
use rand::Rng;

/// Retry configuration for a single destination
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// How many times a failed send is retried within one attempt
    pub retry_count: u32,

    /// Pause between send retries, and the base of the failure backoff
    pub retry_interval: Duration,

    /// Cap on the failure backoff
    pub failure_backoff_max: Duration,

    /// Randomness applied to the failure backoff, within ±`jitter_factor`
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&QueueConnectorProperties::default())
    }
}

impl From<&QueueConnectorProperties> for RetryPolicy {
    fn from(properties: &QueueConnectorProperties) -> Self {
        Self {
            retry_count: properties.retry_count,
            retry_interval: properties.retry_interval(),
            failure_backoff_max: properties.failure_backoff_max(),
            jitter_factor: clamp_jitter(properties.failure_backoff_jitter),
        }
    }
}

impl RetryPolicy {
    /// Whether another send should be made, given the normalized status of
    /// the last one and how many sends the message has had so far
    ///
    /// At most `retry_count + 1` sends are ever made.
    #[must_use]
    pub const fn should_retry(&self, status: Status, send_attempts: u32) -> bool {
        matches!(status, Status::Error | Status::Queued)
            && send_attempts.saturating_sub(1) < self.retry_count
    }

    /// How long to back off after `failures` consecutive failed iterations
    /// on the same message (1-indexed)
    #[must_use]
    pub fn failure_delay(&self, failures: u32) -> Duration {
        calculate_backoff(
            failures,
            self.retry_interval,
            self.failure_backoff_max,
            self.jitter_factor,
        )
    }
}

/// Keep a configured jitter factor within `0.0..=1.0`; NaN means no jitter
fn clamp_jitter(jitter_factor: f64) -> f64 {
    if jitter_factor.is_nan() {
        0.0
    } else {
        jitter_factor.clamp(0.0, 1.0)
    }
}

/// Exponential backoff with jitter
///
/// # Formula
/// `delay = min(base * 2^(attempt - 1), max) * (1 ± jitter)`
#[must_use]
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration, jitter_factor: f64) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let delay = if exponent >= 32 {
        max
    } else {
        base.saturating_mul(1u32 << exponent).min(max)
    };

    let jitter_factor = clamp_jitter(jitter_factor);
    if jitter_factor <= 0.0 || delay.is_zero() {
        return delay;
    }

    let jitter_range = delay.as_secs_f64() * jitter_factor;
    let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);

    Duration::try_from_secs_f64((delay.as_secs_f64() + jitter).max(0.0)).unwrap_or(delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(retry_count: u32) -> RetryPolicy {
        RetryPolicy {
            retry_count,
            retry_interval: Duration::from_secs(1),
            failure_backoff_max: Duration::from_secs(60),
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retry_count, 0);
        assert_eq!(policy.retry_interval, Duration::from_secs(10));
        assert_eq!(policy.failure_backoff_max, Duration::from_secs(60));
        assert!((policy.jitter_factor - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_should_retry() {
        let policy = policy(2);

        assert!(policy.should_retry(Status::Error, 1));
        assert!(policy.should_retry(Status::Queued, 2));
        assert!(!policy.should_retry(Status::Error, 3));

        assert!(!policy.should_retry(Status::Sent, 1));
        assert!(!policy.should_retry(Status::Filtered, 1));
    }

    #[test]
    fn test_no_retries_configured() {
        let policy = policy(0);

        assert!(!policy.should_retry(Status::Error, 1));
        assert!(!policy.should_retry(Status::Queued, 1));
    }

    #[test]
    fn test_failure_delay_is_exponential_and_capped() {
        let policy = policy(0);

        assert_eq!(policy.failure_delay(1), Duration::from_secs(1));
        assert_eq!(policy.failure_delay(2), Duration::from_secs(2));
        assert_eq!(policy.failure_delay(3), Duration::from_secs(4));
        assert_eq!(policy.failure_delay(7), Duration::from_secs(60));
        assert_eq!(policy.failure_delay(100), Duration::from_secs(60));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    fn test_backoff_with_jitter() {
        let delay = calculate_backoff(2, Duration::from_secs(60), Duration::from_secs(3600), 0.2);

        assert!(
            delay >= Duration::from_secs(96) && delay <= Duration::from_secs(144),
            "Delay {delay:?} should be within jitter range"
        );
    }

    #[test]
    fn test_jitter_is_clamped() {
        let jitter = |value: f64| {
            RetryPolicy::from(&QueueConnectorProperties {
                failure_backoff_jitter: value,
                ..QueueConnectorProperties::default()
            })
            .jitter_factor
        };

        assert!(jitter(f64::NAN).abs() < f64::EPSILON);
        assert!(jitter(-0.5).abs() < f64::EPSILON);
        assert!((jitter(5.0) - 1.0).abs() < f64::EPSILON);
        assert!((jitter(f64::INFINITY) - 1.0).abs() < f64::EPSILON);
        assert!((jitter(0.25) - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Calls an unsupported method")]
    fn test_backoff_survives_bad_jitter() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(60);

        assert_eq!(calculate_backoff(1, base, max, f64::NAN), base);
        assert_eq!(calculate_backoff(1, base, max, -3.0), base);
        assert!(calculate_backoff(1, base, max, f64::INFINITY) <= Duration::from_secs(2));
        assert!(calculate_backoff(40, base, max, 1e300) <= Duration::from_secs(120));
    }
}
