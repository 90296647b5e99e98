//! Retry with exponential backoff for reasoning-service calls

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::time::Duration;

/// Retry policy for reasoning-service calls
///
/// Controls how many times a failed request is retried and how
/// long to wait between attempts using exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Policy with a different retry budget
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }
}

/// Whether an HTTP status is worth retrying: rate limits (429) and server errors (5xx)
#[must_use]
pub fn is_recoverable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Whether a transport failure is worth retrying
#[must_use]
pub fn is_recoverable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Parse a `Retry-After` header value given in seconds
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// How long to wait before retry number `attempt` (zero-based)
///
/// A server-supplied `Retry-After` wins over backoff. Either way the wait
/// never exceeds `policy.max_delay`.
#[must_use]
pub fn delay_for_attempt(
    policy: &RetryPolicy,
    attempt: u32,
    retry_after: Option<Duration>,
) -> Duration {
    let delay = retry_after.unwrap_or_else(|| {
        let backoff = backoff(policy, attempt);
        backoff + jitter(backoff)
    });
    delay.min(policy.max_delay)
}

/// `base_delay` doubled once per earlier attempt, capped
fn backoff(policy: &RetryPolicy, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    policy.base_delay.saturating_mul(factor).min(policy.max_delay)
}

/// Random extra wait of up to a quarter of `delay`
fn jitter(delay: Duration) -> Duration {
    let spread = u64::try_from((delay / 4).as_nanos()).unwrap_or(u64::MAX);
    if spread == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(RandomState::new().build_hasher().finish() % (spread + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_statuses() {
        assert!(is_recoverable_status(429));
        assert!(is_recoverable_status(500));
        assert!(is_recoverable_status(503));
        assert!(!is_recoverable_status(400));
        assert!(!is_recoverable_status(401));
        assert!(!is_recoverable_status(200));
    }

    #[test]
    fn parses_retry_after_seconds() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after(" 10 "), Some(Duration::from_secs(10)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn retry_after_wins_but_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(
            delay_for_attempt(&policy, 1, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert_eq!(
            delay_for_attempt(&policy, 0, Some(Duration::from_secs(60))),
            policy.max_delay
        );
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = RetryPolicy::default();
        let waits: Vec<u64> = (0..6)
            .map(|attempt| backoff(&policy, attempt).as_millis() as u64)
            .collect();
        assert_eq!(waits, [500, 1000, 2000, 4000, 8000, 8000]);
        assert_eq!(backoff(&policy, 40), policy.max_delay);
    }

    #[test]
    fn jittered_delay_is_bounded() {
        let policy = RetryPolicy::default();
        for attempt in 0..4 {
            let floor = backoff(&policy, attempt);
            let delay = delay_for_attempt(&policy, attempt, None);
            assert!(delay >= floor, "attempt {attempt}: {delay:?} < {floor:?}");
            assert!(delay <= floor + floor / 4, "attempt {attempt}: {delay:?}");
            assert!(delay <= policy.max_delay);
        }
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn default_policy_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(8));
        assert_eq!(RetryPolicy::with_max_retries(0).max_retries, 0);
    }
}
