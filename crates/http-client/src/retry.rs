//! Retry/backoff for webhook delivery attempts.
//!
//! `next_delay` computes `min(base * 2^attempt, max_delay)` then adds a
//! uniformly sampled amount in `[0, delay * jitter_factor]` on top, rather
//! than replacing the delay with a jittered range the way AWS-style full
//! jitter does — this keeps delivery from ever retrying sooner than the
//! unjittered backoff would.

use {configs::HttpClientConfig, rand::Rng, std::time::Duration};

pub const RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUS_CODES.contains(&status)
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl From<HttpClientConfig> for RetryPolicy {
    fn from(config: HttpClientConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            jitter_factor: config.jitter_factor,
        }
    }
}

impl RetryPolicy {
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    pub fn next_delay(&self, attempt: u32) -> Duration {
        let uncapped = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let capped = uncapped.min(self.max_delay.as_secs_f64());
        let jitter = if self.jitter_factor > 0.0 {
            rand::thread_rng().gen::<f64>() * capped * self.jitter_factor
        } else {
            0.0
        };
        Duration::from_secs_f64(capped + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.5,
        }
    }

    #[test]
    fn delay_doubles_per_attempt_before_cap() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..policy()
        };
        assert_eq!(policy.next_delay(0), Duration::from_secs(1));
        assert_eq!(policy.next_delay(1), Duration::from_secs(2));
        assert_eq!(policy.next_delay(2), Duration::from_secs(4));
    }

    #[test]
    fn delay_is_capped_at_max_delay_plus_jitter() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..policy()
        };
        assert_eq!(policy.next_delay(10), Duration::from_secs(10));
    }

    #[test]
    fn should_retry_respects_max_retries() {
        let policy = policy();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn retryable_status_codes_are_the_expected_transient_set() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(404));
    }
}
