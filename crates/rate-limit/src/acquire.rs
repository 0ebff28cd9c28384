//! The retrying acquire loop built on top of [`crate::RateLimiter`]'s single
//! atomic attempt. Separate from `chain.rs` because this layer is where the
//! fail-open decision lives: a Redis outage must not stall delivery, so a
//! store error here is treated as an immediate allow, not propagated.

use {
    crate::{bucket::BucketSpec, chain::AcquireOutcome, RateLimiter},
    rand::Rng,
    std::time::Duration,
    tokio::time::Instant,
};

/// Outcome of a bounded acquire loop.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AcquireResult {
    Allowed,
    Denied {
        limiting_factor: String,
        wait: Duration,
    },
}

/// Repeatedly attempts to acquire across `chain` until allowed or `timeout`
/// elapses. Sleeps `min(wait, remaining) + jitter(0..10ms)` between
/// attempts. A store error fails open immediately.
pub async fn acquire(limiter: &RateLimiter, chain: &[BucketSpec], timeout: Duration) -> AcquireResult {
    let deadline = Instant::now() + timeout;
    loop {
        match limiter.try_acquire(chain).await {
            Ok(AcquireOutcome::Allowed) => {
                crate::metrics::Metrics::get().acquisitions.with_label_values(&["allowed"]).inc();
                return AcquireResult::Allowed;
            }
            Ok(AcquireOutcome::Denied { limiting_factor, wait }) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    crate::metrics::Metrics::get().acquisitions.with_label_values(&["denied"]).inc();
                    return AcquireResult::Denied {
                        limiting_factor,
                        wait: Duration::ZERO,
                    };
                }
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..10));
                tokio::time::sleep(wait.min(remaining) + jitter).await;
            }
            Err(err) => {
                tracing::warn!(%err, "rate limit store error, failing open");
                crate::metrics::Metrics::get().acquisitions.with_label_values(&["fail_open"]).inc();
                return AcquireResult::Allowed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_outcome_carries_limiting_factor() {
        let result = AcquireResult::Denied {
            limiting_factor: "rl:system:bucket".to_string(),
            wait: Duration::from_millis(5),
        };
        assert!(matches!(result, AcquireResult::Denied { .. }));
    }
}
