//! Backoff policy for node retries.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Backoff policy controlling the delay between retry attempts.
#[derive(Debug, Clone)]
pub enum BackoffPolicy {
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff: base * 2^attempt, capped at max.
    Exponential { base: Duration, max: Duration },
    /// No delay between retries.
    None,
}

impl BackoffPolicy {
    /// Compute the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Exponential { base, max } => {
                let millis = base.as_millis() as u64 * 2u64.saturating_pow(attempt as u32);
                Duration::from_millis(millis).min(*max)
            }
            BackoffPolicy::None => Duration::ZERO,
        }
    }

    /// Sleep for the attempt's delay, waking early on cancellation.
    pub async fn sleep_for_attempt(
        &self,
        attempt: usize,
        cancel: &CancellationToken,
    ) -> waypoint_types::Result<()> {
        let delay = self.delay_for_attempt(attempt);
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = cancel.cancelled() => Err(waypoint_types::WaypointError::Cancelled),
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_backoff_constant_delay() {
        let policy = BackoffPolicy::Fixed(Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(100), Duration::from_millis(200));
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let policy = BackoffPolicy::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(500));
    }

    #[test]
    fn default_backoff_is_100ms_doubling_capped_30s() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(30));
    }

    #[test]
    fn none_backoff_zero_delay() {
        let policy = BackoffPolicy::None;
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(99), Duration::ZERO);
    }

    #[tokio::test]
    async fn sleep_wakes_on_cancellation() {
        let policy = BackoffPolicy::Fixed(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = policy.sleep_for_attempt(0, &cancel).await.unwrap_err();
        assert!(matches!(err, waypoint_types::WaypointError::Cancelled));
    }

    #[tokio::test]
    async fn zero_delay_returns_immediately() {
        let policy = BackoffPolicy::None;
        let cancel = CancellationToken::new();
        policy.sleep_for_attempt(5, &cancel).await.unwrap();
    }
}
