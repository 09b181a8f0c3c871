// Bounded retry policy for transient capture failures
//
// Consecutive failures back off exponentially from the base delay up to
// the cap. Once the failure budget is spent the caller must escalate.

use std::time::Duration;

use crate::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then try again
    Retry(Duration),
    /// Too many consecutive failures; treat as fatal
    Escalate,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_consecutive: u32,
    base: Duration,
    cap: Duration,
    consecutive: u32,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_consecutive: config.max_consecutive_failures.max(1),
            base: Duration::from_millis(config.base_backoff_ms),
            cap: Duration::from_millis(config.max_backoff_ms.max(config.base_backoff_ms)),
            consecutive: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    pub fn record_failure(&mut self) -> RetryDecision {
        self.consecutive = self.consecutive.saturating_add(1);
        if self.consecutive >= self.max_consecutive {
            return RetryDecision::Escalate;
        }

        let factor = 1u32 << (self.consecutive - 1).min(16);
        RetryDecision::Retry(self.base.saturating_mul(factor).min(self.cap))
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max: u32) -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            max_consecutive_failures: max,
            base_backoff_ms: 100,
            max_backoff_ms: 300,
        })
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut policy = policy(10);
        assert_eq!(
            policy.record_failure(),
            RetryDecision::Retry(Duration::from_millis(100))
        );
        assert_eq!(
            policy.record_failure(),
            RetryDecision::Retry(Duration::from_millis(200))
        );
        assert_eq!(
            policy.record_failure(),
            RetryDecision::Retry(Duration::from_millis(300))
        );
        assert_eq!(
            policy.record_failure(),
            RetryDecision::Retry(Duration::from_millis(300))
        );
    }

    #[test]
    fn test_escalates_after_budget() {
        let mut policy = policy(3);
        assert!(matches!(policy.record_failure(), RetryDecision::Retry(_)));
        assert!(matches!(policy.record_failure(), RetryDecision::Retry(_)));
        assert_eq!(policy.record_failure(), RetryDecision::Escalate);
    }

    #[test]
    fn test_success_resets_budget() {
        let mut policy = policy(2);
        policy.record_failure();
        policy.record_success();
        assert_eq!(policy.consecutive_failures(), 0);
        assert!(matches!(policy.record_failure(), RetryDecision::Retry(_)));
    }
}
