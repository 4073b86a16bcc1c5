//! Retry backoff policy: a pure function over `(attempt, base, cap)`.

use chrono::Duration;

/// Configuration for retry/backoff behavior.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::seconds(1),
            max_backoff: Duration::seconds(300),
        }
    }
}

/// Outcome of evaluating a failed attempt against the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given backoff duration.
    Retry(Duration),
    /// Retries are exhausted; the task should be removed.
    Terminal,
}

impl RetryPolicy {
    /// Decide the outcome of the `n`-th attempt failing (1-indexed: the
    /// first try is attempt 1).
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if attempt > self.max_retries {
            return RetryDecision::Terminal;
        }
        let exp = attempt.saturating_sub(1);
        let multiplier = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
        let scaled = self
            .base_backoff
            .num_milliseconds()
            .saturating_mul(multiplier as i64);
        let capped = scaled.min(self.max_backoff.num_milliseconds());
        RetryDecision::Retry(Duration::milliseconds(capped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1), RetryDecision::Retry(Duration::seconds(1)));
        assert_eq!(p.decide(2), RetryDecision::Retry(Duration::seconds(2)));
        assert_eq!(p.decide(3), RetryDecision::Retry(Duration::seconds(4)));
        assert_eq!(p.decide(4), RetryDecision::Terminal);
    }

    #[test]
    fn caps_at_max_backoff() {
        let p = RetryPolicy {
            max_retries: 10,
            base_backoff: Duration::seconds(1),
            max_backoff: Duration::seconds(5),
        };
        assert_eq!(p.decide(10), RetryDecision::Retry(Duration::seconds(5)));
    }

    #[test]
    fn removed_after_max_retries_plus_one_attempts() {
        let p = RetryPolicy {
            max_retries: 2,
            base_backoff: Duration::seconds(1),
            max_backoff: Duration::seconds(10),
        };
        assert!(matches!(p.decide(1), RetryDecision::Retry(_)));
        assert!(matches!(p.decide(2), RetryDecision::Retry(_)));
        assert_eq!(p.decide(3), RetryDecision::Terminal);
    }
}
