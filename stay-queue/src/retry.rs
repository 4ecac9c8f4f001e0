use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry delay curve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackoffStrategy {
    #[default]
    Exponential,
    Linear,
    /// Constant `base_delay` between attempts
    None,
}

/// Bounded redelivery policy for the durable backend.
///
/// The in-process fallback never consults this: it has no retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total processor invocations allowed, the first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of random delay added on top of the curve
    pub jitter: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            jitter: Duration::ZERO,
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = self.base_delay;
        let delay = match self.strategy {
            BackoffStrategy::Exponential => {
                let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
                base.checked_mul(factor).unwrap_or(self.max_delay)
            }
            BackoffStrategy::Linear => base.checked_mul(attempt).unwrap_or(self.max_delay),
            BackoffStrategy::None => base,
        };
        delay.min(self.max_delay)
    }

    /// When the job should become visible again, or `None` once the budget is spent
    pub fn next_retry(&self, attempt_count: u32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if attempt_count >= self.max_attempts {
            return None;
        }

        let mut delay = self.delay_for(attempt_count);
        if !self.jitter.is_zero() {
            let extra = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
            delay += Duration::from_millis(extra);
        }

        chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_curve_is_capped() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(10),
            ..RetryPolicy::default()
        };

        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[test]
    fn test_linear_and_constant() {
        let linear = RetryPolicy {
            strategy: BackoffStrategy::Linear,
            base_delay: Duration::from_millis(500),
            ..RetryPolicy::default()
        };
        assert_eq!(linear.delay_for(3), Duration::from_millis(1500));

        let constant = RetryPolicy {
            strategy: BackoffStrategy::None,
            ..RetryPolicy::default()
        };
        assert_eq!(constant.delay_for(4), Duration::from_secs(1));
    }

    #[test]
    fn test_budget_exhaustion() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        let now = Utc::now();

        assert_eq!(policy.next_retry(1, now), Some(now + chrono::Duration::seconds(1)));
        assert_eq!(policy.next_retry(2, now), Some(now + chrono::Duration::seconds(2)));
        assert_eq!(policy.next_retry(3, now), None);
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = RetryPolicy {
            jitter: Duration::from_millis(250),
            ..RetryPolicy::default()
        };
        let now = Utc::now();

        for _ in 0..20 {
            let at = policy.next_retry(1, now).unwrap();
            let waited = (at - now).num_milliseconds();
            assert!((1000..=1250).contains(&waited));
        }
    }
}
