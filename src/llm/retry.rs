use std::time::Duration;

use rand::Rng;

use crate::config::LlmConfig;

/// Bounded exponential backoff with jitter for the LLM transport.
///
/// The delay before retry `n` (1-based) is `base * 2^(n-1)`, capped at
/// `max_delay`, then scaled by a random factor in `[0.5, 1.0]` so parallel
/// workers do not hammer the upstream in lockstep.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        RetryPolicy {
            max_attempts: config.retry_max_attempts.max(1),
            base_delay: Duration::from_secs_f64(config.retry_base_seconds.max(0.0)),
            max_delay: Duration::from_secs_f64(
                config.retry_cap_seconds.max(config.retry_base_seconds.max(0.0)),
            ),
        }
    }

    /// No retries at all; single attempt. Used in tests and by callers that
    /// handle retry themselves.
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let exp = self.base_delay.saturating_mul(1u32 << shift);
        let capped = exp.min(self.max_delay);
        capped.mul_f64(rng.gen_range(0.5..=1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_stays_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(60),
        };
        let mut rng = rand::thread_rng();
        let d1 = policy.delay(1, &mut rng);
        assert!(d1 >= Duration::from_secs(2) && d1 <= Duration::from_secs(4));
        for attempt in 1..12 {
            assert!(policy.delay(attempt, &mut rng) <= Duration::from_secs(60));
        }
    }

    #[test]
    fn none_policy_is_single_attempt() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay(1, &mut rand::thread_rng()), Duration::ZERO);
    }
}
