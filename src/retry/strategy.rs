// src/retry/strategy.rs

use crate::config::RetryConfig;
use std::time::Duration;

use super::context::RequestContext;

#[derive(Debug, Clone)]
pub struct RetryStrategy {
    config: RetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Transient failure: wait, then try the same backend again.
    Retry { delay: Duration },
    /// The backend has used up its retry budget for this request.
    Reroute,
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Decide what follows a failed forward made with `ctx`.
    ///
    /// `ctx.retries` failures have already happened against this backend, so
    /// this is failure number `ctx.retries + 1`.
    pub fn decide(&self, ctx: &RequestContext) -> RetryDecision {
        let failures = ctx.retries.saturating_add(1);
        if failures < self.config.retry_limit {
            RetryDecision::Retry {
                delay: self.calculate_backoff(ctx.retries),
            }
        } else {
            RetryDecision::Reroute
        }
    }

    /// Whether a request that has made `attempts` hops may take another.
    pub fn may_attempt(&self, attempts: u32) -> bool {
        attempts < self.config.max_attempts
    }

    /// Delay before retry number `retries + 1`: base * 2^retries, capped,
    /// plus up to 25% jitter when enabled. A cap equal to the base gives a
    /// fixed delay.
    fn calculate_backoff(&self, retries: u32) -> Duration {
        let base = self.config.delay().as_millis() as u64;
        let max = self.config.max_delay().as_millis() as u64;

        let exponential = base.saturating_mul(2u64.saturating_pow(retries));
        let capped = exponential.min(max);

        let jitter = if self.config.jitter {
            (capped as f64 * rand::random::<f64>() * 0.25) as u64
        } else {
            0
        };

        Duration::from_millis(capped + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn strategy(retry_limit: u32, delay_ms: u64, max_delay_ms: u64, jitter: bool) -> RetryStrategy {
        RetryStrategy::new(RetryConfig {
            retry_limit,
            delay_ms,
            max_delay_ms,
            jitter,
            max_attempts: 3,
        })
    }

    fn ctx_with_retries(retries: u32) -> RequestContext {
        let mut ctx = RequestContext::new("req", None, CancellationToken::new());
        for _ in 0..retries {
            ctx = ctx.with_retry();
        }
        ctx
    }

    #[test]
    fn test_retries_until_limit_then_reroutes() {
        let strategy = strategy(3, 10, 10, false);
        let retry = RetryDecision::Retry {
            delay: Duration::from_millis(10),
        };

        assert_eq!(strategy.decide(&ctx_with_retries(0)), retry);
        assert_eq!(strategy.decide(&ctx_with_retries(1)), retry);
        // Third failure condemns the backend.
        assert_eq!(strategy.decide(&ctx_with_retries(2)), RetryDecision::Reroute);
        assert_eq!(strategy.decide(&ctx_with_retries(7)), RetryDecision::Reroute);
    }

    #[test]
    fn test_limit_of_one_never_retries() {
        let strategy = strategy(1, 10, 10, false);
        assert_eq!(strategy.decide(&ctx_with_retries(0)), RetryDecision::Reroute);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let strategy = strategy(10, 10, 50, false);
        let delays: Vec<_> = (0..5)
            .map(|n| strategy.calculate_backoff(n).as_millis())
            .collect();
        assert_eq!(delays, vec![10, 20, 40, 50, 50]);
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let strategy = strategy(10, 100, 100, true);
        for _ in 0..50 {
            let delay = strategy.calculate_backoff(0).as_millis();
            assert!((100..=125).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[test]
    fn test_attempt_ceiling() {
        let strategy = strategy(3, 10, 10, false);
        assert!(strategy.may_attempt(0));
        assert!(strategy.may_attempt(2));
        assert!(!strategy.may_attempt(3));
    }
}
