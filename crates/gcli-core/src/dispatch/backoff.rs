use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use gcli_types::models::config::RetryConfig;

use super::AttemptOutcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStrategy {
    NoRetry,
    /// Try the next credential straight away
    Rotate,
    ExponentialBackoff { base_ms: u64, max_ms: u64 },
}

pub fn determine_retry_strategy(outcome: AttemptOutcome, config: &RetryConfig) -> RetryStrategy {
    match outcome {
        AttemptOutcome::Success | AttemptOutcome::Fatal => RetryStrategy::NoRetry,
        AttemptOutcome::RateLimited | AttemptOutcome::AuthError => RetryStrategy::Rotate,
        AttemptOutcome::Transient => RetryStrategy::ExponentialBackoff {
            base_ms: config.backoff_base_ms,
            max_ms: config.backoff_max_ms,
        },
    }
}

/// Delay before retry number `attempt` (0-based).
pub fn backoff_delay(base_ms: u64, max_ms: u64, attempt: u32) -> Duration {
    let factor = 1_u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
}

/// Sleep as the strategy requires. Returns false when no retry should follow.
pub async fn apply_retry_strategy(
    strategy: &RetryStrategy,
    attempt: u32,
    max_attempts: u32,
    trace_id: &str,
) -> bool {
    match *strategy {
        RetryStrategy::NoRetry => {
            debug!("[{}] Non-retryable outcome, stopping", trace_id);
            false
        },
        RetryStrategy::Rotate => {
            debug!("[{}] Rotating credential, attempt {}/{}", trace_id, attempt + 1, max_attempts);
            true
        },
        RetryStrategy::ExponentialBackoff { base_ms, max_ms } => {
            let delay = backoff_delay(base_ms, max_ms, attempt);
            info!(
                "[{}] Retry with exponential backoff: attempt={}/{}, delay={}ms",
                trace_id,
                attempt + 1,
                max_attempts,
                delay.as_millis()
            );
            sleep(delay).await;
            true
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_transient_returns_exponential_backoff() {
        let config = RetryConfig { max_attempts: 5, backoff_base_ms: 100, backoff_max_ms: 1000 };
        assert_eq!(
            determine_retry_strategy(AttemptOutcome::Transient, &config),
            RetryStrategy::ExponentialBackoff { base_ms: 100, max_ms: 1000 }
        );
    }

    #[test]
    fn strategy_rate_limit_and_auth_rotate() {
        let config = RetryConfig::default();
        assert_eq!(determine_retry_strategy(AttemptOutcome::RateLimited, &config), RetryStrategy::Rotate);
        assert_eq!(determine_retry_strategy(AttemptOutcome::AuthError, &config), RetryStrategy::Rotate);
    }

    #[test]
    fn strategy_fatal_returns_no_retry() {
        assert_eq!(
            determine_retry_strategy(AttemptOutcome::Fatal, &RetryConfig::default()),
            RetryStrategy::NoRetry
        );
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(500, 8000, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(500, 8000, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(500, 8000, 3), Duration::from_millis(4000));
        assert_eq!(backoff_delay(500, 8000, 4), Duration::from_millis(8000));
        assert_eq!(backoff_delay(500, 8000, 40), Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn apply_no_retry_returns_false() {
        assert!(!apply_retry_strategy(&RetryStrategy::NoRetry, 0, 3, "t").await);
        assert!(apply_retry_strategy(&RetryStrategy::Rotate, 0, 3, "t").await);
    }
}
