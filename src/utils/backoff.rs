use rand::Rng;
use std::time::Duration;

// ============================================================================
// Exponential Backoff with Jitter
// ============================================================================
//
// Computes retry delays for failed outbox publications:
// delay = min(max, base * 2^(retry - 1)), plus 0-10% jitter, capped at max.
//
// The jitter spreads out retries so that a broker outage does not produce
// a synchronized retry storm when it recovers.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub base: Duration,
    /// Upper bound for any retry delay
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(60),
        }
    }
}

/// Compute the delay before retry attempt `retry` (1-based).
pub fn compute_backoff(config: &BackoffConfig, retry: u32) -> Duration {
    let base_ms = config.base.as_millis() as f64;
    let max_ms = config.max.as_millis() as f64;

    let exp = (base_ms * 2f64.powi(retry.saturating_sub(1) as i32)).min(max_ms);
    let jitter = exp * (rand::thread_rng().gen::<f64>() * 0.1);

    Duration::from_millis((exp + jitter).min(max_ms) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(config: &BackoffConfig, retry: u32) -> (u64, u64) {
        let base_ms = config.base.as_millis() as u64;
        let max_ms = config.max.as_millis() as u64;
        let exp = (base_ms.saturating_mul(2u64.saturating_pow(retry.saturating_sub(1)))).min(max_ms);
        let upper = ((exp as f64) * 1.1).min(max_ms as f64) as u64;
        (exp, upper)
    }

    #[test]
    fn test_first_retry_is_base_plus_jitter() {
        let config = BackoffConfig::default();

        for _ in 0..100 {
            let delay = compute_backoff(&config, 1).as_millis() as u64;
            assert!(delay >= 500, "delay {} below base", delay);
            assert!(delay < 551, "delay {} above base + 10% jitter", delay);
        }
    }

    #[test]
    fn test_delay_doubles_per_retry_until_cap() {
        let config = BackoffConfig::default();

        for retry in 1..=10 {
            let (lower, upper) = bounds(&config, retry);
            let delay = compute_backoff(&config, retry).as_millis() as u64;
            assert!(delay >= lower, "retry {}: delay {} < {}", retry, delay, lower);
            assert!(delay <= upper, "retry {}: delay {} > {}", retry, delay, upper);
        }
    }

    #[test]
    fn test_lower_bound_non_decreasing() {
        let config = BackoffConfig::default();

        let mut previous = 0;
        for retry in 1..=15 {
            let (lower, _) = bounds(&config, retry);
            assert!(lower >= previous);
            previous = lower;
        }
    }

    #[test]
    fn test_capped_at_max() {
        let config = BackoffConfig::default();

        // 500ms * 2^19 is far beyond the 60s cap
        for _ in 0..100 {
            let delay = compute_backoff(&config, 20);
            assert!(delay <= config.max);
        }
    }
}
