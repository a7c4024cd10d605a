//! Dispatch retry policy
//!
//! Provider calls carry a bounded retry count; the delay between attempts
//! comes from a strategy value so tests can run with zero delay.

use std::time::Duration;

/// Retry strategy
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// No delay between attempts
    None,
    /// Fixed delay between retries
    Fixed { delay: Duration },
    /// Exponential backoff
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Exponential {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryStrategy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::None => Duration::ZERO,
            RetryStrategy::Fixed { delay } => *delay,
            RetryStrategy::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let delay = initial.as_secs_f64() * multiplier.powi(attempt.saturating_sub(1) as i32);
                Duration::from_secs_f64(delay.min(max.as_secs_f64()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let strategy = RetryStrategy::Fixed {
            delay: Duration::from_secs(5),
        };
        assert_eq!(strategy.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(strategy.delay_for_attempt(9), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_backoff_caps() {
        let strategy = RetryStrategy::Exponential {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(60),
            multiplier: 2.0,
        };
        assert_eq!(strategy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(strategy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(strategy.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(strategy.delay_for_attempt(10), Duration::from_secs(60)); // Capped
    }

    #[test]
    fn test_none_has_no_delay() {
        assert_eq!(RetryStrategy::None.delay_for_attempt(3), Duration::ZERO);
    }
}
