//! Exponential reconnect backoff.

use std::time::Duration;

/// Reconnect budget and delay bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Failures tolerated before giving up (the initial open included).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum backoff (caps exponential growth).
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Stateless policy; computes the delay for a given attempt counter.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub config: ReconnectConfig,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config }
    }

    /// `min(base * 2^attempt, max)` where `attempt` is 0-based.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.config
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay)
    }

    /// Whether another retry may be scheduled after a failure observed
    /// with `attempt` retries already spent.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.config.max_attempts
    }
}

/// Mutable retry bookkeeping owned by the connection state machine.
#[derive(Debug, Clone, Default)]
pub struct ReconnectState {
    attempt: u32,
}

impl ReconnectState {
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a failure. Returns the delay before the next retry, or `None`
    /// when the budget is exhausted.
    pub fn on_failure(&mut self, policy: &ReconnectPolicy) -> Option<Duration> {
        if !policy.should_retry(self.attempt) {
            return None;
        }
        let delay = policy.delay(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32, base_ms: u64, max_ms: u64) -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
        })
    }

    #[test]
    fn delays_double_from_base() {
        let p = policy(10, 1_000, 60_000);
        let delays: Vec<u128> = (0..4).map(|a| p.delay(a).as_millis()).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000]);
    }

    #[test]
    fn delay_capped_at_max() {
        let p = policy(10, 1_000, 5_000);
        assert_eq!(p.delay(3), Duration::from_millis(5_000));
        assert_eq!(p.delay(64), Duration::from_millis(5_000));
    }

    #[test]
    fn state_counts_up_then_exhausts() {
        let p = policy(5, 1_000, 60_000);
        let mut state = ReconnectState::default();
        let mut delays = vec![];
        while let Some(d) = state.on_failure(&p) {
            delays.push(d.as_millis());
        }
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000]);
        assert_eq!(state.attempt(), 4);
        assert!(state.attempt() <= p.config.max_attempts);

        state.reset();
        assert_eq!(state.attempt(), 0);
        assert_eq!(state.on_failure(&p), Some(Duration::from_millis(1_000)));
    }

    #[test]
    fn zero_budget_never_retries() {
        let p = policy(0, 10, 100);
        assert!(ReconnectState::default().on_failure(&p).is_none());
    }
}
