//! Shared retry/backoff state machine for page fetches
//!
//! ```text
//! Attempting(1) ──ok──▶ Succeeded
//!      │ transient
//!      ▼
//! FailedTransient(1) ──k < max──▶ Attempting(2) ...
//!      │ k == max or fatal
//!      ▼
//! FailedFatal
//! ```

use std::time::Duration;

use crate::infrastructure::config::FetchConfig;

/// Exponential backoff: `base * multiplier^(k-1)`, capped at `ceiling`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffSchedule {
    base: Duration,
    multiplier: f64,
    ceiling: Duration,
}

impl BackoffSchedule {
    pub const fn new(base: Duration, multiplier: f64, ceiling: Duration) -> Self {
        Self {
            base,
            multiplier,
            ceiling,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_base_ms),
            config.backoff_multiplier.max(1.0),
            Duration::from_millis(config.backoff_ceiling_ms),
        )
    }

    /// Delay before the attempt following failed attempt `k` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let factor = self.multiplier.powi(exponent);
        let millis = self.base.as_millis() as f64 * factor;
        let ceiling = self.ceiling.as_millis() as f64;

        if !millis.is_finite() || millis >= ceiling {
            self.ceiling
        } else {
            Duration::from_millis(millis as u64)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting(u32),
    Succeeded,
    FailedTransient(u32),
    FailedFatal,
}

/// Attempt outcome fed into the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Transient,
    Fatal,
}

/// Per-URL retry driver; created fresh for every fetch call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    schedule: BackoffSchedule,
    state: RetryState,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, schedule: BackoffSchedule) -> Self {
        Self {
            max_retries,
            schedule,
            state: RetryState::Attempting(1),
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(config.max_retries, BackoffSchedule::from_config(config))
    }

    pub const fn state(&self) -> RetryState {
        self.state
    }

    /// Total attempts allowed: the first one plus `max_retries`
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Record the result of the current attempt
    pub fn record(&mut self, outcome: AttemptOutcome) -> RetryState {
        self.state = match (self.state, outcome) {
            (RetryState::Attempting(_), AttemptOutcome::Success) => RetryState::Succeeded,
            (RetryState::Attempting(k), AttemptOutcome::Transient) if k < self.max_attempts() => {
                RetryState::FailedTransient(k)
            }
            (RetryState::Attempting(_), _) => RetryState::FailedFatal,
            (state, _) => state,
        };
        self.state
    }

    /// Move from `FailedTransient(k)` to `Attempting(k + 1)`, returning
    /// the backoff to wait first
    pub fn next_attempt(&mut self) -> Option<Duration> {
        match self.state {
            RetryState::FailedTransient(k) => {
                self.state = RetryState::Attempting(k + 1);
                Some(self.schedule.delay_for(k))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn schedule() -> BackoffSchedule {
        BackoffSchedule::new(Duration::from_secs(30), 2.0, Duration::from_secs(300))
    }

    #[test]
    fn test_delays_grow_then_cap() {
        let s = schedule();
        assert_eq!(s.delay_for(1), Duration::from_secs(30));
        assert_eq!(s.delay_for(2), Duration::from_secs(60));
        assert_eq!(s.delay_for(3), Duration::from_secs(120));
        assert_eq!(s.delay_for(5), Duration::from_secs(300));
        assert_eq!(s.delay_for(60), Duration::from_secs(300));
    }

    #[test]
    fn test_transient_failures_exhaust_into_fatal() {
        let mut policy = RetryPolicy::new(2, schedule());

        assert_eq!(policy.record(AttemptOutcome::Transient), RetryState::FailedTransient(1));
        assert_eq!(policy.next_attempt(), Some(Duration::from_secs(30)));
        assert_eq!(policy.record(AttemptOutcome::Transient), RetryState::FailedTransient(2));
        assert_eq!(policy.next_attempt(), Some(Duration::from_secs(60)));
        assert_eq!(policy.state(), RetryState::Attempting(3));
        assert_eq!(policy.record(AttemptOutcome::Transient), RetryState::FailedFatal);
        assert_eq!(policy.next_attempt(), None);
    }

    #[test]
    fn test_fatal_and_success_are_terminal() {
        let mut policy = RetryPolicy::new(3, schedule());
        assert_eq!(policy.record(AttemptOutcome::Fatal), RetryState::FailedFatal);
        assert_eq!(policy.record(AttemptOutcome::Success), RetryState::FailedFatal);

        let mut policy = RetryPolicy::new(3, schedule());
        assert_eq!(policy.record(AttemptOutcome::Success), RetryState::Succeeded);
        assert_eq!(policy.next_attempt(), None);
    }

    #[test]
    fn test_zero_retries_means_single_attempt() {
        let mut policy = RetryPolicy::new(0, schedule());
        assert_eq!(policy.record(AttemptOutcome::Transient), RetryState::FailedFatal);
    }

    proptest! {
        #[test]
        fn backoff_is_monotonic_and_bounded(
            base_ms in 1u64..60_000,
            multiplier in 1.0f64..4.0,
            ceiling_ms in 1u64..600_000,
            k in 1u32..20,
        ) {
            let s = BackoffSchedule::new(
                Duration::from_millis(base_ms),
                multiplier,
                Duration::from_millis(ceiling_ms),
            );
            prop_assert!(s.delay_for(k) <= s.delay_for(k + 1));
            prop_assert!(s.delay_for(k) <= Duration::from_millis(ceiling_ms));
        }
    }
}
