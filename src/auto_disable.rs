//! Auto-disable state machine.
//!
//! Consecutive failures push an endpoint into exponential backoff; once the
//! configured number of backoff cycles is used up it is disabled until someone
//! re-enables it. A single success resets everything. Eligibility is computed
//! lazily from the stored state, so nothing has to sweep expired backoffs.

use chrono::{DateTime, Duration, Utc};

use crate::types::{DisabledState, Endpoint};

#[derive(Debug, Clone, PartialEq)]
pub struct AutoDisablePolicy {
    pub failure_threshold: u32,
    pub backoff_base_secs: u64,
    pub backoff_factor: f64,
    pub backoff_max_secs: u64,
    pub max_backoff_cycles: u32,
}

impl Default for AutoDisablePolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            backoff_base_secs: 60,
            backoff_factor: 2.0,
            backoff_max_secs: 86_400,
            max_backoff_cycles: 8,
        }
    }
}

/// The auto-disable fields of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerState {
    pub disabled: DisabledState,
    pub recent_failures: u32,
    pub backoff_count: u32,
}

impl TrackerState {
    pub fn of(endpoint: &Endpoint) -> Self {
        Self {
            disabled: endpoint.disabled,
            recent_failures: endpoint.recent_failures,
            backoff_count: endpoint.backoff_count,
        }
    }

    pub fn enabled() -> Self {
        Self {
            disabled: DisabledState::Enabled,
            recent_failures: 0,
            backoff_count: 0,
        }
    }
}

/// Whether deliveries to an endpoint in `state` may proceed at `now`.
pub fn is_eligible(state: &DisabledState, now: DateTime<Utc>) -> bool {
    match state {
        DisabledState::Enabled => true,
        DisabledState::BackingOff { until } => now >= *until,
        DisabledState::PermanentlyDisabled => false,
    }
}

impl AutoDisablePolicy {
    /// Length of the backoff started after `backoff_count` earlier cycles.
    pub fn backoff_interval(&self, backoff_count: u32) -> Duration {
        let exponent = i32::try_from(backoff_count).unwrap_or(i32::MAX);
        let base = self.backoff_base_secs as f64;
        let max_secs = self.backoff_max_secs as f64;

        let secs = (base * self.backoff_factor.powi(exponent)).min(max_secs);
        Duration::try_seconds(secs.round() as i64).unwrap_or_else(|| Duration::days(36_500))
    }

    pub fn on_success(&self) -> TrackerState {
        TrackerState::enabled()
    }

    pub fn on_failure(&self, current: TrackerState, now: DateTime<Utc>) -> TrackerState {
        let recent_failures = current.recent_failures.saturating_add(1);

        if recent_failures < self.failure_threshold
            || current.disabled == DisabledState::PermanentlyDisabled
        {
            return TrackerState {
                recent_failures,
                ..current
            };
        }

        if current.backoff_count >= self.max_backoff_cycles {
            return TrackerState {
                disabled: DisabledState::PermanentlyDisabled,
                recent_failures,
                backoff_count: current.backoff_count,
            };
        }

        // A backoff too long to represent is as good as disabling outright.
        let Some(until) = now.checked_add_signed(self.backoff_interval(current.backoff_count))
        else {
            return TrackerState {
                disabled: DisabledState::PermanentlyDisabled,
                recent_failures,
                backoff_count: current.backoff_count,
            };
        };

        TrackerState {
            disabled: DisabledState::BackingOff { until },
            recent_failures,
            backoff_count: current.backoff_count + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AutoDisablePolicy {
        AutoDisablePolicy {
            failure_threshold: 3,
            backoff_base_secs: 60,
            backoff_factor: 2.0,
            backoff_max_secs: 600,
            max_backoff_cycles: 2,
        }
    }

    #[test]
    fn stays_enabled_below_threshold() {
        let now = Utc::now();
        let state = policy().on_failure(TrackerState::enabled(), now);
        let state = policy().on_failure(state, now);

        assert_eq!(state.disabled, DisabledState::Enabled);
        assert_eq!(state.recent_failures, 2);
        assert_eq!(state.backoff_count, 0);
    }

    #[test]
    fn backs_off_at_threshold() {
        let now = Utc::now();
        let mut state = TrackerState::enabled();
        for _ in 0..3 {
            state = policy().on_failure(state, now);
        }

        assert_eq!(
            state.disabled,
            DisabledState::BackingOff {
                until: now + Duration::seconds(60)
            }
        );
        assert_eq!(state.backoff_count, 1);
        assert!(!is_eligible(&state.disabled, now));
        assert!(is_eligible(&state.disabled, now + Duration::seconds(60)));
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let policy = policy();
        assert_eq!(policy.backoff_interval(0), Duration::seconds(60));
        assert_eq!(policy.backoff_interval(1), Duration::seconds(120));
        assert_eq!(policy.backoff_interval(3), Duration::seconds(480));
        assert_eq!(policy.backoff_interval(4), Duration::seconds(600));
        assert_eq!(policy.backoff_interval(u32::MAX), Duration::seconds(600));
    }

    #[test]
    fn exhausting_cycles_disables_permanently() {
        let policy = policy();
        let mut now = Utc::now();
        let mut state = TrackerState::enabled();

        for _ in 0..3 {
            state = policy.on_failure(state, now);
        }
        now += Duration::hours(1);
        state = policy.on_failure(state, now);
        assert_eq!(state.backoff_count, 2);
        assert!(matches!(state.disabled, DisabledState::BackingOff { .. }));

        now += Duration::hours(1);
        state = policy.on_failure(state, now);
        assert_eq!(state.disabled, DisabledState::PermanentlyDisabled);
        assert!(!is_eligible(&state.disabled, now + Duration::days(365)));

        let after = policy.on_failure(state, now);
        assert_eq!(after.disabled, DisabledState::PermanentlyDisabled);
    }

    #[test]
    fn unrepresentable_backoff_disables_instead_of_overflowing() {
        let policy = AutoDisablePolicy {
            failure_threshold: 1,
            backoff_base_secs: 1_000_000_000_000_000,
            backoff_max_secs: 1_000_000_000_000_000,
            ..AutoDisablePolicy::default()
        };

        let state = policy.on_failure(TrackerState::enabled(), Utc::now());
        assert_eq!(state.disabled, DisabledState::PermanentlyDisabled);
        assert_eq!(state.recent_failures, 1);
    }

    #[test]
    fn success_after_backoff_resets_everything() {
        let policy = policy();
        let now = Utc::now();
        let mut state = TrackerState::enabled();
        for _ in 0..3 {
            state = policy.on_failure(state, now);
        }
        assert_ne!(state, TrackerState::enabled());

        let state = policy.on_success();
        assert_eq!(state.disabled, DisabledState::Enabled);
        assert_eq!(state.recent_failures, 0);
        assert_eq!(state.backoff_count, 0);
    }
}
