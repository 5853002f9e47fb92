//! Threshold and exception policy
//!
//! Decides whether a classified state should produce a reminder. Pure: the
//! result depends only on the input snapshot and the trigger curve.

use crate::config::TriggerCurve;
use crate::settings::{MAX_SENSITIVITY, MIN_SENSITIVITY};
use crate::types::BehaviorState;
use chrono::Duration;
use std::collections::BTreeSet;

/// Everything the policy looks at for one evaluation
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    pub state: BehaviorState,
    /// How long `state` has been held
    pub sustained: Duration,
    pub sensitivity: u8,
    pub exception_apps: &'a BTreeSet<String>,
    pub active_app: Option<&'a str>,
    pub exercise_mode: bool,
}

/// Sensitivity-driven trigger policy
#[derive(Debug, Clone, Default)]
pub struct TriggerPolicy {
    curve: TriggerCurve,
}

impl TriggerPolicy {
    pub fn new(curve: TriggerCurve) -> Self {
        Self { curve }
    }

    pub fn curve(&self) -> &TriggerCurve {
        &self.curve
    }

    /// Sustained duration required before a state triggers.
    ///
    /// Linear between `base_window` at sensitivity 100 and
    /// `base_window * max_multiplier` at sensitivity 10. Out-of-range
    /// sensitivities are clamped.
    pub fn required_duration(&self, sensitivity: u8) -> Duration {
        let s = sensitivity.clamp(MIN_SENSITIVITY, MAX_SENSITIVITY) as f64;
        let span = (MAX_SENSITIVITY - MIN_SENSITIVITY) as f64;
        let max_multiplier = self.curve.max_multiplier.max(1.0);
        let multiplier = 1.0 + (MAX_SENSITIVITY as f64 - s) / span * (max_multiplier - 1.0);
        let base_ms = self.curve.base_window_secs.max(0) as f64 * 1000.0;
        Duration::milliseconds((base_ms * multiplier).round() as i64)
    }

    /// Whether the input should produce a reminder
    pub fn should_trigger(&self, input: &PolicyInput<'_>) -> bool {
        if let Some(app) = input.active_app {
            if input.exception_apps.contains(app) {
                return false;
            }
        }

        if input.exercise_mode
            && matches!(input.state, BehaviorState::Walking | BehaviorState::Exercising)
        {
            return false;
        }

        if input.state.reminder_kind().is_none() {
            return false;
        }

        input.sustained >= self.required_duration(input.sensitivity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [BehaviorState; 4] = BehaviorState::PRIORITY;

    fn apps(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn input<'a>(
        state: BehaviorState,
        sustained_secs: i64,
        sensitivity: u8,
        exception_apps: &'a BTreeSet<String>,
        active_app: Option<&'a str>,
        exercise_mode: bool,
    ) -> PolicyInput<'a> {
        PolicyInput {
            state,
            sustained: Duration::seconds(sustained_secs),
            sensitivity,
            exception_apps,
            active_app,
            exercise_mode,
        }
    }

    #[test]
    fn test_required_duration_endpoints() {
        let policy = TriggerPolicy::default();
        assert_eq!(policy.required_duration(100), Duration::seconds(10));
        assert_eq!(policy.required_duration(10), Duration::seconds(60));
    }

    #[test]
    fn test_required_duration_monotonic() {
        let policy = TriggerPolicy::default();
        let mut previous = policy.required_duration(10);
        for s in (20..=100).step_by(10) {
            let current = policy.required_duration(s as u8);
            assert!(current <= previous, "sensitivity {} increased latency", s);
            previous = current;
        }
    }

    #[test]
    fn test_allowlist_always_wins() {
        let policy = TriggerPolicy::default();
        let exceptions = apps(&["전화", "지도"]);
        for state in ALL_STATES {
            for s in (10..=100).step_by(10) {
                for exercise in [false, true] {
                    let i = input(state, 3600, s as u8, &exceptions, Some("지도"), exercise);
                    assert!(!policy.should_trigger(&i));
                }
            }
        }
    }

    #[test]
    fn test_exercise_mode_suppresses_walking_only() {
        let policy = TriggerPolicy::default();
        let exceptions = apps(&[]);

        let walking = input(BehaviorState::Walking, 3600, 100, &exceptions, Some("sns"), true);
        assert!(!policy.should_trigger(&walking));

        for exercise in [false, true] {
            let lying = input(BehaviorState::Lying, 3600, 100, &exceptions, Some("sns"), exercise);
            assert!(policy.should_trigger(&lying));
        }
    }

    #[test]
    fn test_states_without_reminder_never_trigger() {
        let policy = TriggerPolicy::default();
        let exceptions = apps(&[]);
        for state in [BehaviorState::Stationary, BehaviorState::Exercising] {
            let i = input(state, 3600, 100, &exceptions, None, false);
            assert!(!policy.should_trigger(&i));
        }
    }

    #[test]
    fn test_sustained_threshold() {
        let policy = TriggerPolicy::default();
        let exceptions = apps(&[]);
        // sensitivity 70 -> 1 + 30/90 * 5 = 2.67x -> 26.667s
        let short = input(BehaviorState::Walking, 26, 70, &exceptions, None, false);
        assert!(!policy.should_trigger(&short));
        let long = input(BehaviorState::Walking, 27, 70, &exceptions, None, false);
        assert!(policy.should_trigger(&long));
    }

    #[test]
    fn test_deterministic() {
        let policy = TriggerPolicy::default();
        let exceptions = apps(&[]);
        let i = input(BehaviorState::Lying, 30, 60, &exceptions, Some("video"), false);
        let first = policy.should_trigger(&i);
        for _ in 0..100 {
            assert_eq!(policy.should_trigger(&i), first);
        }
    }

    #[test]
    fn test_custom_curve() {
        let policy = TriggerPolicy::new(TriggerCurve {
            base_window_secs: 20,
            max_multiplier: 3.0,
        });
        assert_eq!(policy.required_duration(100), Duration::seconds(20));
        assert_eq!(policy.required_duration(10), Duration::seconds(60));
        assert_eq!(policy.required_duration(55), Duration::seconds(40));
    }
}
