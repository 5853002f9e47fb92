//! Engine configuration
//!
//! Tunable constants for the classifier, trigger curve, cooldown and local time.
//! None of these are contractual; they are defaults chosen to be tuned.

use chrono::Offset;
use serde::{Deserialize, Serialize};

/// Default smoothing window in samples
pub const DEFAULT_SMOOTHING_WINDOW: usize = 5;

/// Default reminder cooldown (5 minutes)
pub const DEFAULT_COOLDOWN_SECS: i64 = 300;

/// Default sustained-state window at sensitivity 100
pub const DEFAULT_BASE_TRIGGER_SECS: i64 = 10;

/// Default multiplier of the base window at sensitivity 10
pub const DEFAULT_MAX_MULTIPLIER: f64 = 6.0;

/// Thresholds and smoothing for the posture classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Number of candidate states kept in the rolling window
    pub window: usize,
    /// Votes a candidate needs within the window before the state flips
    pub quorum: usize,
    /// Tilt at or above which the phone is considered held overhead
    pub lying_tilt_deg: f64,
    /// Minimum motion intensity for walking (m/s²)
    pub walking_min_intensity: f64,
    /// Minimum cadence for walking (steps/min)
    pub walking_min_cadence: f64,
    /// Cadence at which walking becomes running (steps/min)
    pub running_cadence: f64,
    /// Motion intensity treated as exercise regardless of cadence (m/s²)
    pub exercise_intensity: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_SMOOTHING_WINDOW,
            quorum: DEFAULT_SMOOTHING_WINDOW,
            lying_tilt_deg: 110.0,
            walking_min_intensity: 0.8,
            walking_min_cadence: 60.0,
            running_cadence: 140.0,
            exercise_intensity: 6.0,
        }
    }
}

/// Mapping from sensitivity to required sustained duration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerCurve {
    /// Required sustained duration at sensitivity 100 (seconds)
    pub base_window_secs: i64,
    /// Multiplier of the base window at sensitivity 10
    pub max_multiplier: f64,
}

impl Default for TriggerCurve {
    fn default() -> Self {
        Self {
            base_window_secs: DEFAULT_BASE_TRIGGER_SECS,
            max_multiplier: DEFAULT_MAX_MULTIPLIER,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub classifier: ClassifierConfig,
    pub trigger: TriggerCurve,
    pub cooldown: CooldownConfig,
    /// Offset of the user's local time from UTC, in minutes.
    /// Used for bedtime windows and period labels.
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub seconds: i64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            seconds: DEFAULT_COOLDOWN_SECS,
        }
    }
}

impl EngineConfig {
    /// Load configuration from JSON; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Local timezone derived from `utc_offset_minutes`, falling back to UTC
    /// when the offset is out of range
    pub fn local_offset(&self) -> chrono::FixedOffset {
        chrono::FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| {
            log::warn!(
                "utc_offset_minutes {} out of range, using UTC",
                self.utc_offset_minutes
            );
            chrono::Utc.fix()
        })
    }
}
