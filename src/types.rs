//! Core types for the Posture Nudge engine
//!
//! This module defines the data structures that flow through each stage of the
//! engine: raw motion samples, classified behavior samples, reminder events and
//! usage buckets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discrete behavior state produced by the posture classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorState {
    Walking,
    Lying,
    Stationary,
    Exercising,
}

impl BehaviorState {
    /// All states in tie-break priority order (highest first)
    pub const PRIORITY: [BehaviorState; 4] = [
        BehaviorState::Lying,
        BehaviorState::Walking,
        BehaviorState::Exercising,
        BehaviorState::Stationary,
    ];

    /// Rank in the tie-break order; lower wins
    pub fn priority_rank(&self) -> usize {
        match self {
            BehaviorState::Lying => 0,
            BehaviorState::Walking => 1,
            BehaviorState::Exercising => 2,
            BehaviorState::Stationary => 3,
        }
    }

    /// Reminder kind associated with this state, if any
    pub fn reminder_kind(&self) -> Option<ReminderKind> {
        match self {
            BehaviorState::Walking => Some(ReminderKind::Walking),
            BehaviorState::Lying => Some(ReminderKind::Lying),
            BehaviorState::Stationary | BehaviorState::Exercising => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorState::Walking => "walking",
            BehaviorState::Lying => "lying",
            BehaviorState::Stationary => "stationary",
            BehaviorState::Exercising => "exercising",
        }
    }
}

/// Kind of reminder the engine can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Walking,
    Lying,
}

impl ReminderKind {
    pub const ALL: [ReminderKind; 2] = [ReminderKind::Walking, ReminderKind::Lying];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::Walking => "walking",
            ReminderKind::Lying => "lying",
        }
    }

    /// Index into per-kind arrays
    pub(crate) fn index(&self) -> usize {
        match self {
            ReminderKind::Walking => 0,
            ReminderKind::Lying => 1,
        }
    }
}

/// Raw motion/orientation reading from the sensor layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMotion {
    /// Sample timestamp (must strictly increase between samples)
    pub timestamp: DateTime<Utc>,
    /// Dynamic acceleration RMS with gravity removed (m/s²)
    pub motion_intensity: f64,
    /// Step cadence (steps per minute)
    #[serde(default)]
    pub step_cadence: f64,
    /// Screen angle from face-up horizontal, 0-180 degrees
    /// (0 = flat on a table, 90 = upright, 180 = held overhead facing down)
    pub tilt_deg: f64,
    /// Identifier of the app currently in the foreground, if the screen is on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground_app: Option<String>,
}

/// A classified behavior sample; consumed by the policy layer, never retained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSample {
    pub timestamp: DateTime<Utc>,
    pub state: BehaviorState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_context: Option<String>,
}

/// A reminder emitted by the dispatcher and recorded in the history store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderEvent {
    pub id: Uuid,
    pub kind: ReminderKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged: bool,
}

impl ReminderEvent {
    /// Create a new, unacknowledged reminder with a fresh id
    pub fn new(kind: ReminderKind, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            timestamp,
            acknowledged: false,
        }
    }
}

/// Reporting period granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Week,
    Month,
    Quarter,
    Year,
}

impl Period {
    pub const ALL: [Period; 4] = [Period::Week, Period::Month, Period::Quarter, Period::Year];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Week => "week",
            Period::Month => "month",
            Period::Quarter => "quarter",
            Period::Year => "year",
        }
    }

    /// Display name used in generated reports
    pub fn display_name(&self) -> &'static str {
        match self {
            Period::Week => "주간",
            Period::Month => "월간",
            Period::Quarter => "분기",
            Period::Year => "연간",
        }
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "quarter" => Ok(Period::Quarter),
            "year" => Ok(Period::Year),
            other => Err(format!("unknown period: {}", other)),
        }
    }
}

/// Aggregated usage totals for one label within a reporting period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageBucket {
    /// Period label (weekday, day of month or month)
    pub label: String,
    pub walking_minutes: u32,
    pub lying_minutes: u32,
}

impl UsageBucket {
    pub fn new(label: impl Into<String>, walking_minutes: u32, lying_minutes: u32) -> Self {
        Self {
            label: label.into(),
            walking_minutes,
            lying_minutes,
        }
    }

    /// Empty bucket for a label
    pub fn empty(label: impl Into<String>) -> Self {
        Self::new(label, 0, 0)
    }

    pub fn total_minutes(&self) -> u32 {
        self.walking_minutes + self.lying_minutes
    }

    pub(crate) fn add(&mut self, kind: ReminderKind, minutes: u32) {
        match kind {
            ReminderKind::Walking => {
                self.walking_minutes = self.walking_minutes.saturating_add(minutes)
            }
            ReminderKind::Lying => self.lying_minutes = self.lying_minutes.saturating_add(minutes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let mut states = vec![
            BehaviorState::Stationary,
            BehaviorState::Exercising,
            BehaviorState::Walking,
            BehaviorState::Lying,
        ];
        states.sort_by_key(|s| s.priority_rank());
        assert_eq!(states, BehaviorState::PRIORITY.to_vec());
    }

    #[test]
    fn test_reminder_kind_mapping() {
        assert_eq!(BehaviorState::Walking.reminder_kind(), Some(ReminderKind::Walking));
        assert_eq!(BehaviorState::Lying.reminder_kind(), Some(ReminderKind::Lying));
        assert_eq!(BehaviorState::Stationary.reminder_kind(), None);
        assert_eq!(BehaviorState::Exercising.reminder_kind(), None);
    }

    #[test]
    fn test_period_parse() {
        assert_eq!("week".parse::<Period>().unwrap(), Period::Week);
        assert_eq!("QUARTER".parse::<Period>().unwrap(), Period::Quarter);
        assert!("decade".parse::<Period>().is_err());
    }

    #[test]
    fn test_raw_motion_deserialize_defaults() {
        let json = r#"{
            "timestamp": "2024-01-15T14:00:00Z",
            "motion_intensity": 1.2,
            "tilt_deg": 60.0
        }"#;
        let motion: RawMotion = serde_json::from_str(json).unwrap();
        assert_eq!(motion.step_cadence, 0.0);
        assert!(motion.foreground_app.is_none());
    }

    #[test]
    fn test_reminder_event_serialization() {
        let ts = "2024-01-15T14:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let event = ReminderEvent::new(ReminderKind::Lying, "put it down", ts);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "lying");
        assert_eq!(json["acknowledged"], false);
    }
}
