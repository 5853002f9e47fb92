//! User settings and the shared snapshot handle
//!
//! Settings are replaced as whole records: a patch is applied to a copy of the
//! current snapshot, validated, and only then swapped in. Readers always see
//! either the old record or the new one.

use crate::error::CoachError;
use crate::types::ReminderKind;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Lowest allowed sensitivity value
pub const MIN_SENSITIVITY: u8 = 10;
/// Highest allowed sensitivity value
pub const MAX_SENSITIVITY: u8 = 100;
/// Sensitivity slider step
pub const SENSITIVITY_STEP: u8 = 10;

/// Detection and alert settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub walking_detection_enabled: bool,
    pub lying_detection_enabled: bool,
    pub exercise_mode: bool,
    pub walking_sensitivity: u8,
    pub lying_sensitivity: u8,
    /// Local hour (0-23) at which the bedtime window starts
    pub bedtime_start: u8,
    /// Local hour (0-23) at which the bedtime window ends
    pub bedtime_end: u8,
    pub vibration: bool,
    pub sound: bool,
    pub popup: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            walking_detection_enabled: true,
            lying_detection_enabled: true,
            exercise_mode: false,
            walking_sensitivity: 70,
            lying_sensitivity: 60,
            bedtime_start: 22,
            bedtime_end: 7,
            vibration: true,
            sound: false,
            popup: true,
        }
    }
}

impl Settings {
    /// Check every field against its declared range
    pub fn validate(&self) -> Result<(), CoachError> {
        validate_sensitivity("walking_sensitivity", self.walking_sensitivity)?;
        validate_sensitivity("lying_sensitivity", self.lying_sensitivity)?;
        validate_hour("bedtime_start", self.bedtime_start)?;
        validate_hour("bedtime_end", self.bedtime_end)?;
        Ok(())
    }

    pub fn detection_enabled(&self, kind: ReminderKind) -> bool {
        match kind {
            ReminderKind::Walking => self.walking_detection_enabled,
            ReminderKind::Lying => self.lying_detection_enabled,
        }
    }

    pub fn sensitivity(&self, kind: ReminderKind) -> u8 {
        match kind {
            ReminderKind::Walking => self.walking_sensitivity,
            ReminderKind::Lying => self.lying_sensitivity,
        }
    }

    /// Whether a local hour falls inside the bedtime window.
    ///
    /// The window is `[start, end)` and wraps past midnight when `start > end`.
    /// `start == end` means no bedtime window.
    pub fn is_bedtime(&self, hour: u32) -> bool {
        let start = self.bedtime_start as u32;
        let end = self.bedtime_end as u32;
        if start == end {
            false
        } else if start < end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }

    /// Apply a patch to a copy of these settings and validate the result
    pub fn patched(&self, patch: &SettingsPatch) -> Result<Settings, CoachError> {
        let mut next = self.clone();
        if let Some(v) = patch.walking_detection_enabled {
            next.walking_detection_enabled = v;
        }
        if let Some(v) = patch.lying_detection_enabled {
            next.lying_detection_enabled = v;
        }
        if let Some(v) = patch.exercise_mode {
            next.exercise_mode = v;
        }
        if let Some(v) = patch.walking_sensitivity {
            next.walking_sensitivity = v;
        }
        if let Some(v) = patch.lying_sensitivity {
            next.lying_sensitivity = v;
        }
        if let Some(v) = patch.bedtime_start {
            next.bedtime_start = v;
        }
        if let Some(v) = patch.bedtime_end {
            next.bedtime_end = v;
        }
        if let Some(v) = patch.vibration {
            next.vibration = v;
        }
        if let Some(v) = patch.sound {
            next.sound = v;
        }
        if let Some(v) = patch.popup {
            next.popup = v;
        }
        next.validate()?;
        Ok(next)
    }
}

fn validate_sensitivity(field: &str, value: u8) -> Result<(), CoachError> {
    if !(MIN_SENSITIVITY..=MAX_SENSITIVITY).contains(&value) || value % SENSITIVITY_STEP != 0 {
        return Err(CoachError::InvalidSetting(format!(
            "{} must be {}-{} in steps of {}, got {}",
            field, MIN_SENSITIVITY, MAX_SENSITIVITY, SENSITIVITY_STEP, value
        )));
    }
    Ok(())
}

fn validate_hour(field: &str, value: u8) -> Result<(), CoachError> {
    if value > 23 {
        return Err(CoachError::InvalidSetting(format!(
            "{} must be an hour 0-23, got {}",
            field, value
        )));
    }
    Ok(())
}

/// Partial settings update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub walking_detection_enabled: Option<bool>,
    pub lying_detection_enabled: Option<bool>,
    pub exercise_mode: Option<bool>,
    pub walking_sensitivity: Option<u8>,
    pub lying_sensitivity: Option<u8>,
    pub bedtime_start: Option<u8>,
    pub bedtime_end: Option<u8>,
    pub vibration: Option<bool>,
    pub sound: Option<bool>,
    pub popup: Option<bool>,
}

/// Shared, atomically swapped settings snapshot.
///
/// Cloning the handle shares the same underlying record, so a UI thread can
/// hold one while the engine owns writes.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    current: Arc<RwLock<Arc<Settings>>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Result<Self, CoachError> {
        settings.validate()?;
        Ok(Self {
            current: Arc::new(RwLock::new(Arc::new(settings))),
        })
    }

    /// Current complete settings record
    pub fn snapshot(&self) -> Arc<Settings> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply a patch; on validation failure the previous record is retained
    pub fn update(&self, patch: &SettingsPatch) -> Result<Arc<Settings>, CoachError> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(guard.patched(patch)?);
        *guard = next.clone();
        Ok(next)
    }

    /// Replace the whole record (used when loading persisted state)
    pub fn replace(&self, settings: Settings) -> Result<(), CoachError> {
        settings.validate()?;
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.walking_sensitivity, 70);
        assert_eq!(settings.lying_sensitivity, 60);
    }

    #[test]
    fn test_read_after_write_returns_written_values() {
        let handle = SettingsHandle::default();
        let patch = SettingsPatch {
            exercise_mode: Some(true),
            walking_sensitivity: Some(30),
            bedtime_start: Some(23),
            sound: Some(true),
            ..SettingsPatch::default()
        };
        let written = handle.update(&patch).unwrap();
        let read = handle.snapshot();
        assert_eq!(*read, *written);
        assert!(read.exercise_mode);
        assert_eq!(read.walking_sensitivity, 30);
        assert_eq!(read.bedtime_start, 23);
        assert!(read.sound);
        // Untouched fields keep their defaults
        assert_eq!(read.lying_sensitivity, 60);
    }

    #[test]
    fn test_invalid_patch_retains_previous_settings() {
        let handle = SettingsHandle::default();
        let before = handle.snapshot();

        // exercise_mode is valid but sensitivity is not: nothing may apply
        let patch = SettingsPatch {
            exercise_mode: Some(true),
            walking_sensitivity: Some(105),
            ..SettingsPatch::default()
        };
        let result = handle.update(&patch);
        assert!(matches!(result, Err(CoachError::InvalidSetting(_))));
        assert_eq!(*handle.snapshot(), *before);
    }

    #[test]
    fn test_sensitivity_must_be_on_step() {
        let settings = Settings::default();
        let patch = SettingsPatch {
            lying_sensitivity: Some(55),
            ..SettingsPatch::default()
        };
        assert!(settings.patched(&patch).is_err());

        let patch = SettingsPatch {
            lying_sensitivity: Some(0),
            ..SettingsPatch::default()
        };
        assert!(settings.patched(&patch).is_err());
    }

    #[test]
    fn test_bedtime_hour_range() {
        let settings = Settings::default();
        let patch = SettingsPatch {
            bedtime_end: Some(24),
            ..SettingsPatch::default()
        };
        assert!(settings.patched(&patch).is_err());
    }

    #[test]
    fn test_bedtime_window_wraps_midnight() {
        let settings = Settings::default(); // 22 -> 7
        assert!(settings.is_bedtime(22));
        assert!(settings.is_bedtime(3));
        assert!(!settings.is_bedtime(7));
        assert!(!settings.is_bedtime(12));
    }

    #[test]
    fn test_bedtime_window_same_day_and_empty() {
        let mut settings = Settings::default();
        settings.bedtime_start = 13;
        settings.bedtime_end = 15;
        assert!(settings.is_bedtime(14));
        assert!(!settings.is_bedtime(15));

        settings.bedtime_end = 13;
        assert!(!settings.is_bedtime(13));
    }

    #[test]
    fn test_handles_share_state() {
        let handle = SettingsHandle::default();
        let reader = handle.clone();
        handle
            .update(&SettingsPatch {
                popup: Some(false),
                ..SettingsPatch::default()
            })
            .unwrap();
        assert!(!reader.snapshot().popup);
    }
}
