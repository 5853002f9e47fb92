//! Notification channels
//!
//! The engine hands finished reminders to a `NotificationChannel`. Delivery is
//! best-effort; the channel reports failure and the engine carries on.

use crate::error::CoachError;
use crate::settings::Settings;
use crate::types::ReminderKind;
use serde::{Deserialize, Serialize};

/// Alert modalities requested for a notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modalities {
    pub vibration: bool,
    pub sound: bool,
    pub popup: bool,
}

impl Modalities {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            vibration: settings.vibration,
            sound: settings.sound,
            popup: settings.popup,
        }
    }

    pub fn is_silent(&self) -> bool {
        !self.vibration && !self.sound && !self.popup
    }
}

/// A user-facing notification request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: ReminderKind,
    pub message: String,
    pub modalities: Modalities,
}

/// Trait for notification sinks (OS notifications, UI toasts, ...)
pub trait NotificationChannel {
    /// Deliver a notification; errors are reported, never fatal
    fn deliver(&self, notification: &Notification) -> Result<(), CoachError>;
}

/// Channel that writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

impl NotificationChannel for LogChannel {
    fn deliver(&self, notification: &Notification) -> Result<(), CoachError> {
        log::info!(
            "[{}] {} (vibration={}, sound={}, popup={})",
            notification.kind.as_str(),
            notification.message,
            notification.modalities.vibration,
            notification.modalities.sound,
            notification.modalities.popup
        );
        Ok(())
    }
}

/// Channel that discards every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NullChannel;

impl NotificationChannel for NullChannel {
    fn deliver(&self, _notification: &Notification) -> Result<(), CoachError> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records deliveries and optionally fails them
    #[derive(Debug, Clone, Default)]
    pub struct RecordingChannel {
        pub delivered: Rc<RefCell<Vec<Notification>>>,
        pub fail: bool,
    }

    impl RecordingChannel {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }
    }

    impl NotificationChannel for RecordingChannel {
        fn deliver(&self, notification: &Notification) -> Result<(), CoachError> {
            if self.fail {
                return Err(CoachError::DeliveryFailure("channel offline".to_string()));
            }
            self.delivered.borrow_mut().push(notification.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modalities_from_default_settings() {
        let modalities = Modalities::from_settings(&Settings::default());
        assert!(modalities.vibration);
        assert!(!modalities.sound);
        assert!(modalities.popup);
        assert!(!modalities.is_silent());
        assert!(Modalities::default().is_silent());
    }

    #[test]
    fn test_builtin_channels_succeed() {
        let notification = Notification {
            kind: ReminderKind::Walking,
            message: "look up".to_string(),
            modalities: Modalities::default(),
        };
        assert!(LogChannel.deliver(&notification).is_ok());
        assert!(NullChannel.deliver(&notification).is_ok());
    }
}
