//! Error types for Posture Nudge
//!
//! None of these are fatal to monitoring: every variant describes a rejected or
//! degraded operation that leaves engine state as it was.

use thiserror::Error;

/// Errors that can occur while driving the engine
#[derive(Debug, Error)]
pub enum CoachError {
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Exception app already registered: {0}")]
    DuplicateException(String),

    #[error("Reminder not found: {0}")]
    NotFound(String),

    #[error("Dropped sample: {0}")]
    DroppedSample(String),

    #[error("Notification delivery failed: {0}")]
    DeliveryFailure(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),
}
