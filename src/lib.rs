//! Posture Nudge - on-device phone-use coaching engine
//!
//! Nudge watches motion samples for two unhealthy phone-use postures (using the
//! phone while walking, and while lying down) and issues throttled reminders
//! through a deterministic pipeline: raw motion → smoothed behavior state →
//! trigger policy → cooldown dispatcher → reminder history.
//!
//! ## Modules
//!
//! - **Detection**: `classifier`, `policy` and `dispatcher` turn samples into reminders
//! - **Preferences**: `settings` and `exceptions` hold what the user controls
//! - **Statistics**: `aggregator` and `analysis` roll usage minutes into period reports
//! - **Engine**: `engine::CoachEngine` ties it all together for a UI layer

pub mod aggregator;
pub mod analysis;
pub mod channel;
pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod exceptions;
pub mod history;
pub mod messages;
pub mod policy;
pub mod settings;
pub mod storage;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use analysis::{UsageAnalysis, UsageReport};
pub use channel::{LogChannel, Modalities, Notification, NotificationChannel, NullChannel};
pub use config::EngineConfig;
pub use engine::{CoachEngine, EngineMetrics, SampleOutcome, TodayStats};
pub use error::CoachError;
pub use settings::{Settings, SettingsPatch};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use types::{BehaviorState, Period, RawMotion, ReminderEvent, ReminderKind, UsageBucket};

/// Library version reported by the CLI and FFI
pub const NUDGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI doctor
pub const PRODUCER_NAME: &str = "posture-nudge";
