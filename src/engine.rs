//! Engine orchestration
//!
//! This module provides the public API a UI layer drives. It wires the stages
//! together: raw motion → classifier → policy → dispatcher → history, with usage
//! minutes flowing into the period aggregator alongside.

use crate::aggregator::PeriodAggregator;
use crate::analysis::UsageReport;
use crate::channel::{LogChannel, Modalities, Notification, NotificationChannel};
use crate::classifier::{ClassifierMetrics, PostureClassifier};
use crate::config::EngineConfig;
use crate::dispatcher::{DispatchContext, DispatchMetrics, DispatchState, ReminderDispatcher};
use crate::error::CoachError;
use crate::exceptions::ExceptionApps;
use crate::history::HistoryStore;
use crate::messages::{messages_for, Tone};
use crate::policy::{PolicyInput, TriggerPolicy};
use crate::settings::{Settings, SettingsHandle, SettingsPatch};
use crate::storage::{KeyValueStore, EXCEPTIONS_KEY, REMINDERS_KEY, SETTINGS_KEY, USAGE_KEY};
use crate::types::{BehaviorState, Period, RawMotion, ReminderEvent, ReminderKind, UsageBucket};
use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Longest gap between samples that still counts as continuous usage
const MAX_USAGE_GAP_SECS: i64 = 120;

/// Result of feeding one sample to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleOutcome {
    /// Absent when the input could not be parsed as a sample
    pub timestamp: Option<DateTime<Utc>>,
    /// False when the sample was dropped (unparsable, out of order or malformed)
    pub accepted: bool,
    pub state: BehaviorState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder: Option<ReminderEvent>,
}

/// Engine-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub classifier: ClassifierMetrics,
    pub dispatch: DispatchMetrics,
}

/// Dashboard figures for the current local day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodayStats {
    pub walking_minutes: u32,
    pub lying_minutes: u32,
    pub reminders: usize,
}

/// Converts observed screen-on time into whole usage minutes
#[derive(Debug, Clone, Default)]
struct UsageAccumulator {
    last: Option<(DateTime<Utc>, Option<ReminderKind>)>,
    pending_secs: [i64; 2],
}

impl UsageAccumulator {
    /// Account for the interval since the previous sample; returns whole
    /// minutes ready to be recorded for the kind that held during it
    fn observe(
        &mut self,
        now: DateTime<Utc>,
        counted_kind: Option<ReminderKind>,
    ) -> Option<(ReminderKind, u32)> {
        let ready = match self.last {
            Some((previous, Some(kind))) => {
                let gap = (now - previous).num_seconds().clamp(0, MAX_USAGE_GAP_SECS);
                let pending = &mut self.pending_secs[kind.index()];
                *pending += gap;
                let minutes = *pending / 60;
                *pending %= 60;
                (minutes > 0).then_some((kind, minutes as u32))
            }
            _ => None,
        };
        self.last = Some((now, counted_kind));
        ready
    }
}

/// Detection and reminder engine
pub struct CoachEngine {
    config: EngineConfig,
    offset: FixedOffset,
    settings: SettingsHandle,
    exceptions: ExceptionApps,
    classifier: PostureClassifier,
    policy: TriggerPolicy,
    dispatcher: ReminderDispatcher,
    history: Arc<HistoryStore>,
    aggregator: PeriodAggregator,
    usage: UsageAccumulator,
    channel: Box<dyn NotificationChannel>,
    monitoring: bool,
}

impl Default for CoachEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl CoachEngine {
    /// Create an engine with default settings that notifies through the log
    pub fn new(config: EngineConfig) -> Self {
        Self::with_channel(config, Box::new(LogChannel))
    }

    /// Create an engine with default settings and a custom notification channel
    pub fn with_channel(config: EngineConfig, channel: Box<dyn NotificationChannel>) -> Self {
        let offset = config.local_offset();
        Self {
            classifier: PostureClassifier::new(config.classifier.clone()),
            policy: TriggerPolicy::new(config.trigger.clone()),
            dispatcher: ReminderDispatcher::new(Duration::seconds(config.cooldown.seconds.max(0))),
            aggregator: PeriodAggregator::with_offset(offset),
            offset,
            config,
            settings: SettingsHandle::default(),
            exceptions: ExceptionApps::default(),
            history: Arc::new(HistoryStore::new()),
            usage: UsageAccumulator::default(),
            channel,
            monitoring: true,
        }
    }

    /// Restore an engine from persisted state; missing keys fall back to
    /// first-run defaults
    pub fn load(
        config: EngineConfig,
        store: &dyn KeyValueStore,
        channel: Box<dyn NotificationChannel>,
    ) -> Result<Self, CoachError> {
        let mut engine = Self::with_channel(config, channel);

        if let Some(json) = store.get(SETTINGS_KEY)? {
            let settings: Settings = serde_json::from_str(&json)?;
            engine.settings.replace(settings)?;
        }
        if let Some(json) = store.get(EXCEPTIONS_KEY)? {
            engine.exceptions = serde_json::from_str(&json)?;
        }
        if let Some(json) = store.get(REMINDERS_KEY)? {
            let events: Vec<ReminderEvent> = serde_json::from_str(&json)?;
            engine.history.replace(events);
        }
        if let Some(json) = store.get(USAGE_KEY)? {
            let mut aggregator = PeriodAggregator::from_json(&json)?;
            let configured = engine.offset.local_minus_utc();
            if aggregator.utc_offset_secs() != configured {
                log::warn!(
                    "stored usage rollups use utc offset {}s; applying configured {}s",
                    aggregator.utc_offset_secs(),
                    configured
                );
                aggregator.set_offset(engine.offset);
            }
            engine.aggregator = aggregator;
        }

        log::info!(
            "engine loaded: {} reminders, {} exception apps",
            engine.history.len(),
            engine.exceptions.len()
        );
        Ok(engine)
    }

    /// Persist settings, exception apps, reminder log and usage rollups
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), CoachError> {
        store.put(SETTINGS_KEY, &serde_json::to_string(&*self.settings.snapshot())?)?;
        store.put(EXCEPTIONS_KEY, &serde_json::to_string(&self.exceptions)?)?;
        store.put(REMINDERS_KEY, &self.history.to_json()?)?;
        store.put(USAGE_KEY, &self.aggregator.to_json()?)?;
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Sensor input
    // ------------------------------------------------------------------

    /// Feed one motion sample through classification, usage accounting and
    /// the reminder pipeline. Dropped samples are counted, never fatal.
    pub fn process_sample(&mut self, sample: &RawMotion) -> SampleOutcome {
        let classified = match self.classifier.classify(sample) {
            Ok(classified) => classified,
            Err(_) => {
                return SampleOutcome {
                    timestamp: Some(sample.timestamp),
                    accepted: false,
                    state: self.classifier.state(),
                    reminder: None,
                }
            }
        };
        let now = classified.timestamp;
        let active_app = classified.app_context.as_deref();

        self.dispatcher.tick(now);
        self.aggregator.roll_to(now);

        let counted_kind = match active_app {
            Some(app) if !self.exceptions.contains(app) => classified.state.reminder_kind(),
            _ => None,
        };
        if let Some((kind, minutes)) = self.usage.observe(now, counted_kind) {
            self.aggregator.record_usage(kind, minutes, now);
        }

        let reminder = if self.monitoring {
            self.evaluate(classified.state, now, active_app)
        } else {
            None
        };

        SampleOutcome {
            timestamp: Some(now),
            accepted: true,
            state: classified.state,
            reminder,
        }
    }

    /// Parse one `RawMotion` JSON sample and feed it through `process_sample`.
    /// Input that does not parse is counted as a dropped sample, never fatal.
    pub fn process_sample_json(&mut self, json: &str) -> SampleOutcome {
        match serde_json::from_str::<RawMotion>(json) {
            Ok(sample) => self.process_sample(&sample),
            Err(e) => {
                log::warn!("dropping unparsable sample: {}", e);
                self.classifier.record_dropped();
                SampleOutcome {
                    timestamp: None,
                    accepted: false,
                    state: self.classifier.state(),
                    reminder: None,
                }
            }
        }
    }

    /// Advance time without a sample (expires cooldowns, rolls periods)
    pub fn tick(&mut self, now: DateTime<Utc>) {
        self.dispatcher.tick(now);
        self.aggregator.roll_to(now);
    }

    fn evaluate(
        &mut self,
        state: BehaviorState,
        now: DateTime<Utc>,
        active_app: Option<&str>,
    ) -> Option<ReminderEvent> {
        let kind = state.reminder_kind()?;
        let settings = self.settings.snapshot();
        if !settings.detection_enabled(kind) {
            return None;
        }

        let input = PolicyInput {
            state,
            sustained: self.classifier.sustained(now),
            sensitivity: settings.sensitivity(kind),
            exception_apps: self.exceptions.as_set(),
            active_app,
            exercise_mode: settings.exercise_mode,
        };
        if !self.policy.should_trigger(&input) {
            return None;
        }

        let ctx = DispatchContext {
            bedtime: settings.is_bedtime(self.local_hour(now)),
            modalities: Modalities::from_settings(&settings),
            history: &self.history,
            channel: self.channel.as_ref(),
        };
        let event = self.dispatcher.dispatch(kind, now, &ctx)?;
        log::info!("{} reminder {} at {}", kind.as_str(), event.id, now);
        Some(event)
    }

    fn local_hour(&self, now: DateTime<Utc>) -> u32 {
        now.with_timezone(&self.offset).hour()
    }

    // ------------------------------------------------------------------
    // Monitoring
    // ------------------------------------------------------------------

    /// Stop emitting reminders; pending cooldowns are cancelled
    pub fn pause(&mut self) {
        if self.monitoring {
            log::info!("monitoring paused");
        }
        self.monitoring = false;
        for kind in ReminderKind::ALL {
            self.dispatcher.cancel(kind);
        }
    }

    pub fn resume(&mut self) {
        if !self.monitoring {
            log::info!("monitoring resumed");
        }
        self.monitoring = true;
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    pub fn current_state(&self) -> BehaviorState {
        self.classifier.state()
    }

    pub fn dispatch_state(&self, kind: ReminderKind) -> DispatchState {
        self.dispatcher.state(kind)
    }

    pub fn metrics(&self) -> EngineMetrics {
        EngineMetrics {
            classifier: self.classifier.metrics(),
            dispatch: self.dispatcher.metrics(),
        }
    }

    // ------------------------------------------------------------------
    // Settings and exceptions
    // ------------------------------------------------------------------

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.snapshot()
    }

    /// Shared handle for concurrent readers
    pub fn settings_handle(&self) -> SettingsHandle {
        self.settings.clone()
    }

    /// Apply a partial update atomically. Disabling a detection (or enabling
    /// exercise mode for walking) cancels that kind's cooldown.
    pub fn update_settings(&mut self, patch: &SettingsPatch) -> Result<Arc<Settings>, CoachError> {
        let updated = self.settings.update(patch)?;
        for kind in ReminderKind::ALL {
            let suppressed = !updated.detection_enabled(kind)
                || (kind == ReminderKind::Walking && updated.exercise_mode);
            if suppressed {
                self.dispatcher.cancel(kind);
            }
        }
        log::debug!("settings updated: {:?}", updated);
        Ok(updated)
    }

    pub fn add_exception(&mut self, name: &str) -> Result<(), CoachError> {
        self.exceptions.add(name)?;
        log::info!("exception app added: {}", name.trim());
        Ok(())
    }

    /// Remove an exception app; removing a missing name is a no-op
    pub fn remove_exception(&mut self, name: &str) -> bool {
        let removed = self.exceptions.remove(name);
        if removed {
            log::info!("exception app removed: {}", name.trim());
        }
        removed
    }

    pub fn exception_apps(&self) -> Vec<String> {
        self.exceptions.iter().map(|s| s.to_string()).collect()
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn list_history(&self, limit: usize, offset: usize) -> Vec<ReminderEvent> {
        self.history.list(limit, offset)
    }

    pub fn acknowledge(&self, id: Uuid) -> Result<(), CoachError> {
        self.history.acknowledge(id)
    }

    pub fn acknowledge_all(&self) -> usize {
        self.history.acknowledge_all()
    }

    /// Shared handle for concurrent readers
    pub fn history_handle(&self) -> Arc<HistoryStore> {
        Arc::clone(&self.history)
    }

    /// Deliver a sample reminder without recording it (the "test warning" action)
    pub fn preview_reminder(
        &self,
        kind: ReminderKind,
        now: DateTime<Utc>,
    ) -> Result<Notification, CoachError> {
        let settings = self.settings.snapshot();
        let tone = Tone::for_kind(kind, settings.is_bedtime(self.local_hour(now)));
        let message = messages_for(tone).first().copied().unwrap_or_default();
        let notification = Notification {
            kind,
            message: message.to_string(),
            modalities: Modalities::from_settings(&settings),
        };
        self.channel.deliver(&notification)?;
        Ok(notification)
    }

    // ------------------------------------------------------------------
    // Usage statistics
    // ------------------------------------------------------------------

    /// Record usage minutes observed outside the sample stream
    pub fn record_usage(&mut self, kind: ReminderKind, minutes: u32, timestamp: DateTime<Utc>) -> usize {
        self.aggregator.record_usage(kind, minutes, timestamp)
    }

    pub fn summary(&self, period: Period) -> Vec<UsageBucket> {
        self.aggregator.summarize(period)
    }

    pub fn report(&self, period: Period) -> UsageReport {
        UsageReport::new(period, self.summary(period))
    }

    /// Today's usage and reminder count, in local time
    pub fn today(&self, now: DateTime<Utc>) -> TodayStats {
        let local = now.with_timezone(&self.offset);
        let start_of_day = now - Duration::seconds(local.num_seconds_from_midnight() as i64);

        let current_week = self.aggregator.current_period(Period::Week);
        let iso = local.iso_week();
        let bucket = match current_week {
            Some(key) if key.year == iso.year() && key.index == iso.week() => self
                .aggregator
                .summarize(Period::Week)
                .into_iter()
                .nth(local.weekday().num_days_from_monday() as usize),
            _ => None,
        };

        TodayStats {
            walking_minutes: bucket.as_ref().map_or(0, |b| b.walking_minutes),
            lying_minutes: bucket.as_ref().map_or(0, |b| b.lying_minutes),
            reminders: self.history.count_since(start_of_day),
        }
    }
}
