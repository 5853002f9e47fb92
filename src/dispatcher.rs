//! Reminder dispatch
//!
//! One state machine per reminder kind:
//!
//! ```text
//! Idle --trigger--> Armed --(emit)--> Cooling{until} --tick(now >= until)--> Idle
//! ```
//!
//! While a kind is cooling, further triggers of that kind are suppressed. The
//! other kind is unaffected. The event is appended to history before delivery
//! is attempted, so a failed notification never loses the record.

use crate::channel::{Modalities, Notification, NotificationChannel};
use crate::history::HistoryStore;
use crate::messages::{MessageSelector, Tone};
use crate::types::{ReminderEvent, ReminderKind};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Per-kind dispatcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DispatchState {
    Idle,
    Armed,
    Cooling { until: DateTime<Utc> },
}

/// Dispatch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMetrics {
    pub emitted: u64,
    pub suppressed: u64,
    pub delivery_failures: u64,
}

/// Everything a single dispatch needs besides the kind and time
pub struct DispatchContext<'a> {
    pub bedtime: bool,
    pub modalities: Modalities,
    pub history: &'a HistoryStore,
    pub channel: &'a dyn NotificationChannel,
}

/// Cooldown-throttled reminder dispatcher
#[derive(Debug, Clone)]
pub struct ReminderDispatcher {
    cooldown: Duration,
    states: [DispatchState; 2],
    selector: MessageSelector,
    metrics: DispatchMetrics,
}

impl ReminderDispatcher {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            states: [DispatchState::Idle; 2],
            selector: MessageSelector::new(),
            metrics: DispatchMetrics::default(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn state(&self, kind: ReminderKind) -> DispatchState {
        self.states[kind.index()]
    }

    pub fn metrics(&self) -> DispatchMetrics {
        self.metrics
    }

    /// Expire cooldowns that have elapsed by `now`
    pub fn tick(&mut self, now: DateTime<Utc>) {
        for kind in ReminderKind::ALL {
            if let DispatchState::Cooling { until } = self.states[kind.index()] {
                if now >= until {
                    log::debug!("{} cooldown elapsed", kind.as_str());
                    self.states[kind.index()] = DispatchState::Idle;
                }
            }
        }
    }

    /// Drop any cooldown for a kind and return it to `Idle`
    pub fn cancel(&mut self, kind: ReminderKind) {
        if self.states[kind.index()] != DispatchState::Idle {
            log::debug!("{} cooldown cancelled", kind.as_str());
        }
        self.states[kind.index()] = DispatchState::Idle;
    }

    /// Handle a positive policy decision for `kind`.
    ///
    /// Returns the recorded event, or `None` when the kind is still cooling.
    pub fn dispatch(
        &mut self,
        kind: ReminderKind,
        now: DateTime<Utc>,
        ctx: &DispatchContext<'_>,
    ) -> Option<ReminderEvent> {
        self.tick(now);
        if self.states[kind.index()] != DispatchState::Idle {
            self.metrics.suppressed += 1;
            return None;
        }

        self.states[kind.index()] = DispatchState::Armed;
        let tone = Tone::for_kind(kind, ctx.bedtime);
        let message = self.selector.select(kind, tone);
        let event = ctx
            .history
            .append(ReminderEvent::new(kind, message, now));
        self.metrics.emitted += 1;

        self.deliver(&event, ctx.modalities, ctx.channel);

        self.states[kind.index()] = DispatchState::Cooling {
            until: now + self.cooldown,
        };
        Some(event)
    }

    /// Best-effort delivery; failures are logged and counted
    fn deliver(
        &mut self,
        event: &ReminderEvent,
        modalities: Modalities,
        channel: &dyn NotificationChannel,
    ) {
        if modalities.is_silent() {
            log::debug!("all alert modalities disabled, recording {} only", event.id);
            return;
        }
        let notification = Notification {
            kind: event.kind,
            message: event.message.clone(),
            modalities,
        };
        if let Err(e) = channel.deliver(&notification) {
            self.metrics.delivery_failures += 1;
            log::warn!("delivery of reminder {} failed: {}", event.id, e);
        }
    }
}

impl Default for ReminderDispatcher {
    fn default() -> Self {
        Self::new(Duration::seconds(crate::config::DEFAULT_COOLDOWN_SECS))
    }
}
