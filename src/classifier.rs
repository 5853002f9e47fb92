//! Posture classification
//!
//! Turns raw motion/orientation samples into a smoothed behavior state.
//!
//! Each sample first yields an instantaneous candidate state. The reported state
//! only changes once a candidate collects `quorum` votes among the last `window`
//! candidates. The default quorum is the whole window, so a noise spike shorter
//! than the window cannot flip the state.

use crate::config::ClassifierConfig;
use crate::error::CoachError;
use crate::types::{BehaviorSample, BehaviorState, RawMotion};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierMetrics {
    pub accepted_samples: u64,
    pub dropped_samples: u64,
    pub state_changes: u64,
}

/// Stateful posture classifier with fixed-window majority smoothing
#[derive(Debug, Clone)]
pub struct PostureClassifier {
    config: ClassifierConfig,
    window: VecDeque<BehaviorState>,
    state: BehaviorState,
    state_since: Option<DateTime<Utc>>,
    last_timestamp: Option<DateTime<Utc>>,
    metrics: ClassifierMetrics,
}

impl Default for PostureClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl PostureClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        let window = config.window.max(1);
        Self {
            config,
            window: VecDeque::with_capacity(window),
            state: BehaviorState::Stationary,
            state_since: None,
            last_timestamp: None,
            metrics: ClassifierMetrics::default(),
        }
    }

    /// Classify a sample and return the smoothed state.
    ///
    /// Out-of-order and malformed samples are counted and rejected with
    /// `DroppedSample`; classifier state is left untouched.
    pub fn classify(&mut self, sample: &RawMotion) -> Result<BehaviorSample, CoachError> {
        if let Err(reason) = self.check_sample(sample) {
            log::debug!("dropping sample at {}: {}", sample.timestamp, reason);
            self.record_dropped();
            return Err(CoachError::DroppedSample(reason));
        }

        self.last_timestamp = Some(sample.timestamp);
        self.metrics.accepted_samples += 1;

        let candidate = self.candidate_state(sample);
        let capacity = self.config.window.max(1);
        self.window.push_back(candidate);
        while self.window.len() > capacity {
            self.window.pop_front();
        }

        if self.state_since.is_none() {
            self.state_since = Some(sample.timestamp);
        }

        if let Some(winner) = self.vote() {
            if winner != self.state {
                log::debug!(
                    "behavior state {} -> {} at {}",
                    self.state.as_str(),
                    winner.as_str(),
                    sample.timestamp
                );
                self.state = winner;
                self.state_since = Some(sample.timestamp);
                self.metrics.state_changes += 1;
            }
        }

        Ok(BehaviorSample {
            timestamp: sample.timestamp,
            state: self.state,
            app_context: sample.foreground_app.clone(),
        })
    }

    /// Current smoothed state
    pub fn state(&self) -> BehaviorState {
        self.state
    }

    /// When the current smoothed state began
    pub fn state_since(&self) -> Option<DateTime<Utc>> {
        self.state_since
    }

    /// How long the current state has been held as of `now`
    pub fn sustained(&self, now: DateTime<Utc>) -> Duration {
        match self.state_since {
            Some(since) if now > since => now - since,
            _ => Duration::zero(),
        }
    }

    pub fn metrics(&self) -> ClassifierMetrics {
        self.metrics
    }

    /// Count a sample that never reached `classify`, e.g. one that failed to parse
    pub fn record_dropped(&mut self) {
        self.metrics.dropped_samples += 1;
    }

    /// Forget the smoothing window and return to `Stationary`
    pub fn reset(&mut self) {
        self.window.clear();
        self.state = BehaviorState::Stationary;
        self.state_since = None;
    }

    fn check_sample(&self, sample: &RawMotion) -> Result<(), String> {
        if let Some(last) = self.last_timestamp {
            if sample.timestamp <= last {
                return Err(format!(
                    "timestamp {} is not after previous sample {}",
                    sample.timestamp, last
                ));
            }
        }
        let values = [sample.motion_intensity, sample.step_cadence, sample.tilt_deg];
        if values.iter().any(|v| !v.is_finite()) {
            return Err("non-finite sensor value".to_string());
        }
        if sample.motion_intensity < 0.0 || sample.step_cadence < 0.0 {
            return Err("negative intensity or cadence".to_string());
        }
        if !(0.0..=180.0).contains(&sample.tilt_deg) {
            return Err(format!("tilt {} outside 0-180 degrees", sample.tilt_deg));
        }
        Ok(())
    }

    /// Instantaneous state for a single sample
    fn candidate_state(&self, sample: &RawMotion) -> BehaviorState {
        let c = &self.config;
        let lying = sample.tilt_deg >= c.lying_tilt_deg
            && sample.motion_intensity < c.walking_min_intensity;
        let walking = sample.step_cadence >= c.walking_min_cadence
            && sample.step_cadence < c.running_cadence
            && sample.motion_intensity >= c.walking_min_intensity;
        let exercising = sample.step_cadence >= c.running_cadence
            || sample.motion_intensity >= c.exercise_intensity;

        BehaviorState::PRIORITY
            .into_iter()
            .find(|state| match state {
                BehaviorState::Lying => lying,
                BehaviorState::Walking => walking,
                BehaviorState::Exercising => exercising,
                BehaviorState::Stationary => true,
            })
            .unwrap_or(BehaviorState::Stationary)
    }

    /// Candidate with the most votes, if it reaches the quorum.
    /// Equal counts are broken by state priority.
    fn vote(&self) -> Option<BehaviorState> {
        let capacity = self.config.window.max(1);
        let quorum = self.config.quorum.clamp(1, capacity);

        let mut counts = [0usize; 4];
        for state in &self.window {
            counts[state.priority_rank()] += 1;
        }

        let (rank, count) = counts
            .iter()
            .enumerate()
            .fold((0, 0), |best, (rank, &count)| {
                if count > best.1 {
                    (rank, count)
                } else {
                    best
                }
            });

        if count >= quorum {
            Some(BehaviorState::PRIORITY[rank])
        } else {
            None
        }
    }
}
