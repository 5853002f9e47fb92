//! Period aggregation of usage minutes
//!
//! Week, month, quarter and year are independent rollups of the same raw usage
//! records. Each granularity tracks the period it is currently filling; a record
//! from a later period resets that granularity, a record from an earlier one is
//! ignored by it.

use crate::types::{Period, ReminderKind, UsageBucket};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Weekday labels, Monday first
pub const WEEKDAY_LABELS: [&str; 7] = ["월", "화", "수", "목", "금", "토", "일"];

/// Days shown for a month before any usage has been recorded
const DEFAULT_MONTH_DAYS: u32 = 30;

/// Identifies one concrete period of a granularity, ordered chronologically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeriodKey {
    pub year: i32,
    /// ISO week, month, quarter, or 0 for year
    pub index: u32,
}

/// Buckets for one granularity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Rollup {
    period: Period,
    current: Option<PeriodKey>,
    buckets: Vec<UsageBucket>,
}

impl Rollup {
    fn new(period: Period) -> Self {
        Self {
            period,
            current: None,
            buckets: default_labels(period).into_iter().map(UsageBucket::empty).collect(),
        }
    }

    /// Move to the period containing `local`; returns false if `local` is in
    /// an earlier period than the one being filled
    fn roll_to(&mut self, local: &DateTime<FixedOffset>) -> bool {
        let key = period_key(self.period, local);
        match self.current {
            Some(current) if key < current => false,
            Some(current) if key == current => true,
            _ => {
                if let Some(previous) = self.current {
                    log::debug!(
                        "{} rollover {}/{} -> {}/{}",
                        self.period.as_str(),
                        previous.year,
                        previous.index,
                        key.year,
                        key.index
                    );
                }
                self.current = Some(key);
                self.buckets = labels_for(self.period, local)
                    .into_iter()
                    .map(UsageBucket::empty)
                    .collect();
                true
            }
        }
    }

    fn record(&mut self, kind: ReminderKind, minutes: u32, local: &DateTime<FixedOffset>) -> bool {
        if !self.roll_to(local) {
            log::debug!(
                "ignoring {} usage at {} for past {} period",
                kind.as_str(),
                local,
                self.period.as_str()
            );
            return false;
        }
        let index = bucket_index(self.period, local);
        match self.buckets.get_mut(index) {
            Some(bucket) => {
                bucket.add(kind, minutes);
                true
            }
            None => false,
        }
    }
}

/// Usage aggregator across all reporting periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodAggregator {
    utc_offset_secs: i32,
    week: Rollup,
    month: Rollup,
    quarter: Rollup,
    year: Rollup,
}

impl Default for PeriodAggregator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl PeriodAggregator {
    /// Create an aggregator that labels periods in the given local offset
    pub fn new(utc_offset_secs: i32) -> Self {
        Self {
            utc_offset_secs,
            week: Rollup::new(Period::Week),
            month: Rollup::new(Period::Month),
            quarter: Rollup::new(Period::Quarter),
            year: Rollup::new(Period::Year),
        }
    }

    pub fn with_offset(offset: FixedOffset) -> Self {
        Self::new(offset.local_minus_utc())
    }

    pub fn utc_offset_secs(&self) -> i32 {
        self.utc_offset_secs
    }

    /// Label future records in a different local offset; buckets already
    /// filled keep their values
    pub fn set_offset(&mut self, offset: FixedOffset) {
        self.utc_offset_secs = offset.local_minus_utc();
    }

    /// Add usage minutes to every granularity containing `timestamp`.
    /// Returns how many granularities accepted the record.
    pub fn record_usage(
        &mut self,
        kind: ReminderKind,
        minutes: u32,
        timestamp: DateTime<Utc>,
    ) -> usize {
        let local = self.to_local(timestamp);
        self.rollups_mut()
            .into_iter()
            .map(|rollup| rollup.record(kind, minutes, &local))
            .filter(|accepted| *accepted)
            .count()
    }

    /// Advance every granularity to the period containing `now`, zeroing any
    /// that rolled over
    pub fn roll_to(&mut self, now: DateTime<Utc>) {
        let local = self.to_local(now);
        for rollup in self.rollups_mut() {
            rollup.roll_to(&local);
        }
    }

    /// Buckets for a period, in chronological label order, zero-filled
    pub fn summarize(&self, period: Period) -> Vec<UsageBucket> {
        self.rollup(period).buckets.clone()
    }

    /// Which concrete period a granularity is currently filling
    pub fn current_period(&self, period: Period) -> Option<PeriodKey> {
        self.rollup(period).current
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    fn to_local(&self, timestamp: DateTime<Utc>) -> DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(self.utc_offset_secs).unwrap_or_else(|| Utc.fix());
        timestamp.with_timezone(&offset)
    }

    fn rollup(&self, period: Period) -> &Rollup {
        match period {
            Period::Week => &self.week,
            Period::Month => &self.month,
            Period::Quarter => &self.quarter,
            Period::Year => &self.year,
        }
    }

    fn rollups_mut(&mut self) -> [&mut Rollup; 4] {
        [
            &mut self.week,
            &mut self.month,
            &mut self.quarter,
            &mut self.year,
        ]
    }
}

fn period_key(period: Period, local: &DateTime<FixedOffset>) -> PeriodKey {
    match period {
        Period::Week => {
            let iso = local.iso_week();
            PeriodKey {
                year: iso.year(),
                index: iso.week(),
            }
        }
        Period::Month => PeriodKey {
            year: local.year(),
            index: local.month(),
        },
        Period::Quarter => PeriodKey {
            year: local.year(),
            index: (local.month() - 1) / 3 + 1,
        },
        Period::Year => PeriodKey {
            year: local.year(),
            index: 0,
        },
    }
}

fn bucket_index(period: Period, local: &DateTime<FixedOffset>) -> usize {
    match period {
        Period::Week => local.weekday().num_days_from_monday() as usize,
        Period::Month => local.day0() as usize,
        Period::Quarter => (local.month0() % 3) as usize,
        Period::Year => local.month0() as usize,
    }
}

fn month_label(month: u32) -> String {
    format!("{}월", month)
}

fn day_labels(days: u32) -> Vec<String> {
    (1..=days).map(|d| format!("{}일", d)).collect()
}

/// Labels used before any usage has been recorded for a granularity
fn default_labels(period: Period) -> Vec<String> {
    match period {
        Period::Week => WEEKDAY_LABELS.iter().map(|s| s.to_string()).collect(),
        Period::Month => day_labels(DEFAULT_MONTH_DAYS),
        Period::Quarter => (1..=3).map(month_label).collect(),
        Period::Year => (1..=12).map(month_label).collect(),
    }
}

/// Labels for the concrete period containing `local`
fn labels_for(period: Period, local: &DateTime<FixedOffset>) -> Vec<String> {
    match period {
        Period::Week | Period::Year => default_labels(period),
        Period::Month => day_labels(days_in_month(local.year(), local.month())),
        Period::Quarter => {
            let first = (local.month0() / 3) * 3 + 1;
            (first..first + 3).map(month_label).collect()
        }
    }
}

/// Number of days in a calendar month
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(next_year, next_month, 1),
    ) {
        (Some(start), Some(end)) => (end - start).num_days() as u32,
        _ => DEFAULT_MONTH_DAYS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_summaries_are_zero_filled() {
        let aggregator = PeriodAggregator::default();
        let week = aggregator.summarize(Period::Week);
        let labels: Vec<_> = week.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, WEEKDAY_LABELS.to_vec());
        assert!(week.iter().all(|b| b.total_minutes() == 0));
        assert_eq!(aggregator.summarize(Period::Month).len(), 30);
        assert_eq!(aggregator.summarize(Period::Quarter).len(), 3);
        assert_eq!(aggregator.summarize(Period::Year).len(), 12);
    }

    #[test]
    fn test_record_usage_updates_every_granularity() {
        let mut aggregator = PeriodAggregator::default();
        // 2024-01-17 is a Wednesday
        let accepted = aggregator.record_usage(ReminderKind::Walking, 25, at(2024, 1, 17, 9));
        assert_eq!(accepted, 4);
        aggregator.record_usage(ReminderKind::Lying, 85, at(2024, 1, 17, 23));

        let week = aggregator.summarize(Period::Week);
        assert_eq!(week[2], UsageBucket::new("수", 25, 85));
        assert_eq!(week[0], UsageBucket::empty("월"));

        let month = aggregator.summarize(Period::Month);
        assert_eq!(month.len(), 31);
        assert_eq!(month[16], UsageBucket::new("17일", 25, 85));

        let quarter = aggregator.summarize(Period::Quarter);
        assert_eq!(quarter[0], UsageBucket::new("1월", 25, 85));

        let year = aggregator.summarize(Period::Year);
        assert_eq!(year[0], UsageBucket::new("1월", 25, 85));
        assert_eq!(year[11], UsageBucket::empty("12월"));
    }

    #[test]
    fn test_week_rollover_resets_only_week() {
        let mut aggregator = PeriodAggregator::default();
        aggregator.record_usage(ReminderKind::Walking, 10, at(2024, 1, 15, 9)); // Mon, week 3
        aggregator.record_usage(ReminderKind::Walking, 5, at(2024, 1, 22, 9)); // Mon, week 4

        let week = aggregator.summarize(Period::Week);
        assert_eq!(week[0].walking_minutes, 5);

        let month = aggregator.summarize(Period::Month);
        assert_eq!(month[14].walking_minutes, 10);
        assert_eq!(month[21].walking_minutes, 5);
    }

    #[test]
    fn test_past_period_ignored() {
        let mut aggregator = PeriodAggregator::default();
        aggregator.record_usage(ReminderKind::Lying, 30, at(2024, 2, 5, 22));
        let accepted = aggregator.record_usage(ReminderKind::Lying, 40, at(2024, 1, 30, 22));
        // Different week and month, same quarter and year
        assert_eq!(accepted, 2);

        let month = aggregator.summarize(Period::Month);
        assert_eq!(month.len(), 29);
        assert_eq!(month.iter().map(|b| b.lying_minutes).sum::<u32>(), 30);

        let quarter = aggregator.summarize(Period::Quarter);
        assert_eq!(quarter[0].lying_minutes, 40);
        assert_eq!(quarter[1].lying_minutes, 30);
    }

    #[test]
    fn test_quarter_labels() {
        let mut aggregator = PeriodAggregator::default();
        aggregator.record_usage(ReminderKind::Walking, 1, at(2024, 8, 3, 12));
        let labels: Vec<_> = aggregator
            .summarize(Period::Quarter)
            .into_iter()
            .map(|b| b.label)
            .collect();
        assert_eq!(labels, vec!["7월", "8월", "9월"]);
        assert_eq!(
            aggregator.current_period(Period::Quarter),
            Some(PeriodKey { year: 2024, index: 3 })
        );
    }

    #[test]
    fn test_local_offset_moves_day() {
        // 2024-01-14 20:00 UTC is Monday 05:00 in UTC+9
        let mut aggregator = PeriodAggregator::new(9 * 3600);
        aggregator.record_usage(ReminderKind::Walking, 12, at(2024, 1, 14, 20));
        let week = aggregator.summarize(Period::Week);
        assert_eq!(week[0].walking_minutes, 12);
        assert_eq!(week[6].walking_minutes, 0);
    }

    #[test]
    fn test_set_offset_applies_to_later_records() {
        let mut aggregator = PeriodAggregator::default();
        aggregator.set_offset(FixedOffset::east_opt(9 * 3600).unwrap());
        assert_eq!(aggregator.utc_offset_secs(), 9 * 3600);
        aggregator.record_usage(ReminderKind::Walking, 7, at(2024, 1, 14, 20));
        assert_eq!(aggregator.summarize(Period::Week)[0].walking_minutes, 7);
    }

    #[test]
    fn test_roll_to_zeroes_stale_period() {
        let mut aggregator = PeriodAggregator::default();
        aggregator.record_usage(ReminderKind::Walking, 20, at(2024, 3, 1, 9));
        aggregator.roll_to(at(2024, 4, 2, 9));
        assert!(aggregator
            .summarize(Period::Month)
            .iter()
            .all(|b| b.total_minutes() == 0));
        assert!(aggregator
            .summarize(Period::Quarter)
            .iter()
            .all(|b| b.total_minutes() == 0));
        assert_eq!(aggregator.summarize(Period::Year)[2].walking_minutes, 20);
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2024, 12), 31);
        assert_eq!(days_in_month(2024, 4), 30);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut aggregator = PeriodAggregator::new(3600);
        aggregator.record_usage(ReminderKind::Lying, 15, at(2024, 5, 5, 23));
        let loaded = PeriodAggregator::from_json(&aggregator.to_json().unwrap()).unwrap();
        assert_eq!(loaded, aggregator);
    }
}
