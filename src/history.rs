//! Reminder history and acknowledgment
//!
//! Append-only log of reminder events. The only mutation an entry ever sees is
//! its acknowledgment flag going from `false` to `true`. Nothing is deleted here;
//! retention is up to whoever owns the persisted log.

use crate::error::CoachError;
use crate::types::ReminderEvent;
use chrono::{DateTime, Utc};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Single-writer, multi-reader reminder log
#[derive(Debug, Default)]
pub struct HistoryStore {
    /// Oldest first; listing reverses
    events: RwLock<Vec<ReminderEvent>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from persisted events (any order); they are sorted by timestamp
    pub fn from_events(mut events: Vec<ReminderEvent>) -> Self {
        events.sort_by_key(|e| e.timestamp);
        Self {
            events: RwLock::new(events),
        }
    }

    /// Append an event as the new head of the log.
    ///
    /// A timestamp older than the current head is raised to the head's
    /// timestamp so that timestamp order always matches insertion order.
    pub fn append(&self, mut event: ReminderEvent) -> ReminderEvent {
        let mut events = self.write();
        if let Some(head) = events.last() {
            if event.timestamp < head.timestamp {
                log::warn!(
                    "reminder {} timestamp {} precedes head {}, clamping",
                    event.id,
                    event.timestamp,
                    head.timestamp
                );
                event.timestamp = head.timestamp;
            }
        }
        events.push(event.clone());
        event
    }

    /// Mark a reminder as acknowledged. Acknowledging twice is not an error.
    pub fn acknowledge(&self, id: Uuid) -> Result<(), CoachError> {
        let mut events = self.write();
        match events.iter_mut().find(|e| e.id == id) {
            Some(event) => {
                event.acknowledged = true;
                Ok(())
            }
            None => Err(CoachError::NotFound(id.to_string())),
        }
    }

    /// Acknowledge every pending reminder (implicit view); returns how many flipped
    pub fn acknowledge_all(&self) -> usize {
        let mut events = self.write();
        let mut flipped = 0;
        for event in events.iter_mut().filter(|e| !e.acknowledged) {
            event.acknowledged = true;
            flipped += 1;
        }
        flipped
    }

    /// Newest-first page of the log
    pub fn list(&self, limit: usize, offset: usize) -> Vec<ReminderEvent> {
        self.read()
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<ReminderEvent> {
        self.read().iter().find(|e| e.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn unacknowledged_count(&self) -> usize {
        self.read().iter().filter(|e| !e.acknowledged).count()
    }

    /// Number of reminders at or after `since`
    pub fn count_since(&self, since: DateTime<Utc>) -> usize {
        self.read().iter().filter(|e| e.timestamp >= since).count()
    }

    /// Every event, oldest first (for persistence)
    pub fn snapshot(&self) -> Vec<ReminderEvent> {
        self.read().clone()
    }

    /// Replace the whole log (used when loading persisted state)
    pub fn replace(&self, mut events: Vec<ReminderEvent>) {
        events.sort_by_key(|e| e.timestamp);
        *self.write() = events;
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&*self.read())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let events: Vec<ReminderEvent> = serde_json::from_str(json)?;
        Ok(Self::from_events(events))
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<ReminderEvent>> {
        self.events.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<ReminderEvent>> {
        self.events.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReminderKind;
    use chrono::{Duration, TimeZone};

    fn ts(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap() + Duration::minutes(min)
    }

    fn event(kind: ReminderKind, min: i64) -> ReminderEvent {
        ReminderEvent::new(kind, format!("{} at {}", kind.as_str(), min), ts(min))
    }

    #[test]
    fn test_list_newest_first() {
        let store = HistoryStore::new();
        store.append(event(ReminderKind::Walking, 0));
        store.append(event(ReminderKind::Lying, 10));
        store.append(event(ReminderKind::Walking, 20));

        let listed = store.list(10, 0);
        let minutes: Vec<_> = listed.iter().map(|e| e.timestamp).collect();
        assert_eq!(minutes, vec![ts(20), ts(10), ts(0)]);
    }

    #[test]
    fn test_list_paging() {
        let store = HistoryStore::new();
        for i in 0..5 {
            store.append(event(ReminderKind::Walking, i));
        }
        let page = store.list(2, 1);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].timestamp, ts(3));
        assert_eq!(page[1].timestamp, ts(2));
        assert!(store.list(10, 5).is_empty());
    }

    #[test]
    fn test_acknowledge_is_idempotent() {
        let store = HistoryStore::new();
        let appended = store.append(event(ReminderKind::Lying, 0));
        assert!(!appended.acknowledged);

        assert!(store.acknowledge(appended.id).is_ok());
        assert!(store.acknowledge(appended.id).is_ok());
        assert!(store.get(appended.id).unwrap().acknowledged);
    }

    #[test]
    fn test_acknowledge_unknown_id() {
        let store = HistoryStore::new();
        store.append(event(ReminderKind::Walking, 0));
        let before = store.snapshot();

        let result = store.acknowledge(Uuid::new_v4());
        assert!(matches!(result, Err(CoachError::NotFound(_))));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_acknowledge_all() {
        let store = HistoryStore::new();
        let first = store.append(event(ReminderKind::Walking, 0));
        store.append(event(ReminderKind::Lying, 5));
        store.append(event(ReminderKind::Walking, 9));
        store.acknowledge(first.id).unwrap();

        assert_eq!(store.unacknowledged_count(), 2);
        assert_eq!(store.acknowledge_all(), 2);
        assert_eq!(store.unacknowledged_count(), 0);
        assert_eq!(store.acknowledge_all(), 0);
    }

    #[test]
    fn test_append_clamps_out_of_order_timestamp() {
        let store = HistoryStore::new();
        store.append(event(ReminderKind::Walking, 30));
        let late = store.append(event(ReminderKind::Lying, 10));
        assert_eq!(late.timestamp, ts(30));
        assert_eq!(store.list(1, 0)[0].id, late.id);
    }

    #[test]
    fn test_count_since() {
        let store = HistoryStore::new();
        for i in [0, 60, 120, 180] {
            store.append(event(ReminderKind::Walking, i));
        }
        assert_eq!(store.count_since(ts(100)), 2);
        assert_eq!(store.count_since(ts(0)), 4);
    }

    #[test]
    fn test_json_roundtrip_preserves_ack_state() {
        let store = HistoryStore::new();
        let first = store.append(event(ReminderKind::Walking, 0));
        store.append(event(ReminderKind::Lying, 1));
        store.acknowledge(first.id).unwrap();

        let loaded = HistoryStore::from_json(&store.to_json().unwrap()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.get(first.id).unwrap().acknowledged);
        assert_eq!(loaded.unacknowledged_count(), 1);
    }
}
