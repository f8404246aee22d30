// In-memory calendar. Events live in a DashMap keyed by id; ids come from a
// counter. Used by the `memory` backend and by the calendar tests.

use async_trait::async_trait;
use chrono_tz::Tz;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::core::calendar::{CalendarEvent, CalendarStore, TimeWindow};
use crate::core::errors::{RemoteOrigin, RemoteServiceError};

pub struct InMemoryCalendar {
    events: DashMap<String, CalendarEvent>,
    next_id: AtomicU64,
    calls: AtomicUsize,
    /// Zone for event times that carry neither an offset nor a `timeZone`.
    timezone: Tz,
}

impl InMemoryCalendar {
    pub fn new(timezone: Tz) -> Self {
        Self {
            events: DashMap::new(),
            next_id: AtomicU64::new(1),
            calls: AtomicUsize::new(0),
            timezone,
        }
    }

    /// Seeds the store. Events without an id get one assigned.
    pub fn with_events(timezone: Tz, events: Vec<CalendarEvent>) -> Self {
        let store = Self::new(timezone);
        for mut event in events {
            if event.id.is_empty() {
                event.id = store.assign_id();
            }
            store.events.insert(event.id.clone(), event);
        }
        store
    }

    /// Number of store calls made so far, reads included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn assign_id(&self) -> String {
        format!("evt{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn not_found(event_id: &str) -> RemoteServiceError {
    RemoteServiceError::new(RemoteOrigin::Calendar, Some(404), format!("event '{}' not found", event_id))
}

#[async_trait]
impl CalendarStore for InMemoryCalendar {
    async fn list_events(&self, window: &TimeWindow) -> Result<Vec<CalendarEvent>, RemoteServiceError> {
        self.record_call();

        let mut matching: Vec<_> = self
            .events
            .iter()
            .filter_map(|entry| {
                let (start, end) = entry.value().span(self.timezone)?;
                window
                    .overlaps(start, end)
                    .then(|| (start, entry.value().clone()))
            })
            .collect();

        matching.sort_by_key(|(start, _)| *start);
        Ok(matching.into_iter().map(|(_, event)| event).collect())
    }

    async fn get_event(&self, event_id: &str) -> Result<CalendarEvent, RemoteServiceError> {
        self.record_call();
        self.events
            .get(event_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found(event_id))
    }

    async fn insert_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, RemoteServiceError> {
        self.record_call();

        let mut stored = event.clone();
        stored.id = self.assign_id();
        stored.html_link = Some(format!("memory://calendar/{}", stored.id));
        self.events.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_event(&self, event_id: &str, event: &CalendarEvent) -> Result<CalendarEvent, RemoteServiceError> {
        self.record_call();

        let mut entry = self.events.get_mut(event_id).ok_or_else(|| not_found(event_id))?;
        let mut stored = event.clone();
        stored.id = event_id.to_string();
        *entry = stored.clone();
        Ok(stored)
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), RemoteServiceError> {
        self.record_call();
        self.events
            .remove(event_id)
            .map(|_| ())
            .ok_or_else(|| not_found(event_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TAIPEI: Tz = chrono_tz::Asia::Taipei;

    fn event(summary: &str, start: &str, end: &str) -> CalendarEvent {
        serde_json::from_value(json!({
            "summary": summary,
            "start": {"dateTime": start},
            "end": {"dateTime": end}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn ids_are_unique_and_deletes_are_not_repeatable() {
        let store = InMemoryCalendar::new(TAIPEI);

        let a = store
            .insert_event(&event("A", "2024-01-20T09:00:00+08:00", "2024-01-20T10:00:00+08:00"))
            .await
            .unwrap();
        let b = store
            .insert_event(&event("B", "2024-01-20T09:00:00+08:00", "2024-01-20T10:00:00+08:00"))
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.html_link.as_deref(), Some(format!("memory://calendar/{}", a.id).as_str()));

        store.delete_event(&a.id).await.unwrap();
        let err = store.delete_event(&a.id).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.call_count(), 4);
    }

    #[tokio::test]
    async fn seeded_events_keep_their_ids() {
        let mut seeded = event("Sync", "2024-01-20T09:00:00+08:00", "2024-01-20T10:00:00+08:00");
        seeded.id = "abc".to_string();
        let store = InMemoryCalendar::with_events(TAIPEI, vec![seeded]);

        assert_eq!(store.get_event("abc").await.unwrap().summary, "Sync");
        assert!(store.update_event("nope", &CalendarEvent::default()).await.unwrap_err().is_not_found());
    }
}
