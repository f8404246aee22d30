use async_trait::async_trait;
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;

use super::calendar_models::{
    CalendarEvent, EventLookup, EventPatch, NewEvent, TimeWindow, WindowRequest,
};
use crate::core::errors::{AssistantError, RemoteServiceError};
use crate::core::results::MutationAck;

/// Id-addressed calendar operations plus the service's native window query.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Single (expanded) events overlapping the window, ordered by start time.
    async fn list_events(&self, window: &TimeWindow) -> Result<Vec<CalendarEvent>, RemoteServiceError>;
    async fn get_event(&self, event_id: &str) -> Result<CalendarEvent, RemoteServiceError>;
    /// Returns the stored event, including the id the store assigned.
    async fn insert_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, RemoteServiceError>;
    async fn update_event(
        &self,
        event_id: &str,
        event: &CalendarEvent,
    ) -> Result<CalendarEvent, RemoteServiceError>;
    async fn delete_event(&self, event_id: &str) -> Result<(), RemoteServiceError>;
}

#[async_trait]
impl<T: CalendarStore + ?Sized> CalendarStore for Arc<T> {
    async fn list_events(&self, window: &TimeWindow) -> Result<Vec<CalendarEvent>, RemoteServiceError> {
        (**self).list_events(window).await
    }

    async fn get_event(&self, event_id: &str) -> Result<CalendarEvent, RemoteServiceError> {
        (**self).get_event(event_id).await
    }

    async fn insert_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, RemoteServiceError> {
        (**self).insert_event(event).await
    }

    async fn update_event(
        &self,
        event_id: &str,
        event: &CalendarEvent,
    ) -> Result<CalendarEvent, RemoteServiceError> {
        (**self).update_event(event_id, event).await
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), RemoteServiceError> {
        (**self).delete_event(event_id).await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventList {
    pub events: Vec<CalendarEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventCreated {
    pub response: String,
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
}

pub struct CalendarService<S: CalendarStore> {
    store: S,
    default_timezone: Tz,
}

impl<S: CalendarStore> CalendarService<S> {
    pub fn new(store: S, default_timezone: Tz) -> Self {
        Self {
            store,
            default_timezone,
        }
    }

    pub async fn query(&self, request: &WindowRequest) -> Result<EventList, AssistantError> {
        let window = TimeWindow::resolve(request, self.default_timezone)?;
        let events = self.store.list_events(&window).await?;

        let message = events
            .is_empty()
            .then(|| "No events found in the specified range".to_string());

        Ok(EventList { events, message })
    }

    pub async fn create(&self, new: &NewEvent) -> Result<EventCreated, AssistantError> {
        let document = CalendarEvent::from_new(new, self.default_timezone)?;
        let created = self.store.insert_event(&document).await?;

        tracing::info!(event_id = %created.id, summary = %created.summary, "Calendar event created");

        Ok(EventCreated {
            response: format!("Event created: {}", created.summary),
            event_id: created.id,
            html_link: created.html_link,
        })
    }

    /// Fetch, merge the supplied fields over the stored document, write back.
    pub async fn update(&self, patch: &EventPatch) -> Result<MutationAck, AssistantError> {
        let mut event = self
            .store
            .get_event(&patch.event_id)
            .await
            .map_err(|err| not_found_or(err, &patch.event_id))?;

        event.merge(patch, self.default_timezone)?;

        self.store
            .update_event(&patch.event_id, &event)
            .await
            .map_err(|err| not_found_or(err, &patch.event_id))?;

        tracing::info!(event_id = %patch.event_id, "Calendar event updated");
        Ok(MutationAck::success("Event updated successfully"))
    }

    pub async fn delete(&self, event_id: &str) -> Result<MutationAck, AssistantError> {
        self.store
            .delete_event(event_id)
            .await
            .map_err(|err| not_found_or(err, event_id))?;

        tracing::info!(event_id, "Calendar event deleted");
        Ok(MutationAck::success("Event deleted successfully"))
    }

    /// Resolves a title + window into an event id. Exactly one event with
    /// that title must exist in the window.
    pub async fn find_event_id(&self, lookup: &EventLookup) -> Result<String, AssistantError> {
        let window = TimeWindow::resolve(&lookup.window_request(), self.default_timezone)?;

        let wanted = lookup.summary.trim();
        let mut matches: Vec<CalendarEvent> = self
            .store
            .list_events(&window)
            .await?
            .into_iter()
            .filter(|event| event.summary.trim() == wanted)
            .collect();

        match matches.len() {
            0 => Err(AssistantError::EventNotFound(format!(
                "no event titled '{}' between {} and {}",
                wanted, lookup.start_time, lookup.end_time
            ))),
            1 => Ok(matches.remove(0).id),
            n => Err(AssistantError::Parse(format!(
                "{} events titled '{}' in that window; please be more specific",
                n, wanted
            ))),
        }
    }
}

fn not_found_or(err: RemoteServiceError, event_id: &str) -> AssistantError {
    if err.is_not_found() {
        AssistantError::EventNotFound(event_id.to_string())
    } else {
        AssistantError::Remote(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::InMemoryCalendar;
    use serde_json::json;

    const TAIPEI: Tz = chrono_tz::Asia::Taipei;

    fn service(store: Arc<InMemoryCalendar>) -> CalendarService<Arc<InMemoryCalendar>> {
        CalendarService::new(store, TAIPEI)
    }

    fn sync_event() -> CalendarEvent {
        serde_json::from_value(json!({
            "id": "abc",
            "summary": "Sync",
            "start": { "dateTime": "2024-01-20T09:00:00+08:00" },
            "end": { "dateTime": "2024-01-20T10:00:00+08:00" },
            "location": "Room 4"
        }))
        .unwrap()
    }

    fn new_event(summary: &str, start: &str, end: &str) -> NewEvent {
        NewEvent {
            summary: Some(summary.to_string()),
            start_time: start.to_string(),
            end_time: end.to_string(),
            timezone: None,
        }
    }

    #[tokio::test]
    async fn update_merges_over_the_stored_event() {
        let store = Arc::new(InMemoryCalendar::with_events(TAIPEI, vec![sync_event()]));
        let service = service(Arc::clone(&store));

        service
            .update(&EventPatch {
                event_id: "abc".to_string(),
                summary: Some("Meeting".to_string()),
                ..EventPatch::default()
            })
            .await
            .unwrap();

        let stored = store.get_event("abc").await.unwrap();
        let original = sync_event();
        assert_eq!(stored.summary, "Meeting");
        assert_eq!(stored.start, original.start);
        assert_eq!(stored.end, original.end);
        assert_eq!(stored.extra.get("location"), Some(&json!("Room 4")));
    }

    #[tokio::test]
    async fn mixed_granularity_never_reaches_the_store() {
        let store = Arc::new(InMemoryCalendar::new(TAIPEI));
        let service = service(Arc::clone(&store));

        let err = service
            .create(&new_event("Trip", "2024-01-20", "2024-01-21T10:00:00"))
            .await
            .unwrap_err();

        assert!(matches!(err, AssistantError::Validation(_)));
        assert_eq!(store.call_count(), 0);

        let err = service
            .create(&new_event("Trip", "2024-01-20T09:00:00", "2024-01-21"))
            .await
            .unwrap_err();

        assert!(matches!(err, AssistantError::Validation(_)));
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn mixed_query_window_never_reaches_the_store() {
        let store = Arc::new(InMemoryCalendar::new(TAIPEI));
        let service = service(Arc::clone(&store));

        let mixed = [
            ("2024-01-20", "2024-01-21T00:00:00"),
            ("2024-01-20T00:00:00", "2024-01-21"),
        ];
        for (time_min, time_max) in mixed {
            let err = service
                .query(&WindowRequest {
                    time_min: time_min.to_string(),
                    time_max: time_max.to_string(),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, AssistantError::Validation(_)));
        }

        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn update_with_unparseable_times_is_rejected_before_writing() {
        let store = Arc::new(InMemoryCalendar::with_events(TAIPEI, vec![sync_event()]));
        let service = service(Arc::clone(&store));

        let err = service
            .update(&EventPatch {
                event_id: "abc".to_string(),
                start_time: Some("next monday".to_string()),
                end_time: Some("whenever".to_string()),
                ..EventPatch::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AssistantError::Validation(_)));
        // Only the fetch happened.
        assert_eq!(store.call_count(), 1);
        assert_eq!(store.get_event("abc").await.unwrap().start, sync_event().start);
    }

    #[tokio::test]
    async fn lookup_on_a_single_all_day_date() {
        let store = Arc::new(InMemoryCalendar::new(TAIPEI));
        let service = service(Arc::clone(&store));

        let created = service
            .create(&new_event("Dentist", "2024-01-22T15:00:00", "2024-01-22T16:00:00"))
            .await
            .unwrap();

        let found = service
            .find_event_id(&EventLookup {
                summary: "Dentist".to_string(),
                start_time: "2024-01-22".to_string(),
                end_time: "2024-01-22".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(found, created.event_id);
    }

    #[tokio::test]
    async fn create_then_query_window() {
        let store = Arc::new(InMemoryCalendar::new(TAIPEI));
        let service = service(Arc::clone(&store));

        let late = service
            .create(&new_event("Dinner", "2024-01-20T19:00:00", "2024-01-20T21:00:00"))
            .await
            .unwrap();
        let early = service
            .create(&new_event("Standup", "2024-01-20T09:00:00", "2024-01-20T09:15:00"))
            .await
            .unwrap();
        assert_ne!(late.event_id, early.event_id);

        let listed = service
            .query(&WindowRequest {
                time_min: "2024-01-20".to_string(),
                time_max: "2024-01-21".to_string(),
            })
            .await
            .unwrap();

        let titles: Vec<&str> = listed.events.iter().map(|e| e.summary.as_str()).collect();
        assert_eq!(titles, vec!["Standup", "Dinner"]);
        assert_eq!(listed.message, None);

        let empty = service
            .query(&WindowRequest {
                time_min: "2024-02-01".to_string(),
                time_max: "2024-02-02".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(empty.message.as_deref(), Some("No events found in the specified range"));
    }

    #[tokio::test]
    async fn unknown_ids_are_event_not_found() {
        let service = service(Arc::new(InMemoryCalendar::new(TAIPEI)));

        let err = service.delete("missing").await.unwrap_err();
        assert!(matches!(err, AssistantError::EventNotFound(_)));

        let err = service
            .update(&EventPatch {
                event_id: "missing".to_string(),
                summary: Some("x".to_string()),
                ..EventPatch::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::EventNotFound(_)));
    }

    #[tokio::test]
    async fn lookup_resolves_unique_titles_only() {
        let store = Arc::new(InMemoryCalendar::new(TAIPEI));
        let service = service(Arc::clone(&store));

        let created = service
            .create(&new_event("Dentist", "2024-01-22T15:00:00", "2024-01-22T16:00:00"))
            .await
            .unwrap();
        service
            .create(&new_event("Gym", "2024-01-22T07:00:00", "2024-01-22T08:00:00"))
            .await
            .unwrap();
        service
            .create(&new_event("Gym", "2024-01-22T18:00:00", "2024-01-22T19:00:00"))
            .await
            .unwrap();

        let lookup = |summary: &str| EventLookup {
            summary: summary.to_string(),
            start_time: "2024-01-22T00:00:00".to_string(),
            end_time: "2024-01-23T00:00:00".to_string(),
        };

        assert_eq!(service.find_event_id(&lookup("Dentist")).await.unwrap(), created.event_id);
        assert!(matches!(
            service.find_event_id(&lookup("Gym")).await,
            Err(AssistantError::Parse(_))
        ));
        assert!(matches!(
            service.find_event_id(&lookup("Haircut")).await,
            Err(AssistantError::EventNotFound(_))
        ));
    }
}
