// Google Calendar v3 implementation of `CalendarStore`.

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::sync::Arc;

use super::google_api::{send_discarding_body, send_json};
use crate::core::calendar::{CalendarEvent, CalendarStore, TimeWindow};
use crate::core::credentials::CredentialProvider;
use crate::core::errors::{RemoteOrigin, RemoteServiceError};

const CALENDAR_BASE_URL: &str = "https://www.googleapis.com/calendar/v3/calendars";
const ORIGIN: RemoteOrigin = RemoteOrigin::Calendar;

/// Pages are followed until exhausted; this only bounds a misbehaving API.
const MAX_PAGES: usize = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsPage {
    #[serde(default)]
    items: Vec<CalendarEvent>,
    #[serde(default)]
    next_page_token: Option<String>,
}

pub struct GoogleCalendarClient {
    client: Client,
    credentials: Arc<dyn CredentialProvider>,
    calendar_id: String,
}

impl GoogleCalendarClient {
    pub fn new(client: Client, credentials: Arc<dyn CredentialProvider>, calendar_id: impl Into<String>) -> Self {
        Self {
            client,
            credentials,
            calendar_id: calendar_id.into(),
        }
    }

    fn events_url(&self, event_id: Option<&str>) -> Result<Url, RemoteServiceError> {
        events_url(&self.calendar_id, event_id)
    }
}

fn events_url(calendar_id: &str, event_id: Option<&str>) -> Result<Url, RemoteServiceError> {
    let mut url = Url::parse(CALENDAR_BASE_URL).map_err(|err| RemoteServiceError::transport(ORIGIN, err))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| RemoteServiceError::transport(ORIGIN, "base URL cannot hold a path"))?;
        segments.push(calendar_id).push("events");
        if let Some(event_id) = event_id {
            segments.push(event_id);
        }
    }
    Ok(url)
}

fn window_query(window: &TimeWindow) -> [(&'static str, String); 4] {
    [
        ("timeMin", window.time_min.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ("timeMax", window.time_max.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ("singleEvents", "true".to_string()),
        ("orderBy", "startTime".to_string()),
    ]
}

#[async_trait]
impl CalendarStore for GoogleCalendarClient {
    async fn list_events(&self, window: &TimeWindow) -> Result<Vec<CalendarEvent>, RemoteServiceError> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let token = self.credentials.ensure_valid_credentials().await?;
            let mut url = self.events_url(None)?;
            {
                let mut query = url.query_pairs_mut();
                for (name, value) in window_query(window) {
                    query.append_pair(name, &value);
                }
                if let Some(page) = &page_token {
                    query.append_pair("pageToken", page);
                }
            }

            let page: EventsPage = send_json(ORIGIN, self.client.get(url).bearer_auth(token)).await?;
            events.extend(page.items);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        tracing::debug!(count = events.len(), "Listed calendar events");
        Ok(events)
    }

    async fn get_event(&self, event_id: &str) -> Result<CalendarEvent, RemoteServiceError> {
        let token = self.credentials.ensure_valid_credentials().await?;
        let url = self.events_url(Some(event_id))?;
        send_json(ORIGIN, self.client.get(url).bearer_auth(token)).await
    }

    async fn insert_event(&self, event: &CalendarEvent) -> Result<CalendarEvent, RemoteServiceError> {
        let token = self.credentials.ensure_valid_credentials().await?;
        let url = self.events_url(None)?;
        send_json(ORIGIN, self.client.post(url).bearer_auth(token).json(event)).await
    }

    async fn update_event(&self, event_id: &str, event: &CalendarEvent) -> Result<CalendarEvent, RemoteServiceError> {
        let token = self.credentials.ensure_valid_credentials().await?;
        let url = self.events_url(Some(event_id))?;
        send_json(ORIGIN, self.client.put(url).bearer_auth(token).json(event)).await
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), RemoteServiceError> {
        let token = self.credentials.ensure_valid_credentials().await?;
        let url = self.events_url(Some(event_id))?;
        send_discarding_body(ORIGIN, self.client.delete(url).bearer_auth(token)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use serde_json::json;

    #[test]
    fn calendar_and_event_ids_are_escaped() {
        let url = events_url("family#contacts@group.v.calendar.google.com", Some("abc123")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/family%23contacts@group.v.calendar.google.com/events/abc123"
        );
    }

    #[test]
    fn window_is_sent_as_rfc3339_with_expanded_recurrences() {
        let taipei = FixedOffset::east_opt(8 * 3600).unwrap();
        let window = TimeWindow {
            time_min: taipei.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap(),
            time_max: taipei.with_ymd_and_hms(2024, 1, 21, 0, 0, 0).unwrap(),
        };

        let query = window_query(&window);
        assert_eq!(query[0], ("timeMin", "2024-01-20T00:00:00+08:00".to_string()));
        assert_eq!(query[2], ("singleEvents", "true".to_string()));
        assert_eq!(query[3], ("orderBy", "startTime".to_string()));
    }

    #[test]
    fn pages_decode_with_optional_fields() {
        let page: EventsPage = serde_json::from_value(json!({
            "kind": "calendar#events",
            "items": [{
                "id": "e1",
                "summary": "Sync",
                "start": {"dateTime": "2024-01-20T09:00:00+08:00"},
                "end": {"dateTime": "2024-01-20T10:00:00+08:00"},
                "htmlLink": "https://www.google.com/calendar/event?eid=e1"
            }]
        }))
        .unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].html_link.as_deref(), Some("https://www.google.com/calendar/event?eid=e1"));
        assert!(page.next_page_token.is_none());
    }
}
