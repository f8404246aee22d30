// Calendar events as the calendar service stores them.
//
// Times are either all-day (`date: "2024-01-20"`) or timed
// (`dateTime: "2024-01-20T09:00:00+08:00"`), and an event's start and end
// always use the same kind. Any field this crate does not model (attendees,
// reminders, colorId, ...) is kept in `extra` so a fetch-merge-update cycle
// writes it back untouched.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::AssistantError;

pub const GRANULARITY_MISMATCH: &str =
    "start_time and end_time must either both be date or both be dateTime";

pub const WINDOW_GRANULARITY_MISMATCH: &str =
    "time_min and time_max must either both be date or both be dateTime";

pub const DEFAULT_SUMMARY: &str = "Untitled event";

/// Whether a time value is a calendar date or a date-time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Date,
    DateTime,
}

impl Granularity {
    /// Anything with a `T` separator is a date-time.
    pub fn of(value: &str) -> Self {
        if value.contains('T') {
            Granularity::DateTime
        } else {
            Granularity::Date
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventTime {
    pub fn new(value: &str, time_zone: &str) -> Self {
        let mut time = Self {
            time_zone: Some(time_zone.to_string()),
            ..Self::default()
        };
        time.set_value(value);
        time
    }

    /// Replaces the date or date-time, switching kind when the new value has
    /// a different granularity. The time zone and extra fields are kept.
    pub fn set_value(&mut self, value: &str) {
        match Granularity::of(value) {
            Granularity::Date => {
                self.date = Some(value.to_string());
                self.date_time = None;
            }
            Granularity::DateTime => {
                self.date_time = Some(value.to_string());
                self.date = None;
            }
        }
    }

    pub fn value(&self) -> Option<&str> {
        self.date_time.as_deref().or(self.date.as_deref())
    }

    pub fn granularity(&self) -> Option<Granularity> {
        if self.date_time.is_some() {
            Some(Granularity::DateTime)
        } else if self.date.is_some() {
            Some(Granularity::Date)
        } else {
            None
        }
    }

    /// The event's own zone when it names a known one.
    pub fn zone(&self, default_tz: Tz) -> Tz {
        self.time_zone
            .as_deref()
            .and_then(|name| name.parse::<Tz>().ok())
            .unwrap_or(default_tz)
    }

    /// Resolves to an instant, using the event's own zone when it has one.
    pub fn instant(&self, default_tz: Tz) -> Option<DateTime<FixedOffset>> {
        resolve_instant(self.value()?, self.zone(default_tz))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CalendarEvent {
    /// Builds the document for a new event, rejecting mixed granularity and
    /// unparseable times before anything is sent.
    pub fn from_new(new: &NewEvent, default_tz: Tz) -> Result<Self, AssistantError> {
        let tz = match &new.timezone {
            Some(name) => parse_timezone(name)?,
            None => default_tz,
        };

        ensure_same_granularity(&new.start_time, &new.end_time, GRANULARITY_MISMATCH)?;
        ensure_resolvable("start_time", &new.start_time, tz)?;
        ensure_resolvable("end_time", &new.end_time, tz)?;

        let summary = new
            .summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SUMMARY);

        Ok(Self {
            summary: summary.to_string(),
            start: EventTime::new(&new.start_time, tz.name()),
            end: EventTime::new(&new.end_time, tz.name()),
            ..Self::default()
        })
    }

    /// Applies a patch in place. Fields the patch leaves out keep their
    /// stored value, including nested time zones and unknown fields.
    /// Supplied times must resolve before anything is changed.
    pub fn merge(&mut self, patch: &EventPatch, default_tz: Tz) -> Result<(), AssistantError> {
        let patch_tz = patch.timezone.as_deref().map(parse_timezone).transpose()?;

        if let Some(start) = &patch.start_time {
            ensure_resolvable("start_time", start, patch_tz.unwrap_or_else(|| self.start.zone(default_tz)))?;
        }
        if let Some(end) = &patch.end_time {
            ensure_resolvable("end_time", end, patch_tz.unwrap_or_else(|| self.end.zone(default_tz)))?;
        }

        if let Some(summary) = &patch.summary {
            self.summary = summary.clone();
        }
        if let Some(start) = &patch.start_time {
            self.start.set_value(start);
        }
        if let Some(end) = &patch.end_time {
            self.end.set_value(end);
        }
        if let Some(tz) = patch_tz {
            self.start.time_zone = Some(tz.name().to_string());
            self.end.time_zone = Some(tz.name().to_string());
        }

        if self.start.granularity() != self.end.granularity() {
            return Err(AssistantError::Validation(GRANULARITY_MISMATCH.to_string()));
        }

        Ok(())
    }

    /// Start and end as instants; used for window checks.
    pub fn span(&self, default_tz: Tz) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        Some((self.start.instant(default_tz)?, self.end.instant(default_tz)?))
    }
}

// ============================================================================
// COMMAND PARAMETERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub summary: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPatch {
    pub event_id: String,
    pub summary: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub timezone: Option<String>,
}

/// Raw window bounds as the caller sent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRequest {
    pub time_min: String,
    pub time_max: String,
}

/// Human-readable handle for an event: its title inside a time window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLookup {
    pub summary: String,
    pub start_time: String,
    pub end_time: String,
}

impl EventLookup {
    /// Window to search. A single all-day date (both ends equal) covers that
    /// whole day.
    pub fn window_request(&self) -> WindowRequest {
        let start = self.start_time.trim();
        let end = self.end_time.trim();

        let time_max = match NaiveDate::parse_from_str(end, "%Y-%m-%d") {
            Ok(date) if start == end => date
                .succ_opt()
                .map(|next| next.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| end.to_string()),
            _ => self.end_time.clone(),
        };

        WindowRequest {
            time_min: self.start_time.clone(),
            time_max,
        }
    }
}

/// A validated, resolved query window. Date-only bounds mean local midnight
/// in the configured zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub time_min: DateTime<FixedOffset>,
    pub time_max: DateTime<FixedOffset>,
}

impl TimeWindow {
    pub fn resolve(request: &WindowRequest, tz: Tz) -> Result<Self, AssistantError> {
        ensure_same_granularity(
            &request.time_min,
            &request.time_max,
            WINDOW_GRANULARITY_MISMATCH,
        )?;

        let time_min = ensure_resolvable("time_min", &request.time_min, tz)?;
        let time_max = ensure_resolvable("time_max", &request.time_max, tz)?;

        if time_max <= time_min {
            return Err(AssistantError::Validation(
                "time_max must be later than time_min".to_string(),
            ));
        }

        Ok(Self { time_min, time_max })
    }

    /// Overlap test with the calendar service's semantics: an event is in the
    /// window when it ends after `time_min` and starts before `time_max`.
    pub fn overlaps(&self, start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> bool {
        end > self.time_min && start < self.time_max
    }
}

// ============================================================================
// TIME HELPERS
// ============================================================================

/// Parses RFC 3339, a naive date-time (interpreted in `tz`) or a bare date
/// (local midnight in `tz`).
pub fn resolve_instant(value: &str, tz: Tz) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();

    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Some(instant);
    }

    let naive = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })?;

    let local = tz.from_local_datetime(&naive).earliest()?;
    let offset = local.offset().fix();
    Some(local.with_timezone(&offset))
}

pub fn parse_timezone(name: &str) -> Result<Tz, AssistantError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| AssistantError::Validation(format!("Unknown timezone '{}'", name)))
}

fn ensure_same_granularity(a: &str, b: &str, message: &str) -> Result<(), AssistantError> {
    if Granularity::of(a) == Granularity::of(b) {
        Ok(())
    } else {
        Err(AssistantError::Validation(message.to_string()))
    }
}

fn ensure_resolvable(name: &str, value: &str, tz: Tz) -> Result<DateTime<FixedOffset>, AssistantError> {
    resolve_instant(value, tz)
        .ok_or_else(|| AssistantError::Validation(format!("{} '{}' is not a valid date or dateTime", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TAIPEI: Tz = chrono_tz::Asia::Taipei;

    fn timed_event() -> CalendarEvent {
        serde_json::from_value(json!({
            "id": "abc",
            "summary": "Sync",
            "start": { "dateTime": "2024-01-20T09:00:00+08:00", "timeZone": "Asia/Taipei" },
            "end": { "dateTime": "2024-01-20T10:00:00+08:00", "timeZone": "Asia/Taipei" },
            "reminders": { "useDefault": true },
            "htmlLink": "https://calendar.example/abc"
        }))
        .unwrap()
    }

    #[test]
    fn granularity_is_decided_by_time_separator() {
        assert_eq!(Granularity::of("2024-01-20"), Granularity::Date);
        assert_eq!(Granularity::of("2024-01-20T09:00:00"), Granularity::DateTime);
    }

    #[test]
    fn new_event_rejects_mixed_granularity() {
        let new = NewEvent {
            summary: Some("Trip".to_string()),
            start_time: "2024-01-20".to_string(),
            end_time: "2024-01-21T10:00:00".to_string(),
            timezone: None,
        };

        let err = CalendarEvent::from_new(&new, TAIPEI).unwrap_err();
        assert_eq!(err.to_string(), GRANULARITY_MISMATCH);
    }

    #[test]
    fn new_all_day_event_uses_date_fields() {
        let new = NewEvent {
            summary: None,
            start_time: "2024-01-20".to_string(),
            end_time: "2024-01-21".to_string(),
            timezone: None,
        };

        let event = CalendarEvent::from_new(&new, TAIPEI).unwrap();
        let doc = serde_json::to_value(&event).unwrap();
        assert_eq!(
            doc,
            json!({
                "summary": DEFAULT_SUMMARY,
                "start": { "date": "2024-01-20", "timeZone": "Asia/Taipei" },
                "end": { "date": "2024-01-21", "timeZone": "Asia/Taipei" }
            })
        );
    }

    #[test]
    fn new_event_rejects_unknown_timezone_and_garbage_times() {
        let mut new = NewEvent {
            summary: None,
            start_time: "2024-01-20T09:00:00".to_string(),
            end_time: "2024-01-20T10:00:00".to_string(),
            timezone: Some("Mars/Olympus".to_string()),
        };
        assert!(matches!(
            CalendarEvent::from_new(&new, TAIPEI),
            Err(AssistantError::Validation(_))
        ));

        new.timezone = None;
        new.end_time = "2024-01-20Tlate".to_string();
        assert!(matches!(
            CalendarEvent::from_new(&new, TAIPEI),
            Err(AssistantError::Validation(_))
        ));
    }

    #[test]
    fn merge_preserves_unspecified_fields() {
        let mut event = timed_event();
        let before = event.clone();

        event
            .merge(
                &EventPatch {
                    event_id: "abc".to_string(),
                    summary: Some("Meeting".to_string()),
                    ..EventPatch::default()
                },
                TAIPEI,
            )
            .unwrap();

        assert_eq!(event.summary, "Meeting");
        assert_eq!(event.start, before.start);
        assert_eq!(event.end, before.end);
        assert_eq!(event.extra, before.extra);
        assert_eq!(event.html_link, before.html_link);
    }

    #[test]
    fn merge_rejects_a_half_changed_granularity() {
        let mut event = timed_event();
        let err = event
            .merge(
                &EventPatch {
                    event_id: "abc".to_string(),
                    start_time: Some("2024-01-21".to_string()),
                    ..EventPatch::default()
                },
                TAIPEI,
            )
            .unwrap_err();
        assert_eq!(err.to_string(), GRANULARITY_MISMATCH);
    }

    #[test]
    fn merge_can_switch_both_ends_to_all_day() {
        let mut event = timed_event();
        event
            .merge(
                &EventPatch {
                    event_id: "abc".to_string(),
                    start_time: Some("2024-01-21".to_string()),
                    end_time: Some("2024-01-22".to_string()),
                    timezone: Some("Europe/London".to_string()),
                    ..EventPatch::default()
                },
                TAIPEI,
            )
            .unwrap();

        assert_eq!(event.start.date.as_deref(), Some("2024-01-21"));
        assert_eq!(event.start.date_time, None);
        assert_eq!(event.end.time_zone.as_deref(), Some("Europe/London"));
    }

    #[test]
    fn merge_rejects_unparseable_times_without_touching_the_event() {
        let mut event = timed_event();
        let before = event.clone();

        let err = event
            .merge(
                &EventPatch {
                    event_id: "abc".to_string(),
                    summary: Some("Moved".to_string()),
                    start_time: Some("next monday".to_string()),
                    end_time: Some("whenever".to_string()),
                    ..EventPatch::default()
                },
                TAIPEI,
            )
            .unwrap_err();

        assert!(matches!(err, AssistantError::Validation(_)));
        assert_eq!(event, before);
    }

    #[test]
    fn lookup_on_a_single_date_covers_the_whole_day() {
        let lookup = EventLookup {
            summary: "Dentist".to_string(),
            start_time: "2024-01-22".to_string(),
            end_time: "2024-01-22".to_string(),
        };
        assert_eq!(lookup.window_request().time_max, "2024-01-23");

        let timed = EventLookup {
            end_time: "2024-01-22T18:00:00".to_string(),
            start_time: "2024-01-22T09:00:00".to_string(),
            ..lookup
        };
        assert_eq!(timed.window_request().time_max, "2024-01-22T18:00:00");
    }

    #[test]
    fn window_resolves_dates_to_local_midnight() {
        let window = TimeWindow::resolve(
            &WindowRequest {
                time_min: "2024-01-20".to_string(),
                time_max: "2024-01-21".to_string(),
            },
            TAIPEI,
        )
        .unwrap();

        assert_eq!(window.time_min.to_rfc3339(), "2024-01-20T00:00:00+08:00");
        assert_eq!(window.time_max.to_rfc3339(), "2024-01-21T00:00:00+08:00");
    }

    #[test]
    fn window_validation() {
        let mixed = WindowRequest {
            time_min: "2024-01-20".to_string(),
            time_max: "2024-01-21T00:00:00Z".to_string(),
        };
        let err = TimeWindow::resolve(&mixed, TAIPEI).unwrap_err();
        assert_eq!(err.to_string(), WINDOW_GRANULARITY_MISMATCH);

        let backwards = WindowRequest {
            time_min: "2024-01-21T00:00:00Z".to_string(),
            time_max: "2024-01-20T00:00:00Z".to_string(),
        };
        assert!(matches!(
            TimeWindow::resolve(&backwards, TAIPEI),
            Err(AssistantError::Validation(_))
        ));
    }

    #[test]
    fn event_span_and_overlap() {
        let event = timed_event();
        let (start, end) = event.span(TAIPEI).unwrap();

        let window = TimeWindow::resolve(
            &WindowRequest {
                time_min: "2024-01-20T09:30:00+08:00".to_string(),
                time_max: "2024-01-20T12:00:00+08:00".to_string(),
            },
            TAIPEI,
        )
        .unwrap();
        assert!(window.overlaps(start, end));

        let later = TimeWindow::resolve(
            &WindowRequest {
                time_min: "2024-01-20T10:00:00+08:00".to_string(),
                time_max: "2024-01-20T12:00:00+08:00".to_string(),
            },
            TAIPEI,
        )
        .unwrap();
        assert!(!later.overlaps(start, end));
    }
}
