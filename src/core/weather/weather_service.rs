// Weather lookup: fetch the multi-day forecast for a location and pick the
// forecast slot closest to the requested time.
//
// Forecast timestamps (`dt_txt`) are UTC. The requested time is local to the
// configured timezone and is converted before comparing.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;

use crate::core::errors::{AssistantError, RemoteOrigin, RemoteServiceError};

const FORECAST_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One forecast slot as returned by the weather service.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastEntry {
    /// UTC, formatted `YYYY-MM-DD HH:MM:SS`.
    pub dt_txt: String,
    pub description: String,
    pub temperature: f64,
    pub humidity: f64,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch_forecast(&self, location: &str) -> Result<Vec<ForecastEntry>, RemoteServiceError>;

    /// Unit label for temperatures, e.g. "°C".
    fn temperature_unit(&self) -> &str;
}

#[async_trait]
impl<T: WeatherProvider + ?Sized> WeatherProvider for Arc<T> {
    async fn fetch_forecast(&self, location: &str) -> Result<Vec<ForecastEntry>, RemoteServiceError> {
        (**self).fetch_forecast(location).await
    }

    fn temperature_unit(&self) -> &str {
        (**self).temperature_unit()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherQuery {
    pub location: String,
    /// Local target time; `None` means now.
    pub datetime: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherReport {
    pub location: String,
    pub forecast_time: String,
    pub description: String,
    pub temperature: f64,
    pub temperature_unit: String,
    pub humidity: f64,
}

impl WeatherReport {
    /// Plain one-line summary, used when no language model is available.
    pub fn summary(&self) -> String {
        format!(
            "{} at {} UTC: {}, {:.1}{}, humidity {:.0}%",
            self.location,
            self.forecast_time,
            self.description,
            self.temperature,
            self.temperature_unit,
            self.humidity
        )
    }
}

pub struct WeatherService<P: WeatherProvider> {
    provider: P,
    timezone: Tz,
}

impl<P: WeatherProvider> WeatherService<P> {
    pub fn new(provider: P, timezone: Tz) -> Self {
        Self { provider, timezone }
    }

    pub async fn forecast(&self, query: &WeatherQuery) -> Result<WeatherReport, AssistantError> {
        let target = match &query.datetime {
            Some(raw) => parse_target(raw, self.timezone)?,
            None => Utc::now(),
        };

        let entries = self.provider.fetch_forecast(&query.location).await?;
        let closest = closest_forecast(&entries, target).ok_or_else(|| {
            RemoteServiceError::new(
                RemoteOrigin::Weather,
                None,
                format!("no forecast data returned for '{}'", query.location),
            )
        })?;

        tracing::debug!(location = %query.location, slot = %closest.dt_txt, "Selected forecast slot");

        Ok(WeatherReport {
            location: query.location.clone(),
            forecast_time: closest.dt_txt.clone(),
            description: closest.description.clone(),
            temperature: closest.temperature,
            temperature_unit: self.provider.temperature_unit().to_string(),
            humidity: closest.humidity,
        })
    }
}

/// The entry whose timestamp is nearest to `target`. Entries with an
/// unreadable timestamp are ignored; ties go to the earlier entry.
pub fn closest_forecast(entries: &[ForecastEntry], target: DateTime<Utc>) -> Option<&ForecastEntry> {
    entries
        .iter()
        .filter_map(|entry| {
            let at = NaiveDateTime::parse_from_str(&entry.dt_txt, FORECAST_TIME_FORMAT).ok()?;
            let distance = (Utc.from_utc_datetime(&at) - target).num_seconds().abs();
            Some((distance, entry))
        })
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, entry)| entry)
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM[:SS]`, `YYYY-MM-DDTHH:MM[:SS]` (local)
/// or a bare date (local noon).
fn parse_target(raw: &str, tz: Tz) -> Result<DateTime<Utc>, AssistantError> {
    let raw = raw.trim();

    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }

    let naive = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ]
    .iter()
    .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
    .or_else(|| {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(12, 0, 0))
    });

    naive
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| AssistantError::Validation(format!("datetime '{}' is not a valid time", raw)))
}
