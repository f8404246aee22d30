// OpenWeather 5-day / 3-hour forecast client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::WeatherConfig;
use crate::core::errors::{RemoteOrigin, RemoteServiceError};
use crate::core::weather::{ForecastEntry, WeatherProvider};

const FORECAST_URL: &str = "https://api.openweathermap.org/data/2.5/forecast";
const ORIGIN: RemoteOrigin = RemoteOrigin::Weather;

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    list: Vec<ForecastItem>,
}

#[derive(Debug, Deserialize)]
struct ForecastItem {
    dt_txt: String,
    main: MainReadings,
    #[serde(default)]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
}

/// `{"cod": "404", "message": "city not found"}`
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

impl From<ForecastItem> for ForecastEntry {
    fn from(item: ForecastItem) -> Self {
        ForecastEntry {
            dt_txt: item.dt_txt,
            description: item
                .weather
                .into_iter()
                .next()
                .map(|c| c.description)
                .unwrap_or_default(),
            temperature: item.main.temp,
            humidity: item.main.humidity,
        }
    }
}

pub struct OpenWeatherClient {
    client: Client,
    api_key: String,
    units: String,
    lang: String,
}

impl OpenWeatherClient {
    pub fn new(client: Client, config: &WeatherConfig) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            units: config.units.clone(),
            lang: config.lang.clone(),
        }
    }
}

/// OpenWeather reports Kelvin unless told otherwise.
fn unit_label(units: &str) -> &'static str {
    match units {
        "metric" => "°C",
        "imperial" => "°F",
        _ => "K",
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn fetch_forecast(&self, location: &str) -> Result<Vec<ForecastEntry>, RemoteServiceError> {
        tracing::debug!(location, units = %self.units, "Fetching forecast");

        let response = self
            .client
            .get(FORECAST_URL)
            .query(&[
                ("q", location),
                ("appid", self.api_key.as_str()),
                ("units", self.units.as_str()),
                ("lang", self.lang.as_str()),
            ])
            .send()
            .await
            .map_err(|err| RemoteServiceError::transport(ORIGIN, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|err| err.message)
                .unwrap_or(body);
            tracing::error!(status = status.as_u16(), %message, "Forecast request failed");
            return Err(RemoteServiceError::new(ORIGIN, Some(status.as_u16()), message));
        }

        let forecast: ForecastResponse = response
            .json()
            .await
            .map_err(|err| RemoteServiceError::transport(ORIGIN, format!("unexpected response body: {}", err)))?;

        Ok(forecast.list.into_iter().map(ForecastEntry::from).collect())
    }

    fn temperature_unit(&self) -> &str {
        unit_label(&self.units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_forecast_slots() {
        let response: ForecastResponse = serde_json::from_value(json!({
            "cod": "200",
            "cnt": 2,
            "list": [
                {
                    "dt": 1705730400,
                    "dt_txt": "2024-01-20 06:00:00",
                    "main": {"temp": 21.4, "humidity": 68, "pressure": 1017},
                    "weather": [{"id": 803, "main": "Clouds", "description": "多雲"}]
                },
                {
                    "dt_txt": "2024-01-20 09:00:00",
                    "main": {"temp": 19.0, "humidity": 75},
                    "weather": []
                }
            ]
        }))
        .unwrap();

        let entries: Vec<ForecastEntry> = response.list.into_iter().map(ForecastEntry::from).collect();
        assert_eq!(entries[0].description, "多雲");
        assert_eq!(entries[0].humidity, 68.0);
        assert_eq!(entries[1].description, "");
    }

    #[test]
    fn unit_labels_follow_units_parameter() {
        assert_eq!(unit_label("metric"), "°C");
        assert_eq!(unit_label("imperial"), "°F");
        assert_eq!(unit_label("standard"), "K");
    }
}
