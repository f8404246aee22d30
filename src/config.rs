// Startup configuration, read once from the environment (after `.env` is
// loaded). Every value is validated here so the rest of the program never
// touches `std::env`.

use chrono_tz::Tz;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::core::accounting::SheetRange;
use crate::core::calendar::calendar_models::parse_timezone;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_TIMEZONE: &str = "Asia/Taipei";
const DEFAULT_CALENDAR_ID: &str = "primary";
const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-4o";
const DEFAULT_LLM_TEMPERATURE: f32 = 0.2;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name}='{value}' is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(name: &'static str, value: &str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Google Sheets + Google Calendar.
    Google,
    /// Process-local stores, for development.
    Memory,
}

/// Where the Google OAuth2 credentials come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    ServiceAccountFile(PathBuf),
    ServiceAccountJson(String),
    /// `token.json` holding a refresh token for a user account.
    AuthorizedUserFile(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleConfig {
    pub spreadsheet_id: String,
    /// Numeric id of the sheet holding the table; resolved from the range's
    /// sheet title when absent.
    pub sheet_id: Option<u32>,
    pub calendar_id: String,
    pub credentials: CredentialSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherConfig {
    pub api_key: String,
    pub units: String,
    pub lang: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub backend: Backend,
    /// Always `Some` for the Google backend.
    pub google: Option<GoogleConfig>,
    pub sheet_range: SheetRange,
    pub timezone: Tz,
    pub weather: Option<WeatherConfig>,
    pub llm: Option<LlmConfig>,
    pub http_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_raw = var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|err| ConfigError::invalid("BIND_ADDR", &bind_raw, err))?;

        let backend = match var("ASSISTANT_BACKEND").as_deref() {
            None => Backend::Google,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "google" => Backend::Google,
                "memory" => Backend::Memory,
                _ => return Err(ConfigError::invalid("ASSISTANT_BACKEND", value, "expected 'google' or 'memory'")),
            },
        };

        let sheet_range = match var("SHEETS_RANGE") {
            Some(raw) => raw
                .parse::<SheetRange>()
                .map_err(|err| ConfigError::invalid("SHEETS_RANGE", &raw, err))?,
            None => SheetRange::default(),
        };

        let tz_raw = var("DEFAULT_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone = parse_timezone(&tz_raw).map_err(|err| ConfigError::invalid("DEFAULT_TIMEZONE", &tz_raw, err))?;

        let google = match backend {
            Backend::Google => Some(GoogleConfig {
                spreadsheet_id: var("SHEETS_SPREADSHEET_ID").ok_or(ConfigError::Missing("SHEETS_SPREADSHEET_ID"))?,
                sheet_id: var("SHEETS_SHEET_ID")
                    .map(|raw| {
                        raw.parse::<u32>()
                            .map_err(|err| ConfigError::invalid("SHEETS_SHEET_ID", &raw, err))
                    })
                    .transpose()?,
                calendar_id: var("CALENDAR_ID").unwrap_or_else(|| DEFAULT_CALENDAR_ID.to_string()),
                credentials: credential_source(&var)?,
            }),
            Backend::Memory => None,
        };

        let weather = var("OPENWEATHER_API_KEY").map(|api_key| WeatherConfig {
            api_key,
            units: var("WEATHER_UNITS").unwrap_or_else(|| "metric".to_string()),
            lang: var("WEATHER_LANG").unwrap_or_else(|| "zh_tw".to_string()),
        });

        let llm = match var("LLM_API_KEY") {
            Some(api_key) => {
                let temperature = match var("LLM_TEMPERATURE") {
                    Some(raw) => raw
                        .parse::<f32>()
                        .ok()
                        .filter(|t| (0.0..=2.0).contains(t))
                        .ok_or_else(|| ConfigError::invalid("LLM_TEMPERATURE", &raw, "expected a number between 0 and 2"))?,
                    None => DEFAULT_LLM_TEMPERATURE,
                };

                Some(LlmConfig {
                    api_key,
                    base_url: var("LLM_BASE_URL")
                        .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string())
                        .trim_end_matches('/')
                        .to_string(),
                    model: var("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                    temperature,
                })
            }
            None => None,
        };

        let http_timeout = match var("HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| ConfigError::invalid("HTTP_TIMEOUT_SECS", &raw, "expected a positive number of seconds"))?,
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        Ok(Self {
            bind_addr,
            backend,
            google,
            sheet_range,
            timezone,
            weather,
            llm,
            http_timeout,
        })
    }
}

/// Service account key file wins over inline JSON, which wins over a user
/// token file.
fn credential_source<V>(var: &V) -> Result<CredentialSource, ConfigError>
where
    V: Fn(&str) -> Option<String>,
{
    if let Some(path) = var("GOOGLE_SERVICE_ACCOUNT_KEY") {
        return Ok(CredentialSource::ServiceAccountFile(PathBuf::from(path)));
    }
    if let Some(json) = var("GOOGLE_SERVICE_ACCOUNT_JSON") {
        return Ok(CredentialSource::ServiceAccountJson(json));
    }
    if let Some(path) = var("GOOGLE_AUTHORIZED_USER_FILE") {
        return Ok(CredentialSource::AuthorizedUserFile(PathBuf::from(path)));
    }

    Err(ConfigError::Missing(
        "GOOGLE_SERVICE_ACCOUNT_KEY, GOOGLE_SERVICE_ACCOUNT_JSON or GOOGLE_AUTHORIZED_USER_FILE",
    ))
}
