// This is the entry point of the assistant backend.
//
// **Architecture Overview:**
// - `core/` = Business logic (accounting, calendar, weather, command dispatch)
// - `infra/` = Implementations of core traits (Google APIs, OpenWeather, LLM, in-memory)
// - `api/` = HTTP adapter (routes, status codes)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Build the router
// 4. Serve until Ctrl-C

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "api/api_layer.rs"]
mod api;
mod config;
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::api::{create_router, AppState};
use crate::config::{AppConfig, Backend};
use crate::core::accounting::{AccountingService, ExpenseSheet};
use crate::core::ai::AiConfig;
use crate::core::assistant::{Assistant, NaturalLanguageAdapter};
use crate::core::calendar::{CalendarService, CalendarStore};
use crate::core::credentials::CredentialProvider;
use crate::core::weather::{WeatherProvider, WeatherService};
use crate::infra::ai::OpenAiCompatibleClient;
use crate::infra::google::{GoogleAuth, GoogleCalendarClient, GoogleSheetsClient};
use crate::infra::memory::{InMemoryCalendar, InMemorySheet};
use crate::infra::weather::OpenWeatherClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (if it exists)
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    // One HTTP client for every remote service; it carries the request timeout.
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("failed to build HTTP client")?;

    let assistant = build_assistant(&config, http).await?;
    let app = create_router(AppState::new(assistant));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn build_assistant(config: &AppConfig, http: reqwest::Client) -> anyhow::Result<Assistant> {
    let (sheet, calendar): (Arc<dyn ExpenseSheet>, Arc<dyn CalendarStore>) = match config.backend {
        Backend::Memory => {
            tracing::warn!("Using in-memory stores; data is lost on restart");
            (
                Arc::new(InMemorySheet::new()),
                Arc::new(InMemoryCalendar::new(config.timezone)),
            )
        }
        Backend::Google => {
            let google = config
                .google
                .as_ref()
                .context("Google backend selected without Google settings")?;

            let auth = GoogleAuth::load(&google.credentials, http.clone())
                .await
                .context("failed to load Google credentials")?;
            let credentials: Arc<dyn CredentialProvider> = Arc::new(auth);

            tracing::info!(
                spreadsheet = %google.spreadsheet_id,
                calendar = %google.calendar_id,
                "Using Google Sheets and Google Calendar"
            );
            (
                Arc::new(GoogleSheetsClient::new(
                    http.clone(),
                    Arc::clone(&credentials),
                    google.spreadsheet_id.clone(),
                    google.sheet_id,
                )),
                Arc::new(GoogleCalendarClient::new(
                    http.clone(),
                    credentials,
                    google.calendar_id.clone(),
                )),
            )
        }
    };

    let mut assistant = Assistant::new(
        AccountingService::new(sheet, config.sheet_range.clone()),
        CalendarService::new(calendar, config.timezone),
        config.timezone,
    );

    match &config.weather {
        Some(weather) => {
            let provider: Arc<dyn WeatherProvider> = Arc::new(OpenWeatherClient::new(http.clone(), weather));
            assistant = assistant.with_weather(WeatherService::new(provider, config.timezone));
        }
        None => tracing::warn!("OPENWEATHER_API_KEY not set; weather requests will fail"),
    }

    match &config.llm {
        Some(llm) => {
            let ai_config = AiConfig {
                model: llm.model.clone(),
                temperature: llm.temperature,
                max_tokens: None,
            };
            let provider = Box::new(OpenAiCompatibleClient::new(http, llm));
            assistant =
                assistant.with_language_model(NaturalLanguageAdapter::new(provider, ai_config, config.timezone));
            tracing::info!(model = %llm.model, "Natural-language requests enabled");
        }
        None => tracing::info!("LLM_API_KEY not set; natural-language requests limited to quick expense entry"),
    }

    Ok(assistant)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(err) => tracing::error!("Failed to listen for Ctrl-C: {}", err),
    }
}
