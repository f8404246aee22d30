use chrono::Utc;
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::commands::{
    AccountingCommand, CalendarCommand, CommandRequest, Domain, EventTarget, RawCommand, WeatherCommand,
};
use super::natural_language::NaturalLanguageAdapter;
use crate::core::accounting::{parse_expense, AccountingService, ExpenseSheet};
use crate::core::calendar::{CalendarService, CalendarStore};
use crate::core::errors::AssistantError;
use crate::core::weather::{WeatherProvider, WeatherQuery, WeatherReport, WeatherService};

/// Domain-specific success payload, or the error to render as `{ "error": .. }`.
pub type CommandResult = Result<Value, AssistantError>;

#[derive(Debug, Serialize)]
struct WeatherReply {
    response: String,
    forecast: WeatherReport,
}

/// Routes validated commands to the domain services. Stateless per request.
pub struct Assistant {
    accounting: AccountingService<Arc<dyn ExpenseSheet>>,
    calendar: CalendarService<Arc<dyn CalendarStore>>,
    weather: Option<WeatherService<Arc<dyn WeatherProvider>>>,
    language: Option<NaturalLanguageAdapter>,
    timezone: Tz,
}

impl Assistant {
    pub fn new(
        accounting: AccountingService<Arc<dyn ExpenseSheet>>,
        calendar: CalendarService<Arc<dyn CalendarStore>>,
        timezone: Tz,
    ) -> Self {
        Self {
            accounting,
            calendar,
            weather: None,
            language: None,
            timezone,
        }
    }

    pub fn with_weather(mut self, weather: WeatherService<Arc<dyn WeatherProvider>>) -> Self {
        self.weather = Some(weather);
        self
    }

    pub fn with_language_model(mut self, adapter: NaturalLanguageAdapter) -> Self {
        self.language = Some(adapter);
        self
    }

    /// Entry point for inbound requests. `route` is the domain implied by the
    /// endpoint; `None` means the unified endpoint, where `agent_type` decides.
    pub async fn handle(&self, route: Option<Domain>, raw: RawCommand) -> CommandResult {
        let domain = match route {
            Some(domain) => Some(domain),
            None => resolve_agent_type(&raw)?,
        };

        if raw.wants_natural_language() {
            return self.handle_text(domain, &raw).await;
        }

        // Structured requests always name their domain.
        let domain = domain.ok_or_else(|| AssistantError::InvalidAgentType(String::new()))?;
        let command = raw
            .command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AssistantError::missing(domain.as_str(), &["command"]))?;

        tracing::debug!(%domain, command, "Handling structured command");
        let request = CommandRequest::parse(domain, command, &raw.parameters)?;
        self.dispatch(request).await
    }

    /// Runs one validated command. Exhaustive over every (domain, command).
    pub async fn dispatch(&self, request: CommandRequest) -> CommandResult {
        match request {
            CommandRequest::Accounting(command) => match command {
                AccountingCommand::Query(filter) => payload(self.accounting.query(&filter).await?),
                AccountingCommand::Add(record) => payload(self.accounting.add(record).await?),
                AccountingCommand::Update { key, changes } => {
                    payload(self.accounting.update(&key, changes).await?)
                }
                AccountingCommand::Delete(key) => payload(self.accounting.delete(&key).await?),
            },
            CommandRequest::Calendar(command) => match command {
                CalendarCommand::Query(window) => payload(self.calendar.query(&window).await?),
                CalendarCommand::Add(event) => payload(self.calendar.create(&event).await?),
                CalendarCommand::Update(patch) => payload(self.calendar.update(&patch).await?),
                CalendarCommand::Delete(EventTarget::Id(event_id)) => {
                    payload(self.calendar.delete(&event_id).await?)
                }
                CalendarCommand::Delete(EventTarget::Lookup(lookup)) => {
                    let event_id = self.calendar.find_event_id(&lookup).await?;
                    payload(self.calendar.delete(&event_id).await?)
                }
            },
            CommandRequest::Weather(WeatherCommand::Query(query)) => {
                let report = self.forecast(&query).await?;
                payload(WeatherReply {
                    response: report.summary(),
                    forecast: report,
                })
            }
        }
    }

    async fn handle_text(&self, domain: Option<Domain>, raw: &RawCommand) -> CommandResult {
        let text = raw
            .query
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                let context = domain.map(|d| d.as_str()).unwrap_or("natural language request");
                AssistantError::missing(context, &["query"])
            })?;

        let request = self.interpret(text, domain).await?;

        // Weather questions get a conversational answer when a model is wired in.
        if let (CommandRequest::Weather(WeatherCommand::Query(query)), Some(language)) =
            (&request, &self.language)
        {
            let report = self.forecast(query).await?;
            let response = match language.describe_weather(text, &report).await {
                Ok(reply) => reply,
                Err(err) => {
                    tracing::warn!(error = %err, "Weather reply generation failed; using plain summary");
                    report.summary()
                }
            };
            return payload(WeatherReply {
                response,
                forecast: report,
            });
        }

        self.dispatch(request).await
    }

    async fn interpret(&self, text: &str, domain: Option<Domain>) -> Result<CommandRequest, AssistantError> {
        if let Some(language) = &self.language {
            return language.parse(text, domain).await;
        }

        match domain {
            Some(Domain::Accounting) => {
                let today = Utc::now().with_timezone(&self.timezone).date_naive();
                let record = parse_expense(text, today);
                if record.amount.is_none() {
                    return Err(AssistantError::missing("accounting add", &["amount"]));
                }
                Ok(CommandRequest::Accounting(AccountingCommand::Add(record)))
            }
            _ => Err(AssistantError::NotConfigured("language model")),
        }
    }

    async fn forecast(&self, query: &WeatherQuery) -> Result<WeatherReport, AssistantError> {
        let weather = self
            .weather
            .as_ref()
            .ok_or(AssistantError::NotConfigured("weather service"))?;
        weather.forecast(query).await
    }
}

/// `None` only for free text with no agent_type, where the model picks.
fn resolve_agent_type(raw: &RawCommand) -> Result<Option<Domain>, AssistantError> {
    match raw.agent_type.as_deref().map(str::trim) {
        Some(agent_type) if !agent_type.is_empty() => agent_type
            .parse()
            .map(Some)
            .map_err(|_| AssistantError::InvalidAgentType(agent_type.to_string())),
        _ if raw.wants_natural_language() => Ok(None),
        _ => Err(AssistantError::InvalidAgentType(String::new())),
    }
}

fn payload<T: Serialize>(value: T) -> CommandResult {
    serde_json::to_value(value).map_err(|err| AssistantError::Unexpected(err.to_string()))
}
