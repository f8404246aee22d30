// Free text → typed command, via the language model.
//
// The model is asked for one JSON object. Whatever comes back is untrusted:
// it must deserialize into `LlmCommand` exactly (unknown fields rejected) and
// then pass the same `CommandRequest::parse` validation as a structured
// request. Nothing the model returns is executed or evaluated.

use chrono::Utc;
use chrono_tz::Tz;
use serde::Deserialize;

use super::commands::{CommandRequest, Domain, Parameters};
use crate::core::ai::{strip_code_fences, AiConfig, AiProvider, AiService};
use crate::core::errors::{AssistantError, RemoteOrigin, RemoteServiceError};
use crate::core::weather::WeatherReport;

/// The only shape accepted from the model.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LlmCommand {
    agent_type: String,
    command: String,
    #[serde(default)]
    parameters: Parameters,
}

pub struct NaturalLanguageAdapter {
    ai: AiService<Box<dyn AiProvider>>,
    timezone: Tz,
}

impl NaturalLanguageAdapter {
    pub fn new(provider: Box<dyn AiProvider>, config: AiConfig, timezone: Tz) -> Self {
        Self {
            ai: AiService::new(provider, config),
            timezone,
        }
    }

    /// Turns `text` into a command. `hint` pins the domain when the request
    /// came in on a per-domain route.
    pub async fn parse(&self, text: &str, hint: Option<Domain>) -> Result<CommandRequest, AssistantError> {
        let instruction = build_parse_instruction(hint, self.timezone);
        let reply = self
            .ai
            .complete(&instruction, text)
            .await
            .map_err(|err| RemoteServiceError::transport(RemoteOrigin::LanguageModel, err))?;

        tracing::debug!(reply = %reply, "Language model parse reply");

        let command = interpret_reply(&reply, hint)?;
        tracing::info!(domain = %command.domain(), "Parsed natural-language request");
        Ok(command)
    }

    /// Short friendly reply for a forecast, with a practical reminder.
    pub async fn describe_weather(
        &self,
        question: &str,
        report: &WeatherReport,
    ) -> Result<String, AssistantError> {
        let forecast = serde_json::to_string(report).map_err(|err| AssistantError::Unexpected(err.to_string()))?;
        let input = format!("Question: {}\nForecast: {}", question, forecast);

        self.ai
            .complete(WEATHER_INSTRUCTION, &input)
            .await
            .map_err(|err| RemoteServiceError::transport(RemoteOrigin::LanguageModel, err).into())
    }
}

const WEATHER_INSTRUCTION: &str = "You are a friendly weather assistant. \
Answer the question in one or two sentences using only the forecast data given. \
Reply in the same language as the question. \
End with a short practical reminder, such as taking an umbrella or a jacket, when the weather calls for it. \
The forecast time is UTC.";

fn build_parse_instruction(hint: Option<Domain>, timezone: Tz) -> String {
    let now = Utc::now().with_timezone(&timezone);

    let mut prompt = String::from(
        "You convert a personal assistant request into a single JSON object.\n\
         Reply with JSON only, no prose and no Markdown. The object has exactly these keys:\n\
         {\"agent_type\": string, \"command\": string, \"parameters\": object}\n\n\
         Allowed agent_type / command / parameters:\n\
         - accounting / add: date (YYYY-MM-DD), category, amount (integer), note (optional)\n\
         - accounting / query: date_range ([start, end] dates, optional), category (optional)\n\
         - accounting / update: date, category, amount, note (optional)\n\
         - accounting / delete: date, category\n\
         - calendar / add: summary, start_time, end_time, timezone (optional)\n\
         - calendar / query: time_min, time_max\n\
         - calendar / update: event_id, summary, start_time, end_time (all but event_id optional)\n\
         - calendar / delete: event_id, or summary + start_time + end_time when the id is unknown\n\
         - weather / query: location (city name in English, e.g. \"Taipei\" for 台北), \
           datetime (YYYY-MM-DD HH:MM:SS, optional)\n\n\
         Calendar times are YYYY-MM-DDTHH:MM:SS for timed events or YYYY-MM-DD for all-day events; \
         start and end must use the same form.\n",
    );

    prompt.push_str(&format!(
        "The current local time is {} ({}). Resolve relative dates against it.\n",
        now.format("%Y-%m-%d %H:%M:%S (%A)"),
        timezone.name()
    ));

    if let Some(domain) = hint {
        prompt.push_str(&format!("The agent_type must be \"{}\".\n", domain));
    }

    prompt
}

/// Validates a model reply. Every failure is a parse error: the caller never
/// wrote these parameters, the model did.
fn interpret_reply(reply: &str, hint: Option<Domain>) -> Result<CommandRequest, AssistantError> {
    let body = strip_code_fences(reply);
    let command: LlmCommand = serde_json::from_str(body)
        .map_err(|err| AssistantError::Parse(format!("model reply is not a valid command object ({})", err)))?;

    let domain: Domain = command
        .agent_type
        .parse()
        .map_err(|_| AssistantError::Parse(format!("unknown agent_type '{}'", command.agent_type)))?;

    if let Some(expected) = hint {
        if expected != domain {
            return Err(AssistantError::Parse(format!(
                "request looks like a {} request, not {}",
                domain, expected
            )));
        }
    }

    let is_delete = command.command.trim().eq_ignore_ascii_case("delete");
    let has_event_id = command
        .parameters
        .get("event_id")
        .and_then(|value| value.as_str())
        .is_some_and(|id| !id.trim().is_empty());

    let parsed = if domain == Domain::Calendar && is_delete && !has_event_id {
        CommandRequest::parse_event_lookup(&command.parameters)
    } else {
        CommandRequest::parse(domain, &command.command, &command.parameters)
    };

    parsed.map_err(|err| AssistantError::Parse(err.to_string()))
}
