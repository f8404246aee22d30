// The closed set of commands the assistant understands.
//
// Inbound requests carry loosely typed `(domain, command, parameters)`
// triples. `CommandRequest::parse` is the single place where those are
// checked against the required-parameter table and turned into typed
// commands; everything downstream matches on enums.
//
// | domain     | command | required parameters          |
// |------------|---------|------------------------------|
// | accounting | add     | date, category, amount       |
// | accounting | update  | date, category, amount       |
// | accounting | delete  | date, category               |
// | accounting | query   | (date_range, category opt.)  |
// | calendar   | add     | start_time, end_time         |
// | calendar   | update  | event_id                     |
// | calendar   | delete  | event_id                     |
// | calendar   | query   | time_min, time_max           |
// | weather    | query   | location (datetime optional) |

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::core::accounting::{
    ExpenseChanges, ExpenseFilter, ExpenseKey, ExpenseRecord, DEFAULT_CATEGORY,
};
use crate::core::calendar::{EventLookup, EventPatch, NewEvent, WindowRequest};
use crate::core::errors::AssistantError;
use crate::core::weather::WeatherQuery;

pub type Parameters = Map<String, Value>;

/// Inbound request body. `agent_type` is only read by the unified endpoint;
/// the per-domain routes imply it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCommand {
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default, alias = "operation")]
    pub command: Option<String>,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub natural_language: bool,
    #[serde(default)]
    pub query: Option<String>,
}

impl RawCommand {
    /// Free text goes through the language adapter when the caller asks for
    /// it, or when there is text but no structured command.
    pub fn wants_natural_language(&self) -> bool {
        self.natural_language || (self.command.is_none() && self.query.is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Accounting,
    Calendar,
    Weather,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Accounting => "accounting",
            Domain::Calendar => "calendar",
            Domain::Weather => "weather",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = AssistantError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "accounting" => Ok(Domain::Accounting),
            "calendar" => Ok(Domain::Calendar),
            "weather" => Ok(Domain::Weather),
            _ => Err(AssistantError::UnknownDomain(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountingCommand {
    Query(ExpenseFilter),
    Add(ExpenseRecord),
    Update { key: ExpenseKey, changes: ExpenseChanges },
    Delete(ExpenseKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTarget {
    Id(String),
    /// Only produced on the natural-language path.
    Lookup(EventLookup),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarCommand {
    Query(WindowRequest),
    Add(NewEvent),
    Update(EventPatch),
    Delete(EventTarget),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeatherCommand {
    Query(WeatherQuery),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    Accounting(AccountingCommand),
    Calendar(CalendarCommand),
    Weather(WeatherCommand),
}

impl CommandRequest {
    /// Validates a structured command against the required-parameter table.
    pub fn parse(domain: Domain, command: &str, parameters: &Parameters) -> Result<Self, AssistantError> {
        let command = command.trim().to_ascii_lowercase();
        let params = Params::new(domain, &command, parameters);

        match (domain, command.as_str()) {
            (Domain::Accounting, "query") => Ok(CommandRequest::Accounting(AccountingCommand::Query(
                ExpenseFilter {
                    date_range: params.date_range("date_range")?,
                    category: params.text("category"),
                },
            ))),
            (Domain::Accounting, "add") => {
                params.require(&["date", "category", "amount"])?;
                Ok(CommandRequest::Accounting(AccountingCommand::Add(ExpenseRecord {
                    date: params.date("date")?,
                    category: params.category(),
                    amount: Some(params.integer("amount")?),
                    note: params.text("note").unwrap_or_default(),
                })))
            }
            (Domain::Accounting, "update") => {
                params.require(&["date", "category", "amount"])?;
                Ok(CommandRequest::Accounting(AccountingCommand::Update {
                    key: params.expense_key(),
                    changes: ExpenseChanges {
                        amount: params.integer("amount")?,
                        note: params.text_allow_empty("note"),
                    },
                }))
            }
            (Domain::Accounting, "delete") => {
                params.require(&["date", "category"])?;
                Ok(CommandRequest::Accounting(AccountingCommand::Delete(params.expense_key())))
            }

            (Domain::Calendar, "query") => {
                params.require(&["time_min", "time_max"])?;
                Ok(CommandRequest::Calendar(CalendarCommand::Query(WindowRequest {
                    time_min: params.required_text("time_min"),
                    time_max: params.required_text("time_max"),
                })))
            }
            (Domain::Calendar, "add") => {
                params.require(&["start_time", "end_time"])?;
                Ok(CommandRequest::Calendar(CalendarCommand::Add(NewEvent {
                    summary: params.text("summary"),
                    start_time: params.required_text("start_time"),
                    end_time: params.required_text("end_time"),
                    timezone: params.text("timezone"),
                })))
            }
            (Domain::Calendar, "update") => {
                params.require(&["event_id"])?;
                Ok(CommandRequest::Calendar(CalendarCommand::Update(EventPatch {
                    event_id: params.required_text("event_id"),
                    summary: params.text("summary"),
                    start_time: params.text("start_time"),
                    end_time: params.text("end_time"),
                    timezone: params.text("timezone"),
                })))
            }
            (Domain::Calendar, "delete") => {
                params.require(&["event_id"])?;
                Ok(CommandRequest::Calendar(CalendarCommand::Delete(EventTarget::Id(
                    params.required_text("event_id"),
                ))))
            }

            (Domain::Weather, "query") => {
                params.require(&["location"])?;
                Ok(CommandRequest::Weather(WeatherCommand::Query(WeatherQuery {
                    location: params.required_text("location"),
                    datetime: params.text("datetime"),
                })))
            }

            (domain, other) => Err(AssistantError::UnknownCommand {
                domain: domain.to_string(),
                command: other.to_string(),
            }),
        }
    }

    /// Calendar delete by title + window. Used when free text names an event
    /// instead of giving its id.
    pub fn parse_event_lookup(parameters: &Parameters) -> Result<Self, AssistantError> {
        let params = Params::new(Domain::Calendar, "delete", parameters);
        params.require(&["summary", "start_time", "end_time"])?;

        Ok(CommandRequest::Calendar(CalendarCommand::Delete(EventTarget::Lookup(EventLookup {
            summary: params.required_text("summary"),
            start_time: params.required_text("start_time"),
            end_time: params.required_text("end_time"),
        }))))
    }

    pub fn domain(&self) -> Domain {
        match self {
            CommandRequest::Accounting(_) => Domain::Accounting,
            CommandRequest::Calendar(_) => Domain::Calendar,
            CommandRequest::Weather(_) => Domain::Weather,
        }
    }
}

/// Typed accessors over the raw parameter map.
struct Params<'a> {
    context: String,
    map: &'a Parameters,
}

impl<'a> Params<'a> {
    fn new(domain: Domain, command: &str, map: &'a Parameters) -> Self {
        Self {
            context: format!("{} {}", domain, command),
            map,
        }
    }

    /// Null values and blank strings count as missing.
    fn require(&self, names: &[&str]) -> Result<(), AssistantError> {
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| self.text(name).is_none())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AssistantError::missing(self.context.clone(), &missing))
        }
    }

    /// Trimmed text of a string, number or boolean value; `None` when absent
    /// or blank.
    fn text(&self, name: &str) -> Option<String> {
        self.text_allow_empty(name).filter(|s| !s.is_empty())
    }

    /// Like `text`, but an explicit empty string is kept as `Some("")`.
    fn text_allow_empty(&self, name: &str) -> Option<String> {
        match self.map.get(name)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Only called after `require`, so the value is present.
    fn required_text(&self, name: &str) -> String {
        self.text(name).unwrap_or_default()
    }

    fn integer(&self, name: &str) -> Result<i64, AssistantError> {
        let value = self.map.get(name);
        let parsed = match value {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        };

        parsed.ok_or_else(|| AssistantError::Validation(format!("{} must be an integer", name)))
    }

    fn date(&self, name: &str) -> Result<String, AssistantError> {
        let value = self.required_text(name);
        NaiveDate::parse_from_str(&value, "%Y-%m-%d")
            .map(|_| value.clone())
            .map_err(|_| AssistantError::Validation(format!("{} '{}' must be a YYYY-MM-DD date", name, value)))
    }

    fn category(&self) -> String {
        self.text("category")
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
    }

    fn expense_key(&self) -> ExpenseKey {
        ExpenseKey::new(self.required_text("date"), self.required_text("category"))
    }

    fn date_range(&self, name: &str) -> Result<Option<(String, String)>, AssistantError> {
        let invalid = || AssistantError::Validation(format!("{} must be a [start, end] pair of dates", name));

        match self.map.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) if items.len() == 2 => match (&items[0], &items[1]) {
                (Value::String(lo), Value::String(hi)) => Ok(Some((lo.trim().to_string(), hi.trim().to_string()))),
                _ => Err(invalid()),
            },
            Some(_) => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Parameters {
        match value {
            Value::Object(map) => map,
            _ => panic!("test parameters must be an object"),
        }
    }

    #[test]
    fn parses_accounting_add() {
        let request = CommandRequest::parse(
            Domain::Accounting,
            "add",
            &params(json!({"date": "2024-01-20", "category": "breakfast", "amount": 50, "note": ""})),
        )
        .unwrap();

        assert_eq!(
            request,
            CommandRequest::Accounting(AccountingCommand::Add(ExpenseRecord {
                date: "2024-01-20".to_string(),
                category: "breakfast".to_string(),
                amount: Some(50),
                note: String::new(),
            }))
        );
    }

    #[test]
    fn reports_every_missing_parameter() {
        let err = CommandRequest::parse(Domain::Accounting, "add", &params(json!({"category": "x"}))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required parameter(s) for accounting add: date, amount"
        );

        let err = CommandRequest::parse(Domain::Calendar, "query", &params(json!({"time_min": ""}))).unwrap_err();
        assert!(matches!(err, AssistantError::MissingParameter { .. }));
        assert!(err.to_string().ends_with("time_min, time_max"));
    }

    #[test]
    fn calendar_delete_requires_an_id() {
        let err = CommandRequest::parse(
            Domain::Calendar,
            "delete",
            &params(json!({"summary": "Gym", "start_time": "2024-01-22", "end_time": "2024-01-23"})),
        )
        .unwrap_err();
        assert!(matches!(err, AssistantError::MissingParameter { .. }));

        let request =
            CommandRequest::parse(Domain::Calendar, "delete", &params(json!({"event_id": "abc"}))).unwrap();
        assert_eq!(
            request,
            CommandRequest::Calendar(CalendarCommand::Delete(EventTarget::Id("abc".to_string())))
        );
    }

    #[test]
    fn rejects_bad_values() {
        let err = CommandRequest::parse(
            Domain::Accounting,
            "add",
            &params(json!({"date": "20/01/2024", "category": "x", "amount": 1})),
        )
        .unwrap_err();
        assert!(matches!(err, AssistantError::Validation(_)));

        let err = CommandRequest::parse(
            Domain::Accounting,
            "update",
            &params(json!({"date": "2024-01-20", "category": "x", "amount": "lots"})),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "amount must be an integer");

        let err = CommandRequest::parse(
            Domain::Accounting,
            "query",
            &params(json!({"date_range": ["2024-01-01"]})),
        )
        .unwrap_err();
        assert!(matches!(err, AssistantError::Validation(_)));
    }

    #[test]
    fn accounting_query_filters_are_optional() {
        let request = CommandRequest::parse(Domain::Accounting, "query", &Parameters::new()).unwrap();
        assert_eq!(
            request,
            CommandRequest::Accounting(AccountingCommand::Query(ExpenseFilter::default()))
        );

        let request = CommandRequest::parse(
            Domain::Accounting,
            "QUERY",
            &params(json!({"date_range": ["2024-01-01", "2024-01-31"], "category": " lunch "})),
        )
        .unwrap();
        assert_eq!(
            request,
            CommandRequest::Accounting(AccountingCommand::Query(ExpenseFilter {
                date_range: Some(("2024-01-01".to_string(), "2024-01-31".to_string())),
                category: Some("lunch".to_string()),
            }))
        );
    }

    #[test]
    fn update_note_distinguishes_absent_from_empty() {
        let keep = CommandRequest::parse(
            Domain::Accounting,
            "update",
            &params(json!({"date": "2024-01-20", "category": "x", "amount": "70"})),
        )
        .unwrap();
        let clear = CommandRequest::parse(
            Domain::Accounting,
            "update",
            &params(json!({"date": "2024-01-20", "category": "x", "amount": 70, "note": ""})),
        )
        .unwrap();

        match (keep, clear) {
            (
                CommandRequest::Accounting(AccountingCommand::Update { changes: keep, .. }),
                CommandRequest::Accounting(AccountingCommand::Update { changes: clear, .. }),
            ) => {
                assert_eq!(keep.note, None);
                assert_eq!(clear.note, Some(String::new()));
                assert_eq!(keep.amount, 70);
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn unknown_commands_and_domains() {
        let err = CommandRequest::parse(Domain::Weather, "delete", &Parameters::new()).unwrap_err();
        assert_eq!(err.to_string(), "Unknown command 'delete' for weather");

        let err = "horoscope".parse::<Domain>().unwrap_err();
        assert!(matches!(err, AssistantError::UnknownDomain(_)));
        assert_eq!(" Calendar ".parse::<Domain>().unwrap(), Domain::Calendar);
    }

    #[test]
    fn event_lookup_needs_title_and_window() {
        let err = CommandRequest::parse_event_lookup(&params(json!({"summary": "Gym"}))).unwrap_err();
        assert!(err.to_string().ends_with("start_time, end_time"));

        let request = CommandRequest::parse_event_lookup(&params(
            json!({"summary": "Gym", "start_time": "2024-01-22", "end_time": "2024-01-23"}),
        ))
        .unwrap();
        assert_eq!(request.domain(), Domain::Calendar);
    }

    #[test]
    fn raw_command_accepts_operation_alias() {
        let raw: RawCommand = serde_json::from_value(json!({
            "operation": "add",
            "parameters": {"date": "2024-01-20"}
        }))
        .unwrap();
        assert_eq!(raw.command.as_deref(), Some("add"));
        assert!(!raw.wants_natural_language());

        let raw: RawCommand = serde_json::from_value(json!({"query": "weather in Tainan tomorrow"})).unwrap();
        assert!(raw.wants_natural_language());
    }
}
