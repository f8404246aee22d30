// Error types shared by every domain handler.
//
// Everything a handler can fail with ends up as an `AssistantError`. The
// dispatcher renders it as `{ "error": "<message>" }` and the HTTP layer picks
// the status code from `is_caller_error()`.

use std::fmt;
use thiserror::Error;

/// Which remote service a failure came from. The display form is the stable
/// prefix callers use to tell the services apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOrigin {
    Spreadsheet,
    Calendar,
    Weather,
    LanguageModel,
    Credentials,
}

impl fmt::Display for RemoteOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self {
            RemoteOrigin::Spreadsheet => "Google Sheets API error",
            RemoteOrigin::Calendar => "Google Calendar API error",
            RemoteOrigin::Weather => "Weather API error",
            RemoteOrigin::LanguageModel => "Language model error",
            RemoteOrigin::Credentials => "Credential error",
        };
        f.write_str(prefix)
    }
}

/// A failed call against one of the remote services.
///
/// `status` is the HTTP status when the service answered, `None` when the
/// request never got a response (DNS, TLS, timeout, bad payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteServiceError {
    pub origin: RemoteOrigin,
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteServiceError {
    pub fn new(origin: RemoteOrigin, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            origin,
            status,
            message: message.into(),
        }
    }

    /// Failure before any HTTP status was received.
    pub fn transport(origin: RemoteOrigin, err: impl fmt::Display) -> Self {
        Self::new(origin, None, err.to_string())
    }

    /// 404 and 410 both mean the addressed record does not exist (any more).
    pub fn is_not_found(&self) -> bool {
        matches!(self.status, Some(404) | Some(410))
    }
}

impl fmt::Display for RemoteServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.origin, status, self.message),
            None => write!(f, "{}: {}", self.origin, self.message),
        }
    }
}

impl std::error::Error for RemoteServiceError {}

/// Every failure a command can end in.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Missing required parameter(s) for {command}: {missing}")]
    MissingParameter { command: String, missing: String },

    #[error("Unknown command '{command}' for {domain}")]
    UnknownCommand { domain: String, command: String },

    #[error("Unknown domain '{0}'")]
    UnknownDomain(String),

    #[error("Invalid agent_type '{0}'")]
    InvalidAgentType(String),

    /// Carries the action label, e.g. "deletion" or "update".
    #[error("Entry not found for {0}")]
    EntryNotFound(&'static str),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error(transparent)]
    Remote(#[from] RemoteServiceError),

    #[error("Could not understand the request: {0}")]
    Parse(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AssistantError {
    pub fn missing(command: impl Into<String>, names: &[&str]) -> Self {
        AssistantError::MissingParameter {
            command: command.into(),
            missing: names.join(", "),
        }
    }

    /// True for problems with what the caller sent (rendered as 400),
    /// false for remote or server-side failures (rendered as 500).
    pub fn is_caller_error(&self) -> bool {
        match self {
            AssistantError::MissingParameter { .. }
            | AssistantError::UnknownCommand { .. }
            | AssistantError::UnknownDomain(_)
            | AssistantError::InvalidAgentType(_)
            | AssistantError::EntryNotFound(_)
            | AssistantError::EventNotFound(_)
            | AssistantError::Parse(_)
            | AssistantError::Validation(_) => true,
            AssistantError::Remote(_)
            | AssistantError::NotConfigured(_)
            | AssistantError::Unexpected(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_carry_origin_prefix() {
        let err = RemoteServiceError::new(RemoteOrigin::Spreadsheet, Some(403), "forbidden");
        assert_eq!(err.to_string(), "Google Sheets API error (403): forbidden");

        let err = RemoteServiceError::transport(RemoteOrigin::Calendar, "connection reset");
        assert_eq!(err.to_string(), "Google Calendar API error: connection reset");
    }

    #[test]
    fn not_found_statuses() {
        assert!(RemoteServiceError::new(RemoteOrigin::Calendar, Some(404), "").is_not_found());
        assert!(RemoteServiceError::new(RemoteOrigin::Calendar, Some(410), "").is_not_found());
        assert!(!RemoteServiceError::new(RemoteOrigin::Calendar, Some(500), "").is_not_found());
        assert!(!RemoteServiceError::transport(RemoteOrigin::Calendar, "x").is_not_found());
    }

    #[test]
    fn entry_not_found_message_matches_envelope_text() {
        assert_eq!(
            AssistantError::EntryNotFound("deletion").to_string(),
            "Entry not found for deletion"
        );
    }

    #[test]
    fn caller_and_server_errors_are_split() {
        assert!(AssistantError::missing("calendar add", &["start_time", "end_time"]).is_caller_error());
        assert!(AssistantError::Validation("bad".into()).is_caller_error());
        assert!(!AssistantError::Unexpected("boom".into()).is_caller_error());

        let remote: AssistantError =
            RemoteServiceError::new(RemoteOrigin::Weather, Some(502), "bad gateway").into();
        assert!(!remote.is_caller_error());
        assert_eq!(remote.to_string(), "Weather API error (502): bad gateway");
    }

    #[test]
    fn missing_parameter_lists_all_names() {
        let err = AssistantError::missing("accounting add", &["date", "amount"]);
        assert_eq!(
            err.to_string(),
            "Missing required parameter(s) for accounting add: date, amount"
        );
    }
}
