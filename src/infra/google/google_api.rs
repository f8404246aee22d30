// Request plumbing shared by the Sheets and Calendar clients.

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::core::errors::{RemoteOrigin, RemoteServiceError};

/// Google's JSON error envelope: `{"error": {"code": 404, "message": ".."}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// The API's own error message when the body has one, otherwise the raw body.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) if body.trim().is_empty() => "empty error response".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

async fn checked(origin: RemoteOrigin, request: RequestBuilder) -> Result<Response, RemoteServiceError> {
    let response = request
        .send()
        .await
        .map_err(|err| RemoteServiceError::transport(origin, err))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let err = RemoteServiceError::new(origin, Some(status.as_u16()), error_message(&body));
    if err.is_not_found() {
        tracing::debug!(error = %err, "Remote record not found");
    } else {
        tracing::error!(error = %err, "Remote call failed");
    }
    Err(err)
}

pub async fn send_json<T: DeserializeOwned>(
    origin: RemoteOrigin,
    request: RequestBuilder,
) -> Result<T, RemoteServiceError> {
    checked(origin, request)
        .await?
        .json::<T>()
        .await
        .map_err(|err| RemoteServiceError::transport(origin, format!("unexpected response body: {}", err)))
}

/// For calls whose success body is empty or irrelevant.
pub async fn send_discarding_body(origin: RemoteOrigin, request: RequestBuilder) -> Result<(), RemoteServiceError> {
    checked(origin, request).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_google_error_messages() {
        let body = r#"{"error": {"code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND"}}"#;
        assert_eq!(error_message(body), "Requested entity was not found.");
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");
        assert_eq!(error_message(""), "empty error response");
    }
}
