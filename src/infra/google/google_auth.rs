// =============================================================================
// GOOGLE OAUTH2 CREDENTIALS
// =============================================================================
//
// Two ways to get a bearer token for the Sheets and Calendar APIs:
//
// 1. **Service account**: sign a JWT with the account's private key and
//    exchange it at the token endpoint. Share the spreadsheet and calendar with
//    the service account email.
// 2. **Authorized user**: a `token.json` produced by an installed-app OAuth
//    flow, holding `client_id`, `client_secret` and a `refresh_token`. The
//    refresh token is exchanged for short-lived access tokens.
//
// Either way the access token is cached process-wide and refreshed shortly
// before it expires.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

use crate::config::CredentialSource;
use crate::core::credentials::CredentialProvider;
use crate::core::errors::{RemoteOrigin, RemoteServiceError};

pub const SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/calendar";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

fn credential_error(message: impl Into<String>) -> RemoteServiceError {
    RemoteServiceError::new(RemoteOrigin::Credentials, None, message)
}

// =============================================================================
// TOKEN CACHE
// =============================================================================

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: SystemTime,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at > SystemTime::now() + EXPIRY_MARGIN
    }
}

/// Access token shared by all requests.
///
/// Readers take the fast path while the token is fresh. Refreshes happen
/// under the write lock after a re-check, so concurrent callers that all saw a
/// stale token trigger a single exchange.
#[derive(Default)]
pub struct TokenCache {
    cached: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    fn seeded(token: CachedToken) -> Self {
        Self {
            cached: RwLock::new(Some(token)),
        }
    }

    /// `refresh` returns the new token and its lifetime.
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<String, RemoteServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, Duration), RemoteServiceError>>,
    {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
                return Ok(token.token.clone());
            }
        }

        let mut cached = self.cached.write().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.token.clone());
        }

        let (token, lifetime) = refresh().await?;
        tracing::debug!(lifetime_secs = lifetime.as_secs(), "Refreshed Google access token");

        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at: SystemTime::now() + lifetime,
        });
        Ok(token)
    }
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

async fn exchange_token(
    client: &Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<(String, Duration), RemoteServiceError> {
    let response = client
        .post(token_uri)
        .form(form)
        .send()
        .await
        .map_err(|err| RemoteServiceError::transport(RemoteOrigin::Credentials, err))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(RemoteServiceError::new(
            RemoteOrigin::Credentials,
            Some(status.as_u16()),
            format!("token exchange failed: {}", text),
        ));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|err| RemoteServiceError::transport(RemoteOrigin::Credentials, err))?;

    Ok((token.access_token, Duration::from_secs(token.expires_in)))
}

// =============================================================================
// SERVICE ACCOUNT
// =============================================================================

/// Service account credentials from the JSON key file.
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountCredentials {
    /// The service account email (used as issuer in JWT).
    client_email: String,

    /// The private key in PEM format.
    private_key: String,

    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// JWT claims for Google OAuth2.
#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    /// Max 1 hour from iat.
    exp: u64,
}

pub struct ServiceAccountAuth {
    credentials: ServiceAccountCredentials,
    client: Client,
    cache: TokenCache,
}

impl ServiceAccountAuth {
    pub async fn from_file(path: &Path, client: Client) -> Result<Self, RemoteServiceError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| credential_error(format!("cannot read {}: {}", path.display(), err)))?;
        Self::from_json(&content, client)
    }

    pub fn from_json(json: &str, client: Client) -> Result<Self, RemoteServiceError> {
        let credentials: ServiceAccountCredentials = serde_json::from_str(json)
            .map_err(|err| credential_error(format!("invalid service account key: {}", err)))?;

        Ok(Self {
            credentials,
            client,
            cache: TokenCache::default(),
        })
    }

    fn signed_assertion(&self) -> Result<String, RemoteServiceError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| credential_error(err.to_string()))?
            .as_secs();

        let claims = JwtClaims {
            iss: self.credentials.client_email.clone(),
            scope: SCOPES.to_string(),
            aud: self.credentials.token_uri.clone(),
            iat: now,
            exp: now + 3600,
        };

        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())
            .map_err(|err| credential_error(format!("invalid private key: {}", err)))?;
        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|err| credential_error(format!("cannot sign assertion: {}", err)))
    }

    async fn fetch_new_token(&self) -> Result<(String, Duration), RemoteServiceError> {
        let assertion = self.signed_assertion()?;
        exchange_token(
            &self.client,
            &self.credentials.token_uri,
            &[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &assertion),
            ],
        )
        .await
    }
}

// =============================================================================
// AUTHORIZED USER (token.json)
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
struct AuthorizedUserCredentials {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
    /// Last access token written by whoever produced the file.
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expiry: Option<String>,
}

pub struct AuthorizedUserAuth {
    credentials: AuthorizedUserCredentials,
    client: Client,
    cache: TokenCache,
}

impl AuthorizedUserAuth {
    pub async fn from_file(path: &Path, client: Client) -> Result<Self, RemoteServiceError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| credential_error(format!("cannot read {}: {}", path.display(), err)))?;
        Self::from_json(&content, client)
    }

    pub fn from_json(json: &str, client: Client) -> Result<Self, RemoteServiceError> {
        let credentials: AuthorizedUserCredentials = serde_json::from_str(json)
            .map_err(|err| credential_error(format!("invalid authorized user file: {}", err)))?;

        // Reuse the stored access token while it is still valid.
        let cache = match (&credentials.token, credentials.expiry.as_deref().and_then(parse_expiry)) {
            (Some(token), Some(expires_at)) => TokenCache::seeded(CachedToken {
                token: token.clone(),
                expires_at,
            }),
            _ => TokenCache::default(),
        };

        Ok(Self {
            credentials,
            client,
            cache,
        })
    }

    async fn refresh(&self) -> Result<(String, Duration), RemoteServiceError> {
        exchange_token(
            &self.client,
            &self.credentials.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", &self.credentials.client_id),
                ("client_secret", &self.credentials.client_secret),
                ("refresh_token", &self.credentials.refresh_token),
            ],
        )
        .await
    }
}

/// `expiry` is RFC 3339, or naive UTC as some OAuth libraries write it.
fn parse_expiry(raw: &str) -> Option<SystemTime> {
    let utc = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        })?;

    let secs = u64::try_from(utc.timestamp()).ok()?;
    Some(UNIX_EPOCH + Duration::from_secs(secs))
}

// =============================================================================
// PROVIDER
// =============================================================================

pub enum GoogleAuth {
    ServiceAccount(ServiceAccountAuth),
    AuthorizedUser(AuthorizedUserAuth),
}

impl GoogleAuth {
    pub async fn load(source: &CredentialSource, client: Client) -> Result<Self, RemoteServiceError> {
        let auth = match source {
            CredentialSource::ServiceAccountFile(path) => {
                GoogleAuth::ServiceAccount(ServiceAccountAuth::from_file(path, client).await?)
            }
            CredentialSource::ServiceAccountJson(json) => {
                GoogleAuth::ServiceAccount(ServiceAccountAuth::from_json(json, client)?)
            }
            CredentialSource::AuthorizedUserFile(path) => {
                GoogleAuth::AuthorizedUser(AuthorizedUserAuth::from_file(path, client).await?)
            }
        };
        Ok(auth)
    }
}

#[async_trait]
impl CredentialProvider for GoogleAuth {
    async fn ensure_valid_credentials(&self) -> Result<String, RemoteServiceError> {
        match self {
            GoogleAuth::ServiceAccount(auth) => auth.cache.get_or_refresh(|| auth.fetch_new_token()).await,
            GoogleAuth::AuthorizedUser(auth) => auth.cache.get_or_refresh(|| auth.refresh()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn concurrent_refreshes_collapse_into_one() {
        let cache = Arc::new(TokenCache::default());
        let exchanges = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let exchanges = Arc::clone(&exchanges);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh(|| async move {
                        exchanges.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(("fresh".to_string(), Duration::from_secs(3600)))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "fresh");
        }
        assert_eq!(exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_tokens_are_refreshed() {
        let cache = TokenCache::seeded(CachedToken {
            token: "old".to_string(),
            expires_at: SystemTime::now() + Duration::from_secs(10),
        });

        let token = cache
            .get_or_refresh(|| async { Ok(("new".to_string(), Duration::from_secs(3600))) })
            .await
            .unwrap();
        assert_eq!(token, "new");
    }

    #[tokio::test]
    async fn authorized_user_file_reuses_stored_token() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "client_id": "id.apps.googleusercontent.com",
                "client_secret": "secret",
                "refresh_token": "1//refresh",
                "token": "ya29.stored",
                "expiry": "2999-01-01T00:00:00.000000Z"
            }}"#
        )
        .unwrap();

        let auth = GoogleAuth::load(
            &CredentialSource::AuthorizedUserFile(file.path().to_path_buf()),
            Client::new(),
        )
        .await
        .unwrap();

        // No network: the seeded token is still fresh.
        assert_eq!(auth.ensure_valid_credentials().await.unwrap(), "ya29.stored");
    }

    #[tokio::test]
    async fn unreadable_credentials_are_credential_errors() {
        let err = GoogleAuth::load(
            &CredentialSource::AuthorizedUserFile("/definitely/not/here/token.json".into()),
            Client::new(),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.origin, RemoteOrigin::Credentials);

        let err = ServiceAccountAuth::from_json(r#"{"client_email": "x@y"}"#, Client::new())
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("Credential error: invalid service account key"));
    }

    #[test]
    fn parses_both_expiry_formats() {
        assert!(parse_expiry("2024-01-20T09:00:00Z").is_some());
        assert!(parse_expiry("2024-01-20T09:00:00.123456").is_some());
        assert!(parse_expiry("soon").is_none());
    }
}
