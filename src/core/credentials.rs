use super::errors::RemoteServiceError;
use async_trait::async_trait;
use std::sync::Arc;

/// Source of bearer tokens for the Google APIs.
///
/// Called before every remote operation. Implementations cache the token
/// process-wide and only hit the token endpoint when it is missing or about to
/// expire, so calling this redundantly from concurrent requests is fine.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn ensure_valid_credentials(&self) -> Result<String, RemoteServiceError>;
}

#[async_trait]
impl<T: CredentialProvider + ?Sized> CredentialProvider for Arc<T> {
    async fn ensure_valid_credentials(&self) -> Result<String, RemoteServiceError> {
        (**self).ensure_valid_credentials().await
    }
}
