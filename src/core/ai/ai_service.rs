use super::models::{AiConfig, AiMessage};
use async_trait::async_trait;
use std::error::Error;

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Sends a chat completion request and returns the assistant's text.
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        config: &AiConfig,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;
}

// Blanket implementation for Box<dyn AiProvider>
// This lets the assistant hold whichever provider main.rs wires in.
#[async_trait]
impl AiProvider for Box<dyn AiProvider> {
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        config: &AiConfig,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        (**self).chat_complete(messages, config).await
    }
}

pub struct AiService<P: AiProvider> {
    provider: P,
    config: AiConfig,
}

impl<P: AiProvider> AiService<P> {
    pub fn new(provider: P, config: AiConfig) -> Self {
        Self { provider, config }
    }

    /// One-shot completion: a fixed instruction plus the user's text.
    pub async fn complete(
        &self,
        instruction: &str,
        input: &str,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        let messages = vec![AiMessage::system(instruction), AiMessage::user(input)];
        let content = self.provider.chat_complete(&messages, &self.config).await?;
        Ok(content.trim().to_string())
    }
}

/// Models like to wrap JSON in Markdown fences even when told not to.
/// Returns the fenced body when there is one, otherwise the trimmed input.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Skip the optional language tag on the opening fence line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };

    body.strip_suffix("```").unwrap_or(body).trim()
}
