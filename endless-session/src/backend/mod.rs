//! Generation collaborators.
//!
//! Every provider implements [`GenerationBackend`]; [`ProviderRegistry`] builds one from a
//! provider key.

pub mod gemini;
pub mod registry;
pub mod scripted;

use crate::config::SessionConfig;
use crate::error::{BackendError, CredentialError};
use crate::prompt;
use async_trait::async_trait;
use endless_markup::truncate_chars;

pub use gemini::GeminiBackend;
pub use registry::{ProviderRegistry, ProviderSettings, GEMINI_PROVIDER_KEY, SCRIPTED_PROVIDER_KEY};
pub use scripted::ScriptedBackend;

/// Longest theme or experience kind kept from a backend suggestion.
const MAX_SUGGESTION_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&SessionConfig> for GenerationOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Registry key this backend was built under.
    fn provider_key(&self) -> &str;

    async fn validate_credential(&self) -> Result<(), CredentialError>;

    async fn generate_content(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError>;

    /// A short free-form theme for a new session.
    async fn generate_theme(&self, options: &GenerationOptions) -> Result<String, BackendError> {
        let raw = self.generate_content(prompt::THEME_PROMPT, options).await?;
        clean_suggestion(&raw)
    }

    /// A short free-form description of the experience format.
    async fn generate_experience_kind(
        &self,
        options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        let raw = self
            .generate_content(prompt::EXPERIENCE_KIND_PROMPT, options)
            .await?;
        clean_suggestion(&raw)
    }
}

/// First non-empty line of a suggestion with quotes and markdown emphasis removed.
pub fn clean_suggestion(raw: &str) -> Result<String, BackendError> {
    let line = raw
        .lines()
        .map(|l| l.trim().trim_matches(|c: char| matches!(c, '"' | '\'' | '*' | '`' | '#')).trim())
        .find(|l| !l.is_empty())
        .ok_or(BackendError::EmptyResponse)?;
    Ok(truncate_chars(line, MAX_SUGGESTION_CHARS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_suggestion() {
        assert_eq!(
            clean_suggestion("\n  \"**Clockwork Jungle**\"\n").unwrap(),
            "Clockwork Jungle"
        );
        assert_eq!(clean_suggestion("  \n"), Err(BackendError::EmptyResponse));
    }
}
