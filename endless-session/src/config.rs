//! Session configuration: YAML file, then environment overrides.
//!
//! ```yaml
//! provider: gemini
//! model: gemini-2.5-flash
//! temperature: 1.0
//! max_steps: 3
//! ```
//!
//! Every field is optional. The API key is never read from the file.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MIN_STEPS: usize = 1;
pub const MAX_STEPS: usize = 8;

pub const ENV_PROVIDER: &str = "ENDLESS_PROVIDER";
pub const ENV_MODEL: &str = "ENDLESS_MODEL";
pub const ENV_MAX_STEPS: &str = "ENDLESS_MAX_STEPS";
pub const ENV_API_KEY: &str = "ENDLESS_API_KEY";
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Registry key of the generation provider.
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound on generation passes for an initial request. Follow-ups get one fewer.
    pub max_steps: usize,
    pub fallback_label: String,
    /// How many history labels are quoted back to the generator.
    pub context_chain_limit: usize,
    pub metadata_max_depth: usize,
    pub metadata_max_keys: usize,
    /// Character cap applied to every section of a prompt.
    pub prompt_section_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            temperature: 1.0,
            max_tokens: 8192,
            max_steps: 3,
            fallback_label: endless_markup::DEFAULT_FALLBACK_LABEL.to_string(),
            context_chain_limit: 8,
            metadata_max_depth: 4,
            metadata_max_keys: 32,
            prompt_section_limit: 4000,
        }
    }
}

impl SessionConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parses YAML. An empty document yields the defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default().normalized());
        }
        let config: SessionConfig = serde_yaml::from_str(yaml)?;
        Ok(config.normalized())
    }

    /// Applies `ENDLESS_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from any key lookup. `apply_env` passes the process environment.
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(provider) = lookup(ENV_PROVIDER).filter(|v| !v.trim().is_empty()) {
            self.provider = provider.trim().to_string();
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            self.model = model.trim().to_string();
        }
        if let Some(steps) = lookup(ENV_MAX_STEPS) {
            self.max_steps = steps.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} must be an integer, got '{}'", ENV_MAX_STEPS, steps))
            })?;
        }
        Ok(self.normalized())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be within 0..=2, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid("max_tokens must be positive".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".to_string()));
        }
        Ok(())
    }

    /// Step cap for follow-up interactions.
    pub fn follow_up_max_steps(&self) -> usize {
        self.max_steps.saturating_sub(1).max(MIN_STEPS)
    }

    fn normalized(mut self) -> Self {
        self.max_steps = self.max_steps.clamp(MIN_STEPS, MAX_STEPS);
        self
    }
}

/// API key from `ENDLESS_API_KEY`, falling back to `GEMINI_API_KEY`.
pub fn credential_from_env() -> Option<String> {
    [ENV_API_KEY, ENV_GEMINI_API_KEY]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}
