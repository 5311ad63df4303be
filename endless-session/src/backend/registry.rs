use super::{GeminiBackend, GenerationBackend, ScriptedBackend};
use crate::error::{CredentialError, SessionError, SessionResult};
use std::collections::BTreeMap;

pub const GEMINI_PROVIDER_KEY: &str = "gemini";
pub const SCRIPTED_PROVIDER_KEY: &str = "scripted";

/// What a provider constructor may need.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
}

type Constructor =
    Box<dyn Fn(&ProviderSettings) -> SessionResult<Box<dyn GenerationBackend>> + Send + Sync>;

/// Maps provider keys to backend constructors.
pub struct ProviderRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with the Gemini REST backend and the offline scripted backend.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(GEMINI_PROVIDER_KEY, |settings| {
            let key = settings
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .ok_or_else(|| CredentialError::Invalid("no API key configured".to_string()))?;
            Ok(Box::new(GeminiBackend::new(key)))
        });
        registry.register(SCRIPTED_PROVIDER_KEY, |_| Ok(Box::new(ScriptedBackend::demo())));
        registry
    }

    /// Adds or replaces the constructor for `key`.
    pub fn register<F>(&mut self, key: impl Into<String>, constructor: F)
    where
        F: Fn(&ProviderSettings) -> SessionResult<Box<dyn GenerationBackend>> + Send + Sync + 'static,
    {
        self.constructors.insert(key.into(), Box::new(constructor));
    }

    pub fn supported_keys(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.constructors.contains_key(key)
    }

    pub fn build(
        &self,
        key: &str,
        settings: &ProviderSettings,
    ) -> SessionResult<Box<dyn GenerationBackend>> {
        let constructor = self
            .constructors
            .get(key)
            .ok_or_else(|| SessionError::UnknownProvider {
                key: key.to_string(),
                supported: self.supported_keys().join(", "),
            })?;
        let backend = constructor(settings)?;
        tracing::debug!(provider = key, "built generation backend");
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_keys() {
        let registry = ProviderRegistry::with_builtin();
        assert_eq!(registry.supported_keys(), vec!["gemini", "scripted"]);
    }

    #[test]
    fn test_build_each_builtin() {
        let registry = ProviderRegistry::with_builtin();
        let settings = ProviderSettings {
            api_key: Some("k".to_string()),
        };
        for key in registry.supported_keys() {
            let backend = registry.build(key, &settings).expect("build provider");
            assert_eq!(backend.provider_key(), key);
        }
    }

    #[test]
    fn test_gemini_requires_key() {
        let registry = ProviderRegistry::with_builtin();
        let err = registry
            .build(GEMINI_PROVIDER_KEY, &ProviderSettings::default())
            .err()
            .expect("missing key rejected");
        assert!(matches!(
            err,
            SessionError::Credential(CredentialError::Invalid(_))
        ));
    }

    #[test]
    fn test_unknown_key_lists_supported() {
        let registry = ProviderRegistry::with_builtin();
        let err = registry
            .build("openai", &ProviderSettings::default())
            .err()
            .expect("unknown key rejected");
        assert_eq!(
            err.to_string(),
            "Unknown provider 'openai' (supported: gemini, scripted)"
        );
    }

    #[test]
    fn test_register_custom_provider() {
        let mut registry = ProviderRegistry::empty();
        registry.register("echo", |_| Ok(Box::new(ScriptedBackend::new())));
        assert!(registry.contains("echo"));
        assert!(registry.build("echo", &ProviderSettings::default()).is_ok());
    }
}
