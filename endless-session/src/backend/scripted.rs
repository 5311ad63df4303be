//! In-process backend that replays queued responses. Used by tests and offline runs.

use super::{GenerationBackend, GenerationOptions, SCRIPTED_PROVIDER_KEY};
use crate::error::{BackendError, CredentialError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Replays queued responses in order and records every prompt it receives.
///
/// Clones share one script, so a test can keep a handle after moving the backend into a
/// session. With an empty queue it fails with [`BackendError::EmptyResponse`], unless built
/// with [`ScriptedBackend::demo`], which invents a small scene instead.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    inner: Arc<Mutex<Script>>,
}

#[derive(Debug, Default)]
struct Script {
    responses: VecDeque<Result<String, BackendError>>,
    prompts: Vec<String>,
    credential: Option<CredentialError>,
    theme: Option<String>,
    experience_kind: Option<String>,
    demo: bool,
    scenes: usize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offline backend that never runs dry.
    pub fn demo() -> Self {
        let backend = Self::new()
            .with_theme("Lantern-lit Undercity")
            .with_experience_kind("branching exploration story");
        backend.script().demo = true;
        backend
    }

    pub fn with_response(self, content: impl Into<String>) -> Self {
        self.push_response(content);
        self
    }

    pub fn with_failure(self, error: BackendError) -> Self {
        self.push_failure(error);
        self
    }

    pub fn with_credential_error(self, error: CredentialError) -> Self {
        self.script().credential = Some(error);
        self
    }

    pub fn with_theme(self, theme: impl Into<String>) -> Self {
        self.script().theme = Some(theme.into());
        self
    }

    pub fn with_experience_kind(self, kind: impl Into<String>) -> Self {
        self.script().experience_kind = Some(kind.into());
        self
    }

    pub fn push_response(&self, content: impl Into<String>) {
        self.script().responses.push_back(Ok(content.into()));
    }

    pub fn push_failure(&self, error: BackendError) {
        self.script().responses.push_back(Err(error));
    }

    /// Every content prompt received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.script().prompts.clone()
    }

    pub fn remaining(&self) -> usize {
        self.script().responses.len()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn provider_key(&self) -> &str {
        SCRIPTED_PROVIDER_KEY
    }

    async fn validate_credential(&self) -> Result<(), CredentialError> {
        match self.script().credential.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn generate_content(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        let mut script = self.script();
        script.prompts.push(prompt.to_string());
        match script.responses.pop_front() {
            Some(response) => response,
            None if script.demo => {
                script.scenes += 1;
                Ok(demo_scene(script.scenes))
            }
            None => Err(BackendError::EmptyResponse),
        }
    }

    async fn generate_theme(&self, options: &GenerationOptions) -> Result<String, BackendError> {
        let theme = self.script().theme.clone();
        match theme {
            Some(theme) => Ok(theme),
            None => super::clean_suggestion(&self.generate_content(crate::prompt::THEME_PROMPT, options).await?),
        }
    }

    async fn generate_experience_kind(
        &self,
        options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        let kind = self.script().experience_kind.clone();
        match kind {
            Some(kind) => Ok(kind),
            None => super::clean_suggestion(
                &self
                    .generate_content(crate::prompt::EXPERIENCE_KIND_PROMPT, options)
                    .await?,
            ),
        }
    }
}

fn demo_scene(n: usize) -> String {
    format!(
        r##"<section data-metadata='{{"scene": {n}}}'>
  <h2>Chamber {n}</h2>
  <p>Lanterns sway over a crossroads of dripping tunnels. Something hums below.</p>
  <button onclick="alert('You rolled ' + (Math.floor(Math.random()*6)+1))">Roll for luck</button>
  <a href="#left" data-direction="left">Take the left tunnel</a>
  <a href="#right" data-direction="right">Take the right tunnel</a>
</section>"##
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> GenerationOptions {
        GenerationOptions {
            model: "m".to_string(),
            temperature: 1.0,
            max_tokens: 10,
        }
    }

    #[tokio::test]
    async fn test_replays_in_order_and_records_prompts() {
        let backend = ScriptedBackend::new()
            .with_response("one")
            .with_failure(BackendError::Transport("down".to_string()));
        let handle = backend.clone();

        assert_eq!(backend.generate_content("p1", &options()).await.unwrap(), "one");
        assert_eq!(
            backend.generate_content("p2", &options()).await,
            Err(BackendError::Transport("down".to_string()))
        );
        assert_eq!(
            backend.generate_content("p3", &options()).await,
            Err(BackendError::EmptyResponse)
        );
        assert_eq!(handle.prompts(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_demo_never_runs_dry() {
        let backend = ScriptedBackend::demo();
        let first = backend.generate_content("a", &options()).await.unwrap();
        let second = backend.generate_content("b", &options()).await.unwrap();
        assert!(first.contains("Chamber 1"));
        assert!(second.contains("Chamber 2"));
        assert_eq!(
            backend.generate_theme(&options()).await.unwrap(),
            "Lantern-lit Undercity"
        );
    }

    #[test]
    fn test_demo_scene_is_interactive_after_sanitizing() {
        let safe = endless_markup::sanitize(&demo_scene(3));
        let kinds: Vec<_> = safe
            .interactive_elements()
            .into_iter()
            .map(|i| (i.kind.as_str(), i.label))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("button", "Roll for luck".to_string()),
                ("link", "Take the left tunnel".to_string()),
                ("link", "Take the right tunnel".to_string()),
            ]
        );
        assert!(safe.interactive_elements()[0].directive.is_some());
        assert_eq!(endless_markup::extract_metadata(&safe).get("scene"), Some(&serde_json::json!(3)));
    }

    #[tokio::test]
    async fn test_credential_error() {
        let backend = ScriptedBackend::new().with_credential_error(CredentialError::RateLimited);
        assert_eq!(
            backend.validate_credential().await,
            Err(CredentialError::RateLimited)
        );
    }
}
