use endless_markup::MarkupError;
use std::path::PathBuf;
use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

/// The credential was rejected or could not be checked. Nothing is generated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Credential rejected: {0}")]
    Invalid(String),

    #[error("Credential check was rate limited")]
    RateLimited,

    #[error("Credential check failed: {0}")]
    Transport(String),
}

/// A generation call did not produce usable content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Backend request failed: {0}")]
    Transport(String),

    #[error("Backend returned no content")]
    EmptyResponse,

    #[error("Backend response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Markup(#[from] MarkupError),

    #[error("A generation request is already in flight")]
    Busy,

    #[error("Session has not started")]
    NotStarted,

    #[error("Nothing to retry")]
    NothingToRetry,

    #[error("No interactive element at index {0}")]
    NoSuchElement(usize),

    #[error("Unknown provider '{key}' (supported: {supported})")]
    UnknownProvider { key: String, supported: String },

    #[error("Invalid session transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },
}

impl SessionError {
    /// Whether the failed request can be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Backend(_))
    }
}
