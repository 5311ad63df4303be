use thiserror::Error;

pub type MarkupResult<T> = Result<T, MarkupError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarkupError {
    #[error("Malformed static metadata in '{attribute}': {reason}")]
    MalformedMetadata { attribute: String, reason: String },

    #[error("Static metadata in '{attribute}' must be an object, found {found}")]
    MetadataNotAnObject { attribute: String, found: String },

    #[error("Directive expression rejected: {reason}")]
    DirectiveRejected { reason: String },

    #[error("Directive evaluation failed: {0}")]
    DirectiveEvaluation(String),
}

impl From<serde_json::Error> for MarkupError {
    fn from(err: serde_json::Error) -> Self {
        MarkupError::MalformedMetadata {
            attribute: crate::extract::STATIC_METADATA_ATTR.to_string(),
            reason: err.to_string(),
        }
    }
}
