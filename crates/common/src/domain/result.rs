use std::time::Duration;
use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Malformed topic '{0}': expected '<namespace>/<vehicle_id>/<subject>'")]
    MalformedTopic(String),

    #[error("Malformed status payload: {0}")]
    MalformedPayload(String),

    #[error("Broadcast hub unavailable: {0}")]
    HubUnavailable(String),

    #[error("Inference failed: {0}")]
    InferenceError(String),

    #[error("Inference timed out after {0:?}")]
    InferenceTimeout(Duration),

    #[error("Artifact upload failed: {0}")]
    UploadError(String),

    #[error("Dead-letter append failed: {0}")]
    DeadLetterError(String),

    #[error("Command publish failed: {0}")]
    CommandPublishError(String),

    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

impl DomainError {
    /// True for failures caused by the shape of inbound data rather than by a collaborator.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            DomainError::MalformedTopic(_) | DomainError::MalformedPayload(_)
        )
    }
}
