use crate::core::models::VideoId;
use thiserror::Error;

/// Failure of a single call to a remote collaborator.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Network failure: {0}")]
    Network(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        ClientError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}

/// Hard failure of a whole grouping operation.
///
/// Per-member failures never surface here; they are counted in the outcome.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("Tag service request failed: {0}")]
    TagService(#[from] ClientError),

    #[error("Similarity search failed for video {video_id}: {source}")]
    Similarity {
        video_id: VideoId,
        #[source]
        source: ClientError,
    },
}

pub type GroupResult<T> = Result<T, GroupError>;
