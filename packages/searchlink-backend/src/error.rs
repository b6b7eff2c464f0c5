use crate::work::WorkId;
use thiserror::Error;

pub type BackendResult<T> = std::result::Result<T, SearchBackendError>;

/// Failure taxonomy shared by all backends and the orchestration core.
#[derive(Debug, Error)]
pub enum SearchBackendError {
    #[error("backend request failed: {0}")]
    Request(String),

    #[error("bulk entry at position {position} could not be interpreted: {detail}")]
    MalformedBulkEntry { position: usize, detail: String },

    #[error("work {0} cannot participate in a bulk request")]
    NotBulkable(WorkId),

    #[error("index refresh failed: {0}")]
    Refresh(String),

    #[error("workset aborted by error policy: {0}")]
    Aborted(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SearchBackendError {
    pub fn request<E: std::fmt::Display>(e: E) -> Self {
        Self::Request(e.to_string())
    }

    pub fn refresh<E: std::fmt::Display>(e: E) -> Self {
        Self::Refresh(e.to_string())
    }

    pub fn aborted<E: std::fmt::Display>(e: E) -> Self {
        Self::Aborted(e.to_string())
    }
}
