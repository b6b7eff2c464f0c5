use searchlink_backend::SearchBackendError;
use std::sync::Arc;
use thiserror::Error;

/// Caller-visible outcome of a single work inside a sequence.
///
/// Causes are shared behind `Arc` because one root failure fans out to many
/// futures: every member of a failed bulk, and every skip downstream of the
/// first failure, reports the same underlying error.
#[derive(Debug, Clone, Error)]
pub enum WorkFailure {
    /// The work's own execution (or bulk-entry extraction) failed.
    #[error("work execution failed: {0}")]
    Execution(Arc<SearchBackendError>),

    /// The work never ran because an earlier work in the same workset failed.
    #[error("operation was skipped due to the failure of a previous work in the same workset")]
    Skipped { cause: Arc<SearchBackendError> },

    /// The work executed but the sequence's refresh failed, so its result was
    /// never made visible.
    #[error("index refresh failed after execution: {0}")]
    Refresh(Arc<SearchBackendError>),

    /// The sequence was dropped before this work reached a terminal state.
    #[error("work sequence was dropped before completion")]
    Abandoned,
}

impl WorkFailure {
    /// The underlying backend error, when there is one.
    pub fn cause(&self) -> Option<&SearchBackendError> {
        match self {
            WorkFailure::Execution(cause)
            | WorkFailure::Skipped { cause }
            | WorkFailure::Refresh(cause) => Some(cause),
            WorkFailure::Abandoned => None,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, WorkFailure::Skipped { .. })
    }
}
