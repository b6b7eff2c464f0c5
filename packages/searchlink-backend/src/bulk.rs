use crate::context::RefreshableExecutionContext;
use crate::error::BackendResult;
use std::sync::Arc;

/// Opaque result of executing a bulk work against a backend.
///
/// The response is only useful once bound to the execution context the bulk
/// ran against; `with_context` yields an extractor giving per-position access
/// to the raw entries. Individual works interpret their own entry through
/// [`crate::work::Work::extract`].
pub trait BulkResult: Send + Sync + 'static {
    fn with_context(
        self: Arc<Self>,
        context: &Arc<dyn RefreshableExecutionContext>,
    ) -> Box<dyn BulkItemExtractor>;
}

/// Per-position access to the raw entries of a bulk response.
pub trait BulkItemExtractor: Send + Sync {
    /// Raw entry for the member at `position`, in bulk submission order.
    ///
    /// Fails when the entry cannot be read at all (missing, truncated or
    /// otherwise malformed); interpreting a readable entry is the member
    /// work's job and may fail separately.
    fn item(&self, position: usize) -> BackendResult<serde_json::Value>;
}
