use crate::error::BackendResult;
use async_trait::async_trait;

/// Execution-side resource a sequence of works runs against.
///
/// Concrete work implementations hold whatever backend handle they need to
/// perform their own call; the orchestration core only relies on the refresh
/// capability declared here.
#[async_trait]
pub trait RefreshableExecutionContext: Send + Sync + 'static {
    /// Flush visibility for everything executed against this context so far.
    ///
    /// Idempotent: calling again after a completed flush is a no-op or a
    /// cheap recomputation. Runs exactly once per sequence, after the last
    /// work, whether or not earlier works failed.
    async fn execute_pending_refreshes(&self) -> BackendResult<()>;
}
