use crate::error::WorkFailure;
use futures::channel::oneshot;
use futures::future::{BoxFuture, Shared};
use searchlink_backend::{BackendResult, BulkResult, SearchBackendError};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Completion of a sequence's refresh step, fanned out to every per-work
/// future of that sequence.
pub type RefreshBarrier = Shared<BoxFuture<'static, Result<(), Arc<SearchBackendError>>>>;

/// Result of a bulk execution step, shared between the caller and the
/// bulk-result extraction step. The failure keeps skips distinguishable from
/// the bulk's own failures, so member works can be reported accordingly.
pub type BulkResultFuture = Shared<BoxFuture<'static, Result<Arc<dyn BulkResult>, WorkFailure>>>;

/// Whole-sequence completion. Succeeds unless the error collector's
/// finalization itself fails; driving this future drives the entire sequence.
pub type SequenceFuture = BoxFuture<'static, BackendResult<()>>;

/// Future handed to the submitter of one work.
///
/// Resolves successfully only once both the work's own execution and the
/// sequence's subsequent refresh have completed; failures propagate
/// immediately, without waiting for the refresh.
pub struct WorkFuture<T> {
    inner: BoxFuture<'static, Result<T, WorkFailure>>,
}

impl<T: Send + 'static> WorkFuture<T> {
    pub(crate) fn gated(
        execution: oneshot::Receiver<Result<T, WorkFailure>>,
        refresh: RefreshBarrier,
    ) -> Self {
        let inner = Box::pin(async move {
            match execution.await {
                Ok(Ok(value)) => match refresh.await {
                    Ok(()) => Ok(value),
                    Err(cause) => Err(WorkFailure::Refresh(cause)),
                },
                Ok(Err(failure)) => Err(failure),
                Err(oneshot::Canceled) => Err(WorkFailure::Abandoned),
            }
        });
        Self { inner }
    }
}

impl<T> Future for WorkFuture<T> {
    type Output = Result<T, WorkFailure>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}
