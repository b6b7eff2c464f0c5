use crate::bulk::BulkItemExtractor;
use crate::context::RefreshableExecutionContext;
use crate::error::{BackendResult, SearchBackendError};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identity of a work within its sequence, used for diagnostics and
/// error-collector bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkId(String);

impl WorkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A single requested index mutation (or query-like operation), executable
/// against an execution context.
///
/// The bulk capability is a flag plus an overridable extraction method, not a
/// subtype: works that can join a backend bulk request report
/// `bulkable() == true` and override [`Work::extract`] to interpret their own
/// entry of a bulk response. Everything else keeps the defaults.
pub trait Work: Send + Sync + 'static {
    /// Result produced by a successful execution. Works in the same sequence
    /// may produce different result types.
    type Output: Send + 'static;

    fn id(&self) -> &WorkId;

    /// Perform the actual backend call. Backend-specific failures are
    /// translated into [`SearchBackendError`] by the implementation.
    fn execute(
        &self,
        context: &Arc<dyn RefreshableExecutionContext>,
    ) -> BoxFuture<'static, BackendResult<Self::Output>>;

    /// Whether this work may be grouped with its neighbors into one bulk
    /// request. Carries no extra behavior when the work runs standalone.
    fn bulkable(&self) -> bool {
        false
    }

    /// Interpret this work's entry of a bulk response. Only invoked for works
    /// reporting `bulkable() == true` that were routed through a bulk.
    ///
    /// The synchronous `Err` arm signals an entry that cannot be interpreted
    /// at all (e.g. a malformed partial response); the returned future may
    /// still fail later for entry-level failures detected asynchronously.
    fn extract(
        &self,
        extractor: &dyn BulkItemExtractor,
        position: usize,
    ) -> BackendResult<BoxFuture<'static, BackendResult<Self::Output>>> {
        let _ = (extractor, position);
        Err(SearchBackendError::NotBulkable(self.id().clone()))
    }
}

impl<W: Work + ?Sized> Work for Arc<W> {
    type Output = W::Output;

    fn id(&self) -> &WorkId {
        (**self).id()
    }

    fn execute(
        &self,
        context: &Arc<dyn RefreshableExecutionContext>,
    ) -> BoxFuture<'static, BackendResult<Self::Output>> {
        (**self).execute(context)
    }

    fn bulkable(&self) -> bool {
        (**self).bulkable()
    }

    fn extract(
        &self,
        extractor: &dyn BulkItemExtractor,
        position: usize,
    ) -> BackendResult<BoxFuture<'static, BackendResult<Self::Output>>> {
        (**self).extract(extractor, position)
    }
}

impl<W: Work + ?Sized> Work for Box<W> {
    type Output = W::Output;

    fn id(&self) -> &WorkId {
        (**self).id()
    }

    fn execute(
        &self,
        context: &Arc<dyn RefreshableExecutionContext>,
    ) -> BoxFuture<'static, BackendResult<Self::Output>> {
        (**self).execute(context)
    }

    fn bulkable(&self) -> bool {
        (**self).bulkable()
    }

    fn extract(
        &self,
        extractor: &dyn BulkItemExtractor,
        position: usize,
    ) -> BackendResult<BoxFuture<'static, BackendResult<Self::Output>>> {
        (**self).extract(extractor, position)
    }
}
