use searchlink_backend::{BackendResult, SearchBackendError, WorkId};
use std::sync::Arc;
use tracing::warn;

/// Per-sequence accumulator of failure and skip events, finalized once every
/// work in the sequence has reached a terminal state.
///
/// Implementations decide disposition: `handle` returning `Ok` absorbs the
/// accumulated failures (the sequence reports success even though individual
/// work futures failed); returning `Err` is a critical failure that fails the
/// whole sequence.
pub trait ErrorCollector: Send + 'static {
    /// A work's own execution (or bulk-entry extraction) failed.
    fn mark_failed(&mut self, work: &WorkId, cause: &Arc<SearchBackendError>);

    /// A work never ran because an earlier work in the same workset failed.
    /// The cause is implicit from the preceding `mark_failed` calls.
    fn mark_skipped(&mut self, work: &WorkId);

    /// A failure not attributable to one work (bulk-level failure, refresh
    /// failure).
    fn record_failure(&mut self, cause: &Arc<SearchBackendError>);

    /// Finalize the sequence's failure disposition.
    fn handle(&mut self) -> BackendResult<()>;
}

/// Default policy: log everything that went wrong and carry on.
///
/// Mirrors the intent of not failing a whole batch of otherwise-independent
/// operations just because some of them failed.
#[derive(Default)]
pub struct LoggingErrorCollector {
    failed: Vec<(WorkId, Arc<SearchBackendError>)>,
    skipped: Vec<WorkId>,
    failures: Vec<Arc<SearchBackendError>>,
}

impl LoggingErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ErrorCollector for LoggingErrorCollector {
    fn mark_failed(&mut self, work: &WorkId, cause: &Arc<SearchBackendError>) {
        self.failed.push((work.clone(), Arc::clone(cause)));
    }

    fn mark_skipped(&mut self, work: &WorkId) {
        self.skipped.push(work.clone());
    }

    fn record_failure(&mut self, cause: &Arc<SearchBackendError>) {
        self.failures.push(Arc::clone(cause));
    }

    fn handle(&mut self) -> BackendResult<()> {
        for (work, cause) in &self.failed {
            warn!(work = %work, error = %cause, "index work failed");
        }
        for work in &self.skipped {
            warn!(work = %work, "index work skipped after an earlier failure");
        }
        for cause in &self.failures {
            warn!(error = %cause, "workset-level failure");
        }
        Ok(())
    }
}

/// Strict policy: any recorded failure aborts the workset.
///
/// Turns the first member failure into a critical sequence failure, for
/// callers that treat a workset as all-or-nothing.
#[derive(Default)]
pub struct FailFastErrorCollector {
    first: Option<String>,
    failed: usize,
    skipped: usize,
}

impl FailFastErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, cause: &Arc<SearchBackendError>) {
        if self.first.is_none() {
            self.first = Some(cause.to_string());
        }
    }
}

impl ErrorCollector for FailFastErrorCollector {
    fn mark_failed(&mut self, _work: &WorkId, cause: &Arc<SearchBackendError>) {
        self.failed += 1;
        self.record(cause);
    }

    fn mark_skipped(&mut self, _work: &WorkId) {
        self.skipped += 1;
    }

    fn record_failure(&mut self, cause: &Arc<SearchBackendError>) {
        self.record(cause);
    }

    fn handle(&mut self) -> BackendResult<()> {
        match &self.first {
            Some(first) => Err(SearchBackendError::aborted(format!(
                "{} works failed, {} skipped; first failure: {}",
                self.failed, self.skipped, first
            ))),
            None => Ok(()),
        }
    }
}
