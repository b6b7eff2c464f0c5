use crate::collector::ErrorCollector;
use crate::error::WorkFailure;
use crate::future::{BulkResultFuture, RefreshBarrier, SequenceFuture, WorkFuture};
use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use searchlink_backend::{
    BackendResult, BulkItemExtractor, BulkResult, RefreshableExecutionContext, SearchBackendError,
    Work, WorkId,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome of the sequence chain up to a given step. `Err` carries a failure
/// not attributable to one work (a bulk-level failure), which the
/// finalization step reports to the collector as a workset-level failure.
type TailOutcome = Result<(), Arc<SearchBackendError>>;

type ContextSupplier = dyn Fn() -> Arc<dyn RefreshableExecutionContext> + Send + Sync;
type CollectorSupplier = dyn Fn() -> Box<dyn ErrorCollector> + Send + Sync;

/// Builds work sequences: ordered chains of non-bulk executions, bulk
/// executions and bulk-result extractions, terminated by exactly one refresh.
///
/// The builder itself only holds the suppliers; `init` captures a fresh
/// context and error collector into a per-sequence [`SequenceBuilder`] value,
/// so sequences whose execution windows overlap never share state.
pub struct WorkSequenceBuilder {
    context_supplier: Arc<ContextSupplier>,
    collector_supplier: Arc<CollectorSupplier>,
}

impl WorkSequenceBuilder {
    pub fn new(
        context_supplier: impl Fn() -> Arc<dyn RefreshableExecutionContext> + Send + Sync + 'static,
        collector_supplier: impl Fn() -> Box<dyn ErrorCollector> + Send + Sync + 'static,
    ) -> Self {
        Self {
            context_supplier: Arc::new(context_supplier),
            collector_supplier: Arc::new(collector_supplier),
        }
    }

    /// Start a new sequence gated on `previous`: the first step runs only
    /// once the preceding completion signal has resolved.
    pub fn init(&self, previous: impl Future<Output = ()> + Send + 'static) -> SequenceBuilder {
        let context = (self.context_supplier)();
        let collector = (self.collector_supplier)();
        SequenceBuilder::start(previous, context, collector)
    }
}

/// State of one sequence under construction.
///
/// Steps are appended lazily onto a future chain; nothing executes until the
/// future returned by [`SequenceBuilder::build`] is driven. Every step
/// captures clones of the sequence-local shared state, never anything from
/// the [`WorkSequenceBuilder`] that created it.
pub struct SequenceBuilder {
    shared: Arc<SequenceShared>,
    context: Arc<dyn RefreshableExecutionContext>,
    tail: BoxFuture<'static, TailOutcome>,
    refresh_tx: oneshot::Sender<Result<(), Arc<SearchBackendError>>>,
    refresh_barrier: RefreshBarrier,
}

impl SequenceBuilder {
    fn start(
        previous: impl Future<Output = ()> + Send + 'static,
        context: Arc<dyn RefreshableExecutionContext>,
        collector: Box<dyn ErrorCollector>,
    ) -> Self {
        let shared = Arc::new(SequenceShared::new(collector));
        debug!(sequence = %shared.id, "starting new work sequence");

        let (refresh_tx, refresh_rx) = oneshot::channel();
        let refresh_barrier: RefreshBarrier = async move {
            match refresh_rx.await {
                Ok(outcome) => outcome,
                Err(oneshot::Canceled) => Err(Arc::new(SearchBackendError::refresh(
                    "sequence dropped before refresh",
                ))),
            }
        }
        .boxed()
        .shared();

        let tail: BoxFuture<'static, TailOutcome> = async move {
            previous.await;
            Ok(())
        }
        .boxed();

        Self {
            shared,
            context,
            tail,
            refresh_tx,
            refresh_barrier,
        }
    }

    /// Append a step executing `work` on its own, outside any bulk.
    ///
    /// The returned future resolves with the work's result only after the
    /// sequence's refresh step has also resolved; an execution failure is
    /// recorded against the collector and propagated immediately, and poisons
    /// every later step of the sequence. The chain itself stays healthy so
    /// the refresh still runs.
    pub fn add_non_bulk_execution<W: Work>(&mut self, work: W) -> WorkFuture<W::Output> {
        let shared = Arc::clone(&self.shared);
        let context = Arc::clone(&self.context);
        let (tx, rx) = oneshot::channel();

        let previous = std::mem::replace(&mut self.tail, future::ready(Ok(())).boxed());
        self.tail = async move {
            let upstream = previous.await;
            let poison = match &upstream {
                Err(cause) => Some(Arc::clone(cause)),
                Ok(()) => shared.poison(),
            };
            if let Some(cause) = poison {
                shared.mark_skipped(work.id());
                let _ = tx.send(Err(WorkFailure::Skipped { cause }));
                return upstream;
            }
            match work.execute(&context).await {
                Ok(value) => {
                    let _ = tx.send(Ok(value));
                    Ok(())
                }
                Err(error) => {
                    let cause = Arc::new(error);
                    shared.mark_failed(work.id(), &cause);
                    shared.poison_once(&cause);
                    let _ = tx.send(Err(WorkFailure::Execution(cause)));
                    Ok(())
                }
            }
        }
        .boxed();

        WorkFuture::gated(rx, self.refresh_barrier.clone())
    }

    /// Append a step awaiting a (possibly not-yet-assembled) bulk work, then
    /// executing it.
    ///
    /// A failure of either the descriptor future or the bulk execution fails
    /// the returned bulk-result future with that cause, and fails the chain
    /// tail: the failure is not attributable to one work, so the finalization
    /// step reports it as a workset-level failure. Member works registered
    /// for extraction are failed with the same cause by the extraction step.
    pub fn add_bulk_execution<F, W>(&mut self, bulk_work: F) -> BulkResultFuture
    where
        F: Future<Output = BackendResult<W>> + Send + 'static,
        W: Work<Output = Arc<dyn BulkResult>>,
    {
        let shared = Arc::clone(&self.shared);
        let context = Arc::clone(&self.context);
        let (tx, rx) = oneshot::channel::<Result<Arc<dyn BulkResult>, WorkFailure>>();

        let previous = std::mem::replace(&mut self.tail, future::ready(Ok(())).boxed());
        self.tail = async move {
            let upstream = previous.await;
            let poison = match &upstream {
                Err(cause) => Some(Arc::clone(cause)),
                Ok(()) => shared.poison(),
            };
            if let Some(cause) = poison {
                let _ = tx.send(Err(WorkFailure::Skipped { cause }));
                return upstream;
            }
            let work = match bulk_work.await {
                Ok(work) => work,
                Err(error) => {
                    let cause = Arc::new(error);
                    let _ = tx.send(Err(WorkFailure::Execution(Arc::clone(&cause))));
                    return Err(cause);
                }
            };
            match work.execute(&context).await {
                Ok(result) => {
                    let _ = tx.send(Ok(result));
                    Ok(())
                }
                Err(error) => {
                    let cause = Arc::new(error);
                    let _ = tx.send(Err(WorkFailure::Execution(Arc::clone(&cause))));
                    Err(cause)
                }
            }
        }
        .boxed();

        let result: BoxFuture<'static, Result<Arc<dyn BulkResult>, WorkFailure>> = async move {
            match rx.await {
                Ok(outcome) => outcome,
                Err(oneshot::Canceled) => Err(WorkFailure::Abandoned),
            }
        }
        .boxed();
        result.shared()
    }

    /// Append a step extracting individual member results out of a bulk
    /// result. Members are registered on the returned step; the chain step
    /// completes only once every member reached a terminal state.
    pub fn add_bulk_result_extraction(
        &mut self,
        bulk_result: BulkResultFuture,
    ) -> BulkResultExtractionStep {
        let shared = Arc::clone(&self.shared);
        let context = Arc::clone(&self.context);
        let items: Arc<Mutex<Vec<ExtractionItem>>> = Arc::new(Mutex::new(Vec::new()));
        let step_items = Arc::clone(&items);

        let previous = std::mem::replace(&mut self.tail, future::ready(Ok(())).boxed());
        self.tail = async move {
            let upstream = previous.await;
            let items = std::mem::take(&mut *step_items.lock());
            match bulk_result.await {
                Err(failure) => {
                    // The bulk never produced a result; every member inherits
                    // the same terminal state.
                    for item in items {
                        (item.run)(Err(&failure), &shared);
                    }
                    upstream
                }
                Ok(result) => {
                    let extractor = result.with_context(&context);
                    let mut running = Vec::new();
                    for item in items {
                        if let Some(pending) = (item.run)(Ok(extractor.as_ref()), &shared) {
                            running.push(pending);
                        }
                    }
                    future::join_all(running).await;
                    upstream
                }
            }
        }
        .boxed();

        BulkResultExtractionStep {
            items,
            refresh_barrier: self.refresh_barrier.clone(),
        }
    }

    /// Seal the sequence: append the unconditional refresh step and the error
    /// collector's finalization.
    ///
    /// The returned future drives the whole chain and must be awaited or
    /// spawned. It succeeds even when individual works failed, as long as the
    /// collector's finalization absorbs them; a finalization error is the
    /// only failure it carries.
    pub fn build(self) -> SequenceFuture {
        let SequenceBuilder {
            shared,
            context,
            tail,
            refresh_tx,
            refresh_barrier: _,
        } = self;

        async move {
            let outcome = tail.await;

            debug!(sequence = %shared.id, "executing pending refreshes");
            let refresh_outcome = context
                .execute_pending_refreshes()
                .await
                .map_err(Arc::new);
            let _ = refresh_tx.send(refresh_outcome.clone());

            if let Err(cause) = &outcome {
                shared.record_failure(cause);
            }
            if let Err(cause) = &refresh_outcome {
                shared.record_failure(cause);
            }

            shared.finalize()
        }
        .boxed()
    }
}

/// Registers member works of one bulk, by position, for result extraction.
pub struct BulkResultExtractionStep {
    items: Arc<Mutex<Vec<ExtractionItem>>>,
    refresh_barrier: RefreshBarrier,
}

impl BulkResultExtractionStep {
    /// Register `work` as the bulk member at `position`.
    ///
    /// Each member is extracted independently: a failure to interpret one
    /// entry (synchronous or through its entry future) fails only that
    /// member, but poisons the steps declared after this extraction step.
    pub fn add<W: Work>(&mut self, work: W, position: usize) -> WorkFuture<W::Output> {
        let (tx, rx) = oneshot::channel();

        let run: ItemRun = Box::new(move |input, shared| {
            let id = work.id().clone();
            match input {
                Err(failure) => {
                    match failure {
                        WorkFailure::Skipped { .. } => shared.mark_skipped(&id),
                        WorkFailure::Execution(cause) | WorkFailure::Refresh(cause) => {
                            shared.mark_failed(&id, cause)
                        }
                        WorkFailure::Abandoned => {}
                    }
                    let _ = tx.send(Err(failure.clone()));
                    None
                }
                Ok(extractor) => match work.extract(extractor, position) {
                    Err(error) => {
                        let cause = Arc::new(error);
                        shared.mark_failed(&id, &cause);
                        shared.poison_once(&cause);
                        let _ = tx.send(Err(WorkFailure::Execution(cause)));
                        None
                    }
                    Ok(entry) => {
                        let shared = Arc::clone(shared);
                        Some(
                            async move {
                                match entry.await {
                                    Ok(value) => {
                                        let _ = tx.send(Ok(value));
                                    }
                                    Err(error) => {
                                        let cause = Arc::new(error);
                                        shared.mark_failed(&id, &cause);
                                        shared.poison_once(&cause);
                                        let _ = tx.send(Err(WorkFailure::Execution(cause)));
                                    }
                                }
                            }
                            .boxed(),
                        )
                    }
                },
            }
        });

        self.items.lock().push(ExtractionItem { run });
        WorkFuture::gated(rx, self.refresh_barrier.clone())
    }
}

type ItemRun = Box<
    dyn FnOnce(
            Result<&dyn BulkItemExtractor, &WorkFailure>,
            &Arc<SequenceShared>,
        ) -> Option<BoxFuture<'static, ()>>
        + Send,
>;

struct ExtractionItem {
    run: ItemRun,
}

/// Sequence-local bookkeeping shared by all steps of one sequence.
struct SequenceShared {
    id: Uuid,
    collector: Mutex<Box<dyn ErrorCollector>>,
    recorded: AtomicBool,
    poison: Mutex<Option<Arc<SearchBackendError>>>,
}

impl SequenceShared {
    fn new(collector: Box<dyn ErrorCollector>) -> Self {
        Self {
            id: Uuid::new_v4(),
            collector: Mutex::new(collector),
            recorded: AtomicBool::new(false),
            poison: Mutex::new(None),
        }
    }

    fn mark_failed(&self, work: &WorkId, cause: &Arc<SearchBackendError>) {
        warn!(sequence = %self.id, work = %work, error = %cause, "work failed");
        self.recorded.store(true, Ordering::Relaxed);
        self.collector.lock().mark_failed(work, cause);
    }

    fn mark_skipped(&self, work: &WorkId) {
        debug!(sequence = %self.id, work = %work, "work skipped after earlier failure");
        self.recorded.store(true, Ordering::Relaxed);
        self.collector.lock().mark_skipped(work);
    }

    fn record_failure(&self, cause: &Arc<SearchBackendError>) {
        warn!(sequence = %self.id, error = %cause, "workset-level failure");
        self.recorded.store(true, Ordering::Relaxed);
        self.collector.lock().record_failure(cause);
    }

    /// First failure wins: downstream skips all wrap the original root cause,
    /// never an intermediate skip.
    fn poison_once(&self, cause: &Arc<SearchBackendError>) {
        let mut poison = self.poison.lock();
        if poison.is_none() {
            *poison = Some(Arc::clone(cause));
        }
    }

    fn poison(&self) -> Option<Arc<SearchBackendError>> {
        self.poison.lock().clone()
    }

    fn finalize(&self) -> BackendResult<()> {
        if !self.recorded.load(Ordering::Relaxed) {
            return Ok(());
        }
        debug!(sequence = %self.id, "finalizing error collector");
        self.collector.lock().handle()
    }
}
