#![allow(dead_code)]

use async_trait::async_trait;
use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use searchlink_backend::{
    BackendResult, BulkItemExtractor, BulkResult, RefreshableExecutionContext, SearchBackendError,
    Work, WorkId,
};
use searchlink_orchestration::{ErasedWork, ErrorCollector, WorkSequenceBuilder};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Opt-in test logging: `RUST_LOG=searchlink_orchestration=debug cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Yields enough times for everything currently runnable to make progress.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// Stub works
// ---------------------------------------------------------------------------

enum ExtractBehavior {
    /// Resolve with the raw bulk entry at the work's position.
    FromEntry,
    /// Refuse to interpret the entry at all.
    FailSync(SearchBackendError),
    /// Hand back an entry future the test completes later.
    Deferred(oneshot::Receiver<BackendResult<Value>>),
}

pub struct StubWork {
    id: WorkId,
    bulkable: bool,
    executed: AtomicBool,
    execution: Mutex<Option<BoxFuture<'static, BackendResult<Value>>>>,
    extraction: Mutex<Option<ExtractBehavior>>,
}

impl StubWork {
    fn build(
        id: &str,
        bulkable: bool,
        execution: BoxFuture<'static, BackendResult<Value>>,
        extraction: Option<ExtractBehavior>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: WorkId::from(id),
            bulkable,
            executed: AtomicBool::new(false),
            execution: Mutex::new(Some(execution)),
            extraction: Mutex::new(extraction),
        })
    }

    /// Non-bulkable work whose execution succeeds immediately.
    pub fn immediate(id: &str, value: Value) -> Arc<Self> {
        Self::build(id, false, future::ready(Ok(value)).boxed(), None)
    }

    /// Non-bulkable work whose execution fails immediately.
    pub fn failing(id: &str, message: &str) -> Arc<Self> {
        let error = SearchBackendError::request(message);
        Self::build(id, false, future::ready(Err(error)).boxed(), None)
    }

    /// Non-bulkable work whose execution completes when the test says so.
    pub fn deferred(id: &str) -> (Arc<Self>, WorkCompleter) {
        let (tx, rx) = oneshot::channel();
        let execution = async move {
            match rx.await {
                Ok(outcome) => outcome,
                Err(oneshot::Canceled) => Err(SearchBackendError::request("completer dropped")),
            }
        }
        .boxed();
        (Self::build(id, false, execution, None), WorkCompleter { tx })
    }

    /// Bulkable work resolving with its raw bulk entry; when executed
    /// standalone it succeeds with its own id.
    pub fn bulkable(id: &str) -> Arc<Self> {
        Self::build(
            id,
            true,
            future::ready(Ok(json!(id))).boxed(),
            Some(ExtractBehavior::FromEntry),
        )
    }

    /// Bulkable work whose entry interpretation fails synchronously.
    pub fn bulkable_extract_failing(id: &str, message: &str) -> Arc<Self> {
        Self::build(
            id,
            true,
            future::ready(Ok(json!(id))).boxed(),
            Some(ExtractBehavior::FailSync(SearchBackendError::request(
                message,
            ))),
        )
    }

    /// Bulkable work whose entry future completes when the test says so.
    pub fn bulkable_extract_deferred(id: &str) -> (Arc<Self>, WorkCompleter) {
        let (tx, rx) = oneshot::channel();
        let work = Self::build(
            id,
            true,
            future::ready(Ok(json!(id))).boxed(),
            Some(ExtractBehavior::Deferred(rx)),
        );
        (work, WorkCompleter { tx })
    }

    pub fn was_executed(&self) -> bool {
        self.executed.load(Ordering::SeqCst)
    }
}

impl Work for StubWork {
    type Output = Value;

    fn id(&self) -> &WorkId {
        &self.id
    }

    fn execute(
        &self,
        _context: &Arc<dyn RefreshableExecutionContext>,
    ) -> BoxFuture<'static, BackendResult<Value>> {
        self.executed.store(true, Ordering::SeqCst);
        match self.execution.lock().take() {
            Some(execution) => execution,
            None => future::ready(Err(SearchBackendError::request("stub executed twice"))).boxed(),
        }
    }

    fn bulkable(&self) -> bool {
        self.bulkable
    }

    fn extract(
        &self,
        extractor: &dyn BulkItemExtractor,
        position: usize,
    ) -> BackendResult<BoxFuture<'static, BackendResult<Value>>> {
        match self.extraction.lock().take() {
            Some(ExtractBehavior::FromEntry) => {
                let entry = extractor.item(position)?;
                Ok(future::ready(Ok(entry)).boxed())
            }
            Some(ExtractBehavior::FailSync(error)) => Err(error),
            Some(ExtractBehavior::Deferred(rx)) => Ok(async move {
                match rx.await {
                    Ok(outcome) => outcome,
                    Err(oneshot::Canceled) => {
                        Err(SearchBackendError::request("entry completer dropped"))
                    }
                }
            }
            .boxed()),
            None => Err(SearchBackendError::NotBulkable(self.id.clone())),
        }
    }
}

pub struct WorkCompleter {
    tx: oneshot::Sender<BackendResult<Value>>,
}

impl WorkCompleter {
    pub fn succeed(self, value: Value) {
        let _ = self.tx.send(Ok(value));
    }

    pub fn fail(self, message: &str) {
        let _ = self.tx.send(Err(SearchBackendError::request(message)));
    }
}

// ---------------------------------------------------------------------------
// Stub bulk work and bulk result
// ---------------------------------------------------------------------------

pub struct StubBulkResult {
    entries: Vec<Result<Value, String>>,
}

impl StubBulkResult {
    pub fn new(entries: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            entries: entries.into_iter().map(Ok).collect(),
        })
    }

    /// Entries where `Err(detail)` marks a malformed position.
    pub fn with_malformed(entries: Vec<Result<Value, String>>) -> Arc<Self> {
        Arc::new(Self { entries })
    }
}

impl BulkResult for StubBulkResult {
    fn with_context(
        self: Arc<Self>,
        _context: &Arc<dyn RefreshableExecutionContext>,
    ) -> Box<dyn BulkItemExtractor> {
        Box::new(StubExtractor { result: self })
    }
}

struct StubExtractor {
    result: Arc<StubBulkResult>,
}

impl BulkItemExtractor for StubExtractor {
    fn item(&self, position: usize) -> BackendResult<Value> {
        match self.result.entries.get(position) {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(detail)) => Err(SearchBackendError::MalformedBulkEntry {
                position,
                detail: detail.clone(),
            }),
            None => Err(SearchBackendError::MalformedBulkEntry {
                position,
                detail: "missing entry".to_string(),
            }),
        }
    }
}

pub struct StubBulkWork {
    id: WorkId,
    execution: Mutex<Option<BoxFuture<'static, BackendResult<Arc<dyn BulkResult>>>>>,
}

impl StubBulkWork {
    pub fn immediate(id: &str, result: Arc<StubBulkResult>) -> Self {
        Self {
            id: WorkId::from(id),
            execution: Mutex::new(Some(
                future::ready(Ok(result as Arc<dyn BulkResult>)).boxed(),
            )),
        }
    }

    pub fn deferred(id: &str) -> (Self, BulkCompleter) {
        let (tx, rx) = oneshot::channel();
        let execution = async move {
            match rx.await {
                Ok(outcome) => outcome,
                Err(oneshot::Canceled) => Err(SearchBackendError::request("completer dropped")),
            }
        }
        .boxed();
        (
            Self {
                id: WorkId::from(id),
                execution: Mutex::new(Some(execution)),
            },
            BulkCompleter { tx },
        )
    }
}

impl Work for StubBulkWork {
    type Output = Arc<dyn BulkResult>;

    fn id(&self) -> &WorkId {
        &self.id
    }

    fn execute(
        &self,
        _context: &Arc<dyn RefreshableExecutionContext>,
    ) -> BoxFuture<'static, BackendResult<Arc<dyn BulkResult>>> {
        match self.execution.lock().take() {
            Some(execution) => execution,
            None => future::ready(Err(SearchBackendError::request("stub executed twice"))).boxed(),
        }
    }
}

pub struct BulkCompleter {
    tx: oneshot::Sender<BackendResult<Arc<dyn BulkResult>>>,
}

impl BulkCompleter {
    pub fn succeed(self, result: Arc<StubBulkResult>) {
        let _ = self.tx.send(Ok(result as Arc<dyn BulkResult>));
    }

    pub fn fail(self, message: &str) {
        let _ = self.tx.send(Err(SearchBackendError::request(message)));
    }
}

// ---------------------------------------------------------------------------
// Stub execution context
// ---------------------------------------------------------------------------

enum StubRefresh {
    Succeed,
    Fail(String),
    Deferred(Option<oneshot::Receiver<BackendResult<()>>>),
}

pub struct StubContext {
    refreshes: AtomicUsize,
    outcome: Mutex<StubRefresh>,
}

impl StubContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            refreshes: AtomicUsize::new(0),
            outcome: Mutex::new(StubRefresh::Succeed),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            refreshes: AtomicUsize::new(0),
            outcome: Mutex::new(StubRefresh::Fail(message.to_string())),
        })
    }

    /// Refresh blocks until the returned completer resolves it.
    pub fn deferred() -> (Arc<Self>, RefreshCompleter) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                refreshes: AtomicUsize::new(0),
                outcome: Mutex::new(StubRefresh::Deferred(Some(rx))),
            }),
            RefreshCompleter { tx },
        )
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefreshableExecutionContext for StubContext {
    async fn execute_pending_refreshes(&self) -> BackendResult<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let pending = {
            let mut outcome = self.outcome.lock();
            match &mut *outcome {
                StubRefresh::Succeed => None,
                StubRefresh::Fail(message) => {
                    return Err(SearchBackendError::refresh(message.clone()))
                }
                StubRefresh::Deferred(rx) => rx.take(),
            }
        };
        match pending {
            None => Ok(()),
            Some(rx) => match rx.await {
                Ok(outcome) => outcome,
                Err(oneshot::Canceled) => {
                    Err(SearchBackendError::refresh("refresh completer dropped"))
                }
            },
        }
    }
}

pub struct RefreshCompleter {
    tx: oneshot::Sender<BackendResult<()>>,
}

impl RefreshCompleter {
    pub fn succeed(self) {
        let _ = self.tx.send(Ok(()));
    }

    pub fn fail(self, message: &str) {
        let _ = self.tx.send(Err(SearchBackendError::refresh(message)));
    }
}

// ---------------------------------------------------------------------------
// Recording error collector
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct CollectorLog {
    pub failed: Vec<(String, String)>,
    pub skipped: Vec<String>,
    pub failures: Vec<String>,
    pub handled: usize,
}

pub struct RecordingCollector {
    log: Arc<Mutex<CollectorLog>>,
    handle_error: Option<String>,
}

impl RecordingCollector {
    pub fn with_log(log: Arc<Mutex<CollectorLog>>) -> Self {
        Self {
            log,
            handle_error: None,
        }
    }

    pub fn with_failing_handler(log: Arc<Mutex<CollectorLog>>, message: &str) -> Self {
        Self {
            log,
            handle_error: Some(message.to_string()),
        }
    }
}

impl ErrorCollector for RecordingCollector {
    fn mark_failed(&mut self, work: &WorkId, cause: &Arc<SearchBackendError>) {
        self.log
            .lock()
            .failed
            .push((work.to_string(), cause.to_string()));
    }

    fn mark_skipped(&mut self, work: &WorkId) {
        self.log.lock().skipped.push(work.to_string());
    }

    fn record_failure(&mut self, cause: &Arc<SearchBackendError>) {
        self.log.lock().failures.push(cause.to_string());
    }

    fn handle(&mut self) -> BackendResult<()> {
        let mut log = self.log.lock();
        log.handled += 1;
        match self.handle_error.take() {
            Some(message) => Err(SearchBackendError::aborted(message)),
            None => Ok(()),
        }
    }
}

/// Sequence builder whose sequences run against `context` and record into
/// `log`.
pub fn builder_with(
    context: Arc<StubContext>,
    log: Arc<Mutex<CollectorLog>>,
) -> WorkSequenceBuilder {
    WorkSequenceBuilder::new(
        move || context.clone() as Arc<dyn RefreshableExecutionContext>,
        move || Box::new(RecordingCollector::with_log(Arc::clone(&log))),
    )
}

/// Like [`builder_with`], but the collector's finalization fails.
pub fn builder_with_failing_handler(
    context: Arc<StubContext>,
    log: Arc<Mutex<CollectorLog>>,
    message: &str,
) -> WorkSequenceBuilder {
    let message = message.to_string();
    WorkSequenceBuilder::new(
        move || context.clone() as Arc<dyn RefreshableExecutionContext>,
        move || {
            Box::new(RecordingCollector::with_failing_handler(
                Arc::clone(&log),
                &message,
            ))
        },
    )
}

// ---------------------------------------------------------------------------
// Counting bulk work factory
// ---------------------------------------------------------------------------

/// Records every bulk it assembles; each member's entry is its own id wrapped
/// in an object, so tests can tell entries apart.
pub struct CountingFactory {
    pub calls: Mutex<Vec<Vec<String>>>,
    fail: Option<String>,
}

impl CountingFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail: None,
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail: Some(message.to_string()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl searchlink_orchestration::BulkWorkFactory for CountingFactory {
    fn build(
        &self,
        members: &[ErasedWork],
    ) -> BackendResult<Box<dyn Work<Output = Arc<dyn BulkResult>>>> {
        let ids: Vec<String> = members.iter().map(|work| work.id().to_string()).collect();
        self.calls.lock().push(ids.clone());
        if let Some(message) = &self.fail {
            return Err(SearchBackendError::request(message.clone()));
        }
        let entries = ids.iter().map(|id| json!({ "id": id })).collect();
        Ok(Box::new(StubBulkWork::immediate(
            "bulk",
            StubBulkResult::new(entries),
        )))
    }
}
