use crate::future::WorkFuture;
use crate::sequence::{SequenceBuilder, WorkSequenceBuilder};
use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use searchlink_backend::{BackendResult, BulkResult, Work};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Completion signal of one workset's sequence, used to chain the next
/// sequence behind it. Resolves whether the sequence succeeded or not.
pub type CompletionSignal = Shared<BoxFuture<'static, ()>>;

/// Works as the coordinator sees them: identity plus raw backend response.
/// Callers interpret the response themselves through the per-work future.
pub type ErasedWork = Arc<dyn Work<Output = serde_json::Value>>;

/// Assembles one backend bulk request out of a run of bulkable works.
pub trait BulkWorkFactory: Send + Sync + 'static {
    fn build(&self, members: &[ErasedWork])
        -> BackendResult<Box<dyn Work<Output = Arc<dyn BulkResult>>>>;
}

/// Bulk coalescing thresholds.
///
/// Runs of adjacent bulkable works shorter than `min_bulk_size` execute
/// standalone (a bulk of one buys nothing); longer runs are split into bulks
/// of at most `max_bulk_size` members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    pub min_bulk_size: usize,
    pub max_bulk_size: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            min_bulk_size: 2,
            max_bulk_size: 100,
        }
    }
}

/// Outcome of submitting one workset: per-work futures in submission order,
/// plus the workset's sequence completion signal.
pub struct WorksetSubmission {
    pub works: Vec<WorkFuture<serde_json::Value>>,
    pub completion: CompletionSignal,
}

/// Turns concurrently submitted worksets into chained sequences.
///
/// Each submission becomes one sequence: adjacent bulkable works are
/// coalesced into bulk execution + extraction steps, everything else runs
/// standalone, and the sequence starts only once the previously submitted
/// sequence has fully completed (refresh included). Sequences are driven on
/// spawned tokio tasks, so `submit` returns without blocking on execution.
pub struct BatchingCoordinator {
    sequence_builder: WorkSequenceBuilder,
    bulk_factory: Arc<dyn BulkWorkFactory>,
    config: BatchingConfig,
    tail: Mutex<CompletionSignal>,
}

impl BatchingCoordinator {
    pub fn new(
        sequence_builder: WorkSequenceBuilder,
        bulk_factory: Arc<dyn BulkWorkFactory>,
        config: BatchingConfig,
    ) -> Self {
        Self {
            sequence_builder,
            bulk_factory,
            config,
            tail: Mutex::new(future::ready(()).boxed().shared()),
        }
    }

    /// Submit one workset for ordered execution behind everything submitted
    /// before it.
    pub fn submit(&self, works: Vec<ErasedWork>) -> WorksetSubmission {
        // Clamp degenerate thresholds rather than building bulks of one.
        let min_bulk = self.config.min_bulk_size.max(2);
        let max_bulk = self.config.max_bulk_size.max(min_bulk);

        let mut tail = self.tail.lock();
        if works.is_empty() {
            debug!("empty workset submitted, nothing to sequence");
            return WorksetSubmission {
                works: Vec::new(),
                completion: tail.clone(),
            };
        }
        info!(works = works.len(), "submitting workset");

        let mut builder = self.sequence_builder.init(tail.clone());
        let mut futures = Vec::with_capacity(works.len());
        let mut run: Vec<ErasedWork> = Vec::new();

        for work in works {
            if work.bulkable() {
                run.push(work);
                continue;
            }
            self.flush_run(&mut builder, &mut futures, &mut run, min_bulk, max_bulk);
            futures.push(builder.add_non_bulk_execution(work));
        }
        self.flush_run(&mut builder, &mut futures, &mut run, min_bulk, max_bulk);

        let sequence = builder.build();
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            if let Err(cause) = sequence.await {
                error!(error = %cause, "work sequence finalization failed");
            }
            let _ = done_tx.send(());
        });
        let completion: CompletionSignal = async move {
            let _ = done_rx.await;
        }
        .boxed()
        .shared();
        *tail = completion.clone();

        WorksetSubmission {
            works: futures,
            completion,
        }
    }

    /// Everything submitted so far has fully completed, refreshes included.
    pub fn completion(&self) -> CompletionSignal {
        self.tail.lock().clone()
    }

    fn flush_run(
        &self,
        builder: &mut SequenceBuilder,
        futures: &mut Vec<WorkFuture<serde_json::Value>>,
        run: &mut Vec<ErasedWork>,
        min_bulk: usize,
        max_bulk: usize,
    ) {
        if run.is_empty() {
            return;
        }
        let members = std::mem::take(run);
        if members.len() < min_bulk {
            for member in members {
                futures.push(builder.add_non_bulk_execution(member));
            }
            return;
        }
        for chunk in members.chunks(max_bulk) {
            // A max-size split can leave a tail below the minimum; those
            // members execute standalone like any other short run.
            if chunk.len() < min_bulk {
                for member in chunk {
                    futures.push(builder.add_non_bulk_execution(Arc::clone(member)));
                }
                continue;
            }
            debug!(members = chunk.len(), "coalescing bulkable works into one bulk");
            let factory = Arc::clone(&self.bulk_factory);
            let chunk_members: Vec<ErasedWork> = chunk.to_vec();
            let bulk_work = async move { factory.build(&chunk_members) };

            let bulk_result = builder.add_bulk_execution(bulk_work);
            let mut extraction = builder.add_bulk_result_extraction(bulk_result);
            for (position, member) in chunk.iter().enumerate() {
                futures.push(extraction.add(Arc::clone(member), position));
            }
        }
    }
}
