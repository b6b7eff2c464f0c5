/*
 * Searchlink Orchestration - write-side execution core
 *
 * Turns concurrently submitted index mutations into ordered, fault-isolated,
 * bulk-optimized execution sequences against an asynchronous backend:
 * - Sequence builder: strict declaration-order chaining of works, bulk
 *   executions and bulk-result extractions, terminated by one refresh step
 * - Error collector: per-sequence failure/skip accounting with pluggable
 *   disposition policies
 * - Batching coordinator: coalesces adjacent bulkable works into one bulk
 *   request and chains sequences behind each other
 */

pub mod collector;
pub mod coordinator;
pub mod error;
pub mod future;
pub mod sequence;

pub use collector::{ErrorCollector, FailFastErrorCollector, LoggingErrorCollector};
pub use coordinator::{
    BatchingConfig, BatchingCoordinator, BulkWorkFactory, CompletionSignal, ErasedWork,
    WorksetSubmission,
};
pub use error::WorkFailure;
pub use future::{BulkResultFuture, RefreshBarrier, SequenceFuture, WorkFuture};
pub use sequence::{BulkResultExtractionStep, SequenceBuilder, WorkSequenceBuilder};
