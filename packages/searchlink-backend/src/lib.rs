/*
 * Searchlink Backend Contracts
 *
 * Boundary interfaces between the search abstraction layer and its concrete
 * backends (embedded full-text engine, remote document-store cluster):
 * - Work: a single index mutation, executable against a context
 * - BulkResult: an opaque bulk response with per-position entry access
 * - RefreshableExecutionContext: visibility flush for completed writes
 * - SearchBackendError: the shared failure taxonomy
 *
 * The write-side orchestration core lives in `searchlink-orchestration` and
 * consumes these contracts without knowing any backend specifics.
 */

pub mod bulk;
pub mod context;
pub mod error;
pub mod work;

pub use bulk::{BulkItemExtractor, BulkResult};
pub use context::RefreshableExecutionContext;
pub use error::{BackendResult, SearchBackendError};
pub use work::{Work, WorkId};
