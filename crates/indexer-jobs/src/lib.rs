//! Reconciliation job processors.
//!
//! Two processors drain the reconciliation queues the event pipeline and the
//! order adapters feed. The by-id processor recomputes token and set caches
//! around a single order; the by-maker processor revalidates whole slices of
//! a maker's order book and feeds the affected ids back into the by-id queue.
//! Both are idempotent, so at-least-once queue delivery is safe.

use thiserror::Error;

use indexer_queue::{JobError, QueueError};
use indexer_store::StoreError;

pub mod by_id;
pub mod by_maker;
pub mod expiry;

pub use by_id::OrderUpdatesById;
pub use by_maker::OrderUpdatesByMaker;
pub use expiry::ExpirySweeper;

/// Errors of a single reconciliation job run.
#[derive(Debug, Error)]
pub enum JobsError {
	#[error("Store error: {0}")]
	Store(#[from] StoreError),
	#[error("Queue error: {0}")]
	Queue(#[from] QueueError),
}

impl From<JobsError> for JobError {
	fn from(err: JobsError) -> Self {
		// Store and queue failures are transient for this backend; the worker
		// pool retries with backoff and dead-letters on exhaustion.
		JobError::Retryable(err.to_string())
	}
}
