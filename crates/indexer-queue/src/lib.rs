//! Deduplicated job queues and their worker pool.
//!
//! Reconciliation work arrives as jobs keyed by a deterministic context
//! string. While a job with a given key is still pending, enqueueing the same
//! key is a no-op, so a burst of unrelated events revalidating the same order
//! collapses into a single run. Delivery is at-least-once: handlers must be
//! idempotent.

use async_trait::async_trait;
use thiserror::Error;

pub mod implementations {
	pub mod memory;
}

pub mod worker;

pub use implementations::memory::MemoryQueue;
pub use worker::{WorkerConfig, WorkerPool};

#[derive(Debug, Error)]
pub enum QueueError {
	#[error("Queue is closed")]
	Closed,
	#[error("Backend error: {0}")]
	Backend(String),
}

/// How a handler failure should be treated by the worker pool.
#[derive(Debug, Error)]
pub enum JobError {
	/// Transient failure; the job is retried with backoff until the attempt
	/// budget runs out.
	#[error("Retryable: {0}")]
	Retryable(String),
	/// Permanent failure; the job goes straight to the dead letter list.
	#[error("Fatal: {0}")]
	Fatal(String),
}

/// A unit of queued work.
#[derive(Debug, Clone)]
pub struct Job<T> {
	/// Dedup key; at most one pending job per id.
	pub id: String,
	pub payload: T,
	/// Completed delivery attempts.
	pub attempts: u32,
}

/// Producer side of a queue.
#[async_trait]
pub trait JobQueue<T: Send + 'static>: Send + Sync {
	/// Enqueues unless a job with the same id is already pending. Returns
	/// whether the job was actually added.
	async fn enqueue(&self, id: String, payload: T) -> Result<bool, QueueError>;

	/// Enqueues a batch, returning how many survived deduplication.
	async fn enqueue_bulk(&self, jobs: Vec<(String, T)>) -> Result<usize, QueueError>;
}

/// Handler invoked by the worker pool for each dequeued job.
#[async_trait]
pub trait JobHandler<T>: Send + Sync {
	async fn handle(&self, payload: &T) -> Result<(), JobError>;
}
