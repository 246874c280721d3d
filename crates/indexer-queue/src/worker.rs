//! Worker pool draining the in-memory queues.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::{JobError, JobHandler, MemoryQueue};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
	pub concurrency: usize,
	/// Delivery attempts before a job is dead-lettered.
	pub max_attempts: u32,
	/// Base delay, doubled on every failed attempt.
	pub retry_delay: Duration,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			concurrency: 4,
			max_attempts: 5,
			retry_delay: Duration::from_secs(1),
		}
	}
}

pub struct WorkerPool;

impl WorkerPool {
	/// Spawns `concurrency` workers draining `queue` into `handler`. Workers
	/// exit once the queue is closed and empty; callers join the handles
	/// during shutdown.
	pub fn spawn<T, H>(
		name: &'static str,
		queue: Arc<MemoryQueue<T>>,
		handler: Arc<H>,
		config: WorkerConfig,
	) -> Vec<JoinHandle<()>>
	where
		T: Send + Sync + 'static,
		H: JobHandler<T> + 'static,
	{
		(0..config.concurrency.max(1))
			.map(|worker| {
				let queue = queue.clone();
				let handler = handler.clone();
				let config = config.clone();
				tokio::spawn(async move {
					while let Some(mut job) = queue.dequeue_wait().await {
						job.attempts += 1;
						match handler.handle(&job.payload).await {
							Ok(()) => {
								debug!(queue = name, worker, job_id = %job.id, "Job done");
							}
							Err(JobError::Retryable(reason))
								if job.attempts < config.max_attempts =>
							{
								warn!(
									queue = name,
									job_id = %job.id,
									attempts = job.attempts,
									%reason,
									"Job failed, retrying"
								);
								let delay = config.retry_delay
									* 2u32.saturating_pow(job.attempts.saturating_sub(1));
								let queue = queue.clone();
								tokio::spawn(async move {
									tokio::time::sleep(delay).await;
									queue.requeue(job).await;
								});
							}
							Err(err) => {
								error!(
									queue = name,
									job_id = %job.id,
									attempts = job.attempts,
									%err,
									"Job failed permanently"
								);
								queue.dead_letter(job).await;
							}
						}
					}
					debug!(queue = name, worker, "Worker stopped");
				})
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::JobQueue;
	use async_trait::async_trait;
	use std::sync::atomic::{AtomicU32, Ordering};

	struct Flaky {
		calls: AtomicU32,
		fail_first: u32,
		fatal: bool,
	}

	#[async_trait]
	impl JobHandler<u32> for Flaky {
		async fn handle(&self, _payload: &u32) -> Result<(), JobError> {
			let call = self.calls.fetch_add(1, Ordering::SeqCst);
			if call < self.fail_first {
				if self.fatal {
					Err(JobError::Fatal("broken payload".into()))
				} else {
					Err(JobError::Retryable("transient".into()))
				}
			} else {
				Ok(())
			}
		}
	}

	fn config() -> WorkerConfig {
		WorkerConfig {
			concurrency: 2,
			max_attempts: 3,
			retry_delay: Duration::from_millis(1),
		}
	}

	#[tokio::test]
	async fn retryable_failures_are_redelivered() {
		let queue = Arc::new(MemoryQueue::new());
		let handler = Arc::new(Flaky {
			calls: AtomicU32::new(0),
			fail_first: 2,
			fatal: false,
		});
		let workers = WorkerPool::spawn("test", queue.clone(), handler.clone(), config());

		queue.enqueue("job".into(), 7u32).await.unwrap();
		while handler.calls.load(Ordering::SeqCst) < 3 {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}

		queue.close().await;
		for worker in workers {
			worker.await.unwrap();
		}
		assert_eq!(queue.dead_len().await, 0);
	}

	#[tokio::test]
	async fn fatal_failures_are_dead_lettered() {
		let queue = Arc::new(MemoryQueue::new());
		let handler = Arc::new(Flaky {
			calls: AtomicU32::new(0),
			fail_first: u32::MAX,
			fatal: true,
		});
		let workers = WorkerPool::spawn("test", queue.clone(), handler.clone(), config());

		queue.enqueue("job".into(), 7u32).await.unwrap();
		while queue.dead_len().await == 0 {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}

		queue.close().await;
		for worker in workers {
			worker.await.unwrap();
		}
		assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
	}
}
