//! In-memory queue backend.

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::{Job, JobQueue, QueueError};

struct Inner<T> {
	pending: VecDeque<Job<T>>,
	pending_ids: HashSet<String>,
	dead: Vec<Job<T>>,
	closed: bool,
}

/// In-memory implementation of a deduplicated job queue.
pub struct MemoryQueue<T> {
	inner: Mutex<Inner<T>>,
	notify: Notify,
}

impl<T: Send + 'static> MemoryQueue<T> {
	pub fn new() -> Self {
		Self {
			inner: Mutex::new(Inner {
				pending: VecDeque::new(),
				pending_ids: HashSet::new(),
				dead: Vec::new(),
				closed: false,
			}),
			notify: Notify::new(),
		}
	}

	/// Pops the oldest pending job without waiting. The job's id leaves the
	/// dedup set here, so a fresh enqueue of the same id is accepted while
	/// the job is being worked.
	pub async fn dequeue(&self) -> Option<Job<T>> {
		let mut inner = self.inner.lock().await;
		let job = inner.pending.pop_front()?;
		inner.pending_ids.remove(&job.id);
		Some(job)
	}

	/// Waits for the next job. Returns `None` once the queue is closed and
	/// fully drained.
	pub async fn dequeue_wait(&self) -> Option<Job<T>> {
		loop {
			let notified = self.notify.notified();
			{
				let mut inner = self.inner.lock().await;
				if let Some(job) = inner.pending.pop_front() {
					inner.pending_ids.remove(&job.id);
					return Some(job);
				}
				if inner.closed {
					return None;
				}
			}
			notified.await;
		}
	}

	/// Puts a failed job back, keeping its attempt count. Dropped when a
	/// newer job with the same id is already pending, since that one will
	/// redo the same idempotent work.
	pub async fn requeue(&self, job: Job<T>) {
		let mut inner = self.inner.lock().await;
		if inner.closed || !inner.pending_ids.insert(job.id.clone()) {
			return;
		}
		inner.pending.push_back(job);
		drop(inner);
		self.notify.notify_waiters();
	}

	/// Parks a permanently failed job for inspection.
	pub async fn dead_letter(&self, job: Job<T>) {
		self.inner.lock().await.dead.push(job);
	}

	pub async fn pending_len(&self) -> usize {
		self.inner.lock().await.pending.len()
	}

	pub async fn dead_len(&self) -> usize {
		self.inner.lock().await.dead.len()
	}

	/// Stops accepting work and wakes idle workers so they can exit.
	pub async fn close(&self) {
		self.inner.lock().await.closed = true;
		self.notify.notify_waiters();
	}
}

impl<T: Send + 'static> Default for MemoryQueue<T> {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl<T: Send + 'static> JobQueue<T> for MemoryQueue<T> {
	async fn enqueue(&self, id: String, payload: T) -> Result<bool, QueueError> {
		let mut inner = self.inner.lock().await;
		if inner.closed {
			return Err(QueueError::Closed);
		}
		if !inner.pending_ids.insert(id.clone()) {
			return Ok(false);
		}
		inner.pending.push_back(Job {
			id,
			payload,
			attempts: 0,
		});
		drop(inner);
		self.notify.notify_waiters();
		Ok(true)
	}

	async fn enqueue_bulk(&self, jobs: Vec<(String, T)>) -> Result<usize, QueueError> {
		let mut inner = self.inner.lock().await;
		if inner.closed {
			return Err(QueueError::Closed);
		}
		let mut added = 0;
		for (id, payload) in jobs {
			if !inner.pending_ids.insert(id.clone()) {
				continue;
			}
			inner.pending.push_back(Job {
				id,
				payload,
				attempts: 0,
			});
			added += 1;
		}
		drop(inner);
		if added > 0 {
			self.notify.notify_waiters();
		}
		Ok(added)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn pending_jobs_dedup_by_id() {
		let queue = MemoryQueue::new();
		assert!(queue.enqueue("a".into(), 1u32).await.unwrap());
		assert!(!queue.enqueue("a".into(), 2u32).await.unwrap());
		assert!(queue.enqueue("b".into(), 3u32).await.unwrap());
		assert_eq!(queue.pending_len().await, 2);

		// Once dequeued, the id is free again.
		let job = queue.dequeue().await.unwrap();
		assert_eq!(job.payload, 1);
		assert!(queue.enqueue("a".into(), 4u32).await.unwrap());
	}

	#[tokio::test]
	async fn bulk_enqueue_reports_survivors() {
		let queue = MemoryQueue::new();
		let added = queue
			.enqueue_bulk(vec![
				("a".into(), 1u32),
				("a".into(), 2u32),
				("b".into(), 3u32),
			])
			.await
			.unwrap();
		assert_eq!(added, 2);
	}

	#[tokio::test]
	async fn closed_queue_rejects_and_drains() {
		let queue = MemoryQueue::new();
		queue.enqueue("a".into(), 1u32).await.unwrap();
		queue.close().await;

		assert!(matches!(
			queue.enqueue("b".into(), 2u32).await,
			Err(QueueError::Closed)
		));
		assert!(queue.dequeue_wait().await.is_some());
		assert!(queue.dequeue_wait().await.is_none());
	}
}
