//! Periodic expiry of orders whose validity window has passed.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tracing::{error, info};

use indexer_queue::JobQueue;
use indexer_store::StoreInterface;
use indexer_types::{OrderInfo, Trigger, TriggerKind};

use crate::JobsError;

/// Flips overdue orders to expired and schedules cache reconciliation for
/// each. Expiry is terminal, so sweeping the same window twice is a no-op.
pub struct ExpirySweeper {
	store: Arc<dyn StoreInterface>,
	order_info_queue: Arc<dyn JobQueue<OrderInfo>>,
}

impl ExpirySweeper {
	pub fn new(
		store: Arc<dyn StoreInterface>,
		order_info_queue: Arc<dyn JobQueue<OrderInfo>>,
	) -> Self {
		Self {
			store,
			order_info_queue,
		}
	}

	/// One sweep at the given timestamp. Returns the number of expired orders.
	pub async fn sweep(&self, now: u64) -> Result<usize, JobsError> {
		let expired = self.store.expire_overdue_orders(now).await?;
		if expired.is_empty() {
			return Ok(0);
		}
		let trigger = Trigger {
			kind: TriggerKind::Expiry,
			tx_hash: None,
			tx_timestamp: Some(now),
			log_index: None,
			batch_index: None,
		};
		let jobs = expired
			.iter()
			.map(|order| {
				let context = format!("expiry-{}-{now}", order.id);
				(
					context.clone(),
					OrderInfo::for_order(context, order.id, trigger.clone()),
				)
			})
			.collect();
		self.order_info_queue.enqueue_bulk(jobs).await?;
		info!(count = expired.len(), now, "Expired overdue orders");
		Ok(expired.len())
	}

	/// Spawns the sweep loop. Errors are logged and the loop keeps running.
	pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			loop {
				ticker.tick().await;
				let now = SystemTime::now()
					.duration_since(UNIX_EPOCH)
					.map(|d| d.as_secs())
					.unwrap_or(0);
				if let Err(err) = self.sweep(now).await {
					error!(%err, "Expiry sweep failed");
				}
			}
		})
	}
}
