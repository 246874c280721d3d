//! Per-order cache reconciliation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use indexer_queue::{JobError, JobHandler};
use indexer_store::StoreInterface;
use indexer_types::{OrderInfo, Side};

use crate::JobsError;

/// Recomputes the caches an order can influence. The job carries either an
/// order id (the common case) or a bare token set and side for flows without
/// a specific order. All heavy lifting happens inside the store's atomic
/// recompute operations, so replays and concurrent jobs converge on the same
/// cached values.
pub struct OrderUpdatesById {
	store: Arc<dyn StoreInterface>,
}

impl OrderUpdatesById {
	pub fn new(store: Arc<dyn StoreInterface>) -> Self {
		Self { store }
	}

	async fn process(&self, info: &OrderInfo) -> Result<(), JobsError> {
		let (side, token_set_id) = match info.id {
			Some(id) => match self.store.get_order(id).await? {
				Some(order) => (order.side, order.token_set_id),
				None => {
					// The order may have been skipped by its adapter.
					debug!(%id, context = %info.context, "No such order, nothing to reconcile");
					return Ok(());
				}
			},
			None => match (&info.token_set_id, info.side) {
				(Some(set), Some(side)) => (side, set.clone()),
				_ => {
					warn!(context = %info.context, "Underspecified job payload, dropping");
					return Ok(());
				}
			},
		};

		match side {
			Side::Sell => {
				let changes = self
					.store
					.recompute_floor_ask(&token_set_id, &info.trigger)
					.await?;
				for change in &changes {
					info!(
						contract = %change.contract,
						token_id = %change.token_id,
						price = ?change.price,
						previous = ?change.previous_price,
						kind = change.kind.as_str(),
						"Floor ask changed"
					);
				}
			}
			Side::Buy => {
				if token_set_id.is_single_token() {
					self.store.recompute_token_top_buy(&token_set_id).await?;
				} else {
					self.store.recompute_set_top_buy(&token_set_id).await?;
				}
			}
			// Bundles hold no token-level cache slot.
			Side::Bundle => {}
		}

		Ok(())
	}
}

#[async_trait]
impl JobHandler<OrderInfo> for OrderUpdatesById {
	async fn handle(&self, payload: &OrderInfo) -> Result<(), JobError> {
		self.process(payload).await.map_err(JobError::from)
	}
}
