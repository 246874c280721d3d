//! Maker-wide order revalidation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use indexer_queue::{JobError, JobHandler, JobQueue};
use indexer_store::StoreInterface;
use indexer_types::{
	MakerInfo, MakerUpdate, OrderId, OrderInfo, Trigger, TriggerKind, U256,
};

use crate::JobsError;

/// Rows touched per balance-revalidation run. A run that hits the cap
/// re-enqueues itself; the store only reports rows it actually flipped, so
/// the continuation converges.
const DEFAULT_CHUNK_SIZE: usize = 200;

/// Reacts to maker-level mutations (balances, approvals, nonces) by
/// revalidating the affected slice of the maker's order book, then feeds
/// every flipped order id back into the by-id queue so the token caches
/// catch up.
pub struct OrderUpdatesByMaker {
	store: Arc<dyn StoreInterface>,
	order_info_queue: Arc<dyn JobQueue<OrderInfo>>,
	maker_info_queue: Arc<dyn JobQueue<MakerInfo>>,
	chunk_size: usize,
}

impl OrderUpdatesByMaker {
	pub fn new(
		store: Arc<dyn StoreInterface>,
		order_info_queue: Arc<dyn JobQueue<OrderInfo>>,
		maker_info_queue: Arc<dyn JobQueue<MakerInfo>>,
	) -> Self {
		Self {
			store,
			order_info_queue,
			maker_info_queue,
			chunk_size: DEFAULT_CHUNK_SIZE,
		}
	}

	pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
		self.chunk_size = chunk_size.max(1);
		self
	}

	async fn process(&self, info: &MakerInfo) -> Result<(), JobsError> {
		let timestamp = info.trigger.tx_timestamp.unwrap_or(0);
		match &info.data {
			MakerUpdate::BuyBalance { contract } => {
				let changed = self
					.store
					.revalidate_buy_balance(info.maker, *contract, timestamp, self.chunk_size)
					.await?;
				// FT bundle legs carry no token id.
				let bundles = self
					.store
					.revalidate_bundles_balance(info.maker, *contract, U256::ZERO, timestamp)
					.await?;
				self.requeue_by_id(&changed, TriggerKind::BalanceChange, info)
					.await?;
				self.requeue_by_id(&bundles, TriggerKind::BalanceChange, info)
					.await?;
				if changed.len() == self.chunk_size {
					self.continue_later(info).await?;
				}
			}
			MakerUpdate::SellBalance { contract, token_id } => {
				let changed = self
					.store
					.revalidate_sell_balance(
						info.maker,
						*contract,
						*token_id,
						timestamp,
						self.chunk_size,
					)
					.await?;
				let bundles = self
					.store
					.revalidate_bundles_balance(info.maker, *contract, *token_id, timestamp)
					.await?;
				self.requeue_by_id(&changed, TriggerKind::BalanceChange, info)
					.await?;
				self.requeue_by_id(&bundles, TriggerKind::BalanceChange, info)
					.await?;
				if changed.len() == self.chunk_size {
					self.continue_later(info).await?;
				}
			}
			MakerUpdate::SellApproval {
				contract,
				operator,
				approved,
			} => {
				let changed = self
					.store
					.revalidate_sell_approval(info.maker, *contract, *operator, *approved)
					.await?;
				let bundles = self
					.store
					.revalidate_bundles_approval(info.maker, *contract, *operator, timestamp)
					.await?;
				self.requeue_by_id(&changed, TriggerKind::ApprovalChange, info)
					.await?;
				self.requeue_by_id(&bundles, TriggerKind::ApprovalChange, info)
					.await?;
			}
			MakerUpdate::BuyApproval {
				contract,
				operator,
				order_kind,
			} => {
				let operators = match (operator, order_kind) {
					(Some(operator), _) => vec![*operator],
					(None, Some(kind)) => {
						self.store.conduits_for_buy_orders(info.maker, *kind).await?
					}
					(None, None) => {
						debug!(context = %info.context, "Approval update names no operator");
						Vec::new()
					}
				};
				for operator in operators {
					let changed = self
						.store
						.revalidate_buy_approval(info.maker, *contract, operator)
						.await?;
					self.requeue_by_id(&changed, TriggerKind::ApprovalChange, info)
						.await?;
				}
			}
			MakerUpdate::NonceCancel {
				order_kind,
				min_nonce,
				side,
			} => {
				let cancelled = self
					.store
					.bulk_cancel_orders(*order_kind, info.maker, *min_nonce, *side)
					.await?;
				info!(
					maker = %info.maker,
					kind = ?order_kind,
					min_nonce = %min_nonce,
					count = cancelled.len(),
					"Bulk-cancelled stale-nonce orders"
				);
				self.requeue_by_id(&cancelled, TriggerKind::Cancel, info)
					.await?;
			}
			MakerUpdate::Nonces { order_kind, nonces } => {
				let cancelled = self
					.store
					.cancel_orders_with_nonces(*order_kind, info.maker, nonces)
					.await?;
				self.requeue_by_id(&cancelled, TriggerKind::Cancel, info)
					.await?;
			}
		}
		Ok(())
	}

	/// Every flipped order gets its own by-id job so token caches converge.
	/// The context embeds both the order id and the originating maker context,
	/// collapsing repeats of the same (cause, order) pair while pending.
	async fn requeue_by_id(
		&self,
		ids: &[OrderId],
		kind: TriggerKind,
		info: &MakerInfo,
	) -> Result<(), JobsError> {
		if ids.is_empty() {
			return Ok(());
		}
		let trigger = Trigger {
			kind,
			..info.trigger.clone()
		};
		let jobs = ids
			.iter()
			.map(|id| {
				let context = format!("{}-{id}-{}", kind.as_str(), info.context);
				(
					context.clone(),
					OrderInfo::for_order(context, *id, trigger.clone()),
				)
			})
			.collect();
		self.order_info_queue.enqueue_bulk(jobs).await?;
		Ok(())
	}

	/// Re-enqueues the same payload; its id was freed on dequeue, so this
	/// never collides with the run that scheduled it.
	async fn continue_later(&self, info: &MakerInfo) -> Result<(), JobsError> {
		self.maker_info_queue
			.enqueue(info.context.clone(), info.clone())
			.await?;
		Ok(())
	}
}

#[async_trait]
impl JobHandler<MakerInfo> for OrderUpdatesByMaker {
	async fn handle(&self, payload: &MakerInfo) -> Result<(), JobError> {
		self.process(payload).await.map_err(JobError::from)
	}
}
