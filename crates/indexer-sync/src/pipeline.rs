//! Persistence pipeline: the only writer of canonical event rows.

use std::sync::Arc;

use tracing::{debug, info};

use indexer_queue::JobQueue;
use indexer_store::StoreInterface;
use indexer_types::{keccak256, MakerInfo, OnChainData, OrderInfo, OrderPayload};

use crate::{AttributionResolver, SyncError};

/// Counters for one applied bundle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyStats {
	pub fills: usize,
	pub cancels: usize,
	pub nonce_cancels: usize,
	pub bulk_cancels: usize,
	pub nft_approvals: usize,
	pub nft_transfers: usize,
	pub ft_transfers: usize,
	pub enqueued_order_infos: usize,
	pub enqueued_maker_infos: usize,
	pub enqueued_orders: usize,
	pub mints: usize,
}

/// Applies an aggregated bundle to the store, then fans out reconciliation
/// work. Two invariants are enforced here: fills are persisted before
/// anything that could mark an order no-balance (a fill must be able to flip
/// such an order to filled instead), and nothing is enqueued before every
/// event category has been committed, so reconcilers never read a
/// half-applied batch. Store errors are fatal to the whole bundle; the
/// caller retries the unit of work.
pub struct Pipeline {
	store: Arc<dyn StoreInterface>,
	order_info_queue: Arc<dyn JobQueue<OrderInfo>>,
	maker_info_queue: Arc<dyn JobQueue<MakerInfo>>,
	order_queue: Arc<dyn JobQueue<OrderPayload>>,
	attribution: Arc<dyn AttributionResolver>,
}

impl Pipeline {
	pub fn new(
		store: Arc<dyn StoreInterface>,
		order_info_queue: Arc<dyn JobQueue<OrderInfo>>,
		maker_info_queue: Arc<dyn JobQueue<MakerInfo>>,
		order_queue: Arc<dyn JobQueue<OrderPayload>>,
		attribution: Arc<dyn AttributionResolver>,
	) -> Self {
		Self {
			store,
			order_info_queue,
			maker_info_queue,
			order_queue,
			attribution,
		}
	}

	/// Applies one bundle. Under `backfill` the canonical rows are written
	/// but no reconciliation or bookkeeping work is fanned out; a bootstrap
	/// pass recomputes caches afterwards.
	pub async fn apply(
		&self,
		mut data: OnChainData,
		backfill: bool,
	) -> Result<ApplyStats, SyncError> {
		let mut stats = ApplyStats::default();

		// Late attribution for fills the handlers could not attribute.
		for fill in &mut data.fill_events {
			if fill.fill_source.is_none() {
				let attribution = self
					.attribution
					.resolve(fill.origin.tx_hash, fill.order_kind, Some(fill.order_id))
					.await;
				fill.order_source = fill.order_source.take().or(attribution.order_source);
				fill.fill_source = attribution.fill_source;
				fill.aggregator_source = fill
					.aggregator_source
					.take()
					.or(attribution.aggregator_source);
			}
		}

		// Fills first; every category is independently idempotent.
		stats.fills = self.store.insert_fill_events(&data.fill_events).await?;
		stats.cancels = self.store.insert_cancel_events(&data.cancel_events).await?;
		stats.nonce_cancels = self
			.store
			.insert_nonce_cancel_events(&data.nonce_cancel_events)
			.await?;
		stats.bulk_cancels = self
			.store
			.insert_bulk_cancel_events(&data.bulk_cancel_events)
			.await?;
		stats.nft_approvals = self
			.store
			.insert_nft_approval_events(&data.nft_approval_events)
			.await?;
		stats.nft_transfers = self
			.store
			.insert_nft_transfer_events(&data.nft_transfer_events)
			.await?;
		stats.ft_transfers = self
			.store
			.insert_ft_transfer_events(&data.ft_transfer_events)
			.await?;

		if !backfill {
			stats.enqueued_order_infos = self
				.order_info_queue
				.enqueue_bulk(
					data.order_infos
						.into_iter()
						.map(|info| (info.context.clone(), info))
						.collect(),
				)
				.await?;
			stats.enqueued_maker_infos = self
				.maker_info_queue
				.enqueue_bulk(
					data.maker_infos
						.into_iter()
						.map(|info| (info.context.clone(), info))
						.collect(),
				)
				.await?;
			stats.enqueued_orders = self
				.order_queue
				.enqueue_bulk(
					data.orders
						.into_iter()
						.map(|payload| (order_payload_key(&payload), payload))
						.collect(),
				)
				.await?;

			// Best-effort bookkeeping; a failure here does not invalidate
			// the committed batch.
			for mint in &data.mint_infos {
				if let Err(err) = self.store.ensure_token(mint.contract, mint.token_id).await {
					debug!(%err, contract = %mint.contract, "Skipping mint bookkeeping");
					continue;
				}
				stats.mints += 1;
			}
		}

		info!(
			fills = stats.fills,
			cancels = stats.cancels,
			transfers = stats.nft_transfers + stats.ft_transfers,
			order_infos = stats.enqueued_order_infos,
			maker_infos = stats.enqueued_maker_infos,
			orders = stats.enqueued_orders,
			backfill,
			"Applied on-chain bundle"
		);
		Ok(stats)
	}
}

/// Dedup key for adapter-bound payloads: the same payload observed twice
/// collapses while pending.
fn order_payload_key(payload: &OrderPayload) -> String {
	let digest = keccak256(payload.data.to_string().as_bytes());
	format!("order-{}-{digest}", payload.kind)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;

	use indexer_queue::MemoryQueue;
	use indexer_store::{MemoryStore, StoreInterface};
	use indexer_types::{
		Address, ContractKind, EventOrigin, FillEvent, NftTransferEvent, OrderKind, Side, B256,
		U256,
	};

	use crate::StaticAttributionResolver;

	fn origin(log_index: u64) -> EventOrigin {
		EventOrigin {
			address: Address::repeat_byte(0x11),
			tx_hash: B256::repeat_byte(0xaa),
			block: 10,
			block_hash: B256::repeat_byte(0xbb),
			log_index,
			batch_index: 1,
			timestamp: 1_700_000_000,
		}
	}

	fn fill(order_id: B256) -> FillEvent {
		FillEvent {
			order_kind: OrderKind::LooksRare,
			order_id,
			order_side: Side::Sell,
			maker: Address::repeat_byte(1),
			taker: Address::repeat_byte(2),
			price: U256::from(100),
			currency: Address::ZERO,
			currency_price: U256::from(100),
			usd_price: None,
			contract: Address::repeat_byte(0x11),
			token_id: U256::from(1),
			amount: U256::from(1),
			order_source: None,
			fill_source: None,
			aggregator_source: None,
			origin: origin(5),
		}
	}

	fn pipeline(store: Arc<MemoryStore>) -> (Pipeline, Arc<MemoryQueue<OrderInfo>>) {
		let order_info_queue = Arc::new(MemoryQueue::new());
		let pipeline = Pipeline::new(
			store,
			order_info_queue.clone(),
			Arc::new(MemoryQueue::new()),
			Arc::new(MemoryQueue::new()),
			Arc::new(
				StaticAttributionResolver::new().with_source(OrderKind::LooksRare, "looksrare.org"),
			),
		);
		(pipeline, order_info_queue)
	}

	#[tokio::test]
	async fn applying_a_bundle_twice_is_idempotent() {
		let store = Arc::new(MemoryStore::new());
		let (pipeline, _) = pipeline(store.clone());

		let mut data = OnChainData::new();
		data.fill_events.push(fill(B256::repeat_byte(7)));
		data.nft_transfer_events.push(NftTransferEvent {
			kind: ContractKind::Erc721,
			from: Address::repeat_byte(1),
			to: Address::repeat_byte(2),
			token_id: U256::from(1),
			amount: U256::from(1),
			origin: origin(4),
		});

		let first = pipeline.apply(data.clone(), false).await.unwrap();
		assert_eq!(first.fills, 1);
		assert_eq!(first.nft_transfers, 1);

		let second = pipeline.apply(data, false).await.unwrap();
		assert_eq!(second.fills, 0);
		assert_eq!(second.nft_transfers, 0);
		assert_eq!(store.fill_events().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn fills_gain_attribution_before_persisting() {
		let store = Arc::new(MemoryStore::new());
		let (pipeline, _) = pipeline(store.clone());

		let mut data = OnChainData::new();
		data.fill_events.push(fill(B256::repeat_byte(7)));
		pipeline.apply(data, false).await.unwrap();

		let stored = store.fill_events().await.unwrap();
		assert_eq!(stored[0].fill_source.as_deref(), Some("looksrare.org"));
	}

	#[tokio::test]
	async fn backfill_skips_fanout() {
		let store = Arc::new(MemoryStore::new());
		let (pipeline, order_info_queue) = pipeline(store);

		let mut data = OnChainData::new();
		data.fill_events.push(fill(B256::repeat_byte(7)));
		data.order_infos.push(OrderInfo::for_order(
			"sale-test".to_string(),
			B256::repeat_byte(7),
			indexer_types::Trigger::new(indexer_types::TriggerKind::Sale),
		));

		let stats = pipeline.apply(data, true).await.unwrap();
		assert_eq!(stats.fills, 1);
		assert_eq!(stats.enqueued_order_infos, 0);
		assert_eq!(order_info_queue.pending_len().await, 0);
	}
}
