//! Chain-event ingestion: per-protocol log handlers, the per-batch
//! aggregator, and the persistence pipeline.
//!
//! Handlers are pure transformers from raw logs to canonical events; the
//! aggregator batches their output per transaction; the pipeline is the only
//! writer of canonical rows and the only producer of reconciliation jobs.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use indexer_queue::QueueError;
use indexer_store::{StoreError, StoreInterface};
use indexer_types::{
	Address, EnhancedLog, EventOrigin, OnChainData, OrderId, OrderKind, Trigger, TriggerKind,
	B256, U256,
};

pub mod aggregator;
pub mod pipeline;

pub mod implementations {
	pub mod attribution;
	pub mod erc1155;
	pub mod erc20;
	pub mod erc721;
	pub mod looks_rare;
	pub mod price;
	pub mod punks;
	pub mod wyvern;
}

pub use aggregator::Aggregator;
pub use implementations::attribution::StaticAttributionResolver;
pub use implementations::price::StaticPriceOracle;
pub use pipeline::{ApplyStats, Pipeline};

#[derive(Debug, Error)]
pub enum SyncError {
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error(transparent)]
	Queue(#[from] QueueError),
	#[error("Failed to decode log: {0}")]
	Decode(String),
}

/// Resolved native/USD pricing for one settlement amount.
#[derive(Debug, Clone)]
pub struct PriceData {
	pub native_price: U256,
	pub usd_price: Option<U256>,
}

/// Currency-conversion collaborator. Returning `None` means the price cannot
/// be resolved and the event relying on it must be dropped.
#[async_trait]
pub trait PriceOracle: Send + Sync {
	async fn get_native_price(
		&self,
		currency: Address,
		amount: U256,
		timestamp: u64,
	) -> Option<PriceData>;
}

/// Marketplace-frontend attribution for one fill or order.
#[derive(Debug, Clone, Default)]
pub struct Attribution {
	pub order_source: Option<String>,
	pub fill_source: Option<String>,
	pub aggregator_source: Option<String>,
	pub taker: Option<Address>,
}

#[async_trait]
pub trait AttributionResolver: Send + Sync {
	async fn resolve(
		&self,
		tx_hash: B256,
		kind: OrderKind,
		order_id: Option<OrderId>,
	) -> Attribution;
}

/// Collaborators shared by every handler invocation.
pub struct HandlerContext {
	pub store: Arc<dyn StoreInterface>,
	pub price_oracle: Arc<dyn PriceOracle>,
	pub attribution: Arc<dyn AttributionResolver>,
}

/// Rebuilds the primitive log shape the sol-types decoders expect.
pub(crate) fn prim_log(log: &EnhancedLog) -> alloy::primitives::Log {
	alloy::primitives::Log::new_unchecked(
		log.log.address,
		log.log.topics.clone(),
		log.log.data.clone(),
	)
}

/// Trigger carrying the full on-chain position of the causing event.
pub fn trigger_from(kind: TriggerKind, origin: &EventOrigin) -> Trigger {
	Trigger {
		kind,
		tx_hash: Some(origin.tx_hash),
		tx_timestamp: Some(origin.timestamp),
		log_index: Some(origin.log_index),
		batch_index: Some(origin.batch_index),
	}
}

/// One protocol's log-to-canonical-event translation.
///
/// `handle` receives every log of one transaction, in log-index order, and
/// appends whatever it recognizes to the bundle. Logs of other protocols are
/// ignored, not errors.
#[async_trait]
pub trait EventHandler: Send + Sync {
	fn name(&self) -> &'static str;

	async fn handle(
		&self,
		logs: &[EnhancedLog],
		data: &mut OnChainData,
		ctx: &HandlerContext,
	) -> Result<(), SyncError>;
}
