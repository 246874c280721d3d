//! Protocol order adapters.
//!
//! Each supported marketplace protocol gets one adapter that validates and
//! normalizes a raw order payload into a canonical `OrderRecord`. Adapters
//! share one pipeline shape: compute the deterministic id, reject unsupported
//! variants with a typed status, discard payloads superseded by causally newer
//! chain state, run the off-chain fillability check, resolve the token set,
//! then insert or reprice. Expected rejections are `SaveStatus` values, never
//! errors; only store and queue failures propagate as `Err`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{error, warn};

use indexer_queue::{JobQueue, QueueError};
use indexer_store::{StoreError, StoreInterface};
use indexer_types::{OrderId, OrderInfo, OrderKind, OrderPayload, Trigger, TriggerKind};

pub mod common;

pub mod implementations {
	pub mod payment_processor;
	pub mod punks;
	pub mod zeroex_v4;
}

pub use implementations::payment_processor::PaymentProcessor;
pub use implementations::punks::Punks;
pub use implementations::zeroex_v4::ZeroexV4;

#[derive(Debug, Error)]
pub enum OrderbookError {
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error(transparent)]
	Queue(#[from] QueueError),
	#[error("No adapter registered for kind {0}")]
	UnknownKind(OrderKind),
}

/// Terminal outcome of one save attempt. Everything except `Success` leaves
/// the store untouched, apart from the documented force-cancel edge case for
/// unsupported currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
	Success,
	AlreadyExists,
	/// A causally newer record or terminal event for the same id exists.
	Redundant,
	UnsupportedSide,
	UnsupportedPaymentToken,
	UnsupportedCurrency,
	DuplicatedNonce,
	Expired,
	Cancelled,
	Invalid,
	InvalidSignature,
	FeesTooHigh,
	InvalidTokenSet,
}

impl SaveStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			SaveStatus::Success => "success",
			SaveStatus::AlreadyExists => "already-exists",
			SaveStatus::Redundant => "redundant",
			SaveStatus::UnsupportedSide => "unsupported-side",
			SaveStatus::UnsupportedPaymentToken => "unsupported-payment-token",
			SaveStatus::UnsupportedCurrency => "unsupported-currency",
			SaveStatus::DuplicatedNonce => "duplicated-nonce",
			SaveStatus::Expired => "expired",
			SaveStatus::Cancelled => "cancelled",
			SaveStatus::Invalid => "invalid",
			SaveStatus::InvalidSignature => "invalid-signature",
			SaveStatus::FeesTooHigh => "fees-too-high",
			SaveStatus::InvalidTokenSet => "invalid-token-set",
		}
	}
}

#[derive(Debug, Clone)]
pub struct SaveResult {
	/// `None` when the payload was rejected before an id could be derived.
	pub id: Option<OrderId>,
	pub status: SaveStatus,
}

impl SaveResult {
	pub fn rejected(status: SaveStatus) -> Self {
		Self { id: None, status }
	}

	pub fn of(id: OrderId, status: SaveStatus) -> Self {
		Self {
			id: Some(id),
			status,
		}
	}
}

/// Shared collaborators handed to every adapter invocation.
pub struct AdapterContext {
	pub store: Arc<dyn StoreInterface>,
	/// By-id reconciler queue; fed on `Success` only.
	pub order_queue: Arc<dyn JobQueue<OrderInfo>>,
	fixed_time: Option<u64>,
}

impl AdapterContext {
	pub fn new(
		store: Arc<dyn StoreInterface>,
		order_queue: Arc<dyn JobQueue<OrderInfo>>,
	) -> Self {
		Self {
			store,
			order_queue,
			fixed_time: None,
		}
	}

	/// Pins the wall clock, for tests exercising expiry paths.
	pub fn with_time(mut self, timestamp: u64) -> Self {
		self.fixed_time = Some(timestamp);
		self
	}

	pub fn now(&self) -> u64 {
		self.fixed_time
			.unwrap_or_else(|| chrono::Utc::now().timestamp().max(0) as u64)
	}

	/// Enqueues the by-id reconciliation job for a freshly saved order.
	pub async fn trigger_reconciliation(
		&self,
		id: OrderId,
		kind: TriggerKind,
	) -> Result<(), OrderbookError> {
		let info = OrderInfo::for_order(
			format!("{}-{id}", kind.as_str()),
			id,
			Trigger::new(kind),
		);
		self.order_queue.enqueue(info.context.clone(), info).await?;
		Ok(())
	}
}

/// One marketplace protocol's normalization logic.
#[async_trait]
pub trait OrderAdapter: Send + Sync {
	fn kind(&self) -> OrderKind;

	/// Validates and persists one payload, returning its terminal status.
	async fn save(
		&self,
		payload: &OrderPayload,
		ctx: &AdapterContext,
	) -> Result<SaveResult, OrderbookError>;
}

/// Static dispatch table from protocol tag to adapter.
pub struct AdapterRegistry {
	adapters: HashMap<OrderKind, Box<dyn OrderAdapter>>,
}

impl AdapterRegistry {
	pub fn new() -> Self {
		Self {
			adapters: HashMap::new(),
		}
	}

	pub fn register(mut self, adapter: Box<dyn OrderAdapter>) -> Self {
		self.adapters.insert(adapter.kind(), adapter);
		self
	}

	pub fn get(&self, kind: OrderKind) -> Option<&dyn OrderAdapter> {
		self.adapters.get(&kind).map(|a| a.as_ref())
	}

	/// Saves a batch of payloads with bounded concurrency. Per-order failures
	/// are logged and skipped so one bad order never blocks the batch.
	pub async fn save_batch(
		&self,
		payloads: &[OrderPayload],
		ctx: &AdapterContext,
		concurrency: usize,
	) -> Vec<SaveResult> {
		stream::iter(payloads)
			.map(|payload| async move {
				let Some(adapter) = self.get(payload.kind) else {
					warn!(kind = %payload.kind, "No adapter registered, skipping order");
					return None;
				};
				match adapter.save(payload, ctx).await {
					Ok(result) => Some(result),
					Err(err) => {
						error!(kind = %payload.kind, %err, "Failed to save order");
						None
					}
				}
			})
			.buffer_unordered(concurrency.max(1))
			.filter_map(|result| async move { result })
			.collect()
			.await
	}
}

impl Default for AdapterRegistry {
	fn default() -> Self {
		Self::new()
	}
}
