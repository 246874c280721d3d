//! Canonical on-chain events: the append-only audit log from which order
//! state and caches are (re)computable.
//!
//! Events are write-once and deduplicated by their natural composite key
//! `(tx_hash, log_index, batch_index)`; multi-item settlements are expanded
//! into one event per item with distinct batch indices.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{OrderId, OrderKind, OrderingKey, Side};

/// On-chain position and context shared by every canonical event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOrigin {
	/// Emitting contract.
	pub address: Address,
	pub tx_hash: B256,
	pub block: u64,
	pub block_hash: B256,
	pub log_index: u64,
	/// 1-based index within a multi-item settlement; 1 for plain events.
	pub batch_index: u64,
	pub timestamp: u64,
}

impl EventOrigin {
	/// Natural dedup key for append-only event tables.
	pub fn event_key(&self) -> (B256, u64, u64) {
		(self.tx_hash, self.log_index, self.batch_index)
	}

	pub fn ordering_key(&self) -> OrderingKey {
		OrderingKey::new(self.block, self.log_index)
	}
}

/// A (partial or full) fill of an order. Never recorded without a resolved
/// native-currency price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
	pub order_kind: OrderKind,
	pub order_id: OrderId,
	pub order_side: Side,
	pub maker: Address,
	pub taker: Address,
	/// Per-item price converted to the native currency's smallest unit.
	pub price: U256,
	pub currency: Address,
	pub currency_price: U256,
	pub usd_price: Option<U256>,
	pub contract: Address,
	pub token_id: U256,
	pub amount: U256,
	pub order_source: Option<String>,
	pub fill_source: Option<String>,
	pub aggregator_source: Option<String>,
	pub origin: EventOrigin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelEvent {
	pub order_kind: OrderKind,
	pub order_id: OrderId,
	pub origin: EventOrigin,
}

/// Invalidation of one specific nonce of a maker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceCancelEvent {
	pub order_kind: OrderKind,
	pub maker: Address,
	pub nonce: U256,
	pub origin: EventOrigin,
}

/// A master-nonce bump: every open order of `maker` with `nonce < min_nonce`
/// is cancelled. Scoped to one side unless `across_all` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCancelEvent {
	pub order_kind: OrderKind,
	pub maker: Address,
	pub min_nonce: U256,
	pub side: Side,
	pub across_all: bool,
	pub origin: EventOrigin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftApprovalEvent {
	pub owner: Address,
	pub operator: Address,
	pub approved: bool,
	pub origin: EventOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractKind {
	Erc721,
	Erc1155,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftTransferEvent {
	pub kind: ContractKind,
	pub from: Address,
	pub to: Address,
	pub token_id: U256,
	pub amount: U256,
	pub origin: EventOrigin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtTransferEvent {
	pub from: Address,
	pub to: Address,
	pub amount: U256,
	pub origin: EventOrigin,
}

/// What caused a reconciliation (and therefore a floor/top-bid change).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerKind {
	NewOrder,
	Sale,
	Cancel,
	Expiry,
	Reprice,
	Revalidation,
	BalanceChange,
	ApprovalChange,
	Bootstrap,
}

impl TriggerKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			TriggerKind::NewOrder => "new-order",
			TriggerKind::Sale => "sale",
			TriggerKind::Cancel => "cancel",
			TriggerKind::Expiry => "expiry",
			TriggerKind::Reprice => "reprice",
			TriggerKind::Revalidation => "revalidation",
			TriggerKind::BalanceChange => "balance-change",
			TriggerKind::ApprovalChange => "approval-change",
			TriggerKind::Bootstrap => "bootstrap",
		}
	}
}

/// Price-change history row, appended only when a token's cached floor ask
/// actually changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenFloorSellEvent {
	pub kind: TriggerKind,
	pub contract: Address,
	pub token_id: U256,
	/// New floor order; `None` when the token no longer has a fillable ask.
	pub order_id: Option<OrderId>,
	pub maker: Option<Address>,
	pub price: Option<U256>,
	pub previous_price: Option<U256>,
	pub tx_hash: Option<B256>,
	pub tx_timestamp: Option<u64>,
}
