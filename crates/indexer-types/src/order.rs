//! The canonical order record and its status machine.

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::{OrderId, OrderingKey, TokenSetId};

/// Closed set of supported marketplace protocols.
///
/// Adapters and event handlers are resolved through a static registry keyed
/// by this tag; adding a protocol means adding a variant here plus its
/// adapter/handler implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderKind {
	Punks,
	ZeroexV4Erc721,
	ZeroexV4Erc1155,
	PaymentProcessor,
	LooksRare,
	Wyvern,
}

impl OrderKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderKind::Punks => "punks",
			OrderKind::ZeroexV4Erc721 => "zeroex-v4-erc721",
			OrderKind::ZeroexV4Erc1155 => "zeroex-v4-erc1155",
			OrderKind::PaymentProcessor => "payment-processor",
			OrderKind::LooksRare => "looks-rare",
			OrderKind::Wyvern => "wyvern",
		}
	}
}

impl std::fmt::Display for OrderKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Order side. Bundle orders offer several legs at once and are only ever
/// revalidated through the maker-wide reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
	Sell,
	Buy,
	Bundle,
}

/// Whether an order can currently be executed on-chain.
///
/// `Filled`, `Cancelled` and `Expired` are terminal: once reached, no
/// reconciliation run may revert the order to `Fillable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FillabilityStatus {
	Fillable,
	NoBalance,
	Filled,
	Cancelled,
	Expired,
}

impl FillabilityStatus {
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			FillabilityStatus::Filled | FillabilityStatus::Cancelled | FillabilityStatus::Expired
		)
	}

	/// Open orders are the only ones maker-wide revalidation may touch.
	pub fn is_open(&self) -> bool {
		matches!(self, FillabilityStatus::Fillable | FillabilityStatus::NoBalance)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalStatus {
	Approved,
	NoApproval,
	Disabled,
}

/// One entry of an order's fee breakdown, in basis points of the gross price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeEntry {
	pub kind: FeeKind,
	pub recipient: Address,
	pub bps: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeKind {
	Royalty,
	Marketplace,
}

/// A royalty the order should pay but does not; carried so downstream
/// consumers can compute royalty-normalized values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingRoyalty {
	pub recipient: Address,
	pub bps: u64,
	pub amount: U256,
}

/// One leg of a bundle order: the maker must hold (and have approved)
/// `amount` of the given asset for the whole bundle to be fillable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLeg {
	pub kind: BundleLegKind,
	pub contract: Address,
	pub token_id: Option<U256>,
	pub amount: U256,
	/// Leg-specific expiry, unix seconds. `None` means unbounded.
	pub valid_until: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleLegKind {
	Nft,
	Ft,
}

/// The canonical representation of one order, regardless of protocol.
///
/// At most one record exists per id. Records are never deleted; they are
/// mutated in place by later events referencing the same id (reprice, fill,
/// cancel) and marked terminal instead of removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
	pub id: OrderId,
	pub kind: OrderKind,
	pub side: Side,
	pub fillability_status: FillabilityStatus,
	pub approval_status: ApprovalStatus,
	pub token_set_id: TokenSetId,
	pub maker: Address,
	pub taker: Address,
	/// Gross price in the native currency's smallest unit.
	pub price: U256,
	/// Fee-adjusted value in the native currency's smallest unit. For buy
	/// orders this is `price - fees` (what the acceptor actually receives).
	pub value: U256,
	pub currency: Address,
	pub currency_price: U256,
	pub currency_value: U256,
	pub quantity_remaining: U256,
	/// Protocol-specific replay-protection counter, when the protocol has one.
	pub nonce: Option<U256>,
	/// Validity window, unix seconds. `valid_until == None` means unbounded.
	pub valid_from: u64,
	pub valid_until: Option<u64>,
	pub fee_bps: u64,
	pub fee_breakdown: Vec<FeeEntry>,
	pub missing_royalties: Vec<MissingRoyalty>,
	/// The contract whose approval the order depends on, when tracked.
	pub conduit: Option<Address>,
	/// Attribution: the marketplace frontend the order originated from.
	pub source: Option<String>,
	/// Opaque protocol payload, required for later re-derivation. Reprices
	/// merge into this value instead of overwriting it wholesale.
	pub raw_data: serde_json::Value,
	/// Ordering key of the on-chain event that produced the current state.
	/// `None` for off-chain orders and records predating key tracking.
	pub block_number: Option<u64>,
	pub log_index: Option<u64>,
	/// Legs of a bundle order; empty for plain orders.
	pub bundle_legs: Vec<BundleLeg>,
}

/// Deterministic order id: keccak over the protocol tag and the order's
/// immutable fields, so the same logical order always maps to the same id no
/// matter how often or through which path it is reported.
pub fn order_id(kind: OrderKind, fields: &[&[u8]]) -> OrderId {
	let mut buf = Vec::with_capacity(64);
	buf.extend_from_slice(kind.as_str().as_bytes());
	for field in fields {
		buf.extend_from_slice(field);
	}
	crate::keccak256(&buf)
}

impl OrderRecord {
	pub fn ordering_key(&self) -> Option<OrderingKey> {
		match (self.block_number, self.log_index) {
			(Some(block), Some(log_index)) => Some(OrderingKey { block, log_index }),
			_ => None,
		}
	}

	/// Whether the order currently participates in floor/top-bid caches.
	pub fn is_active(&self) -> bool {
		self.fillability_status == FillabilityStatus::Fillable
			&& self.approval_status == ApprovalStatus::Approved
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn terminal_statuses() {
		assert!(FillabilityStatus::Filled.is_terminal());
		assert!(FillabilityStatus::Cancelled.is_terminal());
		assert!(FillabilityStatus::Expired.is_terminal());
		assert!(!FillabilityStatus::Fillable.is_terminal());
		assert!(!FillabilityStatus::NoBalance.is_terminal());
		assert!(FillabilityStatus::NoBalance.is_open());
	}
}
