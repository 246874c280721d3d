//! Reconciliation job payloads.
//!
//! The `context` field of each payload is a deterministic id for whatever
//! triggered the job. It doubles as the queue job id, so redundant triggers
//! (the same order revalidated by several unrelated events) collapse into at
//! most one pending job per context. Contexts must be distinctive enough not
//! to wrongfully drop work, but not so distinctive that duplicate work slips
//! through.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{OrderId, OrderKind, Side, TokenSetId, TriggerKind};

/// What triggered a reconciliation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
	pub kind: TriggerKind,
	pub tx_hash: Option<B256>,
	pub tx_timestamp: Option<u64>,
	pub log_index: Option<u64>,
	pub batch_index: Option<u64>,
}

impl Trigger {
	pub fn new(kind: TriggerKind) -> Self {
		Self {
			kind,
			tx_hash: None,
			tx_timestamp: None,
			log_index: None,
			batch_index: None,
		}
	}
}

/// Payload of the by-id reconciler queue.
///
/// When `id` is set the job recomputes the caches of every token covered by
/// that order's token set. Alternatively `token_set_id` + `side` support
/// revalidation flows that have no specific order to check against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderInfo {
	pub context: String,
	pub trigger: Trigger,
	pub id: Option<OrderId>,
	pub token_set_id: Option<TokenSetId>,
	pub side: Option<Side>,
}

impl OrderInfo {
	pub fn for_order(context: impl Into<String>, id: OrderId, trigger: Trigger) -> Self {
		Self {
			context: context.into(),
			trigger,
			id: Some(id),
			token_set_id: None,
			side: None,
		}
	}
}

/// The mutation a maker-wide reconciliation reacts to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MakerUpdate {
	/// The maker's fungible balance in `contract` changed; recheck buy-side
	/// fillability.
	BuyBalance { contract: Address },
	/// The maker's fungible approval may have changed. ERC-20 allowances are
	/// not fully trackable off-chain (spending reduces the allowance without
	/// an `Approval` event), so this triggers an on-chain refetch scoped to
	/// either an explicit operator or every conduit of an order kind.
	BuyApproval {
		contract: Address,
		operator: Option<Address>,
		order_kind: Option<OrderKind>,
	},
	/// The maker's balance of one NFT changed; recheck sell-side fillability.
	SellBalance { contract: Address, token_id: U256 },
	/// The maker's NFT approval for `operator` flipped.
	SellApproval {
		contract: Address,
		operator: Address,
		approved: bool,
	},
	/// Master-nonce bump: cancel all open orders with `nonce < min_nonce`.
	/// `side == None` means the bump applies across both sides.
	NonceCancel {
		order_kind: OrderKind,
		min_nonce: U256,
		side: Option<Side>,
	},
	/// Specific nonces were invalidated.
	Nonces {
		order_kind: OrderKind,
		nonces: Vec<U256>,
	},
}

/// Payload of the maker-wide reconciler queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakerInfo {
	pub context: String,
	pub maker: Address,
	pub trigger: Trigger,
	pub data: MakerUpdate,
}

/// Best-effort bookkeeping for newly minted tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintInfo {
	pub contract: Address,
	pub token_id: U256,
}
