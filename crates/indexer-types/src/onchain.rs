//! Raw chain input and the aggregated per-batch output bundle.

use alloy::primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

use crate::{
	BulkCancelEvent, CancelEvent, EventOrigin, FillEvent, FtTransferEvent, MakerInfo, MintInfo,
	NftApprovalEvent, NftTransferEvent, NonceCancelEvent, OrderInfo, OrderKind,
};

/// An undecoded chain log as delivered by the log-fetch collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLog {
	pub address: Address,
	pub topics: Vec<B256>,
	pub data: Bytes,
}

/// A raw log enriched with its on-chain position and block context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedLog {
	pub log: RawLog,
	pub origin: EventOrigin,
}

impl EnhancedLog {
	pub fn topic0(&self) -> Option<B256> {
		self.log.topics.first().copied()
	}
}

/// A raw order payload bound for a protocol adapter, together with ingestion
/// metadata. The payload stays opaque until the adapter deserializes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPayload {
	pub kind: OrderKind,
	pub data: serde_json::Value,
	pub metadata: OrderMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderMetadata {
	/// Attribution source (marketplace frontend domain), when known.
	pub source: Option<String>,
}

/// Everything the protocol handlers produced for one unit of work (all logs
/// of a transaction range), merged into a single bundle for the persistence
/// pipeline. Plain accumulation; no cross-protocol logic lives here.
#[derive(Debug, Clone, Default)]
pub struct OnChainData {
	pub fill_events: Vec<FillEvent>,
	pub cancel_events: Vec<CancelEvent>,
	pub bulk_cancel_events: Vec<BulkCancelEvent>,
	pub nonce_cancel_events: Vec<NonceCancelEvent>,
	pub nft_approval_events: Vec<NftApprovalEvent>,
	pub nft_transfer_events: Vec<NftTransferEvent>,
	pub ft_transfer_events: Vec<FtTransferEvent>,

	/// Raw orders recovered from chain activity, bound for the adapters.
	pub orders: Vec<OrderPayload>,
	/// By-id reconciliation triggers.
	pub order_infos: Vec<OrderInfo>,
	/// Maker-wide reconciliation triggers.
	pub maker_infos: Vec<MakerInfo>,
	/// Best-effort mint bookkeeping.
	pub mint_infos: Vec<MintInfo>,
}

impl OnChainData {
	pub fn new() -> Self {
		Self::default()
	}

	/// Folds another bundle into this one.
	pub fn merge(&mut self, other: OnChainData) {
		self.fill_events.extend(other.fill_events);
		self.cancel_events.extend(other.cancel_events);
		self.bulk_cancel_events.extend(other.bulk_cancel_events);
		self.nonce_cancel_events.extend(other.nonce_cancel_events);
		self.nft_approval_events.extend(other.nft_approval_events);
		self.nft_transfer_events.extend(other.nft_transfer_events);
		self.ft_transfer_events.extend(other.ft_transfer_events);
		self.orders.extend(other.orders);
		self.order_infos.extend(other.order_infos);
		self.maker_infos.extend(other.maker_infos);
		self.mint_infos.extend(other.mint_infos);
	}

	pub fn is_empty(&self) -> bool {
		self.fill_events.is_empty()
			&& self.cancel_events.is_empty()
			&& self.bulk_cancel_events.is_empty()
			&& self.nonce_cancel_events.is_empty()
			&& self.nft_approval_events.is_empty()
			&& self.nft_transfer_events.is_empty()
			&& self.ft_transfer_events.is_empty()
			&& self.orders.is_empty()
			&& self.order_infos.is_empty()
			&& self.maker_infos.is_empty()
			&& self.mint_infos.is_empty()
	}
}
