//! Adapter for the original punks marketplace contract.
//!
//! Orders live entirely on chain: a listing is created by an offer log and
//! repriced or withdrawn by later logs for the same token. At most one active
//! listing exists per token id, so the deterministic id is derived from the
//! side and token id alone and later logs reprice the same record in place.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use indexer_types::{
	Address, ApprovalStatus, OrderKind, OrderPayload, OrderRecord, OrderingKey, Side, TokenSetId,
	TriggerKind, B256, U256,
};

use crate::common::{
	check_sell_fillability, classify_stored, merge_raw_data, order_id, terminated_after,
	StoredDisposition,
};
use crate::{AdapterContext, OrderAdapter, OrderbookError, SaveResult, SaveStatus};

#[derive(Debug, Clone, Deserialize)]
struct PunksOrderParams {
	maker: Address,
	side: Side,
	token_id: U256,
	/// Listing price in the native currency. Punks trade in native only.
	price: U256,
	/// Private listing: only this address may buy.
	taker: Option<Address>,
	tx_hash: B256,
	tx_timestamp: u64,
	tx_block: u64,
	log_index: u64,
}

pub struct Punks {
	contract: Address,
}

impl Punks {
	pub fn new(contract: Address) -> Self {
		Self { contract }
	}
}

#[async_trait]
impl OrderAdapter for Punks {
	fn kind(&self) -> OrderKind {
		OrderKind::Punks
	}

	async fn save(
		&self,
		payload: &OrderPayload,
		ctx: &AdapterContext,
	) -> Result<SaveResult, OrderbookError> {
		let params: PunksOrderParams = match serde_json::from_value(payload.data.clone()) {
			Ok(params) => params,
			Err(err) => {
				debug!(%err, "Unparseable punks payload");
				return Ok(SaveResult::rejected(SaveStatus::Invalid));
			}
		};

		// Bids are escrowed separately and not indexed through this path.
		if params.side != Side::Sell {
			return Ok(SaveResult::rejected(SaveStatus::UnsupportedSide));
		}

		let id = order_id(
			OrderKind::Punks,
			&[b"sell", &params.token_id.to_be_bytes::<32>()],
		);
		let incoming_key = OrderingKey::new(params.tx_block, params.log_index);

		if terminated_after(ctx.store.as_ref(), id, incoming_key).await? {
			return Ok(SaveResult::of(id, SaveStatus::Redundant));
		}

		let disposition = classify_stored(
			ctx.store.as_ref(),
			id,
			Some(incoming_key),
			params.tx_timestamp,
		)
		.await?;

		let (fillability_status, _) = check_sell_fillability(
			ctx.store.as_ref(),
			params.maker,
			self.contract,
			params.token_id,
			U256::from(1),
			None,
		)
		.await?;

		let token_set_id = TokenSetId::SingleToken {
			contract: self.contract,
			token_id: params.token_id,
		};
		ctx.store.save_token_set(token_set_id.clone()).await?;

		let record = OrderRecord {
			id,
			kind: OrderKind::Punks,
			side: Side::Sell,
			fillability_status,
			// The punk is escrowed by the marketplace contract itself.
			approval_status: ApprovalStatus::Approved,
			token_set_id,
			maker: params.maker,
			taker: params.taker.unwrap_or(Address::ZERO),
			price: params.price,
			value: params.price,
			currency: Address::ZERO,
			currency_price: params.price,
			currency_value: params.price,
			quantity_remaining: U256::from(1),
			nonce: None,
			valid_from: params.tx_timestamp,
			valid_until: None,
			fee_bps: 0,
			fee_breakdown: Vec::new(),
			missing_royalties: Vec::new(),
			conduit: None,
			source: payload.metadata.source.clone(),
			raw_data: payload.data.clone(),
			block_number: Some(params.tx_block),
			log_index: Some(params.log_index),
			bundle_legs: Vec::new(),
		};

		match disposition {
			StoredDisposition::Superseded | StoredDisposition::Exists => {
				return Ok(SaveResult::of(id, SaveStatus::Redundant));
			}
			StoredDisposition::New => {
				if !ctx.store.insert_order_if_absent(record).await? {
					return Ok(SaveResult::of(id, SaveStatus::AlreadyExists));
				}
				ctx.trigger_reconciliation(id, TriggerKind::NewOrder).await?;
			}
			StoredDisposition::Reprice(stored) => {
				// A causally newer offer log may reopen a filled listing:
				// that is a fresh listing by the new owner.
				let mut record = record;
				record.raw_data = merge_raw_data(&stored.raw_data, &record.raw_data);
				ctx.store.update_order(record).await?;
				ctx.trigger_reconciliation(id, TriggerKind::Reprice).await?;
			}
		}

		Ok(SaveResult::of(id, SaveStatus::Success))
	}
}
