//! Adapter for 0x-v4 style signed NFT orders.
//!
//! One adapter instance per asset flavor (ERC-721 and ERC-1155 orders share
//! the shape but differ in quantity semantics). Orders are signed off chain
//! and carry a per-maker nonce for replay protection; the payment token is
//! restricted per side: sells settle in the native currency, buys in the
//! wrapped native token (a buy escrowing native currency cannot be executed
//! by the exchange).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use indexer_types::{
	Address, FeeEntry, FeeKind, FillabilityStatus, OrderKind, OrderPayload, OrderRecord,
	OrderingKey, Side, TokenSetId, TriggerKind, U256,
};

use crate::common::{
	check_buy_fillability, check_sell_fillability, classify_stored, merge_raw_data, order_id,
	terminated_after, StoredDisposition,
};
use crate::{AdapterContext, OrderAdapter, OrderbookError, SaveResult, SaveStatus};

const MAX_FEE_BPS: u64 = 10_000;

#[derive(Debug, Clone, Deserialize)]
struct ZeroexV4OrderParams {
	/// 0 = sell (maker offers the NFT), 1 = buy (maker offers the currency).
	direction: u8,
	maker: Address,
	taker: Option<Address>,
	/// Unix seconds; 0 means unbounded.
	expiry: u64,
	nonce: U256,
	erc20_token: Address,
	erc20_token_amount: U256,
	#[serde(default)]
	fees: Vec<ZeroexV4Fee>,
	nft: Address,
	/// Absent for criteria (range or contract-wide) orders.
	nft_id: Option<U256>,
	/// Inclusive criteria bounds; both present for range orders.
	nft_id_range_start: Option<U256>,
	nft_id_range_end: Option<U256>,
	/// ERC-1155 quantity; absent for ERC-721 orders.
	nft_amount: Option<U256>,
	/// Opaque signature blob; validated by shape only at this layer.
	signature: Option<serde_json::Value>,
	tx_block: Option<u64>,
	log_index: Option<u64>,
	tx_timestamp: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct ZeroexV4Fee {
	recipient: Address,
	amount: U256,
}

pub struct ZeroexV4 {
	kind: OrderKind,
	/// Wrapped native token; the only supported buy-side payment token.
	weth: Address,
	/// Exchange contract; the operator the maker must have approved.
	exchange: Address,
}

impl ZeroexV4 {
	pub fn erc721(weth: Address, exchange: Address) -> Self {
		Self {
			kind: OrderKind::ZeroexV4Erc721,
			weth,
			exchange,
		}
	}

	pub fn erc1155(weth: Address, exchange: Address) -> Self {
		Self {
			kind: OrderKind::ZeroexV4Erc1155,
			weth,
			exchange,
		}
	}
}

#[async_trait]
impl OrderAdapter for ZeroexV4 {
	fn kind(&self) -> OrderKind {
		self.kind
	}

	async fn save(
		&self,
		payload: &OrderPayload,
		ctx: &AdapterContext,
	) -> Result<SaveResult, OrderbookError> {
		let params: ZeroexV4OrderParams = match serde_json::from_value(payload.data.clone()) {
			Ok(params) => params,
			Err(err) => {
				debug!(kind = %self.kind, %err, "Unparseable payload");
				return Ok(SaveResult::rejected(SaveStatus::Invalid));
			}
		};

		let side = match params.direction {
			0 => Side::Sell,
			1 => Side::Buy,
			_ => return Ok(SaveResult::rejected(SaveStatus::UnsupportedSide)),
		};

		let id = order_id(
			self.kind,
			&[
				params.maker.as_slice(),
				&params.nonce.to_be_bytes::<32>(),
				params.nft.as_slice(),
			],
		);

		let now = ctx.now();
		if params.expiry != 0 && params.expiry <= now {
			return Ok(SaveResult::of(id, SaveStatus::Expired));
		}

		// Payment-token restrictions per side. An existing record whose
		// currency turns out unsupported is force-cancelled instead of being
		// left fillable forever.
		let currency_ok = match side {
			Side::Sell => params.erc20_token == Address::ZERO,
			Side::Buy => params.erc20_token == self.weth,
			Side::Bundle => false,
		};
		if !currency_ok {
			if ctx.store.get_order(id).await?.is_some() {
				ctx.store.cancel_order(id).await?;
				ctx.trigger_reconciliation(id, TriggerKind::Cancel).await?;
			}
			return Ok(SaveResult::of(id, SaveStatus::UnsupportedPaymentToken));
		}

		if params
			.signature
			.as_ref()
			.map_or(true, |s| s.is_null())
		{
			return Ok(SaveResult::of(id, SaveStatus::InvalidSignature));
		}

		let quantity = match self.kind {
			OrderKind::ZeroexV4Erc1155 => params.nft_amount.unwrap_or(U256::from(1)),
			_ => U256::from(1),
		};
		if quantity.is_zero() {
			return Ok(SaveResult::of(id, SaveStatus::Invalid));
		}

		let price = params.erc20_token_amount;
		let total_fees: U256 = params
			.fees
			.iter()
			.fold(U256::ZERO, |acc, fee| acc.saturating_add(fee.amount));
		let fee_bps = if price.is_zero() {
			0
		} else {
			(total_fees.saturating_mul(U256::from(MAX_FEE_BPS)) / price)
				.try_into()
				.unwrap_or(u64::MAX)
		};
		if fee_bps > MAX_FEE_BPS {
			return Ok(SaveResult::of(id, SaveStatus::FeesTooHigh));
		}

		// For buys the acceptor receives price minus fees; for sells the
		// taker pays price plus fees on top.
		let value = match side {
			Side::Buy => price.saturating_sub(total_fees),
			_ => price,
		};

		// Same nonce, different price, still open: a competing order that
		// would be invalidated by filling this one.
		if ctx
			.store
			.nonce_in_use(self.kind, params.maker, params.nft, params.nonce, price)
			.await?
		{
			return Ok(SaveResult::of(id, SaveStatus::DuplicatedNonce));
		}

		// Criteria orders are buy-side only: a sell must name the exact token.
		let token_set_id = match (params.nft_id, params.nft_id_range_start, params.nft_id_range_end)
		{
			(Some(token_id), _, _) => TokenSetId::SingleToken {
				contract: params.nft,
				token_id,
			},
			(None, Some(start), Some(end)) if side == Side::Buy && start <= end => {
				TokenSetId::TokenRange {
					contract: params.nft,
					start_token_id: start,
					end_token_id: end,
				}
			}
			(None, None, None) if side == Side::Buy => TokenSetId::ContractWide {
				contract: params.nft,
			},
			_ => return Ok(SaveResult::of(id, SaveStatus::InvalidTokenSet)),
		};
		ctx.store.save_token_set(token_set_id.clone()).await?;

		let (fillability_status, approval_status) = match side {
			Side::Sell => {
				check_sell_fillability(
					ctx.store.as_ref(),
					params.maker,
					params.nft,
					params.nft_id.unwrap_or(U256::ZERO),
					quantity,
					Some(self.exchange),
				)
				.await?
			}
			_ => {
				check_buy_fillability(
					ctx.store.as_ref(),
					params.maker,
					self.weth,
					price.saturating_mul(quantity),
					Some(self.exchange),
				)
				.await?
			}
		};

		let incoming_key = match (params.tx_block, params.log_index) {
			(Some(block), Some(log_index)) => Some(OrderingKey::new(block, log_index)),
			_ => None,
		};
		if let Some(key) = incoming_key {
			if terminated_after(ctx.store.as_ref(), id, key).await? {
				return Ok(SaveResult::of(id, SaveStatus::Redundant));
			}
		}

		let valid_from = params.tx_timestamp.unwrap_or(now);
		let disposition =
			classify_stored(ctx.store.as_ref(), id, incoming_key, valid_from).await?;

		let fee_breakdown = params
			.fees
			.iter()
			.map(|fee| FeeEntry {
				kind: FeeKind::Marketplace,
				recipient: fee.recipient,
				bps: if price.is_zero() {
					0
				} else {
					(fee.amount.saturating_mul(U256::from(MAX_FEE_BPS)) / price)
						.try_into()
						.unwrap_or(u64::MAX)
				},
			})
			.collect();

		let record = OrderRecord {
			id,
			kind: self.kind,
			side,
			fillability_status,
			approval_status,
			token_set_id,
			maker: params.maker,
			taker: params.taker.unwrap_or(Address::ZERO),
			price,
			value,
			currency: params.erc20_token,
			currency_price: price,
			currency_value: value,
			quantity_remaining: quantity,
			nonce: Some(params.nonce),
			valid_from,
			valid_until: (params.expiry != 0).then_some(params.expiry),
			fee_bps,
			fee_breakdown,
			missing_royalties: Vec::new(),
			conduit: Some(self.exchange),
			source: payload.metadata.source.clone(),
			raw_data: payload.data.clone(),
			block_number: params.tx_block,
			log_index: params.log_index,
			bundle_legs: Vec::new(),
		};

		match disposition {
			StoredDisposition::Superseded => Ok(SaveResult::of(id, SaveStatus::Redundant)),
			StoredDisposition::Exists => Ok(SaveResult::of(id, SaveStatus::AlreadyExists)),
			StoredDisposition::New => {
				if !ctx.store.insert_order_if_absent(record).await? {
					return Ok(SaveResult::of(id, SaveStatus::AlreadyExists));
				}
				ctx.trigger_reconciliation(id, TriggerKind::NewOrder).await?;
				Ok(SaveResult::of(id, SaveStatus::Success))
			}
			StoredDisposition::Reprice(stored) => {
				if stored.fillability_status.is_terminal() {
					return Ok(SaveResult::of(id, SaveStatus::Redundant));
				}
				let mut record = record;
				record.raw_data = merge_raw_data(&stored.raw_data, &record.raw_data);
				ctx.store.update_order(record).await?;
				ctx.trigger_reconciliation(id, TriggerKind::Reprice).await?;
				Ok(SaveResult::of(id, SaveStatus::Success))
			}
		}
	}
}
