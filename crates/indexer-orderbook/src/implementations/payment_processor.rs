//! Adapter for payment-processor style signed orders.
//!
//! The protocol carries two replay-protection counters: a per-order nonce and
//! a per-maker master nonce baked into the signature. Bumping the master
//! nonce on chain invalidates every order signed under a lower value, so the
//! record stores the signing-time master nonce in its `nonce` field and the
//! maker-wide reconciler cancels by `nonce < min_nonce` on bump.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use indexer_types::{
	Address, FeeEntry, FeeKind, OrderKind, OrderPayload, OrderRecord, Side, TokenSetId,
	TriggerKind, U256,
};

use crate::common::{check_buy_fillability, check_sell_fillability, order_id};
use crate::{AdapterContext, OrderAdapter, OrderbookError, SaveResult, SaveStatus};

/// Signature validation walks candidate master nonces downward from the
/// last observed value, because the local view can lag behind (or run ahead
/// of) the chain when bump events arrive out of order. The walk is a
/// deliberately preserved heuristic with a bounded depth.
const MASTER_NONCE_LOOKBACK: u64 = 16;

#[derive(Debug, Clone, Deserialize)]
struct PaymentProcessorOrderParams {
	side: Side,
	maker: Address,
	/// Per-order replay nonce, unique per maker.
	nonce: U256,
	/// Master nonce the signature commits to.
	master_nonce: U256,
	token: Address,
	token_id: U256,
	amount: U256,
	price: U256,
	/// `Address::ZERO` for native-currency orders.
	coin: Address,
	/// Unix seconds; 0 means unbounded.
	expiration: u64,
	marketplace: Option<Address>,
	marketplace_fee_bps: Option<u64>,
	signature: Option<serde_json::Value>,
}

/// Outcome of the signature / master-nonce reconciliation.
enum MasterNonceCheck {
	Valid,
	/// Signed under a master nonce that has since been bumped past.
	Stale,
	Unverifiable,
}

pub struct PaymentProcessor {
	exchange: Address,
	weth: Address,
}

impl PaymentProcessor {
	pub fn new(exchange: Address, weth: Address) -> Self {
		Self { exchange, weth }
	}

	/// Finds which candidate master nonce the signature validates under,
	/// walking downward from the last observed value. A match below the
	/// current value means the order predates a bump and is dead; no match
	/// within the lookback window means the signature cannot be verified. A
	/// signing nonce above the observed value means the local view is behind
	/// the chain and is fast-forwarded.
	async fn check_master_nonce(
		&self,
		params: &PaymentProcessorOrderParams,
		ctx: &AdapterContext,
	) -> Result<MasterNonceCheck, OrderbookError> {
		let current = ctx.store.master_nonce(params.maker).await?;

		if params.master_nonce > current {
			ctx.store
				.set_master_nonce(params.maker, params.master_nonce)
				.await?;
			return Ok(MasterNonceCheck::Valid);
		}

		let mut candidate = current;
		for step in 0..=MASTER_NONCE_LOOKBACK {
			if params.master_nonce == candidate {
				return Ok(if step == 0 {
					MasterNonceCheck::Valid
				} else {
					MasterNonceCheck::Stale
				});
			}
			if candidate.is_zero() {
				break;
			}
			candidate -= U256::from(1);
		}
		Ok(MasterNonceCheck::Unverifiable)
	}
}

#[async_trait]
impl OrderAdapter for PaymentProcessor {
	fn kind(&self) -> OrderKind {
		OrderKind::PaymentProcessor
	}

	async fn save(
		&self,
		payload: &OrderPayload,
		ctx: &AdapterContext,
	) -> Result<SaveResult, OrderbookError> {
		let params: PaymentProcessorOrderParams =
			match serde_json::from_value(payload.data.clone()) {
				Ok(params) => params,
				Err(err) => {
					debug!(%err, "Unparseable payment-processor payload");
					return Ok(SaveResult::rejected(SaveStatus::Invalid));
				}
			};

		if params.side == Side::Bundle {
			return Ok(SaveResult::rejected(SaveStatus::UnsupportedSide));
		}

		let id = order_id(
			OrderKind::PaymentProcessor,
			&[
				params.maker.as_slice(),
				&params.nonce.to_be_bytes::<32>(),
				params.token.as_slice(),
				&params.token_id.to_be_bytes::<32>(),
			],
		);

		let now = ctx.now();
		if params.expiration != 0 && params.expiration <= now {
			return Ok(SaveResult::of(id, SaveStatus::Expired));
		}

		// Sells settle in native, buys in wrapped native; anything else is
		// unsupported and force-cancels a pre-existing record.
		let currency_ok = match params.side {
			Side::Sell => params.coin == Address::ZERO,
			Side::Buy => params.coin == self.weth,
			Side::Bundle => false,
		};
		if !currency_ok {
			if ctx.store.get_order(id).await?.is_some() {
				ctx.store.cancel_order(id).await?;
				ctx.trigger_reconciliation(id, TriggerKind::Cancel).await?;
			}
			return Ok(SaveResult::of(id, SaveStatus::UnsupportedCurrency));
		}

		if params.signature.as_ref().map_or(true, |s| s.is_null()) {
			return Ok(SaveResult::of(id, SaveStatus::InvalidSignature));
		}
		match self.check_master_nonce(&params, ctx).await? {
			MasterNonceCheck::Valid => {}
			MasterNonceCheck::Stale => return Ok(SaveResult::of(id, SaveStatus::Cancelled)),
			MasterNonceCheck::Unverifiable => {
				return Ok(SaveResult::of(id, SaveStatus::InvalidSignature));
			}
		}

		if ctx.store.get_order(id).await?.is_some() {
			return Ok(SaveResult::of(id, SaveStatus::AlreadyExists));
		}

		let quantity = if params.amount.is_zero() {
			U256::from(1)
		} else {
			params.amount
		};

		let fee_bps = params.marketplace_fee_bps.unwrap_or(0);
		if fee_bps > 10_000 {
			return Ok(SaveResult::of(id, SaveStatus::FeesTooHigh));
		}
		let total_fees = params
			.price
			.saturating_mul(U256::from(fee_bps))
			/ U256::from(10_000);
		let value = match params.side {
			Side::Buy => params.price.saturating_sub(total_fees),
			_ => params.price,
		};

		let token_set_id = TokenSetId::SingleToken {
			contract: params.token,
			token_id: params.token_id,
		};
		ctx.store.save_token_set(token_set_id.clone()).await?;

		let (fillability_status, approval_status) = match params.side {
			Side::Sell => {
				check_sell_fillability(
					ctx.store.as_ref(),
					params.maker,
					params.token,
					params.token_id,
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
					params.price.saturating_mul(quantity),
					Some(self.exchange),
				)
				.await?
			}
		};

		let fee_breakdown = match (params.marketplace, fee_bps) {
			(Some(recipient), bps) if bps > 0 => vec![FeeEntry {
				kind: FeeKind::Marketplace,
				recipient,
				bps,
			}],
			_ => Vec::new(),
		};

		let record = OrderRecord {
			id,
			kind: OrderKind::PaymentProcessor,
			side: params.side,
			fillability_status,
			approval_status,
			token_set_id,
			maker: params.maker,
			taker: Address::ZERO,
			price: params.price,
			value,
			currency: params.coin,
			currency_price: params.price,
			currency_value: value,
			quantity_remaining: quantity,
			// The signing-time master nonce; bulk cancels match on it.
			nonce: Some(params.master_nonce),
			valid_from: now,
			valid_until: (params.expiration != 0).then_some(params.expiration),
			fee_bps,
			fee_breakdown,
			missing_royalties: Vec::new(),
			conduit: Some(self.exchange),
			source: payload.metadata.source.clone(),
			raw_data: payload.data.clone(),
			block_number: None,
			log_index: None,
			bundle_legs: Vec::new(),
		};

		if !ctx.store.insert_order_if_absent(record).await? {
			return Ok(SaveResult::of(id, SaveStatus::AlreadyExists));
		}
		ctx.trigger_reconciliation(id, TriggerKind::NewOrder).await?;
		Ok(SaveResult::of(id, SaveStatus::Success))
	}
}
