//! Exchange logs of the looks-rare protocol: taker-side fills, per-nonce
//! cancellations, and maker-wide minimum-nonce bumps.

use alloy::{sol, sol_types::SolEvent};
use async_trait::async_trait;
use tracing::{debug, warn};

use indexer_types::{
	order_id, Address, BulkCancelEvent, EnhancedLog, FillEvent, MakerInfo, MakerUpdate,
	NonceCancelEvent, OnChainData, OrderInfo, OrderKind, Side, TriggerKind, U256,
};

use crate::{prim_log, trigger_from, EventHandler, HandlerContext, SyncError};

sol! {
	event CancelAllOrders(address indexed user, uint256 newMinNonce);
	event CancelMultipleOrders(address indexed user, uint256[] orderNonces);
	event TakerAsk(bytes32 orderHash, uint256 orderNonce, address indexed taker, address indexed maker, address indexed strategy, address currency, address collection, uint256 tokenId, uint256 amount, uint256 price);
	event TakerBid(bytes32 orderHash, uint256 orderNonce, address indexed taker, address indexed maker, address indexed strategy, address currency, address collection, uint256 tokenId, uint256 amount, uint256 price);
}

pub struct LooksRareHandler {
	exchange: Address,
}

impl LooksRareHandler {
	pub fn new(exchange: Address) -> Self {
		Self { exchange }
	}

	#[allow(clippy::too_many_arguments)]
	async fn push_fill(
		&self,
		data: &mut OnChainData,
		ctx: &HandlerContext,
		log: &EnhancedLog,
		order_hash: [u8; 32],
		side: Side,
		maker: Address,
		taker: Address,
		currency: Address,
		collection: Address,
		token_id: U256,
		amount: U256,
		total_price: U256,
	) {
		let amount = if amount.is_zero() {
			U256::from(1)
		} else {
			amount
		};
		let currency_price = total_price / amount;

		// No native price, no fill. Price integrity is a hard invariant.
		let Some(price) = ctx
			.price_oracle
			.get_native_price(currency, currency_price, log.origin.timestamp)
			.await
		else {
			debug!(%currency, "Dropping fill with unresolvable native price");
			return;
		};

		let id = order_id(OrderKind::LooksRare, &[&order_hash]);
		let attribution = ctx
			.attribution
			.resolve(log.origin.tx_hash, OrderKind::LooksRare, Some(id))
			.await;

		data.fill_events.push(FillEvent {
			order_kind: OrderKind::LooksRare,
			order_id: id,
			order_side: side,
			maker,
			taker: attribution.taker.unwrap_or(taker),
			price: price.native_price,
			currency,
			currency_price,
			usd_price: price.usd_price,
			contract: collection,
			token_id,
			amount,
			order_source: attribution.order_source,
			fill_source: attribution.fill_source,
			aggregator_source: attribution.aggregator_source,
			origin: log.origin.clone(),
		});
		data.order_infos.push(OrderInfo::for_order(
			format!("sale-{id}-{}", log.origin.tx_hash),
			id,
			trigger_from(TriggerKind::Sale, &log.origin),
		));
	}
}

#[async_trait]
impl EventHandler for LooksRareHandler {
	fn name(&self) -> &'static str {
		"looks-rare"
	}

	async fn handle(
		&self,
		logs: &[EnhancedLog],
		data: &mut OnChainData,
		ctx: &HandlerContext,
	) -> Result<(), SyncError> {
		for log in logs {
			if log.log.address != self.exchange {
				continue;
			}
			let Some(topic0) = log.topic0() else {
				continue;
			};

			if topic0 == TakerAsk::SIGNATURE_HASH {
				// The taker sold into the maker's bid.
				let event = match TakerAsk::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(%err, "Undecodable taker-ask");
						continue;
					}
				};
				self.push_fill(
					data,
					ctx,
					log,
					event.data.orderHash.0,
					Side::Buy,
					event.data.maker,
					event.data.taker,
					event.data.currency,
					event.data.collection,
					event.data.tokenId,
					event.data.amount,
					event.data.price,
				)
				.await;
			} else if topic0 == TakerBid::SIGNATURE_HASH {
				// The taker bought the maker's listing.
				let event = match TakerBid::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(%err, "Undecodable taker-bid");
						continue;
					}
				};
				self.push_fill(
					data,
					ctx,
					log,
					event.data.orderHash.0,
					Side::Sell,
					event.data.maker,
					event.data.taker,
					event.data.currency,
					event.data.collection,
					event.data.tokenId,
					event.data.amount,
					event.data.price,
				)
				.await;
			} else if topic0 == CancelAllOrders::SIGNATURE_HASH {
				let event = match CancelAllOrders::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(%err, "Undecodable cancel-all");
						continue;
					}
				};
				// Nonces are shared across sides on this exchange.
				data.bulk_cancel_events.push(BulkCancelEvent {
					order_kind: OrderKind::LooksRare,
					maker: event.data.user,
					min_nonce: event.data.newMinNonce,
					side: Side::Sell,
					across_all: true,
					origin: log.origin.clone(),
				});
				data.maker_infos.push(MakerInfo {
					context: format!(
						"nonce-cancel-{}-{}-{}",
						event.data.user, event.data.newMinNonce, log.origin.tx_hash
					),
					maker: event.data.user,
					trigger: trigger_from(TriggerKind::Cancel, &log.origin),
					data: MakerUpdate::NonceCancel {
						order_kind: OrderKind::LooksRare,
						min_nonce: event.data.newMinNonce,
						side: None,
					},
				});
			} else if topic0 == CancelMultipleOrders::SIGNATURE_HASH {
				let event = match CancelMultipleOrders::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(%err, "Undecodable cancel-multiple");
						continue;
					}
				};
				for (index, nonce) in event.data.orderNonces.iter().enumerate() {
					let mut origin = log.origin.clone();
					origin.batch_index = index as u64 + 1;
					data.nonce_cancel_events.push(NonceCancelEvent {
						order_kind: OrderKind::LooksRare,
						maker: event.data.user,
						nonce: *nonce,
						origin,
					});
				}
				data.maker_infos.push(MakerInfo {
					context: format!(
						"nonces-{}-{}-{}",
						event.data.user, log.origin.tx_hash, log.origin.log_index
					),
					maker: event.data.user,
					trigger: trigger_from(TriggerKind::Cancel, &log.origin),
					data: MakerUpdate::Nonces {
						order_kind: OrderKind::LooksRare,
						nonces: event.data.orderNonces.clone(),
					},
				});
			}
		}
		Ok(())
	}
}
