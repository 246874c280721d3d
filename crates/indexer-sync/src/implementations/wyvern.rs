//! Exchange logs of the wyvern protocol.
//!
//! The orders-matched log carries no token information at all, so every fill
//! must be associated with the NFT transfer log immediately preceding it in
//! the same transaction. A match without such a transfer cannot be attributed
//! to a token and is skipped.

use alloy::{sol, sol_types::SolEvent};
use async_trait::async_trait;
use tracing::{debug, warn};

use indexer_types::{
	order_id, Address, CancelEvent, EnhancedLog, FillEvent, OnChainData, OrderInfo, OrderKind,
	Side, TriggerKind, U256,
};

use crate::{prim_log, trigger_from, EventHandler, HandlerContext, SyncError};

sol! {
	event OrdersMatched(bytes32 buyHash, bytes32 sellHash, address indexed maker, address indexed taker, uint256 price, bytes32 indexed metadata);
	event OrderCancelled(bytes32 indexed hash);

	event Erc721Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
	event Erc1155TransferSingle(address indexed operator, address indexed from, address indexed to, uint256 id, uint256 value);
}

/// A decoded NFT movement, used only for fill association.
struct AssociatedTransfer {
	contract: Address,
	from: Address,
	token_id: U256,
	amount: U256,
}

pub struct WyvernHandler {
	exchange: Address,
}

impl WyvernHandler {
	pub fn new(exchange: Address) -> Self {
		Self { exchange }
	}

	/// The closest NFT transfer strictly before `position` in the
	/// transaction's log list.
	fn preceding_transfer(logs: &[EnhancedLog], position: usize) -> Option<AssociatedTransfer> {
		logs[..position].iter().rev().find_map(|log| {
			let topic0 = log.topic0()?;
			if topic0 == Erc721Transfer::SIGNATURE_HASH && log.log.topics.len() == 4 {
				let transfer = Erc721Transfer::decode_log(&prim_log(log)).ok()?;
				Some(AssociatedTransfer {
					contract: log.log.address,
					from: transfer.data.from,
					token_id: transfer.data.tokenId,
					amount: U256::from(1),
				})
			} else if topic0 == Erc1155TransferSingle::SIGNATURE_HASH {
				let transfer = Erc1155TransferSingle::decode_log(&prim_log(log)).ok()?;
				Some(AssociatedTransfer {
					contract: log.log.address,
					from: transfer.data.from,
					token_id: transfer.data.id,
					amount: transfer.data.value,
				})
			} else {
				None
			}
		})
	}
}

#[async_trait]
impl EventHandler for WyvernHandler {
	fn name(&self) -> &'static str {
		"wyvern"
	}

	async fn handle(
		&self,
		logs: &[EnhancedLog],
		data: &mut OnChainData,
		ctx: &HandlerContext,
	) -> Result<(), SyncError> {
		for (position, log) in logs.iter().enumerate() {
			if log.log.address != self.exchange {
				continue;
			}
			let Some(topic0) = log.topic0() else {
				continue;
			};

			if topic0 == OrdersMatched::SIGNATURE_HASH {
				let event = match OrdersMatched::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(%err, "Undecodable orders-matched");
						continue;
					}
				};
				let Some(transfer) = Self::preceding_transfer(logs, position) else {
					warn!(tx = %log.origin.tx_hash, "Orders-matched without a preceding NFT transfer");
					continue;
				};

				// The maker moved the NFT out: their listing was filled.
				// Otherwise the maker's bid was hit.
				let (side, order_hash) = if transfer.from == event.data.maker {
					(Side::Sell, event.data.sellHash.0)
				} else {
					(Side::Buy, event.data.buyHash.0)
				};

				// Settlement currency is not in the log; the protocol trades
				// native currency through this path.
				let Some(price) = ctx
					.price_oracle
					.get_native_price(Address::ZERO, event.data.price, log.origin.timestamp)
					.await
				else {
					debug!("Dropping fill with unresolvable native price");
					continue;
				};

				let id = order_id(OrderKind::Wyvern, &[&order_hash]);
				let attribution = ctx
					.attribution
					.resolve(log.origin.tx_hash, OrderKind::Wyvern, Some(id))
					.await;

				data.fill_events.push(FillEvent {
					order_kind: OrderKind::Wyvern,
					order_id: id,
					order_side: side,
					maker: event.data.maker,
					taker: attribution.taker.unwrap_or(event.data.taker),
					price: price.native_price,
					currency: Address::ZERO,
					currency_price: event.data.price,
					usd_price: price.usd_price,
					contract: transfer.contract,
					token_id: transfer.token_id,
					amount: transfer.amount,
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
			} else if topic0 == OrderCancelled::SIGNATURE_HASH {
				let event = match OrderCancelled::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(%err, "Undecodable order-cancelled");
						continue;
					}
				};
				let id = order_id(OrderKind::Wyvern, &[&event.data.hash.0]);
				data.cancel_events.push(CancelEvent {
					order_kind: OrderKind::Wyvern,
					order_id: id,
					origin: log.origin.clone(),
				});
				data.order_infos.push(OrderInfo::for_order(
					format!("cancel-{id}-{}", log.origin.tx_hash),
					id,
					trigger_from(TriggerKind::Cancel, &log.origin),
				));
			}
		}
		Ok(())
	}
}
