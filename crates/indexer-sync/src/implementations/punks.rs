//! Marketplace logs of the punks contract.
//!
//! Listings live on chain: an offer log creates or reprices the listing (the
//! adapter receives it as a raw order payload), a buy settles it, and a
//! no-longer-for-sale log withdraws it. The offer log does not name the
//! maker, so the current owner is looked up from the token cache.

use alloy::{sol, sol_types::SolEvent};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use indexer_types::{
	order_id, Address, CancelEvent, ContractKind, EnhancedLog, FillEvent, MintInfo,
	NftTransferEvent, OnChainData, OrderInfo, OrderKind, OrderMetadata, OrderPayload, Side,
	TriggerKind, U256,
};

use crate::{prim_log, trigger_from, EventHandler, HandlerContext, SyncError};

sol! {
	event Assign(address indexed to, uint256 punkIndex);
	event PunkTransfer(address indexed from, address indexed to, uint256 punkIndex);
	event PunkOffered(uint256 indexed punkIndex, uint256 minValue, address indexed toAddress);
	event PunkBought(uint256 indexed punkIndex, uint256 value, address indexed fromAddress, address indexed toAddress);
	event PunkNoLongerForSale(uint256 indexed punkIndex);
}

pub struct PunksHandler {
	contract: Address,
}

impl PunksHandler {
	pub fn new(contract: Address) -> Self {
		Self { contract }
	}

	fn listing_id(token_id: U256) -> indexer_types::OrderId {
		// Must line up with the adapter's derivation: one listing per punk.
		order_id(OrderKind::Punks, &[b"sell", &token_id.to_be_bytes::<32>()])
	}

	fn push_transfer(&self, data: &mut OnChainData, log: &EnhancedLog, from: Address, to: Address, token_id: U256) {
		data.nft_transfer_events.push(NftTransferEvent {
			kind: ContractKind::Erc721,
			from,
			to,
			token_id,
			amount: U256::from(1),
			origin: log.origin.clone(),
		});
		if from == Address::ZERO {
			data.mint_infos.push(MintInfo {
				contract: self.contract,
				token_id,
			});
		}
	}
}

#[async_trait]
impl EventHandler for PunksHandler {
	fn name(&self) -> &'static str {
		"punks"
	}

	async fn handle(
		&self,
		logs: &[EnhancedLog],
		data: &mut OnChainData,
		ctx: &HandlerContext,
	) -> Result<(), SyncError> {
		for log in logs {
			if log.log.address != self.contract {
				continue;
			}
			let Some(topic0) = log.topic0() else {
				continue;
			};

			if topic0 == PunkOffered::SIGNATURE_HASH {
				let event = match PunkOffered::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(%err, "Undecodable punk-offered");
						continue;
					}
				};
				// The log does not carry the maker; the owner does the
				// offering.
				let owner = ctx
					.store
					.get_token(self.contract, event.data.punkIndex)
					.await?
					.and_then(|token| token.owner);
				let Some(maker) = owner else {
					warn!(token_id = %event.data.punkIndex, "Punk offered by unknown owner");
					continue;
				};
				let taker = (event.data.toAddress != Address::ZERO)
					.then_some(event.data.toAddress);
				data.orders.push(OrderPayload {
					kind: OrderKind::Punks,
					data: json!({
						"maker": maker,
						"side": "sell",
						"token_id": event.data.punkIndex,
						"price": event.data.minValue,
						"taker": taker,
						"tx_hash": log.origin.tx_hash,
						"tx_timestamp": log.origin.timestamp,
						"tx_block": log.origin.block,
						"log_index": log.origin.log_index,
					}),
					metadata: OrderMetadata::default(),
				});
			} else if topic0 == PunkBought::SIGNATURE_HASH {
				let event = match PunkBought::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(%err, "Undecodable punk-bought");
						continue;
					}
				};
				let Some(price) = ctx
					.price_oracle
					.get_native_price(Address::ZERO, event.data.value, log.origin.timestamp)
					.await
				else {
					debug!("Dropping fill with unresolvable native price");
					continue;
				};

				let id = Self::listing_id(event.data.punkIndex);
				let attribution = ctx
					.attribution
					.resolve(log.origin.tx_hash, OrderKind::Punks, Some(id))
					.await;

				data.fill_events.push(FillEvent {
					order_kind: OrderKind::Punks,
					order_id: id,
					order_side: Side::Sell,
					maker: event.data.fromAddress,
					taker: attribution.taker.unwrap_or(event.data.toAddress),
					price: price.native_price,
					currency: Address::ZERO,
					currency_price: event.data.value,
					usd_price: price.usd_price,
					contract: self.contract,
					token_id: event.data.punkIndex,
					amount: U256::from(1),
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
				self.push_transfer(
					data,
					log,
					event.data.fromAddress,
					event.data.toAddress,
					event.data.punkIndex,
				);
			} else if topic0 == PunkNoLongerForSale::SIGNATURE_HASH {
				let event = match PunkNoLongerForSale::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(%err, "Undecodable punk-no-longer-for-sale");
						continue;
					}
				};
				let id = Self::listing_id(event.data.punkIndex);
				data.cancel_events.push(CancelEvent {
					order_kind: OrderKind::Punks,
					order_id: id,
					origin: log.origin.clone(),
				});
				data.order_infos.push(OrderInfo::for_order(
					format!("cancel-{id}-{}", log.origin.tx_hash),
					id,
					trigger_from(TriggerKind::Cancel, &log.origin),
				));
			} else if topic0 == PunkTransfer::SIGNATURE_HASH {
				let event = match PunkTransfer::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(%err, "Undecodable punk-transfer");
						continue;
					}
				};
				self.push_transfer(
					data,
					log,
					event.data.from,
					event.data.to,
					event.data.punkIndex,
				);
			} else if topic0 == Assign::SIGNATURE_HASH {
				let event = match Assign::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(%err, "Undecodable punk assign");
						continue;
					}
				};
				self.push_transfer(data, log, Address::ZERO, event.data.to, event.data.punkIndex);
			}
		}
		Ok(())
	}
}
