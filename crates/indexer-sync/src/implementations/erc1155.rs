//! ERC-1155 transfer logs. Batch transfers are expanded into one canonical
//! event per item with distinct batch indices.

use alloy::{sol, sol_types::SolEvent};
use async_trait::async_trait;
use tracing::warn;

use indexer_types::{
	Address, ContractKind, EnhancedLog, MintInfo, NftTransferEvent, OnChainData, U256,
};

use crate::implementations::erc721::sell_balance_info;
use crate::{prim_log, EventHandler, HandlerContext, SyncError};

sol! {
	event TransferSingle(address indexed operator, address indexed from, address indexed to, uint256 id, uint256 value);
	event TransferBatch(address indexed operator, address indexed from, address indexed to, uint256[] ids, uint256[] values);
}

pub struct Erc1155Handler;

impl Erc1155Handler {
	fn push_transfer(
		data: &mut OnChainData,
		log: &EnhancedLog,
		from: Address,
		to: Address,
		token_id: U256,
		amount: U256,
		batch_index: u64,
	) {
		let mut origin = log.origin.clone();
		origin.batch_index = batch_index;
		data.nft_transfer_events.push(NftTransferEvent {
			kind: ContractKind::Erc1155,
			from,
			to,
			token_id,
			amount,
			origin,
		});
		let contract = log.log.address;
		if from == Address::ZERO {
			data.mint_infos.push(MintInfo { contract, token_id });
		} else {
			data.maker_infos
				.push(sell_balance_info(from, contract, token_id, log));
		}
		if to != Address::ZERO {
			data.maker_infos
				.push(sell_balance_info(to, contract, token_id, log));
		}
	}
}

#[async_trait]
impl EventHandler for Erc1155Handler {
	fn name(&self) -> &'static str {
		"erc1155"
	}

	async fn handle(
		&self,
		logs: &[EnhancedLog],
		data: &mut OnChainData,
		_ctx: &HandlerContext,
	) -> Result<(), SyncError> {
		for log in logs {
			let Some(topic0) = log.topic0() else {
				continue;
			};
			if topic0 == TransferSingle::SIGNATURE_HASH {
				let transfer = match TransferSingle::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(contract = %log.log.address, %err, "Undecodable ERC-1155 transfer");
						continue;
					}
				};
				Self::push_transfer(
					data,
					log,
					transfer.data.from,
					transfer.data.to,
					transfer.data.id,
					transfer.data.value,
					1,
				);
			} else if topic0 == TransferBatch::SIGNATURE_HASH {
				let transfer = match TransferBatch::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(contract = %log.log.address, %err, "Undecodable ERC-1155 batch transfer");
						continue;
					}
				};
				if transfer.data.ids.len() != transfer.data.values.len() {
					warn!(contract = %log.log.address, "Mismatched batch transfer arrays");
					continue;
				}
				for (index, (token_id, amount)) in transfer
					.data
					.ids
					.iter()
					.zip(transfer.data.values.iter())
					.enumerate()
				{
					Self::push_transfer(
						data,
						log,
						transfer.data.from,
						transfer.data.to,
						*token_id,
						*amount,
						index as u64 + 1,
					);
				}
			}
		}
		Ok(())
	}
}
