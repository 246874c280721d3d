//! ERC-721 transfer and operator-approval logs.
//!
//! Transfers feed the balance/ownership bookkeeping and trigger sell-side
//! maker revalidation for both parties; mints (`from == 0x0`) additionally
//! produce best-effort mint bookkeeping. `ApprovalForAll` covers both ERC-721
//! and ERC-1155 contracts, so it is handled here once.

use alloy::{sol, sol_types::SolEvent};
use async_trait::async_trait;
use tracing::warn;

use indexer_types::{
	Address, ContractKind, EnhancedLog, MakerInfo, MakerUpdate, MintInfo, NftApprovalEvent,
	NftTransferEvent, OnChainData, TriggerKind, U256,
};

use crate::{prim_log, trigger_from, EventHandler, HandlerContext, SyncError};

sol! {
	event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
	event ApprovalForAll(address indexed owner, address indexed operator, bool approved);
}

pub struct Erc721Handler;

/// Sell-side balance revalidation for one party of a transfer.
pub(crate) fn sell_balance_info(
	maker: Address,
	contract: Address,
	token_id: U256,
	log: &EnhancedLog,
) -> MakerInfo {
	MakerInfo {
		context: format!(
			"sell-balance-{contract}-{token_id}-{maker}-{}",
			log.origin.tx_hash
		),
		maker,
		trigger: trigger_from(TriggerKind::BalanceChange, &log.origin),
		data: MakerUpdate::SellBalance { contract, token_id },
	}
}

#[async_trait]
impl EventHandler for Erc721Handler {
	fn name(&self) -> &'static str {
		"erc721"
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
			let contract = log.log.address;

			// The ERC-20 transfer signature hashes identically; the token id
			// being indexed is what distinguishes the ERC-721 shape.
			if topic0 == Transfer::SIGNATURE_HASH && log.log.topics.len() == 4 {
				let transfer = match Transfer::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(%contract, %err, "Undecodable ERC-721 transfer");
						continue;
					}
				};
				data.nft_transfer_events.push(NftTransferEvent {
					kind: ContractKind::Erc721,
					from: transfer.data.from,
					to: transfer.data.to,
					token_id: transfer.data.tokenId,
					amount: U256::from(1),
					origin: log.origin.clone(),
				});
				if transfer.data.from == Address::ZERO {
					data.mint_infos.push(MintInfo {
						contract,
						token_id: transfer.data.tokenId,
					});
				} else {
					data.maker_infos.push(sell_balance_info(
						transfer.data.from,
						contract,
						transfer.data.tokenId,
						log,
					));
				}
				if transfer.data.to != Address::ZERO {
					data.maker_infos.push(sell_balance_info(
						transfer.data.to,
						contract,
						transfer.data.tokenId,
						log,
					));
				}
			} else if topic0 == ApprovalForAll::SIGNATURE_HASH {
				let approval = match ApprovalForAll::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(%contract, %err, "Undecodable approval-for-all");
						continue;
					}
				};
				data.nft_approval_events.push(NftApprovalEvent {
					owner: approval.data.owner,
					operator: approval.data.operator,
					approved: approval.data.approved,
					origin: log.origin.clone(),
				});
				data.maker_infos.push(MakerInfo {
					context: format!(
						"sell-approval-{contract}-{}-{}-{}",
						approval.data.operator, approval.data.owner, log.origin.tx_hash
					),
					maker: approval.data.owner,
					trigger: trigger_from(TriggerKind::ApprovalChange, &log.origin),
					data: MakerUpdate::SellApproval {
						contract,
						operator: approval.data.operator,
						approved: approval.data.approved,
					},
				});
			}
		}
		Ok(())
	}
}
