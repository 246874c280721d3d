//! ERC-20 transfer and approval logs feeding buy-side maker revalidation.
//!
//! Allowance values are deliberately not projected from `Approval` logs:
//! spending reduces an allowance without emitting one, so the stored
//! allowance is refreshed by the balance-sync collaborator and the handler
//! only schedules the recheck.

use alloy::{sol, sol_types::SolEvent};
use async_trait::async_trait;
use tracing::warn;

use indexer_types::{
	Address, EnhancedLog, FtTransferEvent, MakerInfo, MakerUpdate, OnChainData, TriggerKind,
};

use crate::{prim_log, trigger_from, EventHandler, HandlerContext, SyncError};

sol! {
	event Transfer(address indexed from, address indexed to, uint256 value);
	event Approval(address indexed owner, address indexed spender, uint256 value);
}

pub struct Erc20Handler;

fn buy_balance_info(maker: Address, contract: Address, log: &EnhancedLog) -> MakerInfo {
	MakerInfo {
		context: format!("buy-balance-{contract}-{maker}-{}", log.origin.tx_hash),
		maker,
		trigger: trigger_from(TriggerKind::BalanceChange, &log.origin),
		data: MakerUpdate::BuyBalance { contract },
	}
}

#[async_trait]
impl EventHandler for Erc20Handler {
	fn name(&self) -> &'static str {
		"erc20"
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

			// Three topics distinguishes the ERC-20 shape from the ERC-721
			// transfer, which shares the signature hash.
			if topic0 == Transfer::SIGNATURE_HASH && log.log.topics.len() == 3 {
				let transfer = match Transfer::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(%contract, %err, "Undecodable ERC-20 transfer");
						continue;
					}
				};
				data.ft_transfer_events.push(FtTransferEvent {
					from: transfer.data.from,
					to: transfer.data.to,
					amount: transfer.data.value,
					origin: log.origin.clone(),
				});
				if transfer.data.from != Address::ZERO {
					data.maker_infos
						.push(buy_balance_info(transfer.data.from, contract, log));
				}
				if transfer.data.to != Address::ZERO {
					data.maker_infos
						.push(buy_balance_info(transfer.data.to, contract, log));
				}
			} else if topic0 == Approval::SIGNATURE_HASH && log.log.topics.len() == 3 {
				let approval = match Approval::decode_log(&prim_log(log)) {
					Ok(decoded) => decoded,
					Err(err) => {
						warn!(%contract, %err, "Undecodable ERC-20 approval");
						continue;
					}
				};
				data.maker_infos.push(MakerInfo {
					context: format!(
						"buy-approval-{contract}-{}-{}-{}",
						approval.data.spender, approval.data.owner, log.origin.tx_hash
					),
					maker: approval.data.owner,
					trigger: trigger_from(TriggerKind::ApprovalChange, &log.origin),
					data: MakerUpdate::BuyApproval {
						contract,
						operator: Some(approval.data.spender),
						order_kind: None,
					},
				});
			}
		}
		Ok(())
	}
}
