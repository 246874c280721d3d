//! Per-batch aggregation of handler output.

use tracing::error;

use indexer_types::{EnhancedLog, OnChainData};

use crate::{EventHandler, HandlerContext};

/// Runs every enabled protocol handler over a batch of logs and merges their
/// output into one bundle. Logs are grouped per transaction and each
/// transaction's logs are handled sequentially in log-index order, so
/// intra-transaction ordering (a transfer preceding the fill that caused it)
/// is preserved. Handler errors are scoped to one handler on one
/// transaction: logged and skipped, never fatal to the batch.
pub struct Aggregator {
	handlers: Vec<Box<dyn EventHandler>>,
	ctx: HandlerContext,
}

impl Aggregator {
	pub fn new(ctx: HandlerContext) -> Self {
		Self {
			handlers: Vec::new(),
			ctx,
		}
	}

	pub fn register(mut self, handler: Box<dyn EventHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	/// Expects `logs` sorted by `(block, log_index)`, the order the chain
	/// transport delivers them in.
	pub async fn aggregate(&self, logs: &[EnhancedLog]) -> OnChainData {
		let mut data = OnChainData::new();
		for group in Self::group_by_tx(logs) {
			for handler in &self.handlers {
				let mut partial = OnChainData::new();
				match handler.handle(group, &mut partial, &self.ctx).await {
					Ok(()) => data.merge(partial),
					Err(err) => {
						error!(
							handler = handler.name(),
							tx = %group[0].origin.tx_hash,
							%err,
							"Handler failed, skipping its output for this transaction"
						);
					}
				}
			}
		}
		data
	}

	fn group_by_tx(logs: &[EnhancedLog]) -> Vec<&[EnhancedLog]> {
		let mut groups = Vec::new();
		let mut start = 0;
		for index in 1..=logs.len() {
			let boundary = index == logs.len()
				|| logs[index].origin.tx_hash != logs[start].origin.tx_hash;
			if boundary {
				groups.push(&logs[start..index]);
				start = index;
			}
		}
		groups
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;

	use async_trait::async_trait;

	use indexer_store::MemoryStore;
	use indexer_types::{Address, Bytes, EventOrigin, MintInfo, RawLog, B256, U256};

	use crate::{StaticAttributionResolver, StaticPriceOracle, SyncError};

	struct Counting;

	#[async_trait]
	impl EventHandler for Counting {
		fn name(&self) -> &'static str {
			"counting"
		}

		async fn handle(
			&self,
			logs: &[EnhancedLog],
			data: &mut OnChainData,
			_ctx: &HandlerContext,
		) -> Result<(), SyncError> {
			// One marker entry per transaction group.
			data.mint_infos.push(MintInfo {
				contract: logs[0].log.address,
				token_id: U256::from(logs.len()),
			});
			Ok(())
		}
	}

	struct Failing;

	#[async_trait]
	impl EventHandler for Failing {
		fn name(&self) -> &'static str {
			"failing"
		}

		async fn handle(
			&self,
			_logs: &[EnhancedLog],
			data: &mut OnChainData,
			_ctx: &HandlerContext,
		) -> Result<(), SyncError> {
			data.mint_infos.push(MintInfo {
				contract: Address::ZERO,
				token_id: U256::ZERO,
			});
			Err(SyncError::Decode("boom".into()))
		}
	}

	fn log(tx: u8, log_index: u64) -> EnhancedLog {
		EnhancedLog {
			log: RawLog {
				address: Address::repeat_byte(1),
				topics: vec![],
				data: Bytes::new(),
			},
			origin: EventOrigin {
				address: Address::repeat_byte(1),
				tx_hash: B256::repeat_byte(tx),
				block: 1,
				block_hash: B256::repeat_byte(0xbb),
				log_index,
				batch_index: 1,
				timestamp: 0,
			},
		}
	}

	fn ctx() -> HandlerContext {
		HandlerContext {
			store: Arc::new(MemoryStore::new()),
			price_oracle: Arc::new(StaticPriceOracle::new()),
			attribution: Arc::new(StaticAttributionResolver::new()),
		}
	}

	#[tokio::test]
	async fn groups_logs_per_transaction() {
		let aggregator = Aggregator::new(ctx()).register(Box::new(Counting));
		let logs = vec![log(1, 0), log(1, 1), log(2, 2)];
		let data = aggregator.aggregate(&logs).await;
		// Two transactions: one group of two logs, one of one.
		assert_eq!(data.mint_infos.len(), 2);
		assert_eq!(data.mint_infos[0].token_id, U256::from(2));
		assert_eq!(data.mint_infos[1].token_id, U256::from(1));
	}

	#[tokio::test]
	async fn failing_handler_output_is_discarded() {
		let aggregator = Aggregator::new(ctx())
			.register(Box::new(Failing))
			.register(Box::new(Counting));
		let data = aggregator.aggregate(&[log(1, 0)]).await;
		// Only the healthy handler's output survives.
		assert_eq!(data.mint_infos.len(), 1);
		assert_eq!(data.mint_infos[0].token_id, U256::from(1));
	}
}
