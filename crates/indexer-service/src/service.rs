//! Service wiring: store, queues, adapters, handlers, workers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use indexer_config::IndexerConfig;
use indexer_jobs::{ExpirySweeper, OrderUpdatesById, OrderUpdatesByMaker};
use indexer_orderbook::{
	AdapterContext, AdapterRegistry, PaymentProcessor, Punks, ZeroexV4,
};
use indexer_queue::{JobError, JobHandler, MemoryQueue, WorkerConfig, WorkerPool};
use indexer_store::MemoryStore;
use indexer_sync::implementations::{
	erc1155::Erc1155Handler, erc20::Erc20Handler, erc721::Erc721Handler,
	looks_rare::LooksRareHandler, punks::PunksHandler, wyvern::WyvernHandler,
};
use indexer_sync::{
	Aggregator, ApplyStats, HandlerContext, Pipeline, StaticAttributionResolver,
	StaticPriceOracle, SyncError,
};
use indexer_types::{EnhancedLog, MakerInfo, OrderInfo, OrderKind, OrderPayload, U256};

/// Drains the order queue into the adapter registry. Save rejections are
/// terminal statuses, not failures; only store and queue errors are retried.
pub struct OrderSaveHandler {
	registry: Arc<AdapterRegistry>,
	ctx: Arc<AdapterContext>,
}

#[async_trait]
impl JobHandler<OrderPayload> for OrderSaveHandler {
	async fn handle(&self, payload: &OrderPayload) -> Result<(), JobError> {
		let Some(adapter) = self.registry.get(payload.kind) else {
			warn!(kind = %payload.kind, "No adapter registered, dropping order");
			return Ok(());
		};
		match adapter.save(payload, &self.ctx).await {
			Ok(result) => {
				debug!(
					kind = %payload.kind,
					id = ?result.id,
					status = result.status.as_str(),
					"Order processed"
				);
				Ok(())
			}
			Err(err) => Err(JobError::Retryable(err.to_string())),
		}
	}
}

/// The assembled indexing core. Chain transports push sorted log batches into
/// `ingest`; everything downstream runs on the internal queues.
pub struct IndexerService {
	store: Arc<MemoryStore>,
	order_info_queue: Arc<MemoryQueue<OrderInfo>>,
	maker_info_queue: Arc<MemoryQueue<MakerInfo>>,
	order_queue: Arc<MemoryQueue<OrderPayload>>,
	aggregator: Aggregator,
	pipeline: Pipeline,
	registry: Arc<AdapterRegistry>,
	adapter_ctx: Arc<AdapterContext>,
	expiry_interval: Duration,
	workers_config: indexer_config::WorkersConfig,
	backfill: bool,
	workers: Vec<JoinHandle<()>>,
	expiry: Option<JoinHandle<()>>,
}

impl IndexerService {
	pub fn from_config(config: &IndexerConfig) -> Self {
		let store = Arc::new(MemoryStore::new());
		let order_info_queue = Arc::new(MemoryQueue::new());
		let maker_info_queue = Arc::new(MemoryQueue::new());
		let order_queue = Arc::new(MemoryQueue::new());

		let contracts = &config.contracts;

		let mut price_oracle = StaticPriceOracle::new();
		for rate in &config.prices {
			price_oracle = price_oracle.with_rate(
				rate.currency,
				U256::from(rate.numerator),
				U256::from(rate.denominator),
			);
		}
		let price_oracle = Arc::new(price_oracle);

		let mut attribution = StaticAttributionResolver::new();
		for (kind, domain) in &config.sources {
			match parse_kind(kind) {
				Some(kind) => attribution = attribution.with_source(kind, domain.clone()),
				None => warn!(%kind, "Unknown protocol tag in sources, ignoring"),
			}
		}
		let attribution = Arc::new(attribution);

		let aggregator = Aggregator::new(HandlerContext {
			store: store.clone(),
			price_oracle,
			attribution: attribution.clone(),
		})
		.register(Box::new(Erc721Handler))
		.register(Box::new(Erc1155Handler))
		.register(Box::new(Erc20Handler))
		.register(Box::new(LooksRareHandler::new(contracts.looks_rare_exchange)))
		.register(Box::new(WyvernHandler::new(contracts.wyvern_exchange)))
		.register(Box::new(PunksHandler::new(contracts.punks)));

		let pipeline = Pipeline::new(
			store.clone(),
			order_info_queue.clone(),
			maker_info_queue.clone(),
			order_queue.clone(),
			attribution,
		);

		let registry = Arc::new(
			AdapterRegistry::new()
				.register(Box::new(Punks::new(contracts.punks)))
				.register(Box::new(ZeroexV4::erc721(
					contracts.weth,
					contracts.zeroex_v4_exchange,
				)))
				.register(Box::new(ZeroexV4::erc1155(
					contracts.weth,
					contracts.zeroex_v4_exchange,
				)))
				.register(Box::new(PaymentProcessor::new(
					contracts.payment_processor_exchange,
					contracts.weth,
				))),
		);
		let adapter_ctx = Arc::new(AdapterContext::new(
			store.clone(),
			order_info_queue.clone(),
		));

		Self {
			store,
			order_info_queue,
			maker_info_queue,
			order_queue,
			aggregator,
			pipeline,
			registry,
			adapter_ctx,
			expiry_interval: Duration::from_secs(config.expiry.interval_secs),
			workers_config: config.workers.clone(),
			backfill: config.indexer.backfill,
			workers: Vec::new(),
			expiry: None,
		}
	}

	pub fn store(&self) -> Arc<MemoryStore> {
		self.store.clone()
	}

	fn worker_config(&self, concurrency: usize) -> WorkerConfig {
		WorkerConfig {
			concurrency,
			max_attempts: self.workers_config.max_attempts,
			retry_delay: Duration::from_secs(self.workers_config.retry_delay_secs),
		}
	}

	/// Spawns the worker pools and the expiry sweeper.
	pub fn start(&mut self) {
		let by_id = Arc::new(OrderUpdatesById::new(self.store.clone()));
		self.workers.extend(WorkerPool::spawn(
			"order-info",
			self.order_info_queue.clone(),
			by_id,
			self.worker_config(self.workers_config.order_info_concurrency),
		));

		let by_maker = Arc::new(OrderUpdatesByMaker::new(
			self.store.clone(),
			self.order_info_queue.clone(),
			self.maker_info_queue.clone(),
		));
		self.workers.extend(WorkerPool::spawn(
			"maker-info",
			self.maker_info_queue.clone(),
			by_maker,
			self.worker_config(self.workers_config.maker_info_concurrency),
		));

		let saver = Arc::new(OrderSaveHandler {
			registry: self.registry.clone(),
			ctx: self.adapter_ctx.clone(),
		});
		self.workers.extend(WorkerPool::spawn(
			"orders",
			self.order_queue.clone(),
			saver,
			self.worker_config(self.workers_config.order_concurrency),
		));

		let sweeper = Arc::new(ExpirySweeper::new(
			self.store.clone(),
			self.order_info_queue.clone(),
		));
		self.expiry = Some(sweeper.spawn(self.expiry_interval));
	}

	/// Applies one sorted batch of chain logs end to end: aggregation, canonical
	/// persistence, then fan-out onto the internal queues.
	pub async fn ingest(&self, logs: &[EnhancedLog]) -> Result<ApplyStats, SyncError> {
		let data = self.aggregator.aggregate(logs).await;
		self.pipeline.apply(data, self.backfill).await
	}

	/// Closes the queues, lets the workers drain, and stops the sweeper.
	pub async fn shutdown(mut self) {
		if let Some(expiry) = self.expiry.take() {
			expiry.abort();
		}
		self.order_queue.close().await;
		self.maker_info_queue.close().await;
		self.order_info_queue.close().await;
		for worker in self.workers.drain(..) {
			let _ = worker.await;
		}
	}
}

fn parse_kind(tag: &str) -> Option<OrderKind> {
	match tag {
		"punks" => Some(OrderKind::Punks),
		"zeroex-v4-erc721" => Some(OrderKind::ZeroexV4Erc721),
		"zeroex-v4-erc1155" => Some(OrderKind::ZeroexV4Erc1155),
		"payment-processor" => Some(OrderKind::PaymentProcessor),
		"looks-rare" => Some(OrderKind::LooksRare),
		"wyvern" => Some(OrderKind::Wyvern),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use indexer_config::ConfigLoader;

	const CONFIG: &str = r#"
[indexer]
name = "test-indexer"

[contracts]
weth = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"
zeroex_v4_exchange = "0xdef1c0ded9bec7f1a1670819833240f027b25eff"
payment_processor_exchange = "0x009a1dc629242961c9b4f88b734e0c56310c2f83"
looks_rare_exchange = "0x59728544b08ab483533076417fbbb2fd0b17ce3a"
wyvern_exchange = "0x7be8076f4ea4a4ad08075c2508e481d6c946d12b"
punks = "0xb47e3cd837ddf8e4c57f05d70ab865de6e193bbb"

[sources]
looks-rare = "looksrare.org"
"#;

	#[tokio::test]
	async fn wires_up_ingests_and_drains_cleanly() {
		let config = ConfigLoader::from_toml(CONFIG).unwrap();
		let mut service = IndexerService::from_config(&config);
		service.start();

		let stats = service.ingest(&[]).await.unwrap();
		assert_eq!(stats.fills, 0);

		service.shutdown().await;
	}
}
