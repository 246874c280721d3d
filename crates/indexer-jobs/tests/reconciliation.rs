//! End-to-end reconciliation flows: adapters and event handlers feeding the
//! store, job processors draining the queues, token caches converging.

use std::sync::Arc;

use alloy::sol_types::SolEvent;
use serde_json::json;

use indexer_jobs::{ExpirySweeper, OrderUpdatesById, OrderUpdatesByMaker};
use indexer_orderbook::{AdapterContext, OrderAdapter, PaymentProcessor, SaveStatus, ZeroexV4};
use indexer_queue::{JobHandler, JobQueue, MemoryQueue};
use indexer_store::{MemoryStore, StoreInterface};
use indexer_sync::implementations::looks_rare::LooksRareHandler;
use indexer_sync::{
	Aggregator, HandlerContext, Pipeline, StaticAttributionResolver, StaticPriceOracle,
};
use indexer_types::{
	Address, ApprovalStatus, BundleLeg, BundleLegKind, EnhancedLog, EventOrigin, FillEvent,
	FillabilityStatus, MakerInfo, MakerUpdate, OnChainData, OrderInfo, OrderKind,
	OrderMetadata, OrderPayload, OrderRecord, RawLog, Side, TokenSetId, Trigger, TriggerKind,
	B256, U256,
};

fn weth() -> Address {
	Address::repeat_byte(0xee)
}

fn exchange() -> Address {
	Address::repeat_byte(0xdd)
}

fn nft() -> Address {
	Address::repeat_byte(0x11)
}

fn maker() -> Address {
	Address::repeat_byte(0x01)
}

struct Harness {
	store: Arc<MemoryStore>,
	order_info_queue: Arc<MemoryQueue<OrderInfo>>,
	maker_info_queue: Arc<MemoryQueue<MakerInfo>>,
	by_id: OrderUpdatesById,
	by_maker: OrderUpdatesByMaker,
}

impl Harness {
	fn new() -> Self {
		let store = Arc::new(MemoryStore::new());
		let order_info_queue = Arc::new(MemoryQueue::new());
		let maker_info_queue = Arc::new(MemoryQueue::new());
		let by_id = OrderUpdatesById::new(store.clone());
		let by_maker = OrderUpdatesByMaker::new(
			store.clone(),
			order_info_queue.clone(),
			maker_info_queue.clone(),
		);
		Self {
			store,
			order_info_queue,
			maker_info_queue,
			by_id,
			by_maker,
		}
	}

	fn adapter_ctx(&self) -> AdapterContext {
		AdapterContext::new(self.store.clone(), self.order_info_queue.clone())
			.with_time(1_700_000_000)
	}

	/// Runs maker-wide jobs first (they feed the by-id queue), then drains
	/// the by-id queue until token caches are settled.
	async fn settle(&self) {
		while let Some(job) = self.maker_info_queue.dequeue().await {
			self.by_maker.handle(&job.payload).await.unwrap();
		}
		while let Some(job) = self.order_info_queue.dequeue().await {
			self.by_id.handle(&job.payload).await.unwrap();
		}
	}

	async fn fund_seller(&self, token_id: u64) {
		self.store
			.set_nft_balance(maker(), nft(), U256::from(token_id), U256::from(1))
			.await
			.unwrap();
		self.store
			.set_nft_approval(maker(), exchange(), nft(), true)
			.await
			.unwrap();
	}
}

fn zeroex_sell(nonce: u64, token_id: u64, price: u64) -> OrderPayload {
	OrderPayload {
		kind: OrderKind::ZeroexV4Erc721,
		data: json!({
			"direction": 0,
			"maker": maker(),
			"taker": null,
			"expiry": 0,
			"nonce": U256::from(nonce),
			"erc20_token": Address::ZERO,
			"erc20_token_amount": U256::from(price),
			"fees": [],
			"nft": nft(),
			"nft_id": U256::from(token_id),
			"nft_amount": null,
			"signature": { "r": "0x01", "s": "0x02", "v": 27 },
			"tx_block": null,
			"log_index": null,
			"tx_timestamp": 1_699_999_000u64,
		}),
		metadata: OrderMetadata::default(),
	}
}

fn zeroex_buy(nonce: u64, token_id: u64, price: u64) -> OrderPayload {
	let mut payload = zeroex_sell(nonce, token_id, price);
	payload.data["direction"] = json!(1);
	payload.data["erc20_token"] = json!(weth());
	payload
}

fn origin(log_index: u64) -> EventOrigin {
	EventOrigin {
		address: nft(),
		tx_hash: B256::repeat_byte(0xaa),
		block: 100,
		block_hash: B256::repeat_byte(0xbb),
		log_index,
		batch_index: 1,
		timestamp: 1_700_000_000,
	}
}

#[tokio::test]
async fn floor_tracks_the_cheapest_listing() {
	let harness = Harness::new();
	harness.fund_seller(1).await;
	let adapter = ZeroexV4::erc721(weth(), exchange());
	let ctx = harness.adapter_ctx();

	let first = adapter.save(&zeroex_sell(1, 1, 100), &ctx).await.unwrap();
	assert_eq!(first.status, SaveStatus::Success);
	harness.settle().await;

	let token = harness
		.store
		.get_token(nft(), U256::from(1))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(token.floor_sell_value, Some(U256::from(100)));

	let second = adapter.save(&zeroex_sell(2, 1, 80), &ctx).await.unwrap();
	assert_eq!(second.status, SaveStatus::Success);
	harness.settle().await;

	let token = harness
		.store
		.get_token(nft(), U256::from(1))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(token.floor_sell_id, second.id);
	assert_eq!(token.floor_sell_value, Some(U256::from(80)));

	// Two floor transitions, each with the previous price on record.
	let history = harness
		.store
		.floor_sell_events(nft(), U256::from(1))
		.await
		.unwrap();
	assert_eq!(history.len(), 2);
	assert_eq!(history[0].previous_price, None);
	assert_eq!(history[1].previous_price, Some(U256::from(100)));
	assert_eq!(history[1].price, Some(U256::from(80)));
}

#[tokio::test]
async fn filling_the_floor_order_promotes_the_next_ask() {
	let harness = Harness::new();
	harness.fund_seller(1).await;
	let adapter = ZeroexV4::erc721(weth(), exchange());
	let ctx = harness.adapter_ctx();

	let expensive = adapter.save(&zeroex_sell(1, 1, 100), &ctx).await.unwrap();
	let cheap = adapter.save(&zeroex_sell(2, 1, 80), &ctx).await.unwrap();
	harness.settle().await;

	let pipeline = Pipeline::new(
		harness.store.clone(),
		harness.order_info_queue.clone(),
		harness.maker_info_queue.clone(),
		Arc::new(MemoryQueue::new()),
		Arc::new(StaticAttributionResolver::new()),
	);
	let mut data = OnChainData::new();
	data.fill_events.push(FillEvent {
		order_kind: OrderKind::ZeroexV4Erc721,
		order_id: cheap.id.unwrap(),
		order_side: Side::Sell,
		maker: maker(),
		taker: Address::repeat_byte(0x02),
		price: U256::from(80),
		currency: Address::ZERO,
		currency_price: U256::from(80),
		usd_price: None,
		contract: nft(),
		token_id: U256::from(1),
		amount: U256::from(1),
		order_source: None,
		fill_source: Some("marketplace.example".to_string()),
		aggregator_source: None,
		origin: origin(7),
	});
	data.order_infos.push(OrderInfo::for_order(
		format!("sale-{}-test", cheap.id.unwrap()),
		cheap.id.unwrap(),
		Trigger::new(TriggerKind::Sale),
	));
	pipeline.apply(data, false).await.unwrap();
	harness.settle().await;

	let filled = harness
		.store
		.get_order(cheap.id.unwrap())
		.await
		.unwrap()
		.unwrap();
	assert_eq!(filled.fillability_status, FillabilityStatus::Filled);

	// The floor falls back to the surviving ask.
	let token = harness
		.store
		.get_token(nft(), U256::from(1))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(token.floor_sell_id, expensive.id);
	assert_eq!(token.floor_sell_value, Some(U256::from(100)));
}

#[tokio::test]
async fn master_nonce_bump_cancels_and_clears_the_floor() {
	let harness = Harness::new();
	harness.fund_seller(3).await;
	harness
		.store
		.set_master_nonce(maker(), U256::from(4))
		.await
		.unwrap();
	let adapter = PaymentProcessor::new(exchange(), weth());
	let ctx = harness.adapter_ctx();

	let payload = |nonce: u64, price: u64| OrderPayload {
		kind: OrderKind::PaymentProcessor,
		data: json!({
			"side": "sell",
			"maker": maker(),
			"nonce": U256::from(nonce),
			"master_nonce": U256::from(4),
			"token": nft(),
			"token_id": U256::from(3),
			"amount": U256::from(1),
			"price": U256::from(price),
			"coin": Address::ZERO,
			"expiration": 0,
			"marketplace": null,
			"marketplace_fee_bps": null,
			"signature": { "r": "0x01", "s": "0x02" },
		}),
		metadata: OrderMetadata::default(),
	};

	let first = adapter.save(&payload(1, 500), &ctx).await.unwrap();
	let second = adapter.save(&payload(2, 400), &ctx).await.unwrap();
	assert_eq!(first.status, SaveStatus::Success);
	assert_eq!(second.status, SaveStatus::Success);
	harness.settle().await;

	let token = harness
		.store
		.get_token(nft(), U256::from(3))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(token.floor_sell_value, Some(U256::from(400)));

	// On-chain bump to 5 invalidates everything signed under 4.
	harness
		.maker_info_queue
		.enqueue(
			"bump-test".to_string(),
			MakerInfo {
				context: "bump-test".to_string(),
				maker: maker(),
				trigger: Trigger::new(TriggerKind::Cancel),
				data: MakerUpdate::NonceCancel {
					order_kind: OrderKind::PaymentProcessor,
					min_nonce: U256::from(5),
					side: None,
				},
			},
		)
		.await
		.unwrap();
	harness.settle().await;

	for id in [first.id.unwrap(), second.id.unwrap()] {
		let stored = harness.store.get_order(id).await.unwrap().unwrap();
		assert_eq!(stored.fillability_status, FillabilityStatus::Cancelled);
	}
	let token = harness
		.store
		.get_token(nft(), U256::from(3))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(token.floor_sell_id, None);
	assert_eq!(token.floor_sell_value, None);

	// Cancellation is terminal: a later balance revalidation of a fully
	// funded maker must not resurrect the orders.
	harness
		.maker_info_queue
		.enqueue(
			"revalidate-test".to_string(),
			MakerInfo {
				context: "revalidate-test".to_string(),
				maker: maker(),
				trigger: Trigger::new(TriggerKind::BalanceChange),
				data: MakerUpdate::SellBalance {
					contract: nft(),
					token_id: U256::from(3),
				},
			},
		)
		.await
		.unwrap();
	harness.settle().await;
	let stored = harness
		.store
		.get_order(first.id.unwrap())
		.await
		.unwrap()
		.unwrap();
	assert_eq!(stored.fillability_status, FillabilityStatus::Cancelled);
}

alloy::sol! {
	event TakerBid(bytes32 orderHash, uint256 orderNonce, address indexed taker, address indexed maker, address indexed strategy, address currency, address collection, uint256 tokenId, uint256 amount, uint256 price);
}

fn taker_bid_log(currency: Address, log_index: u64) -> EnhancedLog {
	let event = TakerBid {
		orderHash: B256::repeat_byte(0x42),
		orderNonce: U256::from(9),
		taker: Address::repeat_byte(0x02),
		maker: maker(),
		strategy: Address::repeat_byte(0x03),
		currency,
		collection: nft(),
		tokenId: U256::from(1),
		amount: U256::from(1),
		price: U256::from(1_000),
	};
	let log_data = event.encode_log_data();
	EnhancedLog {
		log: RawLog {
			address: exchange(),
			topics: log_data.topics().to_vec(),
			data: log_data.data.clone(),
		},
		origin: EventOrigin {
			address: exchange(),
			tx_hash: B256::repeat_byte(0xcc),
			block: 200,
			block_hash: B256::repeat_byte(0xbd),
			log_index,
			batch_index: 1,
			timestamp: 1_700_000_000,
		},
	}
}

#[tokio::test]
async fn fills_without_a_resolvable_price_are_dropped() {
	let store = Arc::new(MemoryStore::new());
	let ctx = HandlerContext {
		store: store.clone(),
		price_oracle: Arc::new(StaticPriceOracle::new()),
		attribution: Arc::new(StaticAttributionResolver::new()),
	};
	let aggregator =
		Aggregator::new(ctx).register(Box::new(LooksRareHandler::new(exchange())));

	// Unknown settlement currency: the whole fill is discarded.
	let data = aggregator
		.aggregate(&[taker_bid_log(Address::repeat_byte(0x99), 1)])
		.await;
	assert!(data.fill_events.is_empty());
	assert!(data.order_infos.is_empty());

	// Native currency resolves and the fill survives.
	let data = aggregator.aggregate(&[taker_bid_log(Address::ZERO, 2)]).await;
	assert_eq!(data.fill_events.len(), 1);
	assert_eq!(data.fill_events[0].price, U256::from(1_000));
	assert_eq!(data.order_infos.len(), 1);
}

#[tokio::test]
async fn balance_loss_demotes_the_top_bid() {
	let harness = Harness::new();
	harness
		.store
		.set_ft_balance(maker(), weth(), U256::from(1_000))
		.await
		.unwrap();
	harness
		.store
		.set_ft_approval(maker(), exchange(), weth(), U256::from(1_000))
		.await
		.unwrap();
	let adapter = ZeroexV4::erc721(weth(), exchange());
	let ctx = harness.adapter_ctx();

	let bid = adapter.save(&zeroex_buy(1, 1, 300), &ctx).await.unwrap();
	assert_eq!(bid.status, SaveStatus::Success);
	harness.settle().await;

	let token = harness
		.store
		.get_token(nft(), U256::from(1))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(token.top_buy_id, bid.id);
	assert_eq!(token.top_buy_value, Some(U256::from(300)));

	// The maker spends the funds backing the bid.
	harness
		.store
		.set_ft_balance(maker(), weth(), U256::ZERO)
		.await
		.unwrap();
	harness
		.maker_info_queue
		.enqueue(
			"spend-test".to_string(),
			MakerInfo {
				context: "spend-test".to_string(),
				maker: maker(),
				trigger: Trigger::new(TriggerKind::BalanceChange),
				data: MakerUpdate::BuyBalance { contract: weth() },
			},
		)
		.await
		.unwrap();
	harness.settle().await;

	let stored = harness
		.store
		.get_order(bid.id.unwrap())
		.await
		.unwrap()
		.unwrap();
	assert_eq!(stored.fillability_status, FillabilityStatus::NoBalance);
	let token = harness
		.store
		.get_token(nft(), U256::from(1))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(token.top_buy_id, None);
}

#[tokio::test]
async fn chunked_revalidation_converges_through_continuations() {
	let harness = Harness::new();
	let by_maker = OrderUpdatesByMaker::new(
		harness.store.clone(),
		harness.order_info_queue.clone(),
		harness.maker_info_queue.clone(),
	)
	.with_chunk_size(1);

	harness
		.store
		.set_ft_balance(maker(), weth(), U256::from(10_000))
		.await
		.unwrap();
	harness
		.store
		.set_ft_approval(maker(), exchange(), weth(), U256::from(10_000))
		.await
		.unwrap();
	let adapter = ZeroexV4::erc721(weth(), exchange());
	let ctx = harness.adapter_ctx();
	for nonce in 1..=3u64 {
		let result = adapter
			.save(&zeroex_buy(nonce, nonce, 100), &ctx)
			.await
			.unwrap();
		assert_eq!(result.status, SaveStatus::Success);
	}

	harness
		.store
		.set_ft_balance(maker(), weth(), U256::ZERO)
		.await
		.unwrap();
	harness
		.maker_info_queue
		.enqueue(
			"chunk-test".to_string(),
			MakerInfo {
				context: "chunk-test".to_string(),
				maker: maker(),
				trigger: Trigger::new(TriggerKind::BalanceChange),
				data: MakerUpdate::BuyBalance { contract: weth() },
			},
		)
		.await
		.unwrap();

	// Each run flips at most one row and re-enqueues itself until done.
	let mut runs = 0;
	while let Some(job) = harness.maker_info_queue.dequeue().await {
		by_maker.handle(&job.payload).await.unwrap();
		runs += 1;
		assert!(runs <= 10, "continuation loop failed to converge");
	}
	assert!(runs >= 3);

	for nonce in 1..=3u64 {
		let id = indexer_types::order_id(
			OrderKind::ZeroexV4Erc721,
			&[
				maker().as_slice(),
				&U256::from(nonce).to_be_bytes::<32>(),
				nft().as_slice(),
			],
		);
		let stored = harness.store.get_order(id).await.unwrap().unwrap();
		assert_eq!(stored.fillability_status, FillabilityStatus::NoBalance);
	}
}

#[tokio::test]
async fn bundles_are_only_fillable_while_every_leg_is() {
	let harness = Harness::new();
	let ft = Address::repeat_byte(0x22);
	let bundle = OrderRecord {
		id: B256::repeat_byte(0x77),
		kind: OrderKind::Wyvern,
		side: Side::Bundle,
		fillability_status: FillabilityStatus::Fillable,
		approval_status: ApprovalStatus::Approved,
		token_set_id: TokenSetId::ContractWide { contract: nft() },
		maker: maker(),
		taker: Address::ZERO,
		price: U256::from(100),
		value: U256::from(100),
		currency: Address::ZERO,
		currency_price: U256::from(100),
		currency_value: U256::from(100),
		quantity_remaining: U256::from(1),
		nonce: None,
		valid_from: 0,
		valid_until: None,
		fee_bps: 0,
		fee_breakdown: Vec::new(),
		missing_royalties: Vec::new(),
		conduit: None,
		source: None,
		raw_data: json!({}),
		block_number: None,
		log_index: None,
		bundle_legs: vec![
			BundleLeg {
				kind: BundleLegKind::Nft,
				contract: nft(),
				token_id: Some(U256::from(1)),
				amount: U256::from(1),
				valid_until: None,
			},
			BundleLeg {
				kind: BundleLegKind::Ft,
				contract: ft,
				token_id: None,
				amount: U256::from(50),
				valid_until: Some(2_000),
			},
		],
	};
	harness
		.store
		.set_nft_balance(maker(), nft(), U256::from(1), U256::from(1))
		.await
		.unwrap();
	harness
		.store
		.set_ft_balance(maker(), ft, U256::from(100))
		.await
		.unwrap();
	assert!(harness.store.insert_order_if_absent(bundle).await.unwrap());

	// Fully funded: revalidation changes nothing.
	harness
		.maker_info_queue
		.enqueue(
			"bundle-funded".to_string(),
			MakerInfo {
				context: "bundle-funded".to_string(),
				maker: maker(),
				trigger: Trigger::new(TriggerKind::BalanceChange),
				data: MakerUpdate::BuyBalance { contract: ft },
			},
		)
		.await
		.unwrap();
	harness.settle().await;
	let stored = harness
		.store
		.get_order(B256::repeat_byte(0x77))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(stored.fillability_status, FillabilityStatus::Fillable);

	// The fungible leg loses funding: the bundle demotes and its expiry
	// tightens to the failing leg's.
	harness
		.store
		.set_ft_balance(maker(), ft, U256::from(10))
		.await
		.unwrap();
	harness
		.maker_info_queue
		.enqueue(
			"bundle-drained".to_string(),
			MakerInfo {
				context: "bundle-drained".to_string(),
				maker: maker(),
				trigger: Trigger::new(TriggerKind::BalanceChange),
				data: MakerUpdate::BuyBalance { contract: ft },
			},
		)
		.await
		.unwrap();
	harness.settle().await;
	let stored = harness
		.store
		.get_order(B256::repeat_byte(0x77))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(stored.fillability_status, FillabilityStatus::NoBalance);
	assert_eq!(stored.valid_until, Some(2_000));

	// Refunded: the dip was transient, so the bundle recovers and its
	// expiration goes back to unbounded instead of keeping the failing
	// leg's bound.
	harness
		.store
		.set_ft_balance(maker(), ft, U256::from(100))
		.await
		.unwrap();
	harness
		.maker_info_queue
		.enqueue(
			"bundle-refunded".to_string(),
			MakerInfo {
				context: "bundle-refunded".to_string(),
				maker: maker(),
				trigger: Trigger::new(TriggerKind::BalanceChange),
				data: MakerUpdate::BuyBalance { contract: ft },
			},
		)
		.await
		.unwrap();
	harness.settle().await;
	let stored = harness
		.store
		.get_order(B256::repeat_byte(0x77))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(stored.fillability_status, FillabilityStatus::Fillable);
	assert_eq!(stored.valid_until, None);
}

#[tokio::test]
async fn expiry_sweep_clears_overdue_listings() {
	let harness = Harness::new();
	harness.fund_seller(1).await;
	let adapter = ZeroexV4::erc721(weth(), exchange());
	let ctx = harness.adapter_ctx();

	let mut payload = zeroex_sell(1, 1, 100);
	payload.data["expiry"] = json!(1_700_001_000u64);
	let result = adapter.save(&payload, &ctx).await.unwrap();
	assert_eq!(result.status, SaveStatus::Success);
	harness.settle().await;
	let token = harness
		.store
		.get_token(nft(), U256::from(1))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(token.floor_sell_value, Some(U256::from(100)));

	let sweeper = ExpirySweeper::new(harness.store.clone(), harness.order_info_queue.clone());
	assert_eq!(sweeper.sweep(1_700_002_000).await.unwrap(), 1);
	harness.settle().await;

	let stored = harness
		.store
		.get_order(result.id.unwrap())
		.await
		.unwrap()
		.unwrap();
	assert_eq!(stored.fillability_status, FillabilityStatus::Expired);
	let token = harness
		.store
		.get_token(nft(), U256::from(1))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(token.floor_sell_id, None);

	// Expiry is terminal; the second sweep finds nothing.
	assert_eq!(sweeper.sweep(1_700_003_000).await.unwrap(), 0);
}
