//! In-memory store backend.
//!
//! Backs the full `StoreInterface` with plain maps behind a single writer
//! lock, so every compound operation is trivially atomic. Default backend for
//! tests and single-process deployments.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::error;

use indexer_types::{
	Address, ApprovalStatus, BulkCancelEvent, BundleLegKind, CancelEvent, FillEvent,
	FillabilityStatus, FtTransferEvent, NftApprovalEvent, NftTransferEvent, NonceCancelEvent,
	ContractKind, OrderId, OrderKind, OrderRecord, OrderingKey, Side, TokenFloorSellEvent,
	TokenSetId, Trigger, B256, U256,
};

use crate::{StoreError, StoreInterface, Token, TokenSetRow, TopBuyChange};

type EventKey = (B256, u64, u64);

#[derive(Default)]
struct State {
	orders: HashMap<OrderId, OrderRecord>,
	tokens: HashMap<(Address, U256), Token>,
	token_sets: HashMap<String, TokenSetRow>,

	fill_events: Vec<FillEvent>,
	fill_keys: HashSet<EventKey>,
	cancel_events: Vec<CancelEvent>,
	cancel_keys: HashSet<EventKey>,
	nonce_cancel_events: Vec<NonceCancelEvent>,
	nonce_cancel_keys: HashSet<EventKey>,
	bulk_cancel_events: Vec<BulkCancelEvent>,
	bulk_cancel_keys: HashSet<EventKey>,
	nft_approval_events: Vec<NftApprovalEvent>,
	nft_approval_keys: HashSet<EventKey>,
	nft_transfer_events: Vec<NftTransferEvent>,
	nft_transfer_keys: HashSet<EventKey>,
	ft_transfer_events: Vec<FtTransferEvent>,
	ft_transfer_keys: HashSet<EventKey>,

	floor_sell_events: Vec<TokenFloorSellEvent>,

	/// `(owner, contract, token_id) -> amount`
	nft_balances: HashMap<(Address, Address, U256), U256>,
	/// `(owner, contract) -> amount`
	ft_balances: HashMap<(Address, Address), U256>,
	/// `(owner, spender, contract) -> allowance`
	ft_approvals: HashMap<(Address, Address, Address), U256>,
	/// `(owner, operator, contract) -> approved`
	nft_operator_approvals: HashMap<(Address, Address, Address), bool>,

	master_nonces: HashMap<Address, U256>,
}

impl State {
	fn token_entry(&mut self, contract: Address, token_id: U256) -> &mut Token {
		self.tokens
			.entry((contract, token_id))
			.or_insert_with(|| Token::new(contract, token_id))
	}

	/// Cached tokens covered by a set, in a deterministic order.
	fn covered_tokens(&self, set: &TokenSetId) -> Vec<(Address, U256)> {
		let mut keys: Vec<(Address, U256)> = self
			.tokens
			.keys()
			.filter(|(contract, token_id)| set.contains(*contract, *token_id))
			.copied()
			.collect();
		keys.sort();
		keys
	}

	/// Lowest-priced fillable ask covering the token; ties break towards the
	/// lowest order id so recomputation is deterministic.
	fn best_ask(&self, contract: Address, token_id: U256) -> Option<(OrderId, U256, Address)> {
		let mut best: Option<&OrderRecord> = None;
		for order in self.orders.values() {
			if order.side != Side::Sell
				|| !order.is_active()
				|| !order.token_set_id.contains(contract, token_id)
			{
				continue;
			}
			best = match best {
				None => Some(order),
				Some(b) if order.value < b.value
					|| (order.value == b.value && order.id < b.id) =>
				{
					Some(order)
				}
				Some(b) => Some(b),
			};
		}
		best.map(|o| (o.id, o.value, o.maker))
	}

	/// Highest fillable bid covering the token, excluding bids placed by the
	/// token's current owner.
	fn best_token_bid(
		&self,
		contract: Address,
		token_id: U256,
		owner: Option<Address>,
	) -> Option<(OrderId, U256, Address)> {
		let mut best: Option<&OrderRecord> = None;
		for order in self.orders.values() {
			if order.side != Side::Buy
				|| !order.is_active()
				|| !order.token_set_id.contains(contract, token_id)
			{
				continue;
			}
			if owner == Some(order.maker) {
				continue;
			}
			best = match best {
				None => Some(order),
				Some(b) if order.value > b.value
					|| (order.value == b.value && order.id < b.id) =>
				{
					Some(order)
				}
				Some(b) => Some(b),
			};
		}
		best.map(|o| (o.id, o.value, o.maker))
	}

	/// Highest fillable bid placed on exactly this set.
	fn best_set_bid(&self, set: &TokenSetId) -> Option<(OrderId, U256, Address)> {
		let mut best: Option<&OrderRecord> = None;
		for order in self.orders.values() {
			if order.side != Side::Buy || !order.is_active() || order.token_set_id != *set {
				continue;
			}
			best = match best {
				None => Some(order),
				Some(b) if order.value > b.value
					|| (order.value == b.value && order.id < b.id) =>
				{
					Some(order)
				}
				Some(b) => Some(b),
			};
		}
		best.map(|o| (o.id, o.value, o.maker))
	}
}

/// In-memory implementation of `StoreInterface`.
pub struct MemoryStore {
	state: RwLock<State>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self {
			state: RwLock::new(State::default()),
		}
	}
}

impl Default for MemoryStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StoreInterface for MemoryStore {
	async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>, StoreError> {
		Ok(self.state.read().await.orders.get(&id).cloned())
	}

	async fn insert_order_if_absent(&self, order: OrderRecord) -> Result<bool, StoreError> {
		let mut state = self.state.write().await;
		if state.orders.contains_key(&order.id) {
			return Ok(false);
		}
		state.orders.insert(order.id, order);
		Ok(true)
	}

	async fn update_order(&self, order: OrderRecord) -> Result<(), StoreError> {
		let mut state = self.state.write().await;
		state.orders.insert(order.id, order);
		Ok(())
	}

	async fn cancel_order(&self, id: OrderId) -> Result<bool, StoreError> {
		let mut state = self.state.write().await;
		match state.orders.get_mut(&id) {
			Some(order) if !order.fillability_status.is_terminal() => {
				order.fillability_status = FillabilityStatus::Cancelled;
				Ok(true)
			}
			_ => Ok(false),
		}
	}

	async fn expire_overdue_orders(&self, now: u64) -> Result<Vec<OrderRecord>, StoreError> {
		let mut state = self.state.write().await;
		let mut expired = Vec::new();
		for order in state.orders.values_mut() {
			if !order.fillability_status.is_open() {
				continue;
			}
			if matches!(order.valid_until, Some(t) if t <= now) {
				order.fillability_status = FillabilityStatus::Expired;
				expired.push(order.clone());
			}
		}
		expired.sort_by_key(|o| o.id);
		Ok(expired)
	}

	async fn has_cancel_after(&self, id: OrderId, key: OrderingKey) -> Result<bool, StoreError> {
		let state = self.state.read().await;
		Ok(state
			.cancel_events
			.iter()
			.any(|e| e.order_id == id && e.origin.ordering_key() > key))
	}

	async fn has_fill_after(&self, id: OrderId, key: OrderingKey) -> Result<bool, StoreError> {
		let state = self.state.read().await;
		Ok(state
			.fill_events
			.iter()
			.any(|e| e.order_id == id && e.origin.ordering_key() > key))
	}

	async fn nonce_in_use(
		&self,
		kind: OrderKind,
		maker: Address,
		contract: Address,
		nonce: U256,
		unit_price: U256,
	) -> Result<bool, StoreError> {
		let state = self.state.read().await;
		Ok(state.orders.values().any(|o| {
			o.kind == kind
				&& o.maker == maker
				&& o.token_set_id.contract() == contract
				&& o.nonce == Some(nonce)
				&& o.fillability_status.is_open()
				&& o.price != unit_price
		}))
	}

	async fn master_nonce(&self, maker: Address) -> Result<U256, StoreError> {
		let state = self.state.read().await;
		Ok(state.master_nonces.get(&maker).copied().unwrap_or(U256::ZERO))
	}

	async fn set_master_nonce(&self, maker: Address, nonce: U256) -> Result<(), StoreError> {
		let mut state = self.state.write().await;
		state.master_nonces.insert(maker, nonce);
		Ok(())
	}

	async fn save_token_set(&self, set: TokenSetId) -> Result<(), StoreError> {
		let mut state = self.state.write().await;
		if let TokenSetId::SingleToken { contract, token_id } = set {
			state.token_entry(contract, token_id);
		} else {
			let key = set.to_string();
			state
				.token_sets
				.entry(key)
				.or_insert_with(|| TokenSetRow::new(set));
		}
		Ok(())
	}

	async fn ensure_token(&self, contract: Address, token_id: U256) -> Result<(), StoreError> {
		let mut state = self.state.write().await;
		state.token_entry(contract, token_id);
		Ok(())
	}

	async fn get_token(
		&self,
		contract: Address,
		token_id: U256,
	) -> Result<Option<Token>, StoreError> {
		let state = self.state.read().await;
		Ok(state.tokens.get(&(contract, token_id)).cloned())
	}

	async fn get_token_set(&self, set: &TokenSetId) -> Result<Option<TokenSetRow>, StoreError> {
		let state = self.state.read().await;
		Ok(state.token_sets.get(&set.to_string()).cloned())
	}

	async fn set_token_owner(
		&self,
		contract: Address,
		token_id: U256,
		owner: Option<Address>,
	) -> Result<(), StoreError> {
		let mut state = self.state.write().await;
		state.token_entry(contract, token_id).owner = owner;
		Ok(())
	}

	async fn nft_balance(
		&self,
		owner: Address,
		contract: Address,
		token_id: U256,
	) -> Result<U256, StoreError> {
		let state = self.state.read().await;
		Ok(state
			.nft_balances
			.get(&(owner, contract, token_id))
			.copied()
			.unwrap_or(U256::ZERO))
	}

	async fn set_nft_balance(
		&self,
		owner: Address,
		contract: Address,
		token_id: U256,
		amount: U256,
	) -> Result<(), StoreError> {
		let mut state = self.state.write().await;
		state.nft_balances.insert((owner, contract, token_id), amount);
		Ok(())
	}

	async fn ft_balance(&self, owner: Address, contract: Address) -> Result<U256, StoreError> {
		let state = self.state.read().await;
		Ok(state
			.ft_balances
			.get(&(owner, contract))
			.copied()
			.unwrap_or(U256::ZERO))
	}

	async fn set_ft_balance(
		&self,
		owner: Address,
		contract: Address,
		amount: U256,
	) -> Result<(), StoreError> {
		let mut state = self.state.write().await;
		state.ft_balances.insert((owner, contract), amount);
		Ok(())
	}

	async fn ft_approval(
		&self,
		owner: Address,
		spender: Address,
		contract: Address,
	) -> Result<U256, StoreError> {
		let state = self.state.read().await;
		Ok(state
			.ft_approvals
			.get(&(owner, spender, contract))
			.copied()
			.unwrap_or(U256::ZERO))
	}

	async fn set_ft_approval(
		&self,
		owner: Address,
		spender: Address,
		contract: Address,
		value: U256,
	) -> Result<(), StoreError> {
		let mut state = self.state.write().await;
		state.ft_approvals.insert((owner, spender, contract), value);
		Ok(())
	}

	async fn nft_approval(
		&self,
		owner: Address,
		operator: Address,
		contract: Address,
	) -> Result<bool, StoreError> {
		let state = self.state.read().await;
		Ok(state
			.nft_operator_approvals
			.get(&(owner, operator, contract))
			.copied()
			.unwrap_or(false))
	}

	async fn set_nft_approval(
		&self,
		owner: Address,
		operator: Address,
		contract: Address,
		approved: bool,
	) -> Result<(), StoreError> {
		let mut state = self.state.write().await;
		state
			.nft_operator_approvals
			.insert((owner, operator, contract), approved);
		Ok(())
	}

	async fn insert_fill_events(&self, events: &[FillEvent]) -> Result<usize, StoreError> {
		let mut state = self.state.write().await;
		let state = &mut *state;
		let mut inserted = 0;
		for event in events {
			if !state.fill_keys.insert(event.origin.event_key()) {
				continue;
			}
			if let Some(order) = state.orders.get_mut(&event.order_id) {
				if !order.fillability_status.is_terminal() {
					order.quantity_remaining =
						order.quantity_remaining.saturating_sub(event.amount);
					if order.quantity_remaining.is_zero() {
						order.fillability_status = FillabilityStatus::Filled;
					} else {
						// A partial fill proves the order executable, which
						// overrides a stale no-balance verdict.
						order.fillability_status = FillabilityStatus::Fillable;
					}
				}
			}
			state.fill_events.push(event.clone());
			inserted += 1;
		}
		Ok(inserted)
	}

	async fn insert_cancel_events(&self, events: &[CancelEvent]) -> Result<usize, StoreError> {
		let mut state = self.state.write().await;
		let state = &mut *state;
		let mut inserted = 0;
		for event in events {
			if !state.cancel_keys.insert(event.origin.event_key()) {
				continue;
			}
			if let Some(order) = state.orders.get_mut(&event.order_id) {
				if !order.fillability_status.is_terminal() {
					order.fillability_status = FillabilityStatus::Cancelled;
				}
			}
			state.cancel_events.push(event.clone());
			inserted += 1;
		}
		Ok(inserted)
	}

	async fn insert_nonce_cancel_events(
		&self,
		events: &[NonceCancelEvent],
	) -> Result<usize, StoreError> {
		let mut state = self.state.write().await;
		let mut inserted = 0;
		for event in events {
			if !state.nonce_cancel_keys.insert(event.origin.event_key()) {
				continue;
			}
			state.nonce_cancel_events.push(event.clone());
			inserted += 1;
		}
		Ok(inserted)
	}

	async fn insert_bulk_cancel_events(
		&self,
		events: &[BulkCancelEvent],
	) -> Result<usize, StoreError> {
		let mut state = self.state.write().await;
		let mut inserted = 0;
		for event in events {
			if !state.bulk_cancel_keys.insert(event.origin.event_key()) {
				continue;
			}
			state.bulk_cancel_events.push(event.clone());
			inserted += 1;
		}
		Ok(inserted)
	}

	async fn insert_nft_approval_events(
		&self,
		events: &[NftApprovalEvent],
	) -> Result<usize, StoreError> {
		let mut state = self.state.write().await;
		let state = &mut *state;
		let mut inserted = 0;
		for event in events {
			if !state.nft_approval_keys.insert(event.origin.event_key()) {
				continue;
			}
			state.nft_operator_approvals.insert(
				(event.owner, event.operator, event.origin.address),
				event.approved,
			);
			state.nft_approval_events.push(event.clone());
			inserted += 1;
		}
		Ok(inserted)
	}

	async fn insert_nft_transfer_events(
		&self,
		events: &[NftTransferEvent],
	) -> Result<usize, StoreError> {
		let mut state = self.state.write().await;
		let state = &mut *state;
		let mut inserted = 0;
		for event in events {
			if !state.nft_transfer_keys.insert(event.origin.event_key()) {
				continue;
			}
			let contract = event.origin.address;
			if event.from != Address::ZERO {
				let balance = state
					.nft_balances
					.entry((event.from, contract, event.token_id))
					.or_insert(U256::ZERO);
				*balance = balance.saturating_sub(event.amount);
			}
			if event.to != Address::ZERO {
				let balance = state
					.nft_balances
					.entry((event.to, contract, event.token_id))
					.or_insert(U256::ZERO);
				*balance = balance.saturating_add(event.amount);
			}
			let token = state.token_entry(contract, event.token_id);
			if event.kind == ContractKind::Erc721 {
				token.owner = (event.to != Address::ZERO).then_some(event.to);
			}
			state.nft_transfer_events.push(event.clone());
			inserted += 1;
		}
		Ok(inserted)
	}

	async fn insert_ft_transfer_events(
		&self,
		events: &[FtTransferEvent],
	) -> Result<usize, StoreError> {
		let mut state = self.state.write().await;
		let state = &mut *state;
		let mut inserted = 0;
		for event in events {
			if !state.ft_transfer_keys.insert(event.origin.event_key()) {
				continue;
			}
			let contract = event.origin.address;
			if event.from != Address::ZERO {
				let balance = state
					.ft_balances
					.entry((event.from, contract))
					.or_insert(U256::ZERO);
				*balance = balance.saturating_sub(event.amount);
			}
			if event.to != Address::ZERO {
				let balance = state
					.ft_balances
					.entry((event.to, contract))
					.or_insert(U256::ZERO);
				*balance = balance.saturating_add(event.amount);
			}
			state.ft_transfer_events.push(event.clone());
			inserted += 1;
		}
		Ok(inserted)
	}

	async fn recompute_floor_ask(
		&self,
		set: &TokenSetId,
		trigger: &Trigger,
	) -> Result<Vec<TokenFloorSellEvent>, StoreError> {
		let mut state = self.state.write().await;
		let mut changes = Vec::new();
		for (contract, token_id) in state.covered_tokens(set) {
			let best = state.best_ask(contract, token_id);
			let token = state.token_entry(contract, token_id);
			let previous_id = token.floor_sell_id;
			let previous_value = token.floor_sell_value;
			let (new_id, new_value, new_maker) = match best {
				Some((id, value, maker)) => (Some(id), Some(value), Some(maker)),
				None => (None, None, None),
			};
			if previous_id == new_id && previous_value == new_value {
				continue;
			}
			token.floor_sell_id = new_id;
			token.floor_sell_value = new_value;
			token.floor_sell_maker = new_maker;
			let event = TokenFloorSellEvent {
				kind: trigger.kind,
				contract,
				token_id,
				order_id: new_id,
				maker: new_maker,
				price: new_value,
				previous_price: previous_value,
				tx_hash: trigger.tx_hash,
				tx_timestamp: trigger.tx_timestamp,
			};
			state.floor_sell_events.push(event.clone());
			changes.push(event);
		}
		Ok(changes)
	}

	async fn recompute_token_top_buy(
		&self,
		set: &TokenSetId,
	) -> Result<Vec<TopBuyChange>, StoreError> {
		let mut state = self.state.write().await;
		let mut changes = Vec::new();
		for (contract, token_id) in state.covered_tokens(set) {
			let owner = state
				.tokens
				.get(&(contract, token_id))
				.and_then(|t| t.owner);
			let best = state.best_token_bid(contract, token_id, owner);
			let token = state.token_entry(contract, token_id);
			let previous_id = token.top_buy_id;
			let previous_value = token.top_buy_value;
			let (new_id, new_value, new_maker) = match best {
				Some((id, value, maker)) => (Some(id), Some(value), Some(maker)),
				None => (None, None, None),
			};
			if previous_id == new_id && previous_value == new_value {
				continue;
			}
			token.top_buy_id = new_id;
			token.top_buy_value = new_value;
			token.top_buy_maker = new_maker;
			changes.push(TopBuyChange {
				contract,
				token_id: Some(token_id),
				order_id: new_id,
				maker: new_maker,
				value: new_value,
				previous_value,
			});
		}
		Ok(changes)
	}

	async fn recompute_set_top_buy(
		&self,
		set: &TokenSetId,
	) -> Result<Option<TopBuyChange>, StoreError> {
		if set.is_single_token() {
			error!(token_set = %set, "Single-token sets are cached on the token row");
			return Ok(None);
		}
		let mut state = self.state.write().await;
		let best = state.best_set_bid(set);
		let key = set.to_string();
		let row = state
			.token_sets
			.entry(key)
			.or_insert_with(|| TokenSetRow::new(set.clone()));
		let previous_id = row.top_buy_id;
		let previous_value = row.top_buy_value;
		let (new_id, new_value, new_maker) = match best {
			Some((id, value, maker)) => (Some(id), Some(value), Some(maker)),
			None => (None, None, None),
		};
		if previous_id == new_id && previous_value == new_value {
			return Ok(None);
		}
		row.top_buy_id = new_id;
		row.top_buy_value = new_value;
		row.top_buy_maker = new_maker;
		Ok(Some(TopBuyChange {
			contract: set.contract(),
			token_id: None,
			order_id: new_id,
			maker: new_maker,
			value: new_value,
			previous_value,
		}))
	}

	async fn revalidate_buy_balance(
		&self,
		maker: Address,
		currency: Address,
		timestamp: u64,
		limit: usize,
	) -> Result<Vec<OrderId>, StoreError> {
		let mut state = self.state.write().await;
		let state = &mut *state;
		let mut candidates: Vec<OrderId> = state
			.orders
			.values()
			.filter(|o| {
				o.maker == maker
					&& o.side == Side::Buy
					&& o.currency == currency
					&& o.fillability_status.is_open()
					&& o.valid_until.map_or(true, |t| t > timestamp)
			})
			.map(|o| o.id)
			.collect();
		candidates.sort();

		let balance = state
			.ft_balances
			.get(&(maker, currency))
			.copied()
			.unwrap_or(U256::ZERO);
		let mut changed = Vec::new();
		for id in &candidates {
			if changed.len() == limit {
				break;
			}
			if let Some(order) = state.orders.get_mut(id) {
				let required = order.price.saturating_mul(order.quantity_remaining);
				let new_status = if balance >= required {
					FillabilityStatus::Fillable
				} else {
					FillabilityStatus::NoBalance
				};
				if order.fillability_status != new_status {
					order.fillability_status = new_status;
					changed.push(*id);
				}
			}
		}
		Ok(changed)
	}

	async fn revalidate_sell_balance(
		&self,
		maker: Address,
		contract: Address,
		token_id: U256,
		timestamp: u64,
		limit: usize,
	) -> Result<Vec<OrderId>, StoreError> {
		let mut state = self.state.write().await;
		let state = &mut *state;
		let mut candidates: Vec<OrderId> = state
			.orders
			.values()
			.filter(|o| {
				o.maker == maker
					&& o.side == Side::Sell
					&& o.token_set_id.contains(contract, token_id)
					&& o.fillability_status.is_open()
					&& o.valid_until.map_or(true, |t| t > timestamp)
			})
			.map(|o| o.id)
			.collect();
		candidates.sort();

		let balance = state
			.nft_balances
			.get(&(maker, contract, token_id))
			.copied()
			.unwrap_or(U256::ZERO);
		let mut changed = Vec::new();
		for id in &candidates {
			if changed.len() == limit {
				break;
			}
			if let Some(order) = state.orders.get_mut(id) {
				let new_status = if balance >= order.quantity_remaining {
					FillabilityStatus::Fillable
				} else {
					FillabilityStatus::NoBalance
				};
				if order.fillability_status != new_status {
					order.fillability_status = new_status;
					changed.push(*id);
				}
			}
		}
		Ok(changed)
	}

	async fn revalidate_sell_approval(
		&self,
		maker: Address,
		contract: Address,
		operator: Address,
		approved: bool,
	) -> Result<Vec<OrderId>, StoreError> {
		let mut state = self.state.write().await;
		let new_status = if approved {
			ApprovalStatus::Approved
		} else {
			ApprovalStatus::NoApproval
		};
		let mut changed = Vec::new();
		for order in state.orders.values_mut() {
			if order.maker == maker
				&& order.side == Side::Sell
				&& order.token_set_id.contract() == contract
				&& order.conduit == Some(operator)
				&& order.fillability_status.is_open()
				&& order.approval_status != new_status
			{
				order.approval_status = new_status;
				changed.push(order.id);
			}
		}
		changed.sort();
		Ok(changed)
	}

	async fn revalidate_buy_approval(
		&self,
		maker: Address,
		currency: Address,
		operator: Address,
	) -> Result<Vec<OrderId>, StoreError> {
		let mut state = self.state.write().await;
		let state = &mut *state;
		let allowance = state
			.ft_approvals
			.get(&(maker, operator, currency))
			.copied()
			.unwrap_or(U256::ZERO);
		let mut changed = Vec::new();
		for order in state.orders.values_mut() {
			if order.maker != maker
				|| order.side != Side::Buy
				|| order.currency != currency
				|| order.conduit != Some(operator)
				|| !order.fillability_status.is_open()
			{
				continue;
			}
			let required = order.price.saturating_mul(order.quantity_remaining);
			let new_status = if allowance >= required {
				ApprovalStatus::Approved
			} else {
				ApprovalStatus::NoApproval
			};
			if order.approval_status != new_status {
				order.approval_status = new_status;
				changed.push(order.id);
			}
		}
		changed.sort();
		Ok(changed)
	}

	async fn conduits_for_buy_orders(
		&self,
		maker: Address,
		kind: OrderKind,
	) -> Result<Vec<Address>, StoreError> {
		let state = self.state.read().await;
		let mut conduits: Vec<Address> = state
			.orders
			.values()
			.filter(|o| {
				o.maker == maker
					&& o.kind == kind
					&& o.side == Side::Buy
					&& o.fillability_status.is_open()
			})
			.filter_map(|o| o.conduit)
			.collect();
		conduits.sort();
		conduits.dedup();
		Ok(conduits)
	}

	async fn revalidate_bundles_balance(
		&self,
		maker: Address,
		contract: Address,
		token_id: U256,
		timestamp: u64,
	) -> Result<Vec<OrderId>, StoreError> {
		let mut state = self.state.write().await;
		let state = &mut *state;
		let mut candidates: Vec<OrderId> = state
			.orders
			.values()
			.filter(|o| {
				o.maker == maker
					&& o.side == Side::Bundle
					&& o.fillability_status.is_open()
					&& o.bundle_legs.iter().any(|leg| {
						leg.contract == contract
							&& (leg.token_id.is_none() || leg.token_id == Some(token_id))
					})
			})
			.map(|o| o.id)
			.collect();
		candidates.sort();

		let mut changed = Vec::new();
		for id in candidates {
			let Some(order) = state.orders.get(&id) else {
				continue;
			};
			let mut all_fillable = true;
			let mut earliest_failing: Option<u64> = None;
			for leg in &order.bundle_legs {
				let funded = match leg.kind {
					BundleLegKind::Nft => {
						let key = (maker, leg.contract, leg.token_id.unwrap_or(U256::ZERO));
						state
							.nft_balances
							.get(&key)
							.copied()
							.unwrap_or(U256::ZERO) >= leg.amount
					}
					BundleLegKind::Ft => {
						state
							.ft_balances
							.get(&(maker, leg.contract))
							.copied()
							.unwrap_or(U256::ZERO) >= leg.amount
					}
				};
				let unexpired = leg.valid_until.map_or(true, |t| t > timestamp);
				if !funded || !unexpired {
					all_fillable = false;
					// A failing leg bounds the bundle at its own expiry, or
					// at the trigger time when it carries none.
					let t = leg.valid_until.unwrap_or(timestamp);
					earliest_failing = Some(earliest_failing.map_or(t, |current| current.min(t)));
				}
			}
			let new_status = if all_fillable {
				FillabilityStatus::Fillable
			} else {
				FillabilityStatus::NoBalance
			};
			// The expiration is derived, not accumulated: earliest failing
			// leg's bound while any leg fails, unbounded once all legs are
			// fillable again.
			let new_valid_until = if all_fillable { None } else { earliest_failing };
			if let Some(order) = state.orders.get_mut(&id) {
				let mut touched = false;
				if order.fillability_status != new_status {
					order.fillability_status = new_status;
					touched = true;
				}
				if order.valid_until != new_valid_until {
					order.valid_until = new_valid_until;
					touched = true;
				}
				if touched {
					changed.push(id);
				}
			}
		}
		Ok(changed)
	}

	async fn revalidate_bundles_approval(
		&self,
		maker: Address,
		contract: Address,
		operator: Address,
		timestamp: u64,
	) -> Result<Vec<OrderId>, StoreError> {
		let mut state = self.state.write().await;
		let state = &mut *state;
		let mut candidates: Vec<OrderId> = state
			.orders
			.values()
			.filter(|o| {
				o.maker == maker
					&& o.side == Side::Bundle
					&& o.fillability_status.is_open()
					&& o.valid_until.map_or(true, |t| t > timestamp)
					&& o.bundle_legs.iter().any(|leg| leg.contract == contract)
			})
			.map(|o| o.id)
			.collect();
		candidates.sort();

		let mut changed = Vec::new();
		for id in candidates {
			let Some(order) = state.orders.get(&id) else {
				continue;
			};
			let all_approved = order.bundle_legs.iter().all(|leg| match leg.kind {
				BundleLegKind::Nft => state
					.nft_operator_approvals
					.get(&(maker, operator, leg.contract))
					.copied()
					.unwrap_or(false),
				BundleLegKind::Ft => {
					state
						.ft_approvals
						.get(&(maker, operator, leg.contract))
						.copied()
						.unwrap_or(U256::ZERO) >= leg.amount
				}
			});
			let new_status = if all_approved {
				ApprovalStatus::Approved
			} else {
				ApprovalStatus::NoApproval
			};
			if let Some(order) = state.orders.get_mut(&id) {
				if order.approval_status != new_status {
					order.approval_status = new_status;
					changed.push(id);
				}
			}
		}
		Ok(changed)
	}

	async fn bulk_cancel_orders(
		&self,
		kind: OrderKind,
		maker: Address,
		min_nonce: U256,
		side: Option<Side>,
	) -> Result<Vec<OrderId>, StoreError> {
		let mut state = self.state.write().await;
		let mut affected = Vec::new();
		for order in state.orders.values_mut() {
			if order.kind != kind
				|| order.maker != maker
				|| !order.fillability_status.is_open()
			{
				continue;
			}
			if matches!(side, Some(s) if order.side != s) {
				continue;
			}
			if matches!(order.nonce, Some(n) if n < min_nonce) {
				order.fillability_status = FillabilityStatus::Cancelled;
				affected.push(order.id);
			}
		}
		affected.sort();
		Ok(affected)
	}

	async fn cancel_orders_with_nonces(
		&self,
		kind: OrderKind,
		maker: Address,
		nonces: &[U256],
	) -> Result<Vec<OrderId>, StoreError> {
		let mut state = self.state.write().await;
		let mut affected = Vec::new();
		for order in state.orders.values_mut() {
			if order.kind != kind
				|| order.maker != maker
				|| !order.fillability_status.is_open()
			{
				continue;
			}
			if matches!(order.nonce, Some(n) if nonces.contains(&n)) {
				order.fillability_status = FillabilityStatus::Cancelled;
				affected.push(order.id);
			}
		}
		affected.sort();
		Ok(affected)
	}

	async fn fill_events(&self) -> Result<Vec<FillEvent>, StoreError> {
		Ok(self.state.read().await.fill_events.clone())
	}

	async fn floor_sell_events(
		&self,
		contract: Address,
		token_id: U256,
	) -> Result<Vec<TokenFloorSellEvent>, StoreError> {
		let state = self.state.read().await;
		Ok(state
			.floor_sell_events
			.iter()
			.filter(|e| e.contract == contract && e.token_id == token_id)
			.cloned()
			.collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use indexer_types::{EventOrigin, TriggerKind};

	fn order(id_byte: u8, side: Side, set: TokenSetId, value: u64) -> OrderRecord {
		OrderRecord {
			id: B256::repeat_byte(id_byte),
			kind: OrderKind::ZeroexV4Erc721,
			side,
			fillability_status: FillabilityStatus::Fillable,
			approval_status: ApprovalStatus::Approved,
			token_set_id: set,
			maker: Address::repeat_byte(id_byte),
			taker: Address::ZERO,
			price: U256::from(value),
			value: U256::from(value),
			currency: Address::ZERO,
			currency_price: U256::from(value),
			currency_value: U256::from(value),
			quantity_remaining: U256::from(1),
			nonce: None,
			valid_from: 0,
			valid_until: None,
			fee_bps: 0,
			fee_breakdown: Vec::new(),
			missing_royalties: Vec::new(),
			conduit: None,
			source: None,
			raw_data: serde_json::Value::Null,
			block_number: None,
			log_index: None,
			bundle_legs: Vec::new(),
		}
	}

	fn origin(contract: Address, log_index: u64) -> EventOrigin {
		EventOrigin {
			address: contract,
			tx_hash: B256::repeat_byte(0xaa),
			block: 100,
			block_hash: B256::repeat_byte(0xbb),
			log_index,
			batch_index: 1,
			timestamp: 1_700_000_000,
		}
	}

	fn single(contract: Address, token_id: u64) -> TokenSetId {
		TokenSetId::SingleToken {
			contract,
			token_id: U256::from(token_id),
		}
	}

	#[tokio::test]
	async fn insert_is_first_writer_wins() {
		let store = MemoryStore::new();
		let contract = Address::repeat_byte(0x01);
		let first = order(1, Side::Sell, single(contract, 1), 100);
		let mut second = first.clone();
		second.value = U256::from(50);

		assert!(store.insert_order_if_absent(first).await.unwrap());
		assert!(!store.insert_order_if_absent(second).await.unwrap());
		let stored = store.get_order(B256::repeat_byte(1)).await.unwrap().unwrap();
		assert_eq!(stored.value, U256::from(100));
	}

	#[tokio::test]
	async fn fill_events_are_idempotent_and_flip_status() {
		let store = MemoryStore::new();
		let contract = Address::repeat_byte(0x01);
		let ask = order(1, Side::Sell, single(contract, 1), 100);
		let id = ask.id;
		store.insert_order_if_absent(ask).await.unwrap();

		let fill = FillEvent {
			order_kind: OrderKind::ZeroexV4Erc721,
			order_id: id,
			order_side: Side::Sell,
			maker: Address::repeat_byte(1),
			taker: Address::repeat_byte(9),
			price: U256::from(100),
			currency: Address::ZERO,
			currency_price: U256::from(100),
			usd_price: None,
			contract,
			token_id: U256::from(1),
			amount: U256::from(1),
			order_source: None,
			fill_source: None,
			aggregator_source: None,
			origin: origin(contract, 5),
		};
		assert_eq!(store.insert_fill_events(&[fill.clone()]).await.unwrap(), 1);
		assert_eq!(store.insert_fill_events(&[fill]).await.unwrap(), 0);

		let stored = store.get_order(id).await.unwrap().unwrap();
		assert_eq!(stored.fillability_status, FillabilityStatus::Filled);
		assert!(stored.quantity_remaining.is_zero());
		assert_eq!(store.fill_events().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn floor_recompute_tracks_the_cheapest_active_ask() {
		let store = MemoryStore::new();
		let contract = Address::repeat_byte(0x01);
		let set = single(contract, 1);
		store.save_token_set(set.clone()).await.unwrap();
		store
			.insert_order_if_absent(order(1, Side::Sell, set.clone(), 100))
			.await
			.unwrap();
		store
			.insert_order_if_absent(order(2, Side::Sell, set.clone(), 80))
			.await
			.unwrap();

		let trigger = Trigger::new(TriggerKind::NewOrder);
		let changes = store.recompute_floor_ask(&set, &trigger).await.unwrap();
		assert_eq!(changes.len(), 1);
		assert_eq!(changes[0].price, Some(U256::from(80)));
		assert_eq!(changes[0].previous_price, None);

		// Same state recomputed again: no write, no history row.
		assert!(store
			.recompute_floor_ask(&set, &trigger)
			.await
			.unwrap()
			.is_empty());

		// Cancelling the floor order moves the floor up.
		store.cancel_order(B256::repeat_byte(2)).await.unwrap();
		let trigger = Trigger::new(TriggerKind::Cancel);
		let changes = store.recompute_floor_ask(&set, &trigger).await.unwrap();
		assert_eq!(changes.len(), 1);
		assert_eq!(changes[0].price, Some(U256::from(100)));
		assert_eq!(changes[0].previous_price, Some(U256::from(80)));

		let history = store
			.floor_sell_events(contract, U256::from(1))
			.await
			.unwrap();
		assert_eq!(history.len(), 2);
	}

	#[tokio::test]
	async fn top_bid_excludes_the_current_owner() {
		let store = MemoryStore::new();
		let contract = Address::repeat_byte(0x01);
		let set = single(contract, 1);
		store.save_token_set(set.clone()).await.unwrap();

		// Bidder 3 is the token owner; their higher bid must not win.
		store
			.set_token_owner(contract, U256::from(1), Some(Address::repeat_byte(3)))
			.await
			.unwrap();
		store
			.insert_order_if_absent(order(3, Side::Buy, set.clone(), 200))
			.await
			.unwrap();
		store
			.insert_order_if_absent(order(4, Side::Buy, set.clone(), 150))
			.await
			.unwrap();

		let changes = store.recompute_token_top_buy(&set).await.unwrap();
		assert_eq!(changes.len(), 1);
		assert_eq!(changes[0].order_id, Some(B256::repeat_byte(4)));
		assert_eq!(changes[0].value, Some(U256::from(150)));
	}

	#[tokio::test]
	async fn bulk_cancel_scopes_by_nonce_and_side() {
		let store = MemoryStore::new();
		let contract = Address::repeat_byte(0x01);
		let maker = Address::repeat_byte(7);

		let mut sell = order(1, Side::Sell, single(contract, 1), 100);
		sell.maker = maker;
		sell.nonce = Some(U256::from(3));
		let mut buy = order(2, Side::Buy, single(contract, 1), 100);
		buy.maker = maker;
		buy.nonce = Some(U256::from(4));
		let mut high = order(3, Side::Sell, single(contract, 2), 100);
		high.maker = maker;
		high.nonce = Some(U256::from(9));

		for o in [sell, buy, high] {
			store.insert_order_if_absent(o).await.unwrap();
		}

		// Sell-side bump to 5: cancels nonce 3 but not the buy or nonce 9.
		let affected = store
			.bulk_cancel_orders(OrderKind::ZeroexV4Erc721, maker, U256::from(5), Some(Side::Sell))
			.await
			.unwrap();
		assert_eq!(affected, vec![B256::repeat_byte(1)]);

		// Unscoped bump catches the remaining buy order.
		let affected = store
			.bulk_cancel_orders(OrderKind::ZeroexV4Erc721, maker, U256::from(5), None)
			.await
			.unwrap();
		assert_eq!(affected, vec![B256::repeat_byte(2)]);
	}

	#[tokio::test]
	async fn expiry_is_terminal() {
		let store = MemoryStore::new();
		let contract = Address::repeat_byte(0x01);
		let mut ask = order(1, Side::Sell, single(contract, 1), 100);
		ask.valid_until = Some(1000);
		let id = ask.id;
		store.insert_order_if_absent(ask).await.unwrap();

		let expired = store.expire_overdue_orders(1001).await.unwrap();
		assert_eq!(expired.len(), 1);

		// A later revalidation may not resurrect the order.
		let candidates = store
			.revalidate_sell_balance(
				Address::repeat_byte(1),
				contract,
				U256::from(1),
				1002,
				100,
			)
			.await
			.unwrap();
		assert!(candidates.is_empty());
		let stored = store.get_order(id).await.unwrap().unwrap();
		assert_eq!(stored.fillability_status, FillabilityStatus::Expired);
	}

	#[tokio::test]
	async fn erc721_transfers_maintain_ownership_and_balances() {
		let store = MemoryStore::new();
		let contract = Address::repeat_byte(0x01);
		let from = Address::repeat_byte(5);
		let to = Address::repeat_byte(6);
		store
			.set_nft_balance(from, contract, U256::from(1), U256::from(1))
			.await
			.unwrap();

		let transfer = NftTransferEvent {
			kind: ContractKind::Erc721,
			from,
			to,
			token_id: U256::from(1),
			amount: U256::from(1),
			origin: origin(contract, 3),
		};
		assert_eq!(
			store.insert_nft_transfer_events(&[transfer]).await.unwrap(),
			1
		);

		let token = store.get_token(contract, U256::from(1)).await.unwrap().unwrap();
		assert_eq!(token.owner, Some(to));
		assert!(store
			.nft_balance(from, contract, U256::from(1))
			.await
			.unwrap()
			.is_zero());
		assert_eq!(
			store.nft_balance(to, contract, U256::from(1)).await.unwrap(),
			U256::from(1)
		);
	}
}
