//! Store module for the indexing core.
//!
//! The relational store is the single source of truth and the only point of
//! mutual exclusion in the system. Every cache mutation is expressed as
//! "recompute from current committed state and write conditionally" and is
//! exposed here as one atomic operation, so callers never get a
//! read-then-write race window. Canonical event inserts are idempotent:
//! deduplicated by their natural composite key, duplicates are ignored.

use async_trait::async_trait;
use thiserror::Error;

use indexer_types::{
	Address, BulkCancelEvent, CancelEvent, FillEvent, FtTransferEvent, NftApprovalEvent,
	NftTransferEvent, NonceCancelEvent, OrderId, OrderKind, OrderRecord, OrderingKey, Side,
	TokenFloorSellEvent, TokenSetId, Trigger, U256,
};

pub mod implementations {
	pub mod memory;
}

mod types;

pub use implementations::memory::MemoryStore;
pub use types::{Token, TokenSetRow, TopBuyChange};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
	/// Two payloads resolved to the same deterministic id with conflicting
	/// immutable fields. Logged at error severity and skipped by callers.
	#[error("Conflicting order for id {0}")]
	ConflictingOrder(OrderId),
	/// Error in the storage backend. Fatal to the current batch.
	#[error("Backend error: {0}")]
	Backend(String),
}

/// Typed interface to the order store.
///
/// Implementations must make every method atomic with respect to each other;
/// the default backend takes a single writer lock per operation.
#[async_trait]
pub trait StoreInterface: Send + Sync {
	// Orders

	async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>, StoreError>;

	/// First-insert path with conflict-ignore semantics: returns `false` and
	/// leaves the stored row untouched when the id already exists.
	async fn insert_order_if_absent(&self, order: OrderRecord) -> Result<bool, StoreError>;

	/// Explicit update path for reprice-in-place. The caller is responsible
	/// for having merged `raw_data` with the previously stored payload.
	async fn update_order(&self, order: OrderRecord) -> Result<(), StoreError>;

	/// Marks an order cancelled unless it is already terminal. Returns
	/// whether the status changed.
	async fn cancel_order(&self, id: OrderId) -> Result<bool, StoreError>;

	/// Marks every fillable order whose validity window has passed as
	/// expired and returns the affected records for re-reconciliation.
	async fn expire_overdue_orders(&self, now: u64) -> Result<Vec<OrderRecord>, StoreError>;

	// Adapter-side checks

	/// Whether a cancel of this order was recorded causally after `key`.
	async fn has_cancel_after(&self, id: OrderId, key: OrderingKey) -> Result<bool, StoreError>;

	/// Whether a fill of this order was recorded causally after `key`.
	async fn has_fill_after(&self, id: OrderId, key: OrderingKey) -> Result<bool, StoreError>;

	/// Whether an open order of this kind already uses `nonce` for the given
	/// maker/contract at a different per-item price. A same-price match would
	/// have produced the same deterministic id and is caught earlier.
	async fn nonce_in_use(
		&self,
		kind: OrderKind,
		maker: Address,
		contract: Address,
		nonce: U256,
		unit_price: U256,
	) -> Result<bool, StoreError>;

	/// Last observed master nonce of a maker (zero when never observed).
	async fn master_nonce(&self, maker: Address) -> Result<U256, StoreError>;

	async fn set_master_nonce(&self, maker: Address, nonce: U256) -> Result<(), StoreError>;

	// Token sets & tokens

	/// Registers a token set (and, for single-token sets, the token row).
	/// Idempotent.
	async fn save_token_set(&self, set: TokenSetId) -> Result<(), StoreError>;

	async fn ensure_token(&self, contract: Address, token_id: U256) -> Result<(), StoreError>;

	async fn get_token(&self, contract: Address, token_id: U256)
		-> Result<Option<Token>, StoreError>;

	async fn get_token_set(&self, set: &TokenSetId) -> Result<Option<TokenSetRow>, StoreError>;

	async fn set_token_owner(
		&self,
		contract: Address,
		token_id: U256,
		owner: Option<Address>,
	) -> Result<(), StoreError>;

	// Balances & approvals

	async fn nft_balance(
		&self,
		owner: Address,
		contract: Address,
		token_id: U256,
	) -> Result<U256, StoreError>;

	async fn set_nft_balance(
		&self,
		owner: Address,
		contract: Address,
		token_id: U256,
		amount: U256,
	) -> Result<(), StoreError>;

	async fn ft_balance(&self, owner: Address, contract: Address) -> Result<U256, StoreError>;

	async fn set_ft_balance(
		&self,
		owner: Address,
		contract: Address,
		amount: U256,
	) -> Result<(), StoreError>;

	async fn ft_approval(
		&self,
		owner: Address,
		spender: Address,
		contract: Address,
	) -> Result<U256, StoreError>;

	async fn set_ft_approval(
		&self,
		owner: Address,
		spender: Address,
		contract: Address,
		value: U256,
	) -> Result<(), StoreError>;

	async fn nft_approval(
		&self,
		owner: Address,
		operator: Address,
		contract: Address,
	) -> Result<bool, StoreError>;

	async fn set_nft_approval(
		&self,
		owner: Address,
		operator: Address,
		contract: Address,
		approved: bool,
	) -> Result<(), StoreError>;

	// Canonical events (append-only, idempotent)

	/// Persists fill events and flips the referenced orders' state: quantity
	/// remaining is reduced by the filled amount and the order is marked
	/// filled once none remains. A fill overrides a no-balance-looking state
	/// but never reverts an already-terminal order. Returns the number of
	/// newly inserted rows.
	async fn insert_fill_events(&self, events: &[FillEvent]) -> Result<usize, StoreError>;

	/// Persists cancel events and marks the referenced orders cancelled
	/// (unless already terminal).
	async fn insert_cancel_events(&self, events: &[CancelEvent]) -> Result<usize, StoreError>;

	async fn insert_nonce_cancel_events(
		&self,
		events: &[NonceCancelEvent],
	) -> Result<usize, StoreError>;

	async fn insert_bulk_cancel_events(
		&self,
		events: &[BulkCancelEvent],
	) -> Result<usize, StoreError>;

	/// Persists approval events and updates the operator-approval
	/// bookkeeping used by fillability checks.
	async fn insert_nft_approval_events(
		&self,
		events: &[NftApprovalEvent],
	) -> Result<usize, StoreError>;

	/// Persists NFT transfers and maintains balances and (for ERC-721)
	/// token ownership.
	async fn insert_nft_transfer_events(
		&self,
		events: &[NftTransferEvent],
	) -> Result<usize, StoreError>;

	/// Persists fungible transfers and maintains fungible balances.
	async fn insert_ft_transfer_events(
		&self,
		events: &[FtTransferEvent],
	) -> Result<usize, StoreError>;

	// Cache reconciliation

	/// Recomputes the floor ask of every cached token covered by the set and
	/// conditionally writes it. A `TokenFloorSellEvent` is appended for each
	/// token whose cached floor actually changed; unchanged tokens produce
	/// no write and no event.
	async fn recompute_floor_ask(
		&self,
		set: &TokenSetId,
		trigger: &Trigger,
	) -> Result<Vec<TokenFloorSellEvent>, StoreError>;

	/// Recomputes the per-token top bid for every cached token covered by
	/// the set, excluding each token's current owner as maker. Returns the
	/// tokens whose cached top bid changed.
	async fn recompute_token_top_buy(
		&self,
		set: &TokenSetId,
	) -> Result<Vec<TopBuyChange>, StoreError>;

	/// Recomputes the top bid of a non-single-token set (orders placed on
	/// exactly this set). Returns the change when the cached value differed.
	async fn recompute_set_top_buy(
		&self,
		set: &TokenSetId,
	) -> Result<Option<TopBuyChange>, StoreError>;

	// Maker-wide revalidation

	/// Rechecks buy-side fillability of the maker's open orders priced in
	/// `currency` against the current fungible balance. Only rows whose
	/// status differs are written; their ids are returned. At most `limit`
	/// rows are updated per call, so a continuation run makes progress
	/// (already-corrected rows no longer differ).
	async fn revalidate_buy_balance(
		&self,
		maker: Address,
		currency: Address,
		timestamp: u64,
		limit: usize,
	) -> Result<Vec<OrderId>, StoreError>;

	/// Rechecks sell-side fillability of the maker's open orders covering
	/// `(contract, token_id)` against the current NFT balance. Same changed
	/// rows only / `limit` updates contract as `revalidate_buy_balance`.
	async fn revalidate_sell_balance(
		&self,
		maker: Address,
		contract: Address,
		token_id: U256,
		timestamp: u64,
		limit: usize,
	) -> Result<Vec<OrderId>, StoreError>;

	/// Flips the approval status of the maker's open sell orders on
	/// `contract` whose conduit is `operator`, where it differs. Returns the
	/// ids whose status flipped.
	async fn revalidate_sell_approval(
		&self,
		maker: Address,
		contract: Address,
		operator: Address,
		approved: bool,
	) -> Result<Vec<OrderId>, StoreError>;

	/// Rechecks the approval status of the maker's open buy orders with
	/// conduit `operator` against the stored fungible allowance.
	async fn revalidate_buy_approval(
		&self,
		maker: Address,
		currency: Address,
		operator: Address,
	) -> Result<Vec<OrderId>, StoreError>;

	/// Distinct conduits of the maker's open buy orders of one kind.
	async fn conduits_for_buy_orders(
		&self,
		maker: Address,
		kind: OrderKind,
	) -> Result<Vec<Address>, StoreError>;

	/// Revalidates the maker's bundle orders with a leg on
	/// `(contract, token_id)`: a bundle is fillable only if every leg is.
	/// Its expiration is derived fresh on every run: the earliest failing
	/// leg's bound (the trigger time for a failing leg without one) while
	/// any leg fails, unbounded again once every leg is fillable. Returns
	/// the ids that changed.
	async fn revalidate_bundles_balance(
		&self,
		maker: Address,
		contract: Address,
		token_id: U256,
		timestamp: u64,
	) -> Result<Vec<OrderId>, StoreError>;

	/// Approval-driven counterpart of bundle revalidation.
	async fn revalidate_bundles_approval(
		&self,
		maker: Address,
		contract: Address,
		operator: Address,
		timestamp: u64,
	) -> Result<Vec<OrderId>, StoreError>;

	/// Single bulk cancellation of every open order of the maker (and kind)
	/// with `nonce < min_nonce`, optionally side-scoped. Returns every
	/// affected order id so callers can re-reconcile without N+1 roundtrips.
	async fn bulk_cancel_orders(
		&self,
		kind: OrderKind,
		maker: Address,
		min_nonce: U256,
		side: Option<Side>,
	) -> Result<Vec<OrderId>, StoreError>;

	/// Cancels the maker's open orders carrying any of the given nonces.
	async fn cancel_orders_with_nonces(
		&self,
		kind: OrderKind,
		maker: Address,
		nonces: &[U256],
	) -> Result<Vec<OrderId>, StoreError>;

	// Introspection

	async fn fill_events(&self) -> Result<Vec<FillEvent>, StoreError>;

	async fn floor_sell_events(
		&self,
		contract: Address,
		token_id: U256,
	) -> Result<Vec<TokenFloorSellEvent>, StoreError>;
}
