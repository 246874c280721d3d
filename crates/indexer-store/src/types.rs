//! Cached rows derived from committed order state.

use serde::{Deserialize, Serialize};

use indexer_types::{Address, OrderId, TokenSetId, U256};

/// Per-token cache row. The floor ask and top bid are denormalizations of the
/// order table; they are only ever written through the conditional recompute
/// operations, never directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
	pub contract: Address,
	pub token_id: U256,
	/// Current owner, maintained from ERC-721 transfers. `None` for burned
	/// tokens and for ERC-1155 tokens, which have no single owner.
	pub owner: Option<Address>,
	pub floor_sell_id: Option<OrderId>,
	pub floor_sell_value: Option<U256>,
	pub floor_sell_maker: Option<Address>,
	pub top_buy_id: Option<OrderId>,
	pub top_buy_value: Option<U256>,
	pub top_buy_maker: Option<Address>,
}

impl Token {
	pub fn new(contract: Address, token_id: U256) -> Self {
		Self {
			contract,
			token_id,
			owner: None,
			floor_sell_id: None,
			floor_sell_value: None,
			floor_sell_maker: None,
			top_buy_id: None,
			top_buy_value: None,
			top_buy_maker: None,
		}
	}
}

/// Cache row for a non-single-token set: the top bid placed on exactly this
/// set (range, contract-wide or list).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSetRow {
	pub id: TokenSetId,
	pub top_buy_id: Option<OrderId>,
	pub top_buy_value: Option<U256>,
	pub top_buy_maker: Option<Address>,
}

impl TokenSetRow {
	pub fn new(id: TokenSetId) -> Self {
		Self {
			id,
			top_buy_id: None,
			top_buy_value: None,
			top_buy_maker: None,
		}
	}
}

/// One top-bid cache transition, reported by the recompute operations so the
/// reconciler can log and chain further work off actual changes only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopBuyChange {
	pub contract: Address,
	/// `None` for set-level changes.
	pub token_id: Option<U256>,
	pub order_id: Option<OrderId>,
	pub maker: Option<Address>,
	pub value: Option<U256>,
	pub previous_value: Option<U256>,
}
