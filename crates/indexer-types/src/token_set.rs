//! Token sets: the set of tokens an order applies to.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// Identifies the tokens an order covers: a single token, a contiguous
/// range, a whole collection, or an explicit list (attribute-based sets are
/// materialized as lists by the time they reach the core).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TokenSetId {
	SingleToken {
		contract: Address,
		token_id: U256,
	},
	TokenRange {
		contract: Address,
		start_token_id: U256,
		end_token_id: U256,
	},
	ContractWide {
		contract: Address,
	},
	TokenList {
		contract: Address,
		merkle_root: B256,
		token_ids: Vec<U256>,
	},
}

impl TokenSetId {
	pub fn contract(&self) -> Address {
		match self {
			TokenSetId::SingleToken { contract, .. }
			| TokenSetId::TokenRange { contract, .. }
			| TokenSetId::ContractWide { contract }
			| TokenSetId::TokenList { contract, .. } => *contract,
		}
	}

	/// Single-token sets are reconciled through the token cache; everything
	/// else goes through the token-set cache.
	pub fn is_single_token(&self) -> bool {
		matches!(self, TokenSetId::SingleToken { .. })
	}

	/// Whether the set covers the given token.
	pub fn contains(&self, contract: Address, token_id: U256) -> bool {
		if self.contract() != contract {
			return false;
		}
		match self {
			TokenSetId::SingleToken { token_id: id, .. } => *id == token_id,
			TokenSetId::TokenRange {
				start_token_id,
				end_token_id,
				..
			} => *start_token_id <= token_id && token_id <= *end_token_id,
			TokenSetId::ContractWide { .. } => true,
			TokenSetId::TokenList { token_ids, .. } => token_ids.contains(&token_id),
		}
	}
}

impl std::fmt::Display for TokenSetId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			TokenSetId::SingleToken { contract, token_id } => {
				write!(f, "token:{contract}:{token_id}")
			}
			TokenSetId::TokenRange {
				contract,
				start_token_id,
				end_token_id,
			} => write!(f, "range:{contract}:{start_token_id}:{end_token_id}"),
			TokenSetId::ContractWide { contract } => write!(f, "contract:{contract}"),
			TokenSetId::TokenList {
				contract,
				merkle_root,
				..
			} => write!(f, "list:{contract}:{merkle_root}"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn containment() {
		let contract = Address::repeat_byte(0x11);
		let other = Address::repeat_byte(0x22);

		let single = TokenSetId::SingleToken {
			contract,
			token_id: U256::from(7),
		};
		assert!(single.contains(contract, U256::from(7)));
		assert!(!single.contains(contract, U256::from(8)));
		assert!(!single.contains(other, U256::from(7)));

		let range = TokenSetId::TokenRange {
			contract,
			start_token_id: U256::from(10),
			end_token_id: U256::from(20),
		};
		assert!(range.contains(contract, U256::from(10)));
		assert!(range.contains(contract, U256::from(20)));
		assert!(!range.contains(contract, U256::from(21)));

		let wide = TokenSetId::ContractWide { contract };
		assert!(wide.contains(contract, U256::from(12345)));
		assert!(!wide.contains(other, U256::from(12345)));
	}
}
