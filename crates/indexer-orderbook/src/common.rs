//! Helpers shared by every adapter's save pipeline.

use serde_json::Value;

use indexer_store::StoreInterface;
use indexer_types::{
	update_is_latest, Address, ApprovalStatus, FillabilityStatus, OrderId, OrderRecord,
	OrderingKey, U256,
};

use crate::OrderbookError;

pub use indexer_types::order_id;

/// How an incoming payload relates to the stored record for the same id.
pub enum StoredDisposition {
	/// No record yet; take the insert path.
	New,
	/// The stored record is causally newer; discard the payload.
	Superseded,
	/// The incoming payload is newer; take the reprice-update path.
	Reprice(Box<OrderRecord>),
	/// A record exists and the incoming payload carries no ordering key to
	/// compete with it.
	Exists,
}

/// Redundant-trigger check against the stored record, using the ordering-key
/// comparator with its wall-clock fallback for records predating key
/// tracking.
pub async fn classify_stored(
	store: &dyn StoreInterface,
	id: OrderId,
	incoming_key: Option<OrderingKey>,
	incoming_timestamp: u64,
) -> Result<StoredDisposition, OrderbookError> {
	let Some(stored) = store.get_order(id).await? else {
		return Ok(StoredDisposition::New);
	};
	let Some(incoming_key) = incoming_key else {
		return Ok(StoredDisposition::Exists);
	};
	if update_is_latest(
		stored.ordering_key(),
		stored.valid_from,
		incoming_key,
		incoming_timestamp,
	) {
		Ok(StoredDisposition::Reprice(Box::new(stored)))
	} else {
		Ok(StoredDisposition::Superseded)
	}
}

/// Whether the order was cancelled or filled causally after the payload's
/// position. Such a payload must not resurrect the order.
pub async fn terminated_after(
	store: &dyn StoreInterface,
	id: OrderId,
	key: OrderingKey,
) -> Result<bool, OrderbookError> {
	Ok(store.has_cancel_after(id, key).await? || store.has_fill_after(id, key).await?)
}

/// Overlays the incoming payload onto the stored one. Fields absent from the
/// incoming payload keep their stored value, so a reprice does not wipe
/// one-time fields such as the initial listing amount.
pub fn merge_raw_data(stored: &Value, incoming: &Value) -> Value {
	match (stored, incoming) {
		(Value::Object(stored), Value::Object(incoming)) => {
			let mut merged = stored.clone();
			for (key, value) in incoming {
				merged.insert(key.clone(), value.clone());
			}
			Value::Object(merged)
		}
		_ => incoming.clone(),
	}
}

/// Off-chain fillability of a sell order: the maker must hold the quantity
/// and, when the protocol fills through an operator contract, have approved
/// it. `conduit == None` means the asset is escrowed by the protocol itself.
pub async fn check_sell_fillability(
	store: &dyn StoreInterface,
	maker: Address,
	contract: Address,
	token_id: U256,
	quantity: U256,
	conduit: Option<Address>,
) -> Result<(FillabilityStatus, ApprovalStatus), OrderbookError> {
	let balance = store.nft_balance(maker, contract, token_id).await?;
	let fillability = if balance >= quantity {
		FillabilityStatus::Fillable
	} else {
		FillabilityStatus::NoBalance
	};
	let approval = match conduit {
		Some(operator) => {
			if store.nft_approval(maker, operator, contract).await? {
				ApprovalStatus::Approved
			} else {
				ApprovalStatus::NoApproval
			}
		}
		None => ApprovalStatus::Approved,
	};
	Ok((fillability, approval))
}

/// Off-chain fillability of a buy order against the maker's fungible balance
/// and allowance.
pub async fn check_buy_fillability(
	store: &dyn StoreInterface,
	maker: Address,
	currency: Address,
	required: U256,
	conduit: Option<Address>,
) -> Result<(FillabilityStatus, ApprovalStatus), OrderbookError> {
	let balance = store.ft_balance(maker, currency).await?;
	let fillability = if balance >= required {
		FillabilityStatus::Fillable
	} else {
		FillabilityStatus::NoBalance
	};
	let approval = match conduit {
		Some(operator) => {
			if store.ft_approval(maker, operator, currency).await? >= required {
				ApprovalStatus::Approved
			} else {
				ApprovalStatus::NoApproval
			}
		}
		None => ApprovalStatus::Approved,
	};
	Ok((fillability, approval))
}

#[cfg(test)]
mod tests {
	use super::*;
	use indexer_types::OrderKind;
	use serde_json::json;

	#[test]
	fn ids_are_deterministic_and_kind_scoped() {
		let fields: &[&[u8]] = &[b"42"];
		let a = order_id(OrderKind::Punks, fields);
		let b = order_id(OrderKind::Punks, fields);
		let c = order_id(OrderKind::Wyvern, fields);
		assert_eq!(a, b);
		assert_ne!(a, c);
	}

	#[test]
	fn reprice_merge_preserves_absent_fields() {
		let stored = json!({ "price": "100", "initial_amount": "5" });
		let incoming = json!({ "price": "80" });
		let merged = merge_raw_data(&stored, &incoming);
		assert_eq!(merged["price"], "80");
		assert_eq!(merged["initial_amount"], "5");
	}
}
