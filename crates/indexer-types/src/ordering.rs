//! The on-chain ordering key and the comparator deciding which of two
//! conflicting updates to the same order is authoritative.
//!
//! This logic is needed near-identically by every adapter, so it lives here
//! exactly once. No wall-clock timestamp is trusted for the decision except
//! as a fallback for records stored before ordering-key tracking existed.

use serde::{Deserialize, Serialize};

/// Position of an on-chain event, totally ordered within one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderingKey {
	pub block: u64,
	pub log_index: u64,
}

impl OrderingKey {
	pub fn new(block: u64, log_index: u64) -> Self {
		Self { block, log_index }
	}
}

/// Decides whether an incoming on-chain update supersedes the stored state.
///
/// Two paths:
/// - the stored record carries an ordering key: plain `(block, log_index)`
///   comparison, the larger key wins;
/// - the stored record predates key tracking: fall back to comparing the
///   record's `valid_from` against the incoming transaction timestamp
///   (strictly older stored state loses).
pub fn update_is_latest(
	stored_key: Option<OrderingKey>,
	stored_valid_from: u64,
	incoming_key: OrderingKey,
	incoming_timestamp: u64,
) -> bool {
	match stored_key {
		Some(stored) => stored < incoming_key,
		None => stored_valid_from < incoming_timestamp,
	}
}
