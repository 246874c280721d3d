//! Table-driven attribution resolver.
//!
//! Maps a protocol tag to its home marketplace domain. The full resolver of
//! the original system inspects calldata suffixes and router traces; that
//! transport stays external, and the per-kind default domain is what the
//! pipeline falls back to when a fill arrives without attribution.

use std::collections::HashMap;

use async_trait::async_trait;

use indexer_types::{OrderId, OrderKind, B256};

use crate::{Attribution, AttributionResolver};

pub struct StaticAttributionResolver {
	domains: HashMap<OrderKind, String>,
}

impl StaticAttributionResolver {
	pub fn new() -> Self {
		Self {
			domains: HashMap::new(),
		}
	}

	pub fn with_source(mut self, kind: OrderKind, domain: impl Into<String>) -> Self {
		self.domains.insert(kind, domain.into());
		self
	}
}

impl Default for StaticAttributionResolver {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl AttributionResolver for StaticAttributionResolver {
	async fn resolve(
		&self,
		_tx_hash: B256,
		kind: OrderKind,
		_order_id: Option<OrderId>,
	) -> Attribution {
		let domain = self.domains.get(&kind).cloned();
		Attribution {
			order_source: domain.clone(),
			fill_source: domain,
			aggregator_source: None,
			taker: None,
		}
	}
}
