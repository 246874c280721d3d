//! Table-driven price oracle.
//!
//! The real currency-conversion service is an external collaborator; this
//! implementation covers the native currency (identity), any currency
//! registered with a fixed conversion rate, and nothing else. Unknown
//! currencies resolve to `None`, which makes the callers drop the event.

use std::collections::HashMap;

use async_trait::async_trait;

use indexer_types::{Address, U256};

use crate::{PriceData, PriceOracle};

pub struct StaticPriceOracle {
	/// `currency -> (numerator, denominator)` native units per currency unit.
	rates: HashMap<Address, (U256, U256)>,
	/// USD cents per whole native unit, when configured.
	usd_per_native: Option<(U256, U256)>,
}

impl StaticPriceOracle {
	pub fn new() -> Self {
		let mut rates = HashMap::new();
		// The native currency converts to itself.
		rates.insert(Address::ZERO, (U256::from(1), U256::from(1)));
		Self {
			rates,
			usd_per_native: None,
		}
	}

	pub fn with_rate(mut self, currency: Address, numerator: U256, denominator: U256) -> Self {
		self.rates.insert(currency, (numerator, denominator));
		self
	}

	pub fn with_usd_rate(mut self, numerator: U256, denominator: U256) -> Self {
		self.usd_per_native = Some((numerator, denominator));
		self
	}
}

impl Default for StaticPriceOracle {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl PriceOracle for StaticPriceOracle {
	async fn get_native_price(
		&self,
		currency: Address,
		amount: U256,
		_timestamp: u64,
	) -> Option<PriceData> {
		let (numerator, denominator) = self.rates.get(&currency)?;
		if denominator.is_zero() {
			return None;
		}
		let native_price = amount.saturating_mul(*numerator) / *denominator;
		let usd_price = self.usd_per_native.and_then(|(num, den)| {
			if den.is_zero() {
				None
			} else {
				Some(native_price.saturating_mul(num) / den)
			}
		});
		Some(PriceData {
			native_price,
			usd_price,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn unknown_currency_is_unresolvable() {
		let oracle = StaticPriceOracle::new();
		assert!(oracle
			.get_native_price(Address::repeat_byte(9), U256::from(100), 0)
			.await
			.is_none());
	}

	#[tokio::test]
	async fn registered_rate_converts() {
		let token = Address::repeat_byte(1);
		let oracle = StaticPriceOracle::new().with_rate(token, U256::from(2), U256::from(1));
		let price = oracle
			.get_native_price(token, U256::from(100), 0)
			.await
			.unwrap();
		assert_eq!(price.native_price, U256::from(200));
	}
}
