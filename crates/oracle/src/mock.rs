//! Mock Oracle for testing
//!
//! Provides configurable settlement prices per height.

use chrono::{DateTime, Utc};
use hedgepool_core::BlockHeight;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

use crate::error::OracleError;
use crate::types::{PriceOracle, SettlementPrice};

/// Mock Price Oracle for testing
///
/// Stores prices that can be updated programmatically. Heights can also be
/// flagged stale to mimic a feed that stopped updating.
#[derive(Debug, Default)]
pub struct MockOracle {
    prices: RwLock<BTreeMap<BlockHeight, SettlementPrice>>,
    stale: RwLock<BTreeSet<BlockHeight>>,
}

impl MockOracle {
    /// Create a new empty mock oracle
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a price timestamped now
    pub fn set_price(&self, height: BlockHeight, price: u64) {
        self.set_price_at(height, price, Utc::now());
    }

    /// Publish a price with an explicit timestamp
    pub fn set_price_at(&self, height: BlockHeight, price: u64, timestamp: DateTime<Utc>) {
        let mut record = SettlementPrice::new(height, price, timestamp);
        record.source = "mock".to_string();
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        prices.insert(height, record);
    }

    /// Remove a price (for testing missing data)
    pub fn remove_price(&self, height: BlockHeight) {
        let mut prices = self.prices.write().unwrap_or_else(PoisonError::into_inner);
        prices.remove(&height);
    }

    /// Make the feed report `Stale` for a height
    pub fn mark_stale(&self, height: BlockHeight) {
        let mut stale = self.stale.write().unwrap_or_else(PoisonError::into_inner);
        stale.insert(height);
    }

    /// Get number of published heights
    pub fn price_count(&self) -> usize {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl PriceOracle for MockOracle {
    fn get_settlement_price(&self, height: BlockHeight) -> Result<SettlementPrice, OracleError> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        let price = prices
            .get(&height)
            .cloned()
            .ok_or(OracleError::NoData { height })?;

        let stale = self.stale.read().unwrap_or_else(PoisonError::into_inner);
        if stale.contains(&height) {
            return Err(OracleError::Stale {
                height,
                published: price.timestamp,
                max_age_secs: 0,
            });
        }

        Ok(price)
    }
}
