//! Core oracle types

use chrono::{DateTime, Utc};
use hedgepool_core::BlockHeight;
use serde::{Deserialize, Serialize};

use crate::OracleError;

/// Price of the underlying published for an expiration height
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPrice {
    pub height: BlockHeight,
    /// Price in the same units as policy strikes
    pub price: u64,
    /// When the feed published this price
    pub timestamp: DateTime<Utc>,
    /// Source of the price (e.g., "mock", "aggregator")
    pub source: String,
}

impl SettlementPrice {
    pub fn new(height: BlockHeight, price: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            height,
            price,
            timestamp,
            source: "unknown".to_string(),
        }
    }

    /// Age of the price relative to `now`, in whole seconds
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.timestamp).num_seconds()
    }

    /// Check if price is stale (older than threshold)
    pub fn is_stale(&self, now: DateTime<Utc>, max_age_secs: u64) -> bool {
        self.age_secs(now) > i64::try_from(max_age_secs).unwrap_or(i64::MAX)
    }

    /// Accept the price only if it is positive and fresh
    pub fn validate(self, now: DateTime<Utc>, max_age_secs: u64) -> Result<Self, OracleError> {
        if self.price == 0 {
            return Err(OracleError::InvalidPrice {
                height: self.height,
                reason: "price is zero".to_string(),
            });
        }
        if self.is_stale(now, max_age_secs) {
            return Err(OracleError::Stale {
                height: self.height,
                published: self.timestamp,
                max_age_secs,
            });
        }
        Ok(self)
    }
}

/// Price Oracle trait - interface for settlement price feeds
///
/// Lookups are synchronous: an engine operation never suspends while it
/// holds staged ledger state.
pub trait PriceOracle: Send + Sync {
    /// Settlement price for an expiration height
    fn get_settlement_price(&self, height: BlockHeight) -> Result<SettlementPrice, OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_fresh_price_accepted() {
        let now = Utc::now();
        let price = SettlementPrice::new(100, 40_000, now - Duration::seconds(30));
        assert!(price.validate(now, 60).is_ok());
    }

    #[test]
    fn test_stale_price_rejected() {
        let now = Utc::now();
        let price = SettlementPrice::new(100, 40_000, now - Duration::seconds(61));
        assert!(matches!(
            price.validate(now, 60),
            Err(OracleError::Stale { height: 100, .. })
        ));
    }

    #[test]
    fn test_zero_price_rejected() {
        let now = Utc::now();
        let price = SettlementPrice::new(100, 0, now);
        assert!(matches!(
            price.validate(now, 60),
            Err(OracleError::InvalidPrice { .. })
        ));
    }
}
