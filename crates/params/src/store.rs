//! Parameter store - runtime key/value lookups for every numeric threshold
//!
//! The engine never compiles thresholds in. Each operation reads what it
//! needs through [`ParameterStore`], so tier economics and batch sizes can
//! change between calls without a release.

use crate::error::ParamError;
use hedgepool_core::ProviderTier;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

/// Well-known parameter keys
pub mod keys {
    use hedgepool_core::ProviderTier;

    pub const POLICY_MIN_PROTECTION: &str = "policy.min-protection-amount";
    pub const POLICY_MAX_PROTECTION: &str = "policy.max-protection-amount";
    pub const POLICY_MIN_DURATION: &str = "policy.min-duration-blocks";
    pub const POLICY_MAX_DURATION: &str = "policy.max-duration-blocks";
    pub const BATCH_MAX_SETTLEMENT: &str = "batch.max-settlement-size";
    pub const BATCH_MAX_DISTRIBUTION: &str = "batch.max-distribution-size";
    pub const INDEX_MAX_PER_HEIGHT: &str = "index.max-policies-per-height";
    pub const ORACLE_MAX_PRICE_AGE: &str = "oracle.max-price-age-secs";

    pub fn collateral_ratio(tier: ProviderTier) -> String {
        format!("tier.{}.collateral-ratio", tier)
    }

    pub fn per_policy_limit(tier: ProviderTier) -> String {
        format!("tier.{}.per-policy-limit", tier)
    }

    pub fn per_expiration_limit(tier: ProviderTier) -> String {
        format!("tier.{}.per-expiration-limit", tier)
    }
}

/// A stored parameter value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Uint(u64),
    /// Ratios are written as decimal strings, e.g. `"1.25"`
    Ratio(Decimal),
}

/// Key/value parameter lookups
pub trait ParameterStore: Send + Sync {
    fn get(&self, key: &str) -> Option<ParamValue>;

    fn get_u64(&self, key: &str) -> Result<u64, ParamError> {
        match self.get(key) {
            Some(ParamValue::Uint(v)) => Ok(v),
            Some(_) => Err(ParamError::WrongType {
                key: key.to_string(),
                expected: "unsigned integer",
            }),
            None => Err(ParamError::Missing { key: key.to_string() }),
        }
    }

    /// Integers are accepted as whole ratios
    fn get_ratio(&self, key: &str) -> Result<Decimal, ParamError> {
        match self.get(key) {
            Some(ParamValue::Ratio(v)) => Ok(v),
            Some(ParamValue::Uint(v)) => Ok(Decimal::from(v)),
            None => Err(ParamError::Missing { key: key.to_string() }),
        }
    }
}

/// In-process parameter store
///
/// Seeded with conservative defaults; values can be overridden from a JSON
/// file or updated at runtime.
#[derive(Debug, Default)]
pub struct InMemoryParameters {
    values: RwLock<HashMap<String, ParamValue>>,
}

impl InMemoryParameters {
    /// Create an empty store (every lookup misses)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding every known key with its default
    pub fn with_defaults() -> Self {
        let store = Self::new();

        for (tier, ratio, per_policy, per_expiration) in [
            (ProviderTier::Conservative, Decimal::new(125, 2), Decimal::new(25, 2), Decimal::new(50, 2)),
            (ProviderTier::Balanced, Decimal::new(110, 2), Decimal::new(50, 2), Decimal::new(80, 2)),
            (ProviderTier::Aggressive, Decimal::ONE, Decimal::ONE, Decimal::ONE),
        ] {
            store.set(keys::collateral_ratio(tier), ParamValue::Ratio(ratio));
            store.set(keys::per_policy_limit(tier), ParamValue::Ratio(per_policy));
            store.set(keys::per_expiration_limit(tier), ParamValue::Ratio(per_expiration));
        }

        store.set(keys::POLICY_MIN_PROTECTION, ParamValue::Uint(1_000));
        store.set(keys::POLICY_MAX_PROTECTION, ParamValue::Uint(100_000_000_000));
        store.set(keys::POLICY_MIN_DURATION, ParamValue::Uint(6));
        store.set(keys::POLICY_MAX_DURATION, ParamValue::Uint(52_560)); // ~1 year of blocks
        store.set(keys::BATCH_MAX_SETTLEMENT, ParamValue::Uint(50));
        store.set(keys::BATCH_MAX_DISTRIBUTION, ParamValue::Uint(50));
        store.set(keys::INDEX_MAX_PER_HEIGHT, ParamValue::Uint(200));
        store.set(keys::ORACLE_MAX_PRICE_AGE, ParamValue::Uint(3_600));

        store
    }

    /// Load overrides from a JSON object on top of the defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ParamError> {
        let content = std::fs::read_to_string(path)?;
        let overrides: HashMap<String, ParamValue> = serde_json::from_str(&content)?;

        let store = Self::with_defaults();
        for (key, value) in overrides {
            store.set(key, value);
        }
        Ok(store)
    }

    pub fn set(&self, key: impl Into<String>, value: ParamValue) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ParameterStore for InMemoryParameters {
    fn get(&self, key: &str) -> Option<ParamValue> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_cover_every_tier() {
        let store = InMemoryParameters::with_defaults();
        for tier in [ProviderTier::Conservative, ProviderTier::Balanced, ProviderTier::Aggressive] {
            assert!(store.get_ratio(&keys::collateral_ratio(tier)).is_ok());
            assert!(store.get_ratio(&keys::per_policy_limit(tier)).is_ok());
            assert!(store.get_ratio(&keys::per_expiration_limit(tier)).is_ok());
        }
        assert_eq!(store.get_u64(keys::BATCH_MAX_SETTLEMENT).unwrap(), 50);
    }

    #[test]
    fn test_missing_key() {
        let store = InMemoryParameters::new();
        assert!(store.is_empty());
        assert!(matches!(
            store.get_u64(keys::BATCH_MAX_SETTLEMENT),
            Err(ParamError::Missing { .. })
        ));
    }

    #[test]
    fn test_wrong_type() {
        let store = InMemoryParameters::new();
        store.set("x", ParamValue::Ratio(dec!(1.25)));
        assert!(matches!(
            store.get_u64("x"),
            Err(ParamError::WrongType { expected: "unsigned integer", .. })
        ));
    }

    #[test]
    fn test_uint_accepted_as_ratio() {
        let store = InMemoryParameters::new();
        store.set("r", ParamValue::Uint(2));
        assert_eq!(store.get_ratio("r").unwrap(), dec!(2));
    }

    #[test]
    fn test_runtime_update_visible() {
        let store = InMemoryParameters::with_defaults();
        store.set(keys::BATCH_MAX_SETTLEMENT, ParamValue::Uint(5));
        assert_eq!(store.get_u64(keys::BATCH_MAX_SETTLEMENT).unwrap(), 5);
    }

    #[test]
    fn test_from_file_overrides_defaults() -> anyhow::Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(
            file,
            r#"{{ "batch.max-settlement-size": 10, "tier.balanced.collateral-ratio": "1.5" }}"#
        )?;

        let store = InMemoryParameters::from_file(file.path())?;
        assert_eq!(store.get_u64(keys::BATCH_MAX_SETTLEMENT)?, 10);
        assert_eq!(
            store.get_ratio(&keys::collateral_ratio(ProviderTier::Balanced))?,
            dec!(1.5)
        );
        // untouched keys keep their defaults
        assert_eq!(store.get_u64(keys::BATCH_MAX_DISTRIBUTION)?, 50);
        Ok(())
    }
}
