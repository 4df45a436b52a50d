//! Typed views over the parameter store
//!
//! Each view is fetched fresh at the start of the operation that needs it.

use crate::error::ParamError;
use crate::store::{keys, ParameterStore};
use hedgepool_core::{Amount, BlockHeight};

/// Issuance bounds for new policies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyBounds {
    pub min_protection: Amount,
    pub max_protection: Amount,
    pub min_duration: BlockHeight,
    pub max_duration: BlockHeight,
}

impl PolicyBounds {
    pub fn fetch(params: &dyn ParameterStore) -> Result<Self, ParamError> {
        let bounds = Self {
            min_protection: Amount::new(params.get_u64(keys::POLICY_MIN_PROTECTION)?),
            max_protection: Amount::new(params.get_u64(keys::POLICY_MAX_PROTECTION)?),
            min_duration: params.get_u64(keys::POLICY_MIN_DURATION)?,
            max_duration: params.get_u64(keys::POLICY_MAX_DURATION)?,
        };
        if bounds.min_protection > bounds.max_protection {
            return Err(ParamError::Invalid {
                key: keys::POLICY_MIN_PROTECTION.to_string(),
                reason: "minimum protection exceeds maximum".to_string(),
            });
        }
        if bounds.min_duration > bounds.max_duration {
            return Err(ParamError::Invalid {
                key: keys::POLICY_MIN_DURATION.to_string(),
                reason: "minimum duration exceeds maximum".to_string(),
            });
        }
        Ok(bounds)
    }
}

/// Per-call iteration limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_settlement: usize,
    pub max_distribution: usize,
    pub max_policies_per_height: usize,
}

impl BatchLimits {
    pub fn fetch(params: &dyn ParameterStore) -> Result<Self, ParamError> {
        Ok(Self {
            max_settlement: positive(params, keys::BATCH_MAX_SETTLEMENT)?,
            max_distribution: positive(params, keys::BATCH_MAX_DISTRIBUTION)?,
            max_policies_per_height: positive(params, keys::INDEX_MAX_PER_HEIGHT)?,
        })
    }
}

/// Price freshness requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleLimits {
    pub max_price_age_secs: u64,
}

impl OracleLimits {
    pub fn fetch(params: &dyn ParameterStore) -> Result<Self, ParamError> {
        Ok(Self {
            max_price_age_secs: params.get_u64(keys::ORACLE_MAX_PRICE_AGE)?,
        })
    }
}

fn positive(params: &dyn ParameterStore, key: &str) -> Result<usize, ParamError> {
    let value = params.get_u64(key)?;
    if value == 0 {
        return Err(ParamError::Invalid {
            key: key.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    usize::try_from(value).map_err(|_| ParamError::Invalid {
        key: key.to_string(),
        reason: format!("{} does not fit in usize", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryParameters, ParamValue};

    #[test]
    fn test_fetch_defaults() {
        let params = InMemoryParameters::with_defaults();
        let bounds = PolicyBounds::fetch(&params).unwrap();
        assert_eq!(bounds.min_duration, 6);
        let limits = BatchLimits::fetch(&params).unwrap();
        assert_eq!(limits.max_settlement, 50);
        assert_eq!(limits.max_policies_per_height, 200);
        assert_eq!(OracleLimits::fetch(&params).unwrap().max_price_age_secs, 3_600);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let params = InMemoryParameters::with_defaults();
        params.set(keys::BATCH_MAX_DISTRIBUTION, ParamValue::Uint(0));
        assert!(matches!(
            BatchLimits::fetch(&params),
            Err(ParamError::Invalid { .. })
        ));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let params = InMemoryParameters::with_defaults();
        params.set(keys::POLICY_MIN_PROTECTION, ParamValue::Uint(10));
        params.set(keys::POLICY_MAX_PROTECTION, ParamValue::Uint(5));
        assert!(PolicyBounds::fetch(&params).is_err());
    }
}
