//! Risk tier resolver
//!
//! Compatibility between buyer and provider tiers is a fixed lattice.
//! Collateral ratios and exposure limits are configuration, looked up from
//! the parameter store on every call.

use crate::error::ParamError;
use crate::store::{keys, ParameterStore};
use hedgepool_core::{Amount, BuyerTier, ProviderTier};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Whether a provider of `provider` tier may back a buyer of `buyer` tier.
///
/// | buyer           | accepted providers          |
/// |-----------------|-----------------------------|
/// | Conservative    | Conservative                |
/// | Standard        | Balanced, Conservative      |
/// | Flexible        | Aggressive, Balanced        |
/// | CrashInsurance  | any                         |
pub fn compatible(buyer: BuyerTier, provider: ProviderTier) -> bool {
    use BuyerTier as B;
    use ProviderTier as P;

    match buyer {
        B::Conservative => provider == P::Conservative,
        B::Standard => matches!(provider, P::Balanced | P::Conservative),
        B::Flexible => matches!(provider, P::Aggressive | P::Balanced),
        B::CrashInsurance => true,
    }
}

/// Exposure caps for a provider tier, as fractions of the provider's deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExposureLimit {
    pub per_policy: Decimal,
    pub per_expiration: Decimal,
}

impl ExposureLimit {
    /// Largest allocation one provider may make to a single policy
    pub fn per_policy_cap(&self, deposited: Amount) -> Amount {
        fraction_of(deposited, self.per_policy)
    }

    /// Largest total allocation one provider may hold at one expiration height
    pub fn per_expiration_cap(&self, deposited: Amount) -> Amount {
        fraction_of(deposited, self.per_expiration)
    }
}

/// Everything the allocation engine needs to know about one provider tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierTerms {
    pub tier: ProviderTier,
    /// Deposit held per unit of allocation; `allocated <= deposited / ratio`
    pub collateral_ratio: Decimal,
    pub exposure: ExposureLimit,
}

impl TierTerms {
    /// Most a provider with `deposited` may have allocated in total
    pub fn allocation_ceiling(&self, deposited: Amount) -> Amount {
        let ceiling = Decimal::from(deposited.value()) / self.collateral_ratio;
        Amount::new(ceiling.floor().to_u64().unwrap_or(u64::MAX))
    }
}

/// Resolves tier parameters from a [`ParameterStore`]
pub struct RiskTierResolver<'a> {
    params: &'a dyn ParameterStore,
}

impl<'a> RiskTierResolver<'a> {
    pub fn new(params: &'a dyn ParameterStore) -> Self {
        Self { params }
    }

    pub fn compatible(&self, buyer: BuyerTier, provider: ProviderTier) -> bool {
        compatible(buyer, provider)
    }

    pub fn collateral_ratio(&self, tier: ProviderTier) -> Result<Decimal, ParamError> {
        let key = keys::collateral_ratio(tier);
        let ratio = self.params.get_ratio(&key)?;
        if ratio < Decimal::ONE {
            return Err(ParamError::Invalid {
                key,
                reason: format!("collateral ratio {} is below 1", ratio),
            });
        }
        Ok(ratio)
    }

    pub fn exposure_limit(&self, tier: ProviderTier) -> Result<ExposureLimit, ParamError> {
        Ok(ExposureLimit {
            per_policy: self.limit(keys::per_policy_limit(tier))?,
            per_expiration: self.limit(keys::per_expiration_limit(tier))?,
        })
    }

    pub fn terms(&self, tier: ProviderTier) -> Result<TierTerms, ParamError> {
        Ok(TierTerms {
            tier,
            collateral_ratio: self.collateral_ratio(tier)?,
            exposure: self.exposure_limit(tier)?,
        })
    }

    fn limit(&self, key: String) -> Result<Decimal, ParamError> {
        let value = self.params.get_ratio(&key)?;
        if value <= Decimal::ZERO || value > Decimal::ONE {
            return Err(ParamError::Invalid {
                key,
                reason: format!("limit {} outside (0, 1]", value),
            });
        }
        Ok(value)
    }
}

fn fraction_of(amount: Amount, fraction: Decimal) -> Amount {
    let scaled = Decimal::from(amount.value()) * fraction;
    Amount::new(scaled.floor().to_u64().unwrap_or(u64::MAX))
}
