//! Risk tiers for protection buyers and capital providers

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Tier chosen by a protection buyer
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BuyerTier {
    Conservative,
    Standard,
    Flexible,
    CrashInsurance,
}

/// Tier selected by a capital provider for a token
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ProviderTier {
    Conservative,
    Balanced,
    Aggressive,
}

impl ProviderTier {
    /// Draw order during allocation: safest capital first
    pub fn preference_rank(&self) -> u8 {
        match self {
            ProviderTier::Conservative => 0,
            ProviderTier::Balanced => 1,
            ProviderTier::Aggressive => 2,
        }
    }
}
