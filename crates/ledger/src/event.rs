//! Engine events - the audit vocabulary of committed state changes

use hedgepool_core::{Amount, BlockHeight, PolicyId, ProviderId, ProviderTier, Token};
use serde::{Deserialize, Serialize};

/// One provider's part in a multi-provider event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAmount {
    pub provider: ProviderId,
    pub amount: Amount,
}

/// A committed change to the ledger.
///
/// Events are emitted only after the owning operation committed, so a
/// journal of events never describes a rolled-back mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Deposited {
        provider: ProviderId,
        token: Token,
        amount: Amount,
        tier: ProviderTier,
    },
    Withdrawn {
        provider: ProviderId,
        token: Token,
        amount: Amount,
    },
    CollateralAllocated {
        policy_id: PolicyId,
        token: Token,
        expiration: BlockHeight,
        allocations: Vec<ProviderAmount>,
    },
    PremiumRecorded {
        policy_id: PolicyId,
        amount: Amount,
    },
    PolicySettled {
        policy_id: PolicyId,
        settlement_price: u64,
        payout: Amount,
        contributions: Vec<ProviderAmount>,
    },
    PolicyExpired {
        policy_id: PolicyId,
        settlement_price: u64,
    },
    PremiumDistributed {
        policy_id: PolicyId,
        shares: Vec<ProviderAmount>,
    },
    CollateralReleased {
        policy_id: PolicyId,
        amount: Amount,
    },
    PremiumClaimed {
        provider: ProviderId,
        token: Token,
        amount: Amount,
    },
    LiquidityPrepared {
        height: BlockHeight,
        required: Amount,
    },
}

impl EngineEvent {
    /// Short stable name, used in logs and journal indexes
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::Deposited { .. } => "deposited",
            EngineEvent::Withdrawn { .. } => "withdrawn",
            EngineEvent::CollateralAllocated { .. } => "collateral_allocated",
            EngineEvent::PremiumRecorded { .. } => "premium_recorded",
            EngineEvent::PolicySettled { .. } => "policy_settled",
            EngineEvent::PolicyExpired { .. } => "policy_expired",
            EngineEvent::PremiumDistributed { .. } => "premium_distributed",
            EngineEvent::CollateralReleased { .. } => "collateral_released",
            EngineEvent::PremiumClaimed { .. } => "premium_claimed",
            EngineEvent::LiquidityPrepared { .. } => "liquidity_prepared",
        }
    }
}
