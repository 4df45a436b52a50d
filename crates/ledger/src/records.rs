//! Record schemas for every ledger table
//!
//! Records carry their own keys so a table can be rebuilt from a flat list
//! of records (see `snapshot`).

use chrono::{DateTime, Utc};
use hedgepool_core::{
    Amount, BlockHeight, BuyerTier, PolicyId, PolicyKind, PolicyStatus, Principal, ProviderId,
    ProviderTier, Share, Token,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A protection policy between one buyer and the pool.
///
/// Written once at issuance. Afterwards only the settlement fields, the
/// status and the lifecycle flags change; policies are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub owner: Principal,
    pub kind: PolicyKind,
    /// Protected value, in price units
    pub strike: u64,
    /// Notional covered, in token base units
    pub protection_amount: Amount,
    /// Premium submitted by the buyer
    pub premium: Amount,
    pub token: Token,
    pub buyer_tier: BuyerTier,
    pub expiration: BlockHeight,
    /// Collateral reserved at issuance (the maximum payout)
    pub required_collateral: Amount,
    pub status: PolicyStatus,
    pub created_at: BlockHeight,
    pub premium_recorded: bool,
    pub premium_distributed: bool,
    pub collateral_released: bool,
    pub settlement_price: Option<u64>,
    pub settlement_amount: Option<Amount>,
    pub settled_at: Option<BlockHeight>,
}

/// Per provider and token capital position.
///
/// `deposited == allocated + available` holds between operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderBalance {
    pub provider: ProviderId,
    pub token: Token,
    pub tier: ProviderTier,
    pub deposited: Amount,
    pub allocated: Amount,
    pub available: Amount,
    /// Claimable premium
    pub earned_premium: Amount,
    /// Premium recorded for live policies, not yet owed
    pub pending_premium: Amount,
    /// First-deposit order, used to draw within a tier
    pub joined_seq: u64,
}

impl ProviderBalance {
    pub fn new(provider: ProviderId, token: Token, tier: ProviderTier, joined_seq: u64) -> Self {
        Self {
            provider,
            token,
            tier,
            deposited: Amount::ZERO,
            allocated: Amount::ZERO,
            available: Amount::ZERO,
            earned_premium: Amount::ZERO,
            pending_premium: Amount::ZERO,
            joined_seq,
        }
    }

    /// `deposited == allocated + available`
    pub fn is_balanced(&self) -> bool {
        self.allocated
            .checked_add(self.available)
            .map(|sum| sum == self.deposited)
            .unwrap_or(false)
    }
}

/// Collateral one provider reserved against one policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub policy_id: PolicyId,
    pub provider: ProviderId,
    pub token: Token,
    pub amount: Amount,
    /// Fraction of the policy's collateral
    pub allocation_share: Share,
    /// Fraction of the policy's premium owed to this provider
    pub premium_share: Share,
    pub expiration: BlockHeight,
    /// Provider tier at allocation time
    pub tier: ProviderTier,
    /// Draw order within the policy
    pub sequence: u32,
    pub allocated_at: BlockHeight,
    pub premium_distributed: bool,
    /// Part of `amount` paid out to the policy owner at settlement
    pub settled: Amount,
    /// Set once every unit of this allocation has been settled or returned
    pub released: bool,
}

impl Allocation {
    /// Collateral still locked against the policy
    pub fn outstanding(&self) -> Amount {
        if self.released {
            Amount::ZERO
        } else {
            self.amount.saturating_sub(self.settled)
        }
    }
}

/// A provider's realized share of an ITM settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementImpact {
    pub policy_id: PolicyId,
    pub provider: ProviderId,
    pub original_allocation: Amount,
    pub contribution: Amount,
    pub remaining_allocation: Amount,
    pub contribution_share: Share,
    pub settled_at: BlockHeight,
}

/// Why a premium distribution record was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStatus {
    /// Policy expired out of the money
    CreditedOnExpiry,
    /// Policy settled in the money; providers keep the premium for the cover they gave
    CreditedOnSettlement,
}

/// One provider's premium share of one policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumDistribution {
    pub policy_id: PolicyId,
    pub provider: ProviderId,
    pub amount: Amount,
    /// Allocation amount the share was computed from
    pub basis: Amount,
    pub premium_share: Share,
    pub distributed_at: BlockHeight,
    pub timestamp: DateTime<Utc>,
    pub status: DistributionStatus,
}

/// Pool-wide totals for one token.
///
/// `total`, `available` and `locked` mirror the sums of provider
/// `deposited`, `available` and `allocated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateTokenBalance {
    pub token: Token,
    pub total: Amount,
    pub available: Amount,
    pub locked: Amount,
    pub premium_pending: Amount,
    pub premium_earned: Amount,
}

impl AggregateTokenBalance {
    pub fn new(token: Token) -> Self {
        Self {
            token,
            total: Amount::ZERO,
            available: Amount::ZERO,
            locked: Amount::ZERO,
            premium_pending: Amount::ZERO,
            premium_earned: Amount::ZERO,
        }
    }
}

/// Collateral that must stay locked until a given expiration height
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationLiquidityNeed {
    pub height: BlockHeight,
    pub total_collateral_required: Amount,
    pub policy_count: u64,
    pub per_tier: BTreeMap<ProviderTier, Amount>,
    pub prepared: bool,
}

impl ExpirationLiquidityNeed {
    pub fn new(height: BlockHeight) -> Self {
        Self {
            height,
            total_collateral_required: Amount::ZERO,
            policy_count: 0,
            per_tier: BTreeMap::new(),
            prepared: false,
        }
    }
}

/// A provider's total allocation at one expiration height
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationExposure {
    pub provider: ProviderId,
    pub token: Token,
    pub height: BlockHeight,
    pub amount: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_provider_balance_is_balanced() {
        let balance = ProviderBalance::new("SP1".into(), Token::Sbtc, ProviderTier::Balanced, 0);
        assert!(balance.is_balanced());
    }

    #[test]
    fn test_unbalanced_provider_detected() {
        let mut balance = ProviderBalance::new("SP1".into(), Token::Sbtc, ProviderTier::Balanced, 0);
        balance.deposited = Amount::new(1_000);
        balance.available = Amount::new(600);
        balance.allocated = Amount::new(300);
        assert!(!balance.is_balanced());

        balance.allocated = Amount::new(400);
        assert!(balance.is_balanced());
    }
}
