//! Allocation Engine - sources a policy's collateral from the provider pool
//!
//! Providers are drawn safest tier first, then in first-deposit order, each
//! up to its headroom: the least of its available capital, what its
//! collateral ratio still permits, its per-policy cap and what is left of
//! its per-expiration cap. Either the whole requirement is sourced or
//! nothing is written.

use crate::apportion::apportion;
use crate::capital::CapitalLedger;
use crate::error::{EngineError, EngineResult};
use crate::verify::{self, IntegrityCheck, IntegrityReport};
use hedgepool_core::{
    Amount, BlockHeight, BuyerTier, PolicyId, PolicyKind, PolicyStatus, Principal,
    ProviderId, ProviderTier, Share, Token, SHARE_SCALE,
};
use hedgepool_ledger::{Allocation, LedgerStore, Policy, ProviderBalance};
use hedgepool_params::{BatchLimits, ParameterStore, PolicyBounds, RiskTierResolver, TierTerms};
use std::collections::BTreeMap;

/// What the issuance component submits for a new policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTerms {
    pub owner: Principal,
    pub kind: PolicyKind,
    pub strike: u64,
    pub protection_amount: Amount,
    pub premium: Amount,
    pub token: Token,
    pub buyer_tier: BuyerTier,
    pub expiration: BlockHeight,
}

impl PolicyTerms {
    /// Collateral that covers the largest possible payout
    pub fn required_collateral(&self) -> Amount {
        self.protection_amount
    }
}

/// Result of a liquidity dry run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidityQuote {
    pub token: Token,
    pub buyer_tier: BuyerTier,
    pub expiration: BlockHeight,
    pub requested: Amount,
    /// Sum of every eligible provider's headroom
    pub eligible: Amount,
    pub eligible_providers: usize,
    pub sufficient: bool,
}

#[derive(Debug, Clone)]
struct Candidate {
    provider: ProviderId,
    tier: ProviderTier,
    joined_seq: u64,
    headroom: Amount,
}

pub struct AllocationEngine<'a> {
    params: &'a dyn ParameterStore,
}

impl<'a> AllocationEngine<'a> {
    pub fn new(params: &'a dyn ParameterStore) -> Self {
        Self { params }
    }

    /// Read-only run of the selection step
    pub fn check_liquidity(
        &self,
        store: &LedgerStore,
        token: &Token,
        buyer_tier: BuyerTier,
        amount: Amount,
        expiration: BlockHeight,
    ) -> EngineResult<LiquidityQuote> {
        let candidates = self.eligible_providers(store, token, buyer_tier, expiration)?;
        let eligible = Amount::checked_sum(candidates.iter().map(|c| c.headroom))?;

        Ok(LiquidityQuote {
            token: token.clone(),
            buyer_tier,
            expiration,
            requested: amount,
            eligible,
            eligible_providers: candidates.len(),
            sufficient: !amount.is_zero() && eligible >= amount,
        })
    }

    /// Register the policy and lock its required collateral.
    ///
    /// Writes the policy, its expiration-index entry, one allocation per
    /// contributing provider and the height's liquidity need. Returns the
    /// allocations in draw order.
    pub fn allocate_collateral(
        &self,
        store: &mut LedgerStore,
        policy_id: PolicyId,
        terms: &PolicyTerms,
        height: BlockHeight,
    ) -> EngineResult<Vec<Allocation>> {
        self.validate_terms(terms, height)?;

        if store.policy(policy_id).is_some() {
            return Err(EngineError::AlreadyProcessed(format!("{} is already registered", policy_id)));
        }

        let limits = BatchLimits::fetch(self.params)?;
        if store.policies_expiring_at(terms.expiration).len() >= limits.max_policies_per_height {
            return Err(EngineError::ExpirationFull {
                height: terms.expiration,
                limit: limits.max_policies_per_height,
            });
        }

        let required = terms.required_collateral();
        let candidates = self.eligible_providers(store, &terms.token, terms.buyer_tier, terms.expiration)?;
        let draws = draw(&candidates, required);
        let sourced = Amount::checked_sum(draws.iter().map(|(_, amount)| *amount))?;
        if sourced < required {
            return Err(EngineError::InsufficientLiquidity {
                token: terms.token.clone(),
                required,
                eligible: sourced,
            });
        }

        let weights: Vec<u64> = draws.iter().map(|(_, amount)| amount.value()).collect();
        let shares = apportion(SHARE_SCALE, &weights);

        store.insert_policy(Policy {
            id: policy_id,
            owner: terms.owner.clone(),
            kind: terms.kind,
            strike: terms.strike,
            protection_amount: terms.protection_amount,
            premium: terms.premium,
            token: terms.token.clone(),
            buyer_tier: terms.buyer_tier,
            expiration: terms.expiration,
            required_collateral: required,
            status: PolicyStatus::Active,
            created_at: height,
            premium_recorded: false,
            premium_distributed: false,
            collateral_released: false,
            settlement_price: None,
            settlement_amount: None,
            settled_at: None,
        });
        store.append_expiring(terms.expiration, policy_id);
        store.liquidity_need_entry(terms.expiration).policy_count += 1;

        let mut allocations = Vec::with_capacity(draws.len());
        for (sequence, ((candidate, amount), ppm)) in draws.iter().zip(shares).enumerate() {
            // Shares outside the scale fail the allocation-share post-condition
            let share = Share::from_ppm(ppm).unwrap_or(Share::ZERO);
            let allocation = Allocation {
                policy_id,
                provider: candidate.provider.clone(),
                token: terms.token.clone(),
                amount: *amount,
                allocation_share: share,
                premium_share: share,
                expiration: terms.expiration,
                tier: candidate.tier,
                sequence: sequence as u32,
                allocated_at: height,
                premium_distributed: false,
                settled: Amount::ZERO,
                released: false,
            };
            store.insert_allocation(allocation.clone());
            CapitalLedger::new(store).allocate(&candidate.provider, policy_id, *amount)?;
            allocations.push(allocation);
        }

        verify::ensure(verify::policy_allocation_integrity(store, policy_id)?)?;
        verify::ensure(verify::pool_balance_integrity(store, &terms.token)?)?;

        Ok(allocations)
    }

    fn validate_terms(&self, terms: &PolicyTerms, height: BlockHeight) -> EngineResult<()> {
        let bounds = PolicyBounds::fetch(self.params)?;

        if terms.strike == 0 {
            return Err(EngineError::PolicyOutOfBounds("strike must be positive".to_string()));
        }
        if terms.protection_amount < bounds.min_protection || terms.protection_amount > bounds.max_protection {
            return Err(EngineError::PolicyOutOfBounds(format!(
                "protection amount {} outside [{}, {}]",
                terms.protection_amount, bounds.min_protection, bounds.max_protection
            )));
        }
        if terms.expiration <= height {
            return Err(EngineError::PolicyOutOfBounds(format!(
                "expiration {} is not after height {}",
                terms.expiration, height
            )));
        }
        let duration = terms.expiration - height;
        if duration < bounds.min_duration || duration > bounds.max_duration {
            return Err(EngineError::PolicyOutOfBounds(format!(
                "duration {} blocks outside [{}, {}]",
                duration, bounds.min_duration, bounds.max_duration
            )));
        }
        Ok(())
    }

    fn eligible_providers(
        &self,
        store: &LedgerStore,
        token: &Token,
        buyer_tier: BuyerTier,
        expiration: BlockHeight,
    ) -> EngineResult<Vec<Candidate>> {
        let resolver = RiskTierResolver::new(self.params);
        let mut terms_by_tier: BTreeMap<ProviderTier, TierTerms> = BTreeMap::new();
        let mut candidates = Vec::new();

        for balance in store.provider_balances_for_token(token) {
            if !resolver.compatible(buyer_tier, balance.tier) {
                continue;
            }
            let terms = match terms_by_tier.get(&balance.tier) {
                Some(terms) => *terms,
                None => {
                    let terms = resolver.terms(balance.tier)?;
                    terms_by_tier.insert(balance.tier, terms);
                    terms
                }
            };

            let headroom = headroom(store, balance, &terms, expiration);
            if headroom.is_zero() {
                continue;
            }
            candidates.push(Candidate {
                provider: balance.provider.clone(),
                tier: balance.tier,
                joined_seq: balance.joined_seq,
                headroom,
            });
        }

        candidates.sort_by_key(|c| (c.tier.preference_rank(), c.joined_seq));
        Ok(candidates)
    }
}

/// Most this provider may add to a new policy expiring at `expiration`
fn headroom(store: &LedgerStore, balance: &ProviderBalance, terms: &TierTerms, expiration: BlockHeight) -> Amount {
    let ratio_room = terms
        .allocation_ceiling(balance.deposited)
        .saturating_sub(balance.allocated);
    let policy_room = terms.exposure.per_policy_cap(balance.deposited);
    let expiration_room = terms
        .exposure
        .per_expiration_cap(balance.deposited)
        .saturating_sub(store.exposure(&balance.provider, &balance.token, expiration));

    balance
        .available
        .min(ratio_room)
        .min(policy_room)
        .min(expiration_room)
}

/// Take from each candidate in order until `required` is covered
fn draw(candidates: &[Candidate], required: Amount) -> Vec<(&Candidate, Amount)> {
    let mut remaining = required;
    let mut draws = Vec::new();

    for candidate in candidates {
        if remaining.is_zero() {
            break;
        }
        let take = candidate.headroom.min(remaining);
        remaining = remaining.saturating_sub(take);
        draws.push((candidate, take));
    }

    draws
}

/// Confirm the collateral due at `height` is actually locked and flag the
/// height as prepared. Returns the height's total requirement.
///
/// The stored need must match the allocations of the height's policies, and
/// every provider must still hold what it owes there: its per-height
/// exposure equals its outstanding allocations, which in turn fit inside
/// its `allocated` balance.
pub fn prepare_liquidity(store: &mut LedgerStore, height: BlockHeight) -> EngineResult<Amount> {
    let total = store
        .liquidity_need(height)
        .map(|need| need.total_collateral_required)
        .ok_or_else(|| EngineError::NotFound(format!("liquidity need at height {}", height)))?;

    verify::ensure(verify::liquidity_need_integrity(store, height)?)?;

    let mut owed: BTreeMap<(ProviderId, Token), Amount> = BTreeMap::new();
    for allocation in store.allocations_expiring_at(height) {
        let entry = owed
            .entry((allocation.provider.clone(), allocation.token.clone()))
            .or_insert(Amount::ZERO);
        *entry = entry.checked_add(allocation.outstanding())?;
    }

    for ((provider, token), due) in &owed {
        verify::ensure(IntegrityReport {
            check: IntegrityCheck::LiquidityNeed,
            subject: format!("{} / {} at height {}", provider, token, height),
            field: "exposure",
            expected: *due,
            actual: store.exposure(provider, token, height),
        })?;

        let allocated = store
            .provider_balance(provider, token)
            .map(|b| b.allocated)
            .unwrap_or(Amount::ZERO);
        if allocated < *due {
            return Err(EngineError::InsufficientLiquidity {
                token: token.clone(),
                required: *due,
                eligible: allocated,
            });
        }
    }

    store.liquidity_need_entry(height).prepared = true;
    Ok(total)
}
