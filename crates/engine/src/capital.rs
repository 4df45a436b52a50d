//! Capital Ledger - provider deposit, withdraw, allocate, release and settle
//!
//! Every mutation updates the provider balance and the aggregate token
//! balance together. Allocation-level operations also keep the per-height
//! exposure and liquidity-need tables in step. Callers run these inside
//! `LedgerStore::atomic`, so an error part-way leaves nothing behind.

use crate::error::{EngineError, EngineResult};
use hedgepool_core::{Amount, BlockHeight, PolicyId, ProviderId, ProviderTier, Token};
use hedgepool_ledger::{LedgerStore, ProviderBalance};
use tracing::debug;

pub struct CapitalLedger<'a> {
    store: &'a mut LedgerStore,
}

impl<'a> CapitalLedger<'a> {
    pub fn new(store: &'a mut LedgerStore) -> Self {
        Self { store }
    }

    /// Add capital. The first deposit for a token fixes the provider's
    /// draw order; the tier may change only while nothing is allocated.
    pub fn deposit(
        &mut self,
        provider: &ProviderId,
        token: &Token,
        tier: ProviderTier,
        amount: Amount,
    ) -> EngineResult<()> {
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }

        if self.store.provider_balance(provider, token).is_none() {
            let seq = self.store.next_provider_seq();
            self.store
                .insert_provider_balance(ProviderBalance::new(provider.clone(), token.clone(), tier, seq));
        }

        let balance = self.balance_mut(provider, token)?;
        if balance.tier != tier {
            if !balance.allocated.is_zero() {
                return Err(EngineError::TierIncompatible {
                    provider: provider.clone(),
                    current: balance.tier,
                    requested: tier,
                });
            }
            balance.tier = tier;
        }
        balance.deposited = balance.deposited.checked_add(amount)?;
        balance.available = balance.available.checked_add(amount)?;

        let pool = self.store.token_balance_entry(token);
        pool.total = pool.total.checked_add(amount)?;
        pool.available = pool.available.checked_add(amount)?;

        debug!(provider = %provider, token = %token, amount = %amount, "Capital deposited");
        Ok(())
    }

    /// Remove unallocated capital
    pub fn withdraw(&mut self, provider: &ProviderId, token: &Token, amount: Amount) -> EngineResult<()> {
        if amount.is_zero() {
            return Err(EngineError::ZeroAmount);
        }

        let balance = self.balance_mut(provider, token)?;
        if amount > balance.available {
            return Err(EngineError::InsufficientAvailable {
                provider: provider.clone(),
                token: token.clone(),
                available: balance.available,
                requested: amount,
            });
        }
        balance.deposited = balance.deposited.checked_sub(amount)?;
        balance.available = balance.available.checked_sub(amount)?;

        let pool = self.store.token_balance_entry(token);
        pool.total = pool.total.checked_sub(amount)?;
        pool.available = pool.available.checked_sub(amount)?;

        debug!(provider = %provider, token = %token, amount = %amount, "Capital withdrawn");
        Ok(())
    }

    /// Lock `amount` of the provider's available capital against a policy.
    /// The allocation record itself is written by the allocation engine.
    pub fn allocate(&mut self, provider: &ProviderId, policy_id: PolicyId, amount: Amount) -> EngineResult<()> {
        let (token, height) = {
            let policy = self
                .store
                .policy(policy_id)
                .ok_or_else(|| EngineError::NotFound(policy_id.to_string()))?;
            (policy.token.clone(), policy.expiration)
        };

        let balance = self.balance_mut(provider, &token)?;
        if amount > balance.available {
            return Err(EngineError::InsufficientAvailable {
                provider: provider.clone(),
                token: token.clone(),
                available: balance.available,
                requested: amount,
            });
        }
        balance.available = balance.available.checked_sub(amount)?;
        balance.allocated = balance.allocated.checked_add(amount)?;
        let tier = balance.tier;

        let pool = self.store.token_balance_entry(&token);
        pool.available = pool.available.checked_sub(amount)?;
        pool.locked = pool.locked.checked_add(amount)?;

        let exposure = self.store.exposure(provider, &token, height).checked_add(amount)?;
        self.store.set_exposure(provider, &token, height, exposure);

        let need = self.store.liquidity_need_entry(height);
        need.total_collateral_required = need.total_collateral_required.checked_add(amount)?;
        let tier_need = need.per_tier.entry(tier).or_insert(Amount::ZERO);
        *tier_need = tier_need.checked_add(amount)?;

        debug!(provider = %provider, policy = %policy_id, amount = %amount, "Collateral allocated");
        Ok(())
    }

    /// Return whatever is still locked by the provider's allocation to
    /// `available` and mark the allocation released. Returns the amount
    /// freed, zero if it was already released.
    pub fn release(&mut self, provider: &ProviderId, policy_id: PolicyId) -> EngineResult<Amount> {
        let allocation = self
            .store
            .allocation_mut(policy_id, provider)
            .ok_or_else(|| EngineError::NotFound(format!("allocation {} / {}", policy_id, provider)))?;
        if allocation.released {
            return Ok(Amount::ZERO);
        }
        let amount = allocation.outstanding();
        allocation.released = true;
        let (token, height, tier) = (allocation.token.clone(), allocation.expiration, allocation.tier);

        let balance = self.balance_mut(provider, &token)?;
        balance.allocated = balance.allocated.checked_sub(amount)?;
        balance.available = balance.available.checked_add(amount)?;

        let pool = self.store.token_balance_entry(&token);
        pool.locked = pool.locked.checked_sub(amount)?;
        pool.available = pool.available.checked_add(amount)?;

        self.reduce_commitment(provider, &token, height, tier, amount)?;

        debug!(provider = %provider, policy = %policy_id, amount = %amount, "Collateral released");
        Ok(amount)
    }

    /// Pay `amount` of the provider's allocation out of the pool. The units
    /// leave `allocated` and `deposited`; they never pass through `available`.
    pub fn settle(&mut self, provider: &ProviderId, policy_id: PolicyId, amount: Amount) -> EngineResult<()> {
        let allocation = self
            .store
            .allocation_mut(policy_id, provider)
            .ok_or_else(|| EngineError::NotFound(format!("allocation {} / {}", policy_id, provider)))?;
        if allocation.released {
            return Err(EngineError::AlreadyProcessed(format!(
                "allocation {} / {} is released",
                policy_id, provider
            )));
        }
        // Fails if the contribution exceeds what is still locked
        allocation.outstanding().checked_sub(amount)?;
        allocation.settled = allocation.settled.checked_add(amount)?;
        let (token, height, tier) = (allocation.token.clone(), allocation.expiration, allocation.tier);

        let balance = self.balance_mut(provider, &token)?;
        balance.allocated = balance.allocated.checked_sub(amount)?;
        balance.deposited = balance.deposited.checked_sub(amount)?;

        let pool = self.store.token_balance_entry(&token);
        pool.locked = pool.locked.checked_sub(amount)?;
        pool.total = pool.total.checked_sub(amount)?;

        self.reduce_commitment(provider, &token, height, tier, amount)?;

        debug!(provider = %provider, policy = %policy_id, amount = %amount, "Collateral settled");
        Ok(())
    }

    /// Book premium that is not yet owed to the provider
    pub fn add_pending(&mut self, provider: &ProviderId, token: &Token, amount: Amount) -> EngineResult<()> {
        let balance = self.balance_mut(provider, token)?;
        balance.pending_premium = balance.pending_premium.checked_add(amount)?;

        let pool = self.store.token_balance_entry(token);
        pool.premium_pending = pool.premium_pending.checked_add(amount)?;
        Ok(())
    }

    /// Move premium from pending to claimable
    pub fn credit_premium(&mut self, provider: &ProviderId, token: &Token, amount: Amount) -> EngineResult<()> {
        let balance = self.balance_mut(provider, token)?;
        balance.pending_premium = balance.pending_premium.checked_sub(amount)?;
        balance.earned_premium = balance.earned_premium.checked_add(amount)?;

        let pool = self.store.token_balance_entry(token);
        pool.premium_pending = pool.premium_pending.checked_sub(amount)?;
        pool.premium_earned = pool.premium_earned.checked_add(amount)?;

        debug!(provider = %provider, token = %token, amount = %amount, "Premium credited");
        Ok(())
    }

    /// Zero the provider's claimable premium and return it. The caller
    /// transfers the amount out.
    pub fn claim_premium(&mut self, provider: &ProviderId, token: &Token) -> EngineResult<Amount> {
        let balance = self.balance_mut(provider, token)?;
        let amount = balance.earned_premium;
        if amount.is_zero() {
            return Err(EngineError::NothingToClaim {
                provider: provider.clone(),
                token: token.clone(),
            });
        }
        balance.earned_premium = Amount::ZERO;

        let pool = self.store.token_balance_entry(token);
        pool.premium_earned = pool.premium_earned.checked_sub(amount)?;
        Ok(amount)
    }

    /// Mark the policy's collateral fully released once no allocation holds
    /// anything, and drop it from its height's policy count.
    pub fn close_if_drained(&mut self, policy_id: PolicyId) -> EngineResult<bool> {
        let outstanding = Amount::checked_sum(
            self.store
                .allocations_for_policy(policy_id)
                .iter()
                .map(|a| a.outstanding()),
        )?;

        let policy = self
            .store
            .policy_mut(policy_id)
            .ok_or_else(|| EngineError::NotFound(policy_id.to_string()))?;
        if policy.collateral_released || !outstanding.is_zero() {
            return Ok(false);
        }
        policy.collateral_released = true;
        let height = policy.expiration;

        let need = self.store.liquidity_need_entry(height);
        need.policy_count = need.policy_count.saturating_sub(1);
        Ok(true)
    }

    fn balance_mut(&mut self, provider: &ProviderId, token: &Token) -> EngineResult<&mut ProviderBalance> {
        self.store
            .provider_balance_mut(provider, token)
            .ok_or_else(|| EngineError::NotFound(format!("provider balance {} / {}", provider, token)))
    }

    fn reduce_commitment(
        &mut self,
        provider: &ProviderId,
        token: &Token,
        height: BlockHeight,
        tier: ProviderTier,
        amount: Amount,
    ) -> EngineResult<()> {
        let exposure = self.store.exposure(provider, token, height).checked_sub(amount)?;
        self.store.set_exposure(provider, token, height, exposure);

        let need = self.store.liquidity_need_entry(height);
        need.total_collateral_required = need.total_collateral_required.checked_sub(amount)?;
        let tier_need = need.per_tier.entry(tier).or_insert(Amount::ZERO);
        *tier_need = tier_need.checked_sub(amount)?;
        if tier_need.is_zero() {
            need.per_tier.remove(&tier);
        }
        Ok(())
    }
}
