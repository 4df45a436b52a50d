//! In-memory ledger store
//!
//! Pure storage: keyed tables and accessors, no business rules. Mutations
//! that must be all-or-nothing go through [`LedgerStore::atomic`], which
//! records the prior value of every row it touches and puts them back on
//! error. Staging cost follows the rows an operation writes, not the size
//! of the ledger.

use crate::records::{
    AggregateTokenBalance, Allocation, ExpirationLiquidityNeed, Policy, PremiumDistribution,
    ProviderBalance, SettlementImpact,
};
use hedgepool_core::{Amount, BlockHeight, PolicyId, Principal, ProviderId, Token};
use std::collections::BTreeMap;

type PolicyProviderKey = (PolicyId, ProviderId);
type ExposureKey = (ProviderId, Token, BlockHeight);

/// Prior state of one row written inside an open [`LedgerStore::atomic`]
#[derive(Debug, Clone)]
enum Undo {
    Policy(PolicyId, Option<Policy>),
    ProviderBalance((ProviderId, Token), Option<ProviderBalance>),
    Allocation(PolicyProviderKey, Option<Allocation>),
    /// Insert-only tables: undo removes the row
    SettlementImpact(PolicyProviderKey),
    PremiumDistribution(PolicyProviderKey),
    /// Undo pops the last id of the bucket
    Expiring(BlockHeight),
    TokenBalance(Token, Option<AggregateTokenBalance>),
    LiquidityNeed(BlockHeight, Option<ExpirationLiquidityNeed>),
    Exposure(ExposureKey, Option<Amount>),
    ProviderSeq(u64),
}

/// The five logical tables plus the expiration-height index, the policy
/// registry, aggregate token balances and per-height provider exposure.
///
/// No table is ever truncated; rows are inserted or updated in place.
#[derive(Debug, Clone, Default)]
pub struct LedgerStore {
    pub(crate) policies: BTreeMap<PolicyId, Policy>,
    pub(crate) provider_balances: BTreeMap<(ProviderId, Token), ProviderBalance>,
    pub(crate) allocations: BTreeMap<PolicyProviderKey, Allocation>,
    pub(crate) settlement_impacts: BTreeMap<PolicyProviderKey, SettlementImpact>,
    pub(crate) premium_distributions: BTreeMap<PolicyProviderKey, PremiumDistribution>,
    pub(crate) expiration_index: BTreeMap<BlockHeight, Vec<PolicyId>>,
    pub(crate) token_balances: BTreeMap<Token, AggregateTokenBalance>,
    pub(crate) liquidity_needs: BTreeMap<BlockHeight, ExpirationLiquidityNeed>,
    pub(crate) exposures: BTreeMap<ExposureKey, Amount>,
    pub(crate) next_provider_seq: u64,
    undo: Vec<Undo>,
    /// Nesting of open `atomic` scopes
    depth: usize,
}

/// Stores compare by table contents; staging state is not part of it
impl PartialEq for LedgerStore {
    fn eq(&self, other: &Self) -> bool {
        self.policies == other.policies
            && self.provider_balances == other.provider_balances
            && self.allocations == other.allocations
            && self.settlement_impacts == other.settlement_impacts
            && self.premium_distributions == other.premium_distributions
            && self.expiration_index == other.expiration_index
            && self.token_balances == other.token_balances
            && self.liquidity_needs == other.liquidity_needs
            && self.exposures == other.exposures
            && self.next_provider_seq == other.next_provider_seq
    }
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` and keep its writes only if it succeeds.
    ///
    /// On error every row `f` touched is restored, so the store is left
    /// exactly as it was. Scopes nest: an inner error undoes only the inner
    /// scope, an outer error undoes both.
    pub fn atomic<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut LedgerStore) -> Result<T, E>,
    {
        let mark = self.undo.len();
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;

        match out {
            Ok(value) => {
                if self.depth == 0 {
                    self.undo.clear();
                }
                Ok(value)
            }
            Err(e) => {
                self.rollback_to(mark);
                Err(e)
            }
        }
    }

    fn stage(&mut self, prior: impl FnOnce(&Self) -> Undo) {
        if self.depth > 0 {
            let entry = prior(&*self);
            self.undo.push(entry);
        }
    }

    fn rollback_to(&mut self, mark: usize) {
        let entries = self.undo.split_off(mark);
        for entry in entries.into_iter().rev() {
            match entry {
                Undo::Policy(id, prior) => restore(&mut self.policies, id, prior),
                Undo::ProviderBalance(key, prior) => restore(&mut self.provider_balances, key, prior),
                Undo::Allocation(key, prior) => restore(&mut self.allocations, key, prior),
                Undo::SettlementImpact(key) => {
                    self.settlement_impacts.remove(&key);
                }
                Undo::PremiumDistribution(key) => {
                    self.premium_distributions.remove(&key);
                }
                Undo::Expiring(height) => {
                    if let Some(ids) = self.expiration_index.get_mut(&height) {
                        ids.pop();
                        if ids.is_empty() {
                            self.expiration_index.remove(&height);
                        }
                    }
                }
                Undo::TokenBalance(token, prior) => restore(&mut self.token_balances, token, prior),
                Undo::LiquidityNeed(height, prior) => restore(&mut self.liquidity_needs, height, prior),
                Undo::Exposure(key, prior) => restore(&mut self.exposures, key, prior),
                Undo::ProviderSeq(seq) => self.next_provider_seq = seq,
            }
        }
    }

    // === Policies ===

    pub fn policy(&self, id: PolicyId) -> Option<&Policy> {
        self.policies.get(&id)
    }

    pub fn policy_mut(&mut self, id: PolicyId) -> Option<&mut Policy> {
        self.stage(|s| Undo::Policy(id, s.policies.get(&id).cloned()));
        self.policies.get_mut(&id)
    }

    /// Insert a new policy. Returns false if the id is taken.
    pub fn insert_policy(&mut self, policy: Policy) -> bool {
        if self.policies.contains_key(&policy.id) {
            return false;
        }
        let id = policy.id;
        self.stage(|_| Undo::Policy(id, None));
        self.policies.insert(id, policy);
        true
    }

    pub fn policies(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    // === Provider balances ===

    pub fn provider_balance(&self, provider: &ProviderId, token: &Token) -> Option<&ProviderBalance> {
        self.provider_balances
            .get(&(provider.clone(), token.clone()))
    }

    pub fn provider_balance_mut(
        &mut self,
        provider: &ProviderId,
        token: &Token,
    ) -> Option<&mut ProviderBalance> {
        let key = (provider.clone(), token.clone());
        self.stage(|s| Undo::ProviderBalance(key.clone(), s.provider_balances.get(&key).cloned()));
        self.provider_balances.get_mut(&key)
    }

    pub fn insert_provider_balance(&mut self, balance: ProviderBalance) {
        let key = (balance.provider.clone(), balance.token.clone());
        self.stage(|s| Undo::ProviderBalance(key.clone(), s.provider_balances.get(&key).cloned()));
        self.provider_balances.insert(key, balance);
    }

    /// Hand out the next first-deposit sequence number
    pub fn next_provider_seq(&mut self) -> u64 {
        let seq = self.next_provider_seq;
        self.stage(|_| Undo::ProviderSeq(seq));
        self.next_provider_seq += 1;
        seq
    }

    pub fn provider_balances(&self) -> impl Iterator<Item = &ProviderBalance> {
        self.provider_balances.values()
    }

    pub fn provider_balances_for_token<'a>(
        &'a self,
        token: &'a Token,
    ) -> impl Iterator<Item = &'a ProviderBalance> + 'a {
        self.provider_balances
            .values()
            .filter(move |b| &b.token == token)
    }

    // === Allocations ===

    pub fn allocation(&self, policy_id: PolicyId, provider: &ProviderId) -> Option<&Allocation> {
        self.allocations.get(&(policy_id, provider.clone()))
    }

    pub fn allocation_mut(
        &mut self,
        policy_id: PolicyId,
        provider: &ProviderId,
    ) -> Option<&mut Allocation> {
        let key = (policy_id, provider.clone());
        self.stage(|s| Undo::Allocation(key.clone(), s.allocations.get(&key).cloned()));
        self.allocations.get_mut(&key)
    }

    /// Insert an allocation. Returns false if one already exists for the pair.
    pub fn insert_allocation(&mut self, allocation: Allocation) -> bool {
        let key = (allocation.policy_id, allocation.provider.clone());
        if self.allocations.contains_key(&key) {
            return false;
        }
        self.stage(|_| Undo::Allocation(key.clone(), None));
        self.allocations.insert(key, allocation);
        true
    }

    /// All allocations of a policy, in draw order
    pub fn allocations_for_policy(&self, policy_id: PolicyId) -> Vec<&Allocation> {
        let mut rows: Vec<&Allocation> = range_for_policy(&self.allocations, policy_id)
            .map(|(_, a)| a)
            .collect();
        rows.sort_by_key(|a| a.sequence);
        rows
    }

    /// Allocations of every policy indexed at `height`. Walks the height's
    /// index bucket, not the whole table.
    pub fn allocations_expiring_at(&self, height: BlockHeight) -> impl Iterator<Item = &Allocation> + '_ {
        self.policies_expiring_at(height)
            .iter()
            .flat_map(move |id| range_for_policy(&self.allocations, *id).map(|(_, a)| a))
    }

    pub fn allocations(&self) -> impl Iterator<Item = &Allocation> {
        self.allocations.values()
    }

    // === Settlement impacts ===

    /// Insert a settlement impact. Returns false if one already exists.
    pub fn insert_settlement_impact(&mut self, impact: SettlementImpact) -> bool {
        let key = (impact.policy_id, impact.provider.clone());
        if self.settlement_impacts.contains_key(&key) {
            return false;
        }
        self.stage(|_| Undo::SettlementImpact(key.clone()));
        self.settlement_impacts.insert(key, impact);
        true
    }

    pub fn settlement_impacts_for_policy(&self, policy_id: PolicyId) -> Vec<&SettlementImpact> {
        range_for_policy(&self.settlement_impacts, policy_id)
            .map(|(_, s)| s)
            .collect()
    }

    pub fn settlement_impacts(&self) -> impl Iterator<Item = &SettlementImpact> {
        self.settlement_impacts.values()
    }

    // === Premium distributions ===

    /// Insert a distribution record. Returns false if one already exists.
    pub fn insert_premium_distribution(&mut self, record: PremiumDistribution) -> bool {
        let key = (record.policy_id, record.provider.clone());
        if self.premium_distributions.contains_key(&key) {
            return false;
        }
        self.stage(|_| Undo::PremiumDistribution(key.clone()));
        self.premium_distributions.insert(key, record);
        true
    }

    pub fn premium_distributions_for_policy(&self, policy_id: PolicyId) -> Vec<&PremiumDistribution> {
        range_for_policy(&self.premium_distributions, policy_id)
            .map(|(_, d)| d)
            .collect()
    }

    pub fn premium_distributions(&self) -> impl Iterator<Item = &PremiumDistribution> {
        self.premium_distributions.values()
    }

    // === Expiration-height index ===

    pub fn policies_expiring_at(&self, height: BlockHeight) -> &[PolicyId] {
        self.expiration_index
            .get(&height)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn append_expiring(&mut self, height: BlockHeight, policy_id: PolicyId) {
        self.stage(|_| Undo::Expiring(height));
        self.expiration_index.entry(height).or_default().push(policy_id);
    }

    pub fn expiration_heights(&self) -> impl Iterator<Item = BlockHeight> + '_ {
        self.expiration_index.keys().copied()
    }

    // === Aggregate token balances ===

    pub fn token_balance(&self, token: &Token) -> Option<&AggregateTokenBalance> {
        self.token_balances.get(token)
    }

    pub fn token_balance_entry(&mut self, token: &Token) -> &mut AggregateTokenBalance {
        self.stage(|s| Undo::TokenBalance(token.clone(), s.token_balances.get(token).cloned()));
        self.token_balances
            .entry(token.clone())
            .or_insert_with(|| AggregateTokenBalance::new(token.clone()))
    }

    pub fn token_balances(&self) -> impl Iterator<Item = &AggregateTokenBalance> {
        self.token_balances.values()
    }

    // === Expiration liquidity needs ===

    pub fn liquidity_need(&self, height: BlockHeight) -> Option<&ExpirationLiquidityNeed> {
        self.liquidity_needs.get(&height)
    }

    pub fn liquidity_need_entry(&mut self, height: BlockHeight) -> &mut ExpirationLiquidityNeed {
        self.stage(|s| Undo::LiquidityNeed(height, s.liquidity_needs.get(&height).cloned()));
        self.liquidity_needs
            .entry(height)
            .or_insert_with(|| ExpirationLiquidityNeed::new(height))
    }

    pub fn liquidity_needs(&self) -> impl Iterator<Item = &ExpirationLiquidityNeed> {
        self.liquidity_needs.values()
    }

    // === Per-height provider exposure ===

    pub fn exposure(&self, provider: &ProviderId, token: &Token, height: BlockHeight) -> Amount {
        self.exposures
            .get(&(provider.clone(), token.clone(), height))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    pub fn set_exposure(
        &mut self,
        provider: &ProviderId,
        token: &Token,
        height: BlockHeight,
        amount: Amount,
    ) {
        let key = (provider.clone(), token.clone(), height);
        self.stage(|s| Undo::Exposure(key.clone(), s.exposures.get(&key).copied()));
        if amount.is_zero() {
            self.exposures.remove(&key);
        } else {
            self.exposures.insert(key, amount);
        }
    }
}

fn restore<K: Ord, V>(table: &mut BTreeMap<K, V>, key: K, prior: Option<V>) {
    match prior {
        Some(value) => {
            table.insert(key, value);
        }
        None => {
            table.remove(&key);
        }
    }
}

fn range_for_policy<V>(
    table: &BTreeMap<PolicyProviderKey, V>,
    policy_id: PolicyId,
) -> impl Iterator<Item = (&PolicyProviderKey, &V)> {
    table
        .range((policy_id, Principal::new(""))..)
        .take_while(move |((id, _), _)| *id == policy_id)
}
