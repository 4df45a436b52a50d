//! HedgeEngine - the public surface over the ledger and its collaborators
//!
//! Each operation checks the caller once, runs its ledger changes inside
//! `LedgerStore::atomic`, and after commit logs the change and appends the
//! matching events to the audit journal.

use crate::allocation::{self, AllocationEngine, LiquidityQuote, PolicyTerms};
use crate::auth::{AccessControl, Role};
use crate::capital::CapitalLedger;
use crate::context::ExecutionContext;
use crate::error::{EngineError, EngineResult};
use crate::premium::{self, DistributionBatchReport, DistributionOutcome, PremiumDistributor};
use crate::settlement::{self, SettlementBatchReport, SettlementEngine, SettlementOutcome};
use crate::transfer::AssetTransfer;
use crate::verify::{self, AuditSummary, IntegrityReport};
use hedgepool_core::{Amount, BlockHeight, BuyerTier, PolicyId, Principal, ProviderId, ProviderTier, Token};
use hedgepool_journal::AuditJournal;
use hedgepool_ledger::{
    AggregateTokenBalance, Allocation, EngineEvent, ExpirationLiquidityNeed, LedgerStore, Policy,
    ProviderAmount, ProviderBalance,
};
use hedgepool_oracle::PriceOracle;
use hedgepool_params::{OracleLimits, ParameterStore};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Account that holds pooled collateral and premiums unless configured
pub const DEFAULT_POOL_ACCOUNT: &str = "hedgepool-vault";

pub struct HedgeEngine {
    store: LedgerStore,
    params: Arc<dyn ParameterStore>,
    oracle: Arc<dyn PriceOracle>,
    transfer: Arc<dyn AssetTransfer>,
    access: AccessControl,
    journal: Option<AuditJournal>,
    pool: Principal,
}

impl HedgeEngine {
    pub fn new(
        params: Arc<dyn ParameterStore>,
        oracle: Arc<dyn PriceOracle>,
        transfer: Arc<dyn AssetTransfer>,
        access: AccessControl,
    ) -> Self {
        Self {
            store: LedgerStore::new(),
            params,
            oracle,
            transfer,
            access,
            journal: None,
            pool: Principal::new(DEFAULT_POOL_ACCOUNT),
        }
    }

    /// Start from existing ledger state
    pub fn with_store(mut self, store: LedgerStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_journal(mut self, journal: AuditJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_pool_account(mut self, pool: impl Into<Principal>) -> Self {
        self.pool = pool.into();
        self
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn pool_account(&self) -> &Principal {
        &self.pool
    }

    pub fn access_mut(&mut self) -> &mut AccessControl {
        &mut self.access
    }

    pub fn journal(&self) -> Option<&AuditJournal> {
        self.journal.as_ref()
    }

    /// Write the whole ledger to a JSON snapshot
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        self.store.save(path)?;
        Ok(())
    }

    /// Replace the ledger with a snapshot
    pub fn restore_snapshot(&mut self, path: impl AsRef<Path>) -> EngineResult<()> {
        self.store = LedgerStore::load(path)?;
        info!(policies = self.store.policies().count(), "Ledger restored from snapshot");
        Ok(())
    }

    // === Capital ===

    /// Deposit the caller's capital under `tier`
    pub fn deposit(
        &mut self,
        ctx: &ExecutionContext,
        token: &Token,
        tier: ProviderTier,
        amount: Amount,
    ) -> EngineResult<()> {
        self.access.require_provider(ctx, &self.pool, "deposit")?;
        let provider = ctx.caller.clone();
        let transfer = self.transfer.as_ref();
        let pool = &self.pool;

        self.store.atomic(|s| {
            CapitalLedger::new(s).deposit(&provider, token, tier, amount)?;
            verify::ensure(verify::pool_balance_integrity(s, token)?)?;
            transfer.transfer(token, &provider, pool, amount)?;
            Ok::<_, EngineError>(())
        })?;

        info!(provider = %provider, token = %token, tier = %tier, amount = %amount, "Deposit committed");
        self.record(vec![EngineEvent::Deposited {
            provider,
            token: token.clone(),
            amount,
            tier,
        }]);
        Ok(())
    }

    /// Withdraw unallocated capital back to the caller
    pub fn withdraw(&mut self, ctx: &ExecutionContext, token: &Token, amount: Amount) -> EngineResult<()> {
        self.access.require_provider(ctx, &self.pool, "withdraw")?;
        let provider = ctx.caller.clone();
        let transfer = self.transfer.as_ref();
        let pool = &self.pool;

        self.store.atomic(|s| {
            CapitalLedger::new(s).withdraw(&provider, token, amount)?;
            verify::ensure(verify::pool_balance_integrity(s, token)?)?;
            transfer.transfer(token, pool, &provider, amount)?;
            Ok::<_, EngineError>(())
        })?;

        info!(provider = %provider, token = %token, amount = %amount, "Withdrawal committed");
        self.record(vec![EngineEvent::Withdrawn {
            provider,
            token: token.clone(),
            amount,
        }]);
        Ok(())
    }

    /// Pay the caller's earned premium out
    pub fn claim_premium(&mut self, ctx: &ExecutionContext, token: &Token) -> EngineResult<Amount> {
        self.access.require_provider(ctx, &self.pool, "claim premium")?;
        let provider = ctx.caller.clone();
        let transfer = self.transfer.as_ref();
        let pool = &self.pool;

        let amount = self.store.atomic(|s| {
            let amount = CapitalLedger::new(s).claim_premium(&provider, token)?;
            verify::ensure(verify::pool_balance_integrity(s, token)?)?;
            transfer.transfer(token, pool, &provider, amount)?;
            Ok::<_, EngineError>(amount)
        })?;

        info!(provider = %provider, token = %token, amount = %amount, "Premium claimed");
        self.record(vec![EngineEvent::PremiumClaimed {
            provider,
            token: token.clone(),
            amount,
        }]);
        Ok(amount)
    }

    // === Allocation ===

    pub fn check_liquidity(
        &self,
        token: &Token,
        buyer_tier: BuyerTier,
        amount: Amount,
        expiration: BlockHeight,
    ) -> EngineResult<LiquidityQuote> {
        AllocationEngine::new(self.params.as_ref()).check_liquidity(&self.store, token, buyer_tier, amount, expiration)
    }

    /// Register a policy and lock its collateral
    pub fn allocate_collateral(
        &mut self,
        ctx: &ExecutionContext,
        policy_id: PolicyId,
        terms: &PolicyTerms,
    ) -> EngineResult<Vec<Allocation>> {
        self.access.require(ctx, Role::PolicyIssuer, "allocate collateral")?;
        let engine = AllocationEngine::new(self.params.as_ref());

        let allocations = self
            .store
            .atomic(|s| engine.allocate_collateral(s, policy_id, terms, ctx.height))?;

        info!(
            policy = %policy_id,
            token = %terms.token,
            required = %terms.required_collateral(),
            providers = allocations.len(),
            expiration = terms.expiration,
            "Collateral allocated"
        );
        self.record(vec![EngineEvent::CollateralAllocated {
            policy_id,
            token: terms.token.clone(),
            expiration: terms.expiration,
            allocations: allocations
                .iter()
                .map(|a| ProviderAmount {
                    provider: a.provider.clone(),
                    amount: a.amount,
                })
                .collect(),
        }]);
        Ok(allocations)
    }

    /// Collect the policy's premium from its owner and book it as pending
    pub fn record_premium(
        &mut self,
        ctx: &ExecutionContext,
        policy_id: PolicyId,
        amount: Amount,
    ) -> EngineResult<Vec<ProviderAmount>> {
        self.access.require(ctx, Role::PolicyIssuer, "record premium")?;
        let transfer = self.transfer.as_ref();
        let pool = &self.pool;

        let split = self.store.atomic(|s| {
            let split = premium::record_premium(s, policy_id, amount)?;
            if !amount.is_zero() {
                let policy = s
                    .policy(policy_id)
                    .ok_or_else(|| EngineError::NotFound(policy_id.to_string()))?;
                transfer.transfer(&policy.token, &policy.owner, pool, amount)?;
            }
            Ok::<_, EngineError>(split)
        })?;

        info!(policy = %policy_id, amount = %amount, "Premium recorded");
        self.record(vec![EngineEvent::PremiumRecorded { policy_id, amount }]);
        Ok(split)
    }

    /// Check locked collateral covers the height and mark it prepared
    pub fn prepare_liquidity(&mut self, ctx: &ExecutionContext, height: BlockHeight) -> EngineResult<Amount> {
        self.access.require(ctx, Role::SettlementOperator, "prepare liquidity")?;

        let required = self.store.atomic(|s| allocation::prepare_liquidity(s, height))?;

        info!(height, required = %required, "Liquidity prepared");
        self.record(vec![EngineEvent::LiquidityPrepared { height, required }]);
        Ok(required)
    }

    // === Expiration & settlement ===

    /// Settle one policy at a given price
    pub fn process_one(
        &mut self,
        ctx: &ExecutionContext,
        policy_id: PolicyId,
        settlement_price: u64,
    ) -> EngineResult<SettlementOutcome> {
        self.access.require(ctx, Role::SettlementOperator, "settle policies")?;
        let engine = SettlementEngine::new(self.params.as_ref(), self.transfer.as_ref(), &self.pool);

        let outcome = self
            .store
            .atomic(|s| engine.process_one(s, policy_id, settlement_price, ctx))?;

        let events = settlement_events(policy_id, settlement_price, &outcome);
        self.record(events);
        Ok(outcome)
    }

    /// Settle a window of the policies expiring at `height`
    pub fn process_batch(
        &mut self,
        ctx: &ExecutionContext,
        height: BlockHeight,
        settlement_price: u64,
        start_index: usize,
        max_count: usize,
    ) -> EngineResult<SettlementBatchReport> {
        self.access.require(ctx, Role::SettlementOperator, "settle policies")?;
        let engine = SettlementEngine::new(self.params.as_ref(), self.transfer.as_ref(), &self.pool);

        let report = engine.process_batch(&mut self.store, height, settlement_price, start_index, max_count, ctx)?;

        info!(
            height,
            price = settlement_price,
            processed = report.processed,
            itm = report.itm,
            otm = report.otm,
            skipped = report.skipped,
            errored = report.errored,
            next_index = report.next_index,
            more = report.more_to_process,
            "Settlement batch processed"
        );
        let events = report
            .outcomes
            .iter()
            .flat_map(|(id, outcome)| settlement_events(*id, settlement_price, outcome))
            .collect();
        self.record(events);
        Ok(report)
    }

    /// Settle a window of `height` at the oracle's price, refusing zero
    /// prices and prices older than `oracle.max-price-age-secs` at `ctx.now`
    pub fn process_expirations(
        &mut self,
        ctx: &ExecutionContext,
        height: BlockHeight,
        start_index: usize,
        max_count: usize,
    ) -> EngineResult<SettlementBatchReport> {
        self.access.require(ctx, Role::SettlementOperator, "settle policies")?;

        let limits = OracleLimits::fetch(self.params.as_ref())?;
        let quote = self
            .oracle
            .get_settlement_price(height)
            .and_then(|quote| quote.validate(ctx.now, limits.max_price_age_secs))
            .map_err(|e| EngineError::from_oracle(e, ctx.now))?;

        self.process_batch(ctx, height, quote.price, start_index, max_count)
    }

    /// Return any collateral still locked by a terminal policy
    pub fn release_collateral(&mut self, ctx: &ExecutionContext, policy_id: PolicyId) -> EngineResult<Amount> {
        self.access.require(ctx, Role::SettlementOperator, "release collateral")?;

        let amount = self
            .store
            .atomic(|s| settlement::release_collateral(s, policy_id))?;

        info!(policy = %policy_id, amount = %amount, "Collateral released");
        self.record(vec![EngineEvent::CollateralReleased { policy_id, amount }]);
        Ok(amount)
    }

    // === Premium distribution ===

    pub fn distribute_premium(
        &mut self,
        ctx: &ExecutionContext,
        policy_id: PolicyId,
    ) -> EngineResult<DistributionOutcome> {
        self.access.require(ctx, Role::SettlementOperator, "distribute premium")?;
        let distributor = PremiumDistributor::new(self.params.as_ref());

        let outcome = self
            .store
            .atomic(|s| distributor.distribute_premium(s, policy_id, ctx))?;

        self.record(distribution_events(&outcome));
        Ok(outcome)
    }

    pub fn distribute_batch(
        &mut self,
        ctx: &ExecutionContext,
        height: BlockHeight,
        start_index: usize,
        max_count: usize,
    ) -> EngineResult<DistributionBatchReport> {
        self.access.require(ctx, Role::SettlementOperator, "distribute premium")?;
        let distributor = PremiumDistributor::new(self.params.as_ref());

        let report = distributor.distribute_batch(&mut self.store, height, start_index, max_count, ctx)?;

        info!(
            height,
            processed = report.processed,
            distributed = report.distributed,
            skipped = report.skipped,
            released = report.releases.len(),
            errored = report.errored,
            next_index = report.next_index,
            more = report.more_to_process,
            "Distribution batch processed"
        );
        let events = report
            .outcomes
            .iter()
            .flat_map(distribution_events)
            .chain(
                report
                    .releases
                    .iter()
                    .map(|(policy_id, amount)| EngineEvent::CollateralReleased {
                        policy_id: *policy_id,
                        amount: *amount,
                    }),
            )
            .collect();
        self.record(events);
        Ok(report)
    }

    // === Reads ===

    pub fn policy(&self, policy_id: PolicyId) -> Option<&Policy> {
        self.store.policy(policy_id)
    }

    pub fn provider_balance(&self, provider: &ProviderId, token: &Token) -> Option<&ProviderBalance> {
        self.store.provider_balance(provider, token)
    }

    pub fn token_balance(&self, token: &Token) -> Option<&AggregateTokenBalance> {
        self.store.token_balance(token)
    }

    pub fn liquidity_need(&self, height: BlockHeight) -> Option<&ExpirationLiquidityNeed> {
        self.store.liquidity_need(height)
    }

    // === Verification ===

    pub fn pool_balance_integrity(&self, token: &Token) -> EngineResult<IntegrityReport> {
        verify::pool_balance_integrity(&self.store, token)
    }

    pub fn policy_allocation_integrity(&self, policy_id: PolicyId) -> EngineResult<IntegrityReport> {
        verify::policy_allocation_integrity(&self.store, policy_id)
    }

    pub fn settlement_integrity(&self, policy_id: PolicyId) -> EngineResult<IntegrityReport> {
        verify::settlement_integrity(&self.store, policy_id)
    }

    pub fn premium_distribution_integrity(&self, policy_id: PolicyId) -> EngineResult<IntegrityReport> {
        verify::premium_distribution_integrity(&self.store, policy_id)
    }

    pub fn provider_balance_integrity(&self, provider: &ProviderId, token: &Token) -> EngineResult<IntegrityReport> {
        verify::provider_balance_integrity(&self.store, provider, token)
    }

    pub fn liquidity_need_integrity(&self, height: BlockHeight) -> EngineResult<IntegrityReport> {
        verify::liquidity_need_integrity(&self.store, height)
    }

    pub fn audit_all(&self) -> EngineResult<AuditSummary> {
        verify::audit_all(&self.store)
    }

    /// Journal committed events. The ledger has already committed, so a
    /// journal failure is logged and not returned.
    fn record(&mut self, events: Vec<EngineEvent>) {
        if events.is_empty() {
            return;
        }
        if let Some(journal) = self.journal.as_mut() {
            if let Err(e) = journal.append_all(&events) {
                error!(error = %e, events = events.len(), "Failed to append audit journal");
            }
        }
    }
}

fn settlement_events(policy_id: PolicyId, settlement_price: u64, outcome: &SettlementOutcome) -> Vec<EngineEvent> {
    match outcome {
        SettlementOutcome::InTheMoney {
            payout,
            contributions,
            premium,
        } => {
            let mut events = vec![EngineEvent::PolicySettled {
                policy_id,
                settlement_price,
                payout: *payout,
                contributions: contributions.clone(),
            }];
            if !premium.is_empty() {
                events.push(EngineEvent::PremiumDistributed {
                    policy_id,
                    shares: premium.clone(),
                });
            }
            events
        }
        SettlementOutcome::OutOfTheMoney => vec![EngineEvent::PolicyExpired {
            policy_id,
            settlement_price,
        }],
        SettlementOutcome::Skipped => Vec::new(),
    }
}

fn distribution_events(outcome: &DistributionOutcome) -> Vec<EngineEvent> {
    vec![
        EngineEvent::PremiumDistributed {
            policy_id: outcome.policy_id,
            shares: outcome.shares.clone(),
        },
        EngineEvent::CollateralReleased {
            policy_id: outcome.policy_id,
            amount: outcome.released,
        },
    ]
}
