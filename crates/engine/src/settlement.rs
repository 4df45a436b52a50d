//! Expiration & Settlement Engine
//!
//! Per policy: `Active -> SettledItm | ExpiredOtm`. An in-the-money policy
//! pays `protection * |strike - price| / strike` to its owner, taken from
//! its providers in proportion to their allocations; what is left of each
//! allocation goes back to `available`. An out-of-the-money policy only
//! changes status and waits for premium distribution.

use crate::apportion::apportion;
use crate::batch::{window, BatchFailure};
use crate::capital::CapitalLedger;
use crate::context::ExecutionContext;
use crate::error::{EngineError, EngineResult};
use crate::premium::credit_policy_premium;
use crate::transfer::AssetTransfer;
use crate::verify::{self, IntegrityCheck, IntegrityReport};
use hedgepool_core::{Amount, BlockHeight, PolicyId, PolicyStatus, Principal, Share, SHARE_SCALE};
use hedgepool_ledger::{Allocation, DistributionStatus, LedgerStore, ProviderAmount, SettlementImpact};
use hedgepool_oracle::OracleError;
use hedgepool_params::{BatchLimits, ParameterStore};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    InTheMoney {
        payout: Amount,
        contributions: Vec<ProviderAmount>,
        /// Premium credited at settlement, empty if none was recorded
        premium: Vec<ProviderAmount>,
    },
    OutOfTheMoney,
    /// Policy was already terminal
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementBatchReport {
    pub height: BlockHeight,
    pub settlement_price: u64,
    pub processed: usize,
    pub itm: usize,
    pub otm: usize,
    pub skipped: usize,
    pub errored: usize,
    pub more_to_process: bool,
    pub next_index: usize,
    pub outcomes: Vec<(PolicyId, SettlementOutcome)>,
    pub failures: Vec<BatchFailure>,
}

pub struct SettlementEngine<'a> {
    params: &'a dyn ParameterStore,
    transfer: &'a dyn AssetTransfer,
    /// Account holding pooled collateral
    pool: &'a Principal,
}

impl<'a> SettlementEngine<'a> {
    pub fn new(params: &'a dyn ParameterStore, transfer: &'a dyn AssetTransfer, pool: &'a Principal) -> Self {
        Self { params, transfer, pool }
    }

    /// Settle or expire one policy at `settlement_price`.
    ///
    /// Terminal policies are left untouched, so repeating the call is a
    /// no-op.
    pub fn process_one(
        &self,
        store: &mut LedgerStore,
        policy_id: PolicyId,
        settlement_price: u64,
        ctx: &ExecutionContext,
    ) -> EngineResult<SettlementOutcome> {
        let policy = store
            .policy(policy_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(policy_id.to_string()))?;
        if policy.status != PolicyStatus::Active {
            return Ok(SettlementOutcome::Skipped);
        }
        check_expired(policy.expiration, ctx)?;
        check_price(policy.expiration, settlement_price)?;

        if !policy.kind.is_in_the_money(policy.strike, settlement_price) {
            if let Some(p) = store.policy_mut(policy_id) {
                p.status = PolicyStatus::ExpiredOtm;
                p.settlement_price = Some(settlement_price);
                p.settlement_amount = Some(Amount::ZERO);
                p.settled_at = Some(ctx.height);
            }
            return Ok(SettlementOutcome::OutOfTheMoney);
        }

        let distance = policy.strike.abs_diff(settlement_price);
        let (payout, capped) = policy.protection_amount.mul_div_floor_capped(
            distance,
            policy.strike,
            policy.required_collateral,
        )?;
        if capped {
            warn!(
                policy = %policy_id,
                price = settlement_price,
                cap = %policy.required_collateral,
                "Payout capped at required collateral"
            );
        }

        let allocations: Vec<Allocation> = store
            .allocations_for_policy(policy_id)
            .into_iter()
            .cloned()
            .collect();
        let locked = Amount::checked_sum(allocations.iter().map(Allocation::outstanding))?;
        if payout > locked {
            return Err(IntegrityReport {
                check: IntegrityCheck::Settlement,
                subject: policy_id.to_string(),
                field: "payout_within_allocations",
                expected: locked,
                actual: payout,
            }
            .into());
        }

        let weights: Vec<u64> = allocations.iter().map(|a| a.amount.value()).collect();
        let parts = apportion(payout.value(), &weights);
        let part_shares = apportion(SHARE_SCALE, &parts);

        let mut contributions = Vec::with_capacity(allocations.len());
        for ((allocation, part), ppm) in allocations.iter().zip(parts).zip(part_shares) {
            let contribution = Amount::new(part);
            store.insert_settlement_impact(SettlementImpact {
                policy_id,
                provider: allocation.provider.clone(),
                original_allocation: allocation.amount,
                contribution,
                remaining_allocation: allocation.amount.checked_sub(contribution)?,
                contribution_share: Share::from_ppm(ppm).unwrap_or(Share::ZERO),
                settled_at: ctx.height,
            });

            let mut capital = CapitalLedger::new(store);
            if !contribution.is_zero() {
                capital.settle(&allocation.provider, policy_id, contribution)?;
            }
            capital.release(&allocation.provider, policy_id)?;

            contributions.push(ProviderAmount {
                provider: allocation.provider.clone(),
                amount: contribution,
            });
        }
        CapitalLedger::new(store).close_if_drained(policy_id)?;

        if let Some(p) = store.policy_mut(policy_id) {
            p.status = PolicyStatus::SettledItm;
            p.settlement_price = Some(settlement_price);
            p.settlement_amount = Some(payout);
            p.settled_at = Some(ctx.height);
        }

        let premium = if policy.premium_recorded && !policy.premium_distributed {
            credit_policy_premium(store, policy_id, DistributionStatus::CreditedOnSettlement, ctx)?
        } else {
            Vec::new()
        };

        verify::ensure(verify::settlement_integrity(store, policy_id)?)?;
        verify::ensure(verify::pool_balance_integrity(store, &policy.token)?)?;
        verify::ensure(verify::liquidity_need_integrity(store, policy.expiration)?)?;

        // Last fallible step: a refused transfer discards the staged ledger
        if !payout.is_zero() {
            self.transfer.transfer(&policy.token, self.pool, &policy.owner, payout)?;
        }

        Ok(SettlementOutcome::InTheMoney {
            payout,
            contributions,
            premium,
        })
    }

    /// Process up to `max_count` policies of the height's index from
    /// `start_index`. Each policy commits on its own; a failure is counted
    /// and the batch moves on. Resume with the returned `next_index`.
    pub fn process_batch(
        &self,
        store: &mut LedgerStore,
        height: BlockHeight,
        settlement_price: u64,
        start_index: usize,
        max_count: usize,
        ctx: &ExecutionContext,
    ) -> EngineResult<SettlementBatchReport> {
        check_expired(height, ctx)?;
        check_price(height, settlement_price)?;
        let limits = BatchLimits::fetch(self.params)?;
        let ids = store.policies_expiring_at(height).to_vec();
        let range = window(ids.len(), start_index, max_count.min(limits.max_settlement));

        let mut report = SettlementBatchReport {
            height,
            settlement_price,
            processed: 0,
            itm: 0,
            otm: 0,
            skipped: 0,
            errored: 0,
            more_to_process: range.end < ids.len(),
            next_index: range.end,
            outcomes: Vec::new(),
            failures: Vec::new(),
        };

        for policy_id in &ids[range] {
            report.processed += 1;
            match store.atomic(|s| self.process_one(s, *policy_id, settlement_price, ctx)) {
                Ok(SettlementOutcome::Skipped) => report.skipped += 1,
                Ok(outcome) => {
                    if matches!(outcome, SettlementOutcome::InTheMoney { .. }) {
                        report.itm += 1;
                    } else {
                        report.otm += 1;
                    }
                    report.outcomes.push((*policy_id, outcome));
                }
                Err(e) => {
                    warn!(policy = %policy_id, height, error = %e, "Policy settlement failed");
                    report.errored += 1;
                    report.failures.push(BatchFailure {
                        policy_id: *policy_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

fn check_expired(height: BlockHeight, ctx: &ExecutionContext) -> EngineResult<()> {
    if ctx.height < height {
        return Err(EngineError::NotExpired {
            height,
            current: ctx.height,
        });
    }
    Ok(())
}

fn check_price(height: BlockHeight, settlement_price: u64) -> EngineResult<()> {
    if settlement_price == 0 {
        return Err(EngineError::Oracle(OracleError::InvalidPrice {
            height,
            reason: "price is zero".to_string(),
        }));
    }
    Ok(())
}

/// Return everything still locked by a terminal policy to its providers
pub fn release_collateral(store: &mut LedgerStore, policy_id: PolicyId) -> EngineResult<Amount> {
    let policy = store
        .policy(policy_id)
        .cloned()
        .ok_or_else(|| EngineError::NotFound(policy_id.to_string()))?;
    if !policy.status.is_terminal() {
        return Err(EngineError::InvalidState {
            policy_id,
            status: policy.status,
            action: "release collateral of",
        });
    }

    let providers: Vec<_> = store
        .allocations_for_policy(policy_id)
        .iter()
        .filter(|a| !a.outstanding().is_zero())
        .map(|a| a.provider.clone())
        .collect();
    if providers.is_empty() {
        return Err(EngineError::AlreadyProcessed(format!("collateral of {} is released", policy_id)));
    }

    let mut capital = CapitalLedger::new(store);
    let mut released = Amount::ZERO;
    for provider in &providers {
        released = released.checked_add(capital.release(provider, policy_id)?)?;
    }
    capital.close_if_drained(policy_id)?;

    verify::ensure(verify::pool_balance_integrity(store, &policy.token)?)?;
    verify::ensure(verify::liquidity_need_integrity(store, policy.expiration)?)?;
    Ok(released)
}
