//! Premium Distribution Engine
//!
//! A recorded premium sits in each allocated provider's `pending` balance,
//! split by premium share. Once the policy expires out of the money the
//! same split is moved to `earned` and the policy's collateral is returned.
//! An expired policy that never had a premium recorded has nothing to
//! distribute; a batch only returns its collateral.

use crate::apportion::apportion;
use crate::batch::{window, BatchFailure};
use crate::capital::CapitalLedger;
use crate::context::ExecutionContext;
use crate::error::{EngineError, EngineResult};
use crate::settlement::release_collateral;
use crate::verify;
use hedgepool_core::{Amount, BlockHeight, PolicyId, PolicyStatus};
use hedgepool_ledger::{DistributionStatus, LedgerStore, Policy, PremiumDistribution, ProviderAmount};
use hedgepool_params::{BatchLimits, ParameterStore};
use tracing::warn;

/// Split of `policy.premium` across its allocations by premium share
fn premium_split(store: &LedgerStore, policy: &Policy) -> Vec<ProviderAmount> {
    let allocations = store.allocations_for_policy(policy.id);
    let weights: Vec<u64> = allocations.iter().map(|a| a.premium_share.ppm()).collect();
    let parts = apportion(policy.premium.value(), &weights);

    allocations
        .iter()
        .zip(parts)
        .map(|(a, part)| ProviderAmount {
            provider: a.provider.clone(),
            amount: Amount::new(part),
        })
        .collect()
}

fn load_policy(store: &LedgerStore, policy_id: PolicyId) -> EngineResult<Policy> {
    store
        .policy(policy_id)
        .cloned()
        .ok_or_else(|| EngineError::NotFound(policy_id.to_string()))
}

/// Book the buyer's premium as pending for each allocated provider.
///
/// The amount must equal the premium submitted with the policy, and the
/// policy must still be active.
pub fn record_premium(store: &mut LedgerStore, policy_id: PolicyId, amount: Amount) -> EngineResult<Vec<ProviderAmount>> {
    let policy = load_policy(store, policy_id)?;
    if policy.status != PolicyStatus::Active {
        return Err(EngineError::InvalidState {
            policy_id,
            status: policy.status,
            action: "record premium for",
        });
    }
    if policy.premium_recorded {
        return Err(EngineError::AlreadyProcessed(format!("premium of {} is recorded", policy_id)));
    }
    if amount != policy.premium {
        return Err(EngineError::PremiumMismatch {
            policy_id,
            expected: policy.premium,
            actual: amount,
        });
    }

    let split = premium_split(store, &policy);
    let mut capital = CapitalLedger::new(store);
    for share in &split {
        capital.add_pending(&share.provider, &policy.token, share.amount)?;
    }

    if let Some(policy) = store.policy_mut(policy_id) {
        policy.premium_recorded = true;
    }
    verify::ensure(verify::pool_balance_integrity(store, &policy.token)?)?;
    Ok(split)
}

/// Move a recorded premium from pending to earned and write one
/// distribution record per provider.
pub(crate) fn credit_policy_premium(
    store: &mut LedgerStore,
    policy_id: PolicyId,
    status: DistributionStatus,
    ctx: &ExecutionContext,
) -> EngineResult<Vec<ProviderAmount>> {
    let policy = load_policy(store, policy_id)?;
    let split = premium_split(store, &policy);

    for share in &split {
        CapitalLedger::new(store).credit_premium(&share.provider, &policy.token, share.amount)?;

        let (basis, premium_share) = match store.allocation_mut(policy_id, &share.provider) {
            Some(allocation) => {
                allocation.premium_distributed = true;
                (allocation.amount, allocation.premium_share)
            }
            None => return Err(EngineError::NotFound(format!("allocation {} / {}", policy_id, share.provider))),
        };

        let inserted = store.insert_premium_distribution(PremiumDistribution {
            policy_id,
            provider: share.provider.clone(),
            amount: share.amount,
            basis,
            premium_share,
            distributed_at: ctx.height,
            timestamp: ctx.now,
            status,
        });
        if !inserted {
            return Err(EngineError::AlreadyProcessed(format!(
                "premium of {} already distributed to {}",
                policy_id, share.provider
            )));
        }
    }

    if let Some(policy) = store.policy_mut(policy_id) {
        policy.premium_distributed = true;
    }
    verify::ensure(verify::premium_distribution_integrity(store, policy_id)?)?;
    Ok(split)
}

/// One distributed policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionOutcome {
    pub policy_id: PolicyId,
    pub shares: Vec<ProviderAmount>,
    /// Collateral returned to providers' available balances
    pub released: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionBatchReport {
    pub height: BlockHeight,
    pub processed: usize,
    pub distributed: usize,
    /// Not eligible for distribution, including unpaid expired policies
    pub skipped: usize,
    pub errored: usize,
    pub more_to_process: bool,
    pub next_index: usize,
    pub outcomes: Vec<DistributionOutcome>,
    /// Collateral returned for expired policies without a recorded premium
    pub releases: Vec<(PolicyId, Amount)>,
    pub failures: Vec<BatchFailure>,
}

/// What a batch does with one indexed policy
enum BatchStep {
    Distribute,
    ReleaseOnly,
    Skip,
}

fn batch_step(policy: Option<&Policy>) -> BatchStep {
    match policy {
        // Unknown ids surface as NotFound through distribute_premium
        None => BatchStep::Distribute,
        Some(p) if p.status != PolicyStatus::ExpiredOtm || p.premium_distributed => BatchStep::Skip,
        Some(p) if !p.premium_recorded => {
            if p.collateral_released {
                BatchStep::Skip
            } else {
                BatchStep::ReleaseOnly
            }
        }
        Some(_) => BatchStep::Distribute,
    }
}

pub struct PremiumDistributor<'a> {
    params: &'a dyn ParameterStore,
}

impl<'a> PremiumDistributor<'a> {
    pub fn new(params: &'a dyn ParameterStore) -> Self {
        Self { params }
    }

    /// Pay out the premium of an out-of-the-money policy and return its
    /// collateral
    pub fn distribute_premium(
        &self,
        store: &mut LedgerStore,
        policy_id: PolicyId,
        ctx: &ExecutionContext,
    ) -> EngineResult<DistributionOutcome> {
        let policy = load_policy(store, policy_id)?;
        if policy.status != PolicyStatus::ExpiredOtm {
            return Err(EngineError::InvalidState {
                policy_id,
                status: policy.status,
                action: "distribute premium of",
            });
        }
        if policy.premium_distributed {
            return Err(EngineError::AlreadyProcessed(format!("premium of {} is distributed", policy_id)));
        }
        if !policy.premium_recorded {
            return Err(EngineError::InvalidState {
                policy_id,
                status: policy.status,
                action: "distribute unrecorded premium of",
            });
        }

        let shares = credit_policy_premium(store, policy_id, DistributionStatus::CreditedOnExpiry, ctx)?;

        let providers: Vec<_> = store
            .allocations_for_policy(policy_id)
            .iter()
            .map(|a| a.provider.clone())
            .collect();
        let mut capital = CapitalLedger::new(store);
        let mut released = Amount::ZERO;
        for provider in &providers {
            released = released.checked_add(capital.release(provider, policy_id)?)?;
        }
        capital.close_if_drained(policy_id)?;

        verify::ensure(verify::pool_balance_integrity(store, &policy.token)?)?;
        verify::ensure(verify::liquidity_need_integrity(store, policy.expiration)?)?;

        Ok(DistributionOutcome {
            policy_id,
            shares,
            released,
        })
    }

    /// Distribute every eligible policy in a window of the height's index.
    ///
    /// Each policy commits on its own; one failure is counted and the batch
    /// moves on. Expired policies whose premium was never recorded are
    /// counted as skipped after their collateral is returned.
    pub fn distribute_batch(
        &self,
        store: &mut LedgerStore,
        height: BlockHeight,
        start_index: usize,
        max_count: usize,
        ctx: &ExecutionContext,
    ) -> EngineResult<DistributionBatchReport> {
        let limits = BatchLimits::fetch(self.params)?;
        let ids = store.policies_expiring_at(height).to_vec();
        let range = window(ids.len(), start_index, max_count.min(limits.max_distribution));

        let mut report = DistributionBatchReport {
            height,
            processed: 0,
            distributed: 0,
            skipped: 0,
            errored: 0,
            more_to_process: range.end < ids.len(),
            next_index: range.end,
            outcomes: Vec::new(),
            releases: Vec::new(),
            failures: Vec::new(),
        };

        for policy_id in &ids[range] {
            report.processed += 1;

            let result = match batch_step(store.policy(*policy_id)) {
                BatchStep::Skip => {
                    report.skipped += 1;
                    continue;
                }
                BatchStep::ReleaseOnly => store
                    .atomic(|s| release_collateral(s, *policy_id))
                    .map(|released| {
                        report.skipped += 1;
                        report.releases.push((*policy_id, released));
                    }),
                BatchStep::Distribute => store
                    .atomic(|s| self.distribute_premium(s, *policy_id, ctx))
                    .map(|outcome| {
                        report.distributed += 1;
                        report.outcomes.push(outcome);
                    }),
            };

            if let Err(e) = result {
                warn!(policy = %policy_id, height, error = %e, "Premium distribution failed");
                report.errored += 1;
                report.failures.push(BatchFailure {
                    policy_id: *policy_id,
                    error: e.to_string(),
                });
            }
        }

        Ok(report)
    }
}
