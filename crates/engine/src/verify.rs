//! Verification Layer - read-only reconciliation of stored aggregates
//!
//! Every check returns an [`IntegrityReport`]; `is_ok()` is the verdict and
//! the report itself is the diagnostic. The engines call [`ensure`] on the
//! same checks as post-conditions, where a mismatch aborts the operation.

use crate::error::{EngineError, EngineResult};
use hedgepool_core::{Amount, BlockHeight, PolicyId, PolicyStatus, ProviderId, ProviderTier, Token, SHARE_SCALE};
use hedgepool_ledger::{AggregateTokenBalance, LedgerStore};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityCheck {
    PoolBalance,
    PolicyAllocation,
    Settlement,
    PremiumDistribution,
    ProviderBalance,
    LiquidityNeed,
}

impl IntegrityCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrityCheck::PoolBalance => "pool_balance",
            IntegrityCheck::PolicyAllocation => "policy_allocation",
            IntegrityCheck::Settlement => "settlement",
            IntegrityCheck::PremiumDistribution => "premium_distribution",
            IntegrityCheck::ProviderBalance => "provider_balance",
            IntegrityCheck::LiquidityNeed => "liquidity_need",
        }
    }
}

impl fmt::Display for IntegrityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one reconciliation. On mismatch `field` names the first
/// quantity that disagreed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub check: IntegrityCheck,
    pub subject: String,
    pub field: &'static str,
    /// Value derived from the constituent records
    pub expected: Amount,
    /// Value stored in the aggregate
    pub actual: Amount,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.expected == self.actual
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} check on {}: {} expected {}, found {}",
            self.check, self.subject, self.field, self.expected, self.actual
        )
    }
}

/// Result of [`audit_all`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditSummary {
    pub reports: Vec<IntegrityReport>,
}

impl AuditSummary {
    pub fn checked(&self) -> usize {
        self.reports.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &IntegrityReport> {
        self.reports.iter().filter(|r| !r.is_ok())
    }

    pub fn is_clean(&self) -> bool {
        self.reports.iter().all(IntegrityReport::is_ok)
    }
}

/// Turn a failed report into a fatal error
pub fn ensure(report: IntegrityReport) -> EngineResult<()> {
    if report.is_ok() {
        return Ok(());
    }
    error!(
        check = %report.check,
        subject = %report.subject,
        field = report.field,
        expected = %report.expected,
        actual = %report.actual,
        "Integrity post-condition failed"
    );
    Err(report.into())
}

fn compare(check: IntegrityCheck, subject: String, pairs: &[(&'static str, Amount, Amount)]) -> IntegrityReport {
    let (field, expected, actual) = pairs
        .iter()
        .find(|(_, expected, actual)| expected != actual)
        .or_else(|| pairs.first())
        .copied()
        .unwrap_or(("none", Amount::ZERO, Amount::ZERO));

    IntegrityReport {
        check,
        subject,
        field,
        expected,
        actual,
    }
}

/// Aggregate token balance equals the sum of its provider balances
pub fn pool_balance_integrity(store: &LedgerStore, token: &Token) -> EngineResult<IntegrityReport> {
    let mut deposited = Amount::ZERO;
    let mut available = Amount::ZERO;
    let mut allocated = Amount::ZERO;
    let mut pending = Amount::ZERO;
    let mut earned = Amount::ZERO;

    for balance in store.provider_balances_for_token(token) {
        deposited = deposited.checked_add(balance.deposited)?;
        available = available.checked_add(balance.available)?;
        allocated = allocated.checked_add(balance.allocated)?;
        pending = pending.checked_add(balance.pending_premium)?;
        earned = earned.checked_add(balance.earned_premium)?;
    }

    let empty = AggregateTokenBalance::new(token.clone());
    let pool = store.token_balance(token).unwrap_or(&empty);

    Ok(compare(
        IntegrityCheck::PoolBalance,
        token.to_string(),
        &[
            ("total", deposited, pool.total),
            ("total", allocated.checked_add(available)?, pool.total),
            ("available", available, pool.available),
            ("locked", allocated, pool.locked),
            ("premium_pending", pending, pool.premium_pending),
            ("premium_earned", earned, pool.premium_earned),
        ],
    ))
}

/// Allocations of a policy add up to its required collateral
pub fn policy_allocation_integrity(store: &LedgerStore, policy_id: PolicyId) -> EngineResult<IntegrityReport> {
    let policy = store
        .policy(policy_id)
        .ok_or_else(|| EngineError::NotFound(policy_id.to_string()))?;
    let allocations = store.allocations_for_policy(policy_id);

    let allocated = Amount::checked_sum(allocations.iter().map(|a| a.amount))?;
    let shares = Amount::checked_sum(allocations.iter().map(|a| Amount::new(a.allocation_share.ppm())))?;
    let expected_shares = if allocations.is_empty() {
        Amount::ZERO
    } else {
        Amount::new(SHARE_SCALE)
    };

    Ok(compare(
        IntegrityCheck::PolicyAllocation,
        policy_id.to_string(),
        &[
            ("allocated", policy.required_collateral, allocated),
            ("allocation_share", expected_shares, shares),
        ],
    ))
}

/// Settlement contributions add up to the payout and stay within the
/// policy's allocations
pub fn settlement_integrity(store: &LedgerStore, policy_id: PolicyId) -> EngineResult<IntegrityReport> {
    let policy = store
        .policy(policy_id)
        .ok_or_else(|| EngineError::NotFound(policy_id.to_string()))?;

    let contributed = Amount::checked_sum(
        store
            .settlement_impacts_for_policy(policy_id)
            .iter()
            .map(|s| s.contribution),
    )?;
    let allocated = Amount::checked_sum(store.allocations_for_policy(policy_id).iter().map(|a| a.amount))?;
    let payout = match policy.status {
        PolicyStatus::SettledItm => policy.settlement_amount.unwrap_or(Amount::ZERO),
        _ => Amount::ZERO,
    };

    let mut pairs = vec![("contributions", payout, contributed)];
    if contributed > allocated {
        pairs.push(("contributions_within_allocations", allocated, contributed));
    }
    Ok(compare(IntegrityCheck::Settlement, policy_id.to_string(), &pairs))
}

/// Distribution records of a distributed policy add up to its premium
pub fn premium_distribution_integrity(store: &LedgerStore, policy_id: PolicyId) -> EngineResult<IntegrityReport> {
    let policy = store
        .policy(policy_id)
        .ok_or_else(|| EngineError::NotFound(policy_id.to_string()))?;

    let distributed = Amount::checked_sum(
        store
            .premium_distributions_for_policy(policy_id)
            .iter()
            .map(|d| d.amount),
    )?;
    let expected = if policy.premium_distributed {
        policy.premium
    } else {
        Amount::ZERO
    };

    Ok(compare(
        IntegrityCheck::PremiumDistribution,
        policy_id.to_string(),
        &[("distributed", expected, distributed)],
    ))
}

/// `deposited == allocated + available`, and `allocated` equals what the
/// provider's live allocations still lock.
///
/// Sweeps every allocation; operations check exposure per height instead
/// and leave this to audits.
pub fn provider_balance_integrity(
    store: &LedgerStore,
    provider: &ProviderId,
    token: &Token,
) -> EngineResult<IntegrityReport> {
    let balance = store
        .provider_balance(provider, token)
        .ok_or_else(|| EngineError::NotFound(format!("provider balance {} / {}", provider, token)))?;

    let locked = Amount::checked_sum(
        store
            .allocations()
            .filter(|a| &a.provider == provider && &a.token == token)
            .map(|a| a.outstanding()),
    )?;

    Ok(compare(
        IntegrityCheck::ProviderBalance,
        format!("{} / {}", provider, token),
        &[
            ("deposited", balance.allocated.checked_add(balance.available)?, balance.deposited),
            ("allocated", locked, balance.allocated),
        ],
    ))
}

/// The liquidity need at `height` matches the collateral still locked by
/// policies expiring there
pub fn liquidity_need_integrity(store: &LedgerStore, height: BlockHeight) -> EngineResult<IntegrityReport> {
    let mut total = Amount::ZERO;
    let mut per_tier: BTreeMap<ProviderTier, Amount> = BTreeMap::new();
    for allocation in store.allocations_expiring_at(height) {
        let outstanding = allocation.outstanding();
        total = total.checked_add(outstanding)?;
        if !outstanding.is_zero() {
            let entry = per_tier.entry(allocation.tier).or_insert(Amount::ZERO);
            *entry = entry.checked_add(outstanding)?;
        }
    }

    let open_policies = store
        .policies_expiring_at(height)
        .iter()
        .filter_map(|id| store.policy(*id))
        .filter(|p| !p.collateral_released)
        .count() as u64;

    let (stored_total, stored_count, stored_tiers) = match store.liquidity_need(height) {
        Some(need) => (need.total_collateral_required, need.policy_count, need.per_tier.clone()),
        None => (Amount::ZERO, 0, BTreeMap::new()),
    };

    let mut pairs = vec![
        ("total_collateral_required", total, stored_total),
        ("policy_count", Amount::new(open_policies), Amount::new(stored_count)),
    ];
    let tiers: BTreeSet<ProviderTier> = per_tier.keys().chain(stored_tiers.keys()).copied().collect();
    for tier in tiers {
        pairs.push((
            "per_tier",
            per_tier.get(&tier).copied().unwrap_or(Amount::ZERO),
            stored_tiers.get(&tier).copied().unwrap_or(Amount::ZERO),
        ));
    }

    Ok(compare(IntegrityCheck::LiquidityNeed, format!("height {}", height), &pairs))
}

/// Run every check over every token, provider balance, policy and height
pub fn audit_all(store: &LedgerStore) -> EngineResult<AuditSummary> {
    let mut summary = AuditSummary::default();

    let tokens: BTreeSet<Token> = store
        .token_balances()
        .map(|t| t.token.clone())
        .chain(store.provider_balances().map(|b| b.token.clone()))
        .collect();
    for token in &tokens {
        summary.reports.push(pool_balance_integrity(store, token)?);
    }

    for balance in store.provider_balances() {
        summary
            .reports
            .push(provider_balance_integrity(store, &balance.provider, &balance.token)?);
    }

    for policy in store.policies() {
        summary.reports.push(policy_allocation_integrity(store, policy.id)?);
        summary.reports.push(settlement_integrity(store, policy.id)?);
        summary.reports.push(premium_distribution_integrity(store, policy.id)?);
    }

    let heights: BTreeSet<BlockHeight> = store
        .expiration_heights()
        .chain(store.liquidity_needs().map(|n| n.height))
        .collect();
    for height in heights {
        summary.reports.push(liquidity_need_integrity(store, height)?);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capital::CapitalLedger;
    use hedgepool_core::Principal;

    #[test]
    fn test_clean_store_passes() {
        let mut store = LedgerStore::new();
        CapitalLedger::new(&mut store)
            .deposit(&Principal::new("SP1"), &Token::Sbtc, ProviderTier::Balanced, Amount::new(1_000))
            .unwrap();

        let summary = audit_all(&store).unwrap();
        assert!(summary.is_clean());
        assert_eq!(summary.checked(), 2);
    }

    #[test]
    fn test_pool_mismatch_reported() {
        let mut store = LedgerStore::new();
        CapitalLedger::new(&mut store)
            .deposit(&Principal::new("SP1"), &Token::Sbtc, ProviderTier::Balanced, Amount::new(1_000))
            .unwrap();
        store.token_balance_entry(&Token::Sbtc).total = Amount::new(999);

        let report = pool_balance_integrity(&store, &Token::Sbtc).unwrap();
        assert!(!report.is_ok());
        assert_eq!(report.field, "total");
        assert_eq!(report.expected, Amount::new(1_000));
        assert_eq!(report.actual, Amount::new(999));

        assert!(matches!(ensure(report), Err(EngineError::IntegrityViolation(_))));
    }

    #[test]
    fn test_unknown_policy_is_not_found() {
        let store = LedgerStore::new();
        assert!(matches!(
            policy_allocation_integrity(&store, PolicyId(7)),
            Err(EngineError::NotFound(_))
        ));
    }
}
