//! Worked settlement scenarios end to end

mod common;

use common::*;
use hedgepool_core::{Amount, PolicyId, PolicyStatus, ProviderTier, Token};
use hedgepool_engine::SettlementOutcome;
use hedgepool_ledger::DistributionStatus;

#[test]
fn test_put_allocation_split() {
    let mut h = two_provider_pool();
    h.issue(1, put_terms(50_000));

    let store = h.engine.store();
    let allocations = store.allocations_for_policy(PolicyId(1));
    assert_eq!(allocations.len(), 2);
    assert_eq!(allocations[0].provider, principal(SP_A));
    assert_eq!(allocations[0].amount, amount(600));
    assert_eq!(allocations[0].allocation_share.ppm(), 600_000);
    assert_eq!(allocations[1].provider, principal(SP_B));
    assert_eq!(allocations[1].amount, amount(400));
    assert_eq!(allocations[1].allocation_share.ppm(), 400_000);

    let a = h.engine.provider_balance(&principal(SP_A), &Token::Sbtc).unwrap();
    assert_eq!(a.allocated, amount(600));
    assert_eq!(a.available, Amount::ZERO);
    assert_eq!(a.pending_premium, amount(30));

    let pool = h.engine.token_balance(&Token::Sbtc).unwrap();
    assert_eq!(pool.total, amount(1_600));
    assert_eq!(pool.locked, amount(1_000));
    assert_eq!(pool.premium_pending, amount(50));

    assert!(h.engine.audit_all().unwrap().is_clean());
}

#[test]
fn test_put_in_the_money() {
    let mut h = two_provider_pool();
    h.issue(1, put_terms(50_000));
    let buyer_before = h.vault.balance_of(&principal(BUYER), &Token::Sbtc);

    let ctx = h.at(OPERATOR, EXPIRY);
    let report = h.engine.process_batch(&ctx, EXPIRY, 40_000, 0, 10).unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.itm, 1);
    assert_eq!(report.otm, 0);
    assert_eq!(report.errored, 0);
    assert!(!report.more_to_process);

    // 1,000 * (50,000 - 40,000) / 50,000
    let policy = h.engine.policy(PolicyId(1)).unwrap();
    assert_eq!(policy.status, PolicyStatus::SettledItm);
    assert_eq!(policy.settlement_amount, Some(amount(200)));
    assert_eq!(policy.settlement_price, Some(40_000));

    let impacts = h.engine.store().settlement_impacts_for_policy(PolicyId(1));
    let a = impacts.iter().find(|i| i.provider == principal(SP_A)).unwrap();
    let b = impacts.iter().find(|i| i.provider == principal(SP_B)).unwrap();
    assert_eq!((a.contribution, a.remaining_allocation), (amount(120), amount(480)));
    assert_eq!((b.contribution, b.remaining_allocation), (amount(80), amount(320)));
    assert_eq!(a.contribution_share.ppm(), 600_000);

    let a_balance = h.engine.provider_balance(&principal(SP_A), &Token::Sbtc).unwrap();
    assert_eq!(a_balance.deposited, amount(480));
    assert_eq!(a_balance.available, amount(480));
    assert_eq!(a_balance.allocated, Amount::ZERO);
    let b_balance = h.engine.provider_balance(&principal(SP_B), &Token::Sbtc).unwrap();
    assert_eq!(b_balance.deposited, amount(920));
    assert_eq!(b_balance.available, amount(920));

    // Premium is earned at settlement
    assert_eq!(a_balance.earned_premium, amount(30));
    assert_eq!(b_balance.earned_premium, amount(20));
    let records = h.engine.store().premium_distributions_for_policy(PolicyId(1));
    assert!(records
        .iter()
        .all(|r| r.status == DistributionStatus::CreditedOnSettlement));

    assert_eq!(
        h.vault.balance_of(&principal(BUYER), &Token::Sbtc),
        buyer_before.checked_add(amount(200)).unwrap()
    );
    assert_eq!(h.engine.liquidity_need(EXPIRY).unwrap().total_collateral_required, Amount::ZERO);
    assert!(h.engine.audit_all().unwrap().is_clean());
}

#[test]
fn test_put_out_of_the_money() {
    let mut h = two_provider_pool();
    h.issue(1, put_terms(50_000));

    let ctx = h.at(OPERATOR, EXPIRY);
    let report = h.engine.process_batch(&ctx, EXPIRY, 55_000, 0, 10).unwrap();
    assert_eq!(report.otm, 1);
    assert_eq!(h.engine.policy(PolicyId(1)).unwrap().status, PolicyStatus::ExpiredOtm);

    // Collateral stays locked until the premium is distributed
    let a = h.engine.provider_balance(&principal(SP_A), &Token::Sbtc).unwrap();
    assert_eq!(a.allocated, amount(600));

    let dist = h.engine.distribute_batch(&ctx, EXPIRY, 0, 10).unwrap();
    assert_eq!(dist.distributed, 1);
    assert_eq!(dist.outcomes[0].released, amount(1_000));

    let a = h.engine.provider_balance(&principal(SP_A), &Token::Sbtc).unwrap();
    assert_eq!(a.available, amount(600));
    assert_eq!(a.allocated, Amount::ZERO);
    assert_eq!(a.earned_premium, amount(30));
    assert_eq!(a.pending_premium, Amount::ZERO);
    let b = h.engine.provider_balance(&principal(SP_B), &Token::Sbtc).unwrap();
    assert_eq!(b.available, amount(1_000));
    assert_eq!(b.earned_premium, amount(20));

    let policy = h.engine.policy(PolicyId(1)).unwrap();
    assert!(policy.premium_distributed);
    assert!(policy.collateral_released);
    assert!(h.engine.premium_distribution_integrity(PolicyId(1)).unwrap().is_ok());
    assert!(h.engine.audit_all().unwrap().is_clean());

    // Distributing again does nothing
    let again = h.engine.distribute_batch(&ctx, EXPIRY, 0, 10).unwrap();
    assert_eq!(again.skipped, 1);
    assert_eq!(again.distributed, 0);
}

#[test]
fn test_claim_premium_pays_out() {
    let mut h = two_provider_pool();
    h.issue(1, put_terms(50_000));
    let ctx = h.at(OPERATOR, EXPIRY);
    h.engine.process_batch(&ctx, EXPIRY, 55_000, 0, 10).unwrap();
    h.engine.distribute_batch(&ctx, EXPIRY, 0, 10).unwrap();

    let before = h.vault.balance_of(&principal(SP_A), &Token::Sbtc);
    let provider_ctx = h.at(SP_A, EXPIRY);
    let claimed = h.engine.claim_premium(&provider_ctx, &Token::Sbtc).unwrap();
    assert_eq!(claimed, amount(30));
    assert_eq!(
        h.vault.balance_of(&principal(SP_A), &Token::Sbtc),
        before.checked_add(amount(30)).unwrap()
    );

    assert!(matches!(
        h.engine.claim_premium(&provider_ctx, &Token::Sbtc),
        Err(hedgepool_engine::EngineError::NothingToClaim { .. })
    ));
}

#[test]
fn test_release_before_distribution() {
    let mut h = two_provider_pool();
    h.issue(1, put_terms(50_000));
    let ctx = h.at(OPERATOR, EXPIRY);
    h.engine.process_batch(&ctx, EXPIRY, 55_000, 0, 10).unwrap();

    let released = h.engine.release_collateral(&ctx, PolicyId(1)).unwrap();
    assert_eq!(released, amount(1_000));
    assert!(matches!(
        h.engine.release_collateral(&ctx, PolicyId(1)),
        Err(hedgepool_engine::EngineError::AlreadyProcessed(_))
    ));

    // Premium still distributes; nothing left to release
    let outcome = h.engine.distribute_premium(&ctx, PolicyId(1)).unwrap();
    assert_eq!(outcome.released, Amount::ZERO);
    assert_eq!(outcome.shares.len(), 2);
    assert!(h.engine.audit_all().unwrap().is_clean());
}

#[test]
fn test_call_payout_is_capped() {
    let mut h = two_provider_pool();
    let mut terms = put_terms(20_000);
    terms.kind = hedgepool_core::PolicyKind::Call;
    h.issue(1, terms);

    // 1,000 * (50,000 - 20,000) / 20,000 = 1,500, capped at 1,000
    let ctx = h.at(OPERATOR, EXPIRY);
    let outcome = h.engine.process_one(&ctx, PolicyId(1), 50_000).unwrap();
    match outcome {
        SettlementOutcome::InTheMoney { payout, .. } => assert_eq!(payout, amount(1_000)),
        other => panic!("expected ITM, got {:?}", other),
    }

    let a = h.engine.provider_balance(&principal(SP_A), &Token::Sbtc).unwrap();
    assert_eq!(a.deposited, Amount::ZERO);
    let policy = h.engine.policy(PolicyId(1)).unwrap();
    assert!(policy.collateral_released);
    assert_eq!(h.engine.liquidity_need(EXPIRY).unwrap().policy_count, 0);
    assert!(h.engine.audit_all().unwrap().is_clean());
}

#[test]
fn test_withdraw_only_unallocated() {
    let mut h = two_provider_pool();
    h.deposit(SP_A, ProviderTier::Conservative, 400);
    h.issue(1, put_terms(50_000));

    let ctx = h.at(SP_A, ISSUED_AT);
    // A backed 1,000 alone, nothing is free
    assert!(matches!(
        h.engine.withdraw(&ctx, &Token::Sbtc, amount(1)),
        Err(hedgepool_engine::EngineError::InsufficientAvailable { .. })
    ));

    let ctx_b = h.at(SP_B, ISSUED_AT);
    h.engine.withdraw(&ctx_b, &Token::Sbtc, amount(1_000)).unwrap();
    assert!(h.engine.provider_balance(&principal(SP_B), &Token::Sbtc).unwrap().deposited.is_zero());
    assert!(h.engine.audit_all().unwrap().is_clean());
}

#[test]
fn test_call_at_extreme_price_settles_capped() {
    let mut h = two_provider_pool();
    let mut terms = put_terms(1);
    terms.kind = hedgepool_core::PolicyKind::Call;
    h.issue(1, terms);
    let buyer_before = h.vault.balance_of(&principal(BUYER), &Token::Sbtc);

    // 1,000 * (u64::MAX / 2 - 1) / 1 does not fit in u64
    let ctx = h.at(OPERATOR, EXPIRY);
    let report = h.engine.process_batch(&ctx, EXPIRY, u64::MAX / 2, 0, 10).unwrap();
    assert_eq!(report.itm, 1);
    assert_eq!(report.errored, 0, "failures: {:?}", report.failures);

    let policy = h.engine.policy(PolicyId(1)).unwrap();
    assert_eq!(policy.status, PolicyStatus::SettledItm);
    assert_eq!(policy.settlement_amount, Some(amount(1_000)));
    assert!(policy.collateral_released);
    assert_eq!(
        h.vault.balance_of(&principal(BUYER), &Token::Sbtc),
        buyer_before.checked_add(amount(1_000)).unwrap()
    );
    assert!(h.engine.audit_all().unwrap().is_clean());
}

#[test]
fn test_three_provider_remainders() {
    let mut h = Harness::new();
    h.vault.mint(&principal("SP_C"), &Token::Sbtc, amount(1_000));
    h.deposit(SP_A, ProviderTier::Conservative, 400);
    h.deposit(SP_B, ProviderTier::Conservative, 400);
    h.deposit("SP_C", ProviderTier::Conservative, 200);

    let mut terms = put_terms(1_000);
    terms.premium = amount(7);
    h.issue(1, terms);

    // 1,000 * (1,000 - 993) / 1,000 = 7 over 400 / 400 / 200
    let ctx = h.at(OPERATOR, EXPIRY);
    let outcome = h.engine.process_one(&ctx, PolicyId(1), 993).unwrap();
    let (payout, contributions, premium) = match outcome {
        SettlementOutcome::InTheMoney {
            payout,
            contributions,
            premium,
        } => (payout, contributions, premium),
        other => panic!("expected ITM, got {:?}", other),
    };
    assert_eq!(payout, amount(7));

    // 2.8 / 2.8 / 1.4: both leftover units go to the first two
    let paid: Vec<u64> = contributions.iter().map(|c| c.amount.value()).collect();
    assert_eq!(paid, vec![3, 3, 1]);
    let earned: Vec<u64> = premium.iter().map(|p| p.amount.value()).collect();
    assert_eq!(earned, vec![3, 3, 1]);

    let impacts = h.engine.store().settlement_impacts_for_policy(PolicyId(1));
    let c = impacts.iter().find(|i| i.provider == principal("SP_C")).unwrap();
    assert_eq!((c.contribution, c.remaining_allocation), (amount(1), amount(199)));
    let shares: u64 = impacts.iter().map(|i| i.contribution_share.ppm()).sum();
    assert_eq!(shares, 1_000_000);

    let c_balance = h.engine.provider_balance(&principal("SP_C"), &Token::Sbtc).unwrap();
    assert_eq!(c_balance.deposited, amount(199));
    assert_eq!(c_balance.earned_premium, amount(1));
    assert!(h.engine.audit_all().unwrap().is_clean());
}
