//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use hedgepool_core::{Amount, BlockHeight, BuyerTier, PolicyId, PolicyKind, Principal, ProviderTier, Token};
use hedgepool_engine::{AccessControl, AssetTransfer, HedgeEngine, InMemoryVault, PolicyTerms, Role, DEFAULT_POOL_ACCOUNT};
use hedgepool_oracle::MockOracle;
use hedgepool_params::{keys, InMemoryParameters, ParamValue};
use rust_decimal_macros::dec;
use std::sync::Arc;
use strum::IntoEnumIterator;

pub const ISSUER: &str = "ISSUER";
pub const OPERATOR: &str = "OPERATOR";
pub const BUYER: &str = "BUYER";
pub const SP_A: &str = "SP_A";
pub const SP_B: &str = "SP_B";

pub const ISSUED_AT: BlockHeight = 100;
pub const EXPIRY: BlockHeight = 1_000;

pub fn amount(v: u64) -> Amount {
    Amount::new(v)
}

pub fn principal(id: &str) -> Principal {
    Principal::new(id)
}

/// Fixed clock so repeated runs produce identical records
pub fn clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
}

/// Ratio 1 and no exposure caps for every provider tier
pub fn permissive_params() -> InMemoryParameters {
    let params = InMemoryParameters::with_defaults();
    for tier in ProviderTier::iter() {
        params.set(keys::collateral_ratio(tier), ParamValue::Ratio(dec!(1)));
        params.set(keys::per_policy_limit(tier), ParamValue::Ratio(dec!(1)));
        params.set(keys::per_expiration_limit(tier), ParamValue::Ratio(dec!(1)));
    }
    params
}

pub struct Harness {
    pub engine: HedgeEngine,
    pub vault: Arc<InMemoryVault>,
    pub oracle: Arc<MockOracle>,
    pub params: Arc<InMemoryParameters>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_transfer(|vault| -> Arc<dyn AssetTransfer> { vault })
    }

    /// Route engine transfers through `wrap(vault)`
    pub fn with_transfer(wrap: impl FnOnce(Arc<InMemoryVault>) -> Arc<dyn AssetTransfer>) -> Self {
        let vault = Arc::new(InMemoryVault::new());
        for holder in [BUYER, SP_A, SP_B] {
            vault.mint(&principal(holder), &Token::Sbtc, amount(1_000_000));
        }
        let oracle = Arc::new(MockOracle::new());
        let params = Arc::new(permissive_params());
        let access = AccessControl::new()
            .with_role(ISSUER, Role::PolicyIssuer)
            .with_role(OPERATOR, Role::SettlementOperator);

        let transfer = wrap(vault.clone());
        let engine = HedgeEngine::new(params.clone(), oracle.clone(), transfer, access);

        Self {
            engine,
            vault,
            oracle,
            params,
        }
    }

    pub fn at(&self, caller: &str, height: BlockHeight) -> hedgepool_engine::ExecutionContext {
        hedgepool_engine::ExecutionContext::at(caller, height, clock())
    }

    pub fn deposit(&mut self, provider: &str, tier: ProviderTier, value: u64) {
        let ctx = self.at(provider, ISSUED_AT);
        self.engine
            .deposit(&ctx, &Token::Sbtc, tier, amount(value))
            .unwrap();
    }

    /// Issue a policy and record its premium
    pub fn issue(&mut self, id: u64, policy: PolicyTerms) {
        let ctx = self.at(ISSUER, ISSUED_AT);
        let premium = policy.premium;
        self.engine
            .allocate_collateral(&ctx, PolicyId(id), &policy)
            .unwrap();
        self.engine
            .record_premium(&ctx, PolicyId(id), premium)
            .unwrap();
    }

    pub fn pool_vault_balance(&self) -> Amount {
        self.vault
            .balance_of(&principal(DEFAULT_POOL_ACCOUNT), &Token::Sbtc)
    }
}

/// PUT on 1,000 units, strike 50,000, premium 50
pub fn put_terms(strike: u64) -> PolicyTerms {
    PolicyTerms {
        owner: principal(BUYER),
        kind: PolicyKind::Put,
        strike,
        protection_amount: amount(1_000),
        premium: amount(50),
        token: Token::Sbtc,
        buyer_tier: BuyerTier::Conservative,
        expiration: EXPIRY,
    }
}

/// Two conservative providers with A drawn first: a 1,000 policy is
/// backed 600 by A and 400 by B
pub fn two_provider_pool() -> Harness {
    let mut h = Harness::new();
    h.deposit(SP_A, ProviderTier::Conservative, 600);
    h.deposit(SP_B, ProviderTier::Conservative, 1_000);
    h
}
