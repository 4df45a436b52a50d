//! JSON snapshot persistence for the ledger store
//!
//! Tuple-keyed maps do not serialize as JSON objects, so a snapshot stores
//! every table as a flat list of self-keyed records and rebuilds the maps on
//! load.

use crate::error::LedgerError;
use crate::records::{
    AggregateTokenBalance, Allocation, ExpirationExposure, ExpirationLiquidityNeed, Policy,
    PremiumDistribution, ProviderBalance, SettlementImpact,
};
use crate::store::LedgerStore;
use hedgepool_core::{BlockHeight, PolicyId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Serialized form of one expiration-height index bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpirationBucket {
    pub height: BlockHeight,
    pub policies: Vec<PolicyId>,
}

/// Flat, serializable image of a [`LedgerStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub policies: Vec<Policy>,
    pub provider_balances: Vec<ProviderBalance>,
    pub allocations: Vec<Allocation>,
    pub settlement_impacts: Vec<SettlementImpact>,
    pub premium_distributions: Vec<PremiumDistribution>,
    pub expiration_index: Vec<ExpirationBucket>,
    pub token_balances: Vec<AggregateTokenBalance>,
    pub liquidity_needs: Vec<ExpirationLiquidityNeed>,
    pub exposures: Vec<ExpirationExposure>,
    pub next_provider_seq: u64,
}

impl LedgerStore {
    pub fn to_snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            policies: self.policies.values().cloned().collect(),
            provider_balances: self.provider_balances.values().cloned().collect(),
            allocations: self.allocations.values().cloned().collect(),
            settlement_impacts: self.settlement_impacts.values().cloned().collect(),
            premium_distributions: self.premium_distributions.values().cloned().collect(),
            expiration_index: self
                .expiration_index
                .iter()
                .map(|(height, policies)| ExpirationBucket {
                    height: *height,
                    policies: policies.clone(),
                })
                .collect(),
            token_balances: self.token_balances.values().cloned().collect(),
            liquidity_needs: self.liquidity_needs.values().cloned().collect(),
            exposures: self
                .exposures
                .iter()
                .map(|((provider, token, height), amount)| ExpirationExposure {
                    provider: provider.clone(),
                    token: token.clone(),
                    height: *height,
                    amount: *amount,
                })
                .collect(),
            next_provider_seq: self.next_provider_seq,
        }
    }

    /// Rebuild a store, rejecting snapshots with duplicate keys
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, LedgerError> {
        let mut store = LedgerStore::new();

        for policy in snapshot.policies {
            let id = policy.id;
            if !store.insert_policy(policy) {
                return Err(LedgerError::CorruptSnapshot(format!("duplicate {}", id)));
            }
        }
        for balance in snapshot.provider_balances {
            let key = (balance.provider.clone(), balance.token.clone());
            if store.provider_balances.insert(key, balance).is_some() {
                return Err(LedgerError::CorruptSnapshot("duplicate provider balance".into()));
            }
        }
        for allocation in snapshot.allocations {
            let id = allocation.policy_id;
            if !store.insert_allocation(allocation) {
                return Err(LedgerError::CorruptSnapshot(format!("duplicate allocation for {}", id)));
            }
        }
        for impact in snapshot.settlement_impacts {
            let id = impact.policy_id;
            if !store.insert_settlement_impact(impact) {
                return Err(LedgerError::CorruptSnapshot(format!("duplicate settlement impact for {}", id)));
            }
        }
        for record in snapshot.premium_distributions {
            let id = record.policy_id;
            if !store.insert_premium_distribution(record) {
                return Err(LedgerError::CorruptSnapshot(format!("duplicate premium record for {}", id)));
            }
        }
        for bucket in snapshot.expiration_index {
            if store.expiration_index.insert(bucket.height, bucket.policies).is_some() {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "duplicate index bucket at {}",
                    bucket.height
                )));
            }
        }
        for balance in snapshot.token_balances {
            store.token_balances.insert(balance.token.clone(), balance);
        }
        for need in snapshot.liquidity_needs {
            store.liquidity_needs.insert(need.height, need);
        }
        for exposure in snapshot.exposures {
            store.set_exposure(&exposure.provider, &exposure.token, exposure.height, exposure.amount);
        }
        store.next_provider_seq = snapshot.next_provider_seq;

        Ok(store)
    }

    /// Write the store to `path` as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(&self.to_snapshot())?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let content = fs::read_to_string(path)?;
        let snapshot: LedgerSnapshot = serde_json::from_str(&content)?;
        Self::from_snapshot(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hedgepool_core::{Amount, ProviderTier, Token};
    use tempfile::TempDir;

    fn populated_store() -> LedgerStore {
        let mut store = LedgerStore::new();
        let seq = store.next_provider_seq();
        let mut balance = ProviderBalance::new("ALICE".into(), Token::Sbtc, ProviderTier::Conservative, seq);
        balance.deposited = Amount::new(1_000);
        balance.available = Amount::new(1_000);
        store.insert_provider_balance(balance);
        store.token_balance_entry(&Token::Sbtc).total = Amount::new(1_000);
        store.append_expiring(144, PolicyId(7));
        store.set_exposure(&"ALICE".into(), &Token::Sbtc, 144, Amount::new(250));
        store
            .liquidity_need_entry(144)
            .per_tier
            .insert(ProviderTier::Conservative, Amount::new(250));
        store
    }

    #[test]
    fn test_save_and_load() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("ledger.json");

        let store = populated_store();
        store.save(&path)?;
        let loaded = LedgerStore::load(&path)?;

        assert_eq!(loaded, store);
        Ok(())
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let mut snapshot = populated_store().to_snapshot();
        let dup = snapshot.provider_balances[0].clone();
        snapshot.provider_balances.push(dup);

        let result = LedgerStore::from_snapshot(snapshot);
        assert!(matches!(result, Err(LedgerError::CorruptSnapshot(_))));
    }
}
