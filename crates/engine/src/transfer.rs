//! Asset transfer collaborator
//!
//! Every payout, withdrawal, deposit and premium movement goes through
//! [`AssetTransfer`]. The engine calls it as the last fallible step of an
//! operation, so a refused transfer discards the staged ledger changes.

use hedgepool_core::{Amount, Principal, Token};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Insufficient funds: {holder} holds {balance} {token}, needs {requested}")]
    InsufficientFunds {
        holder: Principal,
        token: Token,
        balance: Amount,
        requested: Amount,
    },

    #[error("Transfer rejected: {0}")]
    Rejected(String),
}

/// Moves settlement assets between principals
pub trait AssetTransfer: Send + Sync {
    fn transfer(
        &self,
        token: &Token,
        from: &Principal,
        to: &Principal,
        amount: Amount,
    ) -> Result<(), TransferError>;
}

/// In-memory token balances, for tests and simulations
#[derive(Debug, Default)]
pub struct InMemoryVault {
    balances: RwLock<BTreeMap<(Principal, Token), Amount>>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `holder` out of thin air
    pub fn mint(&self, holder: &Principal, token: &Token, amount: Amount) {
        let mut balances = self.balances.write().unwrap_or_else(PoisonError::into_inner);
        let entry = balances
            .entry((holder.clone(), token.clone()))
            .or_insert(Amount::ZERO);
        *entry = Amount::new(entry.value().saturating_add(amount.value()));
    }

    pub fn balance_of(&self, holder: &Principal, token: &Token) -> Amount {
        self.balances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(holder.clone(), token.clone()))
            .copied()
            .unwrap_or(Amount::ZERO)
    }
}

impl AssetTransfer for InMemoryVault {
    fn transfer(
        &self,
        token: &Token,
        from: &Principal,
        to: &Principal,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let mut balances = self.balances.write().unwrap_or_else(PoisonError::into_inner);

        let from_key = (from.clone(), token.clone());
        let balance = balances.get(&from_key).copied().unwrap_or(Amount::ZERO);
        let remaining = balance
            .checked_sub(amount)
            .map_err(|_| TransferError::InsufficientFunds {
                holder: from.clone(),
                token: token.clone(),
                balance,
                requested: amount,
            })?;

        let to_key = (to.clone(), token.clone());
        let credited = balances
            .get(&to_key)
            .copied()
            .unwrap_or(Amount::ZERO)
            .checked_add(amount)
            .map_err(|e| TransferError::Rejected(e.to_string()))?;

        balances.insert(from_key, remaining);
        balances.insert(to_key, credited);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_moves_funds() {
        let vault = InMemoryVault::new();
        let alice = Principal::new("ALICE");
        let pool = Principal::new("POOL");
        vault.mint(&alice, &Token::Sbtc, Amount::new(500));

        vault
            .transfer(&Token::Sbtc, &alice, &pool, Amount::new(200))
            .unwrap();

        assert_eq!(vault.balance_of(&alice, &Token::Sbtc), Amount::new(300));
        assert_eq!(vault.balance_of(&pool, &Token::Sbtc), Amount::new(200));
    }

    #[test]
    fn test_insufficient_funds_changes_nothing() {
        let vault = InMemoryVault::new();
        let alice = Principal::new("ALICE");
        let pool = Principal::new("POOL");
        vault.mint(&alice, &Token::Sbtc, Amount::new(100));

        let result = vault.transfer(&Token::Sbtc, &alice, &pool, Amount::new(101));
        assert!(matches!(result, Err(TransferError::InsufficientFunds { .. })));
        assert_eq!(vault.balance_of(&alice, &Token::Sbtc), Amount::new(100));
        assert_eq!(vault.balance_of(&pool, &Token::Sbtc), Amount::ZERO);
    }
}
