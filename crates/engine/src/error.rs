//! Engine errors

use crate::transfer::TransferError;
use crate::verify::IntegrityReport;
use chrono::{DateTime, Utc};
use hedgepool_core::{Amount, AmountError, BlockHeight, PolicyId, PolicyStatus, Principal, ProviderTier, Token};
use hedgepool_ledger::LedgerError;
use hedgepool_oracle::OracleError;
use hedgepool_params::ParamError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Insufficient liquidity for {token}: required {required}, eligible {eligible}")]
    InsufficientLiquidity {
        token: Token,
        required: Amount,
        eligible: Amount,
    },

    #[error("Insufficient available balance for {provider} ({token}): available {available}, requested {requested}")]
    InsufficientAvailable {
        provider: Principal,
        token: Token,
        available: Amount,
        requested: Amount,
    },

    #[error("Provider {provider} cannot move from {current} to {requested} tier while collateral is allocated")]
    TierIncompatible {
        provider: Principal,
        current: ProviderTier,
        requested: ProviderTier,
    },

    #[error("Already processed: {0}")]
    AlreadyProcessed(String),

    #[error("Stale price for height {height}: {age_secs}s old, max {max_age_secs}s")]
    StalePrice {
        height: BlockHeight,
        age_secs: i64,
        max_age_secs: u64,
    },

    #[error("No price data for height {height}")]
    NoPriceData { height: BlockHeight },

    #[error("Integrity violation: {0}")]
    IntegrityViolation(Box<IntegrityReport>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{caller} is not authorized to {action}")]
    Unauthorized {
        caller: Principal,
        action: &'static str,
    },

    #[error("Nothing to claim for {provider} ({token})")]
    NothingToClaim { provider: Principal, token: Token },

    #[error("Cannot {action} {policy_id} in status {status}")]
    InvalidState {
        policy_id: PolicyId,
        status: PolicyStatus,
        action: &'static str,
    },

    #[error("Policy out of bounds: {0}")]
    PolicyOutOfBounds(String),

    #[error("Expiration height {height} already holds {limit} policies")]
    ExpirationFull { height: BlockHeight, limit: usize },

    #[error("Premium mismatch for {policy_id}: expected {expected}, got {actual}")]
    PremiumMismatch {
        policy_id: PolicyId,
        expected: Amount,
        actual: Amount,
    },

    #[error("Height {height} has not expired yet (current height {current})")]
    NotExpired {
        height: BlockHeight,
        current: BlockHeight,
    },

    #[error("Amount must be positive")]
    ZeroAmount,

    #[error("Transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] AmountError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),

    #[error("Oracle error: {0}")]
    Oracle(OracleError),
}

impl EngineError {
    /// Map a feed error, measuring a stale price's age against the caller's
    /// clock
    pub fn from_oracle(err: OracleError, now: DateTime<Utc>) -> Self {
        match err {
            OracleError::NoData { height } => EngineError::NoPriceData { height },
            OracleError::Stale {
                height,
                published,
                max_age_secs,
            } => EngineError::StalePrice {
                height,
                age_secs: now.signed_duration_since(published).num_seconds(),
                max_age_secs,
            },
            other => EngineError::Oracle(other),
        }
    }
}

impl From<IntegrityReport> for EngineError {
    fn from(report: IntegrityReport) -> Self {
        EngineError::IntegrityViolation(Box::new(report))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_stale_age_measured_from_caller_clock() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
        let err = EngineError::from_oracle(
            OracleError::Stale {
                height: 1_000,
                published: now - Duration::minutes(90),
                max_age_secs: 3_600,
            },
            now,
        );
        assert!(matches!(
            err,
            EngineError::StalePrice {
                height: 1_000,
                age_secs: 5_400,
                max_age_secs: 3_600,
            }
        ));
    }

    #[test]
    fn test_oracle_errors_mapped() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();
        assert!(matches!(
            EngineError::from_oracle(OracleError::NoData { height: 7 }, now),
            EngineError::NoPriceData { height: 7 }
        ));
        let invalid = OracleError::InvalidPrice {
            height: 7,
            reason: "price is zero".to_string(),
        };
        assert!(matches!(
            EngineError::from_oracle(invalid, now),
            EngineError::Oracle(OracleError::InvalidPrice { height: 7, .. })
        ));
    }
}
