//! HedgePool Ledger - Durable tables for collateral accounting
//!
//! Pure storage with defined schemas; the business rules live in
//! `hedgepool-engine`.
//!
//! # Tables
//! - Provider balances (provider x token)
//! - Allocations (policy x provider)
//! - Settlement impacts (policy x provider)
//! - Premium distribution records (policy x provider)
//! - Expiration liquidity needs (height)
//! - Expiration-height index (height -> policy ids)
//!
//! plus the policy registry, aggregate token balances and per-height
//! provider exposure.

pub mod error;
pub mod event;
pub mod records;
pub mod snapshot;
pub mod store;

pub use error::LedgerError;
pub use event::{EngineEvent, ProviderAmount};
pub use records::{
    AggregateTokenBalance, Allocation, DistributionStatus, ExpirationExposure,
    ExpirationLiquidityNeed, Policy, PremiumDistribution, ProviderBalance, SettlementImpact,
};
pub use snapshot::LedgerSnapshot;
pub use store::LedgerStore;
