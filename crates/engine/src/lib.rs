//! HedgePool Engine - collateral accounting for European protection policies
//!
//! Components, leaves first:
//! - [`capital`]: provider deposit, withdraw, allocate, release and settle
//! - [`allocation`]: tier-prioritized sourcing of a policy's collateral
//! - [`settlement`]: ITM/OTM classification, payouts, resumable batches
//! - [`premium`]: premium bookkeeping and OTM distribution
//! - [`verify`]: reconciliation checks, used as post-conditions and audits
//!
//! [`HedgeEngine`] wires them to the parameter store, price oracle, asset
//! transfer primitive, access control and audit journal.

pub mod allocation;
pub mod apportion;
pub mod auth;
mod batch;
pub mod capital;
pub mod context;
pub mod engine;
pub mod error;
pub mod premium;
pub mod settlement;
pub mod transfer;
pub mod verify;

pub use allocation::{AllocationEngine, LiquidityQuote, PolicyTerms};
pub use auth::{AccessControl, Role};
pub use batch::BatchFailure;
pub use capital::CapitalLedger;
pub use context::ExecutionContext;
pub use engine::{HedgeEngine, DEFAULT_POOL_ACCOUNT};
pub use error::{EngineError, EngineResult};
pub use premium::{DistributionBatchReport, DistributionOutcome, PremiumDistributor};
pub use settlement::{SettlementBatchReport, SettlementEngine, SettlementOutcome};
pub use transfer::{AssetTransfer, InMemoryVault, TransferError};
pub use verify::{AuditSummary, IntegrityCheck, IntegrityReport};
