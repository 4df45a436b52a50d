//! HedgePool Core - Domain types
//!
//! This crate contains the fundamental types shared by every HedgePool crate:
//! - `Amount`: Integer base-unit amounts with checked arithmetic
//! - `Token`: Collateral token codes
//! - `PolicyId`, `Principal`, `BlockHeight`: identifiers
//! - `BuyerTier`, `ProviderTier`: risk tiers
//! - `PolicyKind`, `PolicyStatus`: option direction and lifecycle
//! - `Share`: parts-per-million fractions

pub mod amount;
pub mod ids;
pub mod policy;
pub mod share;
pub mod tier;
pub mod token;

pub use amount::{Amount, AmountError};
pub use ids::{BlockHeight, PolicyId, Principal, ProviderId};
pub use policy::{PolicyKind, PolicyStatus};
pub use share::{Share, SHARE_SCALE};
pub use tier::{BuyerTier, ProviderTier};
pub use token::{Token, TokenError};
