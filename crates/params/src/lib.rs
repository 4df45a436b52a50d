//! HedgePool Parameters - runtime configuration and risk tier resolution
//!
//! All thresholds are fetched from a [`ParameterStore`] at call time, not
//! hardcoded. This allows tuning tier economics and batch sizes without
//! recompilation.

pub mod error;
pub mod store;
pub mod tiers;
pub mod views;

pub use error::ParamError;
pub use store::{keys, InMemoryParameters, ParamValue, ParameterStore};
pub use tiers::{compatible, ExposureLimit, RiskTierResolver, TierTerms};
pub use views::{BatchLimits, OracleLimits, PolicyBounds};
