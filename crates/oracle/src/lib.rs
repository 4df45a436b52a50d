//! HedgePool Price Oracle
//!
//! Supplies settlement prices per expiration height. Aggregation of external
//! feeds happens elsewhere; this crate defines the interface the settlement
//! engine consumes, freshness validation, and a MockOracle for tests.

mod error;
mod mock;
mod types;

pub use error::OracleError;
pub use mock::MockOracle;
pub use types::{PriceOracle, SettlementPrice};
