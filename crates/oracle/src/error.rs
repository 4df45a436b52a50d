//! Oracle error types

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Oracle-related errors
#[derive(Debug, Error)]
pub enum OracleError {
    /// No price was published for the height
    #[error("No price data for height {height}")]
    NoData { height: u64 },

    /// Price data is older than the allowed age
    #[error("Stale price for height {height}: published {published}, max age {max_age_secs}s")]
    Stale {
        height: u64,
        published: DateTime<Utc>,
        max_age_secs: u64,
    },

    /// Price data is unusable
    #[error("Invalid price for height {height}: {reason}")]
    InvalidPrice { height: u64, reason: String },

    /// External oracle connection failed
    #[error("Oracle connection failed: {source}")]
    ConnectionFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
