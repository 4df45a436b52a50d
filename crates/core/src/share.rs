//! Fixed-point shares in parts per million

use serde::{Deserialize, Serialize};
use std::fmt;

/// Denominator of every [`Share`]
pub const SHARE_SCALE: u64 = 1_000_000;

/// A fraction of a whole expressed in parts per million.
///
/// Allocation and premium shares of one policy always sum to exactly
/// [`SHARE_SCALE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Share(u64);

impl Share {
    pub const ZERO: Self = Self(0);
    pub const WHOLE: Self = Self(SHARE_SCALE);

    /// Returns `None` above [`SHARE_SCALE`]
    pub fn from_ppm(ppm: u64) -> Option<Self> {
        (ppm <= SHARE_SCALE).then_some(Self(ppm))
    }

    #[inline]
    pub const fn ppm(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:04}%", self.0 / 10_000, self.0 % 10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_ppm_bounds() {
        assert!(Share::from_ppm(SHARE_SCALE).is_some());
        assert!(Share::from_ppm(SHARE_SCALE + 1).is_none());
    }

    #[test]
    fn test_display_percent() {
        assert_eq!(Share::from_ppm(600_000).unwrap().to_string(), "60.0000%");
        assert_eq!(Share::from_ppm(333_333).unwrap().to_string(), "33.3333%");
    }
}
