//! Policy kind and lifecycle status

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// European option direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum PolicyKind {
    Put,
    Call,
}

impl PolicyKind {
    /// Whether a settlement price puts the policy in the money.
    ///
    /// A price equal to the strike is out of the money for both kinds.
    pub fn is_in_the_money(&self, strike: u64, settlement_price: u64) -> bool {
        match self {
            PolicyKind::Put => settlement_price < strike,
            PolicyKind::Call => settlement_price > strike,
        }
    }
}

/// Policy lifecycle: `Active -> SettledItm | ExpiredOtm`, both terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PolicyStatus {
    Active,
    SettledItm,
    ExpiredOtm,
}

impl PolicyStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PolicyStatus::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_itm_below_strike() {
        assert!(PolicyKind::Put.is_in_the_money(50_000, 40_000));
        assert!(!PolicyKind::Put.is_in_the_money(50_000, 55_000));
        assert!(!PolicyKind::Put.is_in_the_money(50_000, 50_000));
    }

    #[test]
    fn test_call_itm_above_strike() {
        assert!(PolicyKind::Call.is_in_the_money(50_000, 55_000));
        assert!(!PolicyKind::Call.is_in_the_money(50_000, 40_000));
        assert!(!PolicyKind::Call.is_in_the_money(50_000, 50_000));
    }

    #[test]
    fn test_terminal_status() {
        assert!(!PolicyStatus::Active.is_terminal());
        assert!(PolicyStatus::SettledItm.is_terminal());
        assert!(PolicyStatus::ExpiredOtm.is_terminal());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("PUT".parse::<PolicyKind>().unwrap(), PolicyKind::Put);
        assert_eq!(PolicyKind::Call.to_string(), "CALL");
    }
}
