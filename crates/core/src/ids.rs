//! Identifiers for principals, policies and chain heights

use serde::{Deserialize, Serialize};
use std::fmt;

/// Settlement-chain block height
pub type BlockHeight = u64;

/// Policy identifier, assigned by the issuance component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(pub u64);

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "policy-{}", self.0)
    }
}

impl From<u64> for PolicyId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// An account able to hold or move funds: buyers, providers, the pool
/// itself and operator identities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Capital providers are ordinary principals
pub type ProviderId = Principal;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_id_display() {
        assert_eq!(PolicyId(42).to_string(), "policy-42");
    }

    #[test]
    fn test_principal_roundtrip() {
        let p = Principal::from("SP2ALICE");
        assert_eq!(p.as_str(), "SP2ALICE");
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"SP2ALICE\"");
    }
}
