//! Role-based access control
//!
//! Checked once at the top of each public engine operation.

use crate::context::ExecutionContext;
use crate::error::EngineError;
use hedgepool_core::Principal;
use std::collections::{BTreeMap, BTreeSet};

/// Operator roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// Passes every role check
    Admin,
    /// Registers policies and records their premiums
    PolicyIssuer,
    /// Runs expiration batches, premium distribution and releases
    SettlementOperator,
}

/// Principal to role assignments
#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    roles: BTreeMap<Principal, BTreeSet<Role>>,
}

impl AccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style grant
    pub fn with_role(mut self, principal: impl Into<Principal>, role: Role) -> Self {
        self.grant(principal, role);
        self
    }

    pub fn grant(&mut self, principal: impl Into<Principal>, role: Role) {
        self.roles.entry(principal.into()).or_default().insert(role);
    }

    pub fn revoke(&mut self, principal: &Principal, role: Role) {
        if let Some(roles) = self.roles.get_mut(principal) {
            roles.remove(&role);
            if roles.is_empty() {
                self.roles.remove(principal);
            }
        }
    }

    pub fn has_role(&self, principal: &Principal, role: Role) -> bool {
        self.roles
            .get(principal)
            .map(|roles| roles.contains(&role) || roles.contains(&Role::Admin))
            .unwrap_or(false)
    }

    /// Caller must hold `role` (or be an admin)
    pub fn require(
        &self,
        ctx: &ExecutionContext,
        role: Role,
        action: &'static str,
    ) -> Result<(), EngineError> {
        if self.has_role(&ctx.caller, role) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized {
                caller: ctx.caller.clone(),
                action,
            })
        }
    }

    /// Provider operations move the caller's own capital. The pool account
    /// holds every provider's funds and never acts as a provider; admins do
    /// not bypass this.
    pub fn require_provider(
        &self,
        ctx: &ExecutionContext,
        pool: &Principal,
        action: &'static str,
    ) -> Result<(), EngineError> {
        if &ctx.caller == pool {
            return Err(EngineError::Unauthorized {
                caller: ctx.caller.clone(),
                action,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_check() {
        let access = AccessControl::new()
            .with_role("ISSUER", Role::PolicyIssuer)
            .with_role("ROOT", Role::Admin);

        let issuer = ExecutionContext::new("ISSUER", 1);
        let root = ExecutionContext::new("ROOT", 1);
        let stranger = ExecutionContext::new("STRANGER", 1);

        assert!(access.require(&issuer, Role::PolicyIssuer, "issue").is_ok());
        assert!(access.require(&issuer, Role::SettlementOperator, "settle").is_err());
        assert!(access.require(&root, Role::SettlementOperator, "settle").is_ok());
        assert!(matches!(
            access.require(&stranger, Role::PolicyIssuer, "issue"),
            Err(EngineError::Unauthorized { action: "issue", .. })
        ));
    }

    #[test]
    fn test_pool_account_is_never_a_provider() {
        let access = AccessControl::new().with_role("VAULT", Role::Admin);
        let pool = Principal::new("VAULT");

        assert!(access
            .require_provider(&ExecutionContext::new("SP1", 1), &pool, "deposit")
            .is_ok());
        assert!(matches!(
            access.require_provider(&ExecutionContext::new("VAULT", 1), &pool, "deposit"),
            Err(EngineError::Unauthorized { action: "deposit", .. })
        ));
    }

    #[test]
    fn test_revoke() {
        let mut access = AccessControl::new().with_role("OP", Role::SettlementOperator);
        let op = Principal::new("OP");
        assert!(access.has_role(&op, Role::SettlementOperator));
        access.revoke(&op, Role::SettlementOperator);
        assert!(!access.has_role(&op, Role::SettlementOperator));
    }
}
