//! Authenticated principal claims.
//!
//! The authentication layer (out of scope here) verifies the caller and
//! inserts a [`Principal`] into the request's extensions. This module keeps
//! the claims opaque (a plain name/value map) and provides the pure
//! extraction functions the resolver uses to pull tenant and group
//! identifiers out of it. No reflection-style claim scanning: callers name
//! the claim they want.

use std::collections::HashMap;

use meridian_guard::identity::{GroupId, TenantId, is_valid_identifier};
use serde::{Deserialize, Serialize};

/// The authenticated caller's claims.
///
/// # Example
///
/// ```
/// use meridian_rest::claims::{Principal, tenant_claim};
///
/// let principal = Principal::new()
///     .with_claim("sub", "user-17")
///     .with_claim("tenant_id", "acme");
///
/// let tenant = tenant_claim(&principal, "tenant_id").unwrap();
/// assert_eq!(tenant.as_str(), "acme");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Principal {
    claims: HashMap<String, String>,
}

impl Principal {
    /// Creates an empty principal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a claim.
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    /// Returns the value of the named claim.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.claims.get(name).map(String::as_str)
    }

    /// Returns `true` if the principal carries no claims.
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

/// Extracts the tenant id from the named claim.
///
/// Returns `None` for a missing, empty, or malformed claim value; the
/// request then proceeds with an unresolved tenant and the guard fails any
/// data access.
pub fn tenant_claim(principal: &Principal, claim: &str) -> Option<TenantId> {
    principal
        .get(claim)
        .filter(|value| is_valid_identifier(value))
        .map(TenantId::new)
}

/// Extracts the group id from the named claim.
pub fn group_claim(principal: &Principal, claim: &str) -> Option<GroupId> {
    principal
        .get(claim)
        .filter(|value| is_valid_identifier(value))
        .map(GroupId::new)
}
