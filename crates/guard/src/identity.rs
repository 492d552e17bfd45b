//! Tenant identity types.
//!
//! This module defines the opaque identifiers ([`TenantId`], [`GroupId`])
//! and the per-request [`TenantIdentity`] value that scopes every database
//! operation. An identity is resolved once per inbound request, published to
//! the request pipeline, and never mutated afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum accepted length for tenant and group identifiers.
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Checks whether a string is acceptable as a tenant or group identifier.
///
/// Identifiers are non-empty, at most [`MAX_IDENTIFIER_LENGTH`] characters,
/// and restricted to ASCII alphanumerics, hyphens, and underscores. The
/// identifiers end up inside database session settings read by row-security
/// policies, so the accepted alphabet is deliberately narrow.
pub fn is_valid_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_IDENTIFIER_LENGTH
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// An opaque tenant identifier.
///
/// The empty tenant id is a valid value: it represents the deliberately
/// unprivileged state of a request whose tenant could not be resolved. Any
/// guard operation performed under an empty tenant fails fast with
/// [`GuardError::MissingTenant`](crate::error::GuardError::MissingTenant)
/// rather than defaulting to unscoped access.
///
/// # Examples
///
/// ```
/// use meridian_guard::identity::TenantId;
///
/// let tenant = TenantId::new("acme-corp");
/// assert_eq!(tenant.as_str(), "acme-corp");
/// assert!(!tenant.is_empty());
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a new tenant id from the given string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the empty (unresolved) tenant id.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Returns the tenant id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this tenant id is empty (unresolved).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TenantId({})", self.0)
    }
}

impl FromStr for TenantId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TenantId::new(s))
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        TenantId::new(s)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        TenantId::new(s)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An opaque reseller-group identifier.
///
/// Groups are a second, optional isolation axis above tenants. They are only
/// consulted when group scoping is enabled in
/// [`GuardConfig`](crate::config::GuardConfig).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    /// Creates a new group id from the given string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the group id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this group id is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupId({})", self.0)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        GroupId::new(s)
    }
}

impl From<String> for GroupId {
    fn from(s: String) -> Self {
        GroupId::new(s)
    }
}

impl AsRef<str> for GroupId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The resolved tenant (and optional group) for one inbound request.
///
/// Constructed once by the request middleware and treated as immutable for
/// the rest of the request. The identity travels through the pipeline
/// explicitly (request extensions); only the guard itself is ambient.
///
/// # Examples
///
/// ```
/// use meridian_guard::identity::{GroupId, TenantId, TenantIdentity};
///
/// let identity = TenantIdentity::new(TenantId::new("acme"))
///     .with_group(GroupId::new("emea-resellers"));
/// assert_eq!(identity.tenant().as_str(), "acme");
/// assert!(!identity.is_anonymous());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantIdentity {
    tenant: TenantId,
    group: Option<GroupId>,
}

impl TenantIdentity {
    /// Creates an identity for the given tenant with no group.
    pub fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            group: None,
        }
    }

    /// Creates the anonymous (unresolved) identity.
    ///
    /// Anonymous identities are intentionally constructible: a request whose
    /// tenant cannot be determined still flows through the pipeline, and the
    /// guard rejects its first data access instead.
    pub fn anonymous() -> Self {
        Self::new(TenantId::empty())
    }

    /// Attaches a group to this identity.
    pub fn with_group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

    /// Returns the tenant id.
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Returns the group id, if resolved.
    pub fn group(&self) -> Option<&GroupId> {
        self.group.as_ref()
    }

    /// Returns `true` if no tenant was resolved for this request.
    pub fn is_anonymous(&self) -> bool {
        self.tenant.is_empty()
    }
}
