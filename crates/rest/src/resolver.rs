//! Tenant identity resolution from multiple sources.
//!
//! The middleware derives a [`TenantIdentity`] for each request from, in
//! priority order: the authenticated principal's claims, and (when enabled)
//! a directory lookup keyed on the request hostname. Claims are always
//! authoritative: a mismatching hostname-derived tenant is logged at error
//! level and otherwise ignored.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use meridian_guard::identity::{TenantId, TenantIdentity};
use thiserror::Error;

use crate::claims::{Principal, group_claim, tenant_claim};
use crate::config::ServerConfig;

/// Source from which the tenant was resolved.
///
/// Sources are listed in priority order (highest to lowest):
/// 1. Authenticated claims
/// 2. Hostname directory lookup
/// 3. Unresolved (anonymous) fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentitySource {
    /// Tenant taken from the principal's claims (authoritative).
    Claims,
    /// Tenant looked up from the request hostname.
    Host,
    /// No source produced a tenant; the identity is anonymous.
    Unresolved,
}

impl IdentitySource {
    /// Returns the priority of this source (higher wins).
    pub fn priority(&self) -> u8 {
        match self {
            IdentitySource::Claims => 3,
            IdentitySource::Host => 2,
            IdentitySource::Unresolved => 1,
        }
    }

    /// Returns `true` if no source produced a tenant.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, IdentitySource::Unresolved)
    }
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentitySource::Claims => write!(f, "claims"),
            IdentitySource::Host => write!(f, "host"),
            IdentitySource::Unresolved => write!(f, "unresolved"),
        }
    }
}

impl Ord for IdentitySource {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority().cmp(&other.priority())
    }
}

impl PartialOrd for IdentitySource {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Error from a tenant directory lookup.
#[derive(Debug, Error)]
#[error("tenant directory lookup failed: {message}")]
pub struct DirectoryError {
    /// What went wrong.
    pub message: String,
}

impl DirectoryError {
    /// Creates a directory error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Looks up the tenant that owns a hostname.
///
/// External collaborator: deployments back this with their tenant table; a
/// lookup is a simple read and runs outside any guard scope.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Returns the tenant registered for `host`, if any.
    async fn tenant_for_host(&self, host: &str) -> Result<Option<TenantId>, DirectoryError>;
}

/// In-memory [`TenantDirectory`] for tests and fixed-fleet deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    hosts: HashMap<String, TenantId>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hostname for a tenant.
    pub fn with_host(mut self, host: impl Into<String>, tenant: TenantId) -> Self {
        self.hosts.insert(host.into(), tenant);
        self
    }
}

#[async_trait]
impl TenantDirectory for StaticDirectory {
    async fn tenant_for_host(&self, host: &str) -> Result<Option<TenantId>, DirectoryError> {
        Ok(self.hosts.get(host).cloned())
    }
}

/// Result of resolving the identity for one request.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    /// The identity the guard will be constructed with.
    pub identity: TenantIdentity,
    /// The source that won.
    pub source: IdentitySource,
    /// Every source that produced a tenant, for diagnostics.
    pub all_sources: Vec<(IdentitySource, TenantId)>,
}

/// Resolves a [`TenantIdentity`] per request from claims and, optionally,
/// a hostname directory.
pub struct IdentityResolver {
    tenant_claim: String,
    group_claim: String,
    host_lookup: bool,
    directory: Option<Arc<dyn TenantDirectory>>,
}

impl IdentityResolver {
    /// Creates a claims-only resolver from the server configuration.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            tenant_claim: config.tenant_claim.clone(),
            group_claim: config.group_claim.clone(),
            host_lookup: config.host_lookup,
            directory: None,
        }
    }

    /// Attaches the tenant directory used for hostname lookups.
    ///
    /// Lookups only run when the configuration enables them.
    pub fn with_directory(mut self, directory: Arc<dyn TenantDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Resolves the identity for one request.
    ///
    /// Never fails: a request without a resolvable tenant yields an
    /// anonymous identity, and the guard rejects its first data access.
    pub async fn resolve(&self, principal: &Principal, host: Option<&str>) -> ResolvedIdentity {
        let mut all_sources = Vec::new();

        if let Some(tenant) = tenant_claim(principal, &self.tenant_claim) {
            all_sources.push((IdentitySource::Claims, tenant));
        }

        if self.host_lookup {
            if let (Some(directory), Some(host)) = (self.directory.as_ref(), host) {
                match directory.tenant_for_host(host).await {
                    Ok(Some(tenant)) => all_sources.push((IdentitySource::Host, tenant)),
                    Ok(None) => {}
                    Err(error) => {
                        tracing::warn!(%host, %error, "tenant directory lookup failed");
                    }
                }
            }
        }

        if let (Some((IdentitySource::Claims, claims_tenant)), Some((IdentitySource::Host, host_tenant))) = (
            all_sources.first(),
            all_sources
                .iter()
                .find(|(source, _)| *source == IdentitySource::Host),
        ) {
            if claims_tenant != host_tenant {
                // Do not silently prefer routing; record the conflict and
                // keep the authenticated value.
                tracing::error!(
                    claims_tenant = %claims_tenant,
                    host_tenant = %host_tenant,
                    "tenant mismatch between claims and host routing; claims value wins"
                );
            }
        }

        let (source, tenant) = all_sources
            .first()
            .cloned()
            .unwrap_or((IdentitySource::Unresolved, TenantId::empty()));

        let mut identity = TenantIdentity::new(tenant);
        if let Some(group) = group_claim(principal, &self.group_claim) {
            identity = identity.with_group(group);
        }

        ResolvedIdentity {
            identity,
            source,
            all_sources,
        }
    }
}
