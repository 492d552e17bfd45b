//! Per-request tenant context middleware.
//!
//! The entry point of the isolation pipeline: for every inbound request it
//! resolves the [`TenantIdentity`](meridian_guard::identity::TenantIdentity),
//! publishes it to the handler chain via request extensions, installs a
//! guard into the ambient registry for the request's task, and disposes the
//! guard (commit or rollback) when the response is ready.
//!
//! The middleware itself never rejects a request for a missing tenant: the
//! anonymous identity flows through and the guard fails the first data
//! access instead. Handlers see that as a
//! [`GuardRejection`](crate::error::GuardRejection).

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::HOST;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use meridian_guard::config::GuardConfig;
use meridian_guard::guard::{DisposeOutcome, IsolationGuard, PassthroughGuard, RequestGuard};
use meridian_guard::registry;
use meridian_guard::session::SessionFactory;

use crate::claims::Principal;
use crate::error::GuardRejection;
use crate::resolver::IdentityResolver;

/// Shared state for [`tenant_context_middleware`].
#[derive(Clone)]
pub struct TenantContextState {
    resolver: Arc<IdentityResolver>,
    sessions: Arc<dyn SessionFactory>,
    guard_config: GuardConfig,
}

impl TenantContextState {
    /// Creates the middleware state.
    pub fn new(
        resolver: Arc<IdentityResolver>,
        sessions: Arc<dyn SessionFactory>,
        guard_config: GuardConfig,
    ) -> Self {
        Self {
            resolver,
            sessions,
            guard_config,
        }
    }
}

/// Middleware function installing the isolation guard for each request.
///
/// Use with `axum::middleware::from_fn_with_state`. Expects the
/// authentication layer above it to have inserted a [`Principal`] into the
/// request extensions; requests without one resolve anonymously.
///
/// Disposal runs on the normal response path with commit for non-error
/// responses and rollback otherwise. If the request future is cancelled
/// mid-flight, the pooled connection's recycle path rolls the dangling
/// transaction back.
pub async fn tenant_context_middleware(
    State(state): State<TenantContextState>,
    mut request: Request,
    next: Next,
) -> Response {
    let principal = request
        .extensions()
        .get::<Principal>()
        .cloned()
        .unwrap_or_default();
    let host = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(strip_port);

    let resolved = state.resolver.resolve(&principal, host.as_deref()).await;
    tracing::debug!(
        tenant = %resolved.identity.tenant(),
        source = %resolved.source,
        "resolved tenant identity"
    );

    // The identity travels explicitly; only the guard is ambient.
    request.extensions_mut().insert(resolved.identity.clone());

    let guard: Arc<dyn IsolationGuard> = if state.sessions.supports_row_security() {
        Arc::new(RequestGuard::new(
            resolved.identity,
            state.guard_config.clone(),
            state.sessions.clone(),
        ))
    } else {
        Arc::new(PassthroughGuard::new(
            resolved.identity,
            state.guard_config.clone(),
            state.sessions.clone(),
        ))
    };

    let response = registry::scope(guard.clone(), next.run(request)).await;

    let outcome = if response.status().is_client_error() || response.status().is_server_error() {
        DisposeOutcome::Rollback
    } else {
        DisposeOutcome::Commit
    };
    if let Err(error) = guard.dispose(outcome).await {
        tracing::error!(%error, "guard disposal failed");
        return GuardRejection::from(error).into_response();
    }

    response
}

/// Strips a port suffix from a Host header value.
fn strip_port(host: &str) -> String {
    if let Some(end) = host.strip_prefix('[') {
        // Bracketed IPv6 literal.
        return end
            .split_once(']')
            .map(|(address, _)| address.to_string())
            .unwrap_or_else(|| host.to_string());
    }
    host.rsplit_once(':')
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| host.to_string())
}
