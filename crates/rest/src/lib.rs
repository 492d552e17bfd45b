//! Per-request tenant context wiring for the Meridian Records API
//!
//! This crate is the HTTP-side counterpart of `meridian-guard`: it turns an
//! authenticated request into a scoped isolation guard before any handler
//! runs.
//!
//! # Pipeline
//!
//! 1. The authentication layer (external) verifies the caller and inserts a
//!    [`Principal`](claims::Principal) into the request extensions.
//! 2. [`tenant_context_middleware`](middleware::tenant_context_middleware)
//!    resolves the [`TenantIdentity`](meridian_guard::identity::TenantIdentity)
//!    via [`IdentityResolver`](resolver::IdentityResolver) (claims first,
//!    optional hostname directory second, claims always winning) and
//!    publishes it in the request extensions.
//! 3. The middleware constructs the guard (row-security backed or
//!    passthrough, depending on the backend) and installs it in the ambient
//!    registry for the request's task.
//! 4. Handlers and services call `meridian_guard::registry::current()` and
//!    use the guard; errors map to HTTP responses via
//!    [`GuardRejection`](error::GuardRejection).
//! 5. The middleware disposes the guard when the response is ready: commit
//!    for non-error responses, rollback otherwise.
//!
//! # Wiring Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use axum::{Router, middleware as axum_middleware, routing::get};
//! use meridian_guard::backends::sqlite::SqliteSessionFactory;
//! use meridian_guard::session::SessionFactory;
//! use meridian_rest::config::ServerConfig;
//! use meridian_rest::middleware::{TenantContextState, tenant_context_middleware};
//! use meridian_rest::resolver::IdentityResolver;
//!
//! # async fn handler() {}
//! # fn main() -> Result<(), meridian_guard::error::SessionError> {
//! let config = ServerConfig::from_env();
//! let sessions: Arc<dyn SessionFactory> =
//!     Arc::new(SqliteSessionFactory::file("meridian.db")?);
//! let state = TenantContextState::new(
//!     Arc::new(IdentityResolver::new(&config)),
//!     sessions,
//!     config.guard_config(),
//! );
//!
//! let app: Router = Router::new()
//!     .route("/records", get(handler))
//!     .layer(axum_middleware::from_fn_with_state(
//!         state,
//!         tenant_context_middleware,
//!     ));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod claims;
pub mod config;
pub mod error;
pub mod middleware;
pub mod resolver;

// Re-export commonly used types at crate root
pub use claims::Principal;
pub use config::ServerConfig;
pub use error::GuardRejection;
pub use middleware::{TenantContextState, tenant_context_middleware};
pub use resolver::{
    IdentityResolver, IdentitySource, ResolvedIdentity, StaticDirectory, TenantDirectory,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
