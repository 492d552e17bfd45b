//! Meridian Tenant Isolation Guard
//!
//! This crate is the isolation core of the Meridian business-records
//! backend: every database operation a request performs is scoped to the
//! caller's tenant (and, optionally, reseller group), with PostgreSQL
//! row-level security as the last line of defense and a code-level write
//! gate as defense in depth.
//!
//! # How a request flows
//!
//! 1. The HTTP middleware (in `meridian-rest`) resolves a
//!    [`TenantIdentity`](identity::TenantIdentity) and constructs a
//!    [`RequestGuard`](guard::RequestGuard) over one pooled session.
//! 2. The guard is installed into the [`registry`] for the request's task:
//!    service code anywhere below retrieves it with [`registry::current`],
//!    with no parameter threading and no cross-request leakage.
//! 3. Before reading, code calls `ensure_read()`; before writing,
//!    `ensure_write()`. The first transition lazily opens the transaction
//!    and writes the security context
//!    ([`SecurityContextWriter`](context::SecurityContextWriter)) that the
//!    database's row-security policies evaluate.
//! 4. Every mutating statement passes the
//!    [`WriteEnforcementHook`](enforce::WriteEnforcementHook): if the guard
//!    has not entered write mode, the statement is rejected before it
//!    reaches the database.
//! 5. At the end of the request the guard is disposed (commit or rollback)
//!    on every exit path.
//!
//! # Backend Features
//!
//! Enable backends with feature flags in `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! meridian-guard = { version = "0.1", features = ["postgres"] }
//! ```
//!
//! - `sqlite` (default) - embedded SQLite; no row security, guarded by
//!   [`PassthroughGuard`](guard::PassthroughGuard)
//! - `postgres` - PostgreSQL with row-level security
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use meridian_guard::config::GuardConfig;
//! use meridian_guard::guard::{DisposeOutcome, IsolationGuard, RequestGuard};
//! use meridian_guard::identity::{TenantId, TenantIdentity};
//! use meridian_guard::registry;
//! use meridian_guard::session::{SessionFactory, SqlValue};
//!
//! async fn handle_request(sessions: Arc<dyn SessionFactory>) {
//!     let identity = TenantIdentity::new(TenantId::new("acme"));
//!     let guard: Arc<dyn IsolationGuard> = Arc::new(RequestGuard::new(
//!         identity,
//!         GuardConfig::default(),
//!         sessions,
//!     ));
//!
//!     let outcome = registry::scope(guard.clone(), async {
//!         // ... service code, arbitrarily deep:
//!         let guard = registry::current()?;
//!         guard.ensure_read().await?;
//!         let rows = guard.query("SELECT id FROM records", &[]).await?;
//!
//!         guard.ensure_write().await?;
//!         guard
//!             .execute(
//!                 "INSERT INTO records (id) VALUES ($1)",
//!                 &[SqlValue::from("r-1")],
//!             )
//!             .await?;
//!         Ok::<_, meridian_guard::error::GuardError>(rows.len())
//!     })
//!     .await;
//!
//!     let disposal = match outcome {
//!         Ok(_) => DisposeOutcome::Commit,
//!         Err(_) => DisposeOutcome::Rollback,
//!     };
//!     guard.dispose(disposal).await.expect("disposal");
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod config;
pub mod context;
pub mod ddl;
pub mod enforce;
pub mod error;
pub mod guard;
pub mod identity;
pub mod registry;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types at crate root
pub use config::GuardConfig;
pub use error::{GuardError, GuardResult, SessionError};
pub use guard::{DisposeOutcome, GuardMode, IsolationGuard, PassthroughGuard, RequestGuard};
pub use identity::{GroupId, TenantId, TenantIdentity};
pub use session::{DataSession, SessionFactory, SqlRow, SqlValue};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
