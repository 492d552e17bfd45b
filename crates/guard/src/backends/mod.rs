//! Backend session implementations.
//!
//! Each backend adapts one connection-pool stack to the [`DataSession`]
//! abstraction the guard owns:
//!
//! - [`postgres`] - PostgreSQL via deadpool; evaluates row-security policies.
//! - [`sqlite`] - embedded SQLite via r2d2; no row security, paired with
//!   [`PassthroughGuard`](crate::guard::PassthroughGuard).
//!
//! [`DataSession`]: crate::session::DataSession

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;
