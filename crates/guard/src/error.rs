//! Error types for the isolation guard.
//!
//! The guard never attempts partial recovery: every error here fails the
//! current operation and propagates to the request boundary. Recovering
//! inside the guard layer would risk handing back an unscoped session.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::guard::GuardMode;
use crate::identity::TenantId;

/// Result alias for guard operations.
pub type GuardResult<T> = Result<T, GuardError>;

/// The primary error type for guard operations.
#[derive(Error, Debug)]
pub enum GuardError {
    /// The guard was asked to act with no resolved tenant.
    ///
    /// Never defaulted: an unresolved tenant granted a session would be
    /// unscoped access.
    #[error("no tenant resolved for this request; refusing unscoped access")]
    MissingTenant,

    /// Group scoping is enabled but the identity carries no group.
    #[error("group scoping is enabled but no group resolved for tenant {tenant}")]
    MissingGroup { tenant: TenantId },

    /// The ambient registry was queried outside any guard scope.
    ///
    /// A programming error: some code path ran data access without the
    /// request middleware installing a guard first.
    #[error("no isolation guard installed for the current task")]
    NoActiveGuard,

    /// A write was attempted while the guard is not in write mode.
    ///
    /// Recoverable by calling `ensure_write()` first; the rejected statement
    /// never reached the database.
    #[error("write rejected in {mode} mode: {statement}")]
    WriteNotAuthorized {
        mode: GuardMode,
        statement: String,
    },

    /// The guard was used after its owning scope was disposed.
    #[error("guard used after disposal")]
    Disposed,

    /// A tenant or group identifier failed validation.
    #[error("invalid identifier {value:?}: {reason}")]
    InvalidIdentifier { value: String, reason: String },

    /// Session-level errors from the data-access layer.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors from the underlying data-access session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A session could not be acquired from the connection pool.
    #[error("failed to acquire session from pool: {message}")]
    Pool { message: String },

    /// A statement was issued with no open transaction.
    #[error("no transaction open on this session")]
    NoTransaction,

    /// A transaction was opened while one was already open.
    #[error("transaction already open on this session")]
    AlreadyInTransaction,

    /// The session has been released.
    #[error("session closed")]
    Closed,

    /// A backend-specific failure.
    #[error("{backend} backend error: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
}

impl SessionError {
    /// Creates a backend error.
    pub fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        SessionError::Backend {
            backend,
            message: message.into(),
        }
    }
}
