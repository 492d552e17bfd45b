//! The per-request isolation guard.
//!
//! A guard wraps exactly one data-access session for one inbound request and
//! runs a small monotonic state machine over it:
//!
//! ```text
//! Unset ──ensure_read──▶ Read ──ensure_write──▶ Write
//!   └────────────ensure_write────────────────────▶
//! ```
//!
//! Entering `Read` or `Write` lazily acquires the session, opens its
//! transaction, and applies the security context, exactly once per
//! transition. `Read → Write` promotes the *same* open transaction
//! (read-your-writes is preserved); `Write → Read` does not exist, so a read
//! after a write needs a new request scope. Repeated calls in the current
//! mode are no-ops.
//!
//! Promotion while another read is still executing on the session cannot
//! happen: every session operation and every transition serializes on the
//! guard's internal lock.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::GuardConfig;
use crate::context::{AccessMode, SecurityContextWriter};
use crate::enforce::WriteEnforcementHook;
use crate::error::{GuardError, GuardResult, SessionError};
use crate::identity::TenantIdentity;
use crate::session::{DataSession, SessionFactory, SqlRow, SqlValue, StatementKind};

/// The access mode a guard is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GuardMode {
    /// No transaction has been opened yet.
    Unset = 0,
    /// Read access has been established.
    Read = 1,
    /// Write access has been established.
    Write = 2,
}

impl GuardMode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => GuardMode::Read,
            2 => GuardMode::Write,
            _ => GuardMode::Unset,
        }
    }

    /// Returns `true` once the guard has entered read or write mode.
    pub fn is_entered(self) -> bool {
        !matches!(self, GuardMode::Unset)
    }

    /// Returns `true` if mutating statements are allowed in this mode.
    pub fn allows_writes(self) -> bool {
        matches!(self, GuardMode::Write)
    }
}

impl fmt::Display for GuardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardMode::Unset => write!(f, "unset"),
            GuardMode::Read => write!(f, "read"),
            GuardMode::Write => write!(f, "write"),
        }
    }
}

/// How an open transaction is closed at disposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeOutcome {
    /// Commit the open transaction.
    Commit,
    /// Roll the open transaction back.
    Rollback,
}

/// The guard interface shared by [`RequestGuard`] and [`PassthroughGuard`].
///
/// Service code obtains the active guard from the
/// [ambient registry](crate::registry) rather than receiving it as a
/// parameter, establishes its access mode, and runs statements through it.
#[async_trait]
pub trait IsolationGuard: Send + Sync {
    /// Returns the current mode.
    fn mode(&self) -> GuardMode;

    /// Returns the identity this guard scopes to.
    fn identity(&self) -> &TenantIdentity;

    /// Establishes read access.
    ///
    /// No-op if read or write access is already established.
    async fn ensure_read(&self) -> GuardResult<()>;

    /// Establishes write access, promoting an open read transaction if
    /// necessary.
    ///
    /// No-op if write access is already established.
    async fn ensure_write(&self) -> GuardResult<()>;

    /// Runs a query on the guarded session.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> GuardResult<Vec<SqlRow>>;

    /// Runs a statement on the guarded session.
    ///
    /// Mutating statements pass through the
    /// [`WriteEnforcementHook`](crate::enforce::WriteEnforcementHook) first.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> GuardResult<u64>;

    /// Closes the guard, committing or rolling back any open transaction and
    /// releasing the session.
    ///
    /// Idempotent; any other use after disposal fails with
    /// [`GuardError::Disposed`].
    async fn dispose(&self, outcome: DisposeOutcome) -> GuardResult<()>;
}

struct GuardState {
    session: Option<Box<dyn DataSession>>,
    writer: SecurityContextWriter,
}

impl GuardState {
    async fn session_mut(
        &mut self,
        factory: &Arc<dyn SessionFactory>,
    ) -> Result<&mut (dyn DataSession + 'static), SessionError> {
        if self.session.is_none() {
            self.session = Some(factory.acquire().await?);
        }
        Ok(&mut **self.session.as_mut().expect("session acquired above"))
    }
}

/// The row-security-backed guard used for stores that evaluate RLS policies.
///
/// Owns one lazily acquired session. Mode is stored atomically so that the
/// write-enforcement hook can read it without touching the session lock.
pub struct RequestGuard {
    identity: TenantIdentity,
    group_scoping: bool,
    mode: AtomicU8,
    disposed: AtomicBool,
    factory: Arc<dyn SessionFactory>,
    state: Mutex<GuardState>,
}

impl RequestGuard {
    /// Creates a guard for the given identity over the given session source.
    ///
    /// No session is acquired and no transaction is opened until the first
    /// `ensure_read`/`ensure_write`.
    pub fn new(
        identity: TenantIdentity,
        config: GuardConfig,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        Self {
            identity,
            group_scoping: config.group_scoping,
            mode: AtomicU8::new(GuardMode::Unset as u8),
            disposed: AtomicBool::new(false),
            factory,
            state: Mutex::new(GuardState {
                session: None,
                writer: SecurityContextWriter::new(config),
            }),
        }
    }

    /// Returns `true` once the guard has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> GuardResult<()> {
        if self.is_disposed() {
            Err(GuardError::Disposed)
        } else {
            Ok(())
        }
    }

    fn check_identity(&self) -> GuardResult<()> {
        check_identity(&self.identity, self.group_scoping)
    }

    fn store_mode(&self, mode: GuardMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }
}

fn check_identity(identity: &TenantIdentity, group_scoping: bool) -> GuardResult<()> {
    if identity.is_anonymous() {
        return Err(GuardError::MissingTenant);
    }
    if group_scoping && identity.group().is_none_or(|group| group.is_empty()) {
        return Err(GuardError::MissingGroup {
            tenant: identity.tenant().clone(),
        });
    }
    Ok(())
}

#[async_trait]
impl IsolationGuard for RequestGuard {
    fn mode(&self) -> GuardMode {
        GuardMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    fn identity(&self) -> &TenantIdentity {
        &self.identity
    }

    async fn ensure_read(&self) -> GuardResult<()> {
        self.check_open()?;
        if self.mode().is_entered() {
            return Ok(());
        }
        self.check_identity()?;

        let mut state = self.state.lock().await;
        if self.mode().is_entered() {
            return Ok(());
        }

        let session = state.session_mut(&self.factory).await?;
        session.begin().await?;

        let GuardState { session, writer } = &mut *state;
        let session = &mut **session.as_mut().expect("session opened above");
        writer.apply(session, &self.identity, AccessMode::Read).await?;

        self.store_mode(GuardMode::Read);
        tracing::debug!(tenant = %self.identity.tenant(), "guard entered read mode");
        Ok(())
    }

    async fn ensure_write(&self) -> GuardResult<()> {
        self.check_open()?;
        if self.mode() == GuardMode::Write {
            return Ok(());
        }
        self.check_identity()?;

        let mut state = self.state.lock().await;
        match self.mode() {
            GuardMode::Write => Ok(()),
            GuardMode::Unset => {
                let session = state.session_mut(&self.factory).await?;
                session.begin().await?;

                let GuardState { session, writer } = &mut *state;
                let session = &mut **session.as_mut().expect("session opened above");
                writer
                    .apply(session, &self.identity, AccessMode::Write)
                    .await?;

                self.store_mode(GuardMode::Write);
                tracing::debug!(tenant = %self.identity.tenant(), "guard entered write mode");
                Ok(())
            }
            GuardMode::Read => {
                // Promote the open transaction in place; the already-read
                // state must stay visible after the transition.
                let GuardState { session, writer } = &mut *state;
                let session = &mut **session
                    .as_mut()
                    .ok_or(SessionError::Closed)?;
                writer
                    .apply(session, &self.identity, AccessMode::Write)
                    .await?;

                self.store_mode(GuardMode::Write);
                tracing::debug!(tenant = %self.identity.tenant(), "guard promoted to write mode");
                Ok(())
            }
        }
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> GuardResult<Vec<SqlRow>> {
        self.check_open()?;
        if !self.mode().is_entered() {
            return Err(SessionError::NoTransaction.into());
        }

        let mut state = self.state.lock().await;
        let session = state.session.as_mut().ok_or(SessionError::Closed)?;
        Ok(session.query(sql, params).await?)
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> GuardResult<u64> {
        self.check_open()?;
        if !self.mode().is_entered() {
            return Err(SessionError::NoTransaction.into());
        }
        if StatementKind::classify(sql).is_mutating() {
            WriteEnforcementHook::authorize(sql)?;
        }

        let mut state = self.state.lock().await;
        let session = state.session.as_mut().ok_or(SessionError::Closed)?;
        Ok(session.execute(sql, params).await?)
    }

    async fn dispose(&self, outcome: DisposeOutcome) -> GuardResult<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        state.writer.reset();
        if let Some(mut session) = state.session.take() {
            if session.in_transaction() {
                match outcome {
                    DisposeOutcome::Commit => session.commit().await?,
                    DisposeOutcome::Rollback => session.rollback().await?,
                }
            }
        }
        Ok(())
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        // Disposal is async and cannot run here. The pooled connection's
        // recycle path rolls back any transaction we leave behind.
        if !self.is_disposed() && self.mode().is_entered() {
            tracing::warn!(
                tenant = %self.identity.tenant(),
                "request guard dropped without disposal"
            );
        }
    }
}

impl fmt::Debug for RequestGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestGuard")
            .field("identity", &self.identity)
            .field("mode", &self.mode())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Guard for stores without row-security support (the sqlite backend,
/// embedded test databases).
///
/// Runs the same mode machine and the same fail-fast identity checks, so
/// write gating and missing-tenant behavior stay uniform across backends,
/// but skips the security-context writes the store could not evaluate.
pub struct PassthroughGuard {
    identity: TenantIdentity,
    group_scoping: bool,
    mode: AtomicU8,
    disposed: AtomicBool,
    factory: Arc<dyn SessionFactory>,
    state: Mutex<Option<Box<dyn DataSession>>>,
}

impl PassthroughGuard {
    /// Creates a passthrough guard for the given identity.
    pub fn new(
        identity: TenantIdentity,
        config: GuardConfig,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        Self {
            identity,
            group_scoping: config.group_scoping,
            mode: AtomicU8::new(GuardMode::Unset as u8),
            disposed: AtomicBool::new(false),
            factory,
            state: Mutex::new(None),
        }
    }

    /// Returns `true` once the guard has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> GuardResult<()> {
        if self.is_disposed() {
            Err(GuardError::Disposed)
        } else {
            Ok(())
        }
    }

    fn store_mode(&self, mode: GuardMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }

    async fn enter(&self, mode: GuardMode) -> GuardResult<()> {
        self.check_open()?;
        check_identity(&self.identity, self.group_scoping)?;

        let mut state = self.state.lock().await;
        if state.is_none() {
            let mut session = self.factory.acquire().await?;
            session.begin().await?;
            *state = Some(session);
        }
        self.store_mode(mode);
        Ok(())
    }
}

#[async_trait]
impl IsolationGuard for PassthroughGuard {
    fn mode(&self) -> GuardMode {
        GuardMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    fn identity(&self) -> &TenantIdentity {
        &self.identity
    }

    async fn ensure_read(&self) -> GuardResult<()> {
        if self.mode().is_entered() {
            return self.check_open();
        }
        self.enter(GuardMode::Read).await
    }

    async fn ensure_write(&self) -> GuardResult<()> {
        if self.mode() == GuardMode::Write {
            return self.check_open();
        }
        self.enter(GuardMode::Write).await
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> GuardResult<Vec<SqlRow>> {
        self.check_open()?;
        if !self.mode().is_entered() {
            return Err(SessionError::NoTransaction.into());
        }

        let mut state = self.state.lock().await;
        let session = state.as_mut().ok_or(SessionError::Closed)?;
        Ok(session.query(sql, params).await?)
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> GuardResult<u64> {
        self.check_open()?;
        if !self.mode().is_entered() {
            return Err(SessionError::NoTransaction.into());
        }
        if StatementKind::classify(sql).is_mutating() {
            WriteEnforcementHook::authorize(sql)?;
        }

        let mut state = self.state.lock().await;
        let session = state.as_mut().ok_or(SessionError::Closed)?;
        Ok(session.execute(sql, params).await?)
    }

    async fn dispose(&self, outcome: DisposeOutcome) -> GuardResult<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        if let Some(mut session) = state.take() {
            if session.in_transaction() {
                match outcome {
                    DisposeOutcome::Commit => session.commit().await?,
                    DisposeOutcome::Rollback => session.rollback().await?,
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PassthroughGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassthroughGuard")
            .field("identity", &self.identity)
            .field("mode", &self.mode())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
