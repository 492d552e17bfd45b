//! Shared test doubles for the unit tests in this crate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{GuardResult, SessionError};
use crate::guard::{DisposeOutcome, GuardMode, IsolationGuard};
use crate::identity::{TenantId, TenantIdentity};
use crate::session::{DataSession, SessionFactory, SqlRow, SqlValue};

/// One observable interaction with a [`MockSession`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SessionEvent {
    Begin,
    Execute(String, Vec<SqlValue>),
    Query(String),
    Commit,
    Rollback,
}

pub(crate) type SessionLog = Arc<Mutex<Vec<SessionEvent>>>;

pub(crate) fn session_log() -> SessionLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// A session that records every interaction into a shared log.
pub(crate) struct MockSession {
    log: SessionLog,
    in_txn: bool,
}

impl MockSession {
    pub(crate) fn new(log: SessionLog) -> Self {
        Self { log, in_txn: false }
    }
}

#[async_trait]
impl DataSession for MockSession {
    async fn begin(&mut self) -> Result<(), SessionError> {
        if self.in_txn {
            return Err(SessionError::AlreadyInTransaction);
        }
        self.log.lock().push(SessionEvent::Begin);
        self.in_txn = true;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, SessionError> {
        if !self.in_txn {
            return Err(SessionError::NoTransaction);
        }
        self.log
            .lock()
            .push(SessionEvent::Execute(sql.to_string(), params.to_vec()));
        Ok(1)
    }

    async fn query(
        &mut self,
        sql: &str,
        _params: &[SqlValue],
    ) -> Result<Vec<SqlRow>, SessionError> {
        if !self.in_txn {
            return Err(SessionError::NoTransaction);
        }
        self.log.lock().push(SessionEvent::Query(sql.to_string()));
        Ok(Vec::new())
    }

    async fn commit(&mut self) -> Result<(), SessionError> {
        if !self.in_txn {
            return Err(SessionError::NoTransaction);
        }
        self.log.lock().push(SessionEvent::Commit);
        self.in_txn = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SessionError> {
        if !self.in_txn {
            return Err(SessionError::NoTransaction);
        }
        self.log.lock().push(SessionEvent::Rollback);
        self.in_txn = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_txn
    }

    fn supports_row_security(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

/// A factory handing out [`MockSession`]s over one shared log.
pub(crate) struct MockFactory {
    log: SessionLog,
    acquired: AtomicUsize,
}

impl MockFactory {
    pub(crate) fn new(log: SessionLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            acquired: AtomicUsize::new(0),
        })
    }

    /// Number of sessions handed out so far.
    pub(crate) fn acquired(&self) -> usize {
        self.acquired.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SessionFactory for MockFactory {
    async fn acquire(&self) -> Result<Box<dyn DataSession>, SessionError> {
        self.acquired.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MockSession::new(self.log.clone())))
    }

    fn supports_row_security(&self) -> bool {
        true
    }
}

/// A guard stub with a settable mode, for registry and hook tests.
pub(crate) struct StubGuard {
    identity: TenantIdentity,
    mode: AtomicU8,
}

impl StubGuard {
    pub(crate) fn new(tenant: &str) -> Self {
        Self {
            identity: TenantIdentity::new(TenantId::new(tenant)),
            mode: AtomicU8::new(GuardMode::Unset as u8),
        }
    }

    pub(crate) fn arc(tenant: &str) -> Arc<dyn IsolationGuard> {
        Arc::new(Self::new(tenant))
    }

    pub(crate) fn set_mode(&self, mode: GuardMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }
}

#[async_trait]
impl IsolationGuard for StubGuard {
    fn mode(&self) -> GuardMode {
        match self.mode.load(Ordering::Acquire) {
            1 => GuardMode::Read,
            2 => GuardMode::Write,
            _ => GuardMode::Unset,
        }
    }

    fn identity(&self) -> &TenantIdentity {
        &self.identity
    }

    async fn ensure_read(&self) -> GuardResult<()> {
        self.set_mode(GuardMode::Read);
        Ok(())
    }

    async fn ensure_write(&self) -> GuardResult<()> {
        self.set_mode(GuardMode::Write);
        Ok(())
    }

    async fn query(&self, _sql: &str, _params: &[SqlValue]) -> GuardResult<Vec<SqlRow>> {
        Ok(Vec::new())
    }

    async fn execute(&self, _sql: &str, _params: &[SqlValue]) -> GuardResult<u64> {
        Ok(0)
    }

    async fn dispose(&self, _outcome: DisposeOutcome) -> GuardResult<()> {
        Ok(())
    }
}
