//! An emulated row-security backend for integration tests.
//!
//! Implements just enough of the PostgreSQL behavior the guard relies on to
//! exercise the isolation properties hermetically: transaction-local
//! settings written via `set_config(..., true)`, row visibility filtered by
//! the tenant setting, and a database-side write gate keyed on the access
//! mode setting. All sessions share one "physical connection" so that
//! context leakage across pooled reuse would be observable.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use meridian_guard::error::SessionError;
use meridian_guard::session::{DataSession, SessionFactory, SqlRow, SqlValue};

const TENANT_SETTING: &str = "app.tenant_id";
const MODE_SETTING: &str = "app.access_mode";

/// One record row, committed or staged.
#[derive(Debug, Clone)]
pub struct RecordRow {
    pub tenant: String,
    pub id: String,
    pub body: String,
}

/// Shared database state.
#[derive(Default)]
pub struct EmulatedDb {
    pub rows: Vec<RecordRow>,
    /// Number of security-context settings written, for idempotence checks.
    pub context_writes: usize,
}

pub type DbHandle = Arc<Mutex<EmulatedDb>>;

struct OpenTransaction {
    settings: HashMap<String, String>,
    staged: Vec<RecordRow>,
}

/// A session over the shared emulated database.
pub struct EmulatedSession {
    db: DbHandle,
    conn_settings: Arc<Mutex<HashMap<String, String>>>,
    txn: Option<OpenTransaction>,
}

impl EmulatedSession {
    fn txn(&mut self) -> Result<&mut OpenTransaction, SessionError> {
        self.txn.as_mut().ok_or(SessionError::NoTransaction)
    }

    fn effective_setting(&self, name: &str) -> Option<String> {
        if let Some(txn) = &self.txn {
            if let Some(value) = txn.settings.get(name) {
                return Some(value.clone());
            }
        }
        self.conn_settings.lock().get(name).cloned()
    }

    fn visible_rows(&self) -> Vec<RecordRow> {
        let Some(tenant) = self.effective_setting(TENANT_SETTING) else {
            // No tenant context set: row security shows nothing.
            return Vec::new();
        };
        let mut rows: Vec<RecordRow> = self
            .db
            .lock()
            .rows
            .iter()
            .filter(|row| row.tenant == tenant)
            .cloned()
            .collect();
        if let Some(txn) = &self.txn {
            rows.extend(txn.staged.iter().filter(|row| row.tenant == tenant).cloned());
        }
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        rows
    }

    fn text_param(params: &[SqlValue], index: usize) -> Result<String, SessionError> {
        params
            .get(index)
            .and_then(SqlValue::as_text)
            .map(str::to_string)
            .ok_or_else(|| SessionError::backend("emulated", "expected text parameter"))
    }
}

#[async_trait]
impl DataSession for EmulatedSession {
    async fn begin(&mut self) -> Result<(), SessionError> {
        if self.txn.is_some() {
            return Err(SessionError::AlreadyInTransaction);
        }
        self.txn = Some(OpenTransaction {
            settings: HashMap::new(),
            staged: Vec::new(),
        });
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, SessionError> {
        if sql.starts_with("SELECT set_config") {
            let name = Self::text_param(params, 0)?;
            let value = Self::text_param(params, 1)?;
            let transaction_local = sql.contains("true");
            if transaction_local {
                self.txn()?.settings.insert(name, value);
            } else {
                self.conn_settings.lock().insert(name, value);
            }
            self.db.lock().context_writes += 1;
            return Ok(1);
        }

        if sql.starts_with("INSERT INTO records") {
            let tenant = self
                .effective_setting(TENANT_SETTING)
                .ok_or_else(|| SessionError::backend("emulated", "row security violation: no tenant context"))?;
            if self.effective_setting(MODE_SETTING).as_deref() != Some("write") {
                return Err(SessionError::backend(
                    "emulated",
                    "row security violation: transaction is not in write mode",
                ));
            }
            let id = Self::text_param(params, 0)?;
            let body = Self::text_param(params, 1)?;
            self.txn()?.staged.push(RecordRow { tenant, id, body });
            return Ok(1);
        }

        Err(SessionError::backend(
            "emulated",
            format!("unsupported statement: {sql}"),
        ))
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqlRow>, SessionError> {
        self.txn()?;

        if sql.starts_with("SELECT current_setting") {
            let name = Self::text_param(params, 0)?;
            let value = match self.effective_setting(&name) {
                Some(value) => SqlValue::Text(value),
                None => SqlValue::Null,
            };
            return Ok(vec![SqlRow::new(vec![value])]);
        }

        if sql.starts_with("SELECT count(*) FROM records") {
            let count = self.visible_rows().len() as i64;
            return Ok(vec![SqlRow::new(vec![SqlValue::Int(count)])]);
        }

        if sql.starts_with("SELECT id, body FROM records") {
            return Ok(self
                .visible_rows()
                .into_iter()
                .map(|row| {
                    SqlRow::new(vec![SqlValue::Text(row.id), SqlValue::Text(row.body)])
                })
                .collect());
        }

        Err(SessionError::backend(
            "emulated",
            format!("unsupported query: {sql}"),
        ))
    }

    async fn commit(&mut self) -> Result<(), SessionError> {
        let txn = self.txn.take().ok_or(SessionError::NoTransaction)?;
        self.db.lock().rows.extend(txn.staged);
        // Transaction-local settings die with the transaction.
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SessionError> {
        self.txn.take().ok_or(SessionError::NoTransaction)?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    fn supports_row_security(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "emulated"
    }
}

/// Factory handing out sessions over one shared database and one shared
/// physical connection.
pub struct EmulatedFactory {
    db: DbHandle,
    conn_settings: Arc<Mutex<HashMap<String, String>>>,
    acquired: AtomicUsize,
}

impl EmulatedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            db: Arc::new(Mutex::new(EmulatedDb::default())),
            conn_settings: Arc::new(Mutex::new(HashMap::new())),
            acquired: AtomicUsize::new(0),
        })
    }

    /// Inserts a committed row directly, bypassing the guard.
    pub fn seed(&self, tenant: &str, id: &str, body: &str) {
        self.db.lock().rows.push(RecordRow {
            tenant: tenant.to_string(),
            id: id.to_string(),
            body: body.to_string(),
        });
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::Acquire)
    }

    pub fn committed_count(&self, tenant: &str) -> usize {
        self.db
            .lock()
            .rows
            .iter()
            .filter(|row| row.tenant == tenant)
            .count()
    }

    pub fn context_writes(&self) -> usize {
        self.db.lock().context_writes
    }
}

#[async_trait]
impl SessionFactory for EmulatedFactory {
    async fn acquire(&self) -> Result<Box<dyn DataSession>, SessionError> {
        self.acquired.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(EmulatedSession {
            db: self.db.clone(),
            conn_settings: self.conn_settings.clone(),
            txn: None,
        }))
    }

    fn supports_row_security(&self) -> bool {
        true
    }
}
