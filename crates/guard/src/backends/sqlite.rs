//! SQLite session backend.
//!
//! Embedded backend for development and tests. SQLite has no row-level
//! security, so `supports_row_security` is `false` and the request pipeline
//! pairs these sessions with
//! [`PassthroughGuard`](crate::guard::PassthroughGuard): write gating still
//! applies, the security-context settings do not.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params_from_iter;
use rusqlite::types::{Value, ValueRef};

use crate::error::SessionError;
use crate::session::{DataSession, SessionFactory, SqlRow, SqlValue};

const BACKEND: &str = "sqlite";

fn backend_error(error: impl std::fmt::Display) -> SessionError {
    SessionError::backend(BACKEND, error.to_string())
}

/// Hands out [`SqliteSession`]s from an r2d2 pool.
pub struct SqliteSessionFactory {
    pool: r2d2::Pool<SqliteConnectionManager>,
}

impl SqliteSessionFactory {
    /// Creates a factory over a database file, creating it if missing.
    pub fn file(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let manager = SqliteConnectionManager::file(path.as_ref())
            .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
        let pool = r2d2::Pool::builder()
            .build(manager)
            .map_err(|e| SessionError::Pool {
                message: e.to_string(),
            })?;
        Ok(Self { pool })
    }

    /// Creates a factory over a single shared in-memory database.
    ///
    /// The pool is capped at one connection; every in-memory connection is
    /// its own database, so sessions must share the one that holds the data.
    pub fn memory() -> Result<Self, SessionError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
        let pool = r2d2::Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| SessionError::Pool {
                message: e.to_string(),
            })?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SessionFactory for SqliteSessionFactory {
    async fn acquire(&self) -> Result<Box<dyn DataSession>, SessionError> {
        let conn = self.pool.get().map_err(|e| SessionError::Pool {
            message: e.to_string(),
        })?;
        Ok(Box::new(SqliteSession {
            conn,
            in_txn: false,
        }))
    }

    fn supports_row_security(&self) -> bool {
        false
    }
}

/// One pooled SQLite connection with an optional open transaction.
pub struct SqliteSession {
    conn: PooledConnection<SqliteConnectionManager>,
    in_txn: bool,
}

#[async_trait]
impl DataSession for SqliteSession {
    async fn begin(&mut self) -> Result<(), SessionError> {
        if self.in_txn {
            return Err(SessionError::AlreadyInTransaction);
        }
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(backend_error)?;
        self.in_txn = true;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, SessionError> {
        if !self.in_txn {
            return Err(SessionError::NoTransaction);
        }
        let changed = self
            .conn
            .execute(sql, params_from_iter(native_params(params)))
            .map_err(backend_error)?;
        Ok(changed as u64)
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqlRow>, SessionError> {
        if !self.in_txn {
            return Err(SessionError::NoTransaction);
        }
        let mut stmt = self.conn.prepare(sql).map_err(backend_error)?;
        let column_count = stmt.column_count();
        let mut rows = stmt
            .query(params_from_iter(native_params(params)))
            .map_err(backend_error)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(backend_error)? {
            let mut values = Vec::with_capacity(column_count);
            for index in 0..column_count {
                let value = match row.get_ref(index).map_err(backend_error)? {
                    ValueRef::Null => SqlValue::Null,
                    ValueRef::Integer(i) => SqlValue::Int(i),
                    ValueRef::Real(r) => SqlValue::Real(r),
                    ValueRef::Text(t) => {
                        SqlValue::Text(String::from_utf8_lossy(t).into_owned())
                    }
                    ValueRef::Blob(_) => {
                        return Err(SessionError::backend(
                            BACKEND,
                            "blob columns are not supported",
                        ));
                    }
                };
                values.push(value);
            }
            out.push(SqlRow::new(values));
        }
        Ok(out)
    }

    async fn commit(&mut self) -> Result<(), SessionError> {
        if !self.in_txn {
            return Err(SessionError::NoTransaction);
        }
        self.conn.execute_batch("COMMIT").map_err(backend_error)?;
        self.in_txn = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SessionError> {
        if !self.in_txn {
            return Err(SessionError::NoTransaction);
        }
        self.conn.execute_batch("ROLLBACK").map_err(backend_error)?;
        self.in_txn = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_txn
    }

    fn supports_row_security(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        // SQLite rolls the transaction back when the connection is reused.
        if self.in_txn {
            tracing::warn!("sqlite session dropped with an open transaction");
        }
    }
}

fn native_params(params: &[SqlValue]) -> Vec<Value> {
    params
        .iter()
        .map(|value| match value {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
            SqlValue::Int(i) => Value::Integer(*i),
            SqlValue::Real(r) => Value::Real(*r),
            SqlValue::Text(s) => Value::Text(s.clone()),
        })
        .collect()
}
