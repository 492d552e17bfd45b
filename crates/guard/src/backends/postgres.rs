//! PostgreSQL session backend.
//!
//! Wraps a deadpool-postgres pool. Transactions are driven with explicit
//! `BEGIN`/`COMMIT`/`ROLLBACK` so the guard controls their extent; the
//! security context written inside them is transaction-local and reverts
//! before the connection returns to the pool.

use async_trait::async_trait;
use deadpool_postgres::{Client, Pool};
use tokio_postgres::Row;
use tokio_postgres::types::{ToSql, Type};

use crate::error::SessionError;
use crate::session::{DataSession, SessionFactory, SqlRow, SqlValue};

const BACKEND: &str = "postgres";

fn backend_error(error: impl std::fmt::Display) -> SessionError {
    SessionError::backend(BACKEND, error.to_string())
}

/// Hands out [`PostgresSession`]s from a shared pool.
pub struct PostgresSessionFactory {
    pool: Pool,
}

impl PostgresSessionFactory {
    /// Creates a factory over an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionFactory for PostgresSessionFactory {
    async fn acquire(&self) -> Result<Box<dyn DataSession>, SessionError> {
        let client = self.pool.get().await.map_err(|e| SessionError::Pool {
            message: e.to_string(),
        })?;
        Ok(Box::new(PostgresSession {
            client,
            in_txn: false,
        }))
    }

    fn supports_row_security(&self) -> bool {
        true
    }
}

/// One pooled PostgreSQL connection with an optional open transaction.
pub struct PostgresSession {
    client: Client,
    in_txn: bool,
}

#[async_trait]
impl DataSession for PostgresSession {
    async fn begin(&mut self) -> Result<(), SessionError> {
        if self.in_txn {
            return Err(SessionError::AlreadyInTransaction);
        }
        self.client
            .batch_execute("BEGIN")
            .await
            .map_err(backend_error)?;
        self.in_txn = true;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, SessionError> {
        if !self.in_txn {
            return Err(SessionError::NoTransaction);
        }
        let owned = bind_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> =
            owned.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();
        self.client
            .execute(sql, &refs)
            .await
            .map_err(backend_error)
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqlRow>, SessionError> {
        if !self.in_txn {
            return Err(SessionError::NoTransaction);
        }
        let owned = bind_params(params);
        let refs: Vec<&(dyn ToSql + Sync)> =
            owned.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();
        let rows = self
            .client
            .query(sql, &refs)
            .await
            .map_err(backend_error)?;
        rows.iter().map(row_values).collect()
    }

    async fn commit(&mut self) -> Result<(), SessionError> {
        if !self.in_txn {
            return Err(SessionError::NoTransaction);
        }
        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(backend_error)?;
        self.in_txn = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SessionError> {
        if !self.in_txn {
            return Err(SessionError::NoTransaction);
        }
        self.client
            .batch_execute("ROLLBACK")
            .await
            .map_err(backend_error)?;
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
        BACKEND
    }
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        // PostgreSQL rolls the dangling transaction back when the pool
        // recycles the connection.
        if self.in_txn {
            tracing::warn!("postgres session dropped with an open transaction");
        }
    }
}

/// Converts portable parameters to owned `ToSql` values.
///
/// NULL binds as a text-typed null; statements binding NULL into non-text
/// columns should cast explicitly.
fn bind_params(params: &[SqlValue]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    params
        .iter()
        .map(|value| -> Box<dyn ToSql + Sync + Send> {
            match value {
                SqlValue::Null => Box::new(Option::<String>::None),
                SqlValue::Bool(b) => Box::new(*b),
                SqlValue::Int(i) => Box::new(*i),
                SqlValue::Real(r) => Box::new(*r),
                SqlValue::Text(s) => Box::new(s.clone()),
            }
        })
        .collect()
}

fn row_values(row: &Row) -> Result<SqlRow, SessionError> {
    let mut values = Vec::with_capacity(row.len());
    for index in 0..row.len() {
        values.push(column_value(row, index)?);
    }
    Ok(SqlRow::new(values))
}

fn column_value(row: &Row, index: usize) -> Result<SqlValue, SessionError> {
    let column_type = row.columns()[index].type_();
    let value = if *column_type == Type::BOOL {
        row.try_get::<_, Option<bool>>(index)
            .map_err(backend_error)?
            .map(SqlValue::Bool)
    } else if *column_type == Type::INT2 {
        row.try_get::<_, Option<i16>>(index)
            .map_err(backend_error)?
            .map(|v| SqlValue::Int(i64::from(v)))
    } else if *column_type == Type::INT4 {
        row.try_get::<_, Option<i32>>(index)
            .map_err(backend_error)?
            .map(|v| SqlValue::Int(i64::from(v)))
    } else if *column_type == Type::INT8 {
        row.try_get::<_, Option<i64>>(index)
            .map_err(backend_error)?
            .map(SqlValue::Int)
    } else if *column_type == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(index)
            .map_err(backend_error)?
            .map(|v| SqlValue::Real(f64::from(v)))
    } else if *column_type == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(index)
            .map_err(backend_error)?
            .map(SqlValue::Real)
    } else if *column_type == Type::TEXT
        || *column_type == Type::VARCHAR
        || *column_type == Type::BPCHAR
        || *column_type == Type::NAME
    {
        row.try_get::<_, Option<String>>(index)
            .map_err(backend_error)?
            .map(SqlValue::Text)
    } else {
        return Err(SessionError::backend(
            BACKEND,
            format!("unsupported column type: {column_type}"),
        ));
    };
    Ok(value.unwrap_or(SqlValue::Null))
}
