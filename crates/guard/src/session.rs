//! The data-access session abstraction owned by the guard.
//!
//! The guard stays backend-generic: it needs exactly "open a transaction",
//! "run a parameterized statement", "commit", and "roll back" from the
//! underlying store. [`DataSession`] captures that surface over a small
//! portable value model ([`SqlValue`]/[`SqlRow`]), and [`SessionFactory`]
//! hands out one session per request.
//!
//! [`StatementKind`] classifies outgoing statements so the write-enforcement
//! hook can gate mutating ones; unrecognized statements classify as mutating
//! (fail closed).

use std::fmt;

use async_trait::async_trait;

use crate::error::SessionError;

/// A portable SQL parameter or column value.
///
/// This covers the types the guard and the record stores built on it
/// actually bind; backends convert to and from their native types.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit integer value.
    Int(i64),
    /// Double-precision float value.
    Real(f64),
    /// Text value.
    Text(String),
}

impl SqlValue {
    /// Returns the text content, if this value is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, if this value is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns `true` if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Int(i) => write!(f, "{}", i),
            SqlValue::Real(r) => write!(f, "{}", r),
            SqlValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

/// One result row, positional.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow(Vec<SqlValue>);

impl SqlRow {
    /// Creates a row from its column values.
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self(values)
    }

    /// Returns the value at the given column index.
    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.0.get(index)
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the column values.
    pub fn values(&self) -> &[SqlValue] {
        &self.0
    }
}

/// Classification of an outgoing SQL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// A statement that only reads rows.
    Read,
    /// A statement that creates, changes, or removes rows or schema.
    Mutating,
    /// A session- or transaction-control statement.
    Control,
}

impl StatementKind {
    /// Classifies a SQL statement by its leading keyword.
    ///
    /// `WITH` prefixes are scanned for a mutating verb so writable CTEs are
    /// not misclassified as reads. Anything unrecognized classifies as
    /// [`Mutating`](Self::Mutating): an unknown statement must pass the
    /// write gate, not slip under it.
    pub fn classify(sql: &str) -> Self {
        let first = sql
            .trim_start()
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();

        match first.as_str() {
            "SELECT" | "VALUES" | "SHOW" | "EXPLAIN" => StatementKind::Read,
            "INSERT" | "UPDATE" | "DELETE" | "MERGE" | "REPLACE" | "TRUNCATE" | "CREATE"
            | "ALTER" | "DROP" | "COPY" => StatementKind::Mutating,
            "SET" | "RESET" | "BEGIN" | "COMMIT" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
                StatementKind::Control
            }
            "WITH" => {
                let upper = sql.to_ascii_uppercase();
                let mutating = ["INSERT", "UPDATE", "DELETE", "MERGE"]
                    .iter()
                    .any(|verb| contains_word(&upper, verb));
                if mutating {
                    StatementKind::Mutating
                } else {
                    StatementKind::Read
                }
            }
            _ => StatementKind::Mutating,
        }
    }

    /// Returns `true` if this statement must pass the write gate.
    pub fn is_mutating(&self) -> bool {
        matches!(self, StatementKind::Mutating)
    }
}

/// Checks for a whole-word occurrence of `word` in (uppercased) `haystack`.
fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .any(|token| token == word)
}

/// One exclusively owned database session.
///
/// A session wraps a single pooled connection for the duration of one
/// request. The guard is responsible for opening at most one transaction on
/// it, running statements inside that transaction, and closing it on
/// disposal. Implementations must not share the underlying connection with
/// any other live session.
#[async_trait]
pub trait DataSession: Send {
    /// Opens a transaction on this session.
    ///
    /// Fails with [`SessionError::AlreadyInTransaction`] if one is open.
    async fn begin(&mut self) -> Result<(), SessionError>;

    /// Runs a parameterized statement, returning the affected row count.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, SessionError>;

    /// Runs a parameterized query, returning its rows.
    async fn query(&mut self, sql: &str, params: &[SqlValue])
    -> Result<Vec<SqlRow>, SessionError>;

    /// Commits the open transaction.
    async fn commit(&mut self) -> Result<(), SessionError>;

    /// Rolls back the open transaction.
    async fn rollback(&mut self) -> Result<(), SessionError>;

    /// Returns `true` while a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Returns `true` if the backend evaluates row-security policies.
    ///
    /// Backends without row security are paired with
    /// [`PassthroughGuard`](crate::guard::PassthroughGuard).
    fn supports_row_security(&self) -> bool;

    /// Returns the backend name, for diagnostics.
    fn backend_name(&self) -> &'static str;
}

/// Hands out one [`DataSession`] per request.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Acquires a session from the underlying pool.
    async fn acquire(&self) -> Result<Box<dyn DataSession>, SessionError>;

    /// Returns `true` if sessions from this factory evaluate row-security
    /// policies.
    fn supports_row_security(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_reads() {
        assert_eq!(
            StatementKind::classify("SELECT * FROM records"),
            StatementKind::Read
        );
        assert_eq!(
            StatementKind::classify("  select count(*) from records"),
            StatementKind::Read
        );
        assert_eq!(
            StatementKind::classify("EXPLAIN SELECT 1"),
            StatementKind::Read
        );
    }

    #[test]
    fn test_classify_mutating() {
        assert_eq!(
            StatementKind::classify("INSERT INTO records (id) VALUES ($1)"),
            StatementKind::Mutating
        );
        assert_eq!(
            StatementKind::classify("update records set body = $1"),
            StatementKind::Mutating
        );
        assert_eq!(
            StatementKind::classify("DELETE FROM records"),
            StatementKind::Mutating
        );
        assert_eq!(
            StatementKind::classify("TRUNCATE records"),
            StatementKind::Mutating
        );
    }

    #[test]
    fn test_classify_control() {
        assert_eq!(StatementKind::classify("BEGIN"), StatementKind::Control);
        assert_eq!(
            StatementKind::classify("SET LOCAL app.tenant_id = 'acme'"),
            StatementKind::Control
        );
        assert_eq!(StatementKind::classify("COMMIT"), StatementKind::Control);
    }

    #[test]
    fn test_classify_cte() {
        assert_eq!(
            StatementKind::classify("WITH latest AS (SELECT 1) SELECT * FROM latest"),
            StatementKind::Read
        );
        assert_eq!(
            StatementKind::classify(
                "WITH moved AS (DELETE FROM records RETURNING *) SELECT count(*) FROM moved"
            ),
            StatementKind::Mutating
        );
    }

    #[test]
    fn test_classify_unknown_fails_closed() {
        assert_eq!(StatementKind::classify("VACUUM"), StatementKind::Mutating);
        assert_eq!(StatementKind::classify(""), StatementKind::Mutating);
    }

    #[test]
    fn test_sql_value_accessors() {
        assert_eq!(SqlValue::from("acme").as_text(), Some("acme"));
        assert_eq!(SqlValue::from(7i64).as_int(), Some(7));
        assert!(SqlValue::Null.is_null());
        assert_eq!(SqlValue::from(7i64).as_text(), None);
    }

    #[test]
    fn test_sql_row() {
        let row = SqlRow::new(vec![SqlValue::from(1i64), SqlValue::from("acme")]);
        assert_eq!(row.len(), 2);
        assert_eq!(row.get(1).and_then(SqlValue::as_text), Some("acme"));
        assert!(row.get(2).is_none());
    }
}
