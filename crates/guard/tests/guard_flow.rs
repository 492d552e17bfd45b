//! End-to-end isolation properties of the request guard, exercised against
//! an emulated row-security backend.

mod common;

use std::sync::Arc;

use common::EmulatedFactory;
use meridian_guard::config::GuardConfig;
use meridian_guard::error::GuardError;
use meridian_guard::guard::{DisposeOutcome, IsolationGuard, RequestGuard};
use meridian_guard::identity::{TenantId, TenantIdentity};
use meridian_guard::registry;
use meridian_guard::session::{DataSession, SessionFactory, SqlValue};

fn guard_for(factory: &Arc<EmulatedFactory>, tenant: &str) -> Arc<RequestGuard> {
    Arc::new(RequestGuard::new(
        TenantIdentity::new(TenantId::new(tenant)),
        GuardConfig::default(),
        factory.clone(),
    ))
}

async fn read_ids(guard: &Arc<RequestGuard>) -> Vec<String> {
    guard.ensure_read().await.unwrap();
    guard
        .query("SELECT id, body FROM records ORDER BY id", &[])
        .await
        .unwrap()
        .iter()
        .map(|row| row.get(0).and_then(SqlValue::as_text).unwrap().to_string())
        .collect()
}

async fn insert(guard: &Arc<RequestGuard>, id: &str, body: &str) -> Result<u64, GuardError> {
    guard
        .execute(
            "INSERT INTO records (id, body) VALUES ($1, $2)",
            &[SqlValue::from(id), SqlValue::from(body)],
        )
        .await
}

/// Reads under tenant A never return tenant B's rows, and vice versa.
#[tokio::test]
async fn isolation_reads_are_disjoint() {
    let factory = EmulatedFactory::new();
    factory.seed("tenant-a", "a1", "alpha");
    factory.seed("tenant-a", "a2", "alpha");
    factory.seed("tenant-b", "b1", "beta");

    let guard_a = guard_for(&factory, "tenant-a");
    assert_eq!(read_ids(&guard_a).await, vec!["a1", "a2"]);
    guard_a.dispose(DisposeOutcome::Commit).await.unwrap();

    let guard_b = guard_for(&factory, "tenant-b");
    assert_eq!(read_ids(&guard_b).await, vec!["b1"]);
    guard_b.dispose(DisposeOutcome::Commit).await.unwrap();
}

/// Read, promote, write, read back: the same scope observes its own write.
#[tokio::test]
async fn promotion_preserves_read_your_writes() {
    let factory = EmulatedFactory::new();
    let guard = guard_for(&factory, "tenant-a");
    let ambient: Arc<dyn IsolationGuard> = guard.clone();

    registry::scope(ambient, async {
        guard.ensure_read().await.unwrap();
        let before = guard
            .query("SELECT count(*) FROM records", &[])
            .await
            .unwrap();
        assert_eq!(before[0].get(0).and_then(SqlValue::as_int), Some(0));

        guard.ensure_write().await.unwrap();
        insert(&guard, "a1", "created late").await.unwrap();

        let after = guard
            .query("SELECT count(*) FROM records", &[])
            .await
            .unwrap();
        assert_eq!(after[0].get(0).and_then(SqlValue::as_int), Some(1));
    })
    .await;

    // Nothing is durable until disposal commits.
    assert_eq!(factory.committed_count("tenant-a"), 0);
    guard.dispose(DisposeOutcome::Commit).await.unwrap();
    assert_eq!(factory.committed_count("tenant-a"), 1);
}

/// A write attempted before `ensure_write` is rejected and nothing reaches
/// the database.
#[tokio::test]
async fn write_without_promotion_is_rejected() {
    let factory = EmulatedFactory::new();
    let guard = guard_for(&factory, "tenant-a");
    let ambient: Arc<dyn IsolationGuard> = guard.clone();

    registry::scope(ambient, async {
        guard.ensure_read().await.unwrap();
        let result = insert(&guard, "a1", "sneaky").await;
        assert!(matches!(
            result,
            Err(GuardError::WriteNotAuthorized { .. })
        ));

        // Table unchanged within the same scope.
        let count = guard
            .query("SELECT count(*) FROM records", &[])
            .await
            .unwrap();
        assert_eq!(count[0].get(0).and_then(SqlValue::as_int), Some(0));
    })
    .await;

    guard.dispose(DisposeOutcome::Commit).await.unwrap();
    assert_eq!(factory.committed_count("tenant-a"), 0);
}

/// After tenant A's transaction commits, the reused connection carries no
/// session variables into the next transaction.
#[tokio::test]
async fn pooled_connection_does_not_leak_context() {
    let factory = EmulatedFactory::new();
    let guard_a = guard_for(&factory, "tenant-a");
    let ambient: Arc<dyn IsolationGuard> = guard_a.clone();

    registry::scope(ambient, async {
        guard_a.ensure_write().await.unwrap();
        insert(&guard_a, "a1", "alpha").await.unwrap();
    })
    .await;
    guard_a.dispose(DisposeOutcome::Commit).await.unwrap();

    // Probe the shared connection directly: the tenant setting is gone.
    let mut probe = factory.acquire().await.unwrap();
    probe.begin().await.unwrap();
    let settings = probe
        .query(
            "SELECT current_setting($1, true)",
            &[SqlValue::from("app.tenant_id")],
        )
        .await
        .unwrap();
    assert!(settings[0].get(0).unwrap().is_null());
    probe.rollback().await.unwrap();

    // And tenant B's fresh guard sees only its own (empty) partition.
    let guard_b = guard_for(&factory, "tenant-b");
    assert!(read_ids(&guard_b).await.is_empty());
    guard_b.dispose(DisposeOutcome::Commit).await.unwrap();
}

/// Repeated `ensure_read` neither reopens the transaction nor rewrites the
/// security context.
#[tokio::test]
async fn repeated_ensure_read_is_idempotent() {
    let factory = EmulatedFactory::new();
    let guard = guard_for(&factory, "tenant-a");

    guard.ensure_read().await.unwrap();
    let writes_after_first = factory.context_writes();
    guard.ensure_read().await.unwrap();
    guard.ensure_read().await.unwrap();

    assert_eq!(factory.context_writes(), writes_after_first);
    assert_eq!(factory.acquired(), 1);
    guard.dispose(DisposeOutcome::Commit).await.unwrap();
}

/// An unresolved tenant fails fast before any session work happens.
#[tokio::test]
async fn missing_tenant_fails_before_any_transaction() {
    let factory = EmulatedFactory::new();
    let guard = Arc::new(RequestGuard::new(
        TenantIdentity::anonymous(),
        GuardConfig::default(),
        factory.clone(),
    ));

    let result = guard.ensure_write().await;
    assert!(matches!(result, Err(GuardError::MissingTenant)));
    assert_eq!(factory.acquired(), 0);
}

/// The ambient registry refuses to answer outside a request scope.
#[tokio::test]
async fn current_outside_scope_fails_loudly() {
    let result = registry::current();
    assert!(matches!(result, Err(GuardError::NoActiveGuard)));
}

/// Disposal with a rollback outcome discards staged writes.
#[tokio::test]
async fn rollback_disposal_discards_writes() {
    let factory = EmulatedFactory::new();
    let guard = guard_for(&factory, "tenant-a");
    let ambient: Arc<dyn IsolationGuard> = guard.clone();

    registry::scope(ambient, async {
        guard.ensure_write().await.unwrap();
        insert(&guard, "a1", "doomed").await.unwrap();
    })
    .await;
    guard.dispose(DisposeOutcome::Rollback).await.unwrap();

    assert_eq!(factory.committed_count("tenant-a"), 0);
}

/// The emulated database's own write gate also holds if the hook were
/// bypassed: statements run outside write mode are rejected server-side.
#[tokio::test]
async fn database_write_gate_backstops_the_hook() {
    let factory = EmulatedFactory::new();

    let mut session = factory.acquire().await.unwrap();
    session.begin().await.unwrap();
    session
        .execute(
            "SELECT set_config($1, $2, true)",
            &[SqlValue::from("app.tenant_id"), SqlValue::from("tenant-a")],
        )
        .await
        .unwrap();
    // Access mode never set to write: the INSERT is rejected by the store.
    let result = session
        .execute(
            "INSERT INTO records (id, body) VALUES ($1, $2)",
            &[SqlValue::from("a1"), SqlValue::from("bypass")],
        )
        .await;
    assert!(result.is_err());
    session.rollback().await.unwrap();
    assert_eq!(factory.committed_count("tenant-a"), 0);
}
