//! The ambient guard registry.
//!
//! Deeply nested service code needs "the guard for the current request"
//! without threading it through every signature. The registry keeps one slot
//! per logical task, installed for the duration of a [`scope`] call: the
//! slot follows the request future across `.await` points, is invisible to
//! concurrently running requests, and is restored (to the previous value or
//! to absence) on every exit path, including panics and cancellation.
//!
//! There is deliberately no way to install a guard without a scope and no
//! fallback guard: [`current`] outside a scope is a programming error and
//! fails with [`GuardError::NoActiveGuard`].

use std::future::Future;
use std::sync::Arc;

use crate::error::{GuardError, GuardResult};
use crate::guard::IsolationGuard;

tokio::task_local! {
    static ACTIVE_GUARD: Arc<dyn IsolationGuard>;
}

/// Runs `fut` with `guard` installed as the ambient guard.
///
/// Nested scopes shadow the outer guard for their duration; the outer guard
/// becomes visible again when the inner scope ends.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use meridian_guard::{guard::IsolationGuard, registry};
/// # async fn demo(guard: Arc<dyn IsolationGuard>) {
/// registry::scope(guard, async {
///     let guard = registry::current().expect("installed above");
///     guard.ensure_read().await.unwrap();
/// })
/// .await;
/// # }
/// ```
pub async fn scope<F>(guard: Arc<dyn IsolationGuard>, fut: F) -> F::Output
where
    F: Future,
{
    ACTIVE_GUARD.scope(guard, fut).await
}

/// Returns the guard installed for the current task.
///
/// Fails with [`GuardError::NoActiveGuard`] outside any [`scope`]. This is
/// loud on purpose; defaulting to an unscoped session here would defeat the
/// entire isolation design.
pub fn current() -> GuardResult<Arc<dyn IsolationGuard>> {
    ACTIVE_GUARD
        .try_with(Arc::clone)
        .map_err(|_| GuardError::NoActiveGuard)
}

/// Returns the guard installed for the current task, if any.
///
/// For diagnostics only; data-access paths must use [`current`] so that a
/// missing guard fails the operation.
pub fn try_current() -> Option<Arc<dyn IsolationGuard>> {
    ACTIVE_GUARD.try_with(Arc::clone).ok()
}

/// Returns `true` if a guard is installed for the current task.
pub fn is_installed() -> bool {
    ACTIVE_GUARD.try_with(|_| ()).is_ok()
}
