//! The write-enforcement hook.
//!
//! Row-level security alone does not catch every unscoped write: an INSERT
//! can satisfy a policy vacuously. [`WriteEnforcementHook`] is the
//! code-level second check at the session boundary: before a mutating
//! statement reaches the database, the *ambient* guard must already be in
//! write mode, or the statement is rejected and nothing is sent.
//!
//! This is defense in depth. The database's row security remains the
//! authoritative boundary for reads and for writes against existing rows.

use crate::error::{GuardError, GuardResult};
use crate::registry;

/// Longest statement prefix carried in a rejection, for diagnostics.
const STATEMENT_PREVIEW_CHARS: usize = 120;

/// Gate consulted for every outgoing mutating statement.
pub struct WriteEnforcementHook;

impl WriteEnforcementHook {
    /// Authorizes a mutating statement against the ambient guard.
    ///
    /// Fails with [`GuardError::NoActiveGuard`] if no guard is installed for
    /// the current task, and with [`GuardError::WriteNotAuthorized`] if the
    /// installed guard has not entered write mode. Callers must not send
    /// the statement to the database on failure.
    pub fn authorize(statement: &str) -> GuardResult<()> {
        let guard = registry::current()?;
        let mode = guard.mode();
        if mode.allows_writes() {
            Ok(())
        } else {
            tracing::warn!(
                tenant = %guard.identity().tenant(),
                %mode,
                "mutating statement rejected before reaching the database"
            );
            Err(GuardError::WriteNotAuthorized {
                mode,
                statement: preview(statement),
            })
        }
    }
}

fn preview(statement: &str) -> String {
    statement.chars().take(STATEMENT_PREVIEW_CHARS).collect()
}
