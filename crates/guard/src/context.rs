//! Security context propagation to the database session.
//!
//! Row-security policies evaluate `current_setting('app.tenant_id')` (and
//! friends) server-side. [`SecurityContextWriter`] is the single place that
//! writes those settings, always with transaction-local scope so that a
//! pooled connection can never carry one tenant's context into another
//! tenant's transaction.

use crate::config::GuardConfig;
use crate::error::{GuardError, GuardResult};
use crate::identity::{TenantIdentity, is_valid_identifier};
use crate::session::{DataSession, SqlValue};

/// The access mode written to the session for the current transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only access.
    Read,
    /// Read-write access.
    Write,
}

impl AccessMode {
    /// Returns the setting value written for this mode.
    pub fn as_setting_value(&self) -> &'static str {
        match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
        }
    }
}

/// Applies a [`TenantIdentity`] to a database session as transaction-local
/// settings.
///
/// The writer is owned by one guard and tracks the last identity/mode pair
/// it applied: re-applying an unchanged pair is side-effect-free, so a guard
/// transition writes the settings exactly once.
///
/// Settings are written via `set_config(name, value, true)`; the third
/// argument makes the assignment local to the open transaction, which is
/// what keeps pooled-connection reuse safe (commit or rollback reverts the
/// settings before the connection returns to the pool).
#[derive(Debug)]
pub struct SecurityContextWriter {
    config: GuardConfig,
    applied: Option<(TenantIdentity, AccessMode)>,
}

impl SecurityContextWriter {
    /// Creates a writer for the given configuration.
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            applied: None,
        }
    }

    /// Returns the configuration this writer applies.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Writes the identity and mode into the session's transaction-local
    /// settings.
    ///
    /// Must be called inside an open transaction. Idempotent: a repeated
    /// call with the same identity and mode issues no statements.
    pub async fn apply(
        &mut self,
        session: &mut dyn DataSession,
        identity: &TenantIdentity,
        mode: AccessMode,
    ) -> GuardResult<()> {
        if self
            .applied
            .as_ref()
            .is_some_and(|(last_identity, last_mode)| {
                last_identity == identity && *last_mode == mode
            })
        {
            return Ok(());
        }

        validate_identifier(identity.tenant().as_str())?;
        if let Some(group) = identity.group() {
            validate_identifier(group.as_str())?;
        }

        set_local(session, &self.config.tenant_setting, identity.tenant().as_str()).await?;
        if self.config.group_scoping {
            if let Some(group) = identity.group() {
                set_local(session, &self.config.group_setting, group.as_str()).await?;
            }
        }
        set_local(session, &self.config.mode_setting, mode.as_setting_value()).await?;

        tracing::debug!(
            tenant = %identity.tenant(),
            mode = mode.as_setting_value(),
            "applied security context"
        );

        self.applied = Some((identity.clone(), mode));
        Ok(())
    }

    /// Forgets the applied state.
    ///
    /// Called when the transaction that held the settings has ended, so a
    /// later transaction re-applies them.
    pub fn reset(&mut self) {
        self.applied = None;
    }
}

/// Writes one transaction-local setting.
async fn set_local(
    session: &mut dyn DataSession,
    setting: &str,
    value: &str,
) -> GuardResult<()> {
    session
        .execute(
            "SELECT set_config($1, $2, true)",
            &[SqlValue::from(setting), SqlValue::from(value)],
        )
        .await?;
    Ok(())
}

fn validate_identifier(value: &str) -> GuardResult<()> {
    if is_valid_identifier(value) {
        Ok(())
    } else {
        Err(GuardError::InvalidIdentifier {
            value: value.to_string(),
            reason: "identifiers are 1-64 ASCII alphanumerics, hyphens, or underscores"
                .to_string(),
        })
    }
}
