//! Guard configuration.
//!
//! [`GuardConfig`] carries the deployment toggles and the names of the
//! database session settings consumed by row-security policies.

use serde::{Deserialize, Serialize};

/// Configuration for the tenant isolation guard.
///
/// # Example
///
/// ```
/// use meridian_guard::config::GuardConfig;
///
/// let config = GuardConfig::new().with_group_scoping();
/// assert!(config.group_scoping);
/// assert_eq!(config.tenant_setting, "app.tenant_id");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Whether reseller-group scoping is enabled.
    ///
    /// When enabled, every guard transition additionally requires a resolved
    /// group id and writes it to [`group_setting`](Self::group_setting).
    #[serde(default)]
    pub group_scoping: bool,

    /// The session setting holding the current tenant id.
    ///
    /// Row-security policies read this via `current_setting`.
    #[serde(default = "default_tenant_setting")]
    pub tenant_setting: String,

    /// The session setting holding the current group id.
    #[serde(default = "default_group_setting")]
    pub group_setting: String,

    /// The session setting holding the current access mode (`read`/`write`).
    ///
    /// Write-gating policies key their `WITH CHECK` clauses on this setting.
    #[serde(default = "default_mode_setting")]
    pub mode_setting: String,
}

fn default_tenant_setting() -> String {
    "app.tenant_id".to_string()
}

fn default_group_setting() -> String {
    "app.group_id".to_string()
}

fn default_mode_setting() -> String {
    "app.access_mode".to_string()
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            group_scoping: false,
            tenant_setting: default_tenant_setting(),
            group_setting: default_group_setting(),
            mode_setting: default_mode_setting(),
        }
    }
}

impl GuardConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables reseller-group scoping.
    pub fn with_group_scoping(mut self) -> Self {
        self.group_scoping = true;
        self
    }

    /// Sets the tenant session setting name.
    pub fn with_tenant_setting(mut self, setting: impl Into<String>) -> Self {
        self.tenant_setting = setting.into();
        self
    }

    /// Sets the group session setting name.
    pub fn with_group_setting(mut self, setting: impl Into<String>) -> Self {
        self.group_setting = setting.into();
        self
    }

    /// Sets the access-mode session setting name.
    pub fn with_mode_setting(mut self, setting: impl Into<String>) -> Self {
        self.mode_setting = setting.into();
        self
    }
}
