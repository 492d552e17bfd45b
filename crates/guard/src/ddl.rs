//! Row-security DDL generation.
//!
//! Emits the `ALTER TABLE` / `CREATE POLICY` statements that pair a table
//! with the session settings written by
//! [`SecurityContextWriter`](crate::context::SecurityContextWriter). Schema
//! migrations run this once per guarded table.

use crate::config::GuardConfig;

/// Builder for the row-security DDL of one table.
///
/// The generated policies read the configured session settings with
/// `current_setting(name, true)` so that a connection with no context set
/// sees (and can touch) nothing.
///
/// Policy layout per table:
/// - a permissive tenant policy (`USING` + `WITH CHECK` on the tenant
///   column),
/// - an optional restrictive group policy when group scoping is enabled,
/// - restrictive write-mode policies for INSERT/UPDATE/DELETE keyed on the
///   access-mode setting, so row changes require a promoted transaction
///   even at the database level.
///
/// # Example
///
/// ```
/// use meridian_guard::config::GuardConfig;
/// use meridian_guard::ddl::RowSecurityDdl;
///
/// let ddl = RowSecurityDdl::new("records", &GuardConfig::default()).to_postgres_ddl();
/// assert!(ddl.contains("ENABLE ROW LEVEL SECURITY"));
/// assert!(ddl.contains("records_tenant"));
/// ```
#[derive(Debug)]
pub struct RowSecurityDdl {
    table: String,
    tenant_column: String,
    group_column: String,
    config: GuardConfig,
}

impl RowSecurityDdl {
    /// Creates a builder for the given table.
    pub fn new(table: impl Into<String>, config: &GuardConfig) -> Self {
        Self {
            table: table.into(),
            tenant_column: "tenant_id".to_string(),
            group_column: "group_id".to_string(),
            config: config.clone(),
        }
    }

    /// Overrides the tenant column name (default `tenant_id`).
    pub fn with_tenant_column(mut self, column: impl Into<String>) -> Self {
        self.tenant_column = column.into();
        self
    }

    /// Overrides the group column name (default `group_id`).
    pub fn with_group_column(mut self, column: impl Into<String>) -> Self {
        self.group_column = column.into();
        self
    }

    /// Generates the PostgreSQL DDL for this table.
    pub fn to_postgres_ddl(&self) -> String {
        let table = &self.table;
        let mut ddl = String::new();

        ddl.push_str(&format!("ALTER TABLE {table} ENABLE ROW LEVEL SECURITY;\n"));
        ddl.push_str(&format!("ALTER TABLE {table} FORCE ROW LEVEL SECURITY;\n\n"));

        let tenant_check = format!(
            "{} = current_setting('{}', true)",
            self.tenant_column, self.config.tenant_setting
        );
        ddl.push_str(&format!(
            "CREATE POLICY {table}_tenant ON {table}\n    USING ({tenant_check})\n    WITH CHECK ({tenant_check});\n"
        ));

        if self.config.group_scoping {
            let group_check = format!(
                "{} = current_setting('{}', true)",
                self.group_column, self.config.group_setting
            );
            ddl.push_str(&format!(
                "CREATE POLICY {table}_group ON {table} AS RESTRICTIVE\n    USING ({group_check})\n    WITH CHECK ({group_check});\n"
            ));
        }

        let write_check = format!(
            "current_setting('{}', true) = 'write'",
            self.config.mode_setting
        );
        ddl.push_str(&format!(
            "CREATE POLICY {table}_insert_gate ON {table} AS RESTRICTIVE FOR INSERT\n    WITH CHECK ({write_check});\n"
        ));
        ddl.push_str(&format!(
            "CREATE POLICY {table}_update_gate ON {table} AS RESTRICTIVE FOR UPDATE\n    USING ({write_check})\n    WITH CHECK ({write_check});\n"
        ));
        ddl.push_str(&format!(
            "CREATE POLICY {table}_delete_gate ON {table} AS RESTRICTIVE FOR DELETE\n    USING ({write_check});\n"
        ));

        ddl
    }
}
