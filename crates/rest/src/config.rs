//! Server configuration for the Meridian records API.
//!
//! Supports programmatic construction, command-line arguments, and
//! environment variable overrides.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MERIDIAN_PORT` | 8080 | Server port |
//! | `MERIDIAN_HOST` | 127.0.0.1 | Host to bind |
//! | `MERIDIAN_LOG_LEVEL` | info | Log level |
//! | `MERIDIAN_DATABASE_URL` | (unset) | Database connection string |
//! | `MERIDIAN_REQUEST_TIMEOUT` | 30 | Request timeout (seconds) |
//! | `MERIDIAN_GROUP_SCOPING` | false | Require a reseller group per request |
//! | `MERIDIAN_HOST_LOOKUP` | false | Resolve tenants from the request hostname |
//! | `MERIDIAN_TENANT_CLAIM` | tenant_id | Claim carrying the tenant id |
//! | `MERIDIAN_GROUP_CLAIM` | group_id | Claim carrying the group id |
//!
//! # Example
//!
//! ```rust
//! use meridian_rest::ServerConfig;
//!
//! let config = ServerConfig {
//!     port: 3000,
//!     host: "0.0.0.0".to_string(),
//!     ..ServerConfig::for_testing()
//! };
//! assert_eq!(config.socket_addr(), "0.0.0.0:3000");
//! ```

use clap::Parser;
use meridian_guard::config::GuardConfig;

/// Server configuration for the records API.
///
/// Construct from environment variables with [`ServerConfig::from_env`],
/// from command line arguments with `ServerConfig::parse()`, or
/// programmatically.
#[derive(Debug, Clone, Parser)]
#[command(name = "meridian-server")]
#[command(about = "Meridian business-records API server")]
pub struct ServerConfig {
    /// Port to listen on.
    #[arg(short, long, env = "MERIDIAN_PORT", default_value = "8080")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "MERIDIAN_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "MERIDIAN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Database connection string.
    #[arg(long, env = "MERIDIAN_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, env = "MERIDIAN_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout: u64,

    /// Require a reseller group on every request.
    #[arg(long, env = "MERIDIAN_GROUP_SCOPING", default_value = "false")]
    pub group_scoping: bool,

    /// Resolve tenants from the request hostname via the tenant directory.
    #[arg(long, env = "MERIDIAN_HOST_LOOKUP", default_value = "false")]
    pub host_lookup: bool,

    /// Name of the claim carrying the tenant id.
    #[arg(long, env = "MERIDIAN_TENANT_CLAIM", default_value = "tenant_id")]
    pub tenant_claim: String,

    /// Name of the claim carrying the group id.
    #[arg(long, env = "MERIDIAN_GROUP_CLAIM", default_value = "group_id")]
    pub group_claim: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            log_level: "info".to_string(),
            database_url: None,
            request_timeout: 30,
            group_scoping: false,
            host_lookup: false,
            tenant_claim: "tenant_id".to_string(),
            group_claim: "group_id".to_string(),
        }
    }
}

impl ServerConfig {
    /// Creates a configuration from environment variables.
    pub fn from_env() -> Self {
        Self::try_parse().unwrap_or_default()
    }

    /// Returns the socket address to bind to.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Derives the guard configuration for this deployment.
    pub fn guard_config(&self) -> GuardConfig {
        let config = GuardConfig::new();
        if self.group_scoping {
            config.with_group_scoping()
        } else {
            config
        }
    }

    /// Initializes the tracing subscriber for this configuration.
    ///
    /// `RUST_LOG` overrides the configured level when set.
    pub fn init_tracing(&self) {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.log_level));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.port == 0 {
            errors.push("Port cannot be 0".to_string());
        }

        if self.request_timeout == 0 {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if self.tenant_claim.is_empty() {
            errors.push("Tenant claim name cannot be empty".to_string());
        }

        if self.group_scoping && self.group_claim.is_empty() {
            errors.push("Group claim name cannot be empty when group scoping is on".to_string());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Creates a configuration suitable for testing.
    pub fn for_testing() -> Self {
        Self {
            port: 0, // Let OS assign port
            host: "127.0.0.1".to_string(),
            log_level: "debug".to_string(),
            database_url: None,
            request_timeout: 5, // Shorter timeout for tests
            group_scoping: false,
            host_lookup: false,
            tenant_claim: "tenant_id".to_string(),
            group_claim: "group_id".to_string(),
        }
    }
}
