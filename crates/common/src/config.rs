//! Common configuration types for conference service components.

use crate::secret::SecretString;
use serde::Deserialize;

/// Default number of pooled Postgres connections.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default tracing filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "conference_service=debug";

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string (redacted in Debug output)
    pub url: SecretString,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (redacted in Debug output)
    pub url: SecretString,
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Fallback `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_filter: String,
    /// Emit JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            json_logs: false,
        }
    }
}
