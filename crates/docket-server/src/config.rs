//! Server configuration: command-line flags with environment fallbacks.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use docket_core::BrokerConfig;

use crate::observability::LogFormat;

/// Docket task broker HTTP server.
#[derive(Parser, Debug, Clone)]
#[command(name = "docket-server", about = "Docket task broker HTTP server")]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, env = "DOCKET_LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// PostgreSQL URL. Without it the broker keeps its state in memory.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Maximum size of the database connection pool.
    #[arg(long, env = "DOCKET_DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub db_max_connections: u32,

    #[arg(long, env = "DOCKET_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Per-request timeout in seconds.
    #[arg(long, env = "DOCKET_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Claim timeout applied when a claim request does not carry one.
    #[arg(long, env = "DOCKET_CLAIM_TIMEOUT_SECS", default_value_t = 300)]
    pub claim_timeout_secs: u64,

    /// `max_attempts` of tasks created without one.
    #[arg(long, env = "DOCKET_DEFAULT_MAX_ATTEMPTS", default_value_t = 3)]
    pub default_max_attempts: u32,

    /// Upper bound of `GET /tasks?limit=`.
    #[arg(long, env = "DOCKET_MAX_LIST_LIMIT", default_value_t = 1000)]
    pub max_list_limit: usize,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be a positive integer")]
    NotPositive(&'static str),
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("db-max-connections", u64::from(self.db_max_connections)),
            ("request-timeout-secs", self.request_timeout_secs),
            ("claim-timeout-secs", self.claim_timeout_secs),
            ("default-max-attempts", u64::from(self.default_max_attempts)),
            (
                "max-list-limit",
                u64::try_from(self.max_list_limit).unwrap_or(u64::MAX),
            ),
        ];
        match checks.into_iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(ConfigError::NotPositive(name)),
            None => Ok(()),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn broker_config(&self) -> BrokerConfig {
        let defaults = BrokerConfig::default();
        BrokerConfig {
            default_claim_timeout: Duration::from_secs(self.claim_timeout_secs),
            default_max_attempts: self.default_max_attempts,
            default_list_limit: defaults.default_list_limit.min(self.max_list_limit),
            max_list_limit: self.max_list_limit,
            ..defaults
        }
    }
}
