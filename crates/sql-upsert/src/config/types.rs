//! Configuration types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::upsert::request::UpsertOptions;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database connection.
    pub target: TargetConfig,

    /// Default options applied to every upsert.
    #[serde(default)]
    pub upsert: UpsertOptions,

    /// Multi-table scheduling.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Target database configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type: "mysql" (default) or "mssql".
    #[serde(default = "default_mysql")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// TLS mode: disable, prefer, require, verify-ca, verify-full
    /// (default: "prefer").
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,

    /// Trust the server certificate without validation (SQL Server only).
    #[serde(default)]
    pub trust_server_cert: bool,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Worker pool settings for multi-table upserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on concurrently running table upserts (default: 8).
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Connection pool size (default: 8).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_mysql() -> String {
    "mysql".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_prefer() -> String {
    "prefer".to_string()
}

fn default_max_workers() -> usize {
    8
}

fn default_max_connections() -> usize {
    8
}
