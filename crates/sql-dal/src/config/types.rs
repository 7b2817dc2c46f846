//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DalError, Result};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend connection settings.
    pub provider: ProviderConfig,
}

/// Supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Mssql,
    Postgres,
    Mysql,
}

impl ProviderType {
    /// Parse a provider type, accepting common aliases.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mssql" | "sqlserver" => Ok(ProviderType::Mssql),
            "postgres" | "postgresql" | "pg" => Ok(ProviderType::Postgres),
            "mysql" | "mariadb" => Ok(ProviderType::Mysql),
            other => Err(DalError::Config(format!(
                "Invalid provider.type '{}'. Valid values: mssql, postgres, mysql",
                other
            ))),
        }
    }

    /// Port used when the configuration does not set one.
    pub fn default_port(&self) -> u16 {
        match self {
            ProviderType::Mssql => 1433,
            ProviderType::Postgres => 5432,
            ProviderType::Mysql => 3306,
        }
    }

    /// Canonical name, also used as the backend name in errors and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Mssql => "mssql",
            ProviderType::Postgres => "postgres",
            ProviderType::Mysql => "mysql",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection settings for one backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Database type: "mssql", "postgres" or "mysql".
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default depends on the type).
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode for PostgreSQL and MySQL (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,

    /// Encrypt connection, SQL Server only (default: "true").
    #[serde(default = "default_true_string")]
    pub encrypt: String,

    /// Trust server certificate, SQL Server only (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// SQL appended to write commands to fetch the generated key.
    /// Overrides the backend default when set.
    #[serde(default)]
    pub identity_suffix: Option<String>,

    /// Connect timeout in seconds (default: 30).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl ProviderConfig {
    /// Parsed backend type.
    pub fn provider_type(&self) -> Result<ProviderType> {
        ProviderType::parse(&self.r#type)
    }

    /// Configured port, or the backend default.
    pub fn port(&self) -> Result<u16> {
        match self.port {
            Some(port) => Ok(port),
            None => Ok(self.provider_type()?.default_port()),
        }
    }

    /// Whether SQL Server encryption is requested.
    pub fn encrypt_enabled(&self) -> bool {
        !matches!(
            self.encrypt.to_lowercase().as_str(),
            "false" | "no" | "0" | "disable"
        )
    }
}

fn default_require() -> String {
    "require".to_string()
}

fn default_true_string() -> String {
    "true".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}
