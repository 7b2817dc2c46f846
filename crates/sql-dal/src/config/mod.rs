//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl ProviderConfig {
    /// Describe the connection for logs. The password is masked.
    pub fn connection_string(&self) -> String {
        let port = self
            .port
            .or_else(|| self.provider_type().ok().map(|t| t.default_port()))
            .unwrap_or_default();
        let password = if self.password.is_empty() { "" } else { "****" };

        match self.provider_type() {
            Ok(ProviderType::Mssql) => format!(
                "Server=tcp:{},{};Database={};User Id={};Password={};Encrypt={};TrustServerCertificate={}",
                self.host,
                port,
                self.database,
                self.user,
                password,
                self.encrypt_enabled(),
                self.trust_server_cert
            ),
            Ok(ProviderType::Mysql) => format!(
                "mysql://{}:{}@{}:{}/{}?ssl-mode={}",
                self.user, password, self.host, port, self.database, self.ssl_mode
            ),
            _ => format!(
                "host={} port={} dbname={} user={} password={} sslmode={}",
                self.host, port, self.database, self.user, password, self.ssl_mode
            ),
        }
    }
}
