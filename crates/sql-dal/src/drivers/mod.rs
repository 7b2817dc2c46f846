//! Database driver implementations.
//!
//! This module provides database-specific implementations of the core traits:
//!
//! - [`mssql`]: Microsoft SQL Server driver
//! - [`postgres`]: PostgreSQL driver
//! - [`mysql`]: MySQL/MariaDB driver (requires `mysql` feature)
//! - [`common`]: Shared utilities (TLS)
//!
//! # Architecture
//!
//! Each driver module implements:
//! - `Dialect`: identifier quoting, placeholders and the identity suffix
//! - `Provider`: opens connections from a [`ProviderConfig`]
//! - `Connection`: executes commands and buffers the rows it returns
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect`, `Provider` and `Connection`
//! 3. Add an enum variant to [`ProviderImpl`] and a type to [`ProviderType`]
//! 4. Gate the driver with a feature flag in `Cargo.toml`

pub mod common;
pub mod mssql;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod postgres;

// Re-export common utilities
pub use common::{SslMode, TlsBuilder};

// Re-export driver types
pub use mssql::{MssqlDialect, MssqlProvider};
#[cfg(feature = "mysql")]
pub use mysql::{MysqlDialect, MysqlProvider};
pub use postgres::{PostgresDialect, PostgresProvider};

use async_trait::async_trait;

use crate::config::{ProviderConfig, ProviderType};
use crate::core::traits::{Connection, Provider};
#[cfg(not(feature = "mysql"))]
use crate::error::DalError;
use crate::error::Result;

/// Enum-based dispatch over the built-in providers.
///
/// Callers that need a custom backend implement [`Provider`] directly and
/// hand it to the executor as a trait object.
pub enum ProviderImpl {
    Mssql(MssqlProvider),
    Postgres(PostgresProvider),
    #[cfg(feature = "mysql")]
    Mysql(MysqlProvider),
}

impl ProviderImpl {
    /// Create the provider named by `config.type`.
    ///
    /// # Errors
    ///
    /// Returns a config error if the type is not recognized or its driver
    /// was not compiled in.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        match config.provider_type()? {
            ProviderType::Mssql => Ok(ProviderImpl::Mssql(MssqlProvider::new(config.clone()))),
            ProviderType::Postgres => Ok(ProviderImpl::Postgres(PostgresProvider::new(
                config.clone(),
            ))),
            #[cfg(feature = "mysql")]
            ProviderType::Mysql => Ok(ProviderImpl::Mysql(MysqlProvider::new(config.clone()))),
            #[cfg(not(feature = "mysql"))]
            ProviderType::Mysql => Err(DalError::Config(
                "MySQL support requires the 'mysql' feature".into(),
            )),
        }
    }

    fn inner(&self) -> &dyn Provider {
        match self {
            ProviderImpl::Mssql(p) => p,
            ProviderImpl::Postgres(p) => p,
            #[cfg(feature = "mysql")]
            ProviderImpl::Mysql(p) => p,
        }
    }
}

#[async_trait]
impl Provider for ProviderImpl {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn identity_suffix(&self) -> &str {
        self.inner().identity_suffix()
    }

    async fn open(&self) -> Result<Box<dyn Connection>> {
        self.inner().open().await
    }
}

impl std::fmt::Debug for ProviderImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ProviderImpl").field(&self.name()).finish()
    }
}
