//! Microsoft SQL Server driver.
//!
//! This module provides MSSQL-specific implementations:
//!
//! - [`MssqlDialect`]: SQL syntax strategy for MSSQL
//! - [`MssqlProvider`]: opens Tiberius connections
//! - [`MssqlConnection`]: executes commands and TDS bulk loads

mod connection;
mod dialect;

pub use connection::{MssqlConnection, MssqlProvider};
pub use dialect::MssqlDialect;
