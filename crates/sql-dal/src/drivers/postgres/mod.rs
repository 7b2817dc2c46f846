//! PostgreSQL driver.
//!
//! This module provides PostgreSQL-specific implementations:
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PostgresProvider`]: opens tokio-postgres connections, optionally over TLS
//! - [`PostgresConnection`]: executes commands statement by statement

mod connection;
mod dialect;

pub use connection::{PostgresConnection, PostgresProvider};
pub use dialect::PostgresDialect;
