//! MySQL/MariaDB driver.
//!
//! - [`MysqlDialect`]: backtick quoting and `?` placeholders
//! - [`MysqlProvider`]: opens mysql_async connections
//! - [`MysqlConnection`]: executes commands over prepared statements
//!
//! # Feature Flag
//!
//! This module is only available when the `mysql` feature is enabled
//! (on by default):
//!
//! ```toml
//! [dependencies]
//! sql-dal = { version = "0.1", features = ["mysql"] }
//! ```
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod connection;
mod dialect;

pub use connection::{MysqlConnection, MysqlProvider};
pub use dialect::MysqlDialect;
