//! Pieces shared by more than one driver.
//!
//! - [`tls`]: `ssl_mode` parsing and the rustls connector for PostgreSQL

pub mod tls;

pub use tls::{SslMode, TlsBuilder};
