//! # sql-dal
//!
//! Provider-agnostic data access over SQL Server, PostgreSQL and MySQL.
//!
//! This library maps plain Rust records to SQL commands and back:
//!
//! - **Reflection** of record fields through the [`Reflect`] trait and the
//!   [`impl_record!`] macro
//! - **Parameter binding** of explicit parameters and record fields by name
//! - **Materialization** of result rows into typed records or [`Dynamic`] bags
//! - **Bulk loads** through the SQL Server TDS bulk protocol
//! - **Connection-per-operation** execution with guaranteed close
//!
//! ## Example
//!
//! ```rust,no_run
//! use sql_dal::{impl_record, Config, DataRepository, Parameter, SqlRepository};
//!
//! #[derive(Debug, Default)]
//! struct Employee {
//!     id: i32,
//!     name: String,
//! }
//!
//! impl_record!(Employee { "ID" => id, "Name" => name });
//!
//! #[tokio::main]
//! async fn main() -> sql_dal::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let repo = SqlRepository::from_config(&config)?;
//!
//!     let id = repo
//!         .create(
//!             "INSERT INTO Employees (Name) VALUES (@Name)",
//!             &Employee { id: 0, name: "Jeremy Johnson".into() },
//!         )
//!         .await?;
//!
//!     let found: Vec<Employee> = repo
//!         .read(
//!             "SELECT ID, Name FROM Employees WHERE ID = @ID",
//!             &[Parameter::new("ID", id)],
//!         )
//!         .await?;
//!     println!("{:?}", found);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod executor;
pub mod repository;

// Re-exports for convenient access
pub use config::{Config, ProviderConfig, ProviderType};
pub use self::core::{Command, Dynamic, FromSqlValue, Parameter, Provider, Record, Reflect, SqlValue};
pub use drivers::ProviderImpl;
pub use error::{DalError, Result};
pub use executor::{Executor, OperationState};
pub use repository::{DataRepository, SqlRepository};
