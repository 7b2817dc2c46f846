//! Core abstractions for provider-agnostic data access.
//!
//! This module provides the mapping engine shared by every backend:
//!
//! - [`value`]: SQL value representation and typed conversions
//! - [`reflect`]: field descriptors and the per-type descriptor cache
//! - [`dynamic`]: the schema-free property bag
//! - [`binder`]: record and explicit parameters onto a command
//! - [`materialize`]: result rows into records or bags
//! - [`placeholder`]: `@Name` placeholders into native positional form
//! - [`traits`]: the capability set implemented once per backend
//!
//! # Architecture
//!
//! Nothing in this module knows about a specific database. Drivers
//! (`drivers/mssql`, `drivers/postgres`, `drivers/mysql`) implement the
//! capability traits, and the [`Executor`](crate::executor::Executor) drives
//! them through the binder and materializer.

pub mod binder;
pub mod dynamic;
pub mod materialize;
pub mod placeholder;
pub mod reflect;
pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use dynamic::Dynamic;
pub use reflect::{describe, FieldDescriptor, Record, Reflect, Shape};
pub use traits::{Command, Connection, Dialect, MemoryCursor, Parameter, Provider, RowCursor};
pub use value::{FromSqlValue, SqlValue};
