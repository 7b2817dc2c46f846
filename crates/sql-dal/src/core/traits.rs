//! Core traits for provider-agnostic command execution.
//!
//! This module defines the capability set every backend implements, and the
//! command model the engine builds against it:
//!
//! - [`Provider`]: opens connections for one configured backend
//! - [`Connection`]: builds and executes commands on one open connection
//! - [`RowCursor`]: walks a result set by column name
//! - [`Dialect`]: SQL syntax strategy (quoting, placeholders, identity suffix)
//!
//! The [`Executor`](crate::executor::Executor) is written once against these
//! traits; drivers in [`crate::drivers`] provide the implementations.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DalError, Result};

use super::value::SqlValue;

/// A named command parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name without the placeholder marker (`Email`, not `@Email`).
    pub name: String,
    /// Bound value; `SqlValue::Null` binds SQL NULL.
    pub value: SqlValue,
}

impl Parameter {
    /// Create a parameter.
    pub fn new(name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl<N: Into<String>, V: Into<SqlValue>> From<(N, V)> for Parameter {
    fn from((name, value): (N, V)) -> Self {
        Parameter::new(name, value)
    }
}

/// Command text plus its ordered parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    text: String,
    parameters: Vec<Parameter>,
}

impl Command {
    /// Create a command with no parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: Vec::new(),
        }
    }

    /// The command text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parameters in attachment order.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Attach a parameter. Duplicate names are kept in order.
    pub fn add_parameter(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        self.parameters.push(Parameter::new(name, value));
    }

    /// First parameter whose name matches, ignoring ASCII case and a
    /// leading `@` on either side.
    pub fn find_parameter(&self, name: &str) -> Option<&Parameter> {
        let name = name.trim_start_matches('@');
        self.parameters
            .iter()
            .find(|p| p.name.trim_start_matches('@').eq_ignore_ascii_case(name))
    }
}

/// Opens connections to one configured backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Backend identifier (e.g., "mssql", "postgres").
    fn name(&self) -> &str;

    /// Trailing SQL appended to write commands to fetch the generated key.
    fn identity_suffix(&self) -> &str;

    /// Open a new connection. Every call yields an independent connection.
    async fn open(&self) -> Result<Box<dyn Connection>>;
}

/// One open connection.
///
/// A connection is owned by exactly one operation and closed before that
/// operation returns.
#[async_trait]
pub trait Connection: Send {
    /// Backend identifier, used in error context.
    fn backend(&self) -> &str;

    /// Build a command for this connection.
    fn new_command(&self, text: &str) -> Result<Command> {
        if text.trim().is_empty() {
            return Err(DalError::CommandBuild("command text is empty".into()));
        }
        Ok(Command::new(text))
    }

    /// Execute a command that returns rows.
    async fn execute_rows(&mut self, command: &Command) -> Result<Box<dyn RowCursor>>;

    /// Execute a command and return the first column of the first row of
    /// the last result set, if any row was returned.
    async fn execute_scalar(&mut self, command: &Command) -> Result<Option<SqlValue>>;

    /// Load many rows into `table` through the backend's bulk path.
    async fn bulk_insert(
        &mut self,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        let _ = (table, columns, rows);
        Err(DalError::unsupported(self.backend(), "bulk insert"))
    }

    /// Close the connection. Calling it more than once is harmless.
    async fn close(&mut self) -> Result<()>;
}

/// Forward-only cursor over a result set.
pub trait RowCursor: Send {
    /// Move to the next row. Returns `false` once the rows are exhausted.
    fn advance(&mut self) -> bool;

    /// Column names of the result set.
    fn columns(&self) -> &[String];

    /// Value of the named column in the current row.
    ///
    /// `None` when the result set has no such column (or no current row);
    /// `Some(SqlValue::Null)` for SQL NULL.
    fn value_by_name(&self, name: &str) -> Option<SqlValue>;

    /// Whether the named column is absent or NULL in the current row.
    fn is_null(&self, name: &str) -> bool {
        self.value_by_name(name).map_or(true, |v| v.is_null())
    }
}

/// Locate a column: exact match first, then ASCII case-insensitive.
pub fn find_column(columns: &[String], name: &str) -> Option<usize> {
    columns
        .iter()
        .position(|c| c == name)
        .or_else(|| columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
}

/// A fully buffered result set.
///
/// Drivers convert native rows into `SqlValue`s while reading and hand the
/// buffer to the engine; the connection can then close independently.
#[derive(Debug, Clone, Default)]
pub struct MemoryCursor {
    columns: Arc<[String]>,
    rows: VecDeque<Vec<SqlValue>>,
    current: Option<Vec<SqlValue>>,
}

impl MemoryCursor {
    /// Create a cursor positioned before the first row.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns: columns.into(),
            rows: rows.into(),
            current: None,
        }
    }

    /// Number of rows not yet visited.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl RowCursor for MemoryCursor {
    fn advance(&mut self) -> bool {
        self.current = self.rows.pop_front();
        self.current.is_some()
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn value_by_name(&self, name: &str) -> Option<SqlValue> {
        let row = self.current.as_ref()?;
        let idx = find_column(&self.columns, name)?;
        Some(row.get(idx).cloned().unwrap_or(SqlValue::Null))
    }
}

/// SQL syntax strategy for different database engines.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "mssql", "postgres").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_ident(&self, name: &str) -> String;

    /// Quote each part of a dotted name such as `dbo.Employees`. Parts that
    /// are already quoted are kept as written.
    fn quote_qualified(&self, name: &str) -> String {
        name.split('.')
            .map(str::trim)
            .map(|part| {
                if part.starts_with(['[', '"', '`']) {
                    part.to_string()
                } else {
                    self.quote_ident(part)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Get a parameter placeholder for the given 1-based index.
    ///
    /// - MSSQL: `@P1`, `@P2`, etc.
    /// - PostgreSQL: `$1`, `$2`, etc.
    /// - MySQL: `?`
    fn param_placeholder(&self, index: usize) -> String;

    /// Whether placeholders carry an index, so a name used twice in a
    /// command can bind a single value. `?`-style dialects return `false`.
    fn numbered_placeholders(&self) -> bool {
        true
    }

    /// Identity-retrieval suffix used when the configuration sets none.
    fn default_identity_suffix(&self) -> &'static str;

    /// Whether one round trip can carry several `;`-separated statements
    /// with parameters. When not, the driver splits the batch itself.
    fn supports_multi_statement(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parameters_keep_order_and_duplicates() {
        let mut cmd = Command::new("SELECT 1");
        cmd.add_parameter("ID", 1i32);
        cmd.add_parameter("Name", "a");
        cmd.add_parameter("id", 2i32);

        let names: Vec<&str> = cmd.parameters().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["ID", "Name", "id"]);
        assert_eq!(cmd.find_parameter("Id").unwrap().value, SqlValue::I32(1));
    }

    #[test]
    fn test_find_column_prefers_exact_case() {
        let cols = vec!["id".to_string(), "ID".to_string(), "Name".to_string()];
        assert_eq!(find_column(&cols, "ID"), Some(1));
        assert_eq!(find_column(&cols, "name"), Some(2));
        assert_eq!(find_column(&cols, "Email"), None);
    }

    #[test]
    fn test_memory_cursor_walks_rows() {
        let mut cursor = MemoryCursor::new(
            vec!["ID".into(), "Email".into()],
            vec![
                vec![SqlValue::I32(1), SqlValue::Null],
                vec![SqlValue::I32(2), SqlValue::from("b@x.us")],
            ],
        );

        assert_eq!(cursor.value_by_name("ID"), None, "no current row yet");
        assert!(cursor.advance());
        assert_eq!(cursor.value_by_name("ID"), Some(SqlValue::I32(1)));
        assert!(cursor.is_null("Email"));
        assert!(cursor.is_null("Missing"));
        assert!(cursor.advance());
        assert!(!cursor.is_null("Email"));
        assert!(!cursor.advance());
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_new_command_rejects_empty_text() {
        struct Dummy;

        #[async_trait]
        impl Connection for Dummy {
            fn backend(&self) -> &str {
                "dummy"
            }
            async fn execute_rows(&mut self, _command: &Command) -> Result<Box<dyn RowCursor>> {
                Ok(Box::new(MemoryCursor::default()))
            }
            async fn execute_scalar(&mut self, _command: &Command) -> Result<Option<SqlValue>> {
                Ok(None)
            }
            async fn close(&mut self) -> Result<()> {
                Ok(())
            }
        }

        let conn = Dummy;
        assert!(matches!(
            conn.new_command("   "),
            Err(DalError::CommandBuild(_))
        ));
        assert_eq!(conn.new_command("SELECT 1").unwrap().text(), "SELECT 1");
    }

    #[tokio::test]
    async fn test_bulk_insert_defaults_to_unsupported() {
        struct NoBulk;

        #[async_trait]
        impl Connection for NoBulk {
            fn backend(&self) -> &str {
                "nobulk"
            }
            async fn execute_rows(&mut self, _command: &Command) -> Result<Box<dyn RowCursor>> {
                Ok(Box::new(MemoryCursor::default()))
            }
            async fn execute_scalar(&mut self, _command: &Command) -> Result<Option<SqlValue>> {
                Ok(None)
            }
            async fn close(&mut self) -> Result<()> {
                Ok(())
            }
        }

        let mut conn = NoBulk;
        let err = conn.bulk_insert("T", &[], Vec::new()).await.unwrap_err();
        assert!(matches!(err, DalError::Unsupported { .. }));
    }
}
