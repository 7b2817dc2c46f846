//! Command executor - one connection per operation.
//!
//! Every operation walks the same state machine:
//!
//! ```text
//! Idle -> ConnectionOpening -> ConnectionOpen -> Executing
//!      -> (RowStreaming | ScalarExtracted) -> Closed
//! ```
//!
//! `Closed` is reached on every path. The connection is closed after the
//! work finishes, whether it succeeded or failed, and only then is the
//! result handed back. Nothing is retried here.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::core::binder::{bind, bulk_rows};
use crate::core::dynamic::Dynamic;
use crate::core::materialize::{materialize_all, materialize_all_dynamic};
use crate::core::reflect::{Record, Reflect};
use crate::core::traits::{Connection, Parameter, Provider};
use crate::error::{DalError, Result};

/// Lifecycle of a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Idle,
    ConnectionOpening,
    ConnectionOpen,
    Executing,
    RowStreaming,
    ScalarExtracted,
    Closed,
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// State tracker for one operation, logging each transition.
#[derive(Debug)]
struct Operation {
    backend: String,
    kind: &'static str,
    state: OperationState,
}

impl Operation {
    fn new(backend: &str, kind: &'static str) -> Self {
        Self {
            backend: backend.to_string(),
            kind,
            state: OperationState::Idle,
        }
    }

    fn transition(&mut self, next: OperationState) {
        debug!(
            "{} {}: {} -> {}",
            self.backend, self.kind, self.state, next
        );
        self.state = next;
    }
}

/// Runs commands against one provider.
///
/// Cheap to clone; clones share the provider. Concurrent operations each
/// open their own connection.
#[derive(Clone)]
pub struct Executor {
    provider: Arc<dyn Provider>,
}

impl Executor {
    /// Create an executor over `provider`.
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    /// The provider this executor opens connections with.
    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    async fn open(&self, op: &mut Operation) -> Result<Box<dyn Connection>> {
        op.transition(OperationState::ConnectionOpening);
        match self.provider.open().await {
            Ok(conn) => {
                op.transition(OperationState::ConnectionOpen);
                Ok(conn)
            }
            Err(e) => {
                op.transition(OperationState::Closed);
                Err(e)
            }
        }
    }

    async fn close(&self, mut conn: Box<dyn Connection>, op: &mut Operation) {
        if let Err(e) = conn.close().await {
            warn!("{} {}: failed to close connection: {}", op.backend, op.kind, e);
        }
        op.transition(OperationState::Closed);
    }

    /// Run a query and materialize one `T` per row.
    ///
    /// Only the explicit parameters are bound.
    pub async fn query<T: Record>(&self, text: &str, params: &[Parameter]) -> Result<Vec<T>> {
        let mut op = Operation::new(self.provider.name(), "query");
        let mut conn = self.open(&mut op).await?;

        let result = async {
            let mut cmd = conn.new_command(text)?;
            bind(&mut cmd, params, None);
            op.transition(OperationState::Executing);
            trace!("{}", cmd.text());
            let mut cursor = conn.execute_rows(&cmd).await?;
            op.transition(OperationState::RowStreaming);
            materialize_all::<T>(cursor.as_mut())
        }
        .await;

        self.close(conn, &mut op).await;
        result
    }

    /// Run a query and stamp one bag per row from `prototype`.
    ///
    /// Row bags carry only the prototype's keys, snapshotted before the first
    /// row, and share its wrapped instance.
    pub async fn query_dynamic(
        &self,
        prototype: &Dynamic,
        text: &str,
        params: &[Parameter],
    ) -> Result<Vec<Dynamic>> {
        let mut op = Operation::new(self.provider.name(), "query_dynamic");
        let mut conn = self.open(&mut op).await?;

        let result = async {
            let mut cmd = conn.new_command(text)?;
            bind(&mut cmd, params, None);
            op.transition(OperationState::Executing);
            trace!("{}", cmd.text());
            let mut cursor = conn.execute_rows(&cmd).await?;
            op.transition(OperationState::RowStreaming);
            Ok(materialize_all_dynamic(prototype, cursor.as_mut()))
        }
        .await;

        self.close(conn, &mut op).await;
        result
    }

    /// Run a write command with the provider's identity suffix appended.
    ///
    /// Returns the generated identifier when the scalar result is an integer,
    /// otherwise 0. For updates and deletes the value is usually meaningless.
    pub async fn execute(
        &self,
        text: &str,
        params: &[Parameter],
        record: Option<&dyn Reflect>,
    ) -> Result<i64> {
        let mut op = Operation::new(self.provider.name(), "execute");
        let full_text = with_identity_suffix(text, self.provider.identity_suffix());
        let mut conn = self.open(&mut op).await?;

        let result = async {
            let mut cmd = conn.new_command(&full_text)?;
            bind(&mut cmd, params, record);
            op.transition(OperationState::Executing);
            trace!("{}", cmd.text());
            let scalar = conn.execute_scalar(&cmd).await?;
            op.transition(OperationState::ScalarExtracted);
            Ok(scalar.and_then(|v| v.as_identity()).unwrap_or(0))
        }
        .await;

        self.close(conn, &mut op).await;
        result
    }

    /// Load `records` into `target` through the backend's bulk path.
    ///
    /// Backends without one fail with [`DalError::Unsupported`].
    pub async fn bulk_insert<T: Record>(&self, records: &[T], target: &str) -> Result<u64> {
        if target.trim().is_empty() {
            return Err(DalError::CommandBuild("bulk insert target is empty".into()));
        }

        let mut op = Operation::new(self.provider.name(), "bulk_insert");
        let (columns, rows) = bulk_rows(records);
        let mut conn = self.open(&mut op).await?;

        op.transition(OperationState::Executing);
        let result = conn.bulk_insert(target, &columns, rows).await;
        if let Ok(count) = &result {
            debug!("{}: bulk loaded {} rows into {}", op.backend, count, target);
        }

        self.close(conn, &mut op).await;
        result
    }

    /// Open and immediately close a connection. Failures become `false`.
    pub async fn is_available(&self) -> bool {
        let mut op = Operation::new(self.provider.name(), "probe");
        match self.open(&mut op).await {
            Ok(conn) => {
                self.close(conn, &mut op).await;
                info!("{}: connection probe succeeded", op.backend);
                true
            }
            Err(e) => {
                info!("{}: connection probe failed: {}", op.backend, e);
                false
            }
        }
    }
}

/// Append `suffix` to a write command, dropping any trailing `;` first.
fn with_identity_suffix(text: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return text.to_string();
    }
    let body = text.trim_end().trim_end_matches(';').trim_end();
    format!("{}{}", body, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reflect::tests::Employee;
    use crate::core::traits::{Command, MemoryCursor, RowCursor};
    use crate::core::value::SqlValue;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted provider recording every command it sees.
    #[derive(Default)]
    struct Scripted {
        fail_open: bool,
        fail_execute: bool,
        scalar: Option<SqlValue>,
        rows: Vec<Vec<SqlValue>>,
        opened: AtomicUsize,
        closed: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<Command>>>,
    }

    struct ScriptedConn {
        fail_execute: bool,
        scalar: Option<SqlValue>,
        rows: Vec<Vec<SqlValue>>,
        closed: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<Command>>>,
    }

    #[async_trait]
    impl Provider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn identity_suffix(&self) -> &str {
            "; SELECT SCOPE_IDENTITY()"
        }

        async fn open(&self) -> Result<Box<dyn Connection>> {
            if self.fail_open {
                return Err(DalError::connection("scripted", "connection refused"));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedConn {
                fail_execute: self.fail_execute,
                scalar: self.scalar.clone(),
                rows: self.rows.clone(),
                closed: Arc::clone(&self.closed),
                seen: Arc::clone(&self.seen),
            }))
        }
    }

    #[async_trait]
    impl Connection for ScriptedConn {
        fn backend(&self) -> &str {
            "scripted"
        }

        async fn execute_rows(&mut self, command: &Command) -> Result<Box<dyn RowCursor>> {
            self.seen.lock().unwrap().push(command.clone());
            if self.fail_execute {
                return Err(DalError::execution("scripted", command.text(), "boom"));
            }
            Ok(Box::new(MemoryCursor::new(
                vec!["ID".into(), "Name".into(), "Email".into()],
                self.rows.clone(),
            )))
        }

        async fn execute_scalar(&mut self, command: &Command) -> Result<Option<SqlValue>> {
            self.seen.lock().unwrap().push(command.clone());
            if self.fail_execute {
                return Err(DalError::execution("scripted", command.text(), "boom"));
            }
            Ok(self.scalar.clone())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn executor(provider: Scripted) -> (Executor, Arc<AtomicUsize>, Arc<Mutex<Vec<Command>>>) {
        let closed = Arc::clone(&provider.closed);
        let seen = Arc::clone(&provider.seen);
        (Executor::new(Arc::new(provider)), closed, seen)
    }

    #[test]
    fn test_identity_suffix_replaces_trailing_semicolon() {
        assert_eq!(
            with_identity_suffix("INSERT INTO T VALUES (1); ", "; SELECT 1"),
            "INSERT INTO T VALUES (1); SELECT 1"
        );
        assert_eq!(with_identity_suffix("DELETE FROM T", ""), "DELETE FROM T");
    }

    #[tokio::test]
    async fn test_execute_returns_decimal_identity_and_closes() {
        let (exec, closed, seen) = executor(Scripted {
            scalar: Some(SqlValue::Decimal(Decimal::from(7))),
            ..Default::default()
        });
        let emp = Employee {
            id: 0,
            name: "Jeremy Johnson".into(),
            email: Some("jmjohnson@x.us".into()),
        };

        let id = exec
            .execute(
                "INSERT INTO Employees (Name, Email) VALUES (@Name, @Email)",
                &[],
                Some(&emp),
            )
            .await
            .unwrap();

        assert_eq!(id, 7);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        let seen = seen.lock().unwrap();
        assert!(seen[0].text().ends_with("; SELECT SCOPE_IDENTITY()"));
        assert_eq!(seen[0].parameters().len(), 3);
    }

    #[tokio::test]
    async fn test_execute_non_integer_scalar_is_zero() {
        let (exec, _, _) = executor(Scripted {
            scalar: Some(SqlValue::from("n/a")),
            ..Default::default()
        });
        assert_eq!(exec.execute("DELETE FROM T", &[], None).await.unwrap(), 0);

        let (exec, _, _) = executor(Scripted::default());
        assert_eq!(exec.execute("DELETE FROM T", &[], None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_binds_only_explicit_params() {
        let (exec, closed, seen) = executor(Scripted {
            rows: vec![vec![SqlValue::I32(1), SqlValue::from("a "), SqlValue::Null]],
            ..Default::default()
        });

        let rows: Vec<Employee> = exec
            .query(
                "SELECT * FROM Employees WHERE ID = @ID",
                &[Parameter::new("ID", 1i32)],
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "a");
        assert_eq!(seen.lock().unwrap()[0].parameters().len(), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execution_failure_still_closes() {
        let (exec, closed, _) = executor(Scripted {
            fail_execute: true,
            ..Default::default()
        });

        let err = exec
            .query::<Employee>("SELECT * FROM Employees", &[])
            .await
            .unwrap_err();

        assert!(matches!(err, DalError::Execution { .. }));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_command_text_is_build_error_and_closes() {
        let (exec, closed, seen) = executor(Scripted::default());

        let err = exec.query_dynamic(&Dynamic::new(), "  ", &[]).await.unwrap_err();

        assert!(matches!(err, DalError::CommandBuild(_)));
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bulk_insert_unsupported_is_explicit() {
        let (exec, closed, _) = executor(Scripted::default());

        let err = exec
            .bulk_insert(&[Employee::default()], "Employees")
            .await
            .unwrap_err();

        assert!(matches!(err, DalError::Unsupported { .. }));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bulk_insert_rejects_empty_target() {
        let (exec, closed, _) = executor(Scripted::default());
        let err = exec.bulk_insert::<Employee>(&[], " ").await.unwrap_err();
        assert!(matches!(err, DalError::CommandBuild(_)));
        assert_eq!(closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_is_available_swallows_open_failure() {
        let (exec, _, _) = executor(Scripted {
            fail_open: true,
            ..Default::default()
        });
        assert!(!exec.is_available().await);

        let (exec, closed, _) = executor(Scripted::default());
        assert!(exec.is_available().await);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_operation_tracks_state() {
        let mut op = Operation::new("scripted", "query");
        assert_eq!(op.state, OperationState::Idle);
        op.transition(OperationState::ConnectionOpening);
        op.transition(OperationState::Closed);
        assert_eq!(op.state, OperationState::Closed);
    }
}
