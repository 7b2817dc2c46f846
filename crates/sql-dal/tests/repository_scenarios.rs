//! End-to-end repository scenarios over an in-memory provider.
//!
//! The provider understands the handful of statements used below against a
//! single `Employees` table, which is enough to drive every repository
//! operation through binding, execution and materialization.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use sql_dal::core::{Connection, MemoryCursor, RowCursor};
use sql_dal::{
    impl_record, Command, DalError, DataRepository, Dynamic, Parameter, Provider, Result,
    SqlRepository, SqlValue,
};

#[derive(Debug, Default, Clone, PartialEq)]
struct Employee {
    id: i32,
    name: String,
    email: Option<String>,
}

impl_record!(Employee {
    "ID" => id,
    "Name" => name,
    "Email" => email,
});

#[derive(Debug, Clone)]
struct StoredRow {
    id: i32,
    name: String,
    email: Option<String>,
}

#[derive(Default)]
struct Table {
    next_id: i32,
    rows: Vec<StoredRow>,
}

/// Provider over a shared in-memory `Employees` table.
#[derive(Default)]
struct MemoryProvider {
    table: Arc<Mutex<Table>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    offline: bool,
}

struct MemoryConnection {
    table: Arc<Mutex<Table>>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Provider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn identity_suffix(&self) -> &str {
        "; SELECT SCOPE_IDENTITY()"
    }

    async fn open(&self) -> Result<Box<dyn Connection>> {
        if self.offline {
            return Err(DalError::connection("memory", "server is offline"));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            table: Arc::clone(&self.table),
            closed: Arc::clone(&self.closed),
        }))
    }
}

fn param_text(command: &Command, name: &str) -> Option<String> {
    match command.find_parameter(name).map(|p| p.value.clone()) {
        Some(SqlValue::Text(s)) => Some(s),
        _ => None,
    }
}

fn param_id(command: &Command) -> Option<i64> {
    command
        .find_parameter("ID")
        .and_then(|p| p.value.as_identity())
}

#[async_trait]
impl Connection for MemoryConnection {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn execute_rows(&mut self, command: &Command) -> Result<Box<dyn RowCursor>> {
        let table = self.table.lock().unwrap();
        let filter = if command.text().contains("WHERE ID = @ID") {
            param_id(command)
        } else {
            None
        };

        let rows = table
            .rows
            .iter()
            .filter(|r| filter.map_or(true, |id| i64::from(r.id) == id))
            .map(|r| {
                vec![
                    SqlValue::I32(r.id),
                    // Fixed-width column padding
                    SqlValue::Text(format!("{:<20}", r.name)),
                    SqlValue::from(r.email.clone()),
                ]
            })
            .collect();

        Ok(Box::new(MemoryCursor::new(
            vec!["ID".into(), "Name".into(), "Email".into()],
            rows,
        )))
    }

    async fn execute_scalar(&mut self, command: &Command) -> Result<Option<SqlValue>> {
        let mut table = self.table.lock().unwrap();
        let text = command.text();

        if text.starts_with("INSERT INTO Employees") {
            table.next_id += 1;
            let id = table.next_id;
            table.rows.push(StoredRow {
                id,
                name: param_text(command, "Name").unwrap_or_default(),
                email: param_text(command, "Email"),
            });
            return Ok(Some(SqlValue::Decimal(Decimal::from(id))));
        }

        let id = param_id(command);
        if text.starts_with("UPDATE Employees") {
            let name = param_text(command, "Name");
            let email = param_text(command, "Email");
            for row in table.rows.iter_mut().filter(|r| Some(i64::from(r.id)) == id) {
                if text.contains("Name = @Name") {
                    row.name = name.clone().unwrap_or_default();
                }
                if text.contains("Email = @Email") {
                    row.email = email.clone();
                }
            }
        } else if text.starts_with("DELETE FROM Employees") {
            table.rows.retain(|r| Some(i64::from(r.id)) != id);
        } else {
            return Err(DalError::execution("memory", text, "unknown statement"));
        }

        Ok(Some(SqlValue::Null))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn repository() -> (SqlRepository, Arc<MemoryProvider>) {
    let provider = Arc::new(MemoryProvider::default());
    let repo = SqlRepository::new(Arc::clone(&provider) as Arc<dyn Provider>);
    (repo, provider)
}

fn jeremy() -> Employee {
    Employee {
        id: 0,
        name: "Jeremy Johnson".into(),
        email: Some("jmjohnson@x.us".into()),
    }
}

const INSERT: &str = "INSERT INTO Employees (Name, Email) VALUES (@Name, @Email);";
const SELECT_BY_ID: &str = "SELECT ID, Name, Email FROM Employees WHERE ID = @ID";

#[tokio::test]
async fn test_create_returns_generated_id() {
    let (repo, provider) = repository();

    let id = repo.create(INSERT, &jeremy()).await.unwrap();

    assert_eq!(id, 1);
    assert_eq!(provider.opened.load(Ordering::SeqCst), 1);
    assert_eq!(provider.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_create_read_update_delete() {
    let (repo, provider) = repository();
    let id = repo.create(INSERT, &jeremy()).await.unwrap();

    let found: Vec<Employee> = repo
        .read(SELECT_BY_ID, &[Parameter::new("@ID", id)])
        .await
        .unwrap();
    assert_eq!(
        found,
        vec![Employee {
            id: 1,
            name: "Jeremy Johnson".into(),
            email: Some("jmjohnson@x.us".into()),
        }]
    );

    let mut changed = found[0].clone();
    changed.email = Some("jeremy.johnson@x.us".into());
    let result = repo
        .update(
            "UPDATE Employees SET Email = @Email WHERE ID = @ID",
            Some(&changed),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(result, 0);

    let found: Vec<Employee> = repo
        .read(SELECT_BY_ID, &[Parameter::new("ID", 1)])
        .await
        .unwrap();
    assert_eq!(found[0].email.as_deref(), Some("jeremy.johnson@x.us"));
    assert_eq!(found[0].name, "Jeremy Johnson");

    repo.delete(
        "DELETE FROM Employees WHERE ID = @ID",
        None,
        &[Parameter::new("ID", id)],
    )
    .await
    .unwrap();

    let found: Vec<Employee> = repo
        .read(SELECT_BY_ID, &[Parameter::new("ID", id)])
        .await
        .unwrap();
    assert!(found.is_empty());

    // Every operation opened and closed its own connection.
    assert_eq!(provider.opened.load(Ordering::SeqCst), 6);
    assert_eq!(provider.closed.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_read_without_match_is_empty() {
    let (repo, _) = repository();

    let found: Vec<Employee> = repo
        .read(SELECT_BY_ID, &[Parameter::new("ID", 42)])
        .await
        .unwrap();

    assert!(found.is_empty());
}

#[tokio::test]
async fn test_read_dynamic_fills_prototype_keys() {
    let (repo, _) = repository();
    repo.create(INSERT, &jeremy()).await.unwrap();
    repo.create(
        INSERT,
        &Employee {
            id: 0,
            name: "Ana Lima".into(),
            email: None,
        },
    )
    .await
    .unwrap();

    let mut prototype = Dynamic::new();
    prototype.insert_property("Name", SqlValue::Null);
    prototype.insert_property("Email", SqlValue::Null);
    prototype.insert_property("Title", SqlValue::Null);

    let bags = repo
        .read_dynamic(&prototype, "SELECT ID, Name, Email FROM Employees", &[])
        .await
        .unwrap();

    assert_eq!(bags.len(), 2);
    assert_eq!(bags[0].get("Name"), Some(SqlValue::from("Jeremy Johnson")));
    assert_eq!(
        bags[0].get("Email"),
        Some(SqlValue::from("jmjohnson@x.us"))
    );
    // Not a prototype key
    assert!(!bags[0].contains("ID", false));
    // No such column
    assert!(!bags[0].contains("Title", false));
    // NULL leaves the key unset
    assert_eq!(bags[1].get("Name"), Some(SqlValue::from("Ana Lima")));
    assert!(!bags[1].contains("Email", false));
    // The prototype itself is untouched
    assert_eq!(prototype.get("Name"), Some(SqlValue::Null));
}

#[tokio::test]
async fn test_create_many_without_bulk_path_is_unsupported() {
    let (repo, provider) = repository();

    let err = repo
        .create_many(&[jeremy(), jeremy()], "Employees")
        .await
        .unwrap_err();

    assert!(matches!(err, DalError::Unsupported { .. }));
    assert_eq!(provider.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_statement_fails_and_closes() {
    let (repo, provider) = repository();

    let err = repo
        .update("MERGE Employees USING Staging", None, &[])
        .await
        .unwrap_err();

    assert!(matches!(err, DalError::Execution { .. }));
    assert_eq!(provider.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_is_available() {
    let (repo, _) = repository();
    assert!(repo.is_available().await);

    let offline = SqlRepository::new(Arc::new(MemoryProvider {
        offline: true,
        ..Default::default()
    }));
    assert!(!offline.is_available().await);

    let err = offline.create(INSERT, &jeremy()).await.unwrap_err();
    assert!(matches!(err, DalError::Connection { .. }));
}
