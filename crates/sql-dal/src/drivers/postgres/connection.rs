//! PostgreSQL provider and connection over tokio-postgres.
//!
//! The extended query protocol carries one statement per round trip, so a
//! `;`-separated batch is split and run statement by statement on the same
//! connection.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type, WrongType};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use super::PostgresDialect;
use crate::config::ProviderConfig;
use crate::core::placeholder::{rewrite, statements};
use crate::core::traits::{Command, Connection, Dialect, MemoryCursor, Provider, RowCursor};
use crate::core::value::SqlValue;
use crate::drivers::common::TlsBuilder;
use crate::error::{DalError, Result};

const BACKEND: &str = "postgres";

/// Opens PostgreSQL connections.
pub struct PostgresProvider {
    config: ProviderConfig,
    identity_suffix: String,
    dialect: PostgresDialect,
}

impl PostgresProvider {
    /// Create a provider from connection settings.
    pub fn new(config: ProviderConfig) -> Self {
        let dialect = PostgresDialect::new();
        let identity_suffix = config
            .identity_suffix
            .clone()
            .unwrap_or_else(|| dialect.default_identity_suffix().to_string());
        Self {
            config,
            identity_suffix,
            dialect,
        }
    }

    fn build_config(&self) -> Result<tokio_postgres::Config> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&self.config.host)
            .port(self.config.port()?)
            .dbname(&self.config.database)
            .user(&self.config.user)
            .password(&self.config.password)
            .connect_timeout(Duration::from_secs(self.config.connect_timeout_secs));
        Ok(pg_config)
    }
}

#[async_trait]
impl Provider for PostgresProvider {
    fn name(&self) -> &str {
        BACKEND
    }

    fn identity_suffix(&self) -> &str {
        &self.identity_suffix
    }

    async fn open(&self) -> Result<Box<dyn Connection>> {
        let pg_config = self.build_config()?;
        let tls = TlsBuilder::parse(&self.config.ssl_mode)?.build()?;

        let client = match tls {
            Some(tls) => {
                let (client, connection) = pg_config
                    .connect(tls)
                    .await
                    .map_err(|e| DalError::connection(BACKEND, e))?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        warn!("PostgreSQL connection error: {}", e);
                    }
                });
                client
            }
            None => {
                let (client, connection) = pg_config
                    .connect(NoTls)
                    .await
                    .map_err(|e| DalError::connection(BACKEND, e))?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        warn!("PostgreSQL connection error: {}", e);
                    }
                });
                client
            }
        };

        debug!("Connected to PostgreSQL: {}:{}", self.config.host, self.config.port()?);
        Ok(Box::new(PostgresConnection {
            client: Some(client),
            dialect: self.dialect.clone(),
        }))
    }
}

/// Result of one statement: its columns and converted rows.
struct StatementResult {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

/// One open PostgreSQL connection.
pub struct PostgresConnection {
    client: Option<Client>,
    dialect: PostgresDialect,
}

impl PostgresConnection {
    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| DalError::connection(BACKEND, "connection is closed"))
    }

    /// Run every statement of `command` in order.
    async fn run(&self, command: &Command) -> Result<Vec<StatementResult>> {
        let client = self.client()?;
        let mut results = Vec::new();

        for text in statements(command.text(), &self.dialect) {
            let bound = rewrite(text, command.parameters(), &self.dialect);
            let params: Vec<&(dyn ToSql + Sync)> = bound
                .values
                .iter()
                .map(|v| v as &(dyn ToSql + Sync))
                .collect();

            let statement = client
                .prepare(&bound.sql)
                .await
                .map_err(|e| DalError::execution(BACKEND, text, e))?;
            let rows = client
                .query(&statement, &params)
                .await
                .map_err(|e| DalError::execution(BACKEND, text, e))?;

            let types: Vec<Type> = statement
                .columns()
                .iter()
                .map(|c| c.type_().clone())
                .collect();
            results.push(StatementResult {
                columns: statement
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect(),
                rows: rows
                    .iter()
                    .map(|row| {
                        types
                            .iter()
                            .enumerate()
                            .map(|(idx, ty)| convert_pg_row_value(row, idx, ty))
                            .collect()
                    })
                    .collect(),
            });
        }

        Ok(results)
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn execute_rows(&mut self, command: &Command) -> Result<Box<dyn RowCursor>> {
        let result = self
            .run(command)
            .await?
            .into_iter()
            .rev()
            .find(|r| !r.columns.is_empty());

        Ok(Box::new(match result {
            Some(r) => MemoryCursor::new(r.columns, r.rows),
            None => MemoryCursor::default(),
        }))
    }

    async fn execute_scalar(&mut self, command: &Command) -> Result<Option<SqlValue>> {
        Ok(self
            .run(command)
            .await?
            .into_iter()
            .rev()
            .find(|r| !r.rows.is_empty())
            .and_then(|r| r.rows.into_iter().next())
            .and_then(|row| row.into_iter().next()))
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the client ends the spawned connection task.
        self.client.take();
        Ok(())
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Option<T> {
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}

/// Convert a row value to SqlValue based on the column type.
fn convert_pg_row_value(row: &Row, idx: usize, ty: &Type) -> SqlValue {
    match ty.name() {
        "bool" => SqlValue::from(get::<bool>(row, idx)),
        "int2" => SqlValue::from(get::<i16>(row, idx)),
        "int4" => SqlValue::from(get::<i32>(row, idx)),
        "int8" => SqlValue::from(get::<i64>(row, idx)),
        "oid" => SqlValue::from(get::<u32>(row, idx).map(i64::from)),
        "float4" => SqlValue::from(get::<f32>(row, idx)),
        "float8" => SqlValue::from(get::<f64>(row, idx)),
        "numeric" => SqlValue::from(get::<Decimal>(row, idx)),
        "uuid" => SqlValue::from(get::<Uuid>(row, idx)),
        "timestamp" => SqlValue::from(get::<NaiveDateTime>(row, idx)),
        "timestamptz" => SqlValue::from(get::<DateTime<FixedOffset>>(row, idx)),
        "date" => SqlValue::from(get::<NaiveDate>(row, idx)),
        "time" => SqlValue::from(get::<NaiveTime>(row, idx)),
        "bytea" => SqlValue::from(get::<Vec<u8>>(row, idx)),
        "json" | "jsonb" => SqlValue::from(get::<serde_json::Value>(row, idx).map(|v| v.to_string())),
        // Default: treat as string
        _ => SqlValue::from(get::<String>(row, idx)),
    }
}

type ToSqlResult = std::result::Result<IsNull, Box<dyn StdError + Sync + Send>>;

/// Write an integer in the width the server inferred for the parameter.
fn int_to_sql(v: i64, ty: &Type, out: &mut BytesMut) -> ToSqlResult {
    match ty.name() {
        "int2" => i16::try_from(v)?.to_sql(ty, out),
        "int4" => i32::try_from(v)?.to_sql(ty, out),
        "oid" => u32::try_from(v)?.to_sql(ty, out),
        "float4" => (v as f32).to_sql(ty, out),
        "float8" => (v as f64).to_sql(ty, out),
        "numeric" => Decimal::from(v).to_sql(ty, out),
        "bool" => (v != 0).to_sql(ty, out),
        "text" | "varchar" | "bpchar" | "name" => v.to_string().to_sql(ty, out),
        _ => v.to_sql(ty, out),
    }
}

/// Parse text into the type the server inferred for the parameter.
///
/// Command-line parameters always arrive as text, so `"7"` against an `int4`
/// placeholder goes out as the integer 7. Types with no text parse are a
/// [`WrongType`] error.
fn text_to_sql(v: &str, ty: &Type, out: &mut BytesMut) -> ToSqlResult {
    if <String as ToSql>::accepts(ty) {
        return v.to_sql(ty, out);
    }

    let s = v.trim();
    match ty.name() {
        "int2" | "int4" | "int8" | "oid" => int_to_sql(s.parse::<i64>()?, ty, out),
        "float4" => s.parse::<f32>()?.to_sql(ty, out),
        "float8" => s.parse::<f64>()?.to_sql(ty, out),
        "numeric" => s.parse::<Decimal>()?.to_sql(ty, out),
        "bool" => parse_bool(s)?.to_sql(ty, out),
        "uuid" => s.parse::<Uuid>()?.to_sql(ty, out),
        "date" => s.parse::<NaiveDate>()?.to_sql(ty, out),
        "time" => s.parse::<NaiveTime>()?.to_sql(ty, out),
        "timestamp" => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))?
            .to_sql(ty, out),
        "timestamptz" => DateTime::parse_from_rfc3339(s)?.to_sql(ty, out),
        "json" | "jsonb" => serde_json::from_str::<serde_json::Value>(v)?.to_sql(ty, out),
        _ => Err(Box::new(WrongType::new::<String>(ty.clone()))),
    }
}

fn parse_bool(s: &str) -> std::result::Result<bool, Box<dyn StdError + Sync + Send>> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Ok(false),
        _ => Err(format!("invalid boolean '{}'", s).into()),
    }
}

/// Parameters bind by the type the server inferred for each placeholder.
impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> ToSqlResult {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::I16(v) => int_to_sql(i64::from(*v), ty, out),
            SqlValue::I32(v) => int_to_sql(i64::from(*v), ty, out),
            SqlValue::I64(v) => int_to_sql(*v, ty, out),
            SqlValue::F32(v) => match ty.name() {
                "float8" => f64::from(*v).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            SqlValue::F64(v) => match ty.name() {
                "float4" => (*v as f32).to_sql(ty, out),
                "numeric" => Decimal::try_from(*v)?.to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            SqlValue::Text(v) => text_to_sql(v, ty, out),
            SqlValue::Bytes(v) => v.to_sql(ty, out),
            SqlValue::Uuid(v) => v.to_sql(ty, out),
            SqlValue::Decimal(v) => v.to_sql(ty, out),
            SqlValue::DateTime(v) => v.to_sql(ty, out),
            SqlValue::DateTimeOffset(v) => v.to_sql(ty, out),
            SqlValue::Date(v) => v.to_sql(ty, out),
            SqlValue::Time(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        crate::config::Config::from_yaml(
            "provider:\n  type: postgres\n  host: localhost\n  database: company\n  user: app\n  ssl_mode: disable\n",
        )
        .unwrap()
        .provider
    }

    #[test]
    fn test_no_default_identity_suffix() {
        assert_eq!(PostgresProvider::new(config()).identity_suffix(), "");
    }

    #[test]
    fn test_build_config_uses_default_port() {
        let pg_config = PostgresProvider::new(config()).build_config().unwrap();
        assert_eq!(pg_config.get_ports(), &[5432]);
        assert_eq!(pg_config.get_dbname(), Some("company"));
    }

    #[test]
    fn test_null_binds_as_sql_null() {
        let mut out = BytesMut::new();
        let is_null = SqlValue::Null.to_sql(&Type::INT4, &mut out).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(out.is_empty());
    }

    #[test]
    fn test_integers_narrow_to_parameter_type() {
        let mut out = BytesMut::new();
        SqlValue::I64(7).to_sql(&Type::INT4, &mut out).unwrap();
        assert_eq!(out.len(), 4);

        let mut out = BytesMut::new();
        assert!(SqlValue::I64(i64::MAX).to_sql(&Type::INT2, &mut out).is_err());
    }

    #[test]
    fn test_text_parses_into_inferred_type() {
        let mut out = BytesMut::new();
        SqlValue::from("7").to_sql_checked(&Type::INT4, &mut out).unwrap();
        assert_eq!(&out[..], &[0, 0, 0, 7]);

        let mut out = BytesMut::new();
        SqlValue::from(" 42 ").to_sql(&Type::INT8, &mut out).unwrap();
        assert_eq!(&out[..], &42i64.to_be_bytes());

        let mut out = BytesMut::new();
        SqlValue::from("true").to_sql(&Type::BOOL, &mut out).unwrap();
        assert_eq!(&out[..], &[1]);

        let mut out = BytesMut::new();
        SqlValue::from("12.50").to_sql(&Type::NUMERIC, &mut out).unwrap();
        assert!(!out.is_empty());

        let mut out = BytesMut::new();
        SqlValue::from("67e55044-10b1-426f-9247-bb680e5fe0c8")
            .to_sql(&Type::UUID, &mut out)
            .unwrap();
        assert_eq!(out.len(), 16);

        let mut out = BytesMut::new();
        SqlValue::from("2024-03-01").to_sql(&Type::DATE, &mut out).unwrap();
        assert_eq!(out.len(), 4);

        let mut out = BytesMut::new();
        SqlValue::from("2024-03-01 08:30:00").to_sql(&Type::TIMESTAMP, &mut out).unwrap();
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn test_text_stays_text_for_character_types() {
        for ty in [Type::TEXT, Type::VARCHAR, Type::BPCHAR] {
            let mut out = BytesMut::new();
            SqlValue::from("7").to_sql(&ty, &mut out).unwrap();
            assert_eq!(&out[..], b"7");
        }
    }

    #[test]
    fn test_unparseable_text_is_rejected() {
        let mut out = BytesMut::new();
        assert!(SqlValue::from("seven").to_sql(&Type::INT4, &mut out).is_err());
        assert!(SqlValue::from("maybe").to_sql(&Type::BOOL, &mut out).is_err());

        let err = SqlValue::from("(1,2)").to_sql(&Type::POINT, &mut out).err().unwrap();
        assert!(err.downcast_ref::<WrongType>().is_some());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let mut cfg = config();
        cfg.host = "127.0.0.1".into();
        cfg.port = Some(1);
        cfg.connect_timeout_secs = 1;

        let err = PostgresProvider::new(cfg).open().await.err().unwrap();
        assert!(matches!(err, DalError::Connection { .. }));
    }
}
