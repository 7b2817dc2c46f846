//! SQL Server provider and connection over Tiberius.
//!
//! Each [`MssqlProvider::open`] call dials a fresh TCP connection; there is
//! no pool. Commands go to the server as one batch, so the identity suffix
//! rides along with the insert in the same round trip.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{
    AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, IntoSql, Row, ToSql,
    TokenRow,
};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use super::MssqlDialect;
use crate::config::ProviderConfig;
use crate::core::placeholder::rewrite;
use crate::core::traits::{Command, Connection, Dialect, MemoryCursor, Provider, RowCursor};
use crate::core::value::SqlValue;
use crate::error::{DalError, Result};

const BACKEND: &str = "mssql";

type TiberiusClient = Client<Compat<TcpStream>>;

/// Opens SQL Server connections.
pub struct MssqlProvider {
    config: ProviderConfig,
    identity_suffix: String,
    dialect: MssqlDialect,
}

impl MssqlProvider {
    /// Create a provider from connection settings.
    pub fn new(config: ProviderConfig) -> Self {
        let dialect = MssqlDialect::new();
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

    fn build_config(&self) -> Result<Config> {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port()?);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        // Encryption settings
        if self.config.encrypt_enabled() {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        Ok(config)
    }

    async fn connect(&self) -> Result<TiberiusClient> {
        let config = self.build_config()?;
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| DalError::connection(BACKEND, e))?;
        tcp.set_nodelay(true).ok();

        Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| DalError::connection(BACKEND, e))
    }
}

#[async_trait]
impl Provider for MssqlProvider {
    fn name(&self) -> &str {
        BACKEND
    }

    fn identity_suffix(&self) -> &str {
        &self.identity_suffix
    }

    async fn open(&self) -> Result<Box<dyn Connection>> {
        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let client = tokio::time::timeout(timeout, self.connect())
            .await
            .map_err(|_| {
                DalError::connection(
                    BACKEND,
                    format!("timed out after {}s", self.config.connect_timeout_secs),
                )
            })??;

        debug!("Connected to MSSQL: {}:{}", self.config.host, self.config.port()?);
        Ok(Box::new(MssqlConnection {
            client: Some(client),
            dialect: self.dialect.clone(),
        }))
    }
}

/// One open SQL Server connection.
pub struct MssqlConnection {
    client: Option<TiberiusClient>,
    dialect: MssqlDialect,
}

impl MssqlConnection {
    fn client(&mut self) -> Result<&mut TiberiusClient> {
        self.client
            .as_mut()
            .ok_or_else(|| DalError::connection(BACKEND, "connection is closed"))
    }

    /// Run `command` and collect every result set it produces.
    async fn run(&mut self, command: &Command) -> Result<(Vec<String>, Vec<Vec<Row>>)> {
        let bound = rewrite(command.text(), command.parameters(), &self.dialect);
        let params: Vec<Box<dyn ToSql>> = bound.values.iter().map(sql_value_to_sql_param).collect();
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let client = self.client()?;
        let mut stream = client
            .query(bound.sql.as_str(), &param_refs)
            .await
            .map_err(|e| DalError::execution(BACKEND, command.text(), e))?;

        let columns = stream
            .columns()
            .await
            .map_err(|e| DalError::execution(BACKEND, command.text(), e))?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let results = stream
            .into_results()
            .await
            .map_err(|e| DalError::execution(BACKEND, command.text(), e))?;

        Ok((columns, results))
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn execute_rows(&mut self, command: &Command) -> Result<Box<dyn RowCursor>> {
        let (columns, results) = self.run(command).await?;

        let rows = results
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.into_iter().map(column_data_to_value).collect())
            .collect();

        Ok(Box::new(MemoryCursor::new(columns, rows)))
    }

    async fn execute_scalar(&mut self, command: &Command) -> Result<Option<SqlValue>> {
        let (_, results) = self.run(command).await?;

        // The identity suffix produces the last non-empty result set.
        Ok(results
            .into_iter()
            .rev()
            .find(|rows| !rows.is_empty())
            .and_then(|rows| rows.into_iter().next())
            .and_then(|row| row.into_iter().next())
            .map(column_data_to_value))
    }

    async fn bulk_insert(
        &mut self,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        let samples = column_samples(columns.len(), &rows);
        let target = self.dialect.quote_qualified(table);
        let client = self.client()?;

        let mut bulk_load = client
            .bulk_insert(&target)
            .await
            .map_err(|e| DalError::execution(BACKEND, format!("bulk insert into {} (init)", table), e))?;

        for row in rows {
            let mut token_row = TokenRow::new();
            for (idx, value) in row.into_iter().enumerate() {
                token_row.push(sql_value_to_column_data(value, samples.get(idx).copied().flatten()));
            }
            bulk_load.send(token_row).await.map_err(|e| {
                DalError::execution(BACKEND, format!("bulk insert into {} (send)", table), e)
            })?;
        }

        let result = bulk_load.finalize().await.map_err(|e| {
            DalError::execution(BACKEND, format!("bulk insert into {} (finalize)", table), e)
        })?;

        Ok(result.total())
    }

    async fn close(&mut self) -> Result<()> {
        match self.client.take() {
            Some(client) => client
                .close()
                .await
                .map_err(|e| DalError::connection(BACKEND, e)),
            None => Ok(()),
        }
    }
}

/// Kind of value carried by a column, used to type NULLs in a bulk load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    Text,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

impl ColumnKind {
    fn of(value: &SqlValue) -> Option<Self> {
        Some(match value {
            SqlValue::Null => return None,
            SqlValue::Bool(_) => ColumnKind::Bool,
            SqlValue::I16(_) => ColumnKind::I16,
            SqlValue::I32(_) => ColumnKind::I32,
            SqlValue::I64(_) => ColumnKind::I64,
            SqlValue::F32(_) => ColumnKind::F32,
            SqlValue::F64(_) => ColumnKind::F64,
            SqlValue::Text(_) => ColumnKind::Text,
            SqlValue::Bytes(_) => ColumnKind::Bytes,
            SqlValue::Uuid(_) => ColumnKind::Uuid,
            SqlValue::Decimal(_) => ColumnKind::Decimal,
            SqlValue::DateTime(_) => ColumnKind::DateTime,
            SqlValue::DateTimeOffset(_) => ColumnKind::DateTimeOffset,
            SqlValue::Date(_) => ColumnKind::Date,
            SqlValue::Time(_) => ColumnKind::Time,
        })
    }

    fn null(kind: Option<Self>) -> ColumnData<'static> {
        match kind {
            Some(ColumnKind::Bool) => ColumnData::Bit(None),
            Some(ColumnKind::I16) => ColumnData::I16(None),
            Some(ColumnKind::I32) => ColumnData::I32(None),
            Some(ColumnKind::I64) => ColumnData::I64(None),
            Some(ColumnKind::F32) => ColumnData::F32(None),
            Some(ColumnKind::F64) => ColumnData::F64(None),
            Some(ColumnKind::Bytes) => ColumnData::Binary(None),
            Some(ColumnKind::Uuid) => ColumnData::Guid(None),
            Some(ColumnKind::Decimal) => ColumnData::Numeric(None),
            Some(ColumnKind::DateTime) => ColumnData::DateTime2(None),
            Some(ColumnKind::DateTimeOffset) => ColumnData::DateTimeOffset(None),
            Some(ColumnKind::Date) => ColumnData::Date(None),
            Some(ColumnKind::Time) => ColumnData::Time(None),
            Some(ColumnKind::Text) | None => ColumnData::String(None),
        }
    }
}

/// First non-null kind seen in each column.
fn column_samples(width: usize, rows: &[Vec<SqlValue>]) -> Vec<Option<ColumnKind>> {
    (0..width)
        .map(|idx| {
            rows.iter()
                .filter_map(|row| row.get(idx))
                .find_map(ColumnKind::of)
        })
        .collect()
}

fn sql_value_to_sql_param(value: &SqlValue) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null => Box::new(Option::<String>::None),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::I16(i) => Box::new(*i),
        SqlValue::I32(i) => Box::new(*i),
        SqlValue::I64(i) => Box::new(*i),
        SqlValue::F32(f) => Box::new(*f),
        SqlValue::F64(f) => Box::new(*f),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(b.clone()),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Decimal(d) => Box::new(*d),
        SqlValue::DateTime(dt) => Box::new(*dt),
        SqlValue::DateTimeOffset(dto) => Box::new(*dto),
        SqlValue::Date(d) => Box::new(*d),
        SqlValue::Time(t) => Box::new(*t),
    }
}

fn sql_value_to_column_data(value: SqlValue, kind: Option<ColumnKind>) -> ColumnData<'static> {
    match value {
        SqlValue::Null => ColumnKind::null(kind),
        SqlValue::Bool(b) => ColumnData::Bit(Some(b)),
        SqlValue::I16(i) => ColumnData::I16(Some(i)),
        SqlValue::I32(i) => ColumnData::I32(Some(i)),
        SqlValue::I64(i) => ColumnData::I64(Some(i)),
        SqlValue::F32(f) => ColumnData::F32(f.is_finite().then_some(f)),
        SqlValue::F64(f) => ColumnData::F64(f.is_finite().then_some(f)),
        SqlValue::Text(s) => ColumnData::String(Some(Cow::Owned(s))),
        SqlValue::Bytes(b) => ColumnData::Binary(Some(Cow::Owned(b))),
        SqlValue::Uuid(u) => ColumnData::Guid(Some(u)),
        SqlValue::Decimal(d) => ColumnData::Numeric(Some(tiberius::numeric::Numeric::new_with_scale(
            d.mantissa(),
            d.scale() as u8,
        ))),
        SqlValue::DateTime(dt) => dt.into_sql(),
        SqlValue::DateTimeOffset(dto) => dto.into_sql(),
        SqlValue::Date(d) => d.into_sql(),
        SqlValue::Time(t) => t.into_sql(),
    }
}

/// Convert a returned column to a SqlValue.
fn column_data_to_value(data: ColumnData<'static>) -> SqlValue {
    match data {
        ColumnData::U8(v) => SqlValue::from(v.map(i16::from)),
        ColumnData::I16(v) => SqlValue::from(v),
        ColumnData::I32(v) => SqlValue::from(v),
        ColumnData::I64(v) => SqlValue::from(v),
        ColumnData::F32(v) => SqlValue::from(v),
        ColumnData::F64(v) => SqlValue::from(v),
        ColumnData::Bit(v) => SqlValue::from(v),
        ColumnData::String(v) => SqlValue::from(v.map(Cow::into_owned)),
        ColumnData::Guid(v) => SqlValue::from(v),
        ColumnData::Binary(v) => SqlValue::from(v.map(Cow::into_owned)),
        ColumnData::Numeric(v) => match v {
            Some(n) => Decimal::try_from_i128_with_scale(n.value(), u32::from(n.scale()))
                .map(SqlValue::Decimal)
                .unwrap_or_else(|_| SqlValue::F64(f64::from(n))),
            None => SqlValue::Null,
        },
        ColumnData::Xml(v) => SqlValue::from(v.map(|xml| xml.into_owned().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            SqlValue::from(NaiveDateTime::from_sql(&data).ok().flatten())
        }
        ColumnData::Date(_) => SqlValue::from(NaiveDate::from_sql(&data).ok().flatten()),
        ColumnData::Time(_) => SqlValue::from(NaiveTime::from_sql(&data).ok().flatten()),
        ColumnData::DateTimeOffset(_) => {
            SqlValue::from(DateTime::<FixedOffset>::from_sql(&data).ok().flatten())
        }
    }
}
