//! MySQL/MariaDB provider and connection over mysql_async.
//!
//! Statements run through the binary protocol (prepared statements), one
//! statement per round trip. `LAST_INSERT_ID()` is per-connection, so the
//! identity suffix still sees the preceding insert.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::prelude::*;
use mysql_async::{Column, Conn, Opts, OptsBuilder, Params, SslOpts, Value};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::MysqlDialect;
use crate::config::ProviderConfig;
use crate::core::placeholder::{rewrite, statements};
use crate::core::traits::{Command, Connection, Dialect, MemoryCursor, Provider, RowCursor};
use crate::core::value::SqlValue;
use crate::drivers::common::SslMode;
use crate::error::{DalError, Result};

const BACKEND: &str = "mysql";

/// Character set id MySQL reports for binary strings.
const BINARY_CHARSET: u16 = 63;

/// Opens MySQL connections.
pub struct MysqlProvider {
    config: ProviderConfig,
    identity_suffix: String,
    dialect: MysqlDialect,
}

impl MysqlProvider {
    /// Create a provider from connection settings.
    pub fn new(config: ProviderConfig) -> Self {
        let dialect = MysqlDialect::new();
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

    fn build_opts(&self) -> Result<Opts> {
        let ssl_opts = match SslMode::parse(&self.config.ssl_mode)? {
            SslMode::Disable => {
                warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
                None
            }
            SslMode::Require => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
            SslMode::VerifyCa => Some(SslOpts::default().with_danger_skip_domain_validation(true)),
            SslMode::VerifyFull => Some(SslOpts::default()),
        };

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(&self.config.host)
            .tcp_port(self.config.port()?)
            .db_name(Some(&self.config.database))
            .user(Some(&self.config.user))
            .pass(Some(&self.config.password))
            // Use utf8mb4 for full Unicode support
            .init(vec!["SET NAMES utf8mb4"]);

        if let Some(ssl) = ssl_opts {
            builder = builder.ssl_opts(ssl);
        }

        Ok(builder.into())
    }
}

#[async_trait]
impl Provider for MysqlProvider {
    fn name(&self) -> &str {
        BACKEND
    }

    fn identity_suffix(&self) -> &str {
        &self.identity_suffix
    }

    async fn open(&self) -> Result<Box<dyn Connection>> {
        let opts = self.build_opts()?;
        let timeout = Duration::from_secs(self.config.connect_timeout_secs);

        let conn = tokio::time::timeout(timeout, Conn::new(opts))
            .await
            .map_err(|_| {
                DalError::connection(
                    BACKEND,
                    format!("timed out after {}s", self.config.connect_timeout_secs),
                )
            })?
            .map_err(|e| DalError::connection(BACKEND, e))?;

        debug!(
            "Connected to MySQL: {}:{}/{}",
            self.config.host,
            self.config.port()?,
            self.config.database
        );
        Ok(Box::new(MysqlConnection {
            conn: Some(conn),
            dialect: self.dialect.clone(),
        }))
    }
}

/// Result of one statement: its columns and converted rows.
struct StatementResult {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

/// One open MySQL connection.
pub struct MysqlConnection {
    conn: Option<Conn>,
    dialect: MysqlDialect,
}

impl MysqlConnection {
    /// Run every statement of `command` in order.
    async fn run(&mut self, command: &Command) -> Result<Vec<StatementResult>> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DalError::connection(BACKEND, "connection is closed"))?;
        let mut results = Vec::new();

        for text in statements(command.text(), &self.dialect) {
            let bound = rewrite(text, command.parameters(), &self.dialect);
            let params = if bound.values.is_empty() {
                Params::Empty
            } else {
                Params::Positional(bound.values.iter().map(sql_value_to_mysql).collect())
            };

            let statement = conn
                .prep(bound.sql.as_str())
                .await
                .map_err(|e| DalError::execution(BACKEND, text, e))?;
            let columns: Vec<Column> = statement.columns().to_vec();
            let rows: Vec<mysql_async::Row> = conn
                .exec(&statement, params)
                .await
                .map_err(|e| DalError::execution(BACKEND, text, e))?;

            results.push(StatementResult {
                columns: columns.iter().map(|c| c.name_str().into_owned()).collect(),
                rows: rows
                    .into_iter()
                    .map(|row| {
                        row.unwrap()
                            .into_iter()
                            .zip(&columns)
                            .map(|(value, column)| mysql_to_sql_value(value, column))
                            .collect()
                    })
                    .collect(),
            });
        }

        Ok(results)
    }
}

#[async_trait]
impl Connection for MysqlConnection {
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
        match self.conn.take() {
            Some(conn) => conn
                .disconnect()
                .await
                .map_err(|e| DalError::connection(BACKEND, e)),
            None => Ok(()),
        }
    }
}

fn datetime_to_mysql(dt: &NaiveDateTime) -> Value {
    Value::Date(
        u16::try_from(dt.year()).unwrap_or_default(),
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
        dt.nanosecond() / 1_000,
    )
}

/// Convert SqlValue to mysql_async::Value.
fn sql_value_to_mysql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::Int(i64::from(*b)),
        SqlValue::I16(i) => Value::Int(i64::from(*i)),
        SqlValue::I32(i) => Value::Int(i64::from(*i)),
        SqlValue::I64(i) => Value::Int(*i),
        SqlValue::F32(f) => Value::Float(*f),
        SqlValue::F64(f) => Value::Double(*f),
        SqlValue::Text(s) => Value::Bytes(s.clone().into_bytes()),
        SqlValue::Bytes(b) => Value::Bytes(b.clone()),
        SqlValue::Uuid(u) => Value::Bytes(u.to_string().into_bytes()),
        SqlValue::Decimal(d) => Value::Bytes(d.to_string().into_bytes()),
        SqlValue::DateTime(dt) => datetime_to_mysql(dt),
        SqlValue::DateTimeOffset(dto) => datetime_to_mysql(&dto.naive_utc()),
        SqlValue::Date(d) => Value::Date(
            u16::try_from(d.year()).unwrap_or_default(),
            d.month() as u8,
            d.day() as u8,
            0,
            0,
            0,
            0,
        ),
        SqlValue::Time(t) => Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1_000,
        ),
    }
}

fn text_or_bytes(bytes: Vec<u8>) -> SqlValue {
    match String::from_utf8(bytes) {
        Ok(s) => SqlValue::Text(s),
        Err(e) => SqlValue::Bytes(e.into_bytes()),
    }
}

/// Convert a returned value to SqlValue based on the column type.
fn mysql_to_sql_value(value: Value, column: &Column) -> SqlValue {
    let column_type = column.column_type();

    match value {
        Value::NULL => SqlValue::Null,
        Value::Int(i) => match column_type {
            ColumnType::MYSQL_TYPE_TINY if column.column_length() == 1 => SqlValue::Bool(i != 0),
            ColumnType::MYSQL_TYPE_TINY | ColumnType::MYSQL_TYPE_SHORT => {
                i16::try_from(i).map_or(SqlValue::I64(i), SqlValue::I16)
            }
            ColumnType::MYSQL_TYPE_LONG | ColumnType::MYSQL_TYPE_INT24 => {
                i32::try_from(i).map_or(SqlValue::I64(i), SqlValue::I32)
            }
            _ => SqlValue::I64(i),
        },
        Value::UInt(u) => {
            i64::try_from(u).map_or_else(|_| SqlValue::Decimal(Decimal::from(u)), SqlValue::I64)
        }
        Value::Float(f) => SqlValue::F32(f),
        Value::Double(f) => SqlValue::F64(f),
        Value::Bytes(bytes) => match column_type {
            ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
                let parsed = std::str::from_utf8(&bytes)
                    .ok()
                    .and_then(|s| s.parse::<Decimal>().ok());
                match parsed {
                    Some(d) => SqlValue::Decimal(d),
                    None => text_or_bytes(bytes),
                }
            }
            ColumnType::MYSQL_TYPE_TINY_BLOB
            | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
            | ColumnType::MYSQL_TYPE_LONG_BLOB
            | ColumnType::MYSQL_TYPE_BLOB
            | ColumnType::MYSQL_TYPE_STRING
            | ColumnType::MYSQL_TYPE_VAR_STRING
            | ColumnType::MYSQL_TYPE_VARCHAR
                if column.flags().contains(ColumnFlags::BINARY_FLAG)
                    && column.character_set() == BINARY_CHARSET =>
            {
                SqlValue::Bytes(bytes)
            }
            _ => text_or_bytes(bytes),
        },
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let date = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day));
            if column_type == ColumnType::MYSQL_TYPE_DATE {
                return SqlValue::from(date);
            }
            SqlValue::from(date.and_then(|d| {
                d.and_hms_micro_opt(u32::from(hour), u32::from(minute), u32::from(second), micros)
            }))
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            if negative || days > 0 {
                let sign = if negative { "-" } else { "" };
                let total_hours = days * 24 + u32::from(hours);
                return SqlValue::Text(format!(
                    "{}{:02}:{:02}:{:02}.{:06}",
                    sign, total_hours, minutes, seconds, micros
                ));
            }
            SqlValue::from(NaiveTime::from_hms_micro_opt(
                u32::from(hours),
                u32::from(minutes),
                u32::from(seconds),
                micros,
            ))
        }
    }
}
