//! SQL value types for database-agnostic binding and materialization.
//!
//! [`SqlValue`] is the single currency exchanged between records, commands
//! and drivers. Each driver converts it to and from its native wire types.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::ser::{Serialize, Serializer};
use uuid::Uuid;

use crate::error::{DalError, Result};

/// SQL value enum for type-safe parameter and row handling.
///
/// `Null` is the driver-neutral NULL sentinel: binders emit it for absent
/// values and every driver translates it to its own native NULL.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SqlValue {
    /// SQL NULL.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// 16-bit signed integer (smallint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point (real/float4).
    F32(f32),

    /// 64-bit floating point (double precision/float8).
    F64(f64),

    /// Text/string data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// UUID/GUID value.
    Uuid(Uuid),

    /// Decimal value with arbitrary precision.
    Decimal(Decimal),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// SQL-flavoured name of the carried type, used in mapping errors.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "NULL",
            SqlValue::Bool(_) => "bool",
            SqlValue::I16(_) => "smallint",
            SqlValue::I32(_) => "int",
            SqlValue::I64(_) => "bigint",
            SqlValue::F32(_) => "real",
            SqlValue::F64(_) => "double",
            SqlValue::Text(_) => "text",
            SqlValue::Bytes(_) => "bytes",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::Decimal(_) => "decimal",
            SqlValue::DateTime(_) => "datetime",
            SqlValue::DateTimeOffset(_) => "datetimeoffset",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
        }
    }

    /// Trim leading/trailing whitespace from textual values.
    ///
    /// Non-textual values are returned unchanged.
    #[must_use]
    pub fn trimmed(self) -> Self {
        match self {
            SqlValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.len() == s.len() {
                    SqlValue::Text(s)
                } else {
                    SqlValue::Text(trimmed.to_string())
                }
            }
            other => other,
        }
    }

    /// Interpret a scalar result as a generated identifier.
    ///
    /// Integers of any width qualify, as do decimals without a fractional
    /// part (`SCOPE_IDENTITY()` is `numeric(38,0)`). Everything else,
    /// including NULL, yields `None`.
    #[must_use]
    pub fn as_identity(&self) -> Option<i64> {
        match self {
            SqlValue::I16(v) => Some(i64::from(*v)),
            SqlValue::I32(v) => Some(i64::from(*v)),
            SqlValue::I64(v) => Some(*v),
            SqlValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::I16(v) => write!(f, "{}", v),
            SqlValue::I32(v) => write!(f, "{}", v),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::F32(v) => write!(f, "{}", v),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::Text(v) => f.write_str(v),
            SqlValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            SqlValue::Uuid(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::DateTime(v) => write!(f, "{}", v),
            SqlValue::DateTimeOffset(v) => write!(f, "{}", v.to_rfc3339()),
            SqlValue::Date(v) => write!(f, "{}", v),
            SqlValue::Time(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(v) => serializer.serialize_bool(*v),
            SqlValue::I16(v) => serializer.serialize_i16(*v),
            SqlValue::I32(v) => serializer.serialize_i32(*v),
            SqlValue::I64(v) => serializer.serialize_i64(*v),
            SqlValue::F32(v) => serializer.serialize_f32(*v),
            SqlValue::F64(v) => serializer.serialize_f64(*v),
            SqlValue::Text(v) => serializer.serialize_str(v),
            SqlValue::Bytes(v) => serializer.serialize_bytes(v),
            other => serializer.collect_str(other),
        }
    }
}

macro_rules! impl_from_native {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(v: $ty) -> Self {
                    SqlValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_native! {
    bool => Bool,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    String => Text,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    Decimal => Decimal,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    NaiveDate => Date,
    NaiveTime => Time,
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<&[u8]> for SqlValue {
    fn from(v: &[u8]) -> Self {
        SqlValue::Bytes(v.to_vec())
    }
}

/// `None` is the absent value and becomes SQL NULL.
impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// Read a [`SqlValue`] back into a typed record field.
///
/// Conversions are limited to what is lossless: integer widths convert when
/// the value fits, `f32` widens to `f64`, integers widen into `Decimal`.
/// On mismatch the rejected value is handed back so the caller can report it.
pub trait FromSqlValue: Sized {
    /// Convert, or return the rejected value.
    fn from_sql_value(value: SqlValue) -> std::result::Result<Self, SqlValue>;
}

impl FromSqlValue for SqlValue {
    fn from_sql_value(value: SqlValue) -> std::result::Result<Self, SqlValue> {
        Ok(value)
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: SqlValue) -> std::result::Result<Self, SqlValue> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}

macro_rules! impl_from_sql_int {
    ($($ty:ty),*) => {
        $(
            impl FromSqlValue for $ty {
                fn from_sql_value(value: SqlValue) -> std::result::Result<Self, SqlValue> {
                    let converted = match &value {
                        SqlValue::I16(v) => <$ty>::try_from(*v).ok(),
                        SqlValue::I32(v) => <$ty>::try_from(*v).ok(),
                        SqlValue::I64(v) => <$ty>::try_from(*v).ok(),
                        _ => None,
                    };
                    converted.ok_or(value)
                }
            }
        )*
    };
}

impl_from_sql_int!(i16, i32, i64);

macro_rules! impl_from_sql_exact {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromSqlValue for $ty {
                fn from_sql_value(value: SqlValue) -> std::result::Result<Self, SqlValue> {
                    match value {
                        SqlValue::$variant(v) => Ok(v),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

impl_from_sql_exact! {
    bool => Bool,
    f32 => F32,
    String => Text,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    NaiveDate => Date,
    NaiveTime => Time,
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: SqlValue) -> std::result::Result<Self, SqlValue> {
        match value {
            SqlValue::F64(v) => Ok(v),
            SqlValue::F32(v) => Ok(f64::from(v)),
            other => Err(other),
        }
    }
}

impl FromSqlValue for Decimal {
    fn from_sql_value(value: SqlValue) -> std::result::Result<Self, SqlValue> {
        match value {
            SqlValue::Decimal(v) => Ok(v),
            SqlValue::I16(v) => Ok(Decimal::from(v)),
            SqlValue::I32(v) => Ok(Decimal::from(v)),
            SqlValue::I64(v) => Ok(Decimal::from(v)),
            other => Err(other),
        }
    }
}

/// Convert a value for the named field, producing a `Mapping` error on mismatch.
pub fn convert_field<T: FromSqlValue>(field: &str, value: SqlValue) -> Result<T> {
    T::from_sql_value(value).map_err(|rejected| DalError::Mapping {
        field: field.to_string(),
        expected: std::any::type_name::<T>(),
        found: rejected.type_name(),
    })
}
