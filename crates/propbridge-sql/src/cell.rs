//! Result cell decoding
//!
//! Each backend reports a type name per value; the name picks the Rust type
//! the cell is read as and how it is rendered into JSON:
//!
//! | Cell | JSON |
//! |---|---|
//! | integers | number |
//! | floats, decimals | number (`null` for NaN) |
//! | booleans | bool |
//! | text, enums, UUIDs | string |
//! | JSON documents | the document |
//! | dates, times, timestamps | ISO 8601 string |
//! | binary | base64 string |
//!
//! A type with no mapping fails the fetch with a decode error naming the
//! column, so no cell is ever dropped silently.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use propbridge_core::{Error, Record, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Number, Value};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Row, TypeInfo, ValueRef};
use uuid::Uuid;

/// How a non-null value is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellKind {
    Bool,
    Int16,
    Int32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Decimal,
    Text,
    Uuid,
    Json,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Bytes,
}

impl CellKind {
    /// SQLite storage classes
    pub(crate) fn sqlite(type_name: &str) -> Option<CellKind> {
        match type_name {
            "INTEGER" => Some(CellKind::Int64),
            "REAL" => Some(CellKind::Float64),
            "TEXT" => Some(CellKind::Text),
            "BLOB" => Some(CellKind::Bytes),
            _ => None,
        }
    }

    /// Postgres type names as sqlx displays them
    pub(crate) fn postgres(type_name: &str) -> Option<CellKind> {
        match type_name {
            "BOOL" => Some(CellKind::Bool),
            "INT2" => Some(CellKind::Int16),
            "INT4" => Some(CellKind::Int32),
            "INT8" => Some(CellKind::Int64),
            "FLOAT4" => Some(CellKind::Float32),
            "FLOAT8" => Some(CellKind::Float64),
            "NUMERIC" => Some(CellKind::Decimal),
            "TEXT" | "VARCHAR" | "CHAR" | "NAME" | "UNKNOWN" | "citext" => Some(CellKind::Text),
            "UUID" => Some(CellKind::Uuid),
            "JSON" | "JSONB" => Some(CellKind::Json),
            "DATE" => Some(CellKind::Date),
            "TIME" => Some(CellKind::Time),
            "TIMESTAMP" => Some(CellKind::Timestamp),
            "TIMESTAMPTZ" => Some(CellKind::TimestampTz),
            "BYTEA" => Some(CellKind::Bytes),
            _ => None,
        }
    }

    /// MySQL column types as sqlx displays them
    pub(crate) fn mysql(type_name: &str) -> Option<CellKind> {
        match type_name {
            "BOOLEAN" => Some(CellKind::Bool),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => Some(CellKind::Int64),
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" => Some(CellKind::UInt64),
            "FLOAT" => Some(CellKind::Float32),
            "DOUBLE" => Some(CellKind::Float64),
            "DECIMAL" => Some(CellKind::Decimal),
            "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" => {
                Some(CellKind::Text)
            }
            "JSON" => Some(CellKind::Json),
            "DATE" => Some(CellKind::Date),
            "TIME" => Some(CellKind::Time),
            "DATETIME" => Some(CellKind::Timestamp),
            "TIMESTAMP" => Some(CellKind::TimestampTz),
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                Some(CellKind::Bytes)
            }
            _ => None,
        }
    }
}

pub(crate) fn decode_sqlite_row(row: &SqliteRow) -> Result<Record> {
    decode_row(row, |index, column, type_name| {
        let kind = CellKind::sqlite(type_name).ok_or_else(|| undecodable(column, type_name))?;
        let value = match kind {
            CellKind::Int64 => row.try_get::<i64, _>(index).map(Value::from),
            CellKind::Float64 => row.try_get::<f64, _>(index).map(float_value),
            CellKind::Text => row.try_get::<String, _>(index).map(Value::String),
            CellKind::Bytes => row.try_get::<Vec<u8>, _>(index).map(bytes_value),
            _ => return Err(undecodable(column, type_name)),
        };
        value.map_err(|e| decode_failed(column, e))
    })
}

pub(crate) fn decode_postgres_row(row: &PgRow) -> Result<Record> {
    decode_row(row, |index, column, type_name| {
        let kind = CellKind::postgres(type_name).ok_or_else(|| undecodable(column, type_name))?;
        let value = match kind {
            CellKind::Bool => row.try_get::<bool, _>(index).map(Value::Bool),
            CellKind::Int16 => row.try_get::<i16, _>(index).map(Value::from),
            CellKind::Int32 => row.try_get::<i32, _>(index).map(Value::from),
            CellKind::Int64 => row.try_get::<i64, _>(index).map(Value::from),
            CellKind::Float32 => row
                .try_get::<f32, _>(index)
                .map(|f| float_value(f64::from(f))),
            CellKind::Float64 => row.try_get::<f64, _>(index).map(float_value),
            CellKind::Decimal => row.try_get::<Decimal, _>(index).map(decimal_value),
            CellKind::Text => row.try_get::<String, _>(index).map(Value::String),
            CellKind::Uuid => row
                .try_get::<Uuid, _>(index)
                .map(|uuid| Value::String(uuid.to_string())),
            CellKind::Json => row.try_get::<Value, _>(index),
            CellKind::Date => row.try_get::<NaiveDate, _>(index).map(date_value),
            CellKind::Time => row.try_get::<NaiveTime, _>(index).map(time_value),
            CellKind::Timestamp => row.try_get::<NaiveDateTime, _>(index).map(timestamp_value),
            CellKind::TimestampTz => row
                .try_get::<DateTime<Utc>, _>(index)
                .map(timestamptz_value),
            CellKind::Bytes => row.try_get::<Vec<u8>, _>(index).map(bytes_value),
            CellKind::UInt64 => return Err(undecodable(column, type_name)),
        };
        value.map_err(|e| decode_failed(column, e))
    })
}

pub(crate) fn decode_mysql_row(row: &MySqlRow) -> Result<Record> {
    decode_row(row, |index, column, type_name| {
        let kind = CellKind::mysql(type_name).ok_or_else(|| undecodable(column, type_name))?;
        let value = match kind {
            CellKind::Bool => row.try_get::<bool, _>(index).map(Value::Bool),
            CellKind::Int64 => row.try_get::<i64, _>(index).map(Value::from),
            CellKind::UInt64 => row.try_get::<u64, _>(index).map(Value::from),
            CellKind::Float32 => row
                .try_get::<f32, _>(index)
                .map(|f| float_value(f64::from(f))),
            CellKind::Float64 => row.try_get::<f64, _>(index).map(float_value),
            CellKind::Decimal => row.try_get::<Decimal, _>(index).map(decimal_value),
            CellKind::Text => row.try_get::<String, _>(index).map(Value::String),
            CellKind::Json => row.try_get::<Value, _>(index),
            CellKind::Date => row.try_get::<NaiveDate, _>(index).map(date_value),
            CellKind::Time => row.try_get::<NaiveTime, _>(index).map(time_value),
            CellKind::Timestamp => row.try_get::<NaiveDateTime, _>(index).map(timestamp_value),
            CellKind::TimestampTz => row
                .try_get::<DateTime<Utc>, _>(index)
                .map(timestamptz_value),
            CellKind::Bytes => row.try_get::<Vec<u8>, _>(index).map(bytes_value),
            CellKind::Int16 | CellKind::Int32 | CellKind::Uuid => {
                return Err(undecodable(column, type_name));
            }
        };
        value.map_err(|e| decode_failed(column, e))
    })
}

/// Walk the columns of `row`, handing every non-null cell to `decode_cell`
/// with its index, column name and the type name the backend reports
fn decode_row<R, F>(row: &R, mut decode_cell: F) -> Result<Record>
where
    R: Row,
    usize: ColumnIndex<R>,
    F: FnMut(usize, &str, &str) -> Result<Value>,
{
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let raw = row
            .try_get_raw(index)
            .map_err(|e| decode_failed(name, e))?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            decode_cell(index, name, &type_name)?
        };
        record.insert(name.to_string(), value);
    }
    Ok(record)
}

pub(crate) fn undecodable(column: &str, type_name: &str) -> Error {
    Error::decode(format!(
        "Cannot decode column {} of type {}",
        column, type_name
    ))
}

fn decode_failed(column: &str, err: sqlx::Error) -> Error {
    Error::decode(format!("Cannot decode column {}: {}", column, err))
}

pub(crate) fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Whole decimals become integers when they fit, everything else a float
pub(crate) fn decimal_value(d: Decimal) -> Value {
    if d.scale() == 0 {
        if let Some(i) = d.to_i64() {
            return Value::from(i);
        }
    }
    match d.to_f64() {
        Some(f) => float_value(f),
        None => Value::String(d.to_string()),
    }
}

fn date_value(date: NaiveDate) -> Value {
    Value::String(date.format("%Y-%m-%d").to_string())
}

fn time_value(time: NaiveTime) -> Value {
    Value::String(time.format("%H:%M:%S%.f").to_string())
}

pub(crate) fn timestamp_value(ts: NaiveDateTime) -> Value {
    Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

pub(crate) fn timestamptz_value(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339())
}

pub(crate) fn bytes_value(bytes: Vec<u8>) -> Value {
    Value::String(BASE64.encode(bytes))
}
