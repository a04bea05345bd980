//! Owned SQL values and rows.
//!
//! The executor seam deals in [`SqlValue`] parameters and [`SqlRow`] results
//! instead of driver types, so the migration engine (and any fake executor
//! standing in for PostgreSQL in tests) never touches `may_postgres::Row`.
//!
//! Converting parameters for `may_postgres` follows a two-pass pattern:
//! 1. First pass: collect all values into typed vectors
//! 2. Second pass: create references to the stored values
//!
//! This pattern ensures that references remain valid within the closure scope.

use crate::executor::DbError;
use chrono::NaiveDateTime;
use may_postgres::types::{ToSql, Type};
use may_postgres::Row;
use serde::Serialize;
use std::fmt;

/// A single bindable / decodable SQL value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Double(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    /// Integer view of any integer variant
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::SmallInt(v) => Some(i64::from(*v)),
            SqlValue::Int(v) => Some(i64::from(*v)),
            SqlValue::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            SqlValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{b}"),
            SqlValue::SmallInt(i) => write!(f, "{i}"),
            SqlValue::Int(i) => write!(f, "{i}"),
            SqlValue::BigInt(i) => write!(f, "{i}"),
            SqlValue::Double(d) => write!(f, "{d}"),
            SqlValue::Text(s) => write!(f, "{s}"),
            SqlValue::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i16> for SqlValue {
    fn from(value: i16) -> Self {
        SqlValue::SmallInt(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::BigInt(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Double(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// A decoded result row: column names paired with owned values
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SqlRow {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl SqlRow {
    /// Build a row from `(column, value)` pairs
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = (S, SqlValue)>,
        S: Into<String>,
    {
        let (columns, values) = cells
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .unzip();
        Self { columns, values }
    }

    /// Value of the named column, if present
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    #[must_use]
    pub fn get_index(&self, idx: usize) -> Option<&SqlValue> {
        self.values.get(idx)
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Convert [`SqlValue`] parameters to `may_postgres` `ToSql` parameters.
///
/// The closure receives the converted parameters; references into the typed
/// vectors are only valid inside it.
///
/// # Errors
///
/// Returns whatever the closure returns.
pub fn with_converted_params<F, R>(values: &[SqlValue], f: F) -> Result<R, DbError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, DbError>,
{
    let mut bools: Vec<bool> = Vec::new();
    let mut small_ints: Vec<i16> = Vec::new();
    let mut ints: Vec<i32> = Vec::new();
    let mut big_ints: Vec<i64> = Vec::new();
    let mut doubles: Vec<f64> = Vec::new();
    let mut strings: Vec<String> = Vec::new();
    let mut timestamps: Vec<NaiveDateTime> = Vec::new();
    let mut nulls: Vec<Option<i32>> = Vec::new();

    // First pass: collect all values into typed vectors
    for value in values {
        match value {
            SqlValue::Null => nulls.push(None),
            SqlValue::Bool(b) => bools.push(*b),
            SqlValue::SmallInt(i) => small_ints.push(*i),
            SqlValue::Int(i) => ints.push(*i),
            SqlValue::BigInt(i) => big_ints.push(*i),
            SqlValue::Double(d) => doubles.push(*d),
            SqlValue::Text(s) => strings.push(s.clone()),
            SqlValue::Timestamp(ts) => timestamps.push(*ts),
        }
    }

    // Second pass: create references to the stored values
    let (mut bool_idx, mut small_idx, mut int_idx, mut big_idx) = (0, 0, 0, 0);
    let (mut double_idx, mut string_idx, mut ts_idx, mut null_idx) = (0, 0, 0, 0);

    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(values.len());

    for value in values {
        match value {
            SqlValue::Null => {
                params.push(&nulls[null_idx]);
                null_idx += 1;
            }
            SqlValue::Bool(_) => {
                params.push(&bools[bool_idx]);
                bool_idx += 1;
            }
            SqlValue::SmallInt(_) => {
                params.push(&small_ints[small_idx]);
                small_idx += 1;
            }
            SqlValue::Int(_) => {
                params.push(&ints[int_idx]);
                int_idx += 1;
            }
            SqlValue::BigInt(_) => {
                params.push(&big_ints[big_idx]);
                big_idx += 1;
            }
            SqlValue::Double(_) => {
                params.push(&doubles[double_idx]);
                double_idx += 1;
            }
            SqlValue::Text(_) => {
                params.push(&strings[string_idx]);
                string_idx += 1;
            }
            SqlValue::Timestamp(_) => {
                params.push(&timestamps[ts_idx]);
                ts_idx += 1;
            }
        }
    }

    f(&params)
}

fn decode_cell(row: &Row, idx: usize, ty: &Type) -> Result<SqlValue, may_postgres::Error> {
    let value: SqlValue = if *ty == Type::BOOL {
        row.try_get::<usize, Option<bool>>(idx)?.into()
    } else if *ty == Type::INT2 {
        row.try_get::<usize, Option<i16>>(idx)?.into()
    } else if *ty == Type::INT4 {
        row.try_get::<usize, Option<i32>>(idx)?.into()
    } else if *ty == Type::INT8 {
        row.try_get::<usize, Option<i64>>(idx)?.into()
    } else if *ty == Type::FLOAT4 {
        row.try_get::<usize, Option<f32>>(idx)?
            .map(f64::from)
            .into()
    } else if *ty == Type::FLOAT8 {
        row.try_get::<usize, Option<f64>>(idx)?.into()
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<usize, Option<NaiveDateTime>>(idx)?.into()
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<usize, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map(|ts| ts.naive_utc())
            .into()
    } else {
        // TEXT, VARCHAR, BPCHAR, NAME and anything else with a text decoding
        row.try_get::<usize, Option<String>>(idx)?.into()
    };
    Ok(value)
}

/// Decode a driver row into an owned [`SqlRow`]
///
/// # Errors
///
/// Returns `DbError::Parse` when a column type has no supported decoding.
pub fn decode_row(row: &Row) -> Result<SqlRow, DbError> {
    let mut cells = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_cell(row, idx, column.type_()).map_err(|e| {
            DbError::Parse(format!(
                "Failed to decode column '{}' ({}): {e}",
                column.name(),
                column.type_()
            ))
        })?;
        cells.push((column.name().to_string(), value));
    }
    Ok(SqlRow::new(cells))
}
