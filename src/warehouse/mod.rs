//! Warehouse gateway: the only place SQL rows turn into typed records.
//!
//! Engines talk to a [`Warehouse`] through three primitives (`fetch`,
//! `bulk_insert`, `merge`) and convert rows with the adapters in
//! [`mapping`]. [`SqliteWarehouse`] is the production implementation.

pub mod mapping;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::WarehouseError;

pub use mapping::TableRecord;
pub use sqlite::SqliteWarehouse;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Scalar stored in or bound to a warehouse column.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(value: NaiveDate) -> Self {
        SqlValue::Date(value)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value.naive_utc())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One warehouse row: ordered (column, value) pairs.
///
/// Column names are stored lowercased and looked up case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WarehouseRow {
    columns: Vec<(String, SqlValue)>,
}

impl WarehouseRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append.
    pub fn with(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.set(column, value);
        self
    }

    /// Insert or replace a column value.
    pub fn set(&mut self, column: &str, value: impl Into<SqlValue>) {
        let name = column.to_ascii_lowercase();
        let value = value.into();
        match self.columns.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((name, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.columns.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Numeric column; integers widen to `f64`, absent columns read as null.
    pub fn f64(&self, column: &str) -> Result<Option<f64>, WarehouseError> {
        match self.get(column) {
            None | Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Real(v)) => Ok(Some(*v)),
            Some(SqlValue::Integer(v)) => Ok(Some(*v as f64)),
            Some(SqlValue::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|e| WarehouseError::mapping(column, e.to_string())),
            Some(other) => Err(WarehouseError::mapping(column, format!("expected number, got {:?}", other))),
        }
    }

    pub fn i64(&self, column: &str) -> Result<Option<i64>, WarehouseError> {
        match self.get(column) {
            None | Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Integer(v)) => Ok(Some(*v)),
            Some(SqlValue::Bool(b)) => Ok(Some(i64::from(*b))),
            Some(SqlValue::Real(v)) if v.fract() == 0.0 => Ok(Some(*v as i64)),
            Some(other) => Err(WarehouseError::mapping(column, format!("expected integer, got {:?}", other))),
        }
    }

    pub fn bool(&self, column: &str) -> Result<Option<bool>, WarehouseError> {
        match self.get(column) {
            None | Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Bool(b)) => Ok(Some(*b)),
            Some(SqlValue::Integer(v)) => Ok(Some(*v != 0)),
            Some(other) => Err(WarehouseError::mapping(column, format!("expected boolean, got {:?}", other))),
        }
    }

    pub fn text(&self, column: &str) -> Result<Option<String>, WarehouseError> {
        match self.get(column) {
            None | Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Text(s)) => Ok(Some(s.clone())),
            Some(other) => Err(WarehouseError::mapping(column, format!("expected text, got {:?}", other))),
        }
    }

    pub fn date(&self, column: &str) -> Result<Option<NaiveDate>, WarehouseError> {
        match self.get(column) {
            None | Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Date(d)) => Ok(Some(*d)),
            Some(SqlValue::Timestamp(ts)) => Ok(Some(ts.date())),
            Some(SqlValue::Text(s)) => parse_date(s)
                .map(Some)
                .ok_or_else(|| WarehouseError::mapping(column, format!("invalid date '{}'", s))),
            Some(other) => Err(WarehouseError::mapping(column, format!("expected date, got {:?}", other))),
        }
    }

    pub fn timestamp(&self, column: &str) -> Result<Option<NaiveDateTime>, WarehouseError> {
        match self.get(column) {
            None | Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Timestamp(ts)) => Ok(Some(*ts)),
            Some(SqlValue::Date(d)) => Ok(d.and_hms_opt(0, 0, 0)),
            Some(SqlValue::Text(s)) => parse_timestamp(s)
                .map(Some)
                .ok_or_else(|| WarehouseError::mapping(column, format!("invalid timestamp '{}'", s))),
            Some(other) => Err(WarehouseError::mapping(column, format!("expected timestamp, got {:?}", other))),
        }
    }

    pub fn required_f64(&self, column: &str) -> Result<f64, WarehouseError> {
        self.f64(column)?.ok_or_else(|| WarehouseError::mapping(column, "missing value"))
    }

    pub fn required_i64(&self, column: &str) -> Result<i64, WarehouseError> {
        self.i64(column)?.ok_or_else(|| WarehouseError::mapping(column, "missing value"))
    }

    pub fn required_text(&self, column: &str) -> Result<String, WarehouseError> {
        self.text(column)?.ok_or_else(|| WarehouseError::mapping(column, "missing value"))
    }

    pub fn required_date(&self, column: &str) -> Result<NaiveDate, WarehouseError> {
        self.date(column)?.ok_or_else(|| WarehouseError::mapping(column, "missing value"))
    }

    pub fn required_timestamp(&self, column: &str) -> Result<NaiveDateTime, WarehouseError> {
        self.timestamp(column)?.ok_or_else(|| WarehouseError::mapping(column, "missing value"))
    }
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time part.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .or_else(|| parse_timestamp(s).map(|ts| ts.date()))
}

/// Accepts `YYYY-MM-DD HH:MM:SS[.fff]`, the `T`-separated form, RFC 3339 or a bare date.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Some(ts);
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.naive_utc());
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Capability the engines need from a warehouse.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run a read query with positional `?` parameters.
    async fn fetch(&self, query: &str, params: &[SqlValue]) -> Result<Vec<WarehouseRow>, WarehouseError>;

    /// Plain insert of every row in one transaction.
    async fn bulk_insert(&self, table: &str, rows: &[WarehouseRow]) -> Result<u64, WarehouseError>;

    /// Upsert by `match_keys`.
    ///
    /// `update_columns = None` updates every non-key column on conflict,
    /// `Some(&[])` leaves existing rows untouched (insert-if-absent).
    async fn merge(
        &self,
        table: &str,
        rows: &[WarehouseRow],
        match_keys: &[&str],
        update_columns: Option<&[&str]>,
    ) -> Result<u64, WarehouseError>;
}
