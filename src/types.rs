use std::sync::LazyLock;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use regex::Regex;
use serde_json::Value as JsonValue;

/// Values that can be stored in a database row or used as bind parameters.
///
/// Reuse the same enum across both drivers so the builder and the CRUD layer
/// never need to branch on driver types:
/// ```rust
/// use fluent_sql::prelude::*;
///
/// let binds = vec![
///     DbValue::Int(1),
///     DbValue::Text("alice".into()),
///     DbValue::Bool(true),
/// ];
/// # let _ = binds;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    Json(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl DbValue {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            DbValue::Int(value) => Some(*value),
            DbValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let DbValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DbValue::Bool(value) => Some(*value),
            DbValue::Int(1) => Some(true),
            DbValue::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let DbValue::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let DbValue::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            // Try "YYYY-MM-DD HH:MM:SS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            // Try "YYYY-MM-DD HH:MM:SS.SSS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S.%3f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let DbValue::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Int(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Bool(v)
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        DbValue::Float(v)
    }
}

/// The driver kind backing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum DriverKind {
    /// MySQL-protocol relational server
    Server,
    /// Embedded SQLite database file
    Embedded,
}

/// Bind parameters attached to a statement.
///
/// Positional binds pair with `?` placeholders, named binds with `:name`
/// placeholders. The builder validates key shape before anything reaches a
/// driver (see `Db::bind_num` / `Db::bind_assoc`).
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Binds {
    #[default]
    None,
    Positional(Vec<DbValue>),
    Named(Vec<(String, DbValue)>),
}

impl Binds {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Binds::None => true,
            Binds::Positional(v) => v.is_empty(),
            Binds::Named(v) => v.is_empty(),
        }
    }
}

/// Statement classification used by the executor to pick an execution path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Count,
    Insert,
    Update,
    Delete,
    Other,
}

static COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*SELECT\s+COUNT\s*\(").expect("count regex"));

impl QueryKind {
    /// Infer the kind from the statement's first tokens. `SELECT COUNT(...)`
    /// is special-cased so the executor can return a scalar directly.
    #[must_use]
    pub fn infer(sql: &str) -> QueryKind {
        if COUNT_RE.is_match(sql) {
            return QueryKind::Count;
        }
        let first = sql
            .trim_start()
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();
        match first.as_str() {
            "SELECT" | "SHOW" | "PRAGMA" | "EXPLAIN" => QueryKind::Select,
            "INSERT" | "REPLACE" => QueryKind::Insert,
            "UPDATE" => QueryKind::Update,
            "DELETE" => QueryKind::Delete,
            _ => QueryKind::Other,
        }
    }

    #[must_use]
    pub fn is_read(self) -> bool {
        matches!(self, QueryKind::Select | QueryKind::Count)
    }
}

/// Row shape requested by the caller (assoc / positional / both).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchAs {
    /// Column-name keyed object
    #[default]
    Assoc,
    /// Positional array
    Num,
    /// Object keyed by both column name and position
    Both,
}

/// Whether a statement wants rows back or only execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnAs {
    /// Execution only; no materialized rows
    Execution,
    /// Materialize the driver result set
    #[default]
    Materialized,
}

/// Result dimension for materialized SELECTs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dimension {
    /// First row only
    One,
    /// Every row
    #[default]
    Many,
}
