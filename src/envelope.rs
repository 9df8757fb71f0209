use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::materialize::RowIter;
use crate::types::DbValue;

/// Outcome status of a single executed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Success,
    Fail,
}

/// The data portion of an envelope.
///
/// This is the tagged replacement for runtime result-type inspection: each
/// execution path produces exactly one of these, and terminal CRUD calls
/// match on the tag instead of probing a dynamic value.
pub enum Payload {
    /// No data (a NULL outcome)
    None,
    /// Boolean outcome of a mutating statement
    Bool(bool),
    /// Scalar result (COUNT and friends)
    Scalar(DbValue),
    /// A single shaped row
    Row(JsonValue),
    /// An eager list of shaped rows
    Rows(Vec<JsonValue>),
    /// A lazy, finite, non-restartable per-row sequence
    Lazy(RowIter),
}

impl Payload {
    /// Short tag name, used in coercion errors.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::None => "null",
            Payload::Bool(_) => "bool",
            Payload::Scalar(_) => "scalar",
            Payload::Row(_) => "row",
            Payload::Rows(_) => "rows",
            Payload::Lazy(_) => "lazy",
        }
    }

    #[must_use]
    pub fn has_data(&self) -> bool {
        match self {
            Payload::None | Payload::Bool(false) => false,
            Payload::Bool(true) | Payload::Lazy(_) => true,
            Payload::Scalar(v) => !v.is_null(),
            Payload::Row(_) => true,
            Payload::Rows(rows) => !rows.is_empty(),
        }
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::None => f.write_str("None"),
            Payload::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Payload::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            Payload::Row(v) => f.debug_tuple("Row").field(v).finish(),
            Payload::Rows(v) => f.debug_tuple("Rows").field(&v.len()).finish(),
            Payload::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

/// Structured status/data wrapper for every executed statement.
///
/// Produced by the statement executor, consumed immediately by the CRUD
/// layer; a copyable [`EnvelopeSummary`] stays behind on the `Db` handle for
/// diagnostic callers (existence probes read `has_error` after the call).
#[derive(Debug)]
pub struct Envelope {
    pub status: QueryStatus,
    pub has_data: bool,
    pub has_error: bool,
    pub error: Option<String>,
    pub rows_affected: u64,
    pub data: Payload,
}

impl Envelope {
    /// Successful outcome carrying a payload.
    #[must_use]
    pub fn success(data: Payload, rows_affected: u64) -> Self {
        let has_data = data.has_data();
        Self {
            status: QueryStatus::Success,
            has_data,
            has_error: false,
            error: None,
            rows_affected,
            data,
        }
    }

    /// Failed outcome with a recorded driver message (`catch` path).
    #[must_use]
    pub fn failure(message: String) -> Self {
        Self {
            status: QueryStatus::Fail,
            has_data: false,
            has_error: true,
            error: Some(message),
            rows_affected: 0,
            data: Payload::None,
        }
    }

    #[must_use]
    pub fn summary(&self) -> EnvelopeSummary {
        EnvelopeSummary {
            status: self.status,
            has_data: self.has_data,
            has_error: self.has_error,
            error: self.error.clone(),
            rows_affected: self.rows_affected,
        }
    }
}

/// Copyable view of an envelope, minus the payload.
#[derive(Debug, Clone, Serialize)]
pub struct EnvelopeSummary {
    pub status: QueryStatus,
    pub has_data: bool,
    pub has_error: bool,
    pub error: Option<String>,
    pub rows_affected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_reports_data_presence() {
        let env = Envelope::success(Payload::Rows(vec![]), 0);
        assert_eq!(env.status, QueryStatus::Success);
        assert!(!env.has_data);
        assert!(!env.has_error);

        let env = Envelope::success(Payload::Scalar(DbValue::Int(3)), 0);
        assert!(env.has_data);
    }

    #[test]
    fn failure_envelope_records_message() {
        let env = Envelope::failure("no such table: missing".to_string());
        assert_eq!(env.status, QueryStatus::Fail);
        assert!(env.has_error);
        assert_eq!(env.error.as_deref(), Some("no such table: missing"));
    }
}
