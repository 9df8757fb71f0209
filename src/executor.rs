use crate::envelope::{Envelope, Payload};
use crate::error::DbError;
use crate::materialize::{self, RowTransform, ShapeOptions};
use crate::pool::{DbConnection, DriverExecutor};
use crate::types::{Binds, DbValue, Dimension, FetchAs, QueryKind, ReturnAs};

/// Per-statement execution options.
#[derive(Clone, Default)]
pub struct StatementOptions {
    /// Log the compiled statement before running it.
    pub debug: bool,
    /// Record driver failures in the envelope instead of raising.
    pub catch: bool,
    pub return_as: ReturnAs,
    /// Zero-row SELECTs yield null instead of an empty collection.
    pub can_be_null: bool,
    /// Zero-affected mutations yield false.
    pub can_be_false: bool,
    /// Explicit classification override; inferred from the text otherwise.
    pub kind: Option<QueryKind>,
    pub fetch_as: FetchAs,
    pub dimension: Dimension,
    /// Materialize as a lazy per-row sequence.
    pub lazy: bool,
    /// Columns dropped from every shaped row.
    pub except: Vec<String>,
    pub transform: Option<RowTransform>,
    pub binds: Binds,
}

impl std::fmt::Debug for StatementOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementOptions")
            .field("debug", &self.debug)
            .field("catch", &self.catch)
            .field("return_as", &self.return_as)
            .field("can_be_null", &self.can_be_null)
            .field("can_be_false", &self.can_be_false)
            .field("kind", &self.kind)
            .field("fetch_as", &self.fetch_as)
            .field("dimension", &self.dimension)
            .field("lazy", &self.lazy)
            .field("except", &self.except)
            .field("binds", &self.binds)
            .finish_non_exhaustive()
    }
}

impl StatementOptions {
    fn shape_options(&self) -> ShapeOptions {
        ShapeOptions {
            fetch_as: self.fetch_as,
            dimension: self.dimension,
            lazy: self.lazy,
            except: self.except.clone(),
            transform: self.transform.clone(),
        }
    }

    /// Empty value for a zero-row SELECT, honoring `can_be_null`.
    pub(crate) fn empty_select_payload(&self) -> Payload {
        if self.can_be_null {
            return Payload::None;
        }
        match self.dimension {
            Dimension::One => Payload::Row(serde_json::Value::Object(serde_json::Map::new())),
            Dimension::Many => Payload::Rows(Vec::new()),
        }
    }

    fn empty_dml_payload(&self) -> Payload {
        if self.can_be_false {
            Payload::Bool(false)
        } else if self.can_be_null {
            Payload::None
        } else {
            Payload::Rows(Vec::new())
        }
    }
}

/// Run one statement against a connection and normalize the outcome into an
/// [`Envelope`].
///
/// # Errors
///
/// Driver failures raise `DbError::Statement` carrying the statement text
/// unless `catch` is set, in which case the failure is recorded in the
/// envelope and execution continues.
pub async fn run_statement(
    conn: &mut DbConnection,
    sql: &str,
    opts: &StatementOptions,
) -> Result<Envelope, DbError> {
    let kind = opts.kind.unwrap_or_else(|| QueryKind::infer(sql));

    if opts.debug {
        tracing::debug!(statement = sql, ?kind, "executing statement");
    }

    if kind.is_read() {
        let result = match conn.execute_select(sql, &opts.binds).await {
            Ok(result) => result,
            Err(err) => return handle_failure(sql, err, opts),
        };

        if kind == QueryKind::Count {
            let count = result
                .rows
                .first()
                .and_then(|row| row.get_by_index(0))
                .and_then(DbValue::as_int)
                .unwrap_or(0);
            return Ok(Envelope::success(Payload::Scalar(DbValue::Int(count)), 1));
        }

        if result.is_empty() {
            return Ok(Envelope::success(opts.empty_select_payload(), 0));
        }

        let rows_affected = result.rows_affected;
        let payload = match opts.return_as {
            ReturnAs::Execution => Payload::Bool(true),
            ReturnAs::Materialized => materialize::store(result, &opts.shape_options()),
        };
        return Ok(Envelope::success(payload, rows_affected));
    }

    match conn.execute_dml(sql, &opts.binds).await {
        Ok((0, _)) => Ok(Envelope::success(opts.empty_dml_payload(), 0)),
        Ok((affected, _)) => Ok(Envelope::success(Payload::Bool(true), affected)),
        Err(err) => handle_failure(sql, err, opts),
    }
}

fn handle_failure(
    sql: &str,
    err: DbError,
    opts: &StatementOptions,
) -> Result<Envelope, DbError> {
    if opts.catch {
        tracing::warn!(statement = sql, error = %err, "statement failed, error recorded");
        Ok(Envelope::failure(err.to_string()))
    } else {
        Err(DbError::statement(sql, err))
    }
}
