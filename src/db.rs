use crate::builder::{JoinType, QuerySpec, SortDir};
use crate::config::DbConfig;
use crate::envelope::{Envelope, EnvelopeSummary};
use crate::error::DbError;
use crate::executor::{self, StatementOptions};
use crate::pool::{ConnectionManager, DbConnection, DriverExecutor, PingInfo};
use crate::transaction::TxState;
use crate::types::{DbValue, Dimension, DriverKind, FetchAs};

/// The database handle: one connection manager, at most one live
/// connection, and at most one query under accumulation.
///
/// `open(table)` starts a query; the fluent setters refine it; exactly one
/// terminal call (`select`, `insert`, `update`, `delete`, ...) consumes it.
/// Setters called without a preceding `open` are quiet no-ops, matching the
/// forgiving builder surface; terminals without `open` raise
/// `DbError::BuilderUsage`.
#[derive(Debug)]
pub struct Db {
    manager: ConnectionManager,
    conn: Option<DbConnection>,
    spec: Option<QuerySpec>,
    last_envelope: Option<EnvelopeSummary>,
    pub(crate) tx: TxState,
}

impl Db {
    /// Build a handle from configuration. No connection is made until the
    /// first statement runs.
    #[must_use]
    pub fn connect(config: DbConfig) -> Self {
        Self::from_manager(ConnectionManager::new(config))
    }

    #[must_use]
    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self {
            manager,
            conn: None,
            spec: None,
            last_envelope: None,
            tx: TxState::default(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> DriverKind {
        self.manager.kind()
    }

    #[must_use]
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ConnectionManager {
        &mut self.manager
    }

    /// Begin accumulating a query against `table`, discarding any
    /// unconsumed one.
    pub fn open(&mut self, table: &str) -> &mut Self {
        if let Some(stale) = self.spec.take() {
            tracing::warn!(table = %stale.table, "query discarded without a terminal call");
        }
        self.spec = Some(QuerySpec::new(table));
        self
    }

    /// Record-repository alias for [`Self::open`].
    pub fn orm(&mut self, table: &str) -> &mut Self {
        self.open(table)
    }

    // --- fluent setters -------------------------------------------------

    fn with_spec(&mut self, f: impl FnOnce(&mut QuerySpec)) -> &mut Self {
        if let Some(spec) = self.spec.as_mut() {
            f(spec);
        }
        self
    }

    /// Add one projection column. `*` when never called.
    pub fn column(&mut self, name: &str) -> &mut Self {
        self.with_spec(|s| s.add_select_column(name))
    }

    /// Set one column value for INSERT/UPDATE. The value is a raw SQL
    /// expression: bare function calls and pre-quoted literals pass through,
    /// anything else is escaped and quoted at compile time.
    pub fn value(&mut self, column: &str, value: &str) -> &mut Self {
        self.with_spec(|s| s.add_value(column, value))
    }

    /// Set several column values at once.
    pub fn columns(&mut self, pairs: &[(&str, &str)]) -> &mut Self {
        self.with_spec(|s| {
            for (column, value) in pairs {
                s.add_value(*column, *value);
            }
        })
    }

    /// Set the pre-built column list for a multi-row `insert_raw`.
    pub fn raw_columns(&mut self, columns: &str) -> &mut Self {
        self.with_spec(|s| s.raw_columns = Some(columns.to_string()))
    }

    /// Set the pre-built `VALUES (...), (...)` clause for `insert_raw`.
    pub fn raw_values(&mut self, values: &str) -> &mut Self {
        self.with_spec(|s| s.raw_values = Some(values.to_string()))
    }

    /// Add a WHERE restriction; restrictions AND together.
    pub fn where_clause(&mut self, clause: &str) -> &mut Self {
        self.with_spec(|s| s.add_where(clause))
    }

    /// Alias for [`Self::where_clause`].
    pub fn and_where(&mut self, clause: &str) -> &mut Self {
        self.where_clause(clause)
    }

    /// Add a joined table; pair with [`Self::on`] positionally.
    pub fn join(&mut self, kind: JoinType, table: &str) -> &mut Self {
        self.with_spec(|s| s.add_join(kind, table))
    }

    /// Add the ON pair for the join registered at the same position.
    pub fn on(&mut self, child: &str, parent: &str) -> &mut Self {
        self.with_spec(|s| s.add_on(child, parent))
    }

    pub fn sort(&mut self, column: &str, dir: SortDir) -> &mut Self {
        self.with_spec(|s| s.add_sort(column, dir))
    }

    /// Paginate: 1-based page of `page_size` rows. A count probe runs
    /// before the SELECT; pages past the last short-circuit to empty.
    pub fn limit(&mut self, page: u64, page_size: u64) -> &mut Self {
        self.with_spec(|s| s.set_limit(page, page_size))
    }

    pub fn group(&mut self, column: &str) -> &mut Self {
        self.with_spec(|s| s.group = Some(column.to_string()))
    }

    pub fn having(&mut self, expr: &str) -> &mut Self {
        self.with_spec(|s| s.having = Some(expr.to_string()))
    }

    /// Register a CASE-expression bulk update under `tag`.
    pub fn switch(&mut self, tag: &str, discriminant: &str, target: &str) -> &mut Self {
        self.with_spec(|s| s.add_switch(tag, discriminant, target))
    }

    /// Attach a WHEN/THEN pair to a registered switch.
    ///
    /// # Errors
    ///
    /// `DbError::BuilderUsage` without a preceding `open` or when the tag
    /// is unknown.
    pub fn case(&mut self, tag: &str, when: &str, then: &str) -> Result<&mut Self, DbError> {
        match self.spec.as_mut() {
            Some(spec) => {
                spec.add_case(tag, when, then)?;
                Ok(self)
            }
            None => Err(DbError::BuilderUsage("table not set".to_string())),
        }
    }

    /// Bind positional parameters; every key must be numeric.
    ///
    /// # Errors
    ///
    /// `DbError::BuilderUsage` without `open` or on a non-numeric key.
    pub fn bind_num(&mut self, pairs: Vec<(String, DbValue)>) -> Result<&mut Self, DbError> {
        match self.spec.as_mut() {
            Some(spec) => {
                spec.set_bind_num(pairs)?;
                Ok(self)
            }
            None => Err(DbError::BuilderUsage("table not set".to_string())),
        }
    }

    /// Bind named parameters; every key must be non-numeric.
    ///
    /// # Errors
    ///
    /// `DbError::BuilderUsage` without `open` or on a numeric key.
    pub fn bind_assoc(&mut self, pairs: Vec<(String, DbValue)>) -> Result<&mut Self, DbError> {
        match self.spec.as_mut() {
            Some(spec) => {
                spec.set_bind_assoc(pairs)?;
                Ok(self)
            }
            None => Err(DbError::BuilderUsage("table not set".to_string())),
        }
    }

    /// Log the compiled statement before execution.
    pub fn debug(&mut self) -> &mut Self {
        self.with_spec(|s| s.debug = true)
    }

    /// Demote statement failures into the envelope instead of erroring.
    pub fn catch_errors(&mut self) -> &mut Self {
        self.with_spec(|s| s.catch = true)
    }

    /// Materialize lazily: the SELECT returns a row iterator.
    pub fn lazy(&mut self) -> &mut Self {
        self.with_spec(|s| s.lazy = true)
    }

    /// Alias for [`Self::lazy`].
    pub fn use_generator(&mut self) -> &mut Self {
        self.lazy()
    }

    pub fn assoc(&mut self) -> &mut Self {
        self.with_spec(|s| s.fetch_as = FetchAs::Assoc)
    }

    pub fn num(&mut self) -> &mut Self {
        self.with_spec(|s| s.fetch_as = FetchAs::Num)
    }

    pub fn both(&mut self) -> &mut Self {
        self.with_spec(|s| s.fetch_as = FetchAs::Both)
    }

    /// Return a single row instead of a list.
    pub fn row_dimension(&mut self) -> &mut Self {
        self.with_spec(|s| s.dimension = Dimension::One)
    }

    /// An empty SELECT yields the empty row/list rather than null.
    pub fn no_null(&mut self) -> &mut Self {
        self.with_spec(|s| s.can_be_null = false)
    }

    /// A zero-row DML yields empty/null rather than false.
    pub fn no_false(&mut self) -> &mut Self {
        self.with_spec(|s| s.can_be_false = false)
    }

    /// Drop the named columns from every materialized row.
    pub fn except(&mut self, columns: &[&str]) -> &mut Self {
        self.with_spec(|s| {
            s.except.extend(columns.iter().map(|c| (*c).to_string()));
        })
    }

    // --- execution ------------------------------------------------------

    pub(crate) fn take_spec(&mut self) -> Result<QuerySpec, DbError> {
        self.spec
            .take()
            .ok_or_else(|| DbError::BuilderUsage("table not set".to_string()))
    }

    async fn ensure_conn(&mut self) -> Result<(), DbError> {
        if self.conn.is_none() {
            match self.manager.acquire_silent().await? {
                Some(conn) => self.conn = Some(conn),
                None => {
                    return Err(DbError::Connection(
                        "no connection available".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub(crate) async fn conn_mut(&mut self) -> Result<&mut DbConnection, DbError> {
        self.ensure_conn().await?;
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::Connection("no connection available".to_string()))
    }

    pub(crate) async fn run_statement(
        &mut self,
        sql: &str,
        opts: &StatementOptions,
    ) -> Result<Envelope, DbError> {
        self.ensure_conn().await?;
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DbError::Connection("no connection available".to_string()))?;
        let envelope = executor::run_statement(conn, sql, opts).await?;
        self.last_envelope = Some(envelope.summary());
        Ok(envelope)
    }

    /// Run an arbitrary statement with explicit options; the raw surface
    /// beneath the fluent builder.
    ///
    /// # Errors
    ///
    /// Statement errors unless `opts.catch` is set; connection errors
    /// always.
    pub async fn query(&mut self, sql: &str, opts: &StatementOptions) -> Result<Envelope, DbError> {
        self.run_statement(sql, opts).await
    }

    /// Run several semicolon-separated statements with no result handling.
    ///
    /// # Errors
    ///
    /// Driver and connection errors.
    pub async fn execute_batch(&mut self, sql: &str) -> Result<(), DbError> {
        let conn = self.conn_mut().await?;
        conn.execute_batch(sql).await
    }

    /// Row id generated by the most recent INSERT on this connection.
    ///
    /// # Errors
    ///
    /// Driver and connection errors.
    pub async fn last_insert_id(&mut self) -> Result<Option<i64>, DbError> {
        let conn = self.conn_mut().await?;
        conn.last_insert_id().await
    }

    /// Summary of the most recent statement's envelope, if any.
    #[must_use]
    pub fn last_envelope(&self) -> Option<&EnvelopeSummary> {
        self.last_envelope.as_ref()
    }

    /// Whether `table` exists, via catalog introspection.
    ///
    /// # Errors
    ///
    /// Statement and connection errors.
    pub async fn table_exists(&mut self, table: &str) -> Result<bool, DbError> {
        let escaped = self.escape(table);
        let sql = match self.kind() {
            DriverKind::Server => format!("SHOW TABLES LIKE '{escaped}'"),
            DriverKind::Embedded => format!(
                "SELECT name FROM sqlite_master WHERE type='table' AND name='{escaped}'"
            ),
        };
        let opts = StatementOptions {
            can_be_null: true,
            ..StatementOptions::default()
        };
        let envelope = self.run_statement(&sql, &opts).await?;
        Ok(envelope.has_data)
    }

    /// Escape a string per the configured driver's literal rules. Escaping
    /// alone is not quoting; wrap the result in quotes yourself.
    #[must_use]
    pub fn escape(&self, value: &str) -> String {
        self.manager.escape(value)
    }

    /// Liveness and identity of the current connection, TTL-cached.
    ///
    /// # Errors
    ///
    /// Driver errors from the probe statement.
    pub async fn ping(&mut self) -> Result<PingInfo, DbError> {
        self.manager.ping().await
    }

    pub async fn is_connected(&mut self) -> bool {
        self.manager.is_connected().await
    }

    /// Release the live connection and shut the pools down.
    pub async fn close(&mut self) {
        self.conn = None;
        self.manager.close().await;
    }
}
