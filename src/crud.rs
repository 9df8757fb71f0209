use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value as JsonValue;

use crate::builder::{self, QuerySpec};
use crate::db::Db;
use crate::envelope::Payload;
use crate::error::DbError;
use crate::executor::StatementOptions;
use crate::types::{DbValue, Dimension, DriverKind, FetchAs, QueryKind};
use crate::{mysql, sqlite};

/// A bare function-call value like `UUID()` or `datetime('now')`; embedded
/// unquoted so the server evaluates it.
static FN_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*\s*\(.*\)$").expect("function-call regex")
});

/// Backtick-quote an identifier. `*`, expressions, and already-quoted names
/// pass through; dotted names are quoted per part.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    let name = name.trim();
    if name == "*" || name.contains('`') || name.contains('(') || name.contains(' ') {
        return name.to_string();
    }
    if name.contains('.') {
        return name
            .split('.')
            .map(|part| format!("`{part}`"))
            .collect::<Vec<_>>()
            .join(".");
    }
    format!("`{name}`")
}

/// Quote a scalar value for embedding. Function calls and already-quoted
/// literals pass through untouched; everything else is escaped and
/// single-quoted with the driver's escaping rules.
#[must_use]
pub fn quote_value(kind: DriverKind, raw: &str) -> String {
    let raw = raw.trim();
    if FN_CALL_RE.is_match(raw) {
        return raw.to_string();
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return raw.to_string();
    }
    let escaped = match kind {
        DriverKind::Server => mysql::escape(raw),
        DriverKind::Embedded => sqlite::escape(raw),
    };
    format!("'{escaped}'")
}

fn compose_columns(spec: &QuerySpec) -> String {
    if spec.select_columns.is_empty() {
        "*".to_string()
    } else {
        spec.select_columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn compose_joins(spec: &QuerySpec) -> Result<String, DbError> {
    if spec.joins.is_empty() {
        return Ok(String::new());
    }
    if spec.joins.len() != spec.ons.len() {
        return Err(DbError::BuilderUsage(format!(
            "{} join(s) but {} on clause(s); they pair positionally",
            spec.joins.len(),
            spec.ons.len()
        )));
    }
    let parts: Vec<String> = spec
        .joins
        .iter()
        .zip(spec.ons.iter())
        .map(|(join, on)| {
            format!(
                " {} {} ON {} = {}",
                join.kind.keyword(),
                quote_ident(&join.table),
                quote_ident(&on.child),
                quote_ident(&on.parent)
            )
        })
        .collect();
    Ok(parts.concat())
}

fn compose_where(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn compose_tail(spec: &QuerySpec) -> String {
    let mut sql = String::new();
    if let Some(group) = &spec.group {
        sql.push_str(&format!(" GROUP BY {}", quote_ident(group)));
    }
    if let Some(having) = &spec.having {
        sql.push_str(&format!(" HAVING {having}"));
    }
    if !spec.sorts.is_empty() {
        let parts: Vec<String> = spec
            .sorts
            .iter()
            .map(|(col, dir)| format!("{} {}", quote_ident(col), dir.keyword()))
            .collect();
        sql.push_str(&format!(" ORDER BY {}", parts.join(",")));
    }
    sql
}

/// Compile a SELECT. The limit clause, when present, is the already-resolved
/// `(offset, count)` pair from the pagination probe.
pub(crate) fn compile_select(
    spec: &QuerySpec,
    limit: Option<(u64, u64)>,
) -> Result<String, DbError> {
    let mut sql = format!(
        "SELECT {} FROM {}{}{}{}",
        compose_columns(spec),
        quote_ident(&spec.table),
        compose_joins(spec)?,
        compose_where(&spec.where_clauses),
        compose_tail(spec)
    );
    if let Some((offset, count)) = limit {
        sql.push_str(&format!(" LIMIT {offset},{count}"));
    }
    Ok(sql)
}

/// Compile the COUNT. A grouped accumulation counts the groups, not the raw
/// rows, so the pagination probe sees the same total the main query pages
/// over.
pub(crate) fn compile_count(
    spec: &QuerySpec,
    column: &str,
) -> Result<String, DbError> {
    let base = format!(
        "FROM {}{}{}",
        quote_ident(&spec.table),
        compose_joins(spec)?,
        compose_where(&spec.where_clauses)
    );
    if spec.group.is_some() || spec.having.is_some() {
        let mut inner = format!("SELECT 1 {base}");
        if let Some(group) = &spec.group {
            inner.push_str(&format!(" GROUP BY {}", quote_ident(group)));
        }
        if let Some(having) = &spec.having {
            inner.push_str(&format!(" HAVING {having}"));
        }
        return Ok(format!("SELECT COUNT(*) FROM ({inner}) AS grouped"));
    }
    Ok(format!("SELECT COUNT({}) {base}", quote_ident(column)))
}

/// Compile an INSERT. The server driver takes the `SET col=val` form; the
/// embedded driver only understands column-list/VALUES.
pub(crate) fn compile_insert(spec: &QuerySpec, kind: DriverKind) -> Result<String, DbError> {
    if spec.values.is_empty() {
        return Err(DbError::BuilderUsage(
            "insert requires at least one column value".to_string(),
        ));
    }
    let table = quote_ident(&spec.table);
    match kind {
        DriverKind::Server => {
            let assignments: Vec<String> = spec
                .values
                .iter()
                .map(|(col, val)| format!("{}={}", quote_ident(col), quote_value(kind, val)))
                .collect();
            Ok(format!("INSERT INTO {table} SET {}", assignments.join(",")))
        }
        DriverKind::Embedded => {
            let cols: Vec<String> = spec.values.iter().map(|(c, _)| quote_ident(c)).collect();
            let vals: Vec<String> = spec
                .values
                .iter()
                .map(|(_, v)| quote_value(kind, v))
                .collect();
            Ok(format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                cols.join(","),
                vals.join(",")
            ))
        }
    }
}

pub(crate) fn compile_insert_raw(spec: &QuerySpec) -> Result<String, DbError> {
    let (Some(columns), Some(values)) = (&spec.raw_columns, &spec.raw_values) else {
        return Err(DbError::BuilderUsage(
            "insert_raw requires a column list and a values clause".to_string(),
        ));
    };
    Ok(format!(
        "INSERT INTO {} ({columns}) VALUES {values}",
        quote_ident(&spec.table)
    ))
}

/// Compile an UPDATE, including switch/case conditional bulk assignments.
///
/// Each switch becomes `target = CASE disc WHEN 'v' THEN expr ... END` and
/// appends an `disc IN (...)` restriction AND-joined into the WHERE clause,
/// so one statement applies different values to different rows grouped by
/// the discriminant column.
pub(crate) fn compile_update(spec: &QuerySpec, kind: DriverKind) -> Result<String, DbError> {
    let mut assignments: Vec<String> = spec
        .values
        .iter()
        .map(|(col, val)| format!("{}={}", quote_ident(col), quote_value(kind, val)))
        .collect();
    let mut restrictions = spec.where_clauses.clone();

    for switch in &spec.switches {
        if switch.cases.is_empty() {
            return Err(DbError::BuilderUsage(format!(
                "switch '{}' has no cases",
                switch.tag
            )));
        }
        let whens: Vec<String> = switch
            .cases
            .iter()
            .map(|(when, then)| {
                format!(
                    "WHEN {} THEN {}",
                    quote_value(kind, when),
                    quote_value(kind, then)
                )
            })
            .collect();
        assignments.push(format!(
            "{} = CASE {} {} END",
            quote_ident(&switch.target),
            quote_ident(&switch.discriminant),
            whens.join(" ")
        ));
        let in_list: Vec<String> = switch
            .cases
            .iter()
            .map(|(when, _)| quote_value(kind, when))
            .collect();
        restrictions.push(format!(
            "{} IN ({})",
            quote_ident(&switch.discriminant),
            in_list.join(",")
        ));
    }

    if assignments.is_empty() {
        return Err(DbError::BuilderUsage(
            "update requires column values or a switch/case mapping".to_string(),
        ));
    }

    Ok(format!(
        "UPDATE {} SET {}{}",
        quote_ident(&spec.table),
        assignments.join(","),
        compose_where(&restrictions)
    ))
}

pub(crate) fn compile_delete(spec: &QuerySpec) -> String {
    format!(
        "DELETE FROM {}{}",
        quote_ident(&spec.table),
        compose_where(&spec.where_clauses)
    )
}

pub(crate) fn compile_last_item(spec: &QuerySpec, key: &str) -> Result<String, DbError> {
    Ok(format!(
        "SELECT {} FROM {}{}{} ORDER BY {} DESC LIMIT 0,1",
        compose_columns(spec),
        quote_ident(&spec.table),
        compose_joins(spec)?,
        compose_where(&spec.where_clauses),
        quote_ident(key)
    ))
}

/// Acceptable result shape for a terminal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Rows,
    Row,
    Bool,
    Int,
    Null,
}

impl Shape {
    fn name(self) -> &'static str {
        match self {
            Shape::Rows => "rows",
            Shape::Row => "row",
            Shape::Bool => "bool",
            Shape::Int => "int",
            Shape::Null => "null",
        }
    }

    fn matches(self, payload: &Payload) -> bool {
        match self {
            Shape::Rows => matches!(payload, Payload::Rows(_) | Payload::Lazy(_)),
            Shape::Row => matches!(payload, Payload::Row(_)),
            Shape::Bool => matches!(payload, Payload::Bool(_)),
            Shape::Int => matches!(payload, Payload::Scalar(DbValue::Int(_))),
            Shape::Null => matches!(payload, Payload::None),
        }
    }

    fn default_payload(self) -> Payload {
        match self {
            Shape::Rows => Payload::Rows(Vec::new()),
            Shape::Row => Payload::Row(JsonValue::Object(serde_json::Map::new())),
            Shape::Null => Payload::None,
            Shape::Bool => Payload::Bool(false),
            Shape::Int => Payload::Scalar(DbValue::Int(0)),
        }
    }
}

/// Test the payload against the declared shapes in order. The first match
/// wins; a full miss either raises `TypeCoercion` or, with `catch`, falls
/// back to the first shape's default.
pub(crate) fn coerce(
    payload: Payload,
    shapes: &[Shape],
    catch: bool,
) -> Result<Payload, DbError> {
    if shapes.iter().any(|shape| shape.matches(&payload)) {
        return Ok(payload);
    }
    if catch {
        let fallback = shapes.first().copied().unwrap_or(Shape::Null);
        return Ok(fallback.default_payload());
    }
    Err(DbError::TypeCoercion {
        expected: shapes
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join("|"),
        actual: payload.kind_name().to_string(),
    })
}

fn statement_options(spec: &QuerySpec) -> StatementOptions {
    StatementOptions {
        debug: spec.debug,
        catch: spec.catch,
        can_be_null: spec.can_be_null,
        can_be_false: spec.can_be_false,
        fetch_as: spec.fetch_as,
        dimension: spec.dimension,
        lazy: spec.lazy,
        except: spec.except.clone(),
        binds: spec.binds.clone(),
        ..StatementOptions::default()
    }
}

fn select_shapes(spec: &QuerySpec) -> Vec<Shape> {
    let mut shapes = match spec.dimension {
        Dimension::One => vec![Shape::Row],
        Dimension::Many => vec![Shape::Rows],
    };
    if spec.can_be_null {
        shapes.push(Shape::Null);
    }
    shapes
}

impl Db {
    /// Compile and run the accumulated SELECT.
    ///
    /// With a limit spec the scratch count probe runs first; a page past the
    /// last one short-circuits to the empty value without issuing the main
    /// query.
    ///
    /// # Errors
    ///
    /// `DbError::BuilderUsage` without a preceding `open`, plus the
    /// executor's statement and coercion errors.
    pub async fn select(&mut self) -> Result<Payload, DbError> {
        let spec = self.take_spec()?;
        self.select_spec(spec).await
    }

    pub(crate) async fn select_spec(&mut self, spec: QuerySpec) -> Result<Payload, DbError> {
        let mut resolved_limit = None;
        if let Some(limit) = spec.limit {
            let page_size = limit.page_size.max(1);
            let probe = builder::count_probe(&spec);
            let total = self.run_count(&probe, "*").await?;
            let total_pages = u64::try_from(total.max(0)).unwrap_or(0).div_ceil(page_size);
            if limit.page > total_pages {
                let opts = statement_options(&spec);
                return coerce(opts.empty_select_payload(), &select_shapes(&spec), spec.catch);
            }
            resolved_limit = Some((limit.page.saturating_sub(1) * page_size, page_size));
        }

        let sql = compile_select(&spec, resolved_limit)?;
        let opts = statement_options(&spec);
        let envelope = self.run_statement(&sql, &opts).await?;
        coerce(envelope.data, &select_shapes(&spec), spec.catch)
    }

    /// Associative, non-null SELECT list: the record-repository form.
    ///
    /// # Errors
    ///
    /// Same as [`Self::select`].
    pub async fn then_select(&mut self) -> Result<Vec<JsonValue>, DbError> {
        let mut spec = self.take_spec()?;
        spec.fetch_as = FetchAs::Assoc;
        spec.dimension = Dimension::Many;
        spec.can_be_null = false;
        spec.lazy = false;
        let payload = self.select_spec(spec).await?;
        match payload {
            Payload::Rows(rows) => Ok(rows),
            other => Ok(match other {
                Payload::Row(row) => vec![row],
                _ => Vec::new(),
            }),
        }
    }

    /// Compile and run the accumulated INSERT; true when a row landed.
    ///
    /// # Errors
    ///
    /// `DbError::BuilderUsage` without `open` or column values, plus
    /// executor errors.
    pub async fn insert(&mut self) -> Result<bool, DbError> {
        let spec = self.take_spec()?;
        let sql = compile_insert(&spec, self.kind())?;
        self.run_bool_dml(&spec, &sql).await
    }

    /// Alias for [`Self::insert`] on the record-repository surface.
    ///
    /// # Errors
    ///
    /// Same as [`Self::insert`].
    pub async fn then_insert(&mut self) -> Result<bool, DbError> {
        self.insert().await
    }

    /// Multi-row insert from a pre-built column list and VALUES clause.
    ///
    /// # Errors
    ///
    /// `DbError::BuilderUsage` when either piece is missing, plus executor
    /// errors.
    pub async fn insert_raw(&mut self) -> Result<bool, DbError> {
        let spec = self.take_spec()?;
        let sql = compile_insert_raw(&spec)?;
        self.run_bool_dml(&spec, &sql).await
    }

    /// Compile and run the accumulated UPDATE (values and/or switch/case).
    ///
    /// # Errors
    ///
    /// `DbError::BuilderUsage` without assignments, plus executor errors.
    pub async fn update(&mut self) -> Result<bool, DbError> {
        let spec = self.take_spec()?;
        let sql = compile_update(&spec, self.kind())?;
        self.run_bool_dml(&spec, &sql).await
    }

    /// Alias for [`Self::update`] on the record-repository surface.
    ///
    /// # Errors
    ///
    /// Same as [`Self::update`].
    pub async fn then_update(&mut self) -> Result<bool, DbError> {
        self.update().await
    }

    /// Compile and run the accumulated DELETE; true when rows were removed.
    ///
    /// # Errors
    ///
    /// `DbError::BuilderUsage` without `open`, plus executor errors.
    pub async fn delete(&mut self) -> Result<bool, DbError> {
        let spec = self.take_spec()?;
        let sql = compile_delete(&spec);
        self.run_bool_dml(&spec, &sql).await
    }

    /// `SELECT COUNT(column)` over the accumulated restrictions. Always an
    /// integer; an empty table counts as 0, never null or false.
    ///
    /// # Errors
    ///
    /// `DbError::BuilderUsage` without `open`, plus executor errors.
    pub async fn count_row(&mut self, column: &str) -> Result<i64, DbError> {
        let spec = self.take_spec()?;
        self.run_count(&spec, column).await
    }

    /// Most recent row by `key` column, honoring accumulated restrictions.
    ///
    /// # Errors
    ///
    /// `DbError::BuilderUsage` without `open`, plus executor errors.
    pub async fn last_item(&mut self, key: &str) -> Result<Option<JsonValue>, DbError> {
        let mut spec = self.take_spec()?;
        spec.dimension = Dimension::One;
        spec.can_be_null = true;
        let sql = compile_last_item(&spec, key)?;
        let opts = statement_options(&spec);
        let envelope = self.run_statement(&sql, &opts).await?;
        match coerce(envelope.data, &[Shape::Row, Shape::Null], spec.catch)? {
            Payload::Row(row) => Ok(Some(row)),
            _ => Ok(None),
        }
    }

    pub(crate) async fn run_count(&mut self, spec: &QuerySpec, column: &str) -> Result<i64, DbError> {
        let sql = compile_count(spec, column)?;
        let mut opts = statement_options(spec);
        opts.kind = Some(QueryKind::Count);
        let envelope = self.run_statement(&sql, &opts).await?;
        match coerce(envelope.data, &[Shape::Int], spec.catch)? {
            Payload::Scalar(value) => Ok(value.as_int().unwrap_or(0)),
            _ => Ok(0),
        }
    }

    async fn run_bool_dml(&mut self, spec: &QuerySpec, sql: &str) -> Result<bool, DbError> {
        let opts = statement_options(spec);
        let envelope = self.run_statement(sql, &opts).await?;
        match coerce(envelope.data, &[Shape::Bool, Shape::Rows, Shape::Null], spec.catch)? {
            Payload::Bool(b) => Ok(b),
            _ => Ok(false),
        }
    }
}
