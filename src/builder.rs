use crate::error::DbError;
use crate::types::{Binds, DbValue, Dimension, FetchAs};

/// Join composition type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinType {
    /// Plain `JOIN`
    #[default]
    None,
    Inner,
    Left,
    Right,
}

impl JoinType {
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            JoinType::None => "JOIN",
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
        }
    }
}

/// One join target; pairs positionally with an [`OnSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub kind: JoinType,
    pub table: String,
}

/// The ON condition for the join at the same position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnSpec {
    pub child: String,
    pub parent: String,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// Page-based limit; compiled to `LIMIT offset,count` after the count probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitSpec {
    pub page: u64,
    pub page_size: u64,
}

/// Conditional bulk-update mapping: one CASE expression per switch, with the
/// cases grouped by tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchSpec {
    pub tag: String,
    /// Discriminant column tested by CASE and restricted via IN (...)
    pub discriminant: String,
    /// Column assigned by the CASE expression
    pub target: String,
    /// (when value, then expression) pairs
    pub cases: Vec<(String, String)>,
}

/// Immutable-per-`open` accumulation of one query.
///
/// Every `open(table)` produces a fresh value; exactly one terminal CRUD
/// call consumes it. Scratch helpers (like the pagination count probe)
/// derive a new spec instead of mutating the caller's.
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub table: String,
    /// Projection for SELECTs; `*` when empty.
    pub select_columns: Vec<String>,
    /// (column, raw value expression) pairs for INSERT/UPDATE.
    pub values: Vec<(String, String)>,
    /// Pre-built column list for `insert_raw`.
    pub raw_columns: Option<String>,
    /// Pre-built `VALUES (...), (...)` clause for `insert_raw`.
    pub raw_values: Option<String>,
    pub joins: Vec<JoinSpec>,
    pub ons: Vec<OnSpec>,
    pub where_clauses: Vec<String>,
    pub group: Option<String>,
    pub having: Option<String>,
    pub sorts: Vec<(String, SortDir)>,
    pub limit: Option<LimitSpec>,
    pub switches: Vec<SwitchSpec>,
    /// Columns dropped from every materialized row.
    pub except: Vec<String>,
    pub binds: Binds,
    pub debug: bool,
    pub catch: bool,
    pub lazy: bool,
    pub fetch_as: FetchAs,
    pub dimension: Dimension,
    pub can_be_null: bool,
    pub can_be_false: bool,
}

impl QuerySpec {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            can_be_null: true,
            can_be_false: true,
            ..Self::default()
        }
    }

    pub fn add_select_column(&mut self, name: impl Into<String>) {
        self.select_columns.push(name.into());
    }

    pub fn add_value(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.values.push((column.into(), value.into()));
    }

    pub fn add_where(&mut self, clause: impl Into<String>) {
        self.where_clauses.push(clause.into());
    }

    pub fn add_join(&mut self, kind: JoinType, table: impl Into<String>) {
        self.joins.push(JoinSpec {
            kind,
            table: table.into(),
        });
    }

    pub fn add_on(&mut self, child: impl Into<String>, parent: impl Into<String>) {
        self.ons.push(OnSpec {
            child: child.into(),
            parent: parent.into(),
        });
    }

    pub fn add_sort(&mut self, column: impl Into<String>, dir: SortDir) {
        self.sorts.push((column.into(), dir));
    }

    pub fn set_limit(&mut self, page: u64, page_size: u64) {
        self.limit = Some(LimitSpec { page, page_size });
    }

    /// Register a switch; cases attach to it by tag.
    pub fn add_switch(
        &mut self,
        tag: impl Into<String>,
        discriminant: impl Into<String>,
        target: impl Into<String>,
    ) {
        self.switches.push(SwitchSpec {
            tag: tag.into(),
            discriminant: discriminant.into(),
            target: target.into(),
            cases: Vec::new(),
        });
    }

    /// Attach a WHEN/THEN pair to the switch registered under `tag`.
    ///
    /// # Errors
    ///
    /// `DbError::BuilderUsage` when no switch with the tag exists.
    pub fn add_case(
        &mut self,
        tag: &str,
        when: impl Into<String>,
        then: impl Into<String>,
    ) -> Result<(), DbError> {
        match self.switches.iter_mut().find(|s| s.tag == tag) {
            Some(switch) => {
                switch.cases.push((when.into(), then.into()));
                Ok(())
            }
            None => Err(DbError::BuilderUsage(format!(
                "case refers to unknown switch tag '{tag}'"
            ))),
        }
    }

    /// Set positional binds. Every key must be numeric; an associative key
    /// is a fast failure rather than a silent mis-bind.
    ///
    /// # Errors
    ///
    /// `DbError::BuilderUsage` on the first non-numeric key.
    pub fn set_bind_num(&mut self, pairs: Vec<(String, DbValue)>) -> Result<(), DbError> {
        let mut ordered: Vec<(usize, DbValue)> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let idx: usize = key.parse().map_err(|_| {
                DbError::BuilderUsage(format!(
                    "bind_num requires numeric keys, got '{key}'"
                ))
            })?;
            ordered.push((idx, value));
        }
        ordered.sort_by_key(|(idx, _)| *idx);
        self.binds = Binds::Positional(ordered.into_iter().map(|(_, v)| v).collect());
        Ok(())
    }

    /// Set named binds. Every key must be non-numeric.
    ///
    /// # Errors
    ///
    /// `DbError::BuilderUsage` on the first numeric key.
    pub fn set_bind_assoc(&mut self, pairs: Vec<(String, DbValue)>) -> Result<(), DbError> {
        for (key, _) in &pairs {
            if key.trim_start_matches(':').parse::<usize>().is_ok() {
                return Err(DbError::BuilderUsage(format!(
                    "bind_assoc requires associative keys, got '{key}'"
                )));
            }
        }
        self.binds = Binds::Named(pairs);
        Ok(())
    }
}

/// Derive the pagination count probe from a caller's spec without touching
/// it: same table, joins, and restrictions; no projection, sort, or limit.
#[must_use]
pub fn count_probe(spec: &QuerySpec) -> QuerySpec {
    let mut probe = QuerySpec::new(spec.table.clone());
    probe.joins = spec.joins.clone();
    probe.ons = spec.ons.clone();
    probe.where_clauses = spec.where_clauses.clone();
    probe.group = spec.group.clone();
    probe.having = spec.having.clone();
    probe.binds = spec.binds.clone();
    probe.debug = spec.debug;
    probe.catch = spec.catch;
    probe
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_num_rejects_associative_keys() {
        let mut spec = QuerySpec::new("t");
        let err = spec
            .set_bind_num(vec![("a".to_string(), DbValue::Int(1))])
            .unwrap_err();
        assert!(matches!(err, DbError::BuilderUsage(_)));
    }

    #[test]
    fn bind_num_orders_by_index() {
        let mut spec = QuerySpec::new("t");
        spec.set_bind_num(vec![
            ("1".to_string(), DbValue::Int(2)),
            ("0".to_string(), DbValue::Int(1)),
        ])
        .unwrap();
        assert_eq!(
            spec.binds,
            Binds::Positional(vec![DbValue::Int(1), DbValue::Int(2)])
        );
    }

    #[test]
    fn bind_assoc_rejects_numeric_keys() {
        let mut spec = QuerySpec::new("t");
        let err = spec
            .set_bind_assoc(vec![("1".to_string(), DbValue::Text("a".into()))])
            .unwrap_err();
        assert!(matches!(err, DbError::BuilderUsage(_)));
        assert!(
            spec.set_bind_assoc(vec![("name".to_string(), DbValue::Text("a".into()))])
                .is_ok()
        );
    }

    #[test]
    fn case_requires_registered_switch() {
        let mut spec = QuerySpec::new("t");
        assert!(spec.add_case("s1", "a", "b").is_err());
        spec.add_switch("s1", "status", "label");
        assert!(spec.add_case("s1", "active", "'Active'").is_ok());
        assert_eq!(spec.switches[0].cases.len(), 1);
    }

    #[test]
    fn count_probe_leaves_caller_spec_untouched() {
        let mut spec = QuerySpec::new("users");
        spec.add_where("age > 21");
        spec.add_sort("name", SortDir::Asc);
        spec.set_limit(2, 10);

        let probe = count_probe(&spec);
        assert_eq!(probe.table, "users");
        assert_eq!(probe.where_clauses, spec.where_clauses);
        assert!(probe.sorts.is_empty());
        assert!(probe.limit.is_none());
        // the caller's spec is intact
        assert_eq!(spec.limit, Some(LimitSpec { page: 2, page_size: 10 }));
        assert_eq!(spec.sorts.len(), 1);
    }
}
