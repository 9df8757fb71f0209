use std::collections::HashMap;
use std::sync::Arc;

use crate::types::DbValue;

/// A row from a database query result
///
/// This struct represents a single row from a database query result,
/// with access to both the column names and the values. Column names are
/// shared across all rows in a result set.
#[derive(Debug, Clone)]
pub struct DbRow {
    /// The column names for this row (shared across all rows in a result set)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub values: Vec<DbValue>,
    // Internal cache for faster column lookups
    #[doc(hidden)]
    column_index_cache: Arc<HashMap<String, usize>>,
}

impl DbRow {
    /// Create a new database row.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<DbValue>) -> Self {
        let cache = Arc::new(
            column_names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect::<HashMap<_, _>>(),
        );

        Self {
            column_names,
            values,
            column_index_cache: cache,
        }
    }

    /// Get the index of a column by name, or None if not found.
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Some(idx);
        }
        // Fall back to linear search
        self.column_names.iter().position(|col| col == column_name)
    }

    /// Get a value from the row by column name.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&DbValue> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the row by column index.
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&DbValue> {
        self.values.get(index)
    }
}

/// A result set from a database query
///
/// Both native fetch APIs (server rows and embedded-file rows) normalize
/// into this one representation before any shaping happens.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub rows: Vec<DbRow>,
    /// The number of rows affected (for DML statements)
    pub rows_affected: u64,
    /// The row id generated by the last INSERT, when the driver reports one
    pub last_insert_id: Option<i64>,
    /// Column names shared by all rows
    column_names: Option<Arc<Vec<String>>>,
}

impl ResultSet {
    /// Create a new result set with a known row capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            rows: Vec::with_capacity(capacity),
            rows_affected: 0,
            last_insert_id: None,
            column_names: None,
        }
    }

    /// Set the column names shared by all rows of this result set.
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_names = Some(column_names);
    }

    /// Get the shared column names, when set.
    #[must_use]
    pub fn column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Add a row built from the shared column names.
    pub fn add_row_values(&mut self, values: Vec<DbValue>) {
        if let Some(column_names) = &self.column_names {
            let row = DbRow::new(column_names.clone(), values);
            self.rows.push(row);
            self.rows_affected += 1;
        }
    }

    /// Add a pre-built row. When no shared column names exist yet, this
    /// row's names become the shared set.
    pub fn add_row(&mut self, row: DbRow) {
        if self.column_names.is_none() {
            self.column_names = Some(row.column_names.clone());
        }
        self.rows.push(row);
        self.rows_affected += 1;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_lookup_by_name_and_index() {
        let cols = Arc::new(vec!["id".to_string(), "name".to_string()]);
        let row = DbRow::new(cols, vec![DbValue::Int(7), DbValue::Text("sam".into())]);
        assert_eq!(row.get("id"), Some(&DbValue::Int(7)));
        assert_eq!(row.get_by_index(1), Some(&DbValue::Text("sam".into())));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn result_set_shares_column_names() {
        let mut rs = ResultSet::with_capacity(2);
        rs.set_column_names(Arc::new(vec!["a".to_string()]));
        rs.add_row_values(vec![DbValue::Int(1)]);
        rs.add_row_values(vec![DbValue::Int(2)]);
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.rows_affected, 2);
        assert!(Arc::ptr_eq(
            &rs.rows[0].column_names,
            &rs.rows[1].column_names
        ));
    }
}
