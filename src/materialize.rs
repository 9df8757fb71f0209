use std::sync::Arc;

use serde_json::{Map, Number, Value as JsonValue};

use crate::envelope::Payload;
use crate::results::{DbRow, ResultSet};
use crate::types::{DbValue, Dimension, FetchAs};

/// Per-row transform applied while shaping; receives the shaped row and its
/// zero-based index in the sequence.
pub type RowTransform = Arc<dyn Fn(JsonValue, usize) -> JsonValue + Send + Sync>;

/// Shaping options for a materialized result.
#[derive(Clone, Default)]
pub struct ShapeOptions {
    pub fetch_as: FetchAs,
    pub dimension: Dimension,
    /// Yield rows lazily instead of building the full list up front.
    pub lazy: bool,
    /// Columns dropped from every shaped row.
    pub except: Vec<String>,
    pub transform: Option<RowTransform>,
}

impl std::fmt::Debug for ShapeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapeOptions")
            .field("fetch_as", &self.fetch_as)
            .field("dimension", &self.dimension)
            .field("lazy", &self.lazy)
            .field("except", &self.except)
            .field("transform", &self.transform.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Convert a driver-native result set into the requested shape.
///
/// Non-lazy calls produce an eager row or list; `lazy` produces a
/// [`RowIter`], a finite sequence that shapes one row per `next()` and
/// cannot be restarted.
#[must_use]
pub fn store(result: ResultSet, opts: &ShapeOptions) -> Payload {
    if opts.lazy {
        return Payload::Lazy(RowIter::new(result, opts));
    }
    match opts.dimension {
        Dimension::One => {
            let mut rows = result.rows.into_iter();
            match rows.next() {
                Some(row) => {
                    let shaped = shape_row(&row, opts.fetch_as, &opts.except);
                    let shaped = match &opts.transform {
                        Some(f) => f(shaped, 0),
                        None => shaped,
                    };
                    Payload::Row(shaped)
                }
                None => Payload::None,
            }
        }
        Dimension::Many => {
            let shaped: Vec<JsonValue> = result
                .rows
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    let shaped = shape_row(row, opts.fetch_as, &opts.except);
                    match &opts.transform {
                        Some(f) => f(shaped, i),
                        None => shaped,
                    }
                })
                .collect();
            Payload::Rows(shaped)
        }
    }
}

/// Shape a single row as assoc, positional, or both, dropping `except`
/// columns.
#[must_use]
pub fn shape_row(row: &DbRow, fetch_as: FetchAs, except: &[String]) -> JsonValue {
    let keep =
        |name: &str| -> bool { !except.iter().any(|ex| ex.eq_ignore_ascii_case(name)) };

    match fetch_as {
        FetchAs::Assoc => {
            let mut map = Map::new();
            for (name, value) in row.column_names.iter().zip(row.values.iter()) {
                if keep(name) {
                    map.insert(name.clone(), value_to_json(value));
                }
            }
            JsonValue::Object(map)
        }
        FetchAs::Num => {
            let list: Vec<JsonValue> = row
                .column_names
                .iter()
                .zip(row.values.iter())
                .filter(|(name, _)| keep(name))
                .map(|(_, value)| value_to_json(value))
                .collect();
            JsonValue::Array(list)
        }
        FetchAs::Both => {
            let mut map = Map::new();
            let mut idx = 0usize;
            for (name, value) in row.column_names.iter().zip(row.values.iter()) {
                if keep(name) {
                    let json = value_to_json(value);
                    map.insert(idx.to_string(), json.clone());
                    map.insert(name.clone(), json);
                    idx += 1;
                }
            }
            JsonValue::Object(map)
        }
    }
}

/// Map a driver value into JSON for shaped rows.
#[must_use]
pub fn value_to_json(value: &DbValue) -> JsonValue {
    match value {
        DbValue::Int(i) => JsonValue::Number((*i).into()),
        DbValue::Float(f) => Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        DbValue::Text(s) => JsonValue::String(s.clone()),
        DbValue::Bool(b) => JsonValue::Bool(*b),
        DbValue::Timestamp(dt) => {
            JsonValue::String(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
        DbValue::Null => JsonValue::Null,
        DbValue::Json(v) => v.clone(),
        DbValue::Blob(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Lazy per-row sequence over a consumed result set.
///
/// Finite and non-restartable: each `next()` shapes one row (fetch-as,
/// except-column drop, transform) and the underlying rows are consumed as
/// they are yielded.
pub struct RowIter {
    rows: std::vec::IntoIter<DbRow>,
    fetch_as: FetchAs,
    except: Vec<String>,
    transform: Option<RowTransform>,
    index: usize,
}

impl RowIter {
    fn new(result: ResultSet, opts: &ShapeOptions) -> Self {
        Self {
            rows: result.rows.into_iter(),
            fetch_as: opts.fetch_as,
            except: opts.except.clone(),
            transform: opts.transform.clone(),
            index: 0,
        }
    }

    /// Rows not yet yielded.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Iterator for RowIter {
    type Item = JsonValue;

    fn next(&mut self) -> Option<JsonValue> {
        let row = self.rows.next()?;
        let shaped = shape_row(&row, self.fetch_as, &self.except);
        let shaped = match &self.transform {
            Some(f) => f(shaped, self.index),
            None => shaped,
        };
        self.index += 1;
        Some(shaped)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl std::fmt::Debug for RowIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowIter")
            .field("remaining", &self.rows.len())
            .field("index", &self.index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc as StdArc;

    use super::*;
    use serde_json::json;

    fn sample_set() -> ResultSet {
        let mut rs = ResultSet::with_capacity(2);
        rs.set_column_names(StdArc::new(vec![
            "id".to_string(),
            "name".to_string(),
            "secret".to_string(),
        ]));
        rs.add_row_values(vec![
            DbValue::Int(1),
            DbValue::Text("ada".into()),
            DbValue::Text("x".into()),
        ]);
        rs.add_row_values(vec![
            DbValue::Int(2),
            DbValue::Text("sam".into()),
            DbValue::Text("y".into()),
        ]);
        rs
    }

    #[test]
    fn assoc_shape_drops_excepted_columns() {
        let opts = ShapeOptions {
            except: vec!["secret".to_string()],
            ..ShapeOptions::default()
        };
        let Payload::Rows(rows) = store(sample_set(), &opts) else {
            panic!("expected rows");
        };
        assert_eq!(rows[0], json!({"id": 1, "name": "ada"}));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn num_and_both_shapes() {
        let one = ShapeOptions {
            fetch_as: FetchAs::Num,
            dimension: Dimension::One,
            ..ShapeOptions::default()
        };
        let Payload::Row(row) = store(sample_set(), &one) else {
            panic!("expected row");
        };
        assert_eq!(row, json!([1, "ada", "x"]));

        let both = ShapeOptions {
            fetch_as: FetchAs::Both,
            dimension: Dimension::One,
            ..ShapeOptions::default()
        };
        let Payload::Row(row) = store(sample_set(), &both) else {
            panic!("expected row");
        };
        assert_eq!(row["0"], json!(1));
        assert_eq!(row["name"], json!("ada"));
    }

    #[test]
    fn empty_set_with_dimension_one_is_none() {
        let mut rs = ResultSet::default();
        rs.set_column_names(StdArc::new(vec!["a".to_string()]));
        let opts = ShapeOptions {
            dimension: Dimension::One,
            ..ShapeOptions::default()
        };
        assert!(matches!(store(rs, &opts), Payload::None));
    }

    #[test]
    fn lazy_iter_applies_transform_with_index_and_is_finite() {
        let opts = ShapeOptions {
            lazy: true,
            transform: Some(StdArc::new(|mut row, i| {
                row["pos"] = json!(i);
                row
            })),
            ..ShapeOptions::default()
        };
        let Payload::Lazy(mut iter) = store(sample_set(), &opts) else {
            panic!("expected lazy payload");
        };
        assert_eq!(iter.remaining(), 2);
        let first = iter.next().unwrap();
        assert_eq!(first["pos"], json!(0));
        let second = iter.next().unwrap();
        assert_eq!(second["pos"], json!(1));
        assert!(iter.next().is_none());
        // consumed for good
        assert!(iter.next().is_none());
    }
}
