use std::path::Path;
use std::sync::Arc;

use deadpool_sqlite::rusqlite::{self, Statement, ToSql};
use deadpool_sqlite::{Config as SqliteConfig, Object, Pool, Runtime};

use crate::error::DbError;
use crate::results::ResultSet;
use crate::types::{Binds, DbValue};

/// Build a pool for the embedded-file driver, creating the parent directory
/// when it does not exist yet.
///
/// # Errors
///
/// Returns `DbError::Connection` when the directory cannot be created or the
/// pool cannot be built.
pub async fn create_pool(db_path: &str) -> Result<Pool, DbError> {
    if let Some(parent) = Path::new(db_path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            DbError::Connection(format!("cannot create database directory: {e}"))
        })?;
    }

    let cfg = SqliteConfig::new(db_path.to_string());
    let pool = cfg
        .create_pool(Runtime::Tokio1)
        .map_err(|e| DbError::Connection(format!("failed to create SQLite pool: {e}")))?;

    // Initialize the database
    {
        let conn = pool.get().await.map_err(DbError::PoolErrorSqlite)?;
        conn.interact(|conn| {
            conn.execute_batch("PRAGMA journal_mode = WAL;")
                .map_err(DbError::SqliteError)
        })
        .await??;
    }

    Ok(pool)
}

/// Escape a string for embedding in a single-quoted SQLite literal.
#[must_use]
pub fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

/// Bind unified values to SQLite types.
#[must_use]
pub fn convert_params(params: &[DbValue]) -> Vec<rusqlite::types::Value> {
    params
        .iter()
        .map(|p| match p {
            DbValue::Int(i) => rusqlite::types::Value::Integer(*i),
            DbValue::Float(f) => rusqlite::types::Value::Real(*f),
            DbValue::Text(s) => rusqlite::types::Value::Text(s.clone()),
            DbValue::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
            DbValue::Timestamp(dt) => {
                rusqlite::types::Value::Text(dt.format("%F %T%.f").to_string())
            }
            DbValue::Null => rusqlite::types::Value::Null,
            DbValue::Json(v) => rusqlite::types::Value::Text(v.to_string()),
            DbValue::Blob(bytes) => rusqlite::types::Value::Blob(bytes.clone()),
        })
        .collect()
}

fn convert_named(pairs: &[(String, DbValue)]) -> Vec<(String, rusqlite::types::Value)> {
    pairs
        .iter()
        .map(|(k, v)| {
            let key = if k.starts_with(':') {
                k.clone()
            } else {
                format!(":{k}")
            };
            (key, convert_params(std::slice::from_ref(v)).remove(0))
        })
        .collect()
}

fn extract_value(row: &rusqlite::Row, idx: usize) -> Result<DbValue, DbError> {
    match row.get_ref(idx) {
        Err(e) => Err(DbError::SqliteError(e)),
        Ok(rusqlite::types::ValueRef::Null) => Ok(DbValue::Null),
        Ok(rusqlite::types::ValueRef::Integer(i)) => Ok(DbValue::Int(i)),
        Ok(rusqlite::types::ValueRef::Real(f)) => Ok(DbValue::Float(f)),
        Ok(rusqlite::types::ValueRef::Text(bytes)) => {
            Ok(DbValue::Text(String::from_utf8_lossy(bytes).into_owned()))
        }
        Ok(rusqlite::types::ValueRef::Blob(b)) => Ok(DbValue::Blob(b.to_vec())),
    }
}

/// Run a prepared statement and normalize its rows into a [`ResultSet`].
///
/// # Errors
///
/// Propagates driver errors untouched.
pub fn build_result_set(
    stmt: &mut Statement,
    binds: &SqliteBinds,
) -> Result<ResultSet, DbError> {
    let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let column_names = Arc::new(column_names);

    let mut rows_iter = match binds {
        SqliteBinds::None => stmt.query([])?,
        SqliteBinds::Positional(values) => {
            let refs: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
            stmt.query(&refs[..])?
        }
        SqliteBinds::Named(pairs) => {
            let refs: Vec<(&str, &dyn ToSql)> = pairs
                .iter()
                .map(|(k, v)| (k.as_str(), v as &dyn ToSql))
                .collect();
            stmt.query(&refs[..])?
        }
    };

    let mut result = ResultSet::default();
    result.set_column_names(column_names.clone());

    while let Some(row) = rows_iter.next()? {
        let mut values = Vec::with_capacity(column_names.len());
        for i in 0..column_names.len() {
            values.push(extract_value(row, i)?);
        }
        result.add_row_values(values);
    }

    Ok(result)
}

/// Driver-native bind form, precomputed outside the interact closure.
#[derive(Debug, Clone)]
pub enum SqliteBinds {
    None,
    Positional(Vec<rusqlite::types::Value>),
    Named(Vec<(String, rusqlite::types::Value)>),
}

impl From<&Binds> for SqliteBinds {
    fn from(binds: &Binds) -> Self {
        match binds {
            Binds::None => SqliteBinds::None,
            Binds::Positional(values) => SqliteBinds::Positional(convert_params(values)),
            Binds::Named(pairs) => SqliteBinds::Named(convert_named(pairs)),
        }
    }
}

/// Execute a SELECT on the interact thread and materialize the rows.
///
/// # Errors
///
/// Propagates driver errors untouched.
pub async fn execute_select(
    client: &Object,
    sql: &str,
    binds: &Binds,
) -> Result<ResultSet, DbError> {
    let sql_owned = sql.to_owned();
    let binds_owned = SqliteBinds::from(binds);

    client
        .interact(move |conn| {
            let mut stmt = conn.prepare(&sql_owned)?;
            build_result_set(&mut stmt, &binds_owned)
        })
        .await?
}

/// Execute a mutating statement; returns (rows affected, last insert rowid).
///
/// # Errors
///
/// Propagates driver errors untouched.
pub async fn execute_dml(
    client: &Object,
    sql: &str,
    binds: &Binds,
) -> Result<(u64, Option<i64>), DbError> {
    let sql_owned = sql.to_owned();
    let binds_owned = SqliteBinds::from(binds);

    client
        .interact(move |conn| {
            let mut stmt = conn.prepare(&sql_owned)?;
            let affected = match &binds_owned {
                SqliteBinds::None => stmt.execute([])?,
                SqliteBinds::Positional(values) => {
                    let refs: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
                    stmt.execute(&refs[..])?
                }
                SqliteBinds::Named(pairs) => {
                    let refs: Vec<(&str, &dyn ToSql)> = pairs
                        .iter()
                        .map(|(k, v)| (k.as_str(), v as &dyn ToSql))
                        .collect();
                    stmt.execute(&refs[..])?
                }
            };
            drop(stmt);
            let last_id = conn.last_insert_rowid();
            Ok::<(u64, Option<i64>), DbError>((
                affected as u64,
                if last_id > 0 { Some(last_id) } else { None },
            ))
        })
        .await?
}

/// Execute a batch of statements as-is.
///
/// # Errors
///
/// Propagates driver errors untouched.
pub async fn execute_batch(client: &Object, sql: &str) -> Result<(), DbError> {
    let sql_owned = sql.to_owned();
    client
        .interact(move |conn| conn.execute_batch(&sql_owned).map_err(DbError::SqliteError))
        .await?
}

/// Last insert rowid on this connection.
///
/// # Errors
///
/// Propagates interact errors untouched.
pub async fn last_insert_id(client: &Object) -> Result<Option<i64>, DbError> {
    client
        .interact(|conn| {
            let id = conn.last_insert_rowid();
            Ok::<Option<i64>, DbError>(if id > 0 { Some(id) } else { None })
        })
        .await?
}
