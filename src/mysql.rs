use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, Params, Pool, Row, SslOpts, Value};

use crate::config::{ServerOptions, SslOptions};
use crate::error::DbError;
use crate::results::ResultSet;
use crate::types::{Binds, DbValue};

/// Connect timeout applied when pulling a connection from the pool.
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a connection pool for the server driver.
///
/// Charset and autocommit are applied through connection init statements so
/// every pooled connection starts in the configured state.
///
/// # Errors
///
/// Returns `DbError::Config` when required options are missing.
pub fn create_pool(options: &ServerOptions) -> Result<Pool, DbError> {
    options.validate()?;

    let mut init: Vec<String> = Vec::new();
    if let Some(charset) = &options.charset {
        init.push(format!("SET NAMES {charset}"));
    }
    init.push(format!(
        "SET autocommit={}",
        if options.auto_commit { 1 } else { 0 }
    ));

    let min_connections = if options.persistent { 1 } else { 0 };
    let constraints =
        mysql_async::PoolConstraints::new(min_connections, 10).unwrap_or_default();
    let pool_opts = mysql_async::PoolOpts::default().with_constraints(constraints);

    let ssl_opts = match options.ssl.as_ref().filter(|ssl| ssl.flag) {
        Some(ssl) => Some(build_ssl_opts(ssl)?),
        None => None,
    };

    let builder = OptsBuilder::default()
        .ip_or_hostname(options.host.clone())
        .tcp_port(options.port)
        .user(Some(options.user.clone()))
        .pass(Some(options.password.clone()))
        .db_name(Some(options.db.clone()))
        .socket(options.socket.clone())
        .init(init)
        .ssl_opts(ssl_opts)
        .pool_opts(pool_opts);

    Ok(Pool::new(Opts::from(builder)))
}

/// Translate the configured TLS bundle into driver options. CA roots are
/// applied, both a single certificate file and every `.pem`/`.crt` file
/// under `ca_path`. Client identity and cipher selection stay config-only
/// and are logged when present.
///
/// # Errors
///
/// Returns `DbError::Config` when `ca_path` cannot be read.
fn build_ssl_opts(ssl: &SslOptions) -> Result<SslOpts, DbError> {
    let mut roots = Vec::new();
    if let Some(ca) = &ssl.ca_certificate {
        roots.push(PathBuf::from(ca).into());
    }
    if let Some(dir) = &ssl.ca_path {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| DbError::Config(format!("cannot read ca_path '{dir}': {e}")))?;
        for entry in entries {
            let path = entry
                .map_err(|e| DbError::Config(format!("cannot read ca_path '{dir}': {e}")))?
                .path();
            if path.extension().is_some_and(|ext| ext == "pem" || ext == "crt") {
                roots.push(path.into());
            }
        }
    }

    let mut opts = SslOpts::default();
    if !roots.is_empty() {
        opts = opts.with_root_certs(roots);
    }
    if ssl.key.is_some() || ssl.certificate.is_some() || ssl.cipher_algos.is_some() {
        tracing::warn!(
            "client key/certificate and cipher list are not applied to the socket; only CA roots are"
        );
    }
    Ok(opts)
}

/// Acquire a connection, honoring the connect timeout.
///
/// # Errors
///
/// Returns `DbError::Connection` on timeout or driver refusal.
pub async fn get_conn(pool: &Pool) -> Result<Conn, DbError> {
    match tokio::time::timeout(CONNECT_TIMEOUT, pool.get_conn()).await {
        Ok(conn) => conn.map_err(DbError::MysqlError),
        Err(_) => Err(DbError::Connection(format!(
            "server connect timed out after {}s",
            CONNECT_TIMEOUT.as_secs()
        ))),
    }
}

/// Escape a string for embedding in a single-quoted MySQL literal.
#[must_use]
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            '\x1a' => out.push_str("\\Z"),
            _ => out.push(ch),
        }
    }
    out
}

fn to_mysql_value(value: &DbValue) -> Value {
    match value {
        DbValue::Int(i) => Value::Int(*i),
        DbValue::Float(f) => Value::Double(*f),
        DbValue::Text(s) => Value::Bytes(s.clone().into_bytes()),
        DbValue::Bool(b) => Value::Int(i64::from(*b)),
        DbValue::Timestamp(dt) => {
            Value::Bytes(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string().into_bytes())
        }
        DbValue::Null => Value::NULL,
        DbValue::Json(v) => Value::Bytes(v.to_string().into_bytes()),
        DbValue::Blob(bytes) => Value::Bytes(bytes.clone()),
    }
}

fn from_mysql_value(value: Value) -> DbValue {
    match value {
        Value::NULL => DbValue::Null,
        Value::Int(i) => DbValue::Int(i),
        Value::UInt(u) => i64::try_from(u)
            .map(DbValue::Int)
            .unwrap_or_else(|_| DbValue::Text(u.to_string())),
        Value::Float(f) => DbValue::Float(f64::from(f)),
        Value::Double(d) => DbValue::Float(d),
        Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => DbValue::Text(s),
            Err(err) => DbValue::Blob(err.into_bytes()),
        },
        Value::Date(y, m, d, hh, mm, ss, us) => {
            let ts = NaiveDate::from_ymd_opt(i32::from(y), u32::from(m), u32::from(d))
                .and_then(|date| date.and_hms_micro_opt(u32::from(hh), u32::from(mm), u32::from(ss), us));
            match ts {
                Some(ts) => DbValue::Timestamp(ts),
                None => DbValue::Null,
            }
        }
        Value::Time(neg, days, hh, mm, ss, us) => {
            let sign = if neg { "-" } else { "" };
            let hours = u32::from(hh) + days * 24;
            DbValue::Text(format!("{sign}{hours:02}:{mm:02}:{ss:02}.{us:06}"))
        }
    }
}

fn convert_binds(binds: &Binds) -> Params {
    match binds {
        Binds::None => Params::Empty,
        Binds::Positional(values) => {
            Params::Positional(values.iter().map(to_mysql_value).collect())
        }
        Binds::Named(pairs) => Params::from(
            pairs
                .iter()
                .map(|(k, v)| (k.clone(), to_mysql_value(v)))
                .collect::<Vec<(String, Value)>>(),
        ),
    }
}

/// Normalize a batch of driver rows into a [`ResultSet`].
#[must_use]
pub fn build_result_set(rows: Vec<Row>, rows_affected: u64, last_insert_id: Option<i64>) -> ResultSet {
    let mut result = ResultSet::with_capacity(rows.len());
    result.last_insert_id = last_insert_id;

    if let Some(first) = rows.first() {
        let names: Vec<String> = first
            .columns_ref()
            .iter()
            .map(|col| col.name_str().into_owned())
            .collect();
        result.set_column_names(Arc::new(names));
    }

    for row in rows {
        let values: Vec<DbValue> = row.unwrap().into_iter().map(from_mysql_value).collect();
        result.add_row_values(values);
    }
    if result.rows.is_empty() {
        result.rows_affected = rows_affected;
    }
    result
}

/// Execute a SELECT and materialize the rows.
///
/// # Errors
///
/// Propagates driver errors untouched; the statement executor is the layer
/// that turns them into `DbError::Statement`.
pub async fn execute_select(
    conn: &mut Conn,
    sql: &str,
    binds: &Binds,
) -> Result<ResultSet, DbError> {
    let params = convert_binds(binds);
    let mut query_result = conn.exec_iter(sql, params).await?;
    let rows: Vec<Row> = query_result.collect().await?;
    let affected = query_result.affected_rows();
    let last_id = query_result.last_insert_id().and_then(|id| i64::try_from(id).ok());
    drop(query_result);
    Ok(build_result_set(rows, affected, last_id))
}

/// Execute a mutating statement; returns (rows affected, last insert id).
///
/// # Errors
///
/// Propagates driver errors untouched.
pub async fn execute_dml(
    conn: &mut Conn,
    sql: &str,
    binds: &Binds,
) -> Result<(u64, Option<i64>), DbError> {
    let params = convert_binds(binds);
    conn.exec_drop(sql, params).await?;
    let affected = conn.affected_rows();
    let last_id = conn.last_insert_id().and_then(|id| i64::try_from(id).ok());
    Ok((affected, last_id))
}

/// Execute statements without materializing anything.
///
/// # Errors
///
/// Propagates driver errors untouched.
pub async fn execute_batch(conn: &mut Conn, sql: &str) -> Result<(), DbError> {
    conn.query_drop(sql).await?;
    Ok(())
}

/// Lightweight server introspection used by `ping`.
///
/// # Errors
///
/// Propagates driver errors untouched.
pub async fn server_info(conn: &mut Conn) -> Result<(String, String, Option<String>), DbError> {
    let row: Option<(String, String, Option<String>)> = conn
        .query_first("SELECT @@hostname, CURRENT_USER(), DATABASE()")
        .await?;
    row.ok_or_else(|| DbError::Connection("server returned no introspection row".to_string()))
}
