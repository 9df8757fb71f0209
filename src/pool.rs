use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{DbConfig, ServerOptions};
use crate::error::DbError;
use crate::results::ResultSet;
use crate::types::{Binds, DriverKind};
use crate::{mysql, sqlite};

/// How long a ping result stays valid before the server is asked again.
const PING_CACHE_TTL: Duration = Duration::from_secs(3600);

/// A live connection to one of the two drivers.
pub enum DbConnection {
    /// MySQL-protocol server connection
    Server(mysql_async::Conn),
    /// Embedded SQLite connection (pooled, interact-based)
    Embedded(deadpool_sqlite::Object),
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server(_) => f.debug_tuple("Server").field(&"<Conn>").finish(),
            Self::Embedded(_) => f.debug_tuple("Embedded").field(&"<Object>").finish(),
        }
    }
}

/// Uniform statement surface over both drivers.
#[async_trait]
pub trait DriverExecutor {
    /// Execute a SELECT and materialize the result set.
    async fn execute_select(&mut self, sql: &str, binds: &Binds) -> Result<ResultSet, DbError>;

    /// Execute a mutating statement; returns (rows affected, last insert id).
    async fn execute_dml(&mut self, sql: &str, binds: &Binds)
    -> Result<(u64, Option<i64>), DbError>;

    /// Execute statements without materializing anything.
    async fn execute_batch(&mut self, sql: &str) -> Result<(), DbError>;

    /// Row id generated by the most recent INSERT, if any.
    async fn last_insert_id(&mut self) -> Result<Option<i64>, DbError>;

    /// Driver-native string escaping.
    fn escape(&self, value: &str) -> String;

    fn kind(&self) -> DriverKind;
}

#[async_trait]
impl DriverExecutor for DbConnection {
    async fn execute_select(&mut self, sql: &str, binds: &Binds) -> Result<ResultSet, DbError> {
        match self {
            DbConnection::Server(conn) => mysql::execute_select(conn, sql, binds).await,
            DbConnection::Embedded(conn) => sqlite::execute_select(conn, sql, binds).await,
        }
    }

    async fn execute_dml(
        &mut self,
        sql: &str,
        binds: &Binds,
    ) -> Result<(u64, Option<i64>), DbError> {
        match self {
            DbConnection::Server(conn) => mysql::execute_dml(conn, sql, binds).await,
            DbConnection::Embedded(conn) => sqlite::execute_dml(conn, sql, binds).await,
        }
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), DbError> {
        match self {
            DbConnection::Server(conn) => mysql::execute_batch(conn, sql).await,
            DbConnection::Embedded(conn) => sqlite::execute_batch(conn, sql).await,
        }
    }

    async fn last_insert_id(&mut self) -> Result<Option<i64>, DbError> {
        match self {
            DbConnection::Server(conn) => Ok(conn
                .last_insert_id()
                .and_then(|id| i64::try_from(id).ok())),
            DbConnection::Embedded(conn) => sqlite::last_insert_id(conn).await,
        }
    }

    fn escape(&self, value: &str) -> String {
        match self {
            DbConnection::Server(_) => mysql::escape(value),
            DbConnection::Embedded(_) => sqlite::escape(value),
        }
    }

    fn kind(&self) -> DriverKind {
        match self {
            DbConnection::Server(_) => DriverKind::Server,
            DbConnection::Embedded(_) => DriverKind::Embedded,
        }
    }
}

/// Result of a `ping` introspection call.
#[derive(Debug, Clone, Serialize)]
pub struct PingInfo {
    pub connected: bool,
    pub host: String,
    pub user: String,
    pub db: String,
}

impl PingInfo {
    fn disconnected() -> Self {
        Self {
            connected: false,
            host: String::new(),
            user: String::new(),
            db: String::new(),
        }
    }
}

/// Explicit connection-pool object owned by the caller.
///
/// Pools are created lazily on first acquire and cached per driver kind; no
/// ambient shared state. Lifecycle: `acquire` / `ping` / `close`.
pub struct ConnectionManager {
    config: DbConfig,
    server_pool: Option<mysql_async::Pool>,
    file_pool: Option<deadpool_sqlite::Pool>,
    ping_cache: Option<(Instant, PingInfo)>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("server_pool", &self.server_pool.is_some())
            .field("file_pool", &self.file_pool.is_some())
            .finish()
    }
}

impl ConnectionManager {
    #[must_use]
    pub fn new(config: DbConfig) -> Self {
        Self {
            config,
            server_pool: None,
            file_pool: None,
            ping_cache: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> DriverKind {
        self.config.kind()
    }

    #[must_use]
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Point an embedded-file manager at a database file.
    ///
    /// # Errors
    ///
    /// Passing a file path while the configured driver is the relational
    /// server is a fatal `DbError::MismatchedDriver`.
    pub fn connect_file(&mut self, path: impl Into<String>) -> Result<(), DbError> {
        match &mut self.config {
            DbConfig::Server(_) => Err(DbError::MismatchedDriver(
                "file path given but the configured driver is the relational server".to_string(),
            )),
            DbConfig::Embedded {
                path: current,
                silent: _,
            } => {
                *current = path.into();
                self.file_pool = None;
                self.ping_cache = None;
                Ok(())
            }
        }
    }

    async fn server_pool(&mut self, options: &ServerOptions) -> Result<&mysql_async::Pool, DbError> {
        if self.server_pool.is_none() {
            self.server_pool = Some(mysql::create_pool(options)?);
        }
        self.server_pool
            .as_ref()
            .ok_or_else(|| DbError::Connection("server pool unavailable".to_string()))
    }

    async fn file_pool(&mut self, path: &str) -> Result<&deadpool_sqlite::Pool, DbError> {
        if self.file_pool.is_none() {
            self.file_pool = Some(sqlite::create_pool(path).await?);
        }
        self.file_pool
            .as_ref()
            .ok_or_else(|| DbError::Connection("file pool unavailable".to_string()))
    }

    /// Acquire a connection, creating the pool for this driver kind on first
    /// use.
    ///
    /// # Errors
    ///
    /// Connection failures are fatal here; see [`Self::acquire_silent`] for
    /// the demoted form.
    pub async fn acquire(&mut self) -> Result<DbConnection, DbError> {
        match self.config.clone() {
            DbConfig::Server(options) => {
                let pool = self.server_pool(&options).await?;
                let conn = mysql::get_conn(pool).await?;
                Ok(DbConnection::Server(conn))
            }
            DbConfig::Embedded { path, .. } => {
                let pool = self.file_pool(&path).await?;
                let conn = pool.get().await.map_err(DbError::PoolErrorSqlite)?;
                Ok(DbConnection::Embedded(conn))
            }
        }
    }

    /// Acquire with the `silent` policy applied: a connection failure yields
    /// `None` instead of an error when the config says so.
    ///
    /// # Errors
    ///
    /// Only when `silent` is not configured.
    pub async fn acquire_silent(&mut self) -> Result<Option<DbConnection>, DbError> {
        match self.acquire().await {
            Ok(conn) => Ok(Some(conn)),
            Err(err) if self.config.silent() => {
                tracing::warn!(error = %err, "silent connect failure, returning no handle");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Lightweight introspection of the cached handle, TTL-cached.
    ///
    /// With no pool created yet this reports `connected: false` without
    /// error.
    ///
    /// # Errors
    ///
    /// Returns driver errors from the introspection statement itself.
    pub async fn ping(&mut self) -> Result<PingInfo, DbError> {
        if let Some((at, info)) = &self.ping_cache
            && at.elapsed() < PING_CACHE_TTL
        {
            return Ok(info.clone());
        }

        let info = match &self.config {
            DbConfig::Server(_) => {
                let Some(pool) = self.server_pool.as_ref() else {
                    return Ok(PingInfo::disconnected());
                };
                let mut conn = mysql::get_conn(pool).await?;
                let (host, user, db) = mysql::server_info(&mut conn).await?;
                PingInfo {
                    connected: true,
                    host,
                    user,
                    db: db.unwrap_or_default(),
                }
            }
            DbConfig::Embedded { path, .. } => {
                if self.file_pool.is_none() {
                    return Ok(PingInfo::disconnected());
                }
                PingInfo {
                    connected: true,
                    host: "localhost".to_string(),
                    user: String::new(),
                    db: path.clone(),
                }
            }
        };

        self.ping_cache = Some((Instant::now(), info.clone()));
        Ok(info)
    }

    /// Validate the cached handle before reuse.
    pub async fn is_connected(&mut self) -> bool {
        matches!(self.ping().await, Ok(info) if info.connected)
    }

    /// Driver-native escaping without needing a live connection.
    #[must_use]
    pub fn escape(&self, value: &str) -> String {
        match self.kind() {
            DriverKind::Server => mysql::escape(value),
            DriverKind::Embedded => sqlite::escape(value),
        }
    }

    /// Tear down the cached pools.
    pub async fn close(&mut self) {
        if let Some(pool) = self.server_pool.take() {
            let _ = pool.disconnect().await;
        }
        if let Some(pool) = self.file_pool.take() {
            pool.close();
        }
        self.ping_cache = None;
    }
}
