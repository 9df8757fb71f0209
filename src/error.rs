use deadpool_sqlite::rusqlite;
use thiserror::Error;

/// Error taxonomy for the whole access layer.
///
/// Driver and pool failures pass through transparently; the remaining
/// variants carry the classification the higher layers act on: programmer
/// misuse fails fast (`BuilderUsage`), statement failures keep the offending
/// SQL text, and shape mismatches name expected vs. actual.
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    MysqlError(#[from] mysql_async::Error),

    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error(transparent)]
    PoolErrorSqlite(#[from] deadpool::managed::PoolError<rusqlite::Error>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Mismatched driver: {0}")]
    MismatchedDriver(String),

    #[error("Statement failed: {message}; statement: {statement}")]
    Statement { statement: String, message: String },

    #[error("Result shape mismatch: expected {expected}, got {actual}")]
    TypeCoercion { expected: String, actual: String },

    #[error("Builder misuse: {0}")]
    BuilderUsage(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl From<deadpool_sqlite::InteractError> for DbError {
    fn from(err: deadpool_sqlite::InteractError) -> Self {
        DbError::Other(format!("SQLite interact error: {err}"))
    }
}

impl DbError {
    /// Wrap a driver error as a statement failure, keeping the SQL text.
    #[must_use]
    pub fn statement(statement: &str, err: impl std::fmt::Display) -> Self {
        DbError::Statement {
            statement: statement.to_string(),
            message: err.to_string(),
        }
    }
}
