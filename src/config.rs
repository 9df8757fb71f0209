use serde::{Deserialize, Serialize};

use crate::error::DbError;
use crate::types::DriverKind;

/// TLS bundle for the server driver.
///
/// Fields mirror the connection options accepted by the server: client key
/// and certificate, CA certificate or directory, permitted cipher list, and
/// an on/off flag. CA roots (`ca_certificate` plus `.pem`/`.crt` files under
/// `ca_path`) are applied to the socket. Client identity and the cipher list
/// are carried for config compatibility only and logged when set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SslOptions {
    pub key: Option<String>,
    pub certificate: Option<String>,
    pub ca_certificate: Option<String>,
    pub ca_path: Option<String>,
    pub cipher_algos: Option<String>,
    pub flag: bool,
}

/// Connection options for the MySQL-protocol server driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerOptions {
    pub host: String,
    pub user: String,
    pub password: String,
    pub db: String,
    pub port: u16,
    pub socket: Option<String>,
    pub charset: Option<String>,
    pub ssl: Option<SslOptions>,
    /// Keep at least one pooled connection alive between uses.
    pub persistent: bool,
    /// Demote connection failures to a missing handle instead of an error.
    pub silent: bool,
    pub auto_commit: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: String::new(),
            password: String::new(),
            db: String::new(),
            port: 3306,
            socket: None,
            charset: None,
            ssl: None,
            persistent: false,
            silent: false,
            auto_commit: true,
        }
    }
}

impl ServerOptions {
    /// Validate that the required fields are present.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Config` naming the first missing field.
    pub fn validate(&self) -> Result<(), DbError> {
        if self.host.is_empty() {
            return Err(DbError::Config("host is required".to_string()));
        }
        if self.user.is_empty() {
            return Err(DbError::Config("user is required".to_string()));
        }
        if self.db.is_empty() {
            return Err(DbError::Config("db is required".to_string()));
        }
        Ok(())
    }
}

/// Complete connection configuration, one variant per driver kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum DbConfig {
    Server(ServerOptions),
    /// Embedded SQLite database file; the parent directory is created on
    /// first connect if absent.
    Embedded {
        path: String,
        #[serde(default)]
        silent: bool,
    },
}

impl DbConfig {
    #[must_use]
    pub fn server(options: ServerOptions) -> Self {
        DbConfig::Server(options)
    }

    #[must_use]
    pub fn embedded(path: impl Into<String>) -> Self {
        DbConfig::Embedded {
            path: path.into(),
            silent: false,
        }
    }

    #[must_use]
    pub fn kind(&self) -> DriverKind {
        match self {
            DbConfig::Server(_) => DriverKind::Server,
            DbConfig::Embedded { .. } => DriverKind::Embedded,
        }
    }

    #[must_use]
    pub fn silent(&self) -> bool {
        match self {
            DbConfig::Server(opts) => opts.silent,
            DbConfig::Embedded { silent, .. } => *silent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_options_require_host_user_db() {
        let mut opts = ServerOptions::default();
        assert!(matches!(opts.validate(), Err(DbError::Config(_))));
        opts.host = "localhost".into();
        opts.user = "app".into();
        opts.db = "app".into();
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn config_deserializes_with_driver_tag() {
        let cfg: DbConfig =
            serde_json::from_str(r#"{"driver":"embedded","path":"data/app.db"}"#).unwrap();
        assert_eq!(cfg.kind(), DriverKind::Embedded);
        assert!(!cfg.silent());
    }
}
