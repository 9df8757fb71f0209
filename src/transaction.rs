use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::db::Db;
use crate::error::DbError;
use crate::pool::DriverExecutor;
use crate::types::DriverKind;

/// Server-side transaction characteristics, issued with the BEGIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxFlags {
    ConsistentSnapshot,
    ReadOnly,
    ReadWrite,
}

impl TxFlags {
    fn modifier(self) -> &'static str {
        match self {
            TxFlags::ConsistentSnapshot => " WITH CONSISTENT SNAPSHOT",
            TxFlags::ReadOnly => " READ ONLY",
            TxFlags::ReadWrite => " READ WRITE",
        }
    }
}

/// Application-layer transaction nesting state.
///
/// The driver only sees BEGIN when a begin is named; everything else is
/// tracked here. Commit calls through at depth zero only; rollback always
/// calls through. The asymmetry is preserved legacy semantics.
#[derive(Debug, Default)]
pub struct TxState {
    depth: u32,
    active: bool,
    driver_began: bool,
}

impl TxState {
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[must_use]
    pub fn active(&self) -> bool {
        self.active
    }
}

/// Outcome of a scoped transaction when failures are demoted.
#[derive(Debug, Clone, Serialize)]
pub struct TxReport {
    pub status: bool,
    pub message: Option<String>,
}

/// Async callback run inside a scoped transaction.
pub type TxCallback<'a> = Box<
    dyn for<'b> FnOnce(&'b mut Db) -> Pin<Box<dyn Future<Output = Result<(), DbError>> + 'b>> + 'a,
>;

impl Db {
    /// Start (or nest into) a transaction.
    ///
    /// Increments the nesting depth and marks the handle in-transaction.
    /// The driver-level BEGIN is issued only when `name` is supplied;
    /// unnamed begins are tracked at the application layer.
    ///
    /// # Errors
    ///
    /// Driver errors from the BEGIN statement itself.
    pub async fn begin(&mut self, flags: Option<TxFlags>, name: Option<&str>) -> Result<(), DbError> {
        self.tx.depth += 1;
        self.tx.active = true;

        if let Some(name) = name {
            let sql = match self.kind() {
                DriverKind::Server => format!(
                    "START TRANSACTION{}",
                    flags.map(TxFlags::modifier).unwrap_or("")
                ),
                DriverKind::Embedded => "BEGIN".to_string(),
            };
            tracing::debug!(transaction = name, statement = %sql, "driver begin");
            let conn = self.conn_mut().await?;
            conn.execute_batch(&sql).await?;
            self.tx.driver_began = true;
        }
        Ok(())
    }

    /// Commit one nesting level. Only the outermost commit reaches the
    /// driver; nested commits return false without effect.
    ///
    /// # Errors
    ///
    /// Driver errors from the COMMIT statement.
    pub async fn commit(&mut self) -> Result<bool, DbError> {
        if !self.tx.active {
            return Ok(false);
        }
        self.tx.depth = self.tx.depth.saturating_sub(1);
        if self.tx.depth > 0 {
            return Ok(false);
        }

        if self.tx.driver_began {
            let conn = self.conn_mut().await?;
            conn.execute_batch("COMMIT").await?;
        }
        self.tx.active = false;
        self.tx.driver_began = false;
        Ok(true)
    }

    /// Roll back: decrements depth and calls through to the driver
    /// immediately regardless of depth, unlike [`Self::commit`].
    ///
    /// # Errors
    ///
    /// Driver errors from the ROLLBACK statement, when a driver-level
    /// transaction was actually begun.
    pub async fn rollback(&mut self) -> Result<bool, DbError> {
        let driver_began = self.tx.driver_began;
        // the driver transaction is gone after this call either way
        self.tx.driver_began = false;
        self.tx.depth = self.tx.depth.saturating_sub(1);
        if self.tx.depth == 0 {
            self.tx.active = false;
        }

        let conn = self.conn_mut().await?;
        match conn.execute_batch("ROLLBACK").await {
            Ok(()) => Ok(true),
            Err(err) if !driver_began => {
                // nothing to undo at the driver; tracked-only begins
                tracing::warn!(error = %err, "rollback without driver transaction");
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    #[must_use]
    pub fn tx_depth(&self) -> u32 {
        self.tx.depth()
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.tx.active()
    }

    /// Run `callback` inside a transaction: begin, invoke, then commit when
    /// the callback and the last statement both succeeded, roll back
    /// otherwise.
    ///
    /// A failing callback rolls back and either rethrows as
    /// `DbError::Transaction` (`throw_on_error`) or lands in the returned
    /// [`TxReport`].
    ///
    /// # Errors
    ///
    /// Transaction statement errors always; callback errors only with
    /// `throw_on_error`.
    pub async fn scoped_transaction(
        &mut self,
        callback: TxCallback<'_>,
        throw_on_error: bool,
        flags: Option<TxFlags>,
        name: Option<&str>,
    ) -> Result<TxReport, DbError> {
        self.begin(flags, name).await?;

        match callback(self).await {
            Ok(()) => {
                let healthy = self.last_envelope().is_none_or(|env| !env.has_error);
                if healthy {
                    self.commit().await?;
                    Ok(TxReport {
                        status: true,
                        message: None,
                    })
                } else {
                    let message = self
                        .last_envelope()
                        .and_then(|env| env.error.clone())
                        .unwrap_or_else(|| "statement failed inside transaction".to_string());
                    self.rollback().await?;
                    if throw_on_error {
                        Err(DbError::Transaction(message))
                    } else {
                        Ok(TxReport {
                            status: false,
                            message: Some(message),
                        })
                    }
                }
            }
            Err(err) => {
                let message = err.to_string();
                if let Err(rb_err) = self.rollback().await {
                    tracing::warn!(error = %rb_err, "rollback after failed callback also failed");
                }
                if throw_on_error {
                    Err(DbError::Transaction(message))
                } else {
                    Ok(TxReport {
                        status: false,
                        message: Some(message),
                    })
                }
            }
        }
    }
}
