//! Convenient imports for common functionality.

pub use crate::builder::{JoinType, QuerySpec, SortDir, count_probe};
pub use crate::config::{DbConfig, ServerOptions, SslOptions};
pub use crate::crud::Shape;
pub use crate::db::Db;
pub use crate::envelope::{Envelope, EnvelopeSummary, Payload, QueryStatus};
pub use crate::error::DbError;
pub use crate::executor::StatementOptions;
pub use crate::materialize::{RowIter, RowTransform, ShapeOptions};
pub use crate::pool::{ConnectionManager, DbConnection, DriverExecutor, PingInfo};
pub use crate::results::{DbRow, ResultSet};
pub use crate::transaction::{TxCallback, TxFlags, TxReport, TxState};
pub use crate::types::{Binds, DbValue, Dimension, DriverKind, FetchAs, QueryKind, ReturnAs};
