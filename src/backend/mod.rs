//! Execution backends.
//!
//! Query compilation produces SQL; a [`Backend`] runs it. The layer is
//! synchronous and pull-based: rows are handed to a consumer as a lazy
//! iterator over the open cursor, so large results are never buffered here.
//!
//! - [`sqlite`] - the bundled SQLite implementation
//! - [`temp_table`] - scoped temporary tables for one execution
//! - [`dataset`] - join trees rendered as a SELECT skeleton

pub mod dataset;
pub mod sqlite;
pub mod temp_table;

pub use dataset::from_tables;
pub use sqlite::SqliteBackend;
pub use temp_table::TempTableContext;

use crate::schema::Value;
use crate::sql::Dialect;

/// Errors raised by a backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Conversion error: {0}")]
    Conversion(String),
}

/// Raw result rows, one scalar per selected column, in select order.
pub type RawRows<'a> = dyn Iterator<Item = Result<Vec<Value>, BackendError>> + 'a;

/// Something that can run SQL.
pub trait Backend {
    /// Dialect the backend expects statements in.
    fn dialect(&self) -> Dialect;

    /// Run a statement that returns no rows. Returns the affected row count.
    fn execute(&self, sql: &str) -> Result<usize, BackendError>;

    /// Run a SELECT and hand its rows to `consumer`. The iterator is only
    /// valid for the duration of the call.
    fn query(
        &self,
        sql: &str,
        consumer: &mut dyn FnMut(&mut RawRows<'_>) -> crate::Result<()>,
    ) -> crate::Result<()>;
}
