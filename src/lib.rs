//! # dimql
//!
//! Compiles report queries over a dimensional (snowflake) schema into SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Schema (value, dimension and fact types)        │
//! │               loaded from TOML or built in code          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [query]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Aggregate / SecondAggregate / Distribution queries     │
//! │   dimension paths resolved into join trees               │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [sql]
//! ┌─────────────────────────────────────────────────────────┐
//! │       One SELECT (plus scoped temporary tables)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [backend]
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Typed rows from SQLite                   │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod query;
pub mod schema;
pub mod sql;

pub use error::{Error, Result};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::backend::{Backend, SqliteBackend, TempTableContext};
    pub use crate::config::{QuerySettings, Settings};
    pub use crate::error::{Error, Result};
    pub use crate::query::{Column, ColumnDescriptor, Query, QueryOptions, Rows};
    pub use crate::schema::{DimensionDef, Schema, TypeDef, Value, ValueType};
    pub use crate::sql::{Dialect, SqlDialect};
}
