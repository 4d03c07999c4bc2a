//! SQL generation module.
//!
//! A type-safe builder that renders the datasets produced by query
//! compilation as multi-dialect SQL:
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - Expression AST and builder DSL
//! - [`ddl`] - CREATE / DROP for temporary tables
//! - [`dml`] - INSERT for filling temporary tables
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations

pub mod ddl;
pub mod dialect;
pub mod dml;
pub mod expr;
pub mod query;
pub mod token;
pub mod types;

#[cfg(test)]
pub mod test_utils;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    and_all, avg, coalesce, col, count, count_star, func, lit_bool, lit_float, lit_int, lit_null,
    lit_str, max, min, sum, table_col, BinaryOperator, Expr, ExprExt, Literal, UnaryOperator,
};
pub use query::{Join, JoinType, LimitOffset, OrderByExpr, Query, SelectExpr, SortDir, TableRef};
pub use token::{Token, TokenStream};

pub use ddl::{ColumnDef, CreateTable, DataType, DropTable};
pub use dml::Insert;
