//! SQL Dialect definitions and formatting rules.
//!
//! This module provides a trait-based abstraction for SQL dialect differences.
//! Each dialect implements `SqlDialect` to handle its specific syntax:
//!
//! - Identifier quoting: `"` (ANSI/PG/DuckDB/SQLite), `` ` `` (MySQL), `[]` (T-SQL)
//! - Pagination: LIMIT/OFFSET vs OFFSET FETCH
//! - Boolean literals: true/false vs 1/0
//! - Outer join support: MySQL has no FULL OUTER JOIN
//! - Temporary tables: `CREATE TEMPORARY TABLE` vs `#name` with `SELECT INTO`
//!
//! # Usage
//!
//! ```ignore
//! use dimql::sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! let quoted = dialect.quote_identifier("sale.label");  // "sale.label"
//! ```

mod duckdb;
pub mod helpers;
mod mysql;
mod postgres;
mod sqlite;
mod tsql;

pub use duckdb::DuckDb;
pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;
pub use tsql::TSql;

use super::token::TokenStream;
use super::types::DataType;

/// SQL dialect trait.
///
/// Implement this to add support for a new SQL dialect.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    ///
    /// Aliases produced by the query compiler contain dots
    /// (`sale.label.title`), so quoting is always applied.
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    /// Format a boolean literal.
    fn format_bool(&self, b: bool) -> &'static str;

    /// Format a NULL literal.
    fn format_null(&self) -> &'static str {
        "NULL"
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit LIMIT/OFFSET or equivalent pagination clause.
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    /// Whether this dialect requires ORDER BY for OFFSET/LIMIT.
    ///
    /// T-SQL requires ORDER BY when using OFFSET FETCH.
    fn requires_order_by_for_offset(&self) -> bool {
        false
    }

    // =========================================================================
    // JOIN Syntax
    // =========================================================================

    /// Whether this dialect supports FULL OUTER JOIN.
    fn supports_full_outer_join(&self) -> bool {
        true
    }

    // =========================================================================
    // Functions and Types
    // =========================================================================

    /// Remap a function name for this dialect.
    ///
    /// Returns `Some(new_name)` if the function should be remapped, `None` to keep original.
    /// The input is matched case-insensitively.
    fn remap_function(&self, name: &str) -> Option<&'static str> {
        let _ = name;
        None
    }

    /// Emit a column data type for this dialect.
    fn emit_data_type(&self, dt: &DataType) -> String {
        dt.to_string()
    }

    // =========================================================================
    // Temporary Tables
    // =========================================================================

    /// Whether this dialect supports IF EXISTS for DROP statements.
    fn supports_if_exists(&self) -> bool {
        true
    }

    /// Whether CREATE takes a TEMPORARY keyword (false where the name marks it).
    fn emit_temporary_keyword(&self) -> bool {
        true
    }

    /// Physical name for a temporary table with the given base name.
    fn temp_table_name(&self, base: &str) -> String {
        base.to_string()
    }

    /// Whether `CREATE TABLE t AS SELECT ...` is available.
    ///
    /// T-SQL spells this `SELECT * INTO t FROM (...)`.
    fn supports_create_table_as(&self) -> bool {
        true
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Sqlite,
    DuckDb,
    TSql,
    MySql,
    Postgres,
}

impl Dialect {
    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Sqlite => &Sqlite,
            Dialect::DuckDb => &DuckDb,
            Dialect::Postgres => &Postgres,
            Dialect::TSql => &TSql,
            Dialect::MySql => &MySql,
        }
    }

    /// Look a dialect up by its display name.
    pub fn from_name(name: &str) -> Option<Dialect> {
        match name.to_ascii_lowercase().as_str() {
            "sqlite" => Some(Dialect::Sqlite),
            "duckdb" => Some(Dialect::DuckDb),
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "mysql" => Some(Dialect::MySql),
            "tsql" | "mssql" => Some(Dialect::TSql),
            _ => None,
        }
    }
}

// Implement SqlDialect for Dialect enum by delegating to concrete types
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.dialect().format_bool(b)
    }

    fn format_null(&self) -> &'static str {
        self.dialect().format_null()
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        self.dialect().requires_order_by_for_offset()
    }

    fn supports_full_outer_join(&self) -> bool {
        self.dialect().supports_full_outer_join()
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        self.dialect().remap_function(name)
    }

    fn emit_data_type(&self, dt: &DataType) -> String {
        self.dialect().emit_data_type(dt)
    }

    fn supports_if_exists(&self) -> bool {
        self.dialect().supports_if_exists()
    }

    fn emit_temporary_keyword(&self) -> bool {
        self.dialect().emit_temporary_keyword()
    }

    fn temp_table_name(&self, base: &str) -> String {
        self.dialect().temp_table_name(base)
    }

    fn supports_create_table_as(&self) -> bool {
        self.dialect().supports_create_table_as()
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_display() {
        assert_eq!(Dialect::Sqlite.to_string(), "sqlite");
        assert_eq!(Dialect::DuckDb.to_string(), "duckdb");
        assert_eq!(Dialect::Postgres.to_string(), "postgres");
        assert_eq!(Dialect::TSql.to_string(), "tsql");
        assert_eq!(Dialect::MySql.to_string(), "mysql");
    }

    #[test]
    fn test_from_name_round_trips_display() {
        for d in [
            Dialect::Sqlite,
            Dialect::DuckDb,
            Dialect::Postgres,
            Dialect::TSql,
            Dialect::MySql,
        ] {
            assert_eq!(Dialect::from_name(&d.to_string()), Some(d));
        }
        assert_eq!(Dialect::from_name("oracle"), None);
    }

    #[test]
    fn test_quote_identifier_escaping() {
        assert_eq!(
            Dialect::Sqlite.quote_identifier("weird\"name"),
            "\"weird\"\"name\""
        );
        assert_eq!(
            Dialect::TSql.quote_identifier("weird]name"),
            "[weird]]name]"
        );
        assert_eq!(
            Dialect::MySql.quote_identifier("weird`name"),
            "`weird``name`"
        );
    }

    #[test]
    fn test_format_bool() {
        assert_eq!(Dialect::Sqlite.format_bool(true), "true");
        assert_eq!(Dialect::Postgres.format_bool(false), "false");
        assert_eq!(Dialect::TSql.format_bool(true), "1");
        assert_eq!(Dialect::MySql.format_bool(false), "0");
    }

    #[test]
    fn test_full_outer_join_support() {
        assert!(Dialect::Sqlite.supports_full_outer_join());
        assert!(Dialect::Postgres.supports_full_outer_join());
        assert!(Dialect::TSql.supports_full_outer_join());
        assert!(!Dialect::MySql.supports_full_outer_join());
    }

    #[test]
    fn test_temp_tables() {
        assert_eq!(Dialect::Sqlite.temp_table_name("__temp_1"), "__temp_1");
        assert_eq!(Dialect::TSql.temp_table_name("__temp_1"), "#__temp_1");
        assert!(!Dialect::TSql.emit_temporary_keyword());
        assert!(!Dialect::TSql.supports_create_table_as());
    }

    #[test]
    fn test_data_types() {
        assert_eq!(Dialect::Postgres.emit_data_type(&DataType::Bool), "BOOLEAN");
        assert_eq!(Dialect::MySql.emit_data_type(&DataType::Bool), "TINYINT(1)");
        assert_eq!(Dialect::TSql.emit_data_type(&DataType::Bool), "BIT");
        assert_eq!(Dialect::TSql.emit_data_type(&DataType::Timestamp), "DATETIME2");
    }
}
