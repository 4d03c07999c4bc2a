//! SQLite SQL dialect.
//!
//! The dialect of the bundled execution backend:
//! - ANSI identifier quoting (`"`)
//! - `true`/`false` keywords (3.23+)
//! - RIGHT and FULL OUTER JOIN (3.39+)
//! - Type names are affinities, so the ANSI spellings are accepted as-is
//!
//! `STDDEV` is not built in; the backend registers it as an aggregate.

use super::helpers;
use super::SqlDialect;

/// SQLite SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_literal(b)
    }
}
