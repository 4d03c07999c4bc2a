//! INSERT support for filling temporary tables.
//!
//! ```ignore
//! use dimql::sql::dml::Insert;
//! use dimql::sql::expr::{lit_int, lit_float};
//!
//! let insert = Insert::into("__temp_1")
//!     .columns(["start", "finish"])
//!     .values([lit_float(0.0), lit_float(5.0)]);
//! ```

use super::dialect::Dialect;
use super::expr::Expr;
use super::token::{Token, TokenStream};

/// INSERT ... VALUES statement.
#[derive(Debug, Clone)]
#[must_use = "DML statements have no effect until converted to SQL with to_sql()"]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Vec<Expr>>,
}

impl Insert {
    /// Create a new INSERT statement.
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Set the columns to insert.
    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = cols.into_iter().map(|c| c.into()).collect();
        self
    }

    /// Add a row of values.
    pub fn values(mut self, vals: impl IntoIterator<Item = impl Into<Expr>>) -> Self {
        self.values.push(vals.into_iter().map(|v| v.into()).collect());
        self
    }

    /// Add multiple rows of values.
    pub fn values_many(mut self, rows: impl IntoIterator<Item = Vec<Expr>>) -> Self {
        self.values.extend(rows);
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();

        ts.push(Token::Insert)
            .space()
            .push(Token::Into)
            .space()
            .push(Token::Ident(self.table.clone()));

        if !self.columns.is_empty() {
            ts.space().lparen();
            for (i, col) in self.columns.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.push(Token::Ident(col.clone()));
            }
            ts.rparen();
        }

        ts.space().push(Token::Values);
        for (row_idx, row) in self.values.iter().enumerate() {
            if row_idx > 0 {
                ts.comma();
            }
            ts.space().lparen();
            for (i, val) in row.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&val.to_tokens_for_dialect(dialect));
            }
            ts.rparen();
        }

        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::expr::{lit_bool, lit_float, lit_int, lit_null, lit_str};
    use crate::sql::test_utils::validate_sql;

    #[test]
    fn test_insert_single_row() {
        let insert = Insert::into("__temp_1")
            .columns(["calendar_day", "calendar_day.day_of_week"])
            .values([lit_str("2024-01-01"), lit_int(1)]);

        let sql = insert.to_sql(Dialect::Sqlite);
        assert_eq!(
            sql,
            "INSERT INTO \"__temp_1\" (\"calendar_day\", \"calendar_day.day_of_week\") \
             VALUES ('2024-01-01', 1)"
        );
        validate_sql(&sql, Dialect::Sqlite).unwrap();
    }

    #[test]
    fn test_insert_many_rows() {
        let insert = Insert::into("buckets")
            .columns(["start", "finish"])
            .values_many(vec![
                vec![lit_float(0.0), lit_float(5.0)],
                vec![lit_float(5.0), lit_float(10.0)],
            ]);

        let sql = insert.to_sql(Dialect::Postgres);
        assert!(sql.contains("VALUES (0.0, 5.0), (5.0, 10.0)"));
        validate_sql(&sql, Dialect::Postgres).unwrap();
    }

    #[test]
    fn test_insert_dialect_literals() {
        let insert = Insert::into("flags")
            .columns(["flag", "note"])
            .values([lit_bool(true), lit_null()]);

        assert_eq!(
            insert.to_sql(Dialect::TSql),
            "INSERT INTO [flags] ([flag], [note]) VALUES (1, NULL)"
        );
    }
}
