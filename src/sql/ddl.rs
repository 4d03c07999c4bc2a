//! DDL support for the temporary tables a query materializes.
//!
//! ```ignore
//! use dimql::sql::ddl::{ColumnDef, CreateTable, DataType};
//! use dimql::sql::dialect::Dialect;
//!
//! let table = CreateTable::new("__temp_1")
//!     .temporary()
//!     .column(ColumnDef::new("calendar_day", DataType::Date).not_null());
//!
//! println!("{}", table.to_sql(Dialect::Sqlite));
//! ```

use super::dialect::{Dialect, SqlDialect};
use super::query::Query;
use super::token::{Token, TokenStream};

pub use super::types::DataType;

// =============================================================================
// CREATE TABLE
// =============================================================================

/// CREATE TABLE statement, either with column definitions or `AS SELECT`.
#[derive(Debug, Clone)]
#[must_use = "builders have no effect until used"]
pub struct CreateTable {
    pub name: String,
    pub temporary: bool,
    pub columns: Vec<ColumnDef>,
    pub as_query: Option<Box<Query>>,
}

impl CreateTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            temporary: false,
            columns: Vec::new(),
            as_query: None,
        }
    }

    /// Mark the table as temporary.
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    /// Add a column definition.
    pub fn column(mut self, col: ColumnDef) -> Self {
        self.columns.push(col);
        self
    }

    /// Add multiple column definitions.
    pub fn columns(mut self, cols: impl IntoIterator<Item = ColumnDef>) -> Self {
        self.columns.extend(cols);
        self
    }

    /// Create table from a SELECT query.
    pub fn as_select(mut self, query: Query) -> Self {
        self.as_query = Some(Box::new(query));
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        if let Some(query) = &self.as_query {
            if !dialect.supports_create_table_as() {
                return self.select_into_tokens(query, dialect);
            }
        }

        let mut ts = TokenStream::new();
        ts.push(Token::Create).space();
        if self.temporary && dialect.emit_temporary_keyword() {
            ts.push(Token::Temporary).space();
        }
        ts.push(Token::Table)
            .space()
            .push(Token::Ident(self.name.clone()));

        if let Some(query) = &self.as_query {
            ts.space()
                .push(Token::As)
                .newline()
                .append(&query.to_tokens_for_dialect(dialect));
        } else {
            ts.space().lparen();
            for (i, col) in self.columns.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                ts.append(&col.to_tokens());
            }
            ts.rparen();
        }

        ts
    }

    /// `SELECT * INTO name FROM (query) AS __source`
    fn select_into_tokens(&self, query: &Query, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Select)
            .space()
            .push(Token::Star)
            .space()
            .push(Token::Into)
            .space()
            .push(Token::Ident(self.name.clone()))
            .newline()
            .push(Token::From)
            .space()
            .lparen()
            .append(&query.to_tokens_for_dialect(dialect))
            .rparen()
            .space()
            .push(Token::As)
            .space()
            .push(Token::Ident("__source".into()));
        ts
    }
}

/// A column definition in CREATE TABLE.
#[derive(Debug, Clone)]
#[must_use = "builders have no effect until used"]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: Option<bool>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: None,
        }
    }

    /// Mark column as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = Some(false);
        self
    }

    /// Mark column as NULL (explicitly nullable).
    pub fn null(mut self) -> Self {
        self.nullable = Some(true);
        self
    }

    fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Ident(self.name.clone()))
            .space()
            .push(Token::DataType(self.data_type.clone()));
        match self.nullable {
            Some(false) => {
                ts.space().push(Token::Not).space().push(Token::Null);
            }
            Some(true) => {
                ts.space().push(Token::Null);
            }
            None => {}
        }
        ts
    }
}

// =============================================================================
// DROP TABLE
// =============================================================================

/// DROP TABLE statement.
#[derive(Debug, Clone)]
#[must_use = "builders have no effect until used"]
pub struct DropTable {
    pub name: String,
    pub if_exists: bool,
}

impl DropTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            if_exists: false,
        }
    }

    /// Add IF EXISTS clause.
    pub fn if_exists(mut self) -> Self {
        self.if_exists = true;
        self
    }

    /// Convert to SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        self.to_tokens(dialect).serialize(dialect)
    }

    /// Convert to token stream.
    pub fn to_tokens(&self, dialect: Dialect) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Drop).space().push(Token::Table);
        if self.if_exists && dialect.supports_if_exists() {
            ts.space().push(Token::If).space().push(Token::Exists);
        }
        ts.space().push(Token::Ident(self.name.clone()));
        ts
    }
}
