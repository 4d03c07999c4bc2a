//! Temporary tables scoped to one query execution.
//!
//! Every table created through a [`TempTableContext`] is dropped when the
//! context goes out of scope, whether execution finished or failed.

use std::cell::RefCell;

use tracing::{debug, warn};
use uuid::Uuid;

use super::Backend;
use crate::config::QuerySettings;
use crate::error::Result;
use crate::schema::Value;
use crate::sql::{self, ColumnDef, CreateTable, Dialect, DropTable, Expr, Insert, SqlDialect};

pub struct TempTableContext<'b> {
    backend: &'b dyn Backend,
    settings: &'b QuerySettings,
    /// Dialect the final statement is rendered in. Temp tables are always
    /// created in the backend's own dialect.
    target: Dialect,
    tables: RefCell<Vec<String>>,
}

impl<'b> TempTableContext<'b> {
    pub fn new(backend: &'b dyn Backend, settings: &'b QuerySettings) -> Self {
        Self {
            backend,
            settings,
            target: backend.dialect(),
            tables: RefCell::new(Vec::new()),
        }
    }

    /// Render the compiled query for another dialect than the backend's.
    pub fn with_target_dialect(mut self, target: Dialect) -> Self {
        self.target = target;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.backend.dialect()
    }

    pub fn target(&self) -> Dialect {
        self.target
    }

    pub fn settings(&self) -> &QuerySettings {
        self.settings
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend
    }

    fn fresh_name(&self) -> String {
        let base = format!("__temp_{}", Uuid::new_v4().simple());
        self.dialect().temp_table_name(&base)
    }

    fn run_create(&self, name: String, create: CreateTable) -> Result<String> {
        let ddl = create.temporary().to_sql(self.dialect());
        debug!("Creating temp table {}:\n{}", name, ddl);
        self.backend.execute(&ddl)?;
        self.tables.borrow_mut().push(name.clone());
        Ok(name)
    }

    /// Create an empty table with the given columns. Returns its name.
    pub fn create_table(&self, columns: Vec<ColumnDef>) -> Result<String> {
        let name = self.fresh_name();
        let create = CreateTable::new(&name).columns(columns);
        self.run_create(name, create)
    }

    /// Create a table holding the rows of `query`. Returns its name.
    pub fn create_table_as(&self, query: &sql::Query) -> Result<String> {
        let name = self.fresh_name();
        let create = CreateTable::new(&name).as_select(query.clone());
        self.run_create(name, create)
    }

    /// Insert rows in batches of `insert_batch_size`.
    pub fn insert_rows(&self, table: &str, columns: &[String], rows: Vec<Vec<Expr>>) -> Result<()> {
        let batch_size = self.settings.insert_batch_size.max(1);
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            let batch: Vec<Vec<Expr>> = rows.by_ref().take(batch_size).collect();
            let insert = Insert::into(table)
                .columns(columns.iter().cloned())
                .values_many(batch)
                .to_sql(self.dialect());
            self.backend.execute(&insert)?;
        }
        Ok(())
    }

    /// Run a query in the backend's dialect and collect every row.
    pub fn query_rows(&self, query: &sql::Query) -> Result<Vec<Vec<Value>>> {
        let sql = query.to_sql(self.dialect());
        debug!("Running helper query:\n{}", sql);
        let mut out = Vec::new();
        self.backend.query(&sql, &mut |rows| {
            for row in rows {
                out.push(row?);
            }
            Ok(())
        })?;
        Ok(out)
    }

    /// Names of the tables created so far, oldest first.
    pub fn tables(&self) -> Vec<String> {
        self.tables.borrow().clone()
    }
}

impl Drop for TempTableContext<'_> {
    fn drop(&mut self) {
        let dialect = self.dialect();
        for name in self.tables.get_mut().drain(..).rev() {
            let drop = DropTable::new(&name).if_exists().to_sql(dialect);
            match self.backend.execute(&drop) {
                Ok(_) => debug!("Dropped temp table {}", name),
                Err(e) => warn!("Failed to drop temp table {}: {}", name, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SqliteBackend;
    use crate::sql::{col, count_star, DataType, TableRef};

    fn table_exists(backend: &SqliteBackend, name: &str) -> bool {
        backend
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_temp_master WHERE name = ?1",
                [name],
                |row| row.get::<_, i64>(0),
            )
            .unwrap()
            > 0
    }

    #[test]
    fn test_tables_dropped_on_scope_exit() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let settings = QuerySettings {
            insert_batch_size: 2,
            ..QuerySettings::default()
        };
        let name;
        {
            let ctx = TempTableContext::new(&backend, &settings);
            name = ctx
                .create_table(vec![ColumnDef::new("n", DataType::Int64).not_null()])
                .unwrap();
            assert!(name.starts_with("__temp_"));

            let rows = (1..=5).map(|n| vec![Expr::from(n as i64)]).collect();
            ctx.insert_rows(&name, &["n".to_string()], rows).unwrap();

            let counted = ctx
                .query_rows(&sql::Query::new().select(vec![count_star()]).from(TableRef::new(&name)))
                .unwrap();
            assert_eq!(counted, vec![vec![Value::Int(5)]]);

            let copy = ctx
                .create_table_as(&sql::Query::new().select(vec![col("n")]).from(TableRef::new(&name)))
                .unwrap();
            assert_eq!(ctx.tables(), vec![name.clone(), copy]);
            assert!(table_exists(&backend, &name));
        }
        assert!(!table_exists(&backend, &name));
    }

    #[test]
    fn test_tables_dropped_after_failure() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let settings = QuerySettings::default();
        let name;
        {
            let ctx = TempTableContext::new(&backend, &settings);
            name = ctx
                .create_table(vec![ColumnDef::new("n", DataType::Int64).not_null()])
                .unwrap();
            let err = ctx
                .insert_rows(&name, &["n".to_string()], vec![vec![Expr::Literal(sql::Literal::Null)]])
                .unwrap_err();
            assert!(err.to_string().contains("NOT NULL"));
        }
        assert!(!table_exists(&backend, &name));
    }
}
