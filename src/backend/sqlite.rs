//! SQLite backend.
//!
//! Wraps a single `rusqlite` connection. Opening a backend registers the
//! extra SQL functions compiled queries may reference:
//!
//! - `STDDEV(x)` - sample standard deviation, NULL for fewer than two values

use std::path::Path;

use rusqlite::functions::{Aggregate, Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::debug;

use super::{Backend, BackendError, RawRows};
use crate::schema::Value;
use crate::sql::Dialect;

/// Backend over a SQLite database.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open or create a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();
        debug!("Opening SQLite database {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, BackendError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, BackendError> {
        conn.create_aggregate_function(
            "STDDEV",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            SampleStdDev,
        )?;
        Ok(Self { conn })
    }

    /// The underlying connection, e.g. for loading fixtures.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Backend for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&self, sql: &str) -> Result<usize, BackendError> {
        Ok(self.conn.execute(sql, [])?)
    }

    fn query(
        &self,
        sql: &str,
        consumer: &mut dyn FnMut(&mut RawRows<'_>) -> crate::Result<()>,
    ) -> crate::Result<()> {
        let mut stmt = self.conn.prepare(sql).map_err(BackendError::from)?;
        let width = stmt.column_count();
        let mut rows = stmt.query([]).map_err(BackendError::from)?;

        // Stop after the first error; the cursor is unusable past it.
        let mut failed = false;
        let mut iter = std::iter::from_fn(|| {
            if failed {
                return None;
            }
            let next = match rows.next() {
                Ok(Some(row)) => (0..width)
                    .map(|i| row.get_ref(i).map_err(BackendError::from).and_then(from_sqlite))
                    .collect::<Result<Vec<_>, _>>(),
                Ok(None) => return None,
                Err(e) => Err(e.into()),
            };
            failed = next.is_err();
            Some(next)
        });
        consumer(&mut iter)
    }
}

fn from_sqlite(value: ValueRef<'_>) -> Result<Value, BackendError> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(n) => Ok(Value::Int(n)),
        ValueRef::Real(x) => Ok(Value::Float(x)),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|s| Value::Text(s.to_string()))
            .map_err(|e| BackendError::Conversion(format!("invalid UTF-8 in text column: {}", e))),
        ValueRef::Blob(_) => Err(BackendError::Conversion("blob columns are not supported".into())),
    }
}

/// Running mean and sum of squared deviations (Welford).
#[derive(Debug, Default)]
struct Welford {
    n: u64,
    mean: f64,
    m2: f64,
}

struct SampleStdDev;

impl Aggregate<Welford, Option<f64>> for SampleStdDev {
    fn init(&self, _: &mut Context<'_>) -> rusqlite::Result<Welford> {
        Ok(Welford::default())
    }

    fn step(&self, ctx: &mut Context<'_>, acc: &mut Welford) -> rusqlite::Result<()> {
        if let Some(x) = ctx.get::<Option<f64>>(0)? {
            acc.n += 1;
            let delta = x - acc.mean;
            acc.mean += delta / acc.n as f64;
            acc.m2 += delta * (x - acc.mean);
        }
        Ok(())
    }

    fn finalize(&self, _: &mut Context<'_>, acc: Option<Welford>) -> rusqlite::Result<Option<f64>> {
        Ok(acc
            .filter(|a| a.n > 1)
            .map(|a| (a.m2 / (a.n - 1) as f64).sqrt()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(backend: &SqliteBackend, sql: &str) -> Vec<Vec<Value>> {
        let mut out = Vec::new();
        backend
            .query(sql, &mut |rows| {
                for row in rows {
                    out.push(row?);
                }
                Ok(())
            })
            .unwrap();
        out
    }

    #[test]
    fn test_query_maps_scalars() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let rows = collect(&backend, "SELECT 1, 2.5, 'x', NULL");
        assert_eq!(
            rows,
            vec![vec![Value::Int(1), Value::Float(2.5), Value::Text("x".into()), Value::Null]]
        );
    }

    #[test]
    fn test_stddev_aggregate() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.execute("CREATE TABLE t (x INTEGER)").unwrap();
        backend
            .execute("INSERT INTO t VALUES (2), (4), (4), (4), (5), (5), (7), (9)")
            .unwrap();
        let rows = collect(&backend, "SELECT STDDEV(x) FROM t");
        let Value::Float(sd) = rows[0][0] else {
            panic!("expected a float, got {:?}", rows[0][0]);
        };
        assert!((sd - 2.138_089_935).abs() < 1e-6);

        let rows = collect(&backend, "SELECT STDDEV(x) FROM t WHERE x = 2");
        assert_eq!(rows[0][0], Value::Null);
    }

    #[test]
    fn test_blob_is_a_conversion_error() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let err = backend
            .query("SELECT x'00'", &mut |rows| {
                for row in rows {
                    row?;
                }
                Ok(())
            })
            .unwrap_err();
        assert!(err.to_string().contains("blob"));
    }

    #[test]
    fn test_bad_sql_is_a_backend_error() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        assert!(backend.execute("CREATE TABLE (").is_err());
    }
}
