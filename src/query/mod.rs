//! Query compilation and execution.
//!
//! A [`Query`] is built from [`QueryOptions`] against a [`Schema`], then
//! compiled into one SQL statement (plus whatever temporary tables that
//! statement reads) and run on a [`Backend`].
//!
//! - [`aggregate`] - grouped aggregation, optionally over every possible group
//! - [`second_aggregate`] - aggregation over the output of an aggregation
//! - [`distribution`] - a histogram of a single numeric result column

pub mod aggregate;
pub mod aggregate_func;
pub mod column;
pub mod distribution;
pub mod filter;
pub mod options;
pub mod path;
pub mod result;
pub mod second_aggregate;

#[cfg(test)]
pub(crate) mod test_schema;

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value as Json};
use tracing::{debug, info};

pub use aggregate::Aggregate;
pub use aggregate_func::{AggregateFunc, AggregateKind};
pub use column::{Column, ColumnDescriptor};
pub use distribution::{bucket_layout, Distribution};
pub use filter::{Filter, FilterOp};
pub use options::{DistributionSpec, OrderSpec, PathSpec, QueryOptions};
pub use path::DimensionPath;
pub use result::Rows;
pub use second_aggregate::SecondAggregate;

use crate::backend::{Backend, RawRows, TempTableContext};
use crate::config::QuerySettings;
use crate::error::{Error, Result};
use crate::schema::{Schema, Type, TypeKind};
use crate::sql::{self, Dialect, OrderByExpr, SortDir};

/// A compiled-on-demand query.
#[derive(Debug, Clone)]
pub enum Query {
    Aggregate(Aggregate),
    SecondAggregate(SecondAggregate),
    Distribution(Distribution),
}

impl Query {
    pub fn new(schema: Arc<Schema>, mut options: QueryOptions) -> Result<Self> {
        fact_type(&schema, &options.fact)?;
        match options.distribution.take() {
            None | Some(DistributionSpec::Enabled(false)) => Self::grouped(schema, options),
            Some(spec) => {
                // Order and limit pick the rows the histogram is built from.
                if options.select.is_none() {
                    options.select = Some(Vec::new());
                }
                let inner = Self::grouped(schema, options)?;
                Ok(Query::Distribution(Distribution::new(inner, spec)?))
            }
        }
    }

    fn grouped(schema: Arc<Schema>, options: QueryOptions) -> Result<Self> {
        if options.is_second_aggregate() {
            Ok(Query::SecondAggregate(SecondAggregate::new(schema, &options)?))
        } else {
            Ok(Query::Aggregate(Aggregate::new(schema, &options)?))
        }
    }

    pub fn fact(&self) -> &str {
        match self {
            Query::Aggregate(q) => q.fact(),
            Query::SecondAggregate(q) => q.fact(),
            Query::Distribution(q) => q.fact(),
        }
    }

    /// Result columns, known without touching a backend.
    pub fn columns(&self) -> Vec<Column> {
        match self {
            Query::Aggregate(q) => q.columns(),
            Query::SecondAggregate(q) => q.columns(),
            Query::Distribution(_) => Distribution::columns(),
        }
    }

    pub fn descriptors(&self) -> Vec<ColumnDescriptor> {
        self.columns().iter().map(Column::descriptor).collect()
    }

    /// Compile into a statement. Temporary tables it reads live as long as `ctx`.
    pub fn prepare(&self, ctx: &TempTableContext<'_>) -> Result<Prepared> {
        self.prepare_with(ctx, OrderMode::Strict)
    }

    pub(crate) fn prepare_with(&self, ctx: &TempTableContext<'_>, mode: OrderMode) -> Result<Prepared> {
        match self {
            Query::Aggregate(q) => q.prepare(ctx, mode),
            Query::SecondAggregate(q) => q.prepare(ctx, mode),
            Query::Distribution(q) => q.prepare(ctx, mode),
        }
    }

    /// Run the query and hand its rows to `consume`. Temporary tables are
    /// dropped before this returns.
    pub fn execute<R>(
        &self,
        backend: &dyn Backend,
        settings: &QuerySettings,
        consume: impl FnOnce(Rows<'_, '_>) -> Result<R>,
    ) -> Result<R> {
        let started = Instant::now();
        let ctx = TempTableContext::new(backend, settings);
        let prepared = self.prepare(&ctx)?;
        let sql = prepared.dataset.to_sql(ctx.dialect());
        debug!("Executing query on {}:\n{}", self.fact(), sql);

        let mut consume = Some(consume);
        let mut output = None;
        backend.query(&sql, &mut |raw: &mut RawRows<'_>| {
            if let Some(consume) = consume.take() {
                output = Some(consume(Rows::new(raw, &prepared.columns))?);
            }
            Ok(())
        })?;
        info!(
            "Query on {} finished in {:?} using {} temp tables",
            self.fact(),
            started.elapsed(),
            ctx.tables().len()
        );
        output.ok_or_else(|| Error::unsupported("Backend returned no result set"))
    }

    /// The SQL this query compiles to for `dialect`. Temporary tables the
    /// statement needs are created on `backend` and dropped again.
    pub fn explain(&self, backend: &dyn Backend, settings: &QuerySettings, dialect: Dialect) -> Result<String> {
        let ctx = TempTableContext::new(backend, settings).with_target_dialect(dialect);
        Ok(self.prepare(&ctx)?.dataset.to_sql(dialect))
    }

    /// A header row of aliases followed by the rows in display form.
    pub fn to_table(&self, backend: &dyn Backend, settings: &QuerySettings) -> Result<Vec<Vec<String>>> {
        self.execute(backend, settings, |rows| {
            let columns = rows.columns();
            let mut table = vec![columns.iter().map(Column::alias).collect()];
            for row in rows {
                table.push(result::display_row(columns, &row?));
            }
            Ok(table)
        })
    }

    /// `{"columns": [descriptor...], "rows": [[external value...]...]}`
    pub fn to_data(&self, backend: &dyn Backend, settings: &QuerySettings) -> Result<Json> {
        self.execute(backend, settings, |rows| {
            let columns = rows.columns();
            let descriptors: Vec<ColumnDescriptor> = columns.iter().map(Column::descriptor).collect();
            let mut data = Vec::new();
            for row in rows {
                data.push(Json::Array(result::external_row(columns, &row?)));
            }
            Ok(json!({ "columns": descriptors, "rows": data }))
        })
    }
}

/// A compiled statement and the columns it yields, in select order.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub columns: Vec<Column>,
    pub dataset: sql::Query,
}

/// A parsed `[column, direction]` order request.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    column: PathSpec,
    dir: SortDir,
}

impl Order {
    pub fn parse(spec: &OrderSpec) -> Result<Self> {
        let dir = match spec.1.to_ascii_lowercase().as_str() {
            "asc" => SortDir::Asc,
            "desc" => SortDir::Desc,
            other => return Err(Error::invalid(format!("Bad order direction {}", other))),
        };
        Ok(Self {
            column: spec.0.clone(),
            dir,
        })
    }

    /// A dotted name matches an alias as given or relative to the fact;
    /// a list of names is always relative to the fact.
    fn find<'c>(&self, fact: &str, columns: &'c [Column]) -> Option<&'c Column> {
        let wanted = match &self.column {
            PathSpec::Dotted(name) => vec![name.clone(), format!("{}.{}", fact, name)],
            PathSpec::Names(names) => vec![format!("{}.{}", fact, names.join("."))],
        };
        columns.iter().find(|c| wanted.contains(&c.alias()))
    }
}

/// How a stage applies the requested order and limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OrderMode {
    /// Apply both; an order column that isn't selected is an error.
    Strict,
    /// Apply both only when the order column is present and there is a limit.
    Graceful,
    /// Apply neither.
    Skip,
}

pub(crate) fn order_and_limit(
    dataset: sql::Query,
    fact: &str,
    columns: &[Column],
    order: Option<&Order>,
    limit: Option<u64>,
    mode: OrderMode,
) -> Result<sql::Query> {
    match mode {
        OrderMode::Skip => Ok(dataset),
        OrderMode::Strict => {
            let mut dataset = dataset;
            if let Some(order) = order {
                let column = order.find(fact, columns).ok_or_else(|| {
                    Error::invalid(format!(
                        "Requested order column {} not found amongst the available columns",
                        order.column
                    ))
                })?;
                dataset = dataset.order_by(vec![OrderByExpr::new(column.expression()?, order.dir)]);
            }
            if let Some(limit) = limit {
                dataset = dataset.limit(limit);
            }
            Ok(dataset)
        }
        OrderMode::Graceful => {
            let found = order.and_then(|o| o.find(fact, columns).map(|c| (o, c)));
            match (found, limit) {
                (Some((order, column)), Some(limit)) => Ok(dataset
                    .order_by(vec![OrderByExpr::new(column.expression()?, order.dir)])
                    .limit(limit)),
                _ => {
                    debug!("Not ordering inner query on {}", fact);
                    Ok(dataset)
                }
            }
        }
    }
}

/// Limits are rendered as signed SQL integers.
pub(crate) fn check_limit(limit: Option<u64>) -> Result<Option<u64>> {
    match limit {
        Some(n) if i64::try_from(n).is_err() => Err(Error::invalid(format!("Limit {} is too large", n))),
        _ => Ok(limit),
    }
}

pub(crate) fn fact_type<'s>(schema: &'s Schema, name: &str) -> Result<&'s Type> {
    schema
        .get(name)
        .filter(|t| t.kind == TypeKind::Fact)
        .ok_or_else(|| Error::invalid(format!("Fact {} not found", name)))
}

pub(crate) fn parse_paths(schema: &Arc<Schema>, fact: &str, specs: &[PathSpec]) -> Result<Vec<DimensionPath>> {
    specs
        .iter()
        .map(|spec| DimensionPath::parse(schema, fact, spec))
        .collect()
}

/// Drop repeated paths, keeping first occurrences in order.
pub(crate) fn unique_paths(paths: Vec<DimensionPath>) -> Vec<DimensionPath> {
    let mut unique: Vec<DimensionPath> = Vec::with_capacity(paths.len());
    for path in paths {
        if !unique.contains(&path) {
            unique.push(path);
        }
    }
    unique
}
