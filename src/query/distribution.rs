//! Histograms of a single numeric result column.
//!
//! The inner query's values are copied into a temporary table, bucket
//! bounds are computed from their range and written to a second table, and
//! the final statement counts values per bucket. Empty buckets count 0.

use tracing::debug;

use super::column::Column;
use super::options::DistributionSpec;
use super::{OrderMode, Prepared, Query};
use crate::backend::TempTableContext;
use crate::error::{Error, Result};
use crate::schema::ValueType;
use crate::sql::{self, col, count, lit_int, max, min, table_col, ColumnDef, DataType, Expr, ExprExt, JoinType, OrderByExpr, SortDir, TableRef};

const VALUES: &str = "__values";
const BUCKETS: &str = "__buckets";

/// `count` half-open buckets `[start, finish)` of equal integer width
/// covering `min..=max`.
pub fn bucket_layout(min: f64, max: f64, count: u32) -> Result<Vec<(i64, i64)>> {
    let out_of_range = || {
        Error::invalid(format!(
            "Values from {} to {} are too wide to split into buckets",
            min, max
        ))
    };
    let start = floor_i64(min).ok_or_else(out_of_range)?;
    let end = floor_i64(max + 1.0).ok_or_else(out_of_range)?;
    let (start, end) = (i128::from(start), i128::from(end));
    let spread = (end - start).max(1);
    let count = i128::from(count.max(1));
    let size = (spread + count - 1) / count;
    let buckets = (spread + size - 1) / size;
    (0..buckets)
        .map(|i| {
            let bounds = (start + i * size, start + (i + 1) * size);
            match (i64::try_from(bounds.0), i64::try_from(bounds.1)) {
                (Ok(lo), Ok(hi)) => Ok((lo, hi)),
                _ => Err(out_of_range()),
            }
        })
        .collect()
}

fn floor_i64(x: f64) -> Option<i64> {
    let x = x.floor();
    (x >= i64::MIN as f64 && x < i64::MAX as f64).then_some(x as i64)
}

#[derive(Debug, Clone)]
pub struct Distribution {
    inner: Box<Query>,
    spec: DistributionSpec,
}

impl Distribution {
    pub fn new(inner: Query, spec: DistributionSpec) -> Result<Self> {
        spec.num_buckets(1)?;
        let columns = inner.columns();
        match columns.as_slice() {
            [column] if column.value_type().is_numeric() => {}
            _ => {
                let described: Vec<String> = columns
                    .iter()
                    .map(|c| format!("{} ({})", c.alias(), c.value_type()))
                    .collect();
                return Err(Error::invalid(format!(
                    "A distribution needs exactly one numeric column, got [{}]",
                    described.join(", ")
                )));
            }
        }
        Ok(Self {
            inner: Box::new(inner),
            spec,
        })
    }

    pub fn inner(&self) -> &Query {
        &self.inner
    }

    pub fn fact(&self) -> &str {
        self.inner.fact()
    }

    pub fn columns() -> Vec<Column> {
        Self::output_columns(count(table_col(VALUES, "value")))
    }

    fn output_columns(count: Expr) -> Vec<Column> {
        let plain = |alias: &str, value_type: ValueType, expr: Expr| Column::Plain {
            alias: alias.to_string(),
            value_type,
            expr,
            null: false,
        };
        vec![
            plain("start", ValueType::float(), table_col(BUCKETS, "start")),
            plain("finish", ValueType::float(), table_col(BUCKETS, "finish")),
            plain("count", ValueType::integer(), count),
        ]
    }

    pub(crate) fn prepare(&self, ctx: &TempTableContext<'_>, mode: OrderMode) -> Result<Prepared> {
        let inner = self.inner.prepare_with(ctx, mode)?;
        let [column] = inner.columns.as_slice() else {
            return Err(Error::invalid("A distribution needs exactly one column"));
        };
        let alias = column.alias();
        let values = ctx.create_table_as(&inner.dataset)?;

        let stats = ctx.query_rows(
            &sql::Query::new()
                .select(vec![max(col(&alias)), min(col(&alias)), count(col(&alias))])
                .from(TableRef::new(&values)),
        )?;
        let layout = match stats.as_slice() {
            [row] => match (row.first(), row.get(1), row.get(2)) {
                (Some(hi), Some(lo), Some(n)) if n.as_counter().unwrap_or(0) > 0 => {
                    match (lo.as_f64(), hi.as_f64()) {
                        (Some(lo), Some(hi)) => {
                            let count = self.spec.num_buckets(ctx.settings().default_num_buckets)?.unwrap_or(1);
                            bucket_layout(lo, hi, count)?
                        }
                        _ => Vec::new(),
                    }
                }
                _ => Vec::new(),
            },
            _ => return Err(Error::unsupported("Distribution statistics query returned no row")),
        };
        debug!("Distribution of {} over {} buckets", alias, layout.len());

        let buckets = ctx.create_table(vec![
            ColumnDef::new("start", DataType::Int64).not_null(),
            ColumnDef::new("finish", DataType::Int64).not_null(),
        ])?;
        let rows = layout
            .iter()
            .map(|(start, finish)| vec![lit_int(*start), lit_int(*finish)])
            .collect();
        ctx.insert_rows(&buckets, &["start".to_string(), "finish".to_string()], rows)?;

        let value = table_col(VALUES, &alias);
        let start = table_col(BUCKETS, "start");
        let finish = table_col(BUCKETS, "finish");
        let columns = Self::output_columns(count(value.clone()));

        let dataset = sql::Query::new()
            .from(TableRef::new(&buckets).with_alias(BUCKETS))
            .join(
                JoinType::Left,
                TableRef::new(&values).with_alias(VALUES),
                value.clone().gte(start.clone()).and(value.lt(finish.clone())),
            )
            .select(columns.iter().map(Column::aliased).collect::<Result<Vec<_>>>()?)
            .group_by(vec![start.clone(), finish])
            .order_by(vec![OrderByExpr::new(start, SortDir::Asc)]);
        Ok(Prepared { columns, dataset })
    }
}
