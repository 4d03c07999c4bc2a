//! Aggregation over the output of a first aggregation.
//!
//! The first stage groups by `group_by`; the second groups its rows again by
//! the coarser `second_group_by`, so e.g. the average number of sales per
//! label can be computed per country.

use std::sync::Arc;

use serde_json::Value as Json;

use super::aggregate::Aggregate;
use super::aggregate_func::AggregateFunc;
use super::column::Column;
use super::options::{PathSpec, QueryOptions};
use super::path::DimensionPath;
use super::{check_limit, order_and_limit, parse_paths, unique_paths, Order, OrderMode, Prepared};
use crate::backend::TempTableContext;
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::sql::{self, TableRef};

const FIRST_AGGREGATE: &str = "__first_aggregate";

#[derive(Debug, Clone)]
pub struct SecondAggregate {
    first: Aggregate,
    select: Vec<DimensionPath>,
    second_group_by: Vec<DimensionPath>,
    /// Arguments are first-stage aggregates or paths selected by the first stage.
    second_aggregates: Vec<AggregateFunc>,
    order: Option<Order>,
    limit: Option<u64>,
}

impl SecondAggregate {
    pub fn new(schema: Arc<Schema>, options: &QueryOptions) -> Result<Self> {
        let first = Aggregate::new(
            Arc::clone(&schema),
            &QueryOptions {
                select: None,
                order: None,
                limit: None,
                second_aggregates: None,
                second_group_by: None,
                ..options.clone()
            },
        )?;
        let fact = first.fact().to_string();

        let second_group_by = unique_paths(parse_paths(
            &schema,
            &fact,
            options.second_group_by.as_deref().unwrap_or_default(),
        )?);
        if let Some((a, b)) = DimensionPath::pairwise_dependencies(&second_group_by) {
            return Err(Error::invalid(format!(
                "second_group_by paths are pairwise dependent: {} depends on {}",
                a, b
            )));
        }
        if let Some(path) = second_group_by
            .iter()
            .find(|p| !p.is_dependent_on_any(&first.group_by))
        {
            return Err(Error::invalid(format!(
                "second_group_by path {} is not dependent on any group_by path",
                path
            )));
        }
        // group_by paths missing from second_group_by get merged away.
        for path in first.group_by.iter().filter(|p| !second_group_by.contains(p)) {
            if !path.last_dimension()?.aggregate_after_grouping {
                return Err(Error::invalid(format!(
                    "Can't aggregate after grouping by {}",
                    path
                )));
            }
        }

        let select = match &options.select {
            Some(specs) => unique_paths(parse_paths(&schema, &fact, specs)?),
            None => second_group_by.clone(),
        };
        if let Some(path) = select.iter().find(|p| !p.is_dependent_on_any(&second_group_by)) {
            return Err(Error::invalid(format!(
                "select path {} is not dependent on any second_group_by path",
                path
            )));
        }

        // Without second aggregates this lists the distinct select values.
        let second_aggregates = options
            .second_aggregates
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|spec| AggregateFunc::parse(spec, |arg| Self::resolve_arg(&schema, &first, arg)))
            .collect::<Result<Vec<_>>>()?;
        if select.is_empty() && second_aggregates.is_empty() {
            return Err(Error::invalid(
                "A second aggregation needs a second aggregate or a path to select",
            ));
        }

        let order = options.order.as_ref().map(Order::parse).transpose()?;
        Ok(Self {
            first,
            select,
            second_group_by,
            second_aggregates,
            order,
            limit: check_limit(options.limit)?,
        })
    }

    /// A string names a first-stage aggregate; a list is a dimension path,
    /// which has to be constant within each first-stage group.
    fn resolve_arg(schema: &Arc<Schema>, first: &Aggregate, arg: &Json) -> Result<Column> {
        match arg {
            Json::String(alias) => first
                .aggregates
                .iter()
                .find(|a| a.alias() == alias)
                .cloned()
                .map(Column::Aggregate)
                .ok_or_else(|| Error::invalid(format!("Unknown aggregate {} in second aggregate", alias))),
            Json::Array(_) => {
                let path = DimensionPath::parse(schema, first.fact(), &PathSpec::from_json(arg)?)?;
                if !path.is_dependent_on_any(&first.group_by) {
                    return Err(Error::invalid(format!(
                        "Second aggregate argument {} is not dependent on any group_by path",
                        path
                    )));
                }
                Ok(Column::Path(path))
            }
            other => Err(Error::invalid(format!(
                "Second aggregate argument must be an aggregate alias or a path, got {}",
                other
            ))),
        }
    }

    pub fn fact(&self) -> &str {
        self.first.fact()
    }

    pub fn columns(&self) -> Vec<Column> {
        self.select
            .iter()
            .cloned()
            .map(Column::Path)
            .chain(self.second_aggregates.iter().cloned().map(Column::Aggregate))
            .collect()
    }

    pub(crate) fn prepare(&self, ctx: &TempTableContext<'_>, mode: OrderMode) -> Result<Prepared> {
        let arg_paths = self.second_aggregates.iter().flat_map(|a| a.paths());
        let first = Aggregate {
            select: unique_paths(
                arg_paths
                    .chain(&self.select)
                    .chain(&self.second_group_by)
                    .cloned()
                    .collect(),
            ),
            ..self.first.clone()
        }
        .prepare(ctx, OrderMode::Skip)?;

        let mut columns: Vec<Column> = self
            .select
            .iter()
            .map(|p| Column::Path(p.of_subquery(FIRST_AGGREGATE)))
            .collect();
        for aggregate in &self.second_aggregates {
            let aggregate = aggregate.map_args(|arg| Ok(arg.of_subquery(FIRST_AGGREGATE)))?;
            columns.push(Column::Aggregate(aggregate));
        }

        let mut dataset = sql::Query::new()
            .from(TableRef::subquery(first.dataset, FIRST_AGGREGATE))
            .select(columns.iter().map(Column::aliased).collect::<Result<Vec<_>>>()?);
        if !self.second_group_by.is_empty() {
            let grouped = unique_paths(self.second_group_by.iter().chain(&self.select).cloned().collect());
            dataset = dataset.group_by(
                grouped
                    .iter()
                    .map(|p| p.of_subquery(FIRST_AGGREGATE).expression())
                    .collect::<Result<Vec<_>>>()?,
            );
        }
        let dataset = order_and_limit(dataset, self.fact(), &columns, self.order.as_ref(), self.limit, mode)?;
        Ok(Prepared { columns, dataset })
    }
}
