//! Grouped aggregation over a fact.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::aggregate_func::AggregateFunc;
use super::column::Column;
use super::filter::{range_for, Filter};
use super::options::{PathSpec, QueryOptions};
use super::path::DimensionPath;
use super::{check_limit, fact_type, order_and_limit, parse_paths, unique_paths, Order, OrderMode, Prepared};
use crate::backend::{from_tables, TempTableContext};
use crate::error::{Error, Result};
use crate::schema::{Schema, Type};
use crate::sql::{and_all, table_col, Expr, ExprExt, JoinType, SqlDialect, TableRef};

/// Subquery alias of the plain aggregate inside an `include_all_values` query.
const INNER: &str = "__inner";

/// `SELECT select, aggregates ... GROUP BY group_by`.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub(crate) schema: Arc<Schema>,
    pub(crate) fact: String,
    pub(crate) select: Vec<DimensionPath>,
    pub(crate) aggregates: Vec<AggregateFunc>,
    pub(crate) group_by: Vec<DimensionPath>,
    pub(crate) filters: Vec<Filter>,
    pub(crate) include_all_values: bool,
    pub(crate) may_promote: bool,
    pub(crate) order: Option<Order>,
    pub(crate) limit: Option<u64>,
}

impl Aggregate {
    pub fn new(schema: Arc<Schema>, options: &QueryOptions) -> Result<Self> {
        let fact = fact_type(&schema, &options.fact)?.name.clone();

        let group_by = unique_paths(parse_paths(&schema, &fact, &options.group_by)?);
        for path in &group_by {
            if !path.last_dimension()?.group_by {
                return Err(Error::invalid(format!("Can't group by {}", path)));
            }
        }
        if let Some((a, b)) = DimensionPath::pairwise_dependencies(&group_by) {
            return Err(Error::invalid(format!(
                "group_by paths are pairwise dependent: {} depends on {}",
                a, b
            )));
        }

        let aggregates = match &options.aggregates {
            None => vec![AggregateFunc::count_rows()],
            Some(specs) if specs.is_empty() => {
                return Err(Error::invalid("At least one aggregate is required"))
            }
            Some(specs) => specs
                .iter()
                .map(|spec| {
                    AggregateFunc::parse(spec, |arg| {
                        let path = DimensionPath::parse(&schema, &fact, &PathSpec::from_json(arg)?)?;
                        Ok(Column::Path(path))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        };
        if let Some(duplicate) = aggregates
            .iter()
            .enumerate()
            .find(|(i, a)| aggregates[..*i].iter().any(|b| b.alias() == a.alias()))
        {
            return Err(Error::invalid(format!("Aggregate alias {} used twice", duplicate.1.alias())));
        }

        let filters = options
            .filters
            .iter()
            .map(|spec| Filter::parse(&schema, &fact, spec))
            .collect::<Result<Vec<_>>>()?;

        let select = match &options.select {
            Some(specs) => unique_paths(parse_paths(&schema, &fact, specs)?),
            None => group_by.clone(),
        };
        if let Some(path) = select.iter().find(|p| !p.is_dependent_on_any(&group_by)) {
            return Err(Error::invalid(format!(
                "select path {} is not dependent on any group_by path",
                path
            )));
        }

        let order = options.order.as_ref().map(Order::parse).transpose()?;

        Ok(Self {
            schema,
            fact,
            select,
            aggregates,
            group_by,
            filters,
            include_all_values: options.include_all_values,
            may_promote: options.may_promote_range_filters,
            order,
            limit: check_limit(options.limit)?,
        })
    }

    pub fn fact(&self) -> &str {
        &self.fact
    }

    fn fact_type(&self) -> Result<&Type> {
        fact_type(&self.schema, &self.fact)
    }

    /// Result columns, select paths first.
    pub fn columns(&self) -> Vec<Column> {
        self.select
            .iter()
            .cloned()
            .map(Column::Path)
            .chain(self.aggregates.iter().cloned().map(Column::Aggregate))
            .collect()
    }

    /// Paths that filters guarantee non-null, with all their ancestors: a
    /// row reaching `label.country.name` has a label too.
    fn forced_not_null(&self) -> Result<Vec<DimensionPath>> {
        let mut forced = Vec::new();
        for filter in self.filters.iter().filter(|f| f.forces_not_null()) {
            forced.extend(filter.path().ancestors()?);
        }
        Ok(unique_paths(forced))
    }

    pub(crate) fn prepare(&self, ctx: &TempTableContext<'_>, mode: OrderMode) -> Result<Prepared> {
        if self.include_all_values && !self.group_by.is_empty() {
            return self.prepare_all_values(ctx, mode);
        }

        let referenced: Vec<DimensionPath> = unique_paths(
            self.aggregates
                .iter()
                .flat_map(|a| a.paths())
                .chain(self.filters.iter().map(Filter::path))
                .chain(&self.select)
                .chain(&self.group_by)
                .cloned()
                .collect(),
        );
        let names: Vec<Vec<String>> = referenced.iter().map(|p| p.names().to_vec()).collect();
        let forced: Vec<Vec<String>> = self
            .forced_not_null()?
            .iter()
            .map(|p| p.names().to_vec())
            .collect();
        let (_, table) = self.schema.columns_and_table_with_joins(
            self.fact_type()?,
            &names,
            &[self.fact.clone()],
            &forced,
            None,
            Some(ctx),
        )?;

        let mut dataset = from_tables(&[table])?;
        for filter in &self.filters {
            dataset = dataset.filter(filter.expression()?);
        }
        let columns = self.columns();
        dataset = dataset.select(columns.iter().map(Column::aliased).collect::<Result<Vec<_>>>()?);
        if !self.group_by.is_empty() {
            // Select paths depend on the group_by paths, so adding them
            // doesn't change the grouping.
            let grouped = unique_paths(self.group_by.iter().chain(&self.select).cloned().collect());
            dataset = dataset.group_by(
                grouped
                    .iter()
                    .map(DimensionPath::expression)
                    .collect::<Result<Vec<_>>>()?,
            );
        }
        let dataset = order_and_limit(dataset, &self.fact, &columns, self.order.as_ref(), self.limit, mode)?;
        Ok(Prepared { columns, dataset })
    }

    /// Outer-join the plain aggregate to a table of every possible value of
    /// each group_by path, so groups without rows still appear.
    fn prepare_all_values(&self, ctx: &TempTableContext<'_>, mode: OrderMode) -> Result<Prepared> {
        let inner_mode = if self.limit.is_some() {
            OrderMode::Graceful
        } else {
            OrderMode::Skip
        };
        let inner = Aggregate {
            select: self.group_by.clone(),
            include_all_values: false,
            ..self.clone()
        }
        .prepare(ctx, inner_mode)?;

        let forced = self.forced_not_null()?;
        let mut universes = Vec::with_capacity(self.group_by.len());
        let mut mapping: HashMap<String, DimensionPath> = HashMap::new();
        let mut conditions = Vec::with_capacity(self.group_by.len());
        let mut right = false;

        for group_by in &self.group_by {
            let dependent = unique_paths(
                std::iter::once(group_by)
                    .chain(self.filters.iter().map(Filter::path))
                    .chain(&self.select)
                    .filter(|p| p.is_dependent_on(group_by))
                    .cloned()
                    .collect(),
            );
            let relative: Vec<Vec<String>> = dependent
                .iter()
                .map(|p| p.relative_to(group_by).map(|r| r.names().to_vec()))
                .collect::<Result<_>>()?;
            let relative_forced: Vec<Vec<String>> = forced
                .iter()
                .filter(|p| p.is_dependent_on(group_by))
                .map(|p| p.relative_to(group_by).map(|r| r.names().to_vec()))
                .collect::<Result<_>>()?;

            let target = group_by.target_type()?;
            let range = if target.is_infinite() {
                let range = range_for(group_by, &self.filters, self.may_promote)?.ok_or_else(|| {
                    Error::invalid(format!(
                        "include_all_values on {} needs a range filter on it{}",
                        group_by,
                        if self.may_promote { " or a promotable ancestor" } else { "" }
                    ))
                })?;
                Some(range)
            } else {
                None
            };

            let (columns, universe) = self.schema.columns_and_table_with_joins(
                target,
                &relative,
                &group_by.fact_and_names(),
                &relative_forced,
                range.as_ref(),
                Some(ctx),
            )?;
            for (path, names) in dependent.iter().zip(&relative) {
                let column = columns.get(names).ok_or_else(|| {
                    Error::invalid(format!("No universe column for {}", path))
                })?;
                mapping.insert(path.alias(), path.with_expression(column.to_expr()));
            }

            let primary_key = universe.qualified_primary_key().ok_or_else(|| {
                Error::schema(format!("Type {} has no primary key to join on", target.name))
            })?;
            conditions.push(primary_key.eq(table_col(INNER, &group_by.alias())));
            right |= group_by.is_null() && !forced.iter().any(|p| p.is_dependent_on(group_by));
            universes.push(universe);
        }

        // Every universe row is kept; inner rows grouped under NULL are kept
        // only when some group_by path may be null.
        let left = true;
        let kind = match (left, right) {
            (true, true) => {
                if !ctx.target().supports_full_outer_join() {
                    return Err(Error::invalid(format!(
                        "include_all_values over nullable group_by paths needs a FULL OUTER JOIN, \
                         which {} doesn't support; filter those paths to not null instead",
                        ctx.target()
                    )));
                }
                JoinType::Full
            }
            (true, false) => JoinType::Left,
            (false, true) => JoinType::Right,
            (false, false) => JoinType::Inner,
        };
        debug!(
            "Joining {} universe tables to the inner aggregate with {:?}",
            universes.len(),
            kind
        );

        // Universe table filters go into WHERE; under a FULL join the rows
        // without a universe match must survive them.
        let mut universe_filters: Vec<Expr> = Vec::new();
        for universe in &mut universes {
            let primary_key = universe.qualified_primary_key();
            for filter in std::mem::take(&mut universe.table_filters) {
                let condition =
                    table_col(&universe.alias, &filter.column).eq(Expr::Literal(filter.value));
                universe_filters.push(match (&primary_key, kind) {
                    (Some(pk), JoinType::Full) => condition.or(pk.clone().is_null()),
                    _ => condition,
                });
            }
        }

        let on = and_all(conditions).ok_or_else(|| Error::invalid("include_all_values needs a group_by path"))?;
        let mut dataset = from_tables(&universes)?.join(kind, TableRef::subquery(inner.dataset, INNER), on);
        for condition in universe_filters {
            dataset = dataset.filter(condition);
        }
        for filter in &self.filters {
            if let Some(mapped) = mapping.get(&filter.path().alias()) {
                dataset = dataset.filter(filter.with_path(mapped.clone()).expression()?);
            }
        }

        let mut columns = Vec::with_capacity(self.select.len() + self.aggregates.len());
        for path in &self.select {
            let mapped = mapping
                .get(&path.alias())
                .ok_or_else(|| Error::invalid(format!("No universe column for {}", path)))?;
            columns.push(Column::Path(mapped.clone()));
        }
        columns.extend(
            self.aggregates
                .iter()
                .map(|a| a.of_subquery_mapping_null_to_identity(INNER)),
        );

        dataset = dataset.select(columns.iter().map(Column::aliased).collect::<Result<Vec<_>>>()?);
        let dataset = order_and_limit(dataset, &self.fact, &columns, self.order.as_ref(), self.limit, mode)?;
        Ok(Prepared { columns, dataset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SqliteBackend;
    use crate::config::QuerySettings;
    use crate::query::test_schema::music;
    use crate::sql::test_utils::validate_sql;
    use crate::sql::Dialect;

    fn options(json: &str) -> QueryOptions {
        QueryOptions::from_json(json).unwrap()
    }

    fn sql_for(json: &str) -> String {
        let query = Aggregate::new(music(), &options(json)).unwrap();
        let backend = SqliteBackend::open_in_memory().unwrap();
        let settings = QuerySettings::default();
        let ctx = TempTableContext::new(&backend, &settings);
        let sql = query.prepare(&ctx, OrderMode::Strict).unwrap().dataset.to_sql(Dialect::Sqlite);
        validate_sql(&sql, Dialect::Sqlite).unwrap();
        sql
    }

    #[test]
    fn test_defaults() {
        let query = Aggregate::new(music(), &QueryOptions::new("sale")).unwrap();
        assert_eq!(query.aggregates.len(), 1);
        assert_eq!(query.aggregates[0].alias(), "count");
        assert!(query.select.is_empty());

        let sql = sql_for(r#"{"fact": "sale"}"#);
        assert!(sql.contains(r#"COUNT(*) AS "count""#));
        assert!(!sql.contains("GROUP BY"));
    }

    #[test]
    fn test_grouped_by_joined_path() {
        let sql = sql_for(
            r#"{"fact": "sale", "group_by": ["label.title"],
                "aggregates": [["revenue", "weighted_sum", "price", "quantity"]],
                "order": ["revenue", "desc"], "limit": 3}"#,
        );
        assert!(sql.contains(r#""sale.label"."title" AS "sale.label.title""#));
        assert!(sql.contains(r#"LEFT OUTER JOIN "labels" AS "sale.label""#));
        assert!(sql.contains(r#"GROUP BY "sale.label"."title""#));
        assert!(sql.contains(r#"ORDER BY SUM("sale"."price" * "sale"."quantity") DESC"#));
        assert!(sql.contains("LIMIT 3"));
    }

    #[test]
    fn test_filter_forces_inner_join() {
        let sql = sql_for(
            r#"{"fact": "sale", "group_by": ["label"], "select": ["label", "label.title"],
                "filters": [["label.title", "=", "Warp"]]}"#,
        );
        assert!(sql.contains(r#"INNER JOIN "labels" AS "sale.label""#));
        assert!(sql.contains(r#"WHERE "sale.label"."title" = 'Warp'"#));
        assert!(sql.contains(r#"GROUP BY "sale"."label_id", "sale.label"."title""#));
    }

    #[test]
    fn test_filter_forces_ancestor_joins_inner() {
        let sql = sql_for(
            r#"{"fact": "sale", "group_by": ["label.title"],
                "filters": [["label.country.name", "=", "United Kingdom"]]}"#,
        );
        assert!(sql.contains(r#"INNER JOIN "labels" AS "sale.label""#));
        assert!(sql.contains(r#"INNER JOIN "countries" AS "sale.label.country""#));
        assert!(!sql.contains("LEFT OUTER JOIN"));
    }

    #[test]
    fn test_validation_errors() {
        let err = |json: &str| Aggregate::new(music(), &options(json)).unwrap_err().to_string();

        assert!(err(r#"{"fact": "label"}"#).contains("not found"));
        assert!(err(r#"{"fact": "sale", "aggregates": []}"#).contains("At least one aggregate"));
        assert!(err(r#"{"fact": "sale", "group_by": ["label", "label.title"]}"#).contains("pairwise"));
        assert!(err(r#"{"fact": "sale", "group_by": ["format"], "select": ["label"]}"#)
            .contains("not dependent"));
        assert!(err(r#"{"fact": "sale", "group_by": ["price"]}"#).contains("Can't group by"));
        assert!(err(r#"{"fact": "sale", "order": ["count", "sideways"]}"#).contains("Bad order direction"));
        assert!(err(r#"{"fact": "sale", "aggregates": [["n", "count"], ["n", "count"]]}"#)
            .contains("used twice"));
        assert!(err(r#"{"fact": "sale", "limit": 18446744073709551615}"#).contains("too large"));
    }

    #[test]
    fn test_unknown_order_column() {
        let query = Aggregate::new(music(), &options(r#"{"fact": "sale", "order": ["label", "asc"]}"#)).unwrap();
        let backend = SqliteBackend::open_in_memory().unwrap();
        let settings = QuerySettings::default();
        let ctx = TempTableContext::new(&backend, &settings);
        let err = query.prepare(&ctx, OrderMode::Strict).unwrap_err();
        assert!(err.to_string().contains("not found amongst the available columns"));
        assert!(query.prepare(&ctx, OrderMode::Graceful).is_ok());
    }

    #[test]
    fn test_include_all_values_finite_universe() {
        let sql = sql_for(r#"{"fact": "sale", "group_by": ["format"], "include_all_values": true}"#);
        assert!(sql.contains(r#"AS "sale.format""#));
        assert!(sql.contains(r#"LEFT OUTER JOIN (SELECT"#));
        assert!(sql.contains(r#"AS "__inner" ON "sale.format"."format" = "__inner"."sale.format""#));
        assert!(sql.contains(r#"COALESCE("__inner"."count", 0) AS "count""#));
    }

    #[test]
    fn test_include_all_values_nullable_needs_full_join() {
        let query = Aggregate::new(
            music(),
            &options(r#"{"fact": "sale", "group_by": ["label"], "include_all_values": true}"#),
        )
        .unwrap();
        let backend = SqliteBackend::open_in_memory().unwrap();
        let settings = QuerySettings::default();

        let ctx = TempTableContext::new(&backend, &settings);
        let sql = query.prepare(&ctx, OrderMode::Strict).unwrap().dataset.to_sql(Dialect::Sqlite);
        assert!(sql.contains(r#"FROM "labels" AS "sale.label""#));
        assert!(sql.contains("FULL OUTER JOIN"));

        let ctx = TempTableContext::new(&backend, &settings).with_target_dialect(Dialect::MySql);
        let err = query.prepare(&ctx, OrderMode::Strict).unwrap_err();
        assert!(err.to_string().contains("FULL OUTER JOIN"));
    }

    #[test]
    fn test_include_all_values_infinite_needs_range() {
        let query = Aggregate::new(
            music(),
            &options(
                r#"{"fact": "sale", "group_by": ["calendar_day.days_since_epoch"], "include_all_values": true,
                    "filters": [["calendar_day", "between", "2024-01-01", "2024-01-03"]]}"#,
            ),
        )
        .unwrap();
        let backend = SqliteBackend::open_in_memory().unwrap();
        let settings = QuerySettings::default();
        let ctx = TempTableContext::new(&backend, &settings);
        let err = query.prepare(&ctx, OrderMode::Strict).unwrap_err();
        assert!(err.to_string().contains("needs a range filter"));

        let promoted = Aggregate {
            may_promote: true,
            ..query
        };
        let prepared = promoted.prepare(&ctx, OrderMode::Strict).unwrap();
        assert_eq!(ctx.tables().len(), 1);
        assert!(prepared
            .dataset
            .to_sql(Dialect::Sqlite)
            .contains(r#"AS "sale.calendar_day.days_since_epoch""#));
    }
}
