//! Filters and range promotion.

use std::sync::Arc;

use serde_json::Value as Json;

use super::options::PathSpec;
use super::path::DimensionPath;
use crate::error::{Error, Result};
use crate::schema::{Schema, Value, ValueRange};
use crate::sql::{Expr, ExprExt};

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(Value),
    Ne(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// Inclusive on both ends.
    Range(ValueRange),
    IsNull,
    NotNull,
}

/// A predicate on one dimension path.
#[derive(Debug, Clone)]
pub struct Filter {
    path: DimensionPath,
    op: FilterOp,
}

impl Filter {
    pub fn new(path: DimensionPath, op: FilterOp) -> Result<Self> {
        let dimension = path.last_dimension()?;
        if !dimension.filterable {
            return Err(Error::invalid(format!("Dimension path {} is not filterable", path)));
        }
        Ok(Self { path, op })
    }

    /// Parse `[path, op, value...]`. Values are in external form.
    pub fn parse(schema: &Arc<Schema>, fact: &str, spec: &[Json]) -> Result<Self> {
        let [path, op, values @ ..] = spec else {
            return Err(Error::invalid(format!(
                "Filter must be [path, op, values...], got {}",
                Json::from(spec.to_vec())
            )));
        };
        let path = DimensionPath::parse(schema, fact, &PathSpec::from_json(path)?)?;
        let op_name = op
            .as_str()
            .ok_or_else(|| Error::invalid(format!("Filter operator must be a string, got {}", op)))?;

        let value_type = path.value_type().clone();
        let convert = |json: &Json| -> Result<Value> {
            let value = value_type.external_to_internal(json)?;
            if value.is_null() {
                return Err(Error::invalid(format!(
                    "Filter on {} compares with null; use the null operator",
                    path
                )));
            }
            Ok(value)
        };
        let single = || -> Result<Value> {
            match values {
                [value] => convert(value),
                _ => Err(Error::invalid(format!(
                    "Filter {} on {} takes one value, got {}",
                    op_name,
                    path,
                    values.len()
                ))),
            }
        };
        // `in` accepts a single list or the values inline.
        let list = || -> Result<Vec<Value>> {
            match values {
                [Json::Array(items)] => items.iter().map(&convert).collect(),
                _ => values.iter().map(&convert).collect(),
            }
        };

        let op = match op_name {
            "=" | "eq" => FilterOp::Eq(single()?),
            "!=" | "ne" => FilterOp::Ne(single()?),
            "<" | "lt" => FilterOp::Lt(single()?),
            "<=" | "lte" => FilterOp::Lte(single()?),
            ">" | "gt" => FilterOp::Gt(single()?),
            ">=" | "gte" => FilterOp::Gte(single()?),
            "in" => FilterOp::In(list()?),
            "not_in" => FilterOp::NotIn(list()?),
            "between" => match values {
                [start, end] => FilterOp::Range(ValueRange::new(convert(start)?, convert(end)?)),
                _ => {
                    return Err(Error::invalid(format!(
                        "Filter between on {} takes a start and an end",
                        path
                    )))
                }
            },
            "null" | "not_null" if !values.is_empty() => {
                return Err(Error::invalid(format!("Filter {} on {} takes no values", op_name, path)))
            }
            "null" => FilterOp::IsNull,
            "not_null" => FilterOp::NotNull,
            other => return Err(Error::invalid(format!("Unknown filter operator {}", other))),
        };
        Self::new(path, op)
    }

    pub fn path(&self) -> &DimensionPath {
        &self.path
    }

    pub fn op(&self) -> &FilterOp {
        &self.op
    }

    /// Whether rows passing this filter have a non-null value on the path.
    pub fn forces_not_null(&self) -> bool {
        !matches!(self.op, FilterOp::IsNull)
    }

    pub fn range(&self) -> Option<&ValueRange> {
        match &self.op {
            FilterOp::Range(range) => Some(range),
            _ => None,
        }
    }

    /// The same predicate on a path with another column expression.
    pub fn with_path(&self, path: DimensionPath) -> Self {
        Self {
            path,
            op: self.op.clone(),
        }
    }

    pub fn expression(&self) -> Result<Expr> {
        let column = self.path.expression()?;
        let value_type = self.path.value_type();
        let lit = |v: &Value| Expr::Literal(value_type.internal_to_database(v));
        Ok(match &self.op {
            FilterOp::Eq(v) => column.eq(lit(v)),
            FilterOp::Ne(v) => column.ne(lit(v)),
            FilterOp::Lt(v) => column.lt(lit(v)),
            FilterOp::Lte(v) => column.lte(lit(v)),
            FilterOp::Gt(v) => column.gt(lit(v)),
            FilterOp::Gte(v) => column.gte(lit(v)),
            FilterOp::In(values) => column.in_list(values.iter().map(lit).collect()),
            FilterOp::NotIn(values) => column.not_in_list(values.iter().map(lit).collect()),
            FilterOp::Range(range) => column.between(lit(&range.start), lit(&range.end)),
            FilterOp::IsNull => column.is_null(),
            FilterOp::NotNull => column.is_not_null(),
        })
    }

    /// Carry a range filter down to `descendant`.
    ///
    /// Every dimension between this filter's path and `descendant` must
    /// respect ordering and be able to generate its values; otherwise the
    /// range can't be mapped and `None` is returned.
    pub fn promote_to(&self, descendant: &DimensionPath) -> Result<Option<Filter>> {
        let Some(range) = self.range() else {
            return Ok(None);
        };
        if !descendant.is_dependent_on(&self.path) {
            return Err(Error::invalid(format!(
                "Can't promote a filter on {} to {}, which is not dependent on it",
                self.path, descendant
            )));
        }

        let schema = self.path.schema();
        let mut ty = self.path.target_type()?;
        let (mut start, mut end) = (range.start.clone(), range.end.clone());
        for name in &descendant.names()[self.path.names().len()..] {
            let dimension = ty.dimension(name).ok_or_else(|| {
                Error::invalid(format!("Dimension {} not found on type {}", name, ty.name))
            })?;
            if !dimension.dependency_respects_ordering
                || (dimension.generator.is_none() && !dimension.primary)
            {
                return Ok(None);
            }
            start = dimension.generate_value(&start)?;
            end = dimension.generate_value(&end)?;
            ty = schema.target(dimension)?;
        }
        Ok(Some(Self {
            path: descendant.clone(),
            op: FilterOp::Range(ValueRange::new(start, end)),
        }))
    }
}

/// The range bounding `path`: a range filter on the path itself or, when
/// promotion is allowed, one promoted from the nearest ancestor that can be.
pub fn range_for(path: &DimensionPath, filters: &[Filter], may_promote: bool) -> Result<Option<ValueRange>> {
    let mut ancestors = path.ancestors()?;
    ancestors.reverse();
    for (i, candidate) in ancestors.iter().enumerate() {
        if i > 0 && !may_promote {
            break;
        }
        for filter in filters.iter().filter(|f| f.range().is_some() && f.path() == candidate) {
            if i == 0 {
                return Ok(filter.range().cloned());
            }
            if let Some(promoted) = filter.promote_to(path)? {
                return Ok(promoted.range().cloned());
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::test_schema::music;
    use crate::schema::parse_date;
    use crate::sql::Dialect;
    use serde_json::json;

    fn parse(spec: Json) -> Result<Filter> {
        let schema = music();
        let spec = spec.as_array().unwrap().clone();
        Filter::parse(&schema, "sale", &spec)
    }

    fn path(names: &[&str]) -> DimensionPath {
        DimensionPath::new(&music(), "sale", names.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_parse_and_render() {
        let filter = parse(json!(["format", "in", ["CD", "Vinyl"]])).unwrap();
        assert_eq!(
            filter.expression().unwrap().to_sql(Dialect::Sqlite),
            r#""sale"."format" IN ('cd', 'vi')"#
        );
        let inline = parse(json!(["format", "in", "CD", "Vinyl"])).unwrap();
        assert_eq!(inline.op(), filter.op());

        let filter = parse(json!(["calendar_day", "between", "2024-01-01", "2024-01-31"])).unwrap();
        assert_eq!(
            filter.expression().unwrap().to_sql(Dialect::Sqlite),
            r#""sale"."calendar_day" BETWEEN '2024-01-01' AND '2024-01-31'"#
        );
        assert!(filter.forces_not_null());

        let filter = parse(json!(["label.title", "null"])).unwrap();
        assert!(!filter.forces_not_null());
        assert_eq!(
            filter.expression().unwrap().to_sql(Dialect::Sqlite),
            r#""sale.label"."title" IS NULL"#
        );
    }

    #[test]
    fn test_parse_errors() {
        let not_filterable = parse(json!(["price", "=", 3])).unwrap_err();
        assert!(not_filterable.to_string().contains("not filterable"));

        assert!(parse(json!(["format", "like", "CD"])).is_err());
        assert!(parse(json!(["format", "=", "CD", "Vinyl"])).is_err());
        assert!(parse(json!(["format", "=", "Cassette"])).is_err());
        assert!(parse(json!(["format", "=", null])).is_err());
        assert!(parse(json!(["label.title", "null", "x"])).is_err());
        assert!(parse(json!(["calendar_day", "between", "2024-01-01"])).is_err());
        assert!(parse(json!(["format"])).is_err());
    }

    #[test]
    fn test_promotion_respects_ordering() {
        let day = parse(json!(["calendar_day", "between", "2024-01-01", "2024-01-31"])).unwrap();
        let start = parse_date("2024-01-01").unwrap();
        let end = parse_date("2024-01-31").unwrap();

        let counter = day.promote_to(&path(&["calendar_day", "days_since_epoch"])).unwrap().unwrap();
        assert_eq!(counter.range(), Some(&ValueRange::new(Value::Int(start), Value::Int(end))));

        assert!(day.promote_to(&path(&["calendar_day", "day_of_week"])).unwrap().is_none());
        assert!(day.promote_to(&path(&["format"])).is_err());
    }

    #[test]
    fn test_range_for() {
        let filters = vec![parse(json!(["calendar_day", "between", "2024-01-01", "2024-01-07"])).unwrap()];
        let day = path(&["calendar_day"]);
        let counter = path(&["calendar_day", "days_since_epoch"]);
        let weekday = path(&["calendar_day", "day_of_week"]);

        assert_eq!(range_for(&day, &filters, false).unwrap(), filters[0].range().cloned());
        assert_eq!(range_for(&counter, &filters, false).unwrap(), None);
        let promoted = range_for(&counter, &filters, true).unwrap().unwrap();
        assert_eq!(promoted.len(), Some(7));
        assert_eq!(range_for(&weekday, &filters, true).unwrap(), None);
    }
}
