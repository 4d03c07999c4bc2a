//! Aggregate functions.

use std::fmt;

use serde_json::Value as Json;

use super::column::Column;
use super::path::DimensionPath;
use crate::error::{Error, Result};
use crate::schema::ValueType;
use crate::sql::{avg, coalesce, count, count_star, func, max, min, sum, table_col, Expr, ExprExt, Literal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Sum,
    Average,
    StdDev,
    Max,
    Min,
    WeightedSum,
}

impl AggregateKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "count" => AggregateKind::Count,
            "sum" => AggregateKind::Sum,
            "avg" | "average" => AggregateKind::Average,
            "stddev" => AggregateKind::StdDev,
            "max" => AggregateKind::Max,
            "min" => AggregateKind::Min,
            "weighted_sum" => AggregateKind::WeightedSum,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            AggregateKind::Count => "count",
            AggregateKind::Sum => "sum",
            AggregateKind::Average => "average",
            AggregateKind::StdDev => "stddev",
            AggregateKind::Max => "max",
            AggregateKind::Min => "min",
            AggregateKind::WeightedSum => "weighted_sum",
        }
    }

    fn arity(self) -> (usize, usize) {
        match self {
            AggregateKind::Count => (0, 1),
            AggregateKind::WeightedSum => (2, 2),
            _ => (1, 1),
        }
    }

    fn needs_numeric_args(self) -> bool {
        matches!(
            self,
            AggregateKind::Sum | AggregateKind::Average | AggregateKind::StdDev | AggregateKind::WeightedSum
        )
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An aliased aggregate over zero or more argument columns.
#[derive(Debug, Clone)]
pub struct AggregateFunc {
    alias: String,
    kind: AggregateKind,
    args: Vec<Column>,
    value_type: ValueType,
}

impl AggregateFunc {
    pub fn new(alias: impl Into<String>, kind: AggregateKind, args: Vec<Column>) -> Result<Self> {
        let alias = alias.into();
        let (lo, hi) = kind.arity();
        if args.len() < lo || args.len() > hi {
            return Err(Error::invalid(format!(
                "Aggregate {} ({}) takes {} arguments, got {}",
                alias,
                kind,
                if lo == hi { lo.to_string() } else { format!("{}-{}", lo, hi) },
                args.len()
            )));
        }
        if kind.needs_numeric_args() {
            if let Some(arg) = args.iter().find(|a| !a.value_type().is_numeric()) {
                return Err(Error::invalid(format!(
                    "Aggregate {} ({}) needs numeric arguments, {} is {}",
                    alias,
                    kind,
                    arg.alias(),
                    arg.value_type()
                )));
            }
        }
        let value_type = match kind {
            AggregateKind::Count => ValueType::integer(),
            AggregateKind::Average | AggregateKind::StdDev | AggregateKind::WeightedSum => ValueType::float(),
            AggregateKind::Sum | AggregateKind::Max | AggregateKind::Min => args[0].value_type().clone(),
        };
        Ok(Self {
            alias,
            kind,
            args,
            value_type,
        })
    }

    /// `count(*)` aliased `count`.
    pub fn count_rows() -> Self {
        Self {
            alias: "count".to_string(),
            kind: AggregateKind::Count,
            args: Vec::new(),
            value_type: ValueType::integer(),
        }
    }

    /// Parse `[alias, kind, arg...]`, resolving each argument with `arg`.
    pub fn parse(spec: &[Json], mut arg: impl FnMut(&Json) -> Result<Column>) -> Result<Self> {
        let [alias, kind, args @ ..] = spec else {
            return Err(Error::invalid(format!(
                "Aggregate must be [alias, kind, args...], got {}",
                Json::from(spec.to_vec())
            )));
        };
        let alias = alias
            .as_str()
            .ok_or_else(|| Error::invalid(format!("Aggregate alias must be a string, got {}", alias)))?;
        let kind = kind
            .as_str()
            .and_then(AggregateKind::from_name)
            .ok_or_else(|| Error::invalid(format!("Unknown aggregate {} for {}", kind, alias)))?;
        let args = args.iter().map(&mut arg).collect::<Result<Vec<_>>>()?;
        Self::new(alias, kind, args)
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    pub fn args(&self) -> &[Column] {
        &self.args
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    /// What the aggregate yields over no rows, when that isn't NULL.
    pub fn identity(&self) -> Option<Literal> {
        match self.kind {
            AggregateKind::Count | AggregateKind::Sum | AggregateKind::WeightedSum => Some(Literal::Int(0)),
            AggregateKind::Average | AggregateKind::StdDev | AggregateKind::Max | AggregateKind::Min => None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.identity().is_none()
    }

    /// Dimension paths among the arguments.
    pub fn paths(&self) -> impl Iterator<Item = &DimensionPath> {
        self.args.iter().filter_map(|a| match a {
            Column::Path(p) => Some(p),
            _ => None,
        })
    }

    pub fn expression(&self) -> Result<Expr> {
        let args = self.args.iter().map(Column::expression).collect::<Result<Vec<_>>>()?;
        let mut args = args.into_iter();
        let mut next = || {
            args.next()
                .ok_or_else(|| Error::invalid(format!("Aggregate {} is missing an argument", self.alias)))
        };
        Ok(match self.kind {
            AggregateKind::Count => match next() {
                Ok(arg) => count(arg),
                Err(_) => count_star(),
            },
            AggregateKind::Sum => sum(next()?),
            AggregateKind::Average => avg(next()?),
            AggregateKind::StdDev => func("STDDEV", vec![next()?]),
            AggregateKind::Max => max(next()?),
            AggregateKind::Min => min(next()?),
            AggregateKind::WeightedSum => {
                let value = next()?;
                sum(value.mul(next()?))
            }
        })
    }

    /// Replace every argument.
    pub fn map_args(&self, f: impl FnMut(&Column) -> Result<Column>) -> Result<Self> {
        Ok(Self {
            args: self.args.iter().map(f).collect::<Result<Vec<_>>>()?,
            ..self.clone()
        })
    }

    /// This aggregate's output read from a subquery.
    pub fn of_subquery(&self, subquery: &str) -> Column {
        Column::Plain {
            alias: self.alias.clone(),
            value_type: self.value_type.clone(),
            expr: table_col(subquery, &self.alias),
            null: self.is_null(),
        }
    }

    /// As [`of_subquery`](Self::of_subquery), reading a missing row as the
    /// identity value.
    pub fn of_subquery_mapping_null_to_identity(&self, subquery: &str) -> Column {
        match self.identity() {
            Some(identity) => Column::Plain {
                alias: self.alias.clone(),
                value_type: self.value_type.clone(),
                expr: coalesce(vec![table_col(subquery, &self.alias), Expr::Literal(identity)]),
                null: false,
            },
            None => self.of_subquery(subquery),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::test_schema::music;
    use crate::sql::Dialect;
    use serde_json::json;

    fn path_arg(names: &[&str]) -> Column {
        let schema = music();
        Column::Path(
            DimensionPath::new(&schema, "sale", names.iter().map(|s| s.to_string()).collect()).unwrap(),
        )
    }

    #[test]
    fn test_kinds_and_identities() {
        let count = AggregateFunc::count_rows();
        assert_eq!(count.expression().unwrap().to_sql(Dialect::Sqlite), "COUNT(*)");
        assert_eq!(count.identity(), Some(Literal::Int(0)));
        assert!(!count.is_null());

        let avg = AggregateFunc::new("avg_price", AggregateKind::Average, vec![path_arg(&["price"])]).unwrap();
        assert_eq!(avg.value_type().name(), "float");
        assert!(avg.is_null());

        let max = AggregateFunc::new("latest", AggregateKind::Max, vec![path_arg(&["calendar_day"])]).unwrap();
        assert_eq!(max.value_type().name(), "date");

        let weighted = AggregateFunc::new(
            "revenue",
            AggregateKind::WeightedSum,
            vec![path_arg(&["price"]), path_arg(&["quantity"])],
        )
        .unwrap();
        assert_eq!(
            weighted.expression().unwrap().to_sql(Dialect::Sqlite),
            r#"SUM("sale"."price" * "sale"."quantity")"#
        );
        assert_eq!(weighted.paths().count(), 2);
    }

    #[test]
    fn test_argument_checks() {
        let err = AggregateFunc::new("total", AggregateKind::Sum, vec![]).unwrap_err();
        assert!(err.to_string().contains("takes 1 arguments"));

        let err = AggregateFunc::new("total", AggregateKind::Sum, vec![path_arg(&["label", "title"])])
            .unwrap_err();
        assert!(err.to_string().contains("needs numeric arguments"));

        let err = AggregateFunc::parse(&[json!("x"), json!("median"), json!("price")], |_| {
            Ok(path_arg(&["price"]))
        })
        .unwrap_err();
        assert!(err.to_string().contains("Unknown aggregate"));

        let err = AggregateFunc::parse(&[json!("x")], |_| Ok(path_arg(&["price"]))).unwrap_err();
        assert!(matches!(err, Error::InvalidQueryParams(_)));
    }

    #[test]
    fn test_of_subquery_maps_null_to_identity() {
        let sum = AggregateFunc::parse(&[json!("revenue"), json!("sum"), json!("price")], |_| {
            Ok(path_arg(&["price"]))
        })
        .unwrap();
        let column = sum.of_subquery_mapping_null_to_identity("__inner");
        assert!(!column.is_null());
        assert_eq!(
            column.expression().unwrap().to_sql(Dialect::Sqlite),
            r#"COALESCE("__inner"."revenue", 0)"#
        );

        let min = AggregateFunc::new("cheapest", AggregateKind::Min, vec![path_arg(&["price"])]).unwrap();
        let column = min.of_subquery_mapping_null_to_identity("__inner");
        assert!(column.is_null());
        assert_eq!(column.expression().unwrap(), table_col("__inner", "cheapest"));
    }
}
