//! Output columns.

use serde::Serialize;

use super::aggregate_func::AggregateFunc;
use super::path::DimensionPath;
use crate::error::Result;
use crate::schema::ValueType;
use crate::sql::{table_col, Expr, ExprExt, SelectExpr};

/// A typed, aliased expression. Columns compare equal when their aliases do.
#[derive(Debug, Clone)]
pub enum Column {
    Plain {
        alias: String,
        value_type: ValueType,
        expr: Expr,
        null: bool,
    },
    Path(DimensionPath),
    Aggregate(AggregateFunc),
}

impl Column {
    pub fn alias(&self) -> String {
        match self {
            Column::Plain { alias, .. } => alias.clone(),
            Column::Path(path) => path.alias(),
            Column::Aggregate(agg) => agg.alias().to_string(),
        }
    }

    pub fn value_type(&self) -> &ValueType {
        match self {
            Column::Plain { value_type, .. } => value_type,
            Column::Path(path) => path.value_type(),
            Column::Aggregate(agg) => agg.value_type(),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Column::Plain { null, .. } => *null,
            Column::Path(path) => path.is_null(),
            Column::Aggregate(agg) => agg.is_null(),
        }
    }

    pub fn expression(&self) -> Result<Expr> {
        match self {
            Column::Plain { expr, .. } => Ok(expr.clone()),
            Column::Path(path) => path.expression(),
            Column::Aggregate(agg) => agg.expression(),
        }
    }

    /// `expr AS alias`, for a SELECT list.
    pub fn aliased(&self) -> Result<SelectExpr> {
        Ok(self.expression()?.alias(&self.alias()))
    }

    /// The same column read from a subquery that selected it.
    pub fn of_subquery(&self, subquery: &str) -> Column {
        match self {
            Column::Plain {
                alias,
                value_type,
                null,
                ..
            } => Column::Plain {
                alias: alias.clone(),
                value_type: value_type.clone(),
                expr: table_col(subquery, alias),
                null: *null,
            },
            Column::Path(path) => Column::Path(path.of_subquery(subquery)),
            Column::Aggregate(agg) => agg.of_subquery(subquery),
        }
    }

    pub fn descriptor(&self) -> ColumnDescriptor {
        let (dimension_path, media_type) = match self {
            Column::Path(path) => (Some(path.fact_and_names()), path.media_type()),
            _ => (None, None),
        };
        ColumnDescriptor {
            name: self.alias(),
            value_type: self.value_type().name().to_string(),
            null: self.is_null(),
            dimension_path,
            media_type,
        }
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.alias() == other.alias()
    }
}

/// Describes one result column to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub value_type: String,
    pub null: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension_path: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::test_schema::music;
    use crate::sql::Dialect;

    #[test]
    fn test_path_column() {
        let schema = music();
        let title = Column::Path(
            DimensionPath::new(&schema, "sale", vec!["label".into(), "title".into()]).unwrap(),
        );
        let select = title.aliased().unwrap();
        assert_eq!(select.alias.as_deref(), Some("sale.label.title"));

        let outer = title.of_subquery("__first_aggregate");
        assert_eq!(outer, title);
        assert_eq!(
            outer.expression().unwrap().to_sql(Dialect::Postgres),
            r#""__first_aggregate"."sale.label.title""#
        );

        let descriptor = title.descriptor();
        assert_eq!(descriptor.value_type, "string");
        assert!(descriptor.null);
        assert_eq!(
            serde_json::to_value(&descriptor).unwrap(),
            serde_json::json!({
                "name": "sale.label.title",
                "value_type": "string",
                "null": true,
                "dimension_path": ["sale", "label", "title"]
            })
        );
    }

    #[test]
    fn test_aggregate_column() {
        let count = Column::Aggregate(AggregateFunc::count_rows());
        assert_eq!(count.alias(), "count");
        assert_eq!(count.value_type().name(), "integer");
        assert!(!count.is_null());
        let outer = count.of_subquery("__inner");
        assert!(matches!(outer, Column::Plain { .. }));
        assert_eq!(outer.expression().unwrap(), table_col("__inner", "count"));
        assert!(outer.descriptor().dimension_path.is_none());
    }
}
