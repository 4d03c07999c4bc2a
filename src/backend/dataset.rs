//! Join trees to SELECT skeletons.

use crate::error::{Error, Result};
use crate::schema::{JoinNode, TableFilter, TableWithJoins};
use crate::sql::{table_col, Expr, ExprExt, JoinType, Query, TableRef};

fn filter_condition(alias: &str, filter: &TableFilter) -> Expr {
    table_col(alias, &filter.column).eq(Expr::Literal(filter.value.clone()))
}

fn add_joins<'a>(
    mut query: Query,
    parent_alias: &str,
    joins: impl IntoIterator<Item = (&'a String, &'a JoinNode)>,
) -> Query {
    for (column, node) in joins {
        let on = node.table_filters.iter().fold(
            table_col(parent_alias, column).eq(table_col(&node.alias, &node.primary_key)),
            |on, f| on.and(filter_condition(&node.alias, f)),
        );
        let kind = if node.left_join { JoinType::Left } else { JoinType::Inner };
        query = query.join(kind, TableRef::new(&node.table).with_alias(&node.alias), on);
        query = add_joins(query, &node.alias, &node.joins);
    }
    query
}

/// A dataset over one or more root tables.
///
/// The first table is the FROM, the rest are CROSS JOINed. Nested joins
/// follow their parent. Root table filters become WHERE conditions, nested
/// ones become part of the join condition so LEFT joins keep their rows.
pub fn from_tables(tables: &[TableWithJoins]) -> Result<Query> {
    let (first, rest) = tables
        .split_first()
        .ok_or_else(|| Error::invalid("A dataset needs at least one table"))?;

    let mut query = Query::new().from(TableRef::new(&first.table).with_alias(&first.alias));
    query = add_joins(query, &first.alias, &first.joins);
    for table in rest {
        query = query.cross_join(TableRef::new(&table.table).with_alias(&table.alias));
        query = add_joins(query, &table.alias, &table.joins);
    }
    for table in tables {
        for filter in &table.table_filters {
            query = query.filter(filter_condition(&table.alias, filter));
        }
    }
    Ok(query)
}
