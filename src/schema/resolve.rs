//! Dimension path resolution.
//!
//! Turns paths like `sale.label.country.name` into a qualified column plus
//! the tree of joins needed to reach it. Table aliases are the dotted path
//! to the type a table belongs to, so `sale.label` is the labels table as
//! reached from a sale.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::{Dimension, Schema, TableFilter, Type, ValueRange};
use crate::backend::TempTableContext;
use crate::error::{Error, Result};
use crate::sql::{table_col, ColumnDef, Expr, Literal};

/// Joins hanging off a table, keyed by the column on that table they join from.
pub type Joins = BTreeMap<String, JoinNode>;

/// A column qualified by the table alias it is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn to_expr(&self) -> Expr {
        table_col(&self.alias, &self.column)
    }
}

/// A joined table, and the joins nested beneath it.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub alias: String,
    pub table: String,
    pub table_filters: Vec<TableFilter>,
    pub left_join: bool,
    pub primary_key: String,
    pub joins: Joins,
}

/// A root table with its join tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TableWithJoins {
    pub table: String,
    pub alias: String,
    pub table_filters: Vec<TableFilter>,
    /// Column identifying rows, for types with a primary dimension.
    pub primary_key: Option<String>,
    pub joins: Joins,
}

impl TableWithJoins {
    pub fn qualified_primary_key(&self) -> Option<Expr> {
        self.primary_key.as_deref().map(|pk| table_col(&self.alias, pk))
    }
}

/// The edge a nested resolution step arrived through.
#[derive(Clone, Copy)]
struct Via<'a> {
    parent_alias: &'a str,
    dimension: &'a Dimension,
}

/// Merge `from` into `into`. A join needed as LEFT by either side stays LEFT.
pub(crate) fn merge_joins(into: &mut Joins, from: Joins) {
    for (column, node) in from {
        match into.entry(column) {
            Entry::Vacant(slot) => {
                slot.insert(node);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                existing.left_join |= node.left_join;
                merge_joins(&mut existing.joins, node.joins);
            }
        }
    }
}

/// Does any dimension along `names` allow nulls?
pub(crate) fn path_is_nullable(schema: &Schema, root: &Type, names: &[String]) -> Result<bool> {
    let mut ty = root;
    for name in names {
        let dimension = ty.dimension(name).ok_or_else(|| {
            Error::invalid(format!("Dimension {} not found on type {}", name, ty.name))
        })?;
        if dimension.null {
            return Ok(true);
        }
        ty = schema.target(dimension)?;
    }
    Ok(false)
}

impl Schema {
    /// Resolve one path starting at `ty` to a column and the joins it needs.
    ///
    /// `guaranteed_not_null` is the longest prefix of `path` known to be
    /// non-null because of filters; edges inside it never force a LEFT join.
    /// Once a step needs a LEFT join, every join after it is LEFT too.
    pub fn column_and_joins(
        &self,
        ty: &Type,
        path: &[String],
        path_to_self: &[String],
        guaranteed_not_null: Option<&[String]>,
    ) -> Result<(ColumnRef, Joins)> {
        self.resolve_step(ty, path, path_to_self, guaranteed_not_null, None, false)
    }

    fn resolve_step(
        &self,
        ty: &Type,
        path: &[String],
        path_to_self: &[String],
        guaranteed_not_null: Option<&[String]>,
        via: Option<Via<'_>>,
        left_join: bool,
    ) -> Result<(ColumnRef, Joins)> {
        let primary_path;
        let path = if path.is_empty() {
            let primary = ty.primary_dimension().ok_or_else(|| {
                Error::invalid(format!("Empty dimension path on type {}", ty.name))
            })?;
            primary_path = [primary.name.clone()];
            &primary_path[..]
        } else {
            path
        };
        let (next_name, remaining) = path
            .split_first()
            .ok_or_else(|| Error::invalid("Empty dimension path"))?;

        let dimension = ty.dimension(next_name).ok_or_else(|| {
            Error::invalid(format!(
                "Couldn't resolve dimension path {}: no dimension {} on type {}",
                path_to_self.iter().chain(path).cloned().collect::<Vec<_>>().join("."),
                next_name,
                ty.name
            ))
        })?;

        let denormalized = via.filter(|v| v.dimension.is_denormalized(&dimension.name));
        let mut joins = Joins::new();
        let alias = match denormalized {
            Some(via) => via.parent_alias.to_string(),
            None => {
                if !dimension.on_table {
                    return Err(Error::invalid(format!(
                        "Dimension {}.{} is not on the {} table and isn't denormalized here",
                        ty.name, dimension.name, ty.name
                    )));
                }
                path_to_self.join(".")
            }
        };

        let column = if remaining.is_empty() {
            ColumnRef {
                alias: alias.clone(),
                column: dimension.column_name.clone(),
            }
        } else {
            let further_left = left_join || (dimension.null && guaranteed_not_null.is_none());
            let further_guaranteed = guaranteed_not_null
                .filter(|g| g.len() > 1)
                .map(|g| &g[1..]);
            let mut path_to_dimension = path_to_self.to_vec();
            path_to_dimension.push(next_name.clone());

            let target = self.target(dimension)?;
            let (column, further_joins) = self.resolve_step(
                target,
                remaining,
                &path_to_dimension,
                further_guaranteed,
                Some(Via {
                    parent_alias: &alias,
                    dimension,
                }),
                further_left,
            )?;
            joins = further_joins;
            column
        };

        // Arriving through a non-denormalized edge means this type's table
        // has to be joined in, with everything below nested under it.
        match (via, denormalized) {
            (Some(via), None) => {
                let table = ty.table.clone().ok_or_else(|| {
                    Error::invalid(format!(
                        "Dimension path {} needs a join to type {}, which has no table",
                        path_to_self.join("."),
                        ty.name
                    ))
                })?;
                let primary_key = ty
                    .primary_dimension()
                    .map(|p| p.column_name.clone())
                    .ok_or_else(|| Error::schema(format!("Type {} has no primary dimension", ty.name)))?;
                let node = JoinNode {
                    alias,
                    table,
                    table_filters: ty.table_filters.clone(),
                    left_join,
                    primary_key,
                    joins,
                };
                Ok((column, Joins::from([(via.dimension.column_name.clone(), node)])))
            }
            _ => Ok((column, joins)),
        }
    }

    /// Resolve many paths from `ty` into one merged join tree.
    ///
    /// Types without a table are materialized into a temporary table holding
    /// their primary values (bounded by `range` when infinite) and the values
    /// of every requested path.
    pub fn columns_and_table_with_joins(
        &self,
        ty: &Type,
        paths: &[Vec<String>],
        path_to_self: &[String],
        forced_not_null: &[Vec<String>],
        range: Option<&ValueRange>,
        ctx: Option<&TempTableContext<'_>>,
    ) -> Result<(HashMap<Vec<String>, ColumnRef>, TableWithJoins)> {
        let Some(table) = ty.table.clone() else {
            return self.materialize(ty, paths, path_to_self, range, ctx);
        };

        let mut columns = HashMap::with_capacity(paths.len());
        let mut joins = Joins::new();
        for path in paths {
            let guaranteed = (1..=path.len())
                .rev()
                .map(|len| &path[..len])
                .find(|prefix| forced_not_null.iter().any(|f| f.starts_with(prefix)));
            let (column, more_joins) = self.column_and_joins(ty, path, path_to_self, guaranteed)?;
            columns.insert(path.clone(), column);
            merge_joins(&mut joins, more_joins);
        }

        let result = TableWithJoins {
            table,
            alias: path_to_self.join("."),
            table_filters: ty.table_filters.clone(),
            primary_key: ty.primary_dimension().map(|p| p.column_name.clone()),
            joins,
        };
        debug!("Join tree for {}: {:?}", result.alias, result.joins);
        Ok((columns, result))
    }

    fn materialize(
        &self,
        ty: &Type,
        paths: &[Vec<String>],
        path_to_self: &[String],
        range: Option<&ValueRange>,
        ctx: Option<&TempTableContext<'_>>,
    ) -> Result<(HashMap<Vec<String>, ColumnRef>, TableWithJoins)> {
        let ctx = ctx.ok_or_else(|| {
            Error::unsupported(format!(
                "Type {} has no table; its values can only be generated into a temporary table",
                ty.name
            ))
        })?;
        if ty.is_infinite() && range.is_none() {
            return Err(Error::invalid(format!(
                "Require a range filter to generate possible values for infinite type {}",
                ty.name
            )));
        }

        let mut all_paths: Vec<Vec<String>> = vec![Vec::new()];
        for path in paths {
            if !all_paths.contains(path) {
                all_paths.push(path.clone());
            }
        }
        let column_name = |path: &[String]| {
            std::iter::once(ty.name.as_str())
                .chain(path.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(".")
        };

        let mut column_defs = Vec::with_capacity(all_paths.len());
        for path in &all_paths {
            let value_type = self
                .type_by_path(&ty.name, path)?
                .value_type
                .clone()
                .ok_or_else(|| Error::schema(format!("Path {} has no value type", column_name(path.as_slice()))))?;
            let def = ColumnDef::new(column_name(path.as_slice()), value_type.data_type());
            column_defs.push(if path_is_nullable(self, ty, path)? { def.null() } else { def.not_null() });
        }
        let table = ctx.create_table(column_defs)?;

        let primary_values = ty.generate_primary_values(range, ctx.settings().max_generated_values)?;
        let mut rows = Vec::with_capacity(primary_values.len());
        for primary in &primary_values {
            let mut row = Vec::with_capacity(all_paths.len());
            for path in &all_paths {
                let (mut current, mut value) = (ty, primary.clone());
                for name in path {
                    let dimension = current.dimension(name).ok_or_else(|| {
                        Error::invalid(format!("Dimension {} not found on type {}", name, current.name))
                    })?;
                    value = dimension.generate_value(&value)?;
                    current = self.target(dimension)?;
                }
                let literal = match &current.value_type {
                    Some(value_type) => value_type.internal_to_database(&value),
                    None => Literal::Null,
                };
                row.push(Expr::Literal(literal));
            }
            rows.push(row);
        }
        let names: Vec<String> = all_paths.iter().map(|p| column_name(p.as_slice())).collect();
        ctx.insert_rows(&table, &names, rows)?;
        debug!(
            "Generated {} values of {} into {}",
            primary_values.len(),
            ty.name,
            table
        );

        let alias = path_to_self.join(".");
        let columns = all_paths
            .iter()
            .map(|p| {
                (
                    p.clone(),
                    ColumnRef {
                        alias: alias.clone(),
                        column: column_name(p.as_slice()),
                    },
                )
            })
            .collect();
        Ok((
            columns,
            TableWithJoins {
                table,
                alias,
                table_filters: Vec::new(),
                primary_key: Some(ty.name.clone()),
                joins: Joins::new(),
            },
        ))
    }
}
