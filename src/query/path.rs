//! Dimension paths.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::options::PathSpec;
use crate::error::{Error, Result};
use crate::schema::{Dimension, Schema, Type, ValueType};
use crate::sql::{table_col, Expr};

/// A chain of dimension names starting at `root`, e.g. `sale.label.title`.
///
/// Two paths are equal when their aliases are. The column expression is
/// resolved at construction when the root type has a table; paths rooted at
/// a table-less type get theirs through [`with_expression`](Self::with_expression).
#[derive(Clone)]
pub struct DimensionPath {
    schema: Arc<Schema>,
    root: String,
    names: Vec<String>,
    value_type: ValueType,
    null: bool,
    expr: Option<Expr>,
}

impl DimensionPath {
    /// Resolve `names` from `root`. An empty path stands for the root's
    /// primary dimension.
    pub fn new(schema: &Arc<Schema>, root: &str, names: Vec<String>) -> Result<Self> {
        let root_type = schema
            .get(root)
            .ok_or_else(|| Error::invalid(format!("Type {} not found", root)))?;
        let target = schema.type_by_path(root, &names)?;
        let value_type = target.value_type.clone().ok_or_else(|| {
            Error::invalid(format!("Dimension path {}.{} has no value type", root, names.join(".")))
        })?;
        let null = crate::schema::path_is_nullable(schema, root_type, &names)?;
        let expr = match root_type.table {
            Some(_) => {
                let (column, _) =
                    schema.column_and_joins(root_type, &names, &[root.to_string()], None)?;
                Some(column.to_expr())
            }
            None => None,
        };
        Ok(Self {
            schema: Arc::clone(schema),
            root: root.to_string(),
            names,
            value_type,
            null,
            expr,
        })
    }

    /// A user-supplied path on a fact. Must name at least one dimension.
    pub fn parse(schema: &Arc<Schema>, fact: &str, spec: &PathSpec) -> Result<Self> {
        let names = spec.names();
        if names.is_empty() || names.iter().any(String::is_empty) {
            return Err(Error::invalid(format!("Invalid dimension path {}", spec)));
        }
        Self::new(schema, fact, names)
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn alias(&self) -> String {
        self.fact_and_names().join(".")
    }

    /// Root followed by the dimension names.
    pub fn fact_and_names(&self) -> Vec<String> {
        std::iter::once(self.root.clone())
            .chain(self.names.iter().cloned())
            .collect()
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    /// Whether any dimension along the path may be absent.
    pub fn is_null(&self) -> bool {
        self.null
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn expression(&self) -> Result<Expr> {
        self.expr.clone().ok_or_else(|| {
            Error::unsupported(format!(
                "Path {} has no column; type {} has no table",
                self.alias(),
                self.root
            ))
        })
    }

    pub fn with_expression(&self, expr: Expr) -> Self {
        Self {
            expr: Some(expr),
            ..self.clone()
        }
    }

    /// The same path read from a subquery's output column.
    pub fn of_subquery(&self, subquery: &str) -> Self {
        self.with_expression(table_col(subquery, &self.alias()))
    }

    /// Is `other` a prefix of this path (or the path itself)?
    pub fn is_dependent_on(&self, other: &DimensionPath) -> bool {
        self.root == other.root && self.names.starts_with(&other.names)
    }

    pub fn is_dependent_on_any<'a>(&self, others: impl IntoIterator<Item = &'a DimensionPath>) -> bool {
        others.into_iter().any(|o| self.is_dependent_on(o))
    }

    /// The first pair in `paths` where one is a strict prefix of the other.
    pub fn pairwise_dependencies(paths: &[DimensionPath]) -> Option<(&DimensionPath, &DimensionPath)> {
        paths.iter().enumerate().find_map(|(i, a)| {
            paths
                .iter()
                .enumerate()
                .find(|(j, b)| i != *j && a != *b && a.is_dependent_on(b))
                .map(|(_, b)| (a, b))
        })
    }

    /// This path re-rooted at the type `ancestor` leads to.
    pub fn relative_to(&self, ancestor: &DimensionPath) -> Result<DimensionPath> {
        if !self.is_dependent_on(ancestor) {
            return Err(Error::invalid(format!(
                "{} is not dependent on {}",
                self.alias(),
                ancestor.alias()
            )));
        }
        let root = ancestor.target_type()?.name.clone();
        Self::new(&self.schema, &root, self.names[ancestor.names.len()..].to_vec())
    }

    pub fn parent(&self) -> Option<Result<DimensionPath>> {
        match self.names.len() {
            0 | 1 => None,
            n => Some(Self::new(&self.schema, &self.root, self.names[..n - 1].to_vec())),
        }
    }

    /// Every non-empty prefix, shortest first. Includes the path itself.
    pub fn ancestors(&self) -> Result<Vec<DimensionPath>> {
        (1..=self.names.len())
            .map(|len| Self::new(&self.schema, &self.root, self.names[..len].to_vec()))
            .collect()
    }

    /// The type the path leads to.
    pub fn target_type(&self) -> Result<&Type> {
        self.schema.type_by_path(&self.root, &self.names)
    }

    pub fn last_dimension(&self) -> Result<&Dimension> {
        let (last, init) = self
            .names
            .split_last()
            .ok_or_else(|| Error::invalid(format!("Path {} names no dimension", self.alias())))?;
        let owner = self.schema.type_by_path(&self.root, init)?;
        owner.dimension(last).ok_or_else(|| {
            Error::invalid(format!("Dimension {} not found on type {}", last, owner.name))
        })
    }

    pub fn media_type(&self) -> Option<String> {
        self.target_type().ok().and_then(|t| t.media_type.clone())
    }
}

impl PartialEq for DimensionPath {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.names == other.names
    }
}

impl Eq for DimensionPath {}

impl Hash for DimensionPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.root.hash(state);
        self.names.hash(state);
    }
}

impl fmt::Debug for DimensionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DimensionPath")
            .field("alias", &self.alias())
            .field("value_type", &self.value_type.name())
            .field("null", &self.null)
            .finish()
    }
}

impl fmt::Display for DimensionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.alias())
    }
}
