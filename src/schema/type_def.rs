//! Builders for registering types.
//!
//! ```ignore
//! let mut schema = Schema::new();
//! schema.register(
//!     TypeDef::dimension("label")
//!         .table("labels")
//!         .with(DimensionDef::new("id", "integer").primary())
//!         .with(DimensionDef::new("title", "string").filterable()),
//! )?;
//! ```

use super::derive::{Derive, Generator};
use super::value_type::ValueType;
use crate::sql::Literal;

/// Which dimensions of the target are copied onto the owner's table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Denormalized {
    #[default]
    None,
    All,
    Only(Vec<String>),
}

/// Fixed column value restricting a shared table to one type's rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TableFilter {
    pub column: String,
    pub value: Literal,
}

#[derive(Debug, Clone)]
pub(crate) enum TypeDefKind {
    Value(ValueType),
    Dimension,
    Fact,
}

/// An unregistered type.
#[derive(Debug, Clone)]
#[must_use]
pub struct TypeDef {
    pub(crate) name: String,
    pub(crate) kind: TypeDefKind,
    pub(crate) table: Option<String>,
    pub(crate) table_filters: Vec<TableFilter>,
    pub(crate) media_type: Option<String>,
    pub(crate) dimensions: Vec<DimensionDef>,
}

impl TypeDef {
    fn new(name: String, kind: TypeDefKind) -> Self {
        Self {
            name,
            kind,
            table: None,
            table_filters: Vec::new(),
            media_type: None,
            dimensions: Vec::new(),
        }
    }

    pub fn dimension(name: impl Into<String>) -> Self {
        Self::new(name.into(), TypeDefKind::Dimension)
    }

    pub fn fact(name: impl Into<String>) -> Self {
        Self::new(name.into(), TypeDefKind::Fact)
    }

    pub fn value(value_type: ValueType) -> Self {
        Self::new(value_type.name().to_string(), TypeDefKind::Value(value_type))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn table_filter(mut self, column: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.table_filters.push(TableFilter {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Add a dimension.
    pub fn with(mut self, dimension: DimensionDef) -> Self {
        self.dimensions.push(dimension);
        self
    }
}

/// An unresolved dimension. Defaults match a plain on-table attribute
/// that can be grouped by but not filtered on.
#[derive(Debug, Clone)]
#[must_use]
pub struct DimensionDef {
    pub(crate) name: String,
    pub(crate) type_name: String,
    pub(crate) column_name: Option<String>,
    pub(crate) on_table: bool,
    pub(crate) filterable: bool,
    pub(crate) group_by: bool,
    pub(crate) aggregate_after_grouping: bool,
    pub(crate) denormalized: Denormalized,
    pub(crate) dependency_respects_ordering: Option<bool>,
    pub(crate) null: bool,
    pub(crate) primary: bool,
    pub(crate) derive: Option<Derive>,
    pub(crate) generator: Option<Generator>,
}

impl DimensionDef {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            column_name: None,
            on_table: true,
            filterable: false,
            group_by: true,
            aggregate_after_grouping: true,
            denormalized: Denormalized::None,
            dependency_respects_ordering: None,
            null: false,
            primary: false,
            derive: None,
            generator: None,
        }
    }

    pub fn column(mut self, column_name: impl Into<String>) -> Self {
        self.column_name = Some(column_name.into());
        self
    }

    pub fn on_table(mut self, on_table: bool) -> Self {
        self.on_table = on_table;
        self
    }

    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    pub fn group_by(mut self, group_by: bool) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn aggregate_after_grouping(mut self, allowed: bool) -> Self {
        self.aggregate_after_grouping = allowed;
        self
    }

    pub fn denormalized(mut self, denormalized: Denormalized) -> Self {
        self.denormalized = denormalized;
        self
    }

    pub fn respects_ordering(mut self, respects: bool) -> Self {
        self.dependency_respects_ordering = Some(respects);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Generate values with a built-in calendar generator. Also sets the
    /// ordering flag unless it was given explicitly.
    pub fn derive(mut self, derive: Derive) -> Self {
        self.derive = Some(derive);
        self
    }

    pub fn generator(mut self, generator: Generator) -> Self {
        self.generator = Some(generator);
        self
    }
}
