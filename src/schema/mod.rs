//! The schema graph.
//!
//! A [`Schema`] is a registry of named [`Type`]s connected by
//! [`Dimension`] edges:
//!
//! - value types are leaves (strings, dates, enums, calendar counters)
//! - dimension types have one primary dimension identifying their rows
//! - fact types are the roots queries start from
//!
//! Types are registered leaves-first and are immutable once registered.
//! Edges refer to their target by name, so the graph is walked through the
//! owning schema.

mod derive;
mod dimension;
mod loader;
mod resolve;
mod type_def;
mod value;
mod value_type;

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Error, Result};

pub use derive::{Derive, Generator};
pub use dimension::Dimension;
pub use loader::{load_file, load_str};
pub use resolve::{ColumnRef, JoinNode, Joins, TableWithJoins};
pub(crate) use resolve::path_is_nullable;
pub use type_def::{Denormalized, DimensionDef, TableFilter, TypeDef};
pub use value::{
    civil_from_days, days_from_civil, format_date, format_datetime, parse_date, parse_datetime,
    Value, ValueRange,
};
pub use value_type::{catalog, TimeField, ValueKind, ValueType};

use type_def::TypeDefKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Value,
    Dimension,
    Fact,
}

/// A registered type.
#[derive(Debug, Clone)]
pub struct Type {
    pub name: String,
    pub kind: TypeKind,
    pub dimensions: Vec<Dimension>,
    pub table: Option<String>,
    pub table_filters: Vec<TableFilter>,
    pub media_type: Option<String>,
    /// Identifies values of this type: the type itself for value types, the
    /// primary dimension's value type for dimension types. `None` for facts.
    pub value_type: Option<ValueType>,
}

impl Type {
    fn from_value_type(value_type: ValueType) -> Self {
        let name = value_type.name().to_string();
        // A value type is its own primary dimension.
        let itself = Dimension {
            name: name.clone(),
            type_name: name.clone(),
            column_name: name.clone(),
            on_table: true,
            filterable: true,
            group_by: true,
            aggregate_after_grouping: true,
            denormalized: Vec::new(),
            dependency_respects_ordering: true,
            null: false,
            primary: true,
            generator: None,
        };
        Self {
            name,
            kind: TypeKind::Value,
            dimensions: vec![itself],
            table: None,
            table_filters: Vec::new(),
            media_type: None,
            value_type: Some(value_type),
        }
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn primary_dimension(&self) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.primary)
    }

    pub fn is_fact(&self) -> bool {
        self.kind == TypeKind::Fact
    }

    /// Whether enumerating this type's values needs a bounding range.
    pub fn is_infinite(&self) -> bool {
        match self.kind {
            TypeKind::Fact => false,
            TypeKind::Value | TypeKind::Dimension => {
                self.table.is_none() && self.value_type.as_ref().is_some_and(|v| v.is_infinite())
            }
        }
    }

    /// Primary values for a type without a table.
    pub fn generate_primary_values(&self, range: Option<&ValueRange>, max: usize) -> Result<Vec<Value>> {
        match &self.value_type {
            Some(value_type) => value_type.generate_values(range, max),
            None => Err(Error::unsupported(format!(
                "Can't generate possible primary dimension values for type {}",
                self.name
            ))),
        }
    }
}

/// Registry of types by name.
#[derive(Debug, Clone)]
pub struct Schema {
    types: Vec<Type>,
    index: HashMap<String, usize>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    /// A schema holding the built-in value types.
    pub fn new() -> Self {
        let mut schema = Schema {
            types: Vec::new(),
            index: HashMap::new(),
        };
        for value_type in catalog() {
            schema.insert(Type::from_value_type(value_type.clone()));
        }
        schema
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    pub fn types(&self) -> impl Iterator<Item = &Type> {
        self.types.iter()
    }

    pub fn facts(&self) -> impl Iterator<Item = &Type> {
        self.types.iter().filter(|t| t.is_fact())
    }

    /// Register an enumeration value type from `(external name, code)` pairs.
    pub fn register_enum<N, C>(
        &mut self,
        name: &str,
        mapping: impl IntoIterator<Item = (N, C)>,
    ) -> Result<&Type>
    where
        N: Into<String>,
        C: Into<String>,
    {
        let value_type = ValueType::enumeration(name, mapping);
        if let ValueKind::Enum(pairs) = value_type.kind() {
            if pairs.is_empty() {
                return Err(Error::schema(format!("Enum {} has no values", name)));
            }
            for (i, (external, code)) in pairs.iter().enumerate() {
                if pairs[..i].iter().any(|(e, c)| e == external || c == code) {
                    return Err(Error::schema(format!(
                        "Enum {} maps {} => {} more than once",
                        name, external, code
                    )));
                }
            }
        }
        self.register(TypeDef::value(value_type))
    }

    /// Validate and add a type. A failed registration leaves the schema
    /// unchanged.
    pub fn register(&mut self, def: TypeDef) -> Result<&Type> {
        if self.index.contains_key(&def.name) {
            return Err(Error::schema(format!("Type {} already registered", def.name)));
        }
        let ty = self.build_type(def)?;
        debug!(
            "Registered {:?} type {} with {} dimensions",
            ty.kind,
            ty.name,
            ty.dimensions.len()
        );
        let idx = self.insert(ty);
        Ok(&self.types[idx])
    }

    fn insert(&mut self, ty: Type) -> usize {
        let idx = self.types.len();
        self.index.insert(ty.name.clone(), idx);
        self.types.push(ty);
        idx
    }

    /// Follow dimension names from `root`, returning the type reached.
    pub fn type_by_path(&self, root: &str, names: &[String]) -> Result<&Type> {
        let mut ty = self
            .get(root)
            .ok_or_else(|| Error::invalid(format!("Type {} not found", root)))?;
        for name in names {
            let dimension = ty.dimension(name).ok_or_else(|| {
                Error::invalid(format!("Dimension {} not found on type {}", name, ty.name))
            })?;
            ty = self.target(dimension)?;
        }
        Ok(ty)
    }

    /// The type a dimension points at.
    pub fn target(&self, dimension: &Dimension) -> Result<&Type> {
        self.get(&dimension.type_name).ok_or_else(|| {
            Error::schema(format!(
                "Type {} of dimension {} not found",
                dimension.type_name, dimension.name
            ))
        })
    }

    // =========================================================================
    // Registration
    // =========================================================================

    fn build_type(&self, def: TypeDef) -> Result<Type> {
        let kind = match def.kind {
            TypeDefKind::Value(value_type) => {
                if !def.dimensions.is_empty() || def.table.is_some() {
                    return Err(Error::schema(format!(
                        "Value type {} can't declare dimensions or a table",
                        def.name
                    )));
                }
                return Ok(Type::from_value_type(value_type));
            }
            TypeDefKind::Dimension => TypeKind::Dimension,
            TypeDefKind::Fact => TypeKind::Fact,
        };

        let mut dimensions: Vec<Dimension> = Vec::with_capacity(def.dimensions.len());
        for dim_def in def.dimensions {
            if dimensions.iter().any(|d| d.name == dim_def.name) {
                return Err(Error::schema(format!(
                    "Dimension {} already registered on type {}",
                    dim_def.name, def.name
                )));
            }
            dimensions.push(self.build_dimension(&def.name, kind, dim_def)?);
        }

        let primaries: Vec<&Dimension> = dimensions.iter().filter(|d| d.primary).collect();
        let value_type = match kind {
            TypeKind::Fact => {
                if def.table.is_none() {
                    return Err(Error::schema(format!("Fact type {} needs a table", def.name)));
                }
                if let Some(d) = primaries.first() {
                    return Err(Error::schema(format!(
                        "Fact type {} can't have a primary dimension ({})",
                        def.name, d.name
                    )));
                }
                None
            }
            _ => {
                let [primary] = primaries.as_slice() else {
                    return Err(Error::schema(format!(
                        "Dimension type {} must have exactly one primary dimension, found {}",
                        def.name,
                        primaries.len()
                    )));
                };
                let target = self.target(primary)?;
                let Some(value_type) = target.value_type.clone() else {
                    return Err(Error::schema(format!(
                        "Primary dimension {} of {} must reference a value or dimension type",
                        primary.name, def.name
                    )));
                };
                Some(value_type)
            }
        };

        Ok(Type {
            name: def.name,
            kind,
            dimensions,
            table: def.table,
            table_filters: def.table_filters,
            media_type: def.media_type,
            value_type,
        })
    }

    fn build_dimension(&self, owner: &str, owner_kind: TypeKind, def: DimensionDef) -> Result<Dimension> {
        let target = self.get(&def.type_name).ok_or_else(|| {
            Error::schema(format!(
                "Type {} of dimension {}.{} not found in schema yet",
                def.type_name, owner, def.name
            ))
        })?;
        if target.is_fact() {
            return Err(Error::schema(format!(
                "Dimension {}.{} references fact type {}; only value or dimension types can be referenced",
                owner, def.name, target.name
            )));
        }
        if owner_kind == TypeKind::Fact && !def.on_table {
            return Err(Error::schema(format!(
                "Dimensions of fact types must always be on_table ({}.{})",
                owner, def.name
            )));
        }

        let column_name = def.column_name.unwrap_or_else(|| {
            let integer_keyed = target.kind == TypeKind::Dimension
                && target
                    .value_type
                    .as_ref()
                    .is_some_and(|v| *v.kind() == ValueKind::Integer);
            if integer_keyed {
                format!("{}_id", def.name)
            } else {
                def.name.clone()
            }
        });

        let denormalized = match def.denormalized {
            Denormalized::None => Vec::new(),
            _ if target.kind != TypeKind::Dimension => {
                return Err(Error::schema(format!(
                    "{}.{}: denormalized only makes sense for dimensions referring to a dimension type",
                    owner, def.name
                )))
            }
            Denormalized::All => target.dimensions.iter().map(|d| d.name.clone()).collect(),
            Denormalized::Only(names) => {
                if let Some(missing) = names.iter().find(|n| target.dimension(n).is_none()) {
                    return Err(Error::schema(format!(
                        "{}.{}: denormalized dimension {} not found on type {}",
                        owner, def.name, missing, target.name
                    )));
                }
                names
            }
        };

        if let Some(derive) = def.derive {
            let target_value = target.value_type.as_ref().map(|v| v.name());
            if target_value != Some(derive.value_type_name()) {
                return Err(Error::schema(format!(
                    "{}.{}: derive {} doesn't produce values of type {}",
                    owner,
                    def.name,
                    derive.value_type_name(),
                    target.name
                )));
            }
        }

        Ok(Dimension {
            name: def.name,
            type_name: def.type_name,
            column_name,
            on_table: def.on_table,
            filterable: def.filterable,
            group_by: def.group_by,
            aggregate_after_grouping: def.aggregate_after_grouping,
            denormalized,
            dependency_respects_ordering: def
                .dependency_respects_ordering
                .or(def.derive.map(Derive::respects_ordering))
                .or(def.primary.then_some(true))
                .unwrap_or(false),
            null: def.null,
            primary: def.primary,
            generator: def.generator.or(def.derive.map(Derive::generator)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn music() -> Schema {
        let mut schema = Schema::new();
        schema
            .register(
                TypeDef::dimension("label")
                    .table("labels")
                    .with(DimensionDef::new("id", "integer").primary())
                    .with(DimensionDef::new("title", "string").filterable()),
            )
            .unwrap();
        schema
            .register(
                TypeDef::dimension("calendar_day")
                    .with(DimensionDef::new("calendar_day", "date").primary())
                    .with(
                        DimensionDef::new("day_of_week", "day_of_week")
                            .derive(Derive::from_name("day_of_week").unwrap()),
                    ),
            )
            .unwrap();
        schema
            .register(
                TypeDef::fact("sale")
                    .table("sales")
                    .with(DimensionDef::new("label", "label").nullable())
                    .with(
                        DimensionDef::new("calendar_day", "calendar_day")
                            .denormalized(Denormalized::All),
                    ),
            )
            .unwrap();
        schema
    }

    #[test]
    fn test_catalog_registered() {
        let schema = Schema::new();
        let date = schema.get("date").unwrap();
        assert_eq!(date.kind, TypeKind::Value);
        assert!(date.primary_dimension().unwrap().primary);
        assert!(date.is_infinite());
        assert!(!schema.get("day_of_week").unwrap().is_infinite());
    }

    #[test]
    fn test_column_name_defaults() {
        let schema = music();
        let sale = schema.get("sale").unwrap();
        assert_eq!(sale.dimension("label").unwrap().column_name, "label_id");
        // date-keyed, so no _id suffix
        assert_eq!(sale.dimension("calendar_day").unwrap().column_name, "calendar_day");
        assert_eq!(
            sale.dimension("calendar_day").unwrap().denormalized,
            vec!["calendar_day", "day_of_week"]
        );
    }

    #[test]
    fn test_dimension_type_infinite_without_table() {
        let schema = music();
        assert!(schema.get("calendar_day").unwrap().is_infinite());
        assert!(!schema.get("label").unwrap().is_infinite());
        let dow = schema.get("calendar_day").unwrap().dimension("day_of_week").unwrap();
        assert!(!dow.dependency_respects_ordering);
    }

    #[test]
    fn test_type_by_path() {
        let schema = music();
        let names = vec!["label".to_string(), "title".to_string()];
        assert_eq!(schema.type_by_path("sale", &names).unwrap().name, "string");

        let bad = vec!["label".to_string(), "country".to_string()];
        let err = schema.type_by_path("sale", &bad).unwrap_err();
        assert!(matches!(err, Error::InvalidQueryParams(_)));
    }

    #[test]
    fn test_duplicate_registration_leaves_schema_unchanged() {
        let mut schema = music();
        let before = schema.types().count();
        let err = schema
            .register(TypeDef::dimension("label").table("other_labels"))
            .unwrap_err();
        assert!(matches!(err, Error::SchemaDefinition(_)));
        assert_eq!(schema.types().count(), before);
        assert_eq!(schema.get("label").unwrap().table.as_deref(), Some("labels"));
    }

    #[test]
    fn test_registration_errors() {
        let mut schema = music();

        let err = schema
            .register(
                TypeDef::fact("stream")
                    .table("streams")
                    .with(DimensionDef::new("label", "label").on_table(false)),
            )
            .unwrap_err();
        assert!(err.to_string().contains("on_table"));

        let err = schema
            .register(
                TypeDef::fact("play")
                    .table("plays")
                    .with(DimensionDef::new("title", "string").denormalized(Denormalized::All)),
            )
            .unwrap_err();
        assert!(err.to_string().contains("denormalized"));

        let err = schema
            .register(TypeDef::dimension("artist").table("artists"))
            .unwrap_err();
        assert!(err.to_string().contains("exactly one primary"));

        let err = schema
            .register(
                TypeDef::dimension("track")
                    .with(DimensionDef::new("id", "integer").primary())
                    .with(DimensionDef::new("id", "string")),
            )
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));

        let err = schema
            .register(TypeDef::dimension("mix").with(DimensionDef::new("id", "vinyl").primary()))
            .unwrap_err();
        assert!(err.to_string().contains("not found"));

        assert!(schema.get("stream").is_none());
        assert!(schema.get("track").is_none());
    }

    #[test]
    fn test_register_enum() {
        let mut schema = Schema::new();
        let format = schema
            .register_enum("format", [("CD", "cd"), ("Vinyl", "vi")])
            .unwrap();
        assert!(!format.is_infinite());
        assert_eq!(
            format.generate_primary_values(None, 10).unwrap(),
            vec![Value::Text("cd".into()), Value::Text("vi".into())]
        );
        let err = schema.register_enum("speed", [("Fast", "f"), ("Faster", "f")]).unwrap_err();
        assert!(matches!(err, Error::SchemaDefinition(_)));
    }
}
