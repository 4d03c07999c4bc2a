//! TOML schema documents.
//!
//! ```toml
//! [[enums]]
//! name = "format"
//! values = { CD = "cd", Vinyl = "vi" }
//!
//! [[types]]
//! name = "label"
//! kind = "dimension"
//! table = "labels"
//!
//! [[types.dimensions]]
//! name = "id"
//! type = "integer"
//! primary = true
//!
//! [[types.dimensions]]
//! name = "title"
//! type = "string"
//! filterable = true
//! ```
//!
//! Types are registered in document order, so a type must come after the
//! types its dimensions reference.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::{Denormalized, Derive, DimensionDef, Schema, TypeDef};
use crate::error::{Error, Result};
use crate::sql::Literal;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaDoc {
    #[serde(default)]
    enums: Vec<EnumDoc>,
    #[serde(default)]
    types: Vec<TypeDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnumDoc {
    name: String,
    /// External name => stored code.
    values: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum KindDoc {
    Dimension,
    Fact,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypeDoc {
    name: String,
    kind: KindDoc,
    table: Option<String>,
    #[serde(default)]
    table_filters: BTreeMap<String, toml::Value>,
    media_type: Option<String>,
    #[serde(default)]
    dimensions: Vec<DimensionDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DenormalizedDoc {
    All(bool),
    Only(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DimensionDoc {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    column_name: Option<String>,
    on_table: Option<bool>,
    filterable: Option<bool>,
    group_by: Option<bool>,
    aggregate_after_grouping: Option<bool>,
    denormalized: Option<DenormalizedDoc>,
    dependency_respects_ordering: Option<bool>,
    null: Option<bool>,
    primary: Option<bool>,
    derive: Option<String>,
}

impl DimensionDoc {
    fn into_def(self, owner: &str) -> Result<DimensionDef> {
        let mut def = DimensionDef::new(self.name, self.type_name);
        if let Some(column) = self.column_name {
            def = def.column(column);
        }
        if let Some(on_table) = self.on_table {
            def = def.on_table(on_table);
        }
        if self.filterable == Some(true) {
            def = def.filterable();
        }
        if let Some(group_by) = self.group_by {
            def = def.group_by(group_by);
        }
        if let Some(allowed) = self.aggregate_after_grouping {
            def = def.aggregate_after_grouping(allowed);
        }
        def = def.denormalized(match self.denormalized {
            None | Some(DenormalizedDoc::All(false)) => Denormalized::None,
            Some(DenormalizedDoc::All(true)) => Denormalized::All,
            Some(DenormalizedDoc::Only(names)) => Denormalized::Only(names),
        });
        if let Some(respects) = self.dependency_respects_ordering {
            def = def.respects_ordering(respects);
        }
        if self.null == Some(true) {
            def = def.nullable();
        }
        if self.primary == Some(true) {
            def = def.primary();
        }
        if let Some(name) = self.derive {
            let derive = Derive::from_name(&name).ok_or_else(|| {
                Error::schema(format!("{}.{}: unknown derive {}", owner, def.name, name))
            })?;
            def = def.derive(derive);
        }
        Ok(def)
    }
}

fn literal(owner: &str, column: &str, value: toml::Value) -> Result<Literal> {
    match value {
        toml::Value::String(s) => Ok(Literal::String(s)),
        toml::Value::Integer(n) => Ok(Literal::Int(n)),
        toml::Value::Float(x) => Ok(Literal::Float(x)),
        toml::Value::Boolean(b) => Ok(Literal::Bool(b)),
        other => Err(Error::schema(format!(
            "{}: table filter {} must be a scalar, got {}",
            owner,
            column,
            other.type_str()
        ))),
    }
}

/// Build a schema from a TOML document.
pub fn load_str(content: &str) -> Result<Schema> {
    let doc: SchemaDoc = toml::from_str(content)
        .map_err(|e| Error::schema(format!("Failed to parse schema document: {}", e)))?;

    let mut schema = Schema::new();
    for e in doc.enums {
        schema.register_enum(&e.name, e.values)?;
    }
    for t in doc.types {
        let mut def = match t.kind {
            KindDoc::Dimension => TypeDef::dimension(&t.name),
            KindDoc::Fact => TypeDef::fact(&t.name),
        };
        if let Some(table) = t.table {
            def = def.table(table);
        }
        for (column, value) in t.table_filters {
            let value = literal(&t.name, &column, value)?;
            def = def.table_filter(column, value);
        }
        if let Some(media_type) = t.media_type {
            def = def.media_type(media_type);
        }
        for d in t.dimensions {
            def = def.with(d.into_def(&t.name)?);
        }
        schema.register(def)?;
    }

    info!(
        "Loaded schema with {} types ({} facts)",
        schema.types().count(),
        schema.facts().count()
    );
    Ok(schema)
}

/// Read and build a schema from a TOML file.
pub fn load_file(path: impl AsRef<Path>) -> Result<Schema> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        Error::schema(format!("Failed to read schema file {}: {}", path.display(), e))
    })?;
    load_str(&content)
}
