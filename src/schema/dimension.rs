//! Dimensions: named, typed edges between types.

use super::derive::Generator;
use super::value::Value;
use crate::error::{Error, Result};

/// A resolved edge from an owning type to `type_name`.
///
/// Built from a [`DimensionDef`](super::DimensionDef) when the owning type is
/// registered; the defaults below have already been applied.
#[derive(Debug, Clone)]
pub struct Dimension {
    pub name: String,
    /// Target type.
    pub type_name: String,
    /// Column on the owner's table holding this value (or the key to join on).
    pub column_name: String,
    pub on_table: bool,
    pub filterable: bool,
    pub group_by: bool,
    pub aggregate_after_grouping: bool,
    /// Dimensions of the target type copied onto the owner's table.
    pub denormalized: Vec<String>,
    pub dependency_respects_ordering: bool,
    pub null: bool,
    pub primary: bool,
    pub generator: Option<Generator>,
}

impl Dimension {
    pub fn is_denormalized(&self, name: &str) -> bool {
        self.denormalized.iter().any(|d| d == name)
    }

    /// The value this dimension takes for an owner whose primary value is
    /// `owner_value`.
    pub fn generate_value(&self, owner_value: &Value) -> Result<Value> {
        if self.primary {
            return Ok(owner_value.clone());
        }
        match &self.generator {
            Some(generator) => Ok(generator.call(owner_value)),
            None => Err(Error::unsupported(format!(
                "Dimension {} has no generator for its values",
                self.name
            ))),
        }
    }
}
