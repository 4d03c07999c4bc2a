//! Query options as supplied by callers.
//!
//! ```json
//! {
//!   "fact": "sale",
//!   "group_by": ["label"],
//!   "select": ["label", "label.title"],
//!   "aggregates": [["count", "count"], ["revenue", "sum", "price"]],
//!   "filters": [["calendar_day", "between", "2024-01-01", "2024-01-31"]],
//!   "order": ["revenue", "desc"],
//!   "limit": 10
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{Error, Result};

/// A dimension path, dotted (`"label.title"`) or as a list of names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PathSpec {
    Dotted(String),
    Names(Vec<String>),
}

impl PathSpec {
    pub fn names(&self) -> Vec<String> {
        match self {
            PathSpec::Dotted(s) => s.split('.').map(str::to_string).collect(),
            PathSpec::Names(names) => names.clone(),
        }
    }

    pub fn from_json(json: &Json) -> Result<Self> {
        serde_json::from_value(json.clone())
            .map_err(|_| Error::invalid(format!("Expected a dimension path, got {}", json)))
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSpec::Dotted(s) => write!(f, "{}", s),
            PathSpec::Names(names) => write!(f, "{}", names.join(".")),
        }
    }
}

/// `[column, "asc" | "desc"]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OrderSpec(pub PathSpec, pub String);

/// `true` for the default bucket count, or an explicit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DistributionSpec {
    Enabled(bool),
    Buckets(u32),
}

impl DistributionSpec {
    /// Bucket count to use, `None` when disabled.
    pub fn num_buckets(self, default: u32) -> Result<Option<u32>> {
        match self {
            DistributionSpec::Enabled(false) => Ok(None),
            DistributionSpec::Enabled(true) => Ok(Some(default)),
            DistributionSpec::Buckets(0) => Err(Error::invalid("distribution needs at least one bucket")),
            DistributionSpec::Buckets(n) => Ok(Some(n)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueryOptions {
    pub fact: String,

    /// Defaults to `group_by` (or `second_group_by` for a second aggregation).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<PathSpec>>,

    /// `[alias, kind, arg...]`. Defaults to a single `count`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregates: Option<Vec<Vec<Json>>>,

    #[serde(default)]
    pub group_by: Vec<PathSpec>,

    /// `[path, op, value...]`
    #[serde(default)]
    pub filters: Vec<Vec<Json>>,

    #[serde(default)]
    pub include_all_values: bool,

    #[serde(default)]
    pub may_promote_range_filters: bool,

    /// `[alias, kind, arg...]` where a string arg names a first-stage
    /// aggregate and a list arg is a path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_aggregates: Option<Vec<Vec<Json>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second_group_by: Option<Vec<PathSpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<DistributionSpec>,
}

impl QueryOptions {
    pub fn new(fact: impl Into<String>) -> Self {
        Self {
            fact: fact.into(),
            ..Self::default()
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::invalid(format!("Failed to parse query options: {}", e)))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::invalid(format!("Failed to parse query options: {}", e)))
    }

    pub fn is_second_aggregate(&self) -> bool {
        self.second_aggregates.is_some() || self.second_group_by.is_some()
    }
}
