//! Typed result rows.

use serde_json::Value as Json;

use super::column::Column;
use crate::backend::RawRows;
use crate::error::{Error, Result};
use crate::schema::Value;

/// Rows of an executing query, converted to internal values as they are read.
pub struct Rows<'a, 'r> {
    raw: &'a mut RawRows<'r>,
    columns: &'a [Column],
}

impl<'a, 'r> Rows<'a, 'r> {
    pub(crate) fn new(raw: &'a mut RawRows<'r>, columns: &'a [Column]) -> Self {
        Self { raw, columns }
    }

    pub fn columns(&self) -> &'a [Column] {
        self.columns
    }
}

impl Iterator for Rows<'_, '_> {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = match self.raw.next()? {
            Ok(raw) => raw,
            Err(e) => return Some(Err(e.into())),
        };
        if raw.len() != self.columns.len() {
            return Some(Err(Error::unsupported(format!(
                "Backend returned {} values for {} columns",
                raw.len(),
                self.columns.len()
            ))));
        }
        Some(
            raw.into_iter()
                .zip(self.columns)
                .map(|(value, column)| column.value_type().database_to_internal(value))
                .collect(),
        )
    }
}

/// External (JSON) form of each value.
pub fn external_row(columns: &[Column], row: &[Value]) -> Vec<Json> {
    columns
        .iter()
        .zip(row)
        .map(|(column, value)| column.value_type().internal_to_external(value))
        .collect()
}

/// Display form of each value. Nulls are empty.
pub fn display_row(columns: &[Column], row: &[Value]) -> Vec<String> {
    external_row(columns, row)
        .into_iter()
        .map(|json| match json {
            Json::Null => String::new(),
            Json::String(s) => s,
            other => other.to_string(),
        })
        .collect()
}
