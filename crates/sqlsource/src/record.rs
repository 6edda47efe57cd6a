//! Output records
//!
//! Every scanned row becomes one [`ObjectRecord`]: an identity built from the
//! row's primary key, a collection named after its table, and all of the
//! row's columns as properties.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::description::Table;
use crate::error::{Error, Result};
use crate::types::{Row, Value};

/// Separator between primary key values in a record id
pub const ID_SEPARATOR: &str = "_";

/// A generic identity-keyed record handed to a publisher
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectRecord {
    /// Primary key values joined with `_`, in primary key order
    pub id: String,
    /// Snake-cased `schema_table`
    pub collection: String,
    /// Every column of the row, primary keys included
    pub properties: BTreeMap<String, Value>,
}

impl ObjectRecord {
    /// Build the record for one (already transformed) row of `table`
    pub fn from_row(table: &Table, row: Row) -> Result<Self> {
        let id = primary_key_values(table, &row)?
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(ID_SEPARATOR);

        Ok(Self {
            id,
            collection: collection_name(&table.schema_name, &table.table_name),
            properties: row.into_map().into_iter().collect(),
        })
    }
}

/// The row's values for `table`'s primary key, in key order
pub fn primary_key_values(table: &Table, row: &Row) -> Result<Vec<Value>> {
    table
        .primary_keys
        .iter()
        .map(|key| {
            row.get_by_name(key).cloned().ok_or_else(|| {
                Error::scan(
                    table.qualified_name(),
                    format!("row is missing primary key column {}", key),
                )
            })
        })
        .collect()
}

/// Collection name for a table: `snake_case(schema + "_" + table)`.
///
/// An empty schema yields just the snake-cased table name.
pub fn collection_name(schema: &str, table: &str) -> String {
    to_snake_case(&format!("{}_{}", schema, table))
}

/// Convert an identifier to snake_case.
///
/// `UserGroups` → `user_groups`, `HTTPServer` → `http_server`,
/// `order-items` → `order_items`. Runs of separators collapse and leading or
/// trailing separators are dropped.
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + 8);

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !result.is_empty() && !result.ends_with('_') {
                result.push('_');
            }
            continue;
        }

        if c.is_uppercase() && !result.is_empty() && !result.ends_with('_') {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            // word boundary: `aB`, `1B` or the last capital of an acronym in `ABc`
            if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_is_lower)
            {
                result.push('_');
            }
        }

        result.extend(c.to_lowercase());
    }

    while result.ends_with('_') {
        result.pop();
    }
    result
}
