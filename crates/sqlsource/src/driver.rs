//! Driver contract for sqlsource
//!
//! A driver is the only backend-specific piece of a sync. It supplies four
//! capabilities, plus an optional `close`:
//! - connect: establish connectivity from a [`ConnectionConfig`]
//! - describe: introspect the catalog into a [`Description`]
//! - scan: return one chunk of rows past a primary key cursor
//! - transform: normalize a scanned row's values
//!
//! The scan engine and the orchestrator only ever talk to this trait.

use async_trait::async_trait;
use std::fmt;

use crate::config::ConnectionConfig;
use crate::description::{Description, Table};
use crate::error::Result;
use crate::types::{Row, Value};

/// Default number of rows a driver returns per scan call
pub const DEFAULT_CHUNK_SIZE: u32 = 1000;

/// Position of a keyset scan within a table
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScanCursor {
    /// Before the first row
    #[default]
    Start,
    /// After the row with this primary key tuple, in primary key order
    After(Vec<Value>),
}

impl ScanCursor {
    /// Whether this is the start of the table
    #[inline]
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }

    /// Primary key values of the last consumed row; empty at the start
    pub fn values(&self) -> &[Value] {
        match self {
            Self::Start => &[],
            Self::After(values) => values,
        }
    }
}

impl fmt::Display for ScanCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::After(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

/// A database backend
#[async_trait]
pub trait Driver: Send + Sync {
    /// Backend name used in logs
    fn name(&self) -> &'static str;

    /// Establish connectivity. Must be called once before any other operation.
    async fn connect(&self, config: &ConnectionConfig) -> Result<()>;

    /// Introspect every base table with its columns and primary keys
    async fn describe(&self) -> Result<Description>;

    /// Read the next chunk of `table`.
    ///
    /// Returns rows whose primary key tuple is strictly greater than `cursor`
    /// (lexicographically, in the table's primary key order), sorted ascending
    /// by that tuple. An empty chunk means the table is exhausted.
    async fn scan(&self, table: &Table, cursor: &ScanCursor) -> Result<Vec<Row>>;

    /// Release backend resources. The driver is unusable afterwards.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Backend-specific value normalization applied to every scanned row.
    ///
    /// Must be pure and idempotent and must keep primary key columns.
    fn transform(&self, row: Row) -> Row {
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_default_is_start() {
        let cursor = ScanCursor::default();
        assert!(cursor.is_start());
        assert!(cursor.values().is_empty());
    }

    #[test]
    fn test_cursor_display() {
        assert_eq!(ScanCursor::Start.to_string(), "start");
        let cursor = ScanCursor::After(vec![Value::Int32(5), Value::from("a")]);
        assert_eq!(cursor.to_string(), "(5, a)");
        assert_eq!(cursor.values().len(), 2);
    }
}
