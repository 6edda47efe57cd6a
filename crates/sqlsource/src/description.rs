//! Schema description for sqlsource
//!
//! Provides:
//! - Column: one catalog row seen while describing a database
//! - Table: primary keys, columns and the per-run scanned-row counter
//! - Description: the full table set, built column by column or parsed
//!   from the JSON artifact written by the describe pass
//!
//! The artifact groups tables by schema:
//!
//! ```json
//! {
//!   "public": {
//!     "users": { "primary_keys": ["id"], "columns": ["id", "email"] }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// A column discovered during catalog introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Schema name
    pub schema: String,
    /// Table name
    pub table: String,
    /// Column name
    pub name: String,
    /// Whether the column belongs to the primary key
    pub is_primary_key: bool,
}

impl Column {
    /// Create a regular column
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            name: name.into(),
            is_primary_key: false,
        }
    }

    /// Create a primary key column
    pub fn primary_key(
        schema: impl Into<String>,
        table: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            is_primary_key: true,
            ..Self::new(schema, table, name)
        }
    }
}

/// A table to scan
#[derive(Debug)]
pub struct Table {
    /// Schema name
    pub schema_name: String,
    /// Table name
    pub table_name: String,
    /// Primary key columns; their order is the pagination order
    pub primary_keys: Vec<String>,
    /// Selectable columns
    pub columns: Vec<String>,
    /// Reserved for incremental sync, persisted but unused
    pub marker_column: Option<String>,
    /// Reserved for incremental sync, persisted but unused
    pub last_marker: Option<serde_json::Value>,
    scanned_rows: AtomicU64,
}

impl Table {
    /// Create an empty table
    pub fn new(schema_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
            primary_keys: Vec::new(),
            columns: Vec::new(),
            marker_column: None,
            last_marker: None,
            scanned_rows: AtomicU64::new(0),
        }
    }

    /// Set primary key columns
    pub fn with_primary_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set selectable columns
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// `schema.table`, or just `table` when the schema is empty
    pub fn qualified_name(&self) -> String {
        if self.schema_name.is_empty() {
            self.table_name.clone()
        } else {
            format!("{}.{}", self.schema_name, self.table_name)
        }
    }

    /// Whether the table has a primary key to paginate on
    #[inline]
    pub fn has_primary_key(&self) -> bool {
        !self.primary_keys.is_empty()
    }

    /// Count one scanned row
    #[inline]
    pub fn incr_scanned(&self) {
        self.scanned_rows.fetch_add(1, Ordering::Relaxed);
    }

    /// Rows scanned so far in this run
    #[inline]
    pub fn scanned_rows(&self) -> u64 {
        self.scanned_rows.load(Ordering::Relaxed)
    }

    fn push_column(&mut self, name: &str, is_primary_key: bool) {
        if !self.columns.iter().any(|c| c == name) {
            self.columns.push(name.to_string());
        }
        if is_primary_key && !self.primary_keys.iter().any(|c| c == name) {
            self.primary_keys.push(name.to_string());
        }
    }
}

impl Clone for Table {
    fn clone(&self) -> Self {
        Self {
            schema_name: self.schema_name.clone(),
            table_name: self.table_name.clone(),
            primary_keys: self.primary_keys.clone(),
            columns: self.columns.clone(),
            marker_column: self.marker_column.clone(),
            last_marker: self.last_marker.clone(),
            scanned_rows: AtomicU64::new(self.scanned_rows()),
        }
    }
}

/// Equality covers the persisted shape, not the run counter
impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.schema_name == other.schema_name
            && self.table_name == other.table_name
            && self.primary_keys == other.primary_keys
            && self.columns == other.columns
            && self.marker_column == other.marker_column
            && self.last_marker == other.last_marker
    }
}

/// Persisted form of one table; names live in the enclosing maps
#[derive(Debug, Serialize, Deserialize)]
struct TableEntry {
    #[serde(default)]
    primary_keys: Vec<String>,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    marker_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_marker: Option<serde_json::Value>,
}

type Artifact = BTreeMap<String, BTreeMap<String, TableEntry>>;

/// The set of tables extracted from one database
#[derive(Debug, Default)]
pub struct Description {
    tables: Vec<Arc<Table>>,
    index: HashMap<(String, String), usize>,
}

impl Description {
    /// Create an empty description
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one discovered column into its table.
    ///
    /// The table is created on first sight; columns and primary keys are
    /// appended in first-seen order and never duplicated.
    pub fn add_column(&mut self, column: Column) {
        let key = (column.schema, column.table);
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.tables.len();
                self.tables.push(Arc::new(Table::new(key.0.clone(), key.1.clone())));
                self.index.insert(key, idx);
                idx
            }
        };

        // Copy-on-write once a sync has handed the table out.
        Arc::make_mut(&mut self.tables[idx]).push_column(&column.name, column.is_primary_key);
    }

    /// Add or replace a whole table
    pub fn add_table(&mut self, table: Table) {
        let key = (table.schema_name.clone(), table.table_name.clone());
        match self.index.get(&key) {
            Some(&idx) => self.tables[idx] = Arc::new(table),
            None => {
                self.index.insert(key, self.tables.len());
                self.tables.push(Arc::new(table));
            }
        }
    }

    /// Look up a table by schema and name
    pub fn get(&self, schema: &str, table: &str) -> Option<&Arc<Table>> {
        self.index
            .get(&(schema.to_string(), table.to_string()))
            .map(|&idx| &self.tables[idx])
    }

    /// Iterate tables in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Table>> {
        self.tables.iter()
    }

    /// Number of tables
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether there are no tables
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Serialize as pretty JSON
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        let mut artifact = Artifact::new();
        for table in &self.tables {
            artifact.entry(table.schema_name.clone()).or_default().insert(
                table.table_name.clone(),
                TableEntry {
                    primary_keys: table.primary_keys.clone(),
                    columns: table.columns.clone(),
                    marker_column: table.marker_column.clone(),
                    last_marker: table.last_marker.clone(),
                },
            );
        }

        serde_json::to_writer_pretty(writer, &artifact)
            .map_err(|e| Error::persistence_with_source("failed to write description", e))
    }

    /// Parse from JSON
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let artifact: Artifact = serde_json::from_reader(reader)
            .map_err(|e| Error::persistence_with_source("failed to parse description", e))?;

        let mut description = Self::new();
        for (schema, tables) in artifact {
            for (name, entry) in tables {
                let mut table = Table::new(schema.clone(), name)
                    .with_primary_keys(entry.primary_keys)
                    .with_columns(entry.columns);
                table.marker_column = entry.marker_column;
                table.last_marker = entry.last_marker;
                description.add_table(table);
            }
        }
        Ok(description)
    }

    /// Write the artifact to `path`, replacing any previous content
    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            Error::persistence_with_source(format!("cannot create {}", path.display()), e)
        })?;

        let mut writer = BufWriter::new(file);
        self.save(&mut writer)?;
        writer
            .flush()
            .and_then(|_| writer.get_ref().sync_all())
            .map_err(|e| {
                Error::persistence_with_source(format!("cannot write {}", path.display()), e)
            })
    }

    /// Load the artifact at `path` for a sync run.
    ///
    /// A missing file and an empty file are reported as distinct errors so
    /// the operator can be pointed at the describe pass.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::DescriptionNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => {
                return Err(Error::persistence_with_source(
                    format!("cannot read {}", path.display()),
                    e,
                ))
            }
        };

        if content.trim().is_empty() {
            return Err(Error::EmptyDescription {
                path: path.to_path_buf(),
            });
        }

        Self::from_reader(content.as_bytes())
    }
}
