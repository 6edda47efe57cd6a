//! Testing utilities for sqlsource
//!
//! In-memory stand-ins for a database and a sink:
//! - [`MockDriver`] serves tables either from sorted rows (real keyset
//!   semantics) or from a fixed script of chunks, and records every cursor
//!   it is asked to scan from
//! - [`RecordingPublisher`] keeps every record and can fail on demand
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlsource::testing::*;
//!
//! let driver = MockDriver::new()
//!     .with_rows(users_table(), rows)
//!     .with_chunk_size(2);
//! let publisher = RecordingPublisher::new();
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ConnectionConfig;
use crate::description::{Column, Description, Table};
use crate::driver::{Driver, ScanCursor, DEFAULT_CHUNK_SIZE};
use crate::error::{Error, Result};
use crate::publisher::Publisher;
use crate::record::{primary_key_values, ObjectRecord};
use crate::types::{Row, Value};

type RowTransform = Arc<dyn Fn(Row) -> Row + Send + Sync>;

// ============================================================================
// Mock Driver
// ============================================================================

enum TableData {
    /// Rows sorted by primary key, served with keyset semantics
    Rows(Vec<Row>),
    /// Chunks returned in order whatever the cursor
    Script(VecDeque<Vec<Row>>),
}

struct MockTable {
    table: Table,
    data: TableData,
    cursors: Vec<ScanCursor>,
    fail_on_call: Option<(usize, String)>,
    panic_on_scan: bool,
}

impl MockTable {
    fn matches(&self, schema: &str, table: &str) -> bool {
        self.table.schema_name == schema && self.table.table_name == table
    }
}

/// A scripted in-memory driver
pub struct MockDriver {
    tables: Mutex<Vec<MockTable>>,
    chunk_size: usize,
    scan_delay: Option<Duration>,
    transform: Option<RowTransform>,
    connected: Mutex<Option<ConnectionConfig>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    closed: AtomicBool,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Create a driver with no tables
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Vec::new()),
            chunk_size: DEFAULT_CHUNK_SIZE as usize,
            scan_delay: None,
            transform: None,
            connected: Mutex::new(None),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Serve `rows` for `table`, paginated by primary key
    pub fn with_rows(self, table: Table, mut rows: Vec<Row>) -> Self {
        rows.sort_by(|a, b| compare_keys(&key_of(&table, a), &key_of(&table, b)));
        self.push(table, TableData::Rows(rows))
    }

    /// Serve `chunks` for `table` one per scan call, ignoring the cursor;
    /// an empty chunk is returned once the script runs out
    pub fn with_chunks(self, table: Table, chunks: Vec<Vec<Row>>) -> Self {
        self.push(table, TableData::Script(chunks.into()))
    }

    /// Rows returned per keyset scan call
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sleep inside every scan call
    pub fn with_scan_delay(mut self, delay: Duration) -> Self {
        self.scan_delay = Some(delay);
        self
    }

    /// Replace the identity transform
    pub fn with_transform(mut self, f: impl Fn(Row) -> Row + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(f));
        self
    }

    /// Fail the `call`-th (1-based) scan of a table
    pub fn fail_table(self, schema: &str, table: &str, call: usize, message: &str) -> Self {
        if let Some(entry) = self.tables.lock().iter_mut().find(|t| t.matches(schema, table)) {
            entry.fail_on_call = Some((call, message.to_string()));
        }
        self
    }

    /// Panic on any scan of a table
    pub fn panic_table(self, schema: &str, table: &str) -> Self {
        if let Some(entry) = self.tables.lock().iter_mut().find(|t| t.matches(schema, table)) {
            entry.panic_on_scan = true;
        }
        self
    }

    /// Cursors received for a table, in call order
    pub fn cursors(&self, schema: &str, table: &str) -> Vec<ScanCursor> {
        self.tables
            .lock()
            .iter()
            .find(|t| t.matches(schema, table))
            .map(|t| t.cursors.clone())
            .unwrap_or_default()
    }

    /// Number of scan calls made for a table
    pub fn scan_calls(&self, schema: &str, table: &str) -> usize {
        self.cursors(schema, table).len()
    }

    /// Highest number of scan calls ever in flight at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Configuration passed to `connect`, if any
    pub fn connected_config(&self) -> Option<ConnectionConfig> {
        self.connected.lock().clone()
    }

    fn push(self, table: Table, data: TableData) -> Self {
        self.tables.lock().push(MockTable {
            table,
            data,
            cursors: Vec::new(),
            fail_on_call: None,
            panic_on_scan: false,
        });
        self
    }

    fn next_chunk(&self, table: &Table, cursor: &ScanCursor) -> Result<Vec<Row>> {
        let mut tables = self.tables.lock();
        let entry = tables
            .iter_mut()
            .find(|t| t.matches(&table.schema_name, &table.table_name))
            .ok_or_else(|| Error::scan(table.qualified_name(), "unknown table"))?;

        entry.cursors.push(cursor.clone());
        let call = entry.cursors.len();

        if entry.panic_on_scan {
            drop(tables);
            panic!("mock driver panicked scanning {}", table.qualified_name());
        }
        if let Some((fail_call, message)) = &entry.fail_on_call {
            if *fail_call == call {
                return Err(Error::scan(table.qualified_name(), message.clone()));
            }
        }

        let chunk = match &mut entry.data {
            TableData::Script(chunks) => chunks.pop_front().unwrap_or_default(),
            TableData::Rows(rows) => {
                let after = cursor.values();
                rows.iter()
                    .filter(|row| {
                        cursor.is_start()
                            || compare_keys(&key_of(&entry.table, row), after)
                                == CmpOrdering::Greater
                    })
                    .take(self.chunk_size)
                    .cloned()
                    .collect()
            }
        };
        Ok(chunk)
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self, config: &ConnectionConfig) -> Result<()> {
        let mut connected = self.connected.lock();
        if connected.is_some() {
            return Err(Error::config("driver is already connected"));
        }
        *connected = Some(config.clone());
        Ok(())
    }

    async fn describe(&self) -> Result<Description> {
        let mut description = Description::new();
        for entry in self.tables.lock().iter() {
            let table = &entry.table;
            for column in &table.columns {
                description.add_column(Column::new(
                    &table.schema_name,
                    &table.table_name,
                    column,
                ));
            }
            for key in &table.primary_keys {
                description.add_column(Column::primary_key(
                    &table.schema_name,
                    &table.table_name,
                    key,
                ));
            }
        }
        Ok(description)
    }

    async fn scan(&self, table: &Table, cursor: &ScanCursor) -> Result<Vec<Row>> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if let Some(delay) = self.scan_delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.next_chunk(table, cursor);

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn transform(&self, row: Row) -> Row {
        match &self.transform {
            Some(f) => f(row),
            None => row,
        }
    }
}

fn key_of(table: &Table, row: &Row) -> Vec<Value> {
    primary_key_values(table, row).unwrap_or_default()
}

/// Lexicographic order over primary key tuples
pub fn compare_keys(a: &[Value], b: &[Value]) -> CmpOrdering {
    for (x, y) in a.iter().zip(b) {
        match compare_values(x, y) {
            CmpOrdering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

fn compare_values(a: &Value, b: &Value) -> CmpOrdering {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

// ============================================================================
// Recording Publisher
// ============================================================================

/// A publisher that keeps every record in memory
#[derive(Default)]
pub struct RecordingPublisher {
    records: Mutex<Vec<ObjectRecord>>,
    attempts: AtomicUsize,
    flushes: AtomicUsize,
    fail_on: Option<usize>,
    fail_flush: bool,
}

impl RecordingPublisher {
    /// Create a publisher that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the `attempt`-th (1-based) publish
    pub fn fail_on(mut self, attempt: usize) -> Self {
        self.fail_on = Some(attempt);
        self
    }

    /// Make `flush` fail
    pub fn failing_flush(mut self) -> Self {
        self.fail_flush = true;
        self
    }

    /// Accepted records, in publish order
    pub fn records(&self) -> Vec<ObjectRecord> {
        self.records.lock().clone()
    }

    /// Ids of accepted records, in publish order
    pub fn ids(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.id.clone()).collect()
    }

    /// Accepted records of one collection
    pub fn collection(&self, collection: &str) -> Vec<ObjectRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.collection == collection)
            .cloned()
            .collect()
    }

    /// Publish calls made, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Flush calls made
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, record: ObjectRecord) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(attempt) {
            return Err(Error::publish(
                record.id,
                record.collection,
                "injected failure",
            ));
        }
        self.records.lock().push(record);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        if self.fail_flush {
            return Err(Error::publish("", "", "injected flush failure"));
        }
        Ok(())
    }
}
