//! Keyset-paginated table scan
//!
//! [`TableScanner`] walks one table from its first to its last primary key,
//! one chunk at a time, and publishes every row exactly once. The only state
//! kept between chunks is the primary key tuple of the last row seen.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::description::Table;
use crate::driver::{Driver, ScanCursor};
use crate::error::{Error, Result};
use crate::publisher::Publisher;
use crate::record::{primary_key_values, ObjectRecord};

/// Scans tables through a driver and hands each row to a publisher
#[derive(Clone)]
pub struct TableScanner {
    driver: Arc<dyn Driver>,
    publisher: Arc<dyn Publisher>,
}

impl TableScanner {
    /// Create a scanner
    pub fn new(driver: Arc<dyn Driver>, publisher: Arc<dyn Publisher>) -> Self {
        Self { driver, publisher }
    }

    /// Scan `table` to the end, publishing one record per row.
    ///
    /// Returns the number of rows scanned. Publish failures are logged and
    /// skipped; driver failures abort the scan.
    pub async fn scan_table(&self, table: &Table) -> Result<u64> {
        if !table.has_primary_key() {
            return Err(Error::MissingPrimaryKey {
                table: table.qualified_name(),
            });
        }

        let mut cursor = ScanCursor::Start;
        let mut scanned = 0u64;
        let mut chunks = 0u64;

        loop {
            let rows = self.driver.scan(table, &cursor).await?;
            chunks += 1;
            if rows.is_empty() {
                break;
            }

            let chunk_len = rows.len();
            let mut next = cursor.clone();

            for row in rows {
                table.incr_scanned();
                scanned += 1;

                next = ScanCursor::After(primary_key_values(table, &row)?);

                let row = self.driver.transform(row);
                let record = ObjectRecord::from_row(table, row)?;
                let (id, collection) = (record.id.clone(), record.collection.clone());

                if let Err(e) = self.publisher.publish(record).await {
                    warn!(id = %id, collection = %collection, error = %e, "Failed to publish record");
                }
            }

            if next == cursor {
                return Err(Error::StalledCursor {
                    table: table.qualified_name(),
                    cursor: cursor.to_string(),
                });
            }

            debug!(rows = chunk_len, cursor = %next, "Chunk scanned");
            cursor = next;
        }

        debug!(rows = scanned, chunks, "Table exhausted");
        Ok(scanned)
    }
}
