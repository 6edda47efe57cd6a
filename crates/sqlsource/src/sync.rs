//! Bounded-concurrency sync across all described tables
//!
//! One task per table, at most `concurrency` running at once. A permit is
//! taken before each task is spawned and released when the task ends. Every
//! task is joined before [`SyncRunner::run`] returns; one table failing (or
//! panicking) never cancels the others.

use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::description::{Description, Table};
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::publisher::Publisher;
use crate::scanner::TableScanner;

/// Default number of tables scanned at once
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Outcome of one table's scan
#[derive(Debug, Clone, PartialEq)]
pub struct TableReport {
    /// Schema name
    pub schema: String,
    /// Table name
    pub table: String,
    /// Rows scanned before the scan ended
    pub scanned_rows: u64,
    /// Why the scan failed, if it did
    pub error: Option<String>,
}

impl TableReport {
    /// Whether the table was scanned to the end
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// `schema.table`, or just `table` when the schema is empty
    pub fn qualified_name(&self) -> String {
        if self.schema.is_empty() {
            self.table.clone()
        } else {
            format!("{}.{}", self.schema, self.table)
        }
    }
}

/// Per-table results of a sync run, in description order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSummary {
    /// One report per table
    pub tables: Vec<TableReport>,
}

impl SyncSummary {
    /// Reports of tables that failed
    pub fn failed(&self) -> impl Iterator<Item = &TableReport> {
        self.tables.iter().filter(|t| !t.is_success())
    }

    /// Number of failed tables
    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }

    /// Rows scanned across all tables
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.scanned_rows).sum()
    }

    /// Whether every table was scanned to the end
    pub fn is_success(&self) -> bool {
        self.tables.iter().all(TableReport::is_success)
    }

    /// Look up a table's report
    pub fn get(&self, schema: &str, table: &str) -> Option<&TableReport> {
        self.tables
            .iter()
            .find(|t| t.schema == schema && t.table == table)
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tables, {} rows, {} failed",
            self.tables.len(),
            self.total_rows(),
            self.failed_count()
        )
    }
}

/// Runs table scans concurrently
pub struct SyncRunner {
    scanner: TableScanner,
    publisher: Arc<dyn Publisher>,
    concurrency: usize,
}

impl SyncRunner {
    /// Create a runner scanning at most `concurrency` tables at once
    pub fn new(
        driver: Arc<dyn Driver>,
        publisher: Arc<dyn Publisher>,
        concurrency: usize,
    ) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::config("concurrency must be at least 1"));
        }

        Ok(Self {
            scanner: TableScanner::new(driver, Arc::clone(&publisher)),
            publisher,
            concurrency,
        })
    }

    /// Maximum number of concurrent table scans
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Scan every table of `description` and flush the publisher
    pub async fn run(&self, description: &Description) -> Result<SyncSummary> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles: Vec<(Arc<Table>, JoinHandle<Result<u64>>)> =
            Vec::with_capacity(description.len());

        info!(
            tables = description.len(),
            concurrency = self.concurrency,
            "Starting sync"
        );

        for table in description.iter() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|_| Error::config("scan semaphore closed"))?;

            let scanner = self.scanner.clone();
            let task_table = Arc::clone(table);
            let span = info_span!("scan", table = %table.qualified_name());

            let handle = tokio::spawn(
                async move {
                    let _permit = permit;
                    info!("Scan started");
                    let result = scanner.scan_table(&task_table).await;
                    match &result {
                        Ok(rows) => info!(rows, "Scan finished"),
                        Err(e) => error!(
                            error = %e,
                            rows = task_table.scanned_rows(),
                            "Scan failed"
                        ),
                    }
                    result
                }
                .instrument(span),
            );
            handles.push((Arc::clone(table), handle));
        }

        let mut summary = SyncSummary::default();
        for (table, handle) in handles {
            let error = match handle.await {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => {
                    error!(table = %table.qualified_name(), error = %e, "Scan task aborted");
                    Some(format!("scan task aborted: {}", e))
                }
            };

            summary.tables.push(TableReport {
                schema: table.schema_name.clone(),
                table: table.table_name.clone(),
                scanned_rows: table.scanned_rows(),
                error,
            });
        }

        if let Err(e) = self.publisher.flush().await {
            error!(error = %e, "Failed to flush publisher");
        }

        if summary.is_success() {
            info!(
                tables = summary.tables.len(),
                rows = summary.total_rows(),
                "Sync finished"
            );
        } else {
            for report in summary.failed() {
                warn!(
                    table = %report.qualified_name(),
                    rows = report.scanned_rows,
                    error = report.error.as_deref().unwrap_or_default(),
                    "Table failed"
                );
            }
            warn!(
                tables = summary.tables.len(),
                rows = summary.total_rows(),
                failed = summary.failed_count(),
                "Sync finished with failures"
            );
        }

        Ok(summary)
    }
}
