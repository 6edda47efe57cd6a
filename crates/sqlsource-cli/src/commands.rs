//! `describe` and `sync` command bodies
//!
//! The functions here take an already built driver and publisher so they can
//! run against the in-memory test doubles.

use anyhow::{Context, Result};
use sqlsource::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::{DriverKind, SyncArgs};
use crate::publisher::{ObjectsConfig, ObjectsPublisher, StdoutPublisher};

/// Build the driver for a backend
pub fn build_driver(kind: DriverKind, chunk_size: u32) -> Arc<dyn Driver> {
    match kind {
        DriverKind::Mysql => Arc::new(MySqlDriver::new().with_chunk_size(chunk_size)),
        DriverKind::Postgres => Arc::new(PostgresDriver::new().with_chunk_size(chunk_size)),
    }
}

/// Build the publisher selected by the sync flags
pub fn build_publisher(args: &SyncArgs) -> Result<Arc<dyn Publisher>> {
    if args.dry_run {
        return Ok(Arc::new(StdoutPublisher::new()));
    }

    let write_key = args
        .write_key
        .clone()
        .context("--write-key is required unless --dry-run is set")?;
    let config = ObjectsConfig::new(write_key)
        .with_endpoint(args.endpoint.clone())
        .with_batch_size(args.batch_size);

    Ok(Arc::new(ObjectsPublisher::new(config)?))
}

/// Connect, introspect the database and write the description to `path`
pub async fn describe(
    driver: &dyn Driver,
    config: &ConnectionConfig,
    path: &Path,
) -> Result<Description> {
    info!(path = %path.display(), driver = driver.name(), "Describing database");

    driver
        .connect(config)
        .await
        .with_context(|| format!("failed to connect to {}:{}", config.hostname, config.port))?;

    let described = driver.describe().await;
    close_driver(driver).await;
    let description = described.context("failed to describe database")?;

    description
        .write_to_path(path)
        .with_context(|| format!("failed to save description to {}", path.display()))?;

    for table in description.iter().filter(|t| !t.has_primary_key()) {
        warn!(table = %table.qualified_name(), "Table has no primary key and will fail to sync");
    }

    info!(
        path = %path.display(),
        tables = description.len(),
        "Saved description"
    );
    Ok(description)
}

/// Load the description at `path`, connect and scan every table
pub async fn sync(
    driver: Arc<dyn Driver>,
    config: &ConnectionConfig,
    path: &Path,
    publisher: Arc<dyn Publisher>,
    concurrency: usize,
) -> Result<SyncSummary> {
    let description = Description::load(path)?;
    if description.is_empty() {
        warn!(path = %path.display(), "Description has no tables, nothing to sync");
        return Ok(SyncSummary::default());
    }

    let runner = SyncRunner::new(Arc::clone(&driver), publisher, concurrency)?;

    driver
        .connect(config)
        .await
        .with_context(|| format!("failed to connect to {}:{}", config.hostname, config.port))?;

    let summary = runner.run(&description).await;
    close_driver(driver.as_ref()).await;
    Ok(summary?)
}

async fn close_driver(driver: &dyn Driver) {
    if let Err(e) = driver.close().await {
        warn!(driver = driver.name(), error = %e, "Failed to close driver");
    }
}
