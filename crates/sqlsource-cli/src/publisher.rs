//! Publishers used by the `sync` command
//!
//! - ObjectsPublisher: batches records per collection and POSTs them to an
//!   objects HTTP endpoint
//! - StdoutPublisher: one JSON line per record, for dry runs

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use sqlsource::config::SensitiveString;
use sqlsource::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default objects endpoint
pub const DEFAULT_ENDPOINT: &str = "https://objects.segment.com/v1/set";

/// Default number of records per request
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Objects endpoint settings
#[derive(Debug, Clone)]
pub struct ObjectsConfig {
    /// URL batches are POSTed to
    pub endpoint: String,
    /// Write key, sent as the basic auth username
    pub write_key: SensitiveString,
    /// Records per request
    pub batch_size: usize,
    /// Request timeout
    pub timeout: Duration,
}

impl ObjectsConfig {
    /// Settings for the default endpoint
    pub fn new(write_key: impl Into<SensitiveString>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            write_key: write_key.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Override the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

#[derive(Serialize)]
struct BatchPayload<'a> {
    collection: &'a str,
    objects: Vec<ObjectPayload<'a>>,
}

#[derive(Serialize)]
struct ObjectPayload<'a> {
    id: &'a str,
    properties: &'a BTreeMap<String, Value>,
}

/// Delivery counters
#[derive(Debug, Default)]
pub struct PublishStats {
    /// Requests that succeeded
    pub batches_sent: AtomicU64,
    /// Records in successful requests
    pub objects_sent: AtomicU64,
    /// Requests that failed
    pub batches_failed: AtomicU64,
}

/// Batching HTTP publisher for the objects API
pub struct ObjectsPublisher {
    client: reqwest::Client,
    config: ObjectsConfig,
    buffers: Mutex<HashMap<String, Vec<ObjectRecord>>>,
    stats: PublishStats,
}

impl ObjectsPublisher {
    /// Create a publisher
    pub fn new(config: ObjectsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            buffers: Mutex::new(HashMap::new()),
            stats: PublishStats::default(),
        })
    }

    /// Delivery counters
    pub fn stats(&self) -> &PublishStats {
        &self.stats
    }

    /// Records buffered and not yet sent
    pub fn pending(&self) -> usize {
        self.buffers.lock().values().map(Vec::len).sum()
    }

    async fn send_batch(&self, collection: &str, records: Vec<ObjectRecord>) -> Result<()> {
        let payload = BatchPayload {
            collection,
            objects: records
                .iter()
                .map(|r| ObjectPayload {
                    id: &r.id,
                    properties: &r.properties,
                })
                .collect(),
        };
        let first_id = records.first().map(|r| r.id.as_str()).unwrap_or_default();
        let batch = describe_batch(&records);

        debug!(collection, objects = records.len(), "Sending batch");
        let response = self
            .client
            .post(&self.config.endpoint)
            .basic_auth(self.config.write_key.expose_secret(), Some(""))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                self.batch_failed(collection, &records);
                Error::publish(
                    first_id,
                    collection,
                    format!("request for {} failed: {}", batch, e),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            self.batch_failed(collection, &records);
            let body = response.text().await.unwrap_or_default();
            return Err(Error::publish(
                first_id,
                collection,
                format!("batch of {} rejected with {}: {}", batch, status, body),
            ));
        }

        self.stats.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.stats
            .objects_sent
            .fetch_add(records.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn batch_failed(&self, collection: &str, records: &[ObjectRecord]) {
        self.stats.batches_failed.fetch_add(1, Ordering::Relaxed);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        warn!(collection, objects = ids.len(), ids = ?ids, "Batch not delivered");
    }
}

/// `3 objects, ids 1..3` or `1 object, id 7`
fn describe_batch(records: &[ObjectRecord]) -> String {
    match records {
        [] => "0 objects".to_string(),
        [only] => format!("1 object, id {}", only.id),
        [first, .., last] => format!(
            "{} objects, ids {}..{}",
            records.len(),
            first.id,
            last.id
        ),
    }
}

#[async_trait]
impl Publisher for ObjectsPublisher {
    async fn publish(&self, record: ObjectRecord) -> Result<()> {
        let collection = record.collection.clone();
        let full = {
            let mut buffers = self.buffers.lock();
            let buffer = buffers.entry(collection.clone()).or_default();
            buffer.push(record);
            if buffer.len() >= self.config.batch_size {
                Some(std::mem::take(buffer))
            } else {
                None
            }
        };

        match full {
            Some(batch) => self.send_batch(&collection, batch).await,
            None => Ok(()),
        }
    }

    async fn flush(&self) -> Result<()> {
        let pending: Vec<(String, Vec<ObjectRecord>)> = self
            .buffers
            .lock()
            .drain()
            .filter(|(_, records)| !records.is_empty())
            .collect();

        let mut first_error = None;
        for (collection, records) in pending {
            if let Err(e) = self.send_batch(&collection, records).await {
                first_error.get_or_insert(e);
            }
        }

        info!(
            batches = self.stats.batches_sent.load(Ordering::Relaxed),
            objects = self.stats.objects_sent.load(Ordering::Relaxed),
            failed = self.stats.batches_failed.load(Ordering::Relaxed),
            "Objects publisher flushed"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Writes each record as one JSON line
#[derive(Debug, Default)]
pub struct StdoutPublisher;

impl StdoutPublisher {
    /// Create a new StdoutPublisher
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Publisher for StdoutPublisher {
    async fn publish(&self, record: ObjectRecord) -> Result<()> {
        let line = serde_json::to_string(&record).map_err(|e| {
            Error::publish(&record.id, &record.collection, format!("serialization failed: {}", e))
        })?;

        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", line)
            .map_err(|e| Error::publish(&record.id, &record.collection, e.to_string()))
    }

    async fn flush(&self) -> Result<()> {
        std::io::stdout()
            .flush()
            .map_err(|e| Error::publish("", "", format!("failed to flush stdout: {}", e)))
    }
}
