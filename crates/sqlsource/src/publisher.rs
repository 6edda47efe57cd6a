//! Record delivery
//!
//! A [`Publisher`] receives records one at a time from the scan engine.
//! Delivery is best-effort: a failed publish is logged by the caller and the
//! scan moves on.

use async_trait::async_trait;

use crate::error::Result;
use crate::record::ObjectRecord;

/// Sink for object records
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Deliver (or enqueue) one record
    async fn publish(&self, record: ObjectRecord) -> Result<()>;

    /// Deliver anything still buffered. Called once at the end of a sync.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
