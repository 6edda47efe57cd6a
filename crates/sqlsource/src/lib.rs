//! # sqlsource
//!
//! Full-table extraction from relational databases into identity-keyed
//! object records.
//!
//! Every run re-reads each described table from its first to its last
//! primary key using keyset pagination, turning every row into an
//! [`ObjectRecord`](record::ObjectRecord) and handing it to a
//! [`Publisher`](publisher::Publisher). Many tables are scanned at once
//! under a concurrency limit.
//!
//! ## Features
//!
//! - **Keyset Pagination**: Chunked scans ordered by primary key, no offsets or server-side cursors
//! - **Bounded Concurrency**: One task per table behind a semaphore, failures isolated per table
//! - **Schema Description**: Catalog introspection persisted as a JSON artifact
//! - **Pluggable Backends**: A four-operation `Driver` trait with MySQL and PostgreSQL implementations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sqlsource::prelude::*;
//! use std::sync::Arc;
//!
//! let driver = MySqlDriver::new().with_chunk_size(500);
//! driver.connect(&ConnectionConfig::new("localhost", 3306, "root", "secret", "shop")).await?;
//!
//! let description = Description::load("schema.json")?;
//! let runner = SyncRunner::new(Arc::new(driver), publisher, 4)?;
//! let summary = runner.run(&description).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `mysql` - MySQL/MariaDB support via mysql_async (default)
//! - `postgres` - PostgreSQL support via tokio-postgres
//! - `full` - All backends enabled

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod description;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod publisher;
pub mod record;
pub mod scanner;
pub mod sync;
pub mod testing;
pub mod types;

// Backend implementations (conditionally compiled)
#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "postgres")]
pub mod postgres;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{Error, ErrorCategory, Result};

    // Values and rows
    pub use crate::types::{Row, Value};

    // Configuration
    pub use crate::config::{ConnectionConfig, SensitiveString};

    // Description model
    pub use crate::description::{Column, Description, Table};

    // Driver contract and SQL generation
    pub use crate::dialect::{KeysetQueryBuilder, MySqlDialect, PostgresDialect, SqlDialect};
    pub use crate::driver::{Driver, ScanCursor, DEFAULT_CHUNK_SIZE};

    // Records and delivery
    pub use crate::publisher::Publisher;
    pub use crate::record::{collection_name, ObjectRecord};

    // Scanning
    pub use crate::scanner::TableScanner;
    pub use crate::sync::{SyncRunner, SyncSummary, TableReport, DEFAULT_CONCURRENCY};

    #[cfg(feature = "mysql")]
    pub use crate::mysql::MySqlDriver;

    #[cfg(feature = "postgres")]
    pub use crate::postgres::PostgresDriver;
}

// Re-export commonly used items at crate root
pub use error::{Error, Result};
pub use types::Value;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let _value = Value::Int32(42);
        let _config = ConnectionConfig::new("localhost", 3306, "root", "", "test");
        let _cursor = ScanCursor::Start;
        let _description = Description::new();
    }

    #[test]
    fn test_error_types() {
        let err = Error::connection("test error");
        assert_eq!(err.category(), ErrorCategory::Connection);
        assert!(!err.category().is_recoverable());
    }

    #[test]
    fn test_dialect_names() {
        assert_eq!(PostgresDialect.name(), "PostgreSQL");
        assert_eq!(MySqlDialect.name(), "MySQL");
    }

    #[test]
    fn test_collection_naming() {
        assert_eq!(collection_name("public", "UserGroups"), "public_user_groups");
    }

    #[test]
    fn test_runner_rejects_zero_concurrency() {
        use crate::testing::{MockDriver, RecordingPublisher};
        use std::sync::Arc;

        let result = SyncRunner::new(
            Arc::new(MockDriver::new()),
            Arc::new(RecordingPublisher::new()),
            0,
        );
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }
}
