//! Error types for sqlsource
//!
//! Errors are classified by the stage of a run they abort:
//! - Fatal for the whole run (connection, describe, persistence, configuration)
//! - Fatal for one table only (scan, missing primary key, stalled cursor)
//! - Non-fatal (publish)

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for sqlsource operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Establishing connectivity failed
    Connection,
    /// Catalog introspection failed
    Describe,
    /// Reading a table failed
    Scan,
    /// Reading or writing the description artifact failed
    Persistence,
    /// Delivering a record failed
    Publish,
    /// Invalid settings or misuse of an API
    Configuration,
}

impl ErrorCategory {
    /// Whether an error in this category only affects the table being scanned
    #[inline]
    pub const fn is_table_scoped(self) -> bool {
        matches!(self, Self::Scan)
    }

    /// Whether an error in this category is logged and skipped
    #[inline]
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::Publish)
    }
}

/// Main error type for sqlsource
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    /// Could not connect to the database
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Catalog introspection failed
    #[error("describe error: {message}")]
    Describe {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A chunk read failed mid-table
    #[error("scan of {table} failed: {message}")]
    Scan {
        table: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Keyset pagination needs at least one primary key column
    #[error("table {table} has no primary key and cannot be paginated")]
    MissingPrimaryKey { table: String },

    /// The driver returned rows that did not advance the cursor
    #[error("scan of {table} made no progress past cursor {cursor}")]
    StalledCursor { table: String, cursor: String },

    /// The description artifact does not exist
    #[error("description file {} not found, run `describe` first", path.display())]
    DescriptionNotFound { path: PathBuf },

    /// The description artifact exists but holds nothing
    #[error("description file {} is empty, did you run `describe`?", path.display())]
    EmptyDescription { path: PathBuf },

    /// Malformed or unreadable description artifact
    #[error("persistence error: {message}")]
    Persistence {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A record could not be delivered
    #[error("publish of {collection}/{id} failed: {message}")]
    Publish {
        id: String,
        collection: String,
        message: String,
    },

    /// Invalid configuration
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::Describe { .. } => ErrorCategory::Describe,
            Self::Scan { .. } | Self::MissingPrimaryKey { .. } | Self::StalledCursor { .. } => {
                ErrorCategory::Scan
            }
            Self::DescriptionNotFound { .. }
            | Self::EmptyDescription { .. }
            | Self::Persistence { .. } => ErrorCategory::Persistence,
            Self::Publish { .. } => ErrorCategory::Publish,
            Self::Configuration { .. } => ErrorCategory::Configuration,
        }
    }

    /// Whether this error means the operator should run the describe pass
    pub fn needs_describe(&self) -> bool {
        matches!(
            self,
            Self::DescriptionNotFound { .. } | Self::EmptyDescription { .. }
        )
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a describe error with source
    pub fn describe_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Describe {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a scan error
    pub fn scan(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Scan {
            table: table.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a scan error with source
    pub fn scan_with_source(
        table: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Scan {
            table: table.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a persistence error with source
    pub fn persistence_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Persistence {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a publish error
    pub fn publish(
        id: impl Into<String>,
        collection: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Publish {
            id: id.into(),
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Describe => write!(f, "describe"),
            Self::Scan => write!(f, "scan"),
            Self::Persistence => write!(f, "persistence"),
            Self::Publish => write!(f, "publish"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}
