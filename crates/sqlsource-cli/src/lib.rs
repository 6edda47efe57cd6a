//! # sqlsource-cli
//!
//! Command-line shell around the `sqlsource` library:
//!
//! ```bash
//! # Write schema.json from the database catalog
//! sqlsource describe --hostname db --username etl --database shop
//!
//! # Publish every row of every described table
//! sqlsource sync --hostname db --username etl --database shop \
//!     --write-key $KEY --concurrency 4 -- prefer_socket=false
//!
//! # Print records instead of publishing them
//! sqlsource sync --dry-run --driver postgres --hostname db --username etl --database shop
//! ```

#![warn(missing_docs)]

#[allow(missing_docs)]
pub mod cli;
pub mod commands;
pub mod logging;
pub mod publisher;
