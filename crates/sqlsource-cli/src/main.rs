//! sqlsource - describe a database, then sync its tables as objects
//!
//! # Usage
//!
//! ```bash
//! sqlsource describe --hostname localhost --username root --database shop
//! sqlsource sync --hostname localhost --username root --database shop --write-key KEY
//! ```

use anyhow::Result;
use clap::Parser;
use sqlsource::driver::DEFAULT_CHUNK_SIZE;
use tracing::error;

use sqlsource_cli::cli::{Cli, Commands};
use sqlsource_cli::{commands, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    match cli.command {
        Commands::Describe(args) => {
            let config = args.connection.to_config()?;
            let driver = commands::build_driver(args.connection.driver, DEFAULT_CHUNK_SIZE);
            commands::describe(driver.as_ref(), &config, &cli.schema).await?;
            Ok(())
        }
        Commands::Sync(args) => {
            args.check()?;
            let config = args.connection.to_config()?;
            let driver = commands::build_driver(args.connection.driver, args.chunk_size);
            let publisher = commands::build_publisher(&args)?;

            let summary =
                commands::sync(driver, &config, &cli.schema, publisher, args.concurrency).await?;

            if !summary.is_success() {
                error!(summary = %summary, "Sync did not complete");
                anyhow::bail!(
                    "{} of {} tables failed",
                    summary.failed_count(),
                    summary.tables.len()
                );
            }
            Ok(())
        }
    }
}
