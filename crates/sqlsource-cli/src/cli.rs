//! Command-line arguments

use clap::{Args, Parser, Subcommand, ValueEnum};
use sqlsource::config::{ConnectionConfig, SensitiveString};
use sqlsource::driver::DEFAULT_CHUNK_SIZE;
use std::convert::Infallible;
use std::path::PathBuf;
use validator::Validate;

use crate::publisher::{DEFAULT_BATCH_SIZE, DEFAULT_ENDPOINT};

#[derive(Parser, Debug)]
#[command(name = "sqlsource")]
#[command(version, about = "Sync relational tables to an objects endpoint")]
pub struct Cli {
    /// Path to the schema description file
    #[arg(long, global = true, default_value = "schema.json")]
    pub schema: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Introspect the database and write the schema description file
    Describe(DescribeArgs),
    /// Scan every described table and publish each row
    Sync(SyncArgs),
}

/// Supported database backends
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    /// MySQL or MariaDB
    Mysql,
    /// PostgreSQL
    Postgres,
}

impl DriverKind {
    /// Port used when `--port` is not given
    pub fn default_port(self) -> u16 {
        match self {
            Self::Mysql => 3306,
            Self::Postgres => 5432,
        }
    }
}

fn parse_secret(value: &str) -> Result<SensitiveString, Infallible> {
    Ok(SensitiveString::new(value))
}

/// Database connection flags
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Database backend
    #[arg(long, value_enum, env = "SQLSOURCE_DRIVER", default_value_t = DriverKind::Mysql)]
    pub driver: DriverKind,

    /// Database instance hostname
    #[arg(long, env = "SQLSOURCE_HOSTNAME")]
    pub hostname: String,

    /// Database instance port [default: 3306 for mysql, 5432 for postgres]
    #[arg(long, env = "SQLSOURCE_PORT")]
    pub port: Option<u16>,

    /// Database instance username
    #[arg(long, env = "SQLSOURCE_USERNAME")]
    pub username: String,

    /// Database instance password
    #[arg(
        long,
        env = "SQLSOURCE_PASSWORD",
        hide_env_values = true,
        default_value = "",
        hide_default_value = true,
        value_parser = parse_secret
    )]
    pub password: SensitiveString,

    /// Database instance name
    #[arg(long, env = "SQLSOURCE_DATABASE")]
    pub database: String,

    /// Extra `key=value` driver options, after `--`
    #[arg(last = true)]
    pub options: Vec<String>,
}

impl ConnectionArgs {
    /// Port to connect to
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.driver.default_port())
    }

    /// Validated connection settings
    pub fn to_config(&self) -> sqlsource::Result<ConnectionConfig> {
        ConnectionConfig::new(
            self.hostname.clone(),
            self.port(),
            self.username.clone(),
            self.password.clone(),
            self.database.clone(),
        )
        .with_options(self.options.iter().cloned())
        .validated()
    }
}

/// Flags for `describe`
#[derive(Args, Debug, Clone)]
pub struct DescribeArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Flags for `sync`
#[derive(Args, Debug, Clone, Validate)]
pub struct SyncArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Objects API write key (not needed with --dry-run)
    #[arg(long, env = "SQLSOURCE_WRITE_KEY", hide_env_values = true, value_parser = parse_secret)]
    pub write_key: Option<SensitiveString>,

    /// Number of tables scanned at once
    #[arg(long, default_value_t = 1)]
    #[validate(range(min = 1))]
    pub concurrency: usize,

    /// Rows fetched per query
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    #[validate(range(min = 1))]
    pub chunk_size: u32,

    /// Records sent per objects request
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    #[validate(range(min = 1))]
    pub batch_size: usize,

    /// Objects API endpoint
    #[arg(long, env = "SQLSOURCE_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    #[validate(url)]
    pub endpoint: String,

    /// Print records to stdout instead of publishing them
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncArgs {
    /// Check flag values and combinations clap cannot express
    pub fn check(&self) -> anyhow::Result<()> {
        self.validate()
            .map_err(|e| anyhow::anyhow!("invalid sync flags: {}", e))?;
        if !self.dry_run && self.write_key.is_none() {
            anyhow::bail!("--write-key is required unless --dry-run is set");
        }
        Ok(())
    }
}
