//! MySQL backend for sqlsource
//!
//! - Connects through a `mysql_async` pool built from a `mysql://` URL
//! - Describes the base tables of the connected database
//! - Scans with prepared statements so values arrive typed (binary protocol)
//! - Decodes text that the server sends as raw bytes in `transform`

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mysql_async::prelude::*;
use mysql_async::consts::ColumnType;
use mysql_async::{Opts, Pool};
use std::sync::OnceLock;
use tracing::{debug, info};
use url::Url;

use crate::config::ConnectionConfig;
use crate::description::{Column, Description, Table};
use crate::dialect::{KeysetQueryBuilder, MySqlDialect};
use crate::driver::{Driver, ScanCursor, DEFAULT_CHUNK_SIZE};
use crate::error::{Error, Result};
use crate::types::{Row, Value};

const DESCRIBE_COLUMNS: &str = r#"
    SELECT c.table_schema, c.table_name, c.column_name
    FROM information_schema.columns c
    JOIN information_schema.tables t
        ON t.table_schema = c.table_schema AND t.table_name = c.table_name
    WHERE c.table_schema = DATABASE() AND t.table_type = 'BASE TABLE'
    ORDER BY c.table_name, c.ordinal_position
"#;

const DESCRIBE_PRIMARY_KEYS: &str = r#"
    SELECT k.table_schema, k.table_name, k.column_name
    FROM information_schema.key_column_usage k
    WHERE k.table_schema = DATABASE() AND k.constraint_name = 'PRIMARY'
    ORDER BY k.table_name, k.ordinal_position
"#;

/// Convert a sqlsource Value to a MySQL parameter
fn value_to_sql(value: &Value) -> mysql_async::Value {
    match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Bool(b) => mysql_async::Value::from(*b),
        Value::Int16(n) => mysql_async::Value::from(*n),
        Value::Int32(n) => mysql_async::Value::from(*n),
        Value::Int64(n) => mysql_async::Value::from(*n),
        Value::UInt64(n) => mysql_async::Value::from(*n),
        Value::Float32(n) => mysql_async::Value::from(*n),
        Value::Float64(n) => mysql_async::Value::from(*n),
        Value::Decimal(d) => mysql_async::Value::from(d.to_string()),
        Value::String(s) => mysql_async::Value::from(s.clone()),
        Value::Bytes(b) => mysql_async::Value::from(b.clone()),
        Value::Date(d) => {
            mysql_async::Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0)
        }
        Value::Time(t) => mysql_async::Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1000,
        ),
        Value::DateTime(dt) => datetime_to_sql(dt),
        Value::DateTimeTz(dt) => datetime_to_sql(&dt.naive_utc()),
        Value::Uuid(u) => mysql_async::Value::from(u.to_string()),
        Value::Json(j) => mysql_async::Value::from(j.to_string()),
    }
}

fn datetime_to_sql(dt: &NaiveDateTime) -> mysql_async::Value {
    let (date, time) = (dt.date(), dt.time());
    mysql_async::Value::Date(
        date.year() as u16,
        date.month() as u8,
        date.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
        time.nanosecond() / 1000,
    )
}

/// Convert a MySQL value to a sqlsource Value.
///
/// Byte strings stay bytes here; `transform` decodes them. The binary
/// protocol sends DATE and DATETIME alike, so `column_type` decides which.
fn mysql_value_to_value(val: mysql_async::Value, column_type: ColumnType) -> Value {
    match val {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(b) => Value::Bytes(b),
        mysql_async::Value::Int(n) => Value::Int64(n),
        mysql_async::Value::UInt(n) => Value::UInt64(n),
        mysql_async::Value::Float(f) => Value::Float32(f),
        mysql_async::Value::Double(d) => Value::Float64(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            // zero dates ('0000-00-00') have no chrono form
            let Some(date) = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
            else {
                return Value::Null;
            };
            if matches!(
                column_type,
                ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE
            ) {
                Value::Date(date)
            } else {
                NaiveTime::from_hms_micro_opt(hour as u32, min as u32, sec as u32, micro)
                    .map(|time| Value::DateTime(NaiveDateTime::new(date, time)))
                    .unwrap_or(Value::Null)
            }
        }
        mysql_async::Value::Time(neg, days, hour, min, sec, micro) => {
            if neg || days > 0 {
                // TIME spans -838:59:59 to 838:59:59; keep it as text
                let hours = days * 24 + hour as u32;
                let mut text = format!(
                    "{}{:02}:{:02}:{:02}",
                    if neg { "-" } else { "" },
                    hours,
                    min,
                    sec
                );
                if micro > 0 {
                    text.push_str(&format!(".{:06}", micro));
                }
                Value::String(text)
            } else {
                NaiveTime::from_hms_micro_opt(hour as u32, min as u32, sec as u32, micro)
                    .map(Value::Time)
                    .unwrap_or(Value::Null)
            }
        }
    }
}

fn convert_row(row: mysql_async::Row) -> Row {
    let columns: Vec<String> = row
        .columns_ref()
        .iter()
        .map(|c| c.name_str().to_string())
        .collect();
    let types: Vec<ColumnType> = row.columns_ref().iter().map(|c| c.column_type()).collect();

    let values: Vec<Value> = types
        .into_iter()
        .enumerate()
        .map(|(i, column_type)| {
            let val: mysql_async::Value = row.get(i).unwrap_or(mysql_async::Value::NULL);
            mysql_value_to_value(val, column_type)
        })
        .collect();

    Row::new(columns, values)
}

/// Build the `mysql://` URL for a connection config.
///
/// Backend options become query parameters, e.g. `prefer_socket=false`.
fn connection_url(config: &ConnectionConfig) -> Result<Url> {
    let mut url = Url::parse("mysql://localhost")
        .map_err(|e| Error::config(format!("invalid MySQL URL: {}", e)))?;

    url.set_host(Some(&config.hostname))
        .map_err(|e| Error::config(format!("invalid hostname {}: {}", config.hostname, e)))?;
    url.set_port(Some(config.port))
        .map_err(|_| Error::config(format!("invalid port {}", config.port)))?;
    url.set_username(&config.username)
        .map_err(|_| Error::config(format!("invalid username {}", config.username)))?;
    url.set_password(Some(config.password.expose_secret()))
        .map_err(|_| Error::config("invalid password"))?;
    url.set_path(&config.database);

    let options = config.parsed_options();
    if !options.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in options {
            pairs.append_pair(key, value);
        }
    }

    Ok(url)
}

/// Check out one connection and ping the server
async fn verify(pool: &Pool) -> Result<()> {
    let mut conn = pool
        .get_conn()
        .await
        .map_err(|e| Error::connection_with_source("failed to connect to MySQL", e))?;
    conn.ping()
        .await
        .map_err(|e| Error::connection_with_source("MySQL ping failed", e))
}

/// MySQL driver
pub struct MySqlDriver {
    pool: OnceLock<Pool>,
    chunk_size: u32,
    dialect: MySqlDialect,
}

impl Default for MySqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MySqlDriver {
    /// Create an unconnected driver
    pub fn new() -> Self {
        Self {
            pool: OnceLock::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            dialect: MySqlDialect,
        }
    }

    /// Rows fetched per scan call
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Rows fetched per scan call
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    fn pool(&self) -> Result<&Pool> {
        self.pool
            .get()
            .ok_or_else(|| Error::config("MySQL driver is not connected"))
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn connect(&self, config: &ConnectionConfig) -> Result<()> {
        if self.pool.get().is_some() {
            return Err(Error::config("MySQL driver is already connected"));
        }

        let url = connection_url(config)?;
        let opts = Opts::from_url(url.as_str())
            .map_err(|e| Error::config(format!("invalid MySQL connection options: {}", e)))?;
        let pool = Pool::new(opts);

        if let Err(e) = verify(&pool).await {
            if let Err(close_err) = pool.disconnect().await {
                debug!(error = %close_err, "Failed to close MySQL pool after connect error");
            }
            return Err(e);
        }

        if let Err(pool) = self.pool.set(pool) {
            pool.disconnect().await.ok();
            return Err(Error::config("MySQL driver is already connected"));
        }

        info!(
            host = %config.hostname,
            port = config.port,
            database = %config.database,
            "Connected to MySQL"
        );
        Ok(())
    }

    async fn describe(&self) -> Result<Description> {
        let mut conn = self
            .pool()?
            .get_conn()
            .await
            .map_err(|e| Error::describe_with_source("failed to get MySQL connection", e))?;

        let columns = conn
            .query_map(
                DESCRIBE_COLUMNS,
                |(schema, table, column): (String, String, String)| {
                    Column::new(schema, table, column)
                },
            )
            .await
            .map_err(|e| Error::describe_with_source("failed to list columns", e))?;

        let primary_keys = conn
            .query_map(
                DESCRIBE_PRIMARY_KEYS,
                |(schema, table, column): (String, String, String)| {
                    Column::primary_key(schema, table, column)
                },
            )
            .await
            .map_err(|e| Error::describe_with_source("failed to list primary keys", e))?;

        let mut description = Description::new();
        for column in columns.into_iter().chain(primary_keys) {
            description.add_column(column);
        }

        debug!(tables = description.len(), "Described MySQL database");
        Ok(description)
    }

    async fn scan(&self, table: &Table, cursor: &ScanCursor) -> Result<Vec<Row>> {
        let (sql, params) =
            KeysetQueryBuilder::new(table, &self.dialect).build(cursor, self.chunk_size)?;
        debug!(sql = %sql, params = params.len(), "Executing scan");

        let mut conn = self.pool()?.get_conn().await.map_err(|e| {
            Error::scan_with_source(table.qualified_name(), "failed to get MySQL connection", e)
        })?;

        let params: Vec<mysql_async::Value> = params.iter().map(value_to_sql).collect();
        let rows: Vec<mysql_async::Row> = conn
            .exec(sql.as_str(), params)
            .await
            .map_err(|e| Error::scan_with_source(table.qualified_name(), "query failed", e))?;

        Ok(rows.into_iter().map(convert_row).collect())
    }

    async fn close(&self) -> Result<()> {
        let Some(pool) = self.pool.get() else {
            return Ok(());
        };
        pool.clone()
            .disconnect()
            .await
            .map_err(|e| Error::connection_with_source("failed to close MySQL pool", e))?;
        debug!("MySQL pool closed");
        Ok(())
    }

    fn transform(&self, row: Row) -> Row {
        row.map_values(|value| match value {
            Value::Bytes(bytes) => match String::from_utf8(bytes) {
                Ok(s) => Value::String(s),
                Err(e) => Value::Bytes(e.into_bytes()),
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_decodes_utf8() {
        let driver = MySqlDriver::new();
        let row = Row::from_pairs([
            ("name", Value::Bytes(b"Alice".to_vec())),
            ("blob", Value::Bytes(vec![0xff, 0xfe])),
            ("id", Value::Int64(1)),
        ]);

        let row = driver.transform(row);
        assert_eq!(row.get_by_name("name"), Some(&Value::from("Alice")));
        assert_eq!(row.get_by_name("blob"), Some(&Value::Bytes(vec![0xff, 0xfe])));
        assert_eq!(row.get_by_name("id"), Some(&Value::Int64(1)));

        // idempotent
        assert_eq!(driver.transform(row.clone()), row);
    }

    #[test]
    fn test_mysql_value_conversion() {
        assert_eq!(
            mysql_value_to_value(
                mysql_async::Value::UInt(u64::MAX),
                ColumnType::MYSQL_TYPE_LONGLONG
            ),
            Value::UInt64(u64::MAX)
        );
        assert_eq!(
            mysql_value_to_value(
                mysql_async::Value::Date(2024, 3, 1, 0, 0, 0, 0),
                ColumnType::MYSQL_TYPE_DATE
            ),
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(
            mysql_value_to_value(
                mysql_async::Value::Date(0, 0, 0, 0, 0, 0, 0),
                ColumnType::MYSQL_TYPE_DATETIME
            ),
            Value::Null
        );
        assert_eq!(
            mysql_value_to_value(
                mysql_async::Value::Time(true, 1, 2, 3, 4, 0),
                ColumnType::MYSQL_TYPE_TIME
            ),
            Value::from("-26:03:04")
        );
        assert_eq!(
            mysql_value_to_value(
                mysql_async::Value::Time(false, 0, 9, 30, 0, 0),
                ColumnType::MYSQL_TYPE_TIME
            ),
            Value::Time(NaiveTime::from_hms_opt(9, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_midnight_datetime_stays_datetime() {
        let midnight = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();

        for column_type in [
            ColumnType::MYSQL_TYPE_DATETIME,
            ColumnType::MYSQL_TYPE_TIMESTAMP,
        ] {
            assert_eq!(
                mysql_value_to_value(
                    mysql_async::Value::Date(2024, 3, 1, 0, 0, 0, 0),
                    column_type
                ),
                Value::DateTime(midnight)
            );
        }
        assert_eq!(
            mysql_value_to_value(
                mysql_async::Value::Date(2024, 3, 1, 0, 0, 0, 0),
                ColumnType::MYSQL_TYPE_NEWDATE
            ),
            Value::Date(midnight.date())
        );
    }

    #[test]
    fn test_value_to_sql() {
        assert_eq!(value_to_sql(&Value::Null), mysql_async::Value::NULL);
        assert_eq!(value_to_sql(&Value::Int32(7)), mysql_async::Value::Int(7));
        assert_eq!(
            value_to_sql(&Value::from("x")),
            mysql_async::Value::Bytes(b"x".to_vec())
        );
    }

    #[test]
    fn test_connection_url() {
        let config = ConnectionConfig::new("db.internal", 3307, "reader", "p@ss word", "shop")
            .with_option("prefer_socket=false")
            .with_option("broken");

        let url = connection_url(&config).unwrap();
        assert_eq!(url.host_str(), Some("db.internal"));
        assert_eq!(url.port(), Some(3307));
        assert_eq!(url.username(), "reader");
        assert_eq!(url.path(), "/shop");
        assert_eq!(url.query(), Some("prefer_socket=false"));
        assert_ne!(url.password(), Some("p@ss word"));
    }

    #[test]
    fn test_connection_url_without_options() {
        let config = ConnectionConfig::new("localhost", 3306, "root", "", "app");
        let url = connection_url(&config).unwrap();
        assert_eq!(url.query(), None);
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_driver_unconnected() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let driver = MySqlDriver::new();
        let config = ConnectionConfig::new("127.0.0.1", port, "root", "", "app");
        let err = driver.connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));

        assert!(driver.pool.get().is_none());
        assert!(driver.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_close_before_connect() {
        assert!(MySqlDriver::new().close().await.is_ok());
    }

    #[tokio::test]
    async fn test_scan_before_connect() {
        let driver = MySqlDriver::new();
        let table = Table::new("app", "users").with_primary_keys(["id"]);
        let err = driver.scan(&table, &ScanCursor::Start).await.unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
