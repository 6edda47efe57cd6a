//! PostgreSQL backend for sqlsource
//!
//! One shared `tokio_postgres::Client` serves every table task; the client
//! pipelines concurrent queries over its connection.
//!
//! Columns whose type has no native mapping (`inet`, `interval`, enums,
//! arrays, ...) are selected as `col::text`. The set is found once per table
//! by preparing the first chunk query.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::NoTls;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::ConnectionConfig;
use crate::description::{Column, Description, Table};
use crate::dialect::{KeysetQueryBuilder, PostgresDialect};
use crate::driver::{Driver, ScanCursor, DEFAULT_CHUNK_SIZE};
use crate::error::{Error, Result};
use crate::types::{Row, Value};

const DESCRIBE_COLUMNS: &str = r#"
    SELECT c.table_schema::text, c.table_name::text, c.column_name::text
    FROM information_schema.columns c
    JOIN information_schema.tables t
        ON t.table_schema = c.table_schema AND t.table_name = c.table_name
    WHERE t.table_type = 'BASE TABLE'
        AND c.table_schema NOT IN ('pg_catalog', 'information_schema')
    ORDER BY c.table_schema, c.table_name, c.ordinal_position
"#;

const DESCRIBE_PRIMARY_KEYS: &str = r#"
    SELECT kcu.table_schema::text, kcu.table_name::text, kcu.column_name::text
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
        ON tc.constraint_name = kcu.constraint_name
        AND tc.table_schema = kcu.table_schema
        AND tc.table_name = kcu.table_name
    WHERE tc.constraint_type = 'PRIMARY KEY'
        AND tc.table_schema NOT IN ('pg_catalog', 'information_schema')
    ORDER BY kcu.table_schema, kcu.table_name, kcu.ordinal_position
"#;

/// Convert a sqlsource Value to a tokio-postgres parameter
fn value_to_sql(value: &Value) -> Box<dyn ToSql + Sync + Send> {
    match value {
        Value::Null => Box::new(Option::<i32>::None),
        Value::Bool(b) => Box::new(*b),
        Value::Int16(n) => Box::new(*n),
        Value::Int32(n) => Box::new(*n),
        Value::Int64(n) => Box::new(*n),
        // no unsigned types in PostgreSQL
        Value::UInt64(n) => Box::new(n.to_string()),
        Value::Float32(n) => Box::new(*n),
        Value::Float64(n) => Box::new(*n),
        Value::Decimal(d) => Box::new(*d),
        Value::String(s) => Box::new(s.clone()),
        Value::Bytes(b) => Box::new(b.clone()),
        Value::Date(d) => Box::new(*d),
        Value::Time(t) => Box::new(*t),
        Value::DateTime(dt) => Box::new(*dt),
        Value::DateTimeTz(dt) => Box::new(*dt),
        Value::Uuid(u) => Box::new(*u),
        Value::Json(j) => Box::new(j.clone()),
    }
}

/// Convert a tokio-postgres row to a sqlsource Row
fn pg_row_to_row(pg_row: &tokio_postgres::Row) -> Row {
    let columns: Vec<String> = pg_row
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let values: Vec<Value> = pg_row
        .columns()
        .iter()
        .enumerate()
        .map(|(i, col)| pg_value_to_value(pg_row, i, col.type_()))
        .collect();

    Row::new(columns, values)
}

fn get<'a, T>(row: &'a tokio_postgres::Row, idx: usize, f: impl FnOnce(T) -> Value) -> Value
where
    T: FromSql<'a>,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(value) => value.map(f).unwrap_or(Value::Null),
        Err(e) => {
            let column = row.columns().get(idx).map(|c| c.name()).unwrap_or_default();
            warn!(column, error = %e, "Unreadable column value, publishing null");
            Value::Null
        }
    }
}

/// Whether values of `ty` decode without a text cast
fn is_native_type(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::BOOL
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::NUMERIC
            | Type::BYTEA
            | Type::DATE
            | Type::TIME
            | Type::TIMESTAMP
            | Type::TIMESTAMPTZ
            | Type::UUID
            | Type::JSON
            | Type::JSONB
    ) || <String as FromSql>::accepts(ty)
}

/// Convert a PostgreSQL value to a sqlsource Value.
///
/// Anything without a native mapping arrives as text (see [`is_native_type`]).
fn pg_value_to_value(row: &tokio_postgres::Row, idx: usize, pg_type: &Type) -> Value {
    match *pg_type {
        Type::BOOL => get(row, idx, Value::Bool),
        Type::INT2 => get(row, idx, Value::Int16),
        Type::INT4 => get(row, idx, Value::Int32),
        Type::INT8 => get(row, idx, Value::Int64),
        Type::FLOAT4 => get(row, idx, Value::Float32),
        Type::FLOAT8 => get(row, idx, Value::Float64),
        Type::NUMERIC => get(row, idx, Value::Decimal),
        Type::BYTEA => get(row, idx, Value::Bytes),
        Type::DATE => get(row, idx, Value::Date),
        Type::TIME => get(row, idx, Value::Time),
        Type::TIMESTAMP => get(row, idx, Value::DateTime),
        Type::TIMESTAMPTZ => get(row, idx, Value::DateTimeTz),
        Type::UUID => get(row, idx, Value::Uuid),
        Type::JSON | Type::JSONB => get(row, idx, Value::Json),
        _ => get(row, idx, Value::String),
    }
}

/// Build the `postgres://` URL for a connection config.
///
/// Backend options become query parameters, e.g. `application_name=sqlsource`.
fn connection_url(config: &ConnectionConfig) -> Result<Url> {
    let mut url = Url::parse("postgres://localhost")
        .map_err(|e| Error::config(format!("invalid PostgreSQL URL: {}", e)))?;

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

/// PostgreSQL driver
pub struct PostgresDriver {
    client: OnceLock<tokio_postgres::Client>,
    chunk_size: u32,
    dialect: PostgresDialect,
    /// Columns read as text, by qualified table name
    text_columns: Mutex<HashMap<String, Arc<Vec<String>>>>,
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl PostgresDriver {
    /// Create an unconnected driver
    pub fn new() -> Self {
        Self {
            client: OnceLock::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            dialect: PostgresDialect,
            text_columns: Mutex::new(HashMap::new()),
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

    fn client(&self) -> Result<&tokio_postgres::Client> {
        self.client
            .get()
            .ok_or_else(|| Error::config("PostgreSQL driver is not connected"))
    }

    /// Columns of `table` that need a text cast, discovered on first use
    async fn text_columns(&self, table: &Table) -> Result<Arc<Vec<String>>> {
        let key = table.qualified_name();
        let cached = self.text_columns.lock().get(&key).cloned();
        if let Some(columns) = cached {
            return Ok(columns);
        }
        if table.columns.is_empty() {
            return Ok(Arc::new(Vec::new()));
        }

        let (sql, _) =
            KeysetQueryBuilder::new(table, &self.dialect).build(&ScanCursor::Start, 1)?;
        let statement = self
            .client()?
            .prepare(&sql)
            .await
            .map_err(|e| Error::scan_with_source(key.clone(), "failed to prepare scan", e))?;

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .filter(|c| !is_native_type(c.type_()))
            .map(|c| c.name().to_string())
            .collect();
        if !columns.is_empty() {
            debug!(table = %key, columns = ?columns, "Reading columns as text");
        }

        let columns = Arc::new(columns);
        self.text_columns.lock().insert(key, Arc::clone(&columns));
        Ok(columns)
    }

    async fn describe_query(&self, sql: &str, primary_key: bool) -> Result<Vec<Column>> {
        let rows = self
            .client()?
            .query(sql, &[])
            .await
            .map_err(|e| Error::describe_with_source("catalog query failed", e))?;

        rows.iter()
            .map(|row| -> Result<Column> {
                let (schema, table, column): (String, String, String) = (
                    row.try_get(0).map_err(describe_err)?,
                    row.try_get(1).map_err(describe_err)?,
                    row.try_get(2).map_err(describe_err)?,
                );
                Ok(if primary_key {
                    Column::primary_key(schema, table, column)
                } else {
                    Column::new(schema, table, column)
                })
            })
            .collect()
    }
}

fn describe_err(e: tokio_postgres::Error) -> Error {
    Error::describe_with_source("unexpected catalog row", e)
}

#[async_trait]
impl Driver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn connect(&self, config: &ConnectionConfig) -> Result<()> {
        if self.client.get().is_some() {
            return Err(Error::config("PostgreSQL driver is already connected"));
        }

        let url = connection_url(config)?;
        let (client, connection) = tokio_postgres::connect(url.as_str(), NoTls)
            .await
            .map_err(|e| Error::connection_with_source("failed to connect to PostgreSQL", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection error");
            }
        });

        self.client
            .set(client)
            .map_err(|_| Error::config("PostgreSQL driver is already connected"))?;

        info!(
            host = %config.hostname,
            port = config.port,
            database = %config.database,
            "Connected to PostgreSQL"
        );
        Ok(())
    }

    async fn describe(&self) -> Result<Description> {
        let columns = self.describe_query(DESCRIBE_COLUMNS, false).await?;
        let primary_keys = self.describe_query(DESCRIBE_PRIMARY_KEYS, true).await?;

        let mut description = Description::new();
        for column in columns.into_iter().chain(primary_keys) {
            description.add_column(column);
        }

        debug!(tables = description.len(), "Described PostgreSQL database");
        Ok(description)
    }

    async fn scan(&self, table: &Table, cursor: &ScanCursor) -> Result<Vec<Row>> {
        let text_columns = self.text_columns(table).await?;
        let (sql, params) = KeysetQueryBuilder::new(table, &self.dialect)
            .with_text_columns(&text_columns)
            .build(cursor, self.chunk_size)?;
        debug!(sql = %sql, params = params.len(), "Executing scan");

        let boxed_params: Vec<Box<dyn ToSql + Sync + Send>> =
            params.iter().map(value_to_sql).collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> = boxed_params
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = self
            .client()?
            .query(sql.as_str(), &param_refs)
            .await
            .map_err(|e| Error::scan_with_source(table.qualified_name(), "query failed", e))?;

        Ok(rows.iter().map(pg_row_to_row).collect())
    }
}
