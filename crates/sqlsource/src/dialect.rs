//! SQL dialect abstraction for sqlsource
//!
//! - SqlDialect: identifier quoting and parameter placeholders per backend
//! - KeysetQueryBuilder: the chunked `SELECT` issued by every SQL driver
//!
//! A keyset chunk over primary key `(a, b)` after cursor `(x, y)` reads:
//!
//! ```sql
//! SELECT "a", "b", "c" FROM "s"."t"
//! WHERE ("a" > $1) OR ("a" = $2 AND "b" > $3)
//! ORDER BY "a" ASC, "b" ASC
//! LIMIT 1000
//! ```
//!
//! with parameters `[x, x, y]`.

use crate::description::Table;
use crate::driver::ScanCursor;
use crate::error::{Error, Result};
use crate::types::Value;

/// SQL dialect for vendor-specific SQL generation
pub trait SqlDialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// Quote an identifier (schema, table, column name)
    fn quote_identifier(&self, name: &str) -> String;

    /// Get the placeholder for the 1-based parameter `index` (e.g. `$1`, `?`)
    fn placeholder(&self, index: usize) -> String;

    /// Cast an expression to the dialect's text type
    fn text_cast(&self, expr: &str) -> String {
        format!("CAST({} AS CHAR)", expr)
    }

    /// Quoted `schema.table`, or just the table when the schema is empty
    fn qualified_table(&self, table: &Table) -> String {
        if table.schema_name.is_empty() {
            self.quote_identifier(&table.table_name)
        } else {
            format!(
                "{}.{}",
                self.quote_identifier(&table.schema_name),
                self.quote_identifier(&table.table_name)
            )
        }
    }
}

/// PostgreSQL dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn text_cast(&self, expr: &str) -> String {
        format!("{}::text", expr)
    }
}

/// MySQL dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }
}

/// Builds keyset-paginated chunk queries for one table
pub struct KeysetQueryBuilder<'a> {
    table: &'a Table,
    dialect: &'a dyn SqlDialect,
    text_columns: &'a [String],
}

impl<'a> KeysetQueryBuilder<'a> {
    /// Create a new query builder
    pub fn new(table: &'a Table, dialect: &'a dyn SqlDialect) -> Self {
        Self {
            table,
            dialect,
            text_columns: &[],
        }
    }

    /// Read these columns as text.
    ///
    /// A listed primary key column is also compared and ordered as text, so
    /// the cursor values it produces bind back as text parameters.
    pub fn with_text_columns(mut self, columns: &'a [String]) -> Self {
        self.text_columns = columns;
        self
    }

    /// Build the chunk query for rows strictly after `cursor`.
    ///
    /// Returns the SQL text and its parameters in placeholder order. The
    /// cursor must carry one value per primary key column.
    pub fn build(&self, cursor: &ScanCursor, limit: u32) -> Result<(String, Vec<Value>)> {
        let keys = &self.table.primary_keys;
        if keys.is_empty() {
            return Err(Error::MissingPrimaryKey {
                table: self.table.qualified_name(),
            });
        }

        let select = if self.table.columns.is_empty() {
            "*".to_string()
        } else {
            self.table
                .columns
                .iter()
                .map(|c| {
                    let quoted = self.dialect.quote_identifier(c);
                    if self.is_text(c) {
                        format!("{} AS {}", self.dialect.text_cast(&quoted), quoted)
                    } else {
                        quoted
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!(
            "SELECT {} FROM {}",
            select,
            self.dialect.qualified_table(self.table)
        );

        let mut params = Vec::new();
        if let ScanCursor::After(values) = cursor {
            if values.len() != keys.len() {
                return Err(Error::config(format!(
                    "cursor for {} has {} values but the primary key has {} columns",
                    self.table.qualified_name(),
                    values.len(),
                    keys.len()
                )));
            }
            sql.push_str(" WHERE ");
            sql.push_str(&self.keyset_predicate(values, &mut params));
        }

        let order: Vec<String> = self
            .key_exprs()
            .into_iter()
            .map(|k| format!("{} ASC", k))
            .collect();
        sql.push_str(&format!(" ORDER BY {} LIMIT {}", order.join(", "), limit));

        Ok((sql, params))
    }

    /// `(k1 > ?) OR (k1 = ? AND k2 > ?) OR ...`, one disjunct per key prefix
    fn keyset_predicate(&self, values: &[Value], params: &mut Vec<Value>) -> String {
        let keys = self.key_exprs();
        let mut disjuncts = Vec::with_capacity(keys.len());

        for depth in 0..keys.len() {
            let mut terms = Vec::with_capacity(depth + 1);
            for (key, value) in keys.iter().zip(values).take(depth) {
                params.push(value.clone());
                terms.push(format!("{} = {}", key, self.dialect.placeholder(params.len())));
            }
            params.push(values[depth].clone());
            terms.push(format!(
                "{} > {}",
                keys[depth],
                self.dialect.placeholder(params.len())
            ));
            disjuncts.push(format!("({})", terms.join(" AND ")));
        }

        disjuncts.join(" OR ")
    }

    fn is_text(&self, column: &str) -> bool {
        self.text_columns.iter().any(|c| c == column)
    }

    /// Primary key expressions as compared and ordered
    fn key_exprs(&self) -> Vec<String> {
        self.table
            .primary_keys
            .iter()
            .map(|k| {
                let quoted = self.dialect.quote_identifier(k);
                if self.is_text(k) {
                    self.dialect.text_cast(&quoted)
                } else {
                    quoted
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Table {
        Table::new("public", "users")
            .with_primary_keys(["id"])
            .with_columns(["id", "email"])
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(PostgresDialect.quote_identifier("users"), "\"users\"");
        assert_eq!(PostgresDialect.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(MySqlDialect.quote_identifier("users"), "`users`");
        assert_eq!(MySqlDialect.quote_identifier("a`b"), "`a``b`");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(PostgresDialect.placeholder(3), "$3");
        assert_eq!(MySqlDialect.placeholder(3), "?");
    }

    #[test]
    fn test_qualified_table_without_schema() {
        let table = Table::new("", "memberships");
        assert_eq!(MySqlDialect.qualified_table(&table), "`memberships`");
    }

    #[test]
    fn test_first_chunk_has_no_predicate() {
        let table = users();
        let (sql, params) = KeysetQueryBuilder::new(&table, &PostgresDialect)
            .build(&ScanCursor::Start, 1000)
            .unwrap();

        assert_eq!(
            sql,
            "SELECT \"id\", \"email\" FROM \"public\".\"users\" ORDER BY \"id\" ASC LIMIT 1000"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_single_key_after_cursor() {
        let table = users();
        let cursor = ScanCursor::After(vec![Value::Int64(42)]);
        let (sql, params) = KeysetQueryBuilder::new(&table, &MySqlDialect)
            .build(&cursor, 10)
            .unwrap();

        assert!(sql.contains("WHERE (`id` > ?)"));
        assert!(sql.ends_with("ORDER BY `id` ASC LIMIT 10"));
        assert_eq!(params, vec![Value::Int64(42)]);
    }

    #[test]
    fn test_empty_column_list_selects_all() {
        let table = Table::new("s", "t").with_primary_keys(["id"]);
        let (sql, _) = KeysetQueryBuilder::new(&table, &PostgresDialect)
            .build(&ScanCursor::Start, 5)
            .unwrap();
        assert!(sql.starts_with("SELECT * FROM"));
    }

    #[test]
    fn test_cursor_arity_mismatch() {
        let table = users();
        let cursor = ScanCursor::After(vec![Value::Int32(1), Value::Int32(2)]);
        let err = KeysetQueryBuilder::new(&table, &PostgresDialect)
            .build(&cursor, 10)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_text_columns_are_cast() {
        let table = Table::new("net", "hosts")
            .with_primary_keys(["id"])
            .with_columns(["id", "addr"]);
        let text = vec!["addr".to_string()];
        let (sql, _) = KeysetQueryBuilder::new(&table, &PostgresDialect)
            .with_text_columns(&text)
            .build(&ScanCursor::Start, 10)
            .unwrap();

        assert_eq!(
            sql,
            "SELECT \"id\", \"addr\"::text AS \"addr\" FROM \"net\".\"hosts\" \
             ORDER BY \"id\" ASC LIMIT 10"
        );
    }

    #[test]
    fn test_text_key_compared_as_text() {
        let table = Table::new("net", "hosts")
            .with_primary_keys(["addr"])
            .with_columns(["addr", "name"]);
        let text = vec!["addr".to_string()];
        let cursor = ScanCursor::After(vec![Value::from("10.0.0.1")]);
        let (sql, params) = KeysetQueryBuilder::new(&table, &PostgresDialect)
            .with_text_columns(&text)
            .build(&cursor, 10)
            .unwrap();

        assert!(sql.contains("WHERE (\"addr\"::text > $1)"));
        assert!(sql.ends_with("ORDER BY \"addr\"::text ASC LIMIT 10"));
        assert_eq!(params, vec![Value::from("10.0.0.1")]);
    }

    #[test]
    fn test_mysql_text_cast() {
        assert_eq!(MySqlDialect.text_cast("`a`"), "CAST(`a` AS CHAR)");
        assert_eq!(PostgresDialect.text_cast("\"a\""), "\"a\"::text");
    }

    #[test]
    fn test_no_primary_key() {
        let table = Table::new("s", "logs").with_columns(["line"]);
        let err = KeysetQueryBuilder::new(&table, &PostgresDialect)
            .build(&ScanCursor::Start, 10)
            .unwrap_err();
        assert!(matches!(err, Error::MissingPrimaryKey { .. }));
    }
}
