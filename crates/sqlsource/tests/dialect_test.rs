//! Tests for keyset SQL generation

use sqlsource::prelude::*;

fn memberships() -> Table {
    Table::new("", "memberships")
        .with_primary_keys(["a", "b"])
        .with_columns(["a", "b", "joined_at"])
}

// ==================== Composite keys ====================

#[test]
fn test_composite_key_mysql() {
    let table = memberships();
    let cursor = ScanCursor::After(vec![Value::Int32(5), Value::Int32(4)]);

    let (sql, params) = KeysetQueryBuilder::new(&table, &MySqlDialect)
        .build(&cursor, 1000)
        .unwrap();

    assert_eq!(
        sql,
        "SELECT `a`, `b`, `joined_at` FROM `memberships` \
         WHERE (`a` > ?) OR (`a` = ? AND `b` > ?) \
         ORDER BY `a` ASC, `b` ASC LIMIT 1000"
    );
    assert_eq!(
        params,
        vec![Value::Int32(5), Value::Int32(5), Value::Int32(4)]
    );
}

#[test]
fn test_composite_key_postgres() {
    let table = Table::new("public", "memberships")
        .with_primary_keys(["a", "b"])
        .with_columns(["a", "b"]);
    let cursor = ScanCursor::After(vec![Value::from("x"), Value::Int64(9)]);

    let (sql, params) = KeysetQueryBuilder::new(&table, &PostgresDialect)
        .build(&cursor, 50)
        .unwrap();

    assert_eq!(
        sql,
        "SELECT \"a\", \"b\" FROM \"public\".\"memberships\" \
         WHERE (\"a\" > $1) OR (\"a\" = $2 AND \"b\" > $3) \
         ORDER BY \"a\" ASC, \"b\" ASC LIMIT 50"
    );
    assert_eq!(params, vec![Value::from("x"), Value::from("x"), Value::Int64(9)]);
}

#[test]
fn test_three_column_key() {
    let table = Table::new("s", "t").with_primary_keys(["a", "b", "c"]);
    let cursor = ScanCursor::After(vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)]);

    let (sql, params) = KeysetQueryBuilder::new(&table, &PostgresDialect)
        .build(&cursor, 10)
        .unwrap();

    assert!(sql.contains(
        "WHERE (\"a\" > $1) OR (\"a\" = $2 AND \"b\" > $3) \
         OR (\"a\" = $4 AND \"b\" = $5 AND \"c\" > $6)"
    ));
    assert!(sql.contains("ORDER BY \"a\" ASC, \"b\" ASC, \"c\" ASC"));
    let ints: Vec<i64> = params.iter().filter_map(Value::as_i64).collect();
    assert_eq!(ints, vec![1, 1, 2, 1, 2, 3]);
}

// ==================== First chunk ====================

#[test]
fn test_start_cursor_has_no_where() {
    let table = memberships();
    let (sql, params) = KeysetQueryBuilder::new(&table, &MySqlDialect)
        .build(&ScanCursor::Start, 7)
        .unwrap();

    assert!(!sql.contains("WHERE"));
    assert!(sql.ends_with("ORDER BY `a` ASC, `b` ASC LIMIT 7"));
    assert!(params.is_empty());
}

// ==================== Quoting ====================

#[test]
fn test_identifiers_are_escaped() {
    let table = Table::new("we\"ird", "ta`ble")
        .with_primary_keys(["i\"d"])
        .with_columns(["i\"d"]);

    let (pg, _) = KeysetQueryBuilder::new(&table, &PostgresDialect)
        .build(&ScanCursor::Start, 1)
        .unwrap();
    assert!(pg.contains("FROM \"we\"\"ird\".\"ta`ble\""));
    assert!(pg.contains("\"i\"\"d\""));

    let (my, _) = KeysetQueryBuilder::new(&table, &MySqlDialect)
        .build(&ScanCursor::Start, 1)
        .unwrap();
    assert!(my.contains("FROM `we\"ird`.`ta``ble`"));
}
