//! Tests for description persistence

use sqlsource::prelude::*;
use std::io::Write;

fn sample() -> Description {
    let mut description = Description::new();
    description.add_column(Column::new("public", "users", "id"));
    description.add_column(Column::new("public", "users", "email"));
    description.add_column(Column::new("public", "users", "created_at"));
    description.add_column(Column::new("", "memberships", "user_id"));
    description.add_column(Column::new("", "memberships", "group_id"));
    description.add_column(Column::new("", "memberships", "joined_at"));
    description.add_column(Column::primary_key("public", "users", "id"));
    description.add_column(Column::primary_key("", "memberships", "user_id"));
    description.add_column(Column::primary_key("", "memberships", "group_id"));
    description
}

fn assert_same_tables(a: &Description, b: &Description) {
    assert_eq!(a.len(), b.len());
    for table in a.iter() {
        let other = b
            .get(&table.schema_name, &table.table_name)
            .unwrap_or_else(|| panic!("missing {}", table.qualified_name()));
        assert_eq!(table.columns, other.columns);
        assert_eq!(table.primary_keys, other.primary_keys);
    }
}

#[test]
fn test_round_trip_through_writer() {
    let description = sample();

    let mut buf = Vec::new();
    description.save(&mut buf).unwrap();
    let parsed = Description::from_reader(buf.as_slice()).unwrap();

    assert_same_tables(&description, &parsed);
}

#[test]
fn test_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.json");

    let description = sample();
    description.write_to_path(&path).unwrap();
    let loaded = Description::load(&path).unwrap();

    assert_same_tables(&description, &loaded);
}

#[test]
fn test_round_trip_keeps_marker_fields() {
    let mut table = Table::new("public", "events")
        .with_primary_keys(["id"])
        .with_columns(["id", "updated_at"]);
    table.marker_column = Some("updated_at".into());
    table.last_marker = Some(serde_json::json!("2024-05-01T00:00:00Z"));

    let mut description = Description::new();
    description.add_table(table.clone());

    let mut buf = Vec::new();
    description.save(&mut buf).unwrap();
    let parsed = Description::from_reader(buf.as_slice()).unwrap();

    assert_eq!(**parsed.get("public", "events").unwrap(), table);
}

#[test]
fn test_artifact_shape() {
    let mut buf = Vec::new();
    sample().save(&mut buf).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();

    assert_eq!(
        json,
        serde_json::json!({
            "": {
                "memberships": {
                    "primary_keys": ["user_id", "group_id"],
                    "columns": ["user_id", "group_id", "joined_at"]
                }
            },
            "public": {
                "users": {
                    "primary_keys": ["id"],
                    "columns": ["id", "email", "created_at"]
                }
            }
        })
    );
}

#[test]
fn test_save_replaces_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.json");
    std::fs::write(&path, "stale content that is much longer than an empty artifact").unwrap();

    Description::new().write_to_path(&path).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    assert!(Description::load(&path).unwrap().is_empty());
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Description::load(dir.path().join("schema.json")).unwrap_err();

    assert!(matches!(err, Error::DescriptionNotFound { .. }));
    assert!(err.needs_describe());
}

#[test]
fn test_load_empty_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"  \n\t").unwrap();

    let err = Description::load(file.path()).unwrap_err();
    assert!(matches!(err, Error::EmptyDescription { .. }));
    assert!(err.to_string().contains("describe"));
}

#[test]
fn test_load_malformed_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"{\"public\": [1, 2]}").unwrap();

    let err = Description::load(file.path()).unwrap_err();
    assert!(matches!(err, Error::Persistence { .. }));
    assert!(!err.needs_describe());
}

#[test]
fn test_loaded_tables_start_with_zero_count() {
    let description = sample();
    description.get("public", "users").unwrap().incr_scanned();

    let mut buf = Vec::new();
    description.save(&mut buf).unwrap();
    let parsed = Description::from_reader(buf.as_slice()).unwrap();

    assert_eq!(parsed.get("public", "users").unwrap().scanned_rows(), 0);
}
