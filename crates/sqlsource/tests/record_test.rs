//! Tests for output records

use sqlsource::prelude::*;
use sqlsource::record::to_snake_case;

#[test]
fn test_collection_normalization() {
    assert_eq!(collection_name("", "memberships"), "memberships");
    assert_eq!(collection_name("public", "UserGroups"), "public_user_groups");
    assert_eq!(collection_name("CRM", "AccountContacts"), "crm_account_contacts");
    assert_eq!(collection_name("app", "order-items"), "app_order_items");
}

#[test]
fn test_snake_case_edge_cases() {
    assert_eq!(to_snake_case(""), "");
    assert_eq!(to_snake_case("_"), "");
    assert_eq!(to_snake_case("ID"), "id");
    assert_eq!(to_snake_case("userID"), "user_id");
    assert_eq!(to_snake_case("XMLHttpRequest"), "xml_http_request");
}

#[test]
fn test_id_follows_primary_key_order() {
    let table = Table::new("public", "memberships").with_primary_keys(["group_id", "user_id"]);
    let row = Row::from_pairs([
        ("user_id", Value::Int32(3)),
        ("group_id", Value::Int32(8)),
    ]);

    let record = ObjectRecord::from_row(&table, row).unwrap();
    assert_eq!(record.id, "8_3");
    assert_eq!(record.collection, "public_memberships");
}

#[test]
fn test_id_renders_values_verbatim() {
    let table = Table::new("", "t").with_primary_keys(["tenant", "key"]);
    let row = Row::from_pairs([
        ("tenant", Value::from("Acme Corp")),
        ("key", Value::UInt64(18_446_744_073_709_551_615)),
    ]);

    let record = ObjectRecord::from_row(&table, row).unwrap();
    assert_eq!(record.id, "Acme Corp_18446744073709551615");
}

#[test]
fn test_primary_key_lookup_prefers_exact_name() {
    let table = Table::new("", "t").with_primary_keys(["id"]);
    let row = Row::from_pairs([("ID", Value::Int64(100)), ("id", Value::Int64(1))]);

    let record = ObjectRecord::from_row(&table, row).unwrap();
    assert_eq!(record.id, "1");
    assert_eq!(record.properties["ID"], Value::Int64(100));
    assert_eq!(record.properties["id"], Value::Int64(1));
}

#[test]
fn test_primary_key_lookup_falls_back_to_case_insensitive() {
    let table = Table::new("", "t").with_primary_keys(["ID"]);
    let row = Row::from_pairs([("id", Value::Int64(1))]);

    let record = ObjectRecord::from_row(&table, row).unwrap();
    assert_eq!(record.id, "1");
    assert!(record.properties.contains_key("id"));
}
