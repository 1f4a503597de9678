// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use std::{
    fs,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering}
    }
};

use sql_query_guard::{
    AppResult,
    schema::{SchemaCache, SchemaProvider, TableDescriptors, closest_matches, parse_columns}
};
use tempfile::TempDir;

/// Counts how often the database would be asked
#[derive(Default)]
struct CountingProvider {
    describes: AtomicUsize
}

impl SchemaProvider for CountingProvider {
    fn list_tables(&self) -> AppResult<Vec<String>> {
        Ok(vec!["customers".to_string(), "invoices".to_string()])
    }

    fn describe_table(&self, name: &str) -> AppResult<String> {
        self.describes.fetch_add(1, Ordering::SeqCst);
        Ok(match name {
            "customers" => "CREATE TABLE customers (id BIGINT, full_name TEXT, email TEXT)",
            "invoices" => "CREATE TABLE invoices (id BIGINT, customer_id BIGINT, amount NUMERIC)",
            _ => ""
        }
        .to_string())
    }
}

#[test]
fn test_load_json_descriptors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tables.json");
    fs::write(
        &path,
        r#"{"b_table": {"columns": ["id"]}, "a_table": {"description": "no columns"}}"#
    )
    .unwrap();

    let descriptors = TableDescriptors::load(&path).unwrap();
    assert_eq!(descriptors.table_names(), vec!["b_table", "a_table"]);
    assert!(descriptors.get("a_table").unwrap().columns.is_empty());
    assert_eq!(descriptors.len(), 2);
}

#[test]
fn test_load_yaml_descriptors() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tables.yml");
    fs::write(&path, "users:\n  columns: [id, email]\n").unwrap();

    let descriptors = TableDescriptors::load(&path).unwrap();
    assert_eq!(descriptors.get("users").unwrap().columns, vec!["id", "email"]);
}

#[test]
fn test_load_missing_or_invalid() {
    let dir = TempDir::new().unwrap();
    assert!(TableDescriptors::load(&dir.path().join("missing.json")).is_err());

    let path = dir.path().join("broken.json");
    fs::write(&path, "{not json").unwrap();
    assert!(TableDescriptors::load(&path).is_err());
}

#[test]
fn test_provider_results_memoized() {
    let provider = Arc::new(CountingProvider::default());
    let cache = SchemaCache::with_provider(provider.clone());

    assert_eq!(cache.table_columns("customers").len(), 3);
    assert_eq!(cache.table_columns("customers").len(), 3);
    assert_eq!(provider.describes.load(Ordering::SeqCst), 1);

    cache.clear();
    cache.table_columns("customers");
    assert_eq!(provider.describes.load(Ordering::SeqCst), 2);
}

#[test]
fn test_columns_for_join_query() {
    let cache = SchemaCache::with_provider(Arc::new(CountingProvider::default()));
    let columns = cache.columns_for_query(
        "SELECT c.full_name, i.amount FROM customers c JOIN invoices i ON i.customer_id = c.id"
    );
    assert_eq!(
        columns,
        vec!["id", "full_name", "email", "customer_id", "amount"]
    );
}

#[test]
fn test_closest_tables_and_columns() {
    let cache = SchemaCache::with_provider(Arc::new(CountingProvider::default()));
    assert_eq!(cache.closest_tables("invoice", 0.6, 3), vec!["invoices"]);
    assert_eq!(
        cache.closest_columns("fullname", "SELECT fullname FROM customers", 0.6, 1),
        vec!["full_name"]
    );
}

#[test]
fn test_closest_matches_limits() {
    let candidates: Vec<String> = ["status", "stats", "state"].iter().map(|s| s.to_string()).collect();
    assert_eq!(closest_matches("stauts", &candidates, 0.6, 1).len(), 1);
    assert!(closest_matches("zzz", &candidates, 0.6, 3).is_empty());
}

#[test]
fn test_parse_columns_ignores_constraints() {
    let columns = parse_columns("CREATE TABLE t (id INT, PRIMARY KEY (id), name VARCHAR(10))");
    let names: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
    assert_eq!(names, vec!["id", "name"]);
}
