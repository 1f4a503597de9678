// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use std::{sync::Arc, time::Duration};

use sql_query_guard::{
    AppResult,
    config::SelectorConfig,
    error::embedding_error,
    schema::TableDescriptors,
    selector::{CACHE_FILE, Embedder, HashingEmbedder, IndexingStatus, SemanticTableSelector}
};
use tempfile::TempDir;

fn warehouse() -> TableDescriptors {
    TableDescriptors::from_yaml(
        r#"
customers:
  columns: [id, name, email, country]
  description: people who buy things
orders:
  columns: [id, customer_id, total_amount, ordered_at]
order_items:
  columns: [id, order_id, product_id, quantity]
products:
  columns: [id, sku, title, price]
warehouses:
  columns: [id, city, capacity]
shipments:
  columns: [id, warehouse_id, shipped_at, carrier]
"#
    )
    .unwrap()
}

fn config(dir: &TempDir) -> SelectorConfig {
    SelectorConfig {
        cache_dir: dir.path().to_path_buf(),
        ..SelectorConfig::default()
    }
}

/// Refuses to embed anything, used to drive the failure path
struct BrokenEmbedder;

impl Embedder for BrokenEmbedder {
    fn name(&self) -> &str {
        "broken"
    }

    fn dimensions(&self) -> usize {
        8
    }

    fn embed(&self, _text: &str) -> AppResult<Vec<f32>> {
        Err(embedding_error("model unavailable"))
    }
}

#[test]
fn test_relevant_tables_ranked_by_similarity() {
    let dir = TempDir::new().unwrap();
    let selector = SemanticTableSelector::new(config(&dir));
    selector.build_index(&warehouse()).unwrap();

    let scores = selector.relevance_scores("which warehouses ship with which carrier").unwrap();
    assert_eq!(scores.len(), 6);
    for pair in scores.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    let picked = selector.select_relevant_tables(
        "total amount of orders per customer",
        &warehouse().table_names(),
        Some(4)
    );
    assert_eq!(picked[0], "orders");
    assert!(picked.len() <= 4);
}

#[test]
fn test_robustness_floor() {
    let dir = TempDir::new().unwrap();
    let selector = SemanticTableSelector::new(SelectorConfig {
        similarity_threshold: 0.95,
        ..config(&dir)
    });
    selector.build_index(&warehouse()).unwrap();
    let names = warehouse().table_names();

    for available in [&names[..1], &names[..2], &names[..3], &names[..]] {
        for max in [None, Some(1), Some(2), Some(5)] {
            let picked = selector.select_relevant_tables("shipments by carrier", available, max);
            assert!(picked.len() >= available.len().min(3), "{:?} {:?}", available, max);
        }
    }
}

#[test]
fn test_empty_available_is_empty() {
    let dir = TempDir::new().unwrap();
    let selector = SemanticTableSelector::new(config(&dir));
    assert!(selector.select_relevant_tables("anything", &[], None).is_empty());
}

#[test]
fn test_failed_index_falls_back_deterministically() {
    let dir = TempDir::new().unwrap();
    let selector = SemanticTableSelector::with_embedder(config(&dir), Arc::new(BrokenEmbedder));

    assert!(selector.build_index(&warehouse()).is_err());
    let status = selector.indexing_status();
    assert_eq!(status.status, IndexingStatus::Failed);
    assert_eq!(status.failed_tables, 6);

    let names = warehouse().table_names();
    let first = selector.select_relevant_tables("orders", &names, Some(4));
    let second = selector.select_relevant_tables("orders", &names, Some(4));
    assert_eq!(first, second);
    assert_eq!(first, names[..4].to_vec());
    assert_eq!(selector.selection_stats().counters.fallback_used, 2);
}

#[test]
fn test_cache_persisted_and_reused() {
    let dir = TempDir::new().unwrap();
    let first = SemanticTableSelector::new(config(&dir));
    assert_eq!(first.build_index(&warehouse()).unwrap(), 6);
    assert!(dir.path().join(CACHE_FILE).exists());

    let second = SemanticTableSelector::new(config(&dir));
    assert_eq!(second.indexing_status().status, IndexingStatus::Completed);
    assert_eq!(second.build_index(&warehouse()).unwrap(), 0);
    assert_eq!(second.cached_tables().len(), 6);
}

#[test]
fn test_stale_cache_ignored() {
    let dir = TempDir::new().unwrap();
    SemanticTableSelector::new(config(&dir))
        .build_index(&warehouse())
        .unwrap();

    let stale = SemanticTableSelector::new(SelectorConfig {
        max_cache_age_days: 0,
        ..config(&dir)
    });
    assert_eq!(stale.indexing_status().status, IndexingStatus::NotStarted);
    assert!(!stale.is_cache_valid_for(&warehouse().table_names()));
}

#[test]
fn test_dimension_change_invalidates_cache() {
    let dir = TempDir::new().unwrap();
    SemanticTableSelector::new(config(&dir))
        .build_index(&warehouse())
        .unwrap();

    let resized =
        SemanticTableSelector::with_embedder(config(&dir), Arc::new(HashingEmbedder::new(64)));
    assert!(resized.cached_tables().is_empty());
    assert_eq!(resized.build_index(&warehouse()).unwrap(), 6);
}

#[test]
fn test_cache_validation_report() {
    let dir = TempDir::new().unwrap();
    let selector = SemanticTableSelector::new(config(&dir));
    let mut tables = warehouse();
    tables.0.shift_remove("shipments");
    selector.build_index(&tables).unwrap();

    let report = selector.validate_cache_for_tables(&warehouse().table_names());
    assert!(!report.valid);
    assert_eq!(report.missing_tables, vec!["shipments"]);
    assert!(report.cache_exists);
    assert!(report.cache_age_days.is_some_and(|d| d < 1.0));
}

#[tokio::test]
async fn test_background_build_and_fallback_while_running() {
    let dir = TempDir::new().unwrap();
    let selector = SemanticTableSelector::new(config(&dir));
    let names = warehouse().table_names();

    assert!(selector.build_index_async(warehouse()).unwrap());
    // running or already finished, either way nothing new is spawned
    assert!(!selector.build_index_async(warehouse()).unwrap());
    let picked = selector.select_relevant_tables("orders", &names, Some(3));
    assert_eq!(picked.len(), 3);

    assert!(selector.wait_for_indexing(Duration::from_secs(10)).await);
    assert_eq!(selector.indexing_status().status, IndexingStatus::Completed);
    assert_eq!(selector.cached_tables().len(), 6);
}

#[tokio::test]
async fn test_cancel_then_force_rebuild() {
    let dir = TempDir::new().unwrap();
    let selector = SemanticTableSelector::new(config(&dir));
    selector.build_index(&warehouse()).unwrap();

    selector.force_rebuild_index().unwrap();
    assert!(!selector.cancel_indexing());
    assert_eq!(selector.indexing_status().status, IndexingStatus::NotStarted);

    assert!(selector.build_index_async(warehouse()).unwrap());
    assert!(selector.wait_for_indexing(Duration::from_secs(10)).await);
    assert_eq!(selector.cached_tables().len(), 6);
}

#[test]
fn test_disabled_async_build_is_noop() {
    let dir = TempDir::new().unwrap();
    let selector = SemanticTableSelector::new(SelectorConfig {
        enabled: false,
        ..config(&dir)
    });
    assert!(!selector.build_index_async(warehouse()).unwrap());
    assert!(!selector.is_enabled());
}
