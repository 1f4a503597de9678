//! Semantic table selection.
//!
//! Narrows a list of table names to the ones most relevant to a natural
//! language question, using cosine similarity between the question and a
//! cached embedding of each table's metadata.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  build_index(_async)  ┌──────────────────┐
//! │ TableDescriptors │──────────────────────▶│   EmbeddingMap   │──▶ table_embeddings.bin
//! └──────────────────┘   (worker thread)     │ (Arc snapshot)   │
//!                                            └────────┬─────────┘
//!                                                     │ read, never waits
//! ┌──────────────────┐                       ┌────────┴─────────┐
//! │ question + names │──────────────────────▶│ select_relevant  │──▶ Vec<String>
//! └──────────────────┘                       └──────────────────┘
//! ```
//!
//! Selection never blocks on the index build. While a build is running, or
//! whenever scoring is unavailable, it falls back to the first `max_tables`
//! names in input order.
//!
//! # Example
//!
//! ```
//! use sql_query_guard::{
//!     config::SelectorConfig,
//!     schema::TableDescriptors,
//!     selector::SemanticTableSelector
//! };
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = SelectorConfig {
//!     cache_dir: dir.path().to_path_buf(),
//!     ..SelectorConfig::default()
//! };
//! let tables = TableDescriptors::from_json(
//!     r#"{"users": {"columns": ["id", "email"]}, "orders": {"columns": ["id", "total_amount"]}}"#
//! )
//! .unwrap();
//!
//! let selector = SemanticTableSelector::new(config);
//! selector.build_index(&tables).unwrap();
//!
//! let picked = selector.select_relevant_tables("order totals", &tables.table_names(), None);
//! assert_eq!(picked[0], "orders");
//! ```

mod embedding;
mod progress;
mod store;

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex, RwLock, RwLockWriteGuard,
        atomic::{AtomicU64, Ordering}
    },
    time::Duration
};

use chrono::Utc;
pub use embedding::{Embedder, HashingEmbedder, cosine_similarity, table_text, tokenize};
pub use progress::{IndexingProgress, IndexingStatus};
use progress::ProgressTracker;
use serde::Serialize;
pub use store::{CACHE_FILE, EmbeddingMap, EmbeddingStore, TableEmbeddingEntry};
use tokio::{runtime::Handle, sync::watch};
use tracing::{debug, info, warn};

use crate::{
    config::SelectorConfig,
    error::{AppError, AppResult},
    schema::TableDescriptors,
    stats::{SelectorStats, StatsCollector}
};

/// Selection never returns fewer tables than this while enough are available
pub const MIN_TABLES: usize = 3;

const MEMO_CAPACITY: usize = 256;

/// Similarity of one table to a question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableScore {
    pub table: String,
    pub score: f32
}

/// Detailed answer to "can the cache serve these tables?"
#[derive(Debug, Clone, Serialize)]
pub struct CacheValidation {
    pub valid:          bool,
    pub status:         IndexingStatus,
    pub cached_tables:  usize,
    pub required:       usize,
    pub missing_tables: Vec<String>,
    pub extra_tables:   Vec<String>,
    pub cache_exists:   bool,
    pub cache_fresh:    bool,
    pub cache_age_days: Option<f64>
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionSummary {
    pub enabled:              bool,
    pub embedder:             String,
    pub status:               IndexingStatus,
    pub cached_tables:        usize,
    pub similarity_threshold: f32,
    pub max_tables:           usize,
    pub avg_similarity_score: f64,
    pub counters:             SelectorStats
}

/// Question embeddings keyed by normalized question text
#[derive(Debug, Default)]
struct QuestionMemo {
    entries: HashMap<String, Arc<[f32]>>
}

impl QuestionMemo {
    fn get(&self, key: &str) -> Option<Arc<[f32]>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: String, vector: Arc<[f32]>) {
        // Simple eviction: clear half when full
        if self.entries.len() >= MEMO_CAPACITY {
            let keys: Vec<_> = self.entries.keys().take(MEMO_CAPACITY / 2).cloned().collect();
            for key in keys {
                self.entries.remove(&key);
            }
        }
        self.entries.insert(key, vector);
    }
}

/// State shared between the selector and its indexing worker
struct SelectorState {
    config:     SelectorConfig,
    embedder:   Arc<dyn Embedder>,
    store:      EmbeddingStore,
    tables:     RwLock<Arc<EmbeddingMap>>,
    progress:   ProgressTracker,
    memo:       Mutex<QuestionMemo>,
    generation: AtomicU64,
    stats:      Arc<StatsCollector>
}

impl SelectorState {
    fn tables(&self) -> Arc<EmbeddingMap> {
        match self.tables.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner())
        }
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, Arc<EmbeddingMap>> {
        match self.tables.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner()
        }
    }

    fn replace_tables(&self, map: EmbeddingMap) {
        *self.write_tables() = Arc::new(map);
    }

    /// Claim the build and capture its generation.
    ///
    /// Runs under the tables lock so a concurrent cancel either happens
    /// before the claim or invalidates the captured generation.
    fn begin(&self, total: usize) -> Option<u64> {
        let _tables = self.write_tables();
        if !self.progress.try_begin(total) {
            return None;
        }
        Some(self.generation.load(Ordering::SeqCst))
    }

    /// Bump the generation so a running build abandons its work
    fn invalidate(&self) {
        let _tables = self.write_tables();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Embed every table missing from the current map, then swap and persist.
    ///
    /// The caller must already own the build through `begin`. The status
    /// stays `InProgress` until this returns, so a cancelled build still
    /// blocks new ones until it has unwound. Returns `None` when cancelled.
    fn run_build(&self, descriptors: &TableDescriptors, generation: u64) -> Option<usize> {
        let cancelled = || self.generation.load(Ordering::SeqCst) != generation;
        let mut map = (*self.tables()).clone();
        let mut embedded = 0usize;
        let mut failed = 0usize;

        for (name, table) in &descriptors.0 {
            if map.contains_key(name) {
                continue;
            }
            if cancelled() {
                debug!(table = %name, "indexing cancelled");
                return self.abandon();
            }
            self.progress.table_started(name);
            let text = table_text(name, table);
            match self.embedder.embed(&text) {
                Ok(embedding) => {
                    map.insert(
                        name.clone(),
                        TableEmbeddingEntry {
                            table_name: name.clone(),
                            embedding,
                            source_text: text,
                            columns: table.columns.clone(),
                            created_at: Utc::now()
                        }
                    );
                    embedded += 1;
                    self.progress.table_finished(name, true);
                }
                Err(e) => {
                    warn!(table = %name, error = %e, "failed to embed table");
                    failed += 1;
                    self.progress.table_finished(name, false);
                }
            }
        }

        // Commit under the write lock: `invalidate` cannot slip in between
        // the generation check and the swap.
        let mut tables = self.write_tables();
        if cancelled() {
            drop(tables);
            return self.abandon();
        }
        if embedded == 0 && failed > 0 {
            self.progress.fail(format!("none of {} tables could be embedded", failed));
            return Some(0);
        }

        if let Err(e) = self.store.save(&map) {
            warn!(error = %e, "failed to persist embedding cache");
        }
        *tables = Arc::new(map);
        self.progress.complete();
        drop(tables);
        info!(embedded, failed, "table index built");
        Some(embedded)
    }

    fn abandon(&self) -> Option<usize> {
        self.progress
            .reset(IndexingStatus::NotStarted, Some("indexing cancelled".to_string()));
        info!("table indexing cancelled");
        None
    }

    fn missing(&self, names: &[String]) -> usize {
        let tables = self.tables();
        names.iter().filter(|n| !tables.contains_key(*n)).count()
    }

    fn is_cache_valid_for(&self, names: &[String]) -> bool {
        let tables = self.tables();
        !tables.is_empty()
            && self.progress.status() == IndexingStatus::Completed
            && names.iter().all(|n| tables.contains_key(n))
            && self.store.is_fresh()
    }
}

/// Picks the tables most relevant to a question.
pub struct SemanticTableSelector {
    state: Arc<SelectorState>
}

impl std::fmt::Debug for SemanticTableSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticTableSelector")
            .field("enabled", &self.state.config.enabled)
            .field("embedder", &self.state.embedder.name())
            .field("status", &self.state.progress.status())
            .finish()
    }
}

impl SemanticTableSelector {
    /// Selector with the built-in [`HashingEmbedder`]
    pub fn new(config: SelectorConfig) -> Self {
        let embedder = Arc::new(HashingEmbedder::new(config.dimensions));
        Self::with_embedder(config, embedder)
    }

    /// Selector with a custom embedder. A fresh cache file is loaded
    /// immediately and marks the index as completed.
    pub fn with_embedder(config: SelectorConfig, embedder: Arc<dyn Embedder>) -> Self {
        let store = EmbeddingStore::new(&config.cache_dir, config.max_cache_age_days);
        let mut status = IndexingStatus::Disabled;
        let mut tables = EmbeddingMap::new();

        if config.enabled {
            status = IndexingStatus::NotStarted;
            match store.load() {
                Ok(Some(map)) if compatible(&map, embedder.dimensions()) && !map.is_empty() => {
                    info!(tables = map.len(), "loaded cached table embeddings");
                    tables = map;
                    status = IndexingStatus::Completed;
                }
                Ok(Some(_)) => debug!("cached embeddings unusable, index will be rebuilt"),
                Ok(None) => debug!("no fresh embedding cache found"),
                Err(e) => warn!(error = %e, "failed to load embedding cache")
            }
        } else {
            info!("semantic table selection is disabled");
        }

        Self {
            state: Arc::new(SelectorState {
                progress: ProgressTracker::new(status),
                tables: RwLock::new(Arc::new(tables)),
                memo: Mutex::new(QuestionMemo::default()),
                generation: AtomicU64::new(0),
                stats: Arc::new(StatsCollector::new()),
                config,
                embedder,
                store
            })
        }
    }

    /// Report selection counters into a shared collector.
    ///
    /// Call before the selector is cloned into a worker or shared.
    pub fn with_stats(mut self, stats: Arc<StatsCollector>) -> Self {
        if let Some(state) = Arc::get_mut(&mut self.state) {
            state.stats = stats;
        }
        self
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.state.config
    }

    pub fn is_enabled(&self) -> bool {
        self.state.config.enabled
    }

    pub fn indexing_status(&self) -> IndexingProgress {
        self.state.progress.snapshot()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<IndexingProgress> {
        self.state.progress.subscribe()
    }

    pub fn cached_tables(&self) -> Vec<String> {
        self.state.tables().keys().cloned().collect()
    }

    /// Build the index on the calling thread.
    ///
    /// Returns the number of newly embedded tables; `0` when selection is
    /// disabled, another build is running or every table is already cached.
    pub fn build_index(&self, tables: &TableDescriptors) -> AppResult<usize> {
        let state = &self.state;
        if !state.config.enabled {
            return Ok(0);
        }
        let names = tables.table_names();
        if state.is_cache_valid_for(&names) {
            debug!("embedding cache already covers requested tables");
            return Ok(0);
        }
        let Some(generation) = state.begin(state.missing(&names)) else {
            debug!("index build already in progress");
            return Ok(0);
        };

        match state.run_build(tables, generation) {
            Some(count) if state.progress.status() == IndexingStatus::Failed => {
                Err(AppError::service(
                    state
                        .progress
                        .snapshot()
                        .error_message
                        .unwrap_or_else(|| format!("index build failed after {} tables", count))
                ))
            }
            Some(count) => Ok(count),
            None => Ok(0)
        }
    }

    /// Start a background build on the tokio blocking pool.
    ///
    /// Returns `Ok(false)` without spawning when disabled, already building
    /// or the cache is valid. Requires a running tokio runtime.
    pub fn build_index_async(&self, tables: TableDescriptors) -> AppResult<bool> {
        let state = Arc::clone(&self.state);
        if !state.config.enabled {
            return Ok(false);
        }
        let names = tables.table_names();
        if state.is_cache_valid_for(&names) {
            debug!("embedding cache already covers requested tables");
            return Ok(false);
        }
        let runtime = Handle::try_current()
            .map_err(|e| AppError::internal(format!("no async runtime for indexing: {}", e)))?;
        let Some(generation) = state.begin(state.missing(&names)) else {
            debug!("index build already in progress");
            return Ok(false);
        };

        info!(tables = names.len(), "starting background table indexing");
        runtime.spawn_blocking(move || {
            state.run_build(&tables, generation);
        });
        Ok(true)
    }

    /// Wait until no build is in progress. Returns `false` on timeout.
    pub async fn wait_for_indexing(&self, timeout: Duration) -> bool {
        let mut rx = self.state.progress.subscribe();
        let finished = rx.wait_for(|p| p.status != IndexingStatus::InProgress);
        matches!(tokio::time::timeout(timeout, finished).await, Ok(Ok(_)))
    }

    /// Ask a running build to stop. Its partial results are discarded.
    ///
    /// The build keeps its `InProgress` status until the worker notices,
    /// which happens before it embeds the next table. Use
    /// [`wait_for_indexing`](Self::wait_for_indexing) to wait for it.
    pub fn cancel_indexing(&self) -> bool {
        self.state.invalidate();
        let running = self.state.progress.status() == IndexingStatus::InProgress;
        if running {
            debug!("table indexing cancellation requested");
        }
        running
    }

    pub fn is_cache_valid_for(&self, tables: &[String]) -> bool {
        self.state.is_cache_valid_for(tables)
    }

    pub fn validate_cache_for_tables(&self, tables: &[String]) -> CacheValidation {
        let cached = self.state.tables();
        let required: HashSet<&str> = tables.iter().map(String::as_str).collect();
        let age = self.state.store.age();

        CacheValidation {
            valid:          self.state.is_cache_valid_for(tables),
            status:         self.state.progress.status(),
            cached_tables:  cached.len(),
            required:       required.len(),
            missing_tables: tables
                .iter()
                .filter(|t| !cached.contains_key(*t))
                .cloned()
                .collect(),
            extra_tables:   cached
                .keys()
                .filter(|t| !required.contains(t.as_str()))
                .cloned()
                .collect(),
            cache_exists:   age.is_some(),
            cache_fresh:    self.state.store.is_fresh(),
            cache_age_days: age.map(|a| a.as_secs_f64() / 86_400.0)
        }
    }

    /// Drop the in-memory index, the question memo and the cache file.
    ///
    /// A running build is invalidated so it cannot write the old tables back.
    pub fn clear_cache(&self) -> AppResult<()> {
        self.state.invalidate();
        self.state.replace_tables(EmbeddingMap::new());
        if let Ok(mut memo) = self.state.memo.lock() {
            memo.entries.clear();
        }
        self.state.store.remove()?;
        if self.state.progress.status() != IndexingStatus::InProgress {
            self.state.progress.reset(IndexingStatus::NotStarted, None);
        }
        info!("embedding cache cleared");
        Ok(())
    }

    /// Cancel any build and clear everything so the next build starts fresh
    pub fn force_rebuild_index(&self) -> AppResult<()> {
        self.cancel_indexing();
        self.clear_cache()
    }

    fn question_embedding(&self, question: &str) -> AppResult<Arc<[f32]>> {
        let key = question.trim().to_lowercase();
        if let Some(vector) = self.state.memo.lock().ok().and_then(|m| m.get(&key)) {
            self.state.stats.record_embedding_cache_hit();
            return Ok(vector);
        }
        let vector: Arc<[f32]> = self.state.embedder.embed(&key)?.into();
        if let Ok(mut memo) = self.state.memo.lock() {
            memo.insert(key, Arc::clone(&vector));
        }
        Ok(vector)
    }

    /// Score every cached table against the question, best first.
    pub fn relevance_scores(&self, question: &str) -> AppResult<Vec<TableScore>> {
        let tables = self.state.tables();
        if tables.is_empty() {
            return Ok(Vec::new());
        }
        let names: Vec<String> = tables.keys().cloned().collect();
        let mut scores = self.score(question, &names)?;
        sort_scores(&mut scores);
        Ok(scores)
    }

    /// Scores in `names` order, skipping tables with no usable embedding
    fn score(&self, question: &str, names: &[String]) -> AppResult<Vec<TableScore>> {
        let query = self.question_embedding(question)?;
        let tables = self.state.tables();
        Ok(names
            .iter()
            .filter_map(|name| {
                let entry = tables.get(name)?;
                let score = cosine_similarity(&query, &entry.embedding)?;
                Some(TableScore {
                    table: name.clone(),
                    score
                })
            })
            .collect())
    }

    /// Tables relevant to `question`, most similar first.
    ///
    /// At most `max_tables` (or the configured limit) are returned, but never
    /// fewer than three while that many are available: when too few tables
    /// clear the similarity threshold the list is padded in input order.
    pub fn select_relevant_tables(
        &self,
        question: &str,
        available: &[String],
        max_tables: Option<usize>
    ) -> Vec<String> {
        let cap = max_tables
            .unwrap_or(self.state.config.max_tables)
            .max(MIN_TABLES);
        if available.is_empty() {
            return Vec::new();
        }

        let reason = if !self.state.config.enabled {
            Some("selection disabled")
        } else {
            match self.state.progress.status() {
                IndexingStatus::InProgress => Some("indexing in progress"),
                IndexingStatus::Failed => Some("indexing failed"),
                _ if self.state.tables().is_empty() => Some("no table embeddings"),
                _ if !self.state.store.is_fresh() => Some("embedding cache stale"),
                _ => None
            }
        };
        if let Some(reason) = reason {
            return self.fallback(available, cap, reason);
        }

        let scores = match self.score(question, available) {
            Ok(scores) if !scores.is_empty() => scores,
            Ok(_) => return self.fallback(available, cap, "no scored tables"),
            Err(e) => {
                warn!(error = %e, "question embedding failed");
                return self.fallback(available, cap, "embedding failed");
            }
        };

        let threshold = self.state.config.similarity_threshold;
        let mut passing: Vec<TableScore> =
            scores.into_iter().filter(|s| s.score >= threshold).collect();
        sort_scores(&mut passing);
        passing.truncate(cap);

        let avg_score = if passing.is_empty() {
            None
        } else {
            Some(passing.iter().map(|s| s.score).sum::<f32>() / passing.len() as f32)
        };
        let relevant = passing.len();
        let mut selected: Vec<String> = passing.into_iter().map(|s| s.table).collect();

        if selected.len() < MIN_TABLES {
            for table in available {
                if selected.len() >= cap {
                    break;
                }
                if !selected.contains(table) {
                    selected.push(table.clone());
                }
            }
        }

        self.state
            .stats
            .record_selection(available.len().saturating_sub(selected.len()), avg_score);
        info!(
            available = available.len(),
            relevant,
            selected = selected.len(),
            "selected relevant tables"
        );
        selected
    }

    fn fallback(&self, available: &[String], cap: usize, reason: &str) -> Vec<String> {
        debug!(reason, cap, "using deterministic table fallback");
        self.state.stats.record_selection_fallback();
        available.iter().take(cap).cloned().collect()
    }

    pub fn selection_stats(&self) -> SelectionSummary {
        let counters = self.state.stats.snapshot().selector;
        SelectionSummary {
            enabled: self.state.config.enabled,
            embedder: self.state.embedder.name().to_string(),
            status: self.state.progress.status(),
            cached_tables: self.state.tables().len(),
            similarity_threshold: self.state.config.similarity_threshold,
            max_tables: self.state.config.max_tables,
            avg_similarity_score: counters.avg_similarity_score(),
            counters
        }
    }
}

fn compatible(map: &EmbeddingMap, dimensions: usize) -> bool {
    map.values().all(|e| e.embedding.len() == dimensions)
}

fn sort_scores(scores: &mut [TableScore]) {
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
}
