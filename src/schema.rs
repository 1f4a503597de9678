//! Schema metadata used for fuzzy identifier repair and table embeddings.
//!
//! The database itself is an external collaborator reached through
//! [`SchemaProvider`]. [`SchemaCache`] memoizes what the provider returns and
//! answers closest-name queries. Provider failures are logged and treated as
//! an empty schema so the pipeline keeps running.
//!
//! # Example
//!
//! ```
//! use sql_query_guard::schema::{SchemaCache, TableDescriptors};
//!
//! let descriptors = TableDescriptors::from_json(
//!     r#"{"users": {"columns": ["id", "user_name", "email"]}}"#
//! )
//! .unwrap();
//!
//! let cache = SchemaCache::from_descriptors(&descriptors);
//! let matches = cache.closest_columns("usr_nam", "SELECT usr_nam FROM users", 0.6, 3);
//!
//! assert_eq!(matches[0], "user_name");
//! ```

use std::{
    fs,
    path::Path,
    sync::{Arc, LazyLock, RwLock}
};

use compact_str::CompactString;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::warn;

use crate::error::{AppResult, config_error, file_read_error};

/// Column names of one table
pub type ColumnVec = SmallVec<[CompactString; 8]>;

/// Source of live schema metadata.
pub trait SchemaProvider: Send + Sync {
    /// Names of all usable tables
    fn list_tables(&self) -> AppResult<Vec<String>>;

    /// Free-form description of a table, typically its DDL
    fn describe_table(&self, name: &str) -> AppResult<String>;

    /// Column names of a table, parsed from [`describe_table`] by default
    ///
    /// [`describe_table`]: SchemaProvider::describe_table
    fn table_columns(&self, name: &str) -> AppResult<ColumnVec> {
        Ok(parse_columns(&self.describe_table(name)?))
    }
}

static COLUMN_DEF: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\w+)\s+(?:VARCHAR|CHARACTER\s+VARYING|CHAR|TEXT|INTEGER|INT|BIGINT|SMALLINT|SERIAL|NUMERIC|DECIMAL|REAL|DOUBLE|FLOAT|BOOLEAN|BOOL|DATE|TIMESTAMP|DATETIME|TIME|UUID|JSONB?)\b"
    )
    .ok()
});

const DDL_WORDS: [&str; 6] = ["table", "create", "primary", "key", "not", "null"];

/// Extract column names from DDL-like describe output
pub fn parse_columns(describe: &str) -> ColumnVec {
    let Some(regex) = COLUMN_DEF.as_ref() else {
        return ColumnVec::new();
    };

    let mut columns = ColumnVec::new();
    for caps in regex.captures_iter(describe) {
        let name = &caps[1];
        if DDL_WORDS.iter().any(|w| w.eq_ignore_ascii_case(name)) {
            continue;
        }
        if !columns.iter().any(|c| c.as_str() == name) {
            columns.push(CompactString::from(name));
        }
    }
    columns
}

/// Descriptor of a table used to build its embedding text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    #[serde(default)]
    pub columns:     Vec<String>,
    #[serde(default)]
    pub description: Option<String>
}

/// Table name to descriptor, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableDescriptors(pub IndexMap<String, TableDescriptor>);

impl TableDescriptors {
    pub fn from_json(content: &str) -> AppResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| config_error(format!("Invalid table descriptors: {}", e)))
    }

    pub fn from_yaml(content: &str) -> AppResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| config_error(format!("Invalid table descriptors: {}", e)))
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn load(path: &Path) -> AppResult<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| file_read_error(&path.display().to_string(), e))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Self::from_json(&content)
        }
    }

    pub fn table_names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn get(&self, table: &str) -> Option<&TableDescriptor> {
        self.0.get(table)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl SchemaProvider for TableDescriptors {
    fn list_tables(&self) -> AppResult<Vec<String>> {
        Ok(self.table_names())
    }

    fn describe_table(&self, name: &str) -> AppResult<String> {
        let descriptor = self.0.get(name).cloned().unwrap_or_default();
        let columns: Vec<String> = descriptor
            .columns
            .iter()
            .map(|c| format!("    {} TEXT", c))
            .collect();
        Ok(format!("CREATE TABLE {} (\n{}\n)", name, columns.join(",\n")))
    }

    fn table_columns(&self, name: &str) -> AppResult<ColumnVec> {
        Ok(self
            .0
            .get(name)
            .map(|d| {
                d.columns
                    .iter()
                    .map(|c| CompactString::from(c.as_str()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

static QUERY_TABLES: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:FROM|JOIN)\s+(\w+)").ok());

#[derive(Debug, Default)]
struct CacheState {
    tables:  Vec<String>,
    columns: IndexMap<String, ColumnVec>
}

/// Memoized schema metadata with closest-name lookup.
#[derive(Default)]
pub struct SchemaCache {
    provider: Option<Arc<dyn SchemaProvider>>,
    state:    RwLock<CacheState>
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("has_provider", &self.provider.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl SchemaCache {
    /// Cache with no metadata source; lookups rely on seeded entries only
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(provider: Arc<dyn SchemaProvider>) -> Self {
        Self {
            provider: Some(provider),
            state:    RwLock::new(CacheState::default())
        }
    }

    /// Seed the cache from caller supplied descriptors
    pub fn from_descriptors(descriptors: &TableDescriptors) -> Self {
        let cache = Self::new();
        for (name, descriptor) in &descriptors.0 {
            cache.insert_table(name, descriptor.columns.iter().map(String::as_str));
        }
        cache
    }

    pub fn insert_table<'a>(&self, table: &str, columns: impl IntoIterator<Item = &'a str>) {
        if let Ok(mut state) = self.state.write() {
            if !state.tables.iter().any(|t| t == table) {
                state.tables.push(table.to_string());
            }
            state.columns.insert(
                table.to_string(),
                columns.into_iter().map(CompactString::from).collect()
            );
        }
    }

    /// Forget everything fetched so far
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.write() {
            *state = CacheState::default();
        }
    }

    /// Known table names, fetching from the provider on first use
    pub fn available_tables(&self) -> Vec<String> {
        if let Ok(state) = self.state.read()
            && !state.tables.is_empty()
        {
            return state.tables.clone();
        }

        let Some(provider) = &self.provider else {
            return Vec::new();
        };

        match provider.list_tables() {
            Ok(tables) => {
                if let Ok(mut state) = self.state.write() {
                    state.tables = tables.clone();
                }
                tables
            }
            Err(e) => {
                warn!(error = %e, "could not fetch table names");
                Vec::new()
            }
        }
    }

    /// Columns of one table, fetching from the provider on first use
    pub fn table_columns(&self, table: &str) -> ColumnVec {
        if let Ok(state) = self.state.read()
            && let Some(columns) = state.columns.get(table)
        {
            return columns.clone();
        }

        let Some(provider) = &self.provider else {
            return ColumnVec::new();
        };

        match provider.table_columns(table) {
            Ok(columns) => {
                if let Ok(mut state) = self.state.write() {
                    state.columns.insert(table.to_string(), columns.clone());
                }
                columns
            }
            Err(e) => {
                warn!(table, error = %e, "could not fetch table columns");
                ColumnVec::new()
            }
        }
    }

    /// Columns of the tables referenced by `query`.
    ///
    /// Falls back to every cached column when the query names no known table.
    pub fn columns_for_query(&self, query: &str) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();

        if let Some(regex) = QUERY_TABLES.as_ref() {
            for caps in regex.captures_iter(query) {
                for column in self.table_columns(&caps[1]) {
                    if !columns.iter().any(|c| c == column.as_str()) {
                        columns.push(column.to_string());
                    }
                }
            }
        }

        if columns.is_empty()
            && let Ok(state) = self.state.read()
        {
            for column in state.columns.values().flatten() {
                if !columns.iter().any(|c| c == column.as_str()) {
                    columns.push(column.to_string());
                }
            }
        }

        columns
    }

    /// Closest known columns to `name` for the tables of `query`
    pub fn closest_columns(&self, name: &str, query: &str, cutoff: f64, n: usize) -> Vec<String> {
        closest_matches(name, &self.columns_for_query(query), cutoff, n)
    }

    pub fn closest_tables(&self, name: &str, cutoff: f64, n: usize) -> Vec<String> {
        closest_matches(name, &self.available_tables(), cutoff, n)
    }
}

/// Candidates whose normalized edit similarity to `word` is at least
/// `cutoff`, best first. Ties keep candidate order.
pub fn closest_matches(word: &str, candidates: &[String], cutoff: f64, n: usize) -> Vec<String> {
    let needle = word.to_lowercase();
    let mut scored: Vec<(f64, &String)> = candidates
        .iter()
        .map(|c| (strsim::normalized_levenshtein(&needle, &c.to_lowercase()), c))
        .filter(|(score, _)| *score >= cutoff)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().take(n).map(|(_, c)| c.clone()).collect()
}
