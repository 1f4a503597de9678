//! On-disk cache of table embeddings.
//!
//! The whole map is written as one bincode file. The file's modification
//! time decides staleness; entries carry their own `created_at` only for
//! reporting.

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime}
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppResult, cache_error, file_read_error, file_write_error};

pub const CACHE_FILE: &str = "table_embeddings.bin";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEmbeddingEntry {
    pub table_name:  String,
    pub embedding:   Vec<f32>,
    pub source_text: String,
    pub columns:     Vec<String>,
    pub created_at:  DateTime<Utc>
}

pub type EmbeddingMap = BTreeMap<String, TableEmbeddingEntry>;

#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    path:    PathBuf,
    max_age: Duration
}

impl EmbeddingStore {
    pub fn new(dir: &Path, max_age_days: u64) -> Self {
        Self {
            path:    dir.join(CACHE_FILE),
            max_age: Duration::from_secs(max_age_days.saturating_mul(SECONDS_PER_DAY))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Age of the cache file, `None` when it does not exist
    pub fn age(&self) -> Option<Duration> {
        let modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok()?;
        Some(SystemTime::now().duration_since(modified).unwrap_or_default())
    }

    pub fn is_fresh(&self) -> bool {
        self.age().is_some_and(|age| age < self.max_age)
    }

    /// Read the map if the file exists and is fresh
    pub fn load(&self) -> AppResult<Option<EmbeddingMap>> {
        match self.age() {
            None => return Ok(None),
            Some(age) if age >= self.max_age => {
                debug!(path = %self.path.display(), age_secs = age.as_secs(), "embedding cache is stale");
                return Ok(None);
            }
            Some(_) => {}
        }

        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(file_read_error(&self.path.display().to_string(), e))
        };
        bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| cache_error(format!("corrupt cache file {}: {}", self.path.display(), e)))
    }

    /// Write through a temporary file so readers never see a partial map
    pub fn save(&self, map: &EmbeddingMap) -> AppResult<()> {
        let path_str = self.path.display().to_string();
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| file_write_error(&path_str, e))?;
        }
        let bytes = bincode::serialize(map).map_err(|e| cache_error(e.to_string()))?;
        let tmp = self.path.with_extension("bin.tmp");
        fs::write(&tmp, bytes).map_err(|e| file_write_error(&path_str, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| file_write_error(&path_str, e))?;
        debug!(path = %path_str, tables = map.len(), "saved embedding cache");
        Ok(())
    }

    pub fn remove(&self) -> AppResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(file_write_error(&self.path.display().to_string(), e))
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn entry(name: &str) -> TableEmbeddingEntry {
        TableEmbeddingEntry {
            table_name:  name.to_string(),
            embedding:   vec![0.6, 0.8],
            source_text: format!("{} id", name),
            columns:     vec!["id".to_string()],
            created_at:  Utc::now()
        }
    }

    #[test]
    fn test_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = EmbeddingStore::new(dir.path(), 7);
        assert!(store.load().unwrap().is_none());
        assert!(!store.is_fresh());
        assert!(store.remove().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = EmbeddingStore::new(&dir.path().join("nested"), 7);
        let mut map = EmbeddingMap::new();
        map.insert("users".into(), entry("users"));
        store.save(&map).unwrap();

        assert!(store.is_fresh());
        assert_eq!(store.load().unwrap(), Some(map));
    }

    #[test]
    fn test_zero_age_limit_is_stale() {
        let dir = TempDir::new().unwrap();
        let store = EmbeddingStore::new(dir.path(), 0);
        store.save(&EmbeddingMap::new()).unwrap();
        assert!(!store.is_fresh());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let store = EmbeddingStore::new(dir.path(), 7);
        fs::write(store.path(), b"\xff\xff\xff").unwrap();
        assert!(store.load().is_err());
    }
}
