//! Key-value persistence for session state.
//!
//! A store is scoped to one named table; values are JSON. [`FileStore`] keeps
//! the whole table in memory and rewrites one JSON document per change.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;
use tracing::warn;

pub const KEY_API_KEY: &str = "apiKey";
pub const KEY_SYSTEM_MESSAGE: &str = "systemMessage";
pub const KEY_MESSAGES: &str = "messages";
pub const KEY_OUTPUTS: &str = "outputs";

/// Table used by the session when none is configured.
pub const DEFAULT_TABLE: &str = "session";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

#[derive(Debug)]
pub enum StoreError {
    Read { path: PathBuf, source: std::io::Error },
    Write { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    Encode { key: String, source: serde_json::Error },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Read { path, source } => {
                write!(f, "Failed to read state at {}: {}", path.display(), source)
            }
            StoreError::Write { path, source } => {
                write!(f, "Failed to write state at {}: {}", path.display(), source)
            }
            StoreError::Parse { path, source } => {
                write!(f, "Failed to parse state at {}: {}", path.display(), source)
            }
            StoreError::Encode { key, source } => {
                write!(f, "Failed to encode value for '{}': {}", key, source)
            }
        }
    }
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StoreError::Read { source, .. } | StoreError::Write { source, .. } => Some(source),
            StoreError::Parse { source, .. } | StoreError::Encode { source, .. } => Some(source),
        }
    }
}

/// In-process store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// One JSON document per table under a state directory.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl FileStore {
    /// Opens (or lazily creates) `<dir>/<table>.json`. An unreadable or
    /// corrupt document is logged and the table starts empty; the next write
    /// replaces it.
    pub fn open(dir: &Path, table: &str) -> Self {
        let path = dir.join(format!("{table}.json"));
        let values = load_document(&path).unwrap_or_else(|err| {
            warn!(error = %err, "starting with empty state");
            Map::new()
        });
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_document(&self, values: &Map<String, Value>) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        let parent = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());
        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(write_err)?;
        }

        let contents = serde_json::to_vec_pretty(values).map_err(|source| StoreError::Encode {
            key: "<document>".to_string(),
            source,
        })?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(write_err)?;
        temp_file.write_all(&contents).map_err(write_err)?;
        temp_file.as_file_mut().sync_all().map_err(write_err)?;
        temp_file
            .persist(&self.path)
            .map_err(|err| write_err(err.error))?;
        Ok(())
    }
}

fn load_document(path: &Path) -> Result<Map<String, Value>, StoreError> {
    if !path.exists() {
        return Ok(Map::new());
    }
    let contents = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(Map::new());
    }
    serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value);
        self.write_document(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn memory_store_returns_what_was_set() {
        let store = MemoryStore::new();
        assert!(store.get(KEY_API_KEY).expect("get").is_none());
        store.set(KEY_API_KEY, json!("secret")).expect("set");
        assert_eq!(store.get(KEY_API_KEY).expect("get"), Some(json!("secret")));
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = TempDir::new().expect("temp dir");
        {
            let store = FileStore::open(dir.path(), "session");
            store.set(KEY_SYSTEM_MESSAGE, json!("be nice")).expect("set");
            store.set(KEY_MESSAGES, json!([{"id": "0", "text": "hi"}])).expect("set");
        }

        let reopened = FileStore::open(dir.path(), "session");
        assert_eq!(
            reopened.get(KEY_SYSTEM_MESSAGE).expect("get"),
            Some(json!("be nice"))
        );
        assert_eq!(
            reopened.get(KEY_MESSAGES).expect("get"),
            Some(json!([{"id": "0", "text": "hi"}]))
        );
        assert!(dir.path().join("session.json").exists());
    }

    #[test]
    fn tables_are_isolated() {
        let dir = TempDir::new().expect("temp dir");
        let a = FileStore::open(dir.path(), "a");
        a.set(KEY_API_KEY, json!("k")).expect("set");
        let b = FileStore::open(dir.path(), "b");
        assert!(b.get(KEY_API_KEY).expect("get").is_none());
    }

    #[test]
    fn corrupt_document_opens_empty_and_is_replaced() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").expect("write");

        let err = load_document(&path).expect_err("should not parse");
        assert!(matches!(err, StoreError::Parse { .. }));
        assert!(err.to_string().contains("Failed to parse state"));

        let store = FileStore::open(dir.path(), "session");
        assert!(store.get(KEY_MESSAGES).expect("get").is_none());
        store.set(KEY_SYSTEM_MESSAGE, json!("fresh")).expect("set");

        let reopened = FileStore::open(dir.path(), "session");
        assert_eq!(
            reopened.get(KEY_SYSTEM_MESSAGE).expect("get"),
            Some(json!("fresh"))
        );
    }

    #[test]
    fn unreadable_document_opens_empty() {
        let dir = TempDir::new().expect("temp dir");
        fs::create_dir(dir.path().join("session.json")).expect("dir in the way");
        let store = FileStore::open(dir.path(), "session");
        assert!(store.get(KEY_API_KEY).expect("get").is_none());
    }

    #[test]
    fn file_store_creates_missing_state_dir() {
        let dir = TempDir::new().expect("temp dir");
        let nested = dir.path().join("deep").join("state");
        let store = FileStore::open(&nested, "session");
        store.set(KEY_OUTPUTS, json!([])).expect("set");
        assert!(store.path().exists());
    }
}
