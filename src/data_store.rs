//! Durable key/value storage for session and identity state.
//!
//! [`DataStore`] is the boundary to the host's persistence layer. Values are kept as JSON scalars so
//! the same store can hold strings, 32-bit and 64-bit integers. A missing key (or a key holding a
//! value of the wrong type) always reads as "unset" and is never an error.
use std::{
    collections::HashMap,
    fs,
    io::ErrorKind as IoErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_json::Value;

use crate::{Error, Result};

/// A string-keyed durable store with atomic single-key writes.
pub trait DataStore {
    /// Read the raw value stored under `key`.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: Value) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> Result<()>;

    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn get_int(&self, key: &str) -> Option<i32> {
        self.get_long(key).and_then(|v| i32::try_from(v).ok())
    }

    fn get_long(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_i64()
    }

    fn set_string(&mut self, key: &str, value: &str) -> Result<()> {
        self.set(key, Value::from(value))
    }

    fn set_int(&mut self, key: &str, value: i32) -> Result<()> {
        self.set(key, Value::from(value))
    }

    fn set_long(&mut self, key: &str, value: i64) -> Result<()> {
        self.set(key, Value::from(value))
    }
}

/// A process-local store. Nothing survives a restart.
#[derive(Debug, Default, Clone)]
pub struct MemoryDataStore {
    values: HashMap<String, Value>,
}

impl MemoryDataStore {
    pub fn new() -> MemoryDataStore {
        MemoryDataStore::default()
    }
}

impl DataStore for MemoryDataStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

/// A store persisted as a single JSON object on disk.
///
/// Every write rewrites the file through a temporary sibling followed by a rename, so a crash
/// mid-write leaves the previous contents in place.
#[derive(Debug)]
pub struct FileDataStore {
    path: PathBuf,
    values: HashMap<String, Value>,
}

impl FileDataStore {
    /// Open the store at `path`. A missing file opens as an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<FileDataStore> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|err| Error::StoreFormat(Arc::new(err)))?,
            Err(err) if err.kind() == IoErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(FileDataStore { path, values })
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes =
            serde_json::to_vec(&self.values).map_err(|err| Error::StoreFormat(Arc::new(err)))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl DataStore for FileDataStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_owned(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{DataStore, FileDataStore, MemoryDataStore};

    #[test]
    fn missing_keys_read_as_unset() {
        let store = MemoryDataStore::new();
        assert_eq!(store.get_string("TNT_ID"), None);
        assert_eq!(store.get_int("SESSION_TIMEOUT"), None);
        assert_eq!(store.get_long("SESSION_TIMESTAMP"), None);
    }

    #[test]
    fn typed_accessors_do_not_cross_types() {
        let mut store = MemoryDataStore::new();
        store.set_string("key", "value").unwrap();
        assert_eq!(store.get_long("key"), None);

        store.set_long("big", i64::from(i32::MAX) + 1).unwrap();
        assert_eq!(store.get_long("big"), Some(i64::from(i32::MAX) + 1));
        assert_eq!(store.get_int("big"), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("target.json");

        {
            let mut store = FileDataStore::open(&path).unwrap();
            store.set_string("TNT_ID", "abc").unwrap();
            store.set_long("SESSION_TIMESTAMP", 1_700_000_000).unwrap();
            store.set_int("SESSION_TIMEOUT", 600).unwrap();
        }

        let mut store = FileDataStore::open(&path).unwrap();
        assert_eq!(store.get_string("TNT_ID").as_deref(), Some("abc"));
        assert_eq!(store.get_long("SESSION_TIMESTAMP"), Some(1_700_000_000));
        assert_eq!(store.get_int("SESSION_TIMEOUT"), Some(600));

        store.remove("TNT_ID").unwrap();
        let store = FileDataStore::open(&path).unwrap();
        assert_eq!(store.get_string("TNT_ID"), None);
    }

    #[test]
    fn file_store_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("target.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(FileDataStore::open(&path).is_err());
    }
}
