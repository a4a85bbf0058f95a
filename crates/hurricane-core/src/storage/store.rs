//! Whole-collection stores.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use super::error::{StorageError, StorageResult};

/// A durable home for one collection, read and written as a whole.
pub trait Store<T>: Send + Sync {
    /// Loads the collection; `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> StorageResult<Option<T>>;

    /// Replaces the stored collection.
    fn save(&self, value: &T) -> StorageResult<()>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// Stores a collection as pretty-printed JSON, replaced atomically.
#[derive(Debug)]
pub struct JsonFileStore<T> {
    path: PathBuf,
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    /// Creates a store for `<dir>/<name>.json`.
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", name)),
            name: name.to_string(),
            _marker: PhantomData,
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> Store<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> StorageResult<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let value = serde_json::from_str(&content).map_err(|e| StorageError::Corrupted {
            name: self.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(value))
    }

    fn save(&self, value: &T) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(value)?;

        // Write to a sibling temp file, then rename over the target
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, json)?;
        std::fs::rename(&temp_path, &self.path)?;

        debug!(collection = %self.name, path = %self.path.display(), "Collection saved");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// In-memory store for tests and embedded use.
#[derive(Debug)]
pub struct MemoryStore<T> {
    name: String,
    value: Mutex<Option<T>>,
    fail_saves: bool,
}

impl<T> MemoryStore<T> {
    /// Creates an empty store.
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), value: Mutex::new(None), fail_saves: false }
    }

    /// Creates a store whose saves always fail.
    pub fn failing(name: &str) -> Self {
        Self { fail_saves: true, ..Self::new(name) }
    }
}

impl<T: Clone + Send> Store<T> for MemoryStore<T> {
    fn load(&self) -> StorageResult<Option<T>> {
        self.value.lock().map(|v| v.clone()).map_err(|_| StorageError::Corrupted {
            name: self.name.clone(),
            reason: "lock poisoned".to_string(),
        })
    }

    fn save(&self, value: &T) -> StorageResult<()> {
        if self.fail_saves {
            return Err(StorageError::Io(std::io::Error::other(format!(
                "{} is read-only",
                self.name
            ))));
        }
        let mut slot = self.value.lock().map_err(|_| StorageError::Corrupted {
            name: self.name.clone(),
            reason: "lock poisoned".to_string(),
        })?;
        *slot = Some(value.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store: JsonFileStore<BTreeMap<String, u32>> = JsonFileStore::new(dir.path(), "counts");
        assert!(store.load().unwrap().is_none());

        let value: BTreeMap<String, u32> = [("a".to_string(), 1), ("b".to_string(), 2)].into();
        store.save(&value).unwrap();
        assert_eq!(store.load().unwrap(), Some(value));
        assert!(!dir.path().join("counts.json.tmp").exists());
    }

    #[test]
    fn test_json_store_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        let store: JsonFileStore<Vec<u32>> = JsonFileStore::new(dir.path(), "broken");
        assert!(matches!(store.load(), Err(StorageError::Corrupted { .. })));
    }

    #[test]
    fn test_json_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("state").join("deep");
        let store: JsonFileStore<Vec<u32>> = JsonFileStore::new(&nested, "items");
        store.save(&vec![1, 2, 3]).unwrap();
        assert!(nested.join("items.json").exists());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new("mem");
        assert_eq!(store.load().unwrap(), None::<Vec<u8>>);
        store.save(&vec![7u8]).unwrap();
        assert_eq!(store.load().unwrap(), Some(vec![7u8]));

        let failing: MemoryStore<Vec<u8>> = MemoryStore::failing("ro");
        assert!(failing.save(&vec![1]).is_err());
    }
}
