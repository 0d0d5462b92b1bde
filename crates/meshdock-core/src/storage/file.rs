// JSON-file backed store. Every read goes to disk so entries written by
// another process (or another stack instance) are always seen.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, trace};

use super::{KeyValueStore, StorageError};

/// [`KeyValueStore`] persisted as a single JSON object on disk.
///
/// The file is created on first write. Writes go through a sibling
/// temporary file and a rename, so a crash never leaves a half-written
/// state file behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let body = serde_json::to_string_pretty(entries).map_err(|e| StorageError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, body).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        trace!(path = %self.path.display(), entries = entries.len(), "state file written");
        Ok(())
    }

    fn modify<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> R,
    ) -> Result<R, StorageError> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Lock)?;
        let mut entries = self.read_all()?;
        let result = f(&mut entries);
        self.write_all(&entries)?;
        Ok(result)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.modify(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        if !self.path.exists() {
            return Ok(false);
        }
        let existed = self.modify(|entries| entries.remove(key).is_some())?;
        if existed {
            debug!(key, "state entry removed");
        }
        Ok(existed)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.read_all()?.into_keys().collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state.json"));
        assert!(store.keys().unwrap().is_empty());
        assert!(store.get("anything").unwrap().is_none());
        assert!(!store.remove("anything").unwrap());
        assert!(!store.path().exists());
    }

    #[test]
    fn writes_are_visible_to_a_second_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let writer = FileStore::new(&path);
        let reader = FileStore::new(&path);

        writer.set("ipn-state-_current-profile", "abc").unwrap();
        assert_eq!(
            reader.get("ipn-state-_current-profile").unwrap().as_deref(),
            Some("abc")
        );

        assert!(reader.remove("ipn-state-_current-profile").unwrap());
        assert!(writer.get("ipn-state-_current-profile").unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "[1, 2").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.keys(), Err(StorageError::Corrupt { .. })));
    }
}
