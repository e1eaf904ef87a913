//! Key-value storage for client state.
//!
//! Filters, page, recent searches and the persisted query cache are all kept as
//! JSON strings under fixed keys. A missing or unreadable value is treated as
//! absent so corrupt state never blocks start-up.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::ClientError;

/// Persistent string storage keyed by name.
pub trait ClientStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> Result<(), ClientError>;
    fn remove(&self, key: &str) -> Result<(), ClientError>;
}

/// Volatile storage, used in tests and when no state directory is available.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), ClientError> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ClientError> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Storage backed by a single JSON object on disk, rewritten on every change.
///
/// Inside a tokio runtime the rewrite happens on the blocking pool; each
/// write replaces the file atomically with the latest snapshot. Outside a
/// runtime it happens before `set` returns.
#[derive(Debug)]
pub struct FileStorage {
    path: Arc<PathBuf>,
    values: Arc<RwLock<BTreeMap<String, String>>>,
    write_lock: Arc<Mutex<()>>,
}

impl FileStorage {
    /// Open (or start) the state file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ClientError> {
        let path = path.into();

        let values = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable client state {:?}: {}", path, e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Arc::new(path),
            values: Arc::new(RwLock::new(values)),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), ClientError> {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return write_state(&self.path, &self.values, &self.write_lock);
        };

        let path = Arc::clone(&self.path);
        let values = Arc::clone(&self.values);
        let write_lock = Arc::clone(&self.write_lock);
        handle.spawn_blocking(move || {
            if let Err(e) = write_state(&path, &values, &write_lock) {
                tracing::warn!("Failed to save client state {:?}: {}", path, e);
            }
        });
        Ok(())
    }
}

/// Write the current contents to a sibling temp file, then rename it over `path`.
fn write_state(
    path: &Path,
    values: &RwLock<BTreeMap<String, String>>,
    write_lock: &Mutex<()>,
) -> Result<(), ClientError> {
    let _writing = write_lock.lock().unwrap_or_else(PoisonError::into_inner);

    let raw = {
        let values = values.read().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_string_pretty(&*values)
            .map_err(|e| ClientError::Io(format!("Failed to encode client state: {}", e)))?
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, raw)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl ClientStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), ClientError> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&self, key: &str) -> Result<(), ClientError> {
        let removed = self
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some();
        if removed {
            self.flush()?;
        }
        Ok(())
    }
}

/// Read and decode a JSON value; absent or malformed values yield `None`.
pub fn load_json<T: DeserializeOwned>(storage: &dyn ClientStorage, key: &str) -> Option<T> {
    let raw = storage.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Discarding malformed client state under {}: {}", key, e);
            None
        }
    }
}

/// Encode and store a JSON value.
pub fn store_json<T: Serialize + ?Sized>(
    storage: &dyn ClientStorage,
    key: &str,
    value: &T,
) -> Result<(), ClientError> {
    let raw = serde_json::to_string(value)
        .map_err(|e| ClientError::Io(format!("Failed to encode {}: {}", key, e)))?;
    storage.set(key, raw)
}
