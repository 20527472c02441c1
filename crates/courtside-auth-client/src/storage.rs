use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::RwLock,
};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key/value surface the identity client persists sessions into and the
/// sweeper purges. Mirrors the browser local-storage contract: flat string
/// keys, string values, enumerable.
pub trait StorageArea: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Ephemeral storage for tests and short-lived clients.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageArea for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .entries
            .read()
            .expect("storage read lock poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .expect("storage write lock poisoned")
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .expect("storage write lock poisoned")
            .remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries
            .read()
            .expect("storage read lock poisoned")
            .keys()
            .cloned()
            .collect())
    }
}

/// Storage backed by a single JSON document on disk with an in-memory cache.
///
/// Every mutation rewrites the document; reads are served from the cache
/// loaded at construction.
pub struct FileStorage {
    path: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl FileStorage {
    /// Open or create the document at `path`.
    pub fn new(path: PathBuf) -> Result<Self, StorageError> {
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(StorageError::from(err)),
        };
        Ok(Self {
            path,
            cache: RwLock::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(entries)?;
        fs::write(&self.path, payload)?;
        Ok(())
    }
}

impl StorageArea for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .cache
            .read()
            .expect("storage read lock poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut cache = self.cache.write().expect("storage write lock poisoned");
        cache.insert(key.to_owned(), value.to_owned());
        self.persist(&cache)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut cache = self.cache.write().expect("storage write lock poisoned");
        if cache.remove(key).is_none() {
            return Ok(());
        }
        self.persist(&cache)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .cache
            .read()
            .expect("storage read lock poisoned")
            .keys()
            .cloned()
            .collect())
    }
}
