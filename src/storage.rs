//! Backing storage for the consensus tries.
//!
//! Provides a raw byte key-value `Storage` trait plus an in-memory and a
//! sled-backed implementation. The tries persist content-addressed state
//! snapshots here; the genesis dynasty root registry lives here as well.
//! A single storage handle is shared (by `Arc`) between every trie of a
//! context and every clone of that context.

use std::collections::HashMap;
use std::sync::RwLock;

/// Errors from storage operations.
#[derive(Clone, Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage lock poisoned")]
    Poisoned,
}

/// Trait for raw key-value storage backends.
///
/// Implementations must be safe for concurrent reads; writes are serialized
/// by the enclosing block commit protocol, not here.
pub trait Storage: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;
    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;
}

/// In-memory storage backed by a hash map. Used in tests and by tools that
/// replay consensus state without a data directory.
#[derive(Default)]
pub struct MemoryStorage {
    map: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let map = self.map.read().map_err(|_| StorageError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut map = self.map.write().map_err(|_| StorageError::Poisoned)?;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        let mut map = self.map.write().map_err(|_| StorageError::Poisoned)?;
        map.remove(key);
        Ok(())
    }
}

/// Sled-backed persistent storage.
pub struct SledStorage {
    #[allow(dead_code)]
    db: sled::Db,
    kv: sled::Tree,
}

impl SledStorage {
    /// Open or create a sled database at the given path.
    pub fn open(path: &std::path::Path) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| StorageError::Io(e.to_string()))?;
        Self::from_db(db)
    }

    /// Open a temporary in-memory sled database (for testing).
    pub fn open_temporary() -> Result<Self, StorageError> {
        let config = sled::Config::new().temporary(true);
        let db = config.open().map_err(|e| StorageError::Io(e.to_string()))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        let kv = db
            .open_tree("consensus")
            .map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(SledStorage { db, kv })
    }
}

impl Storage for SledStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let value = self
            .kv
            .get(key)
            .map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(value.map(|ivec| ivec.to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.kv
            .insert(key, value)
            .map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.kv
            .remove(key)
            .map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }
}
