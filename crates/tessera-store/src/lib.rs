//! Storage layer for tessera.
//!
//! A minimal key-value port ([`KVStore`]) with an in-memory backend for tests
//! and a RocksDB backend for durable state. Components never reach for a
//! global store: each one receives the store it should use at construction,
//! usually a [`PrefixStore`] carving out its own namespace.

pub mod storage;

use std::collections::BTreeMap;
use thiserror::Error;

pub use storage::{open_storage, RocksDBStore, StorageConfig};

/// Store error types
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("backend error:: {0}")]
    Backend(String),

    #[error("invalid data:: {0}")]
    InvalidData(String),

    #[error("invalid config:: {0}")]
    InvalidConfig(String),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Basic key-value store trait
pub trait KVStore: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Set a key-value pair
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Check if a key exists
    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Iterate over keys with a prefix, in key order
    ///
    /// A backend failure is yielded as an `Err` and ends the iteration.
    fn prefix_iterator(&self, prefix: &[u8]) -> Box<dyn Iterator<Item = Result<KVPair>> + '_>;
}

/// Key and value as returned by a prefix scan
pub type KVPair = (Vec<u8>, Vec<u8>);

// Implement KVStore for Box<dyn KVStore>
impl KVStore for Box<dyn KVStore> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        (**self).set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        (**self).delete(key)
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        (**self).has(key)
    }

    fn prefix_iterator(&self, prefix: &[u8]) -> Box<dyn Iterator<Item = Result<KVPair>> + '_> {
        (**self).prefix_iterator(prefix)
    }
}

/// In-memory key-value store implementation
#[derive(Debug, Default, Clone)]
pub struct MemStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemStore {
    /// Create a new memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KVStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }

    fn prefix_iterator(&self, prefix: &[u8]) -> Box<dyn Iterator<Item = Result<KVPair>> + '_> {
        let prefix = prefix.to_vec();
        Box::new(
            self.data
                .range(prefix.clone()..)
                .take_while(move |(k, _)| k.starts_with(&prefix))
                .map(|(k, v)| Ok((k.clone(), v.clone()))),
        )
    }
}

/// Namespaced view over another store
///
/// Every key is transparently prefixed on the way in and stripped on the way
/// out, so several components can share one database without colliding.
pub struct PrefixStore<S: KVStore> {
    inner: S,
    prefix: Vec<u8>,
}

impl<S: KVStore> PrefixStore<S> {
    pub fn new(inner: S, prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }

    /// Consume the view and return the underlying store
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: KVStore> KVStore for PrefixStore<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(&self.full_key(key))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let full = self.full_key(key);
        self.inner.set(&full, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        let full = self.full_key(key);
        self.inner.delete(&full)
    }

    fn prefix_iterator(&self, prefix: &[u8]) -> Box<dyn Iterator<Item = Result<KVPair>> + '_> {
        let strip = self.prefix.len();
        Box::new(
            self.inner
                .prefix_iterator(&self.full_key(prefix))
                .map(move |entry| entry.map(|(k, v)| (k[strip..].to_vec(), v))),
        )
    }
}
