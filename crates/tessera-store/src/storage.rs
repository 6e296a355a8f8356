//! RocksDB-backed storage
//!
//! Tessera keeps all of its durable state in a single database under
//! `<home>/data/vault.db`. Components share it through cloned
//! [`RocksDBStore`] handles, each writing under its own key namespace:
//!
//! ```text
//! data/
//!   vault.db/
//!     lock/<resource ref>          # registry records
//!     session/<resource ref>       # persisted signing sessions
//!     ledger/utxo/<resource ref>   # local ledger outputs
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use tessera_store::{open_storage, KVStore, PrefixStore, StorageConfig};
//! use std::path::Path;
//!
//! let store = open_storage(Path::new("/tmp/tessera"), &StorageConfig::default()).unwrap();
//! let mut ledger = PrefixStore::new(store.clone(), b"ledger/".to_vec());
//! ledger.set(b"nonce", &0u64.to_be_bytes()).unwrap();
//! ```

use crate::{KVPair, KVStore, StoreError};
use rocksdb::{BlockBasedOptions, Cache, DBCompressionType, Options as RocksDBOptions, DB};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Storage configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Size of the LRU block cache in bytes
    pub cache_size: Option<usize>,
    /// Maximum number of open files
    pub max_open_files: Option<i32>,
    /// Compression type: "lz4", "snappy", "zstd", "none"
    pub compression: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_size: Some(8 * 1024 * 1024), // 8MB
            max_open_files: Some(256),
            compression: Some("lz4".to_string()),
        }
    }
}

/// RocksDB-backed key-value store
///
/// Cloning is cheap and yields another handle to the same database.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Create a new RocksDB store with the given database
    pub fn new(db: DB) -> Self {
        Self { db: Arc::new(db) }
    }

    /// Get the underlying database reference
    pub fn db(&self) -> &Arc<DB> {
        &self.db
    }
}

fn backend(op: &'static str) -> impl FnOnce(rocksdb::Error) -> StoreError {
    move |e| StoreError::Backend(format!("rocksdb {op} failed:: {e}"))
}

impl KVStore for RocksDBStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db.get(key).map_err(backend("get"))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.db.put(key, value).map_err(backend("put"))
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.db.delete(key).map_err(backend("delete"))
    }

    fn has(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.db.get_pinned(key).map_err(backend("get"))?.is_some())
    }

    fn prefix_iterator(
        &self,
        prefix: &[u8],
    ) -> Box<dyn Iterator<Item = Result<KVPair, StoreError>> + '_> {
        let prefix = prefix.to_vec();
        let mut failed = false;
        // Without a prefix extractor rocksdb seeks to the prefix and keeps going
        let entries = self
            .db
            .prefix_iterator(&prefix)
            .map_while(move |entry| {
                if failed {
                    return None;
                }
                match entry {
                    Ok((key, value)) if key.starts_with(&prefix) => {
                        Some(Ok((key.into_vec(), value.into_vec())))
                    }
                    Ok(_) => None,
                    Err(e) => {
                        failed = true;
                        Some(Err(backend("iterate")(e)))
                    }
                }
            });
        Box::new(entries)
    }
}

fn compression_type(name: &str) -> Result<DBCompressionType, StoreError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "lz4" => Ok(DBCompressionType::Lz4),
        "snappy" => Ok(DBCompressionType::Snappy),
        "zstd" => Ok(DBCompressionType::Zstd),
        "none" => Ok(DBCompressionType::None),
        other => Err(StoreError::InvalidConfig(format!(
            "unknown compression type:: {other}"
        ))),
    }
}

/// Build RocksDB options from the storage config
fn configure_db_options(config: &StorageConfig) -> Result<RocksDBOptions, StoreError> {
    let mut opts = RocksDBOptions::default();
    opts.create_if_missing(true);

    if let Some(name) = &config.compression {
        opts.set_compression_type(compression_type(name)?);
    }

    let mut block_opts = BlockBasedOptions::default();
    if let Some(cache_size) = config.cache_size {
        let cache = Cache::new_lru_cache(cache_size);
        block_opts.set_block_cache(&cache);
    }
    opts.set_block_based_table_factory(&block_opts);

    if let Some(max_open_files) = config.max_open_files {
        opts.set_max_open_files(max_open_files);
    }

    Ok(opts)
}

/// Open (creating if needed) the vault database under `home_dir/data`
pub fn open_storage(home_dir: &Path, config: &StorageConfig) -> Result<RocksDBStore, StoreError> {
    let data_dir = home_dir.join("data");
    std::fs::create_dir_all(&data_dir)
        .map_err(|e| StoreError::Backend(format!("Failed to create data directory:: {e}")))?;

    let db_opts = configure_db_options(config)?;

    let path = data_dir.join("vault.db");
    let db = DB::open(&db_opts, &path)
        .map_err(|e| StoreError::Backend(format!("Failed to open vault.db:: {e}")))?;
    tracing::debug!(path = %path.display(), "opened vault database");

    Ok(RocksDBStore::new(db))
}
