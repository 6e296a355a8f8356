//! Store wrappers for exercising storage failures

use tessera_store::{KVPair, KVStore, MemStore, Result, StoreError};

/// Store whose prefix scans fail after the first entry
#[derive(Default)]
pub(crate) struct BrokenScan(pub(crate) MemStore);

impl KVStore for BrokenScan {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.0.get(key)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.0.set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.0.delete(key)
    }

    fn prefix_iterator(&self, prefix: &[u8]) -> Box<dyn Iterator<Item = Result<KVPair>> + '_> {
        let interrupted = std::iter::once(Err(StoreError::Backend("scan interrupted".into())));
        Box::new(self.0.prefix_iterator(prefix).take(1).chain(interrupted))
    }
}
