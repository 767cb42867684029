//! Ordered byte-key store abstraction

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

use crate::error::Result;

pub type KvPair = (Vec<u8>, Vec<u8>);

/// An ordered key-value store holding one persisted segment.
///
/// A missing key is `Ok(None)`, never an error.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    fn write_batch(&self, entries: Vec<KvPair>) -> Result<()>;

    /// All pairs whose key starts with `prefix`, in key order
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>>;

    /// Make previous writes durable
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory store used when the index has no data directory
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn write_batch(&self, entries: Vec<KvPair>) -> Result<()> {
        let mut data = self.data.write();
        for (key, value) in entries {
            data.insert(key, value);
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        let data = self.data.read();
        let range = data.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded));
        Ok(range
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get(b"missing").unwrap(), None);

        store.put(b"a1", b"x").unwrap();
        store
            .write_batch(vec![
                (b"a2".to_vec(), b"y".to_vec()),
                (b"b1".to_vec(), b"z".to_vec()),
            ])
            .unwrap();

        assert_eq!(store.get(b"a1").unwrap(), Some(b"x".to_vec()));
        let scanned = store.scan_prefix(b"a").unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[1].0, b"a2".to_vec());
        assert!(store.scan_prefix(b"c").unwrap().is_empty());
        assert_eq!(store.len(), 3);
    }
}
