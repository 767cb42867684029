//! Fjall-backed segment store: one database per persisted segment directory

use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use std::path::{Path, PathBuf};

use super::kv::{KvPair, KvStore};
use crate::error::{QuarryError, Result};

const SEGMENT_KS: &str = "segment";

pub struct FjallStore {
    dir: PathBuf,
    db: Database,
    data: Keyspace,
}

impl FjallStore {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let db = Database::builder(dir)
            .open()
            .map_err(|e| QuarryError::Storage(format!("failed to open fjall store: {}", e)))?;
        let data = db
            .keyspace(SEGMENT_KS, || KeyspaceCreateOptions::default())
            .map_err(|e| QuarryError::Storage(format!("failed to open segment keyspace: {}", e)))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            db,
            data,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl KvStore for FjallStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .data
            .get(key)
            .map_err(QuarryError::storage)?
            .map(|val| val.as_ref().to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.insert(key, value).map_err(QuarryError::storage)
    }

    fn write_batch(&self, entries: Vec<KvPair>) -> Result<()> {
        for (key, value) in entries {
            self.data.insert(key, value).map_err(QuarryError::storage)?;
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        let mut out = Vec::new();
        for kv in self.data.prefix(prefix) {
            let key = kv.key().map_err(QuarryError::storage)?;
            let key_bytes = key.as_ref().to_vec();
            if let Some(val) = self.data.get(&key_bytes).map_err(QuarryError::storage)? {
                out.push((key_bytes, val.as_ref().to_vec()));
            }
        }
        Ok(out)
    }

    fn flush(&self) -> Result<()> {
        self.db
            .persist(fjall::PersistMode::SyncAll)
            .map_err(QuarryError::storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fjall_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("segment_0");
        {
            let store = FjallStore::open(&path).unwrap();
            store.put(b"k1", b"v1").unwrap();
            store
                .write_batch(vec![(b"k2".to_vec(), b"v2".to_vec()), (b"x".to_vec(), b"".to_vec())])
                .unwrap();
            store.flush().unwrap();
            assert_eq!(store.get(b"nope").unwrap(), None);
        }
        let store = FjallStore::open(&path).unwrap();
        assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.scan_prefix(b"k").unwrap().len(), 2);
    }
}
