//! Per-segment store allocation and manifest access

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::fjall_store::FjallStore;
use super::kv::{KvPair, KvStore, MemoryStore};
use super::manifest::{IndexManifest, ManifestHolder};
use crate::error::{QuarryError, Result};
use crate::segment::SegmentId;

enum Backend {
    Memory {
        stores: Mutex<HashMap<SegmentId, Arc<MemoryStore>>>,
    },
    Fjall {
        root: PathBuf,
    },
}

/// Creates, opens and removes the store behind each persisted segment
pub struct StoreProvider {
    backend: Backend,
    manifest: ManifestHolder,
    failures: AtomicU32,
}

impl StoreProvider {
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory {
                stores: Mutex::new(HashMap::new()),
            },
            manifest: ManifestHolder::default(),
            failures: AtomicU32::new(0),
        }
    }

    /// On-disk provider rooted at `root`, loading any existing manifest
    pub fn fjall(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let manifest = IndexManifest::load(&root)?.unwrap_or_default();
        Ok(Self {
            backend: Backend::Fjall { root },
            manifest: ManifestHolder::new(manifest),
            failures: AtomicU32::new(0),
        })
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, Backend::Fjall { .. })
    }

    pub fn root(&self) -> Option<&Path> {
        match &self.backend {
            Backend::Fjall { root } => Some(root),
            Backend::Memory { .. } => None,
        }
    }

    fn segment_dir(root: &Path, id: SegmentId) -> PathBuf {
        root.join(id.to_string())
    }

    /// Fresh store for a segment being built
    pub fn create(&self, id: SegmentId) -> Result<Arc<dyn KvStore>> {
        let store: Arc<dyn KvStore> = match &self.backend {
            Backend::Memory { stores } => {
                let store = Arc::new(MemoryStore::new());
                stores.lock().insert(id, store.clone());
                store
            }
            Backend::Fjall { root } => {
                let dir = Self::segment_dir(root, id);
                if dir.exists() {
                    std::fs::remove_dir_all(&dir)?;
                }
                Arc::new(FjallStore::open(&dir)?)
            }
        };
        if self.take_failure() {
            return Ok(Arc::new(FailingStore { inner: store }));
        }
        Ok(store)
    }

    /// Store of an already persisted segment
    pub fn open(&self, id: SegmentId) -> Result<Arc<dyn KvStore>> {
        match &self.backend {
            Backend::Memory { stores } => match stores.lock().get(&id) {
                Some(store) => Ok(store.clone() as Arc<dyn KvStore>),
                None => Err(QuarryError::Storage(format!("no store for {}", id))),
            },
            Backend::Fjall { root } => {
                let dir = Self::segment_dir(root, id);
                if !dir.exists() {
                    return Err(QuarryError::Storage(format!(
                        "missing directory for {}",
                        id
                    )));
                }
                Ok(Arc::new(FjallStore::open(&dir)?))
            }
        }
    }

    /// Drop a segment's store. Removing an absent store is not an error.
    pub fn remove(&self, id: SegmentId) -> Result<()> {
        match &self.backend {
            Backend::Memory { stores } => {
                stores.lock().remove(&id);
            }
            Backend::Fjall { root } => {
                let dir = Self::segment_dir(root, id);
                if dir.exists() {
                    std::fs::remove_dir_all(&dir)?;
                }
            }
        }
        debug!(segment = %id, "removed segment store");
        Ok(())
    }

    pub fn manifest(&self) -> IndexManifest {
        self.manifest.snapshot()
    }

    /// Apply `f` to the manifest and make the result durable. The in-memory
    /// manifest only changes once the save has succeeded.
    pub fn update_manifest<F>(&self, f: F) -> Result<IndexManifest>
    where
        F: FnOnce(&mut IndexManifest),
    {
        let mut manifest = self.manifest.snapshot();
        f(&mut manifest);
        if let Backend::Fjall { root } = &self.backend {
            manifest.save(root)?;
        }
        self.manifest.store(manifest.clone());
        Ok(manifest)
    }

    /// Make the next `n` created stores reject their bulk write
    #[cfg(any(test, feature = "testing"))]
    pub fn inject_write_failures(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Store whose bulk writes fail, for exercising the persistence retry path
struct FailingStore {
    inner: Arc<dyn KvStore>,
}

impl KvStore for FailingStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.put(key, value)
    }

    fn write_batch(&self, _entries: Vec<KvPair>) -> Result<()> {
        Err(QuarryError::Storage("injected write failure".to_string()))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        self.inner.scan_prefix(prefix)
    }
}
