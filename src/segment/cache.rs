//! Size-bounded decode cache for persisted segments
//!
//! Each entry reports its own estimated footprint. Inserting past the budget
//! evicts least recently used entries until the total fits again; the entry
//! just inserted is never evicted by its own insert.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::trace;

use crate::codec::RecordStore;
use crate::columns::Column;
use crate::models::Document;

use super::postings::Postings;

#[derive(Clone, Debug)]
pub enum CachedValue {
    Postings(Postings),
    Column(Arc<Column>),
    SourceBlock(Arc<Vec<Document>>),
    Generic(Arc<RecordStore>),
}

impl CachedValue {
    pub fn estimated_size(&self) -> usize {
        match self {
            CachedValue::Postings(p) => p.estimated_size(),
            CachedValue::Column(c) => c.estimated_size(),
            // rough: flattened JSON-ish size per doc
            CachedValue::SourceBlock(docs) => docs.len() * 256 + 32,
            CachedValue::Generic(store) => store.size_bytes() + 64,
        }
    }
}

struct Entry {
    value: CachedValue,
    size: usize,
    tick: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<Vec<u8>, Entry>,
    order: BTreeMap<u64, Vec<u8>>,
    total: usize,
    tick: u64,
}

pub struct DecodeCache {
    limit: usize,
    inner: Mutex<CacheInner>,
}

impl DecodeCache {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<CachedValue> {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        let CacheInner { entries, order, .. } = &mut *inner;
        let entry = entries.get_mut(key)?;
        order.remove(&entry.tick);
        entry.tick = tick;
        order.insert(tick, key.to_vec());
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: Vec<u8>, value: CachedValue) {
        let size = value.estimated_size();
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;

        if let Some(old) = inner.entries.remove(&key) {
            inner.order.remove(&old.tick);
            inner.total -= old.size;
        }
        inner.order.insert(tick, key.clone());
        inner.entries.insert(key, Entry { value, size, tick });
        inner.total += size;

        while inner.total > self.limit {
            let Some((&oldest, _)) = inner.order.iter().next() else {
                break;
            };
            if oldest == tick {
                break;
            }
            if let Some(evicted_key) = inner.order.remove(&oldest) {
                if let Some(evicted) = inner.entries.remove(&evicted_key) {
                    inner.total -= evicted.size;
                    trace!(size = evicted.size, total = inner.total, "decode cache eviction");
                }
            }
        }
    }

    /// Cached value for `key`, decoding with `load` on a miss
    pub fn get_or_load<E, F>(&self, key: &[u8], load: F) -> Result<Option<CachedValue>, E>
    where
        F: FnOnce() -> Result<Option<CachedValue>, E>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(Some(hit));
        }
        // Loaded outside the lock; concurrent misses may decode twice
        let loaded = load()?;
        if let Some(value) = &loaded {
            self.insert(key.to_vec(), value.clone());
        }
        Ok(loaded)
    }

    pub fn total_size(&self) -> usize {
        self.inner.lock().total
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
