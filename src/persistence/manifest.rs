//! Index manifest listing persisted segments
//!
//! Written after a segment's store is complete:
//! 1. Write the segment's store and flush it
//! 2. Write `segments.manifest.tmp`
//! 3. Rename it over `segments.manifest`
//!
//! A segment directory not named by the manifest is an incomplete build and
//! is ignored on reopen.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use crate::models::DocId;
use crate::segment::SegmentId;

pub const MANIFEST_FILE: &str = "segments.manifest";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: SegmentId,
    pub from: DocId,
    pub next: DocId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    /// Next segment id to allocate
    pub next_segment_id: SegmentId,
    /// Persisted segments in doc-id order
    pub segments: Vec<ManifestEntry>,
}

impl IndexManifest {
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            next_segment_id: SegmentId::new(0),
            segments: Vec::new(),
        }
    }

    pub fn add_segment(&mut self, entry: ManifestEntry) {
        if self.next_segment_id <= entry.id {
            self.next_segment_id = entry.id.next();
        }
        self.segments.retain(|e| e.id != entry.id);
        self.segments.push(entry);
        self.segments.sort_by_key(|e| e.from);
    }

    pub fn get_segment(&self, id: SegmentId) -> Option<&ManifestEntry> {
        self.segments.iter().find(|e| e.id == id)
    }

    /// First doc id not covered by any persisted segment
    pub fn next_doc_id(&self) -> DocId {
        self.segments.iter().map(|e| e.next).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn to_json(&self) -> io::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn from_json(data: &[u8]) -> io::Result<Self> {
        serde_json::from_slice(data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Load from `dir`, `None` when no manifest has been written yet
    pub fn load(dir: &Path) -> io::Result<Option<Self>> {
        match fs::read(dir.join(MANIFEST_FILE)) {
            Ok(data) => Self::from_json(&data).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write to `dir` through a temp file and rename
    pub fn save(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        let tmp = dir.join(format!("{}.tmp", MANIFEST_FILE));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&self.to_json()?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, dir.join(MANIFEST_FILE))
    }
}

impl Default for IndexManifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe manifest holder with atomic updates
pub struct ManifestHolder {
    inner: arc_swap::ArcSwap<IndexManifest>,
}

impl ManifestHolder {
    pub fn new(manifest: IndexManifest) -> Self {
        Self {
            inner: arc_swap::ArcSwap::from_pointee(manifest),
        }
    }

    pub fn load(&self) -> arc_swap::Guard<Arc<IndexManifest>> {
        self.inner.load()
    }

    pub fn snapshot(&self) -> IndexManifest {
        (**self.inner.load()).clone()
    }

    pub fn store(&self, manifest: IndexManifest) {
        self.inner.store(Arc::new(manifest));
    }

    /// Apply `f` to a copy and return the stored result
    pub fn update<F>(&self, f: F) -> IndexManifest
    where
        F: FnOnce(&mut IndexManifest),
    {
        let mut manifest = self.snapshot();
        f(&mut manifest);
        self.inner.store(Arc::new(manifest.clone()));
        manifest
    }
}

impl Default for ManifestHolder {
    fn default() -> Self {
        Self::new(IndexManifest::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(id: u64, from: DocId, next: DocId) -> ManifestEntry {
        ManifestEntry {
            id: SegmentId::new(id),
            from,
            next,
        }
    }

    #[test]
    fn test_add_segment_keeps_order() {
        let mut manifest = IndexManifest::new();
        manifest.add_segment(entry(1, 10, 20));
        manifest.add_segment(entry(0, 0, 10));

        assert_eq!(manifest.segments[0].id, SegmentId::new(0));
        assert_eq!(manifest.next_segment_id, SegmentId::new(2));
        assert_eq!(manifest.next_doc_id(), 20);
        assert!(manifest.get_segment(SegmentId::new(1)).is_some());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        assert!(IndexManifest::load(dir.path()).unwrap().is_none());

        let mut manifest = IndexManifest::new();
        manifest.add_segment(entry(0, 0, 5));
        manifest.save(dir.path()).unwrap();

        let loaded = IndexManifest::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.segments, manifest.segments);
        assert!(!dir.path().join("segments.manifest.tmp").exists());
    }

    #[test]
    fn test_corrupt_manifest_is_invalid_data() {
        let err = IndexManifest::from_json(b"{not json").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_manifest_holder_update() {
        let holder = ManifestHolder::default();
        assert!(holder.load().is_empty());
        let updated = holder.update(|m| m.add_segment(entry(3, 0, 1)));
        assert_eq!(updated.next_segment_id, SegmentId::new(4));
        assert_eq!(holder.load().segments.len(), 1);
    }
}
