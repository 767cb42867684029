use serde::{Deserialize, Serialize};

use super::document::{DocId, Document};
use crate::segment::SegmentId;

/// Which documents a query observes relative to the moment it starts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryMode {
    /// Only documents present when the query starts
    #[default]
    Current,
    /// Present documents, then every document added afterwards
    CurrentAndFuture,
    /// Only documents added after the query starts
    Future,
}

impl QueryMode {
    pub fn includes_current(self) -> bool {
        matches!(self, QueryMode::Current | QueryMode::CurrentAndFuture)
    }

    pub fn includes_future(self) -> bool {
        matches!(self, QueryMode::CurrentAndFuture | QueryMode::Future)
    }
}

/// A single query result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    pub doc_id: DocId,
    /// Original source document, when requested and retained
    pub source: Option<Document>,
    /// Explicitly requested stored fields
    pub fields: Option<Document>,
}

impl ResultItem {
    pub fn new(doc_id: DocId) -> Self {
        Self {
            doc_id,
            source: None,
            fields: None,
        }
    }

    /// Requested stored field value, if projected
    pub fn field(&self, name: &str) -> Option<&super::Value> {
        self.fields.as_ref().and_then(|f| f.get(name))
    }
}

/// Per-segment statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmentStats {
    pub id: SegmentId,
    pub immutable: bool,
    pub from: DocId,
    pub next: DocId,
    pub deleted: u64,
}

/// Index-wide statistics
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub segments: Vec<SegmentStats>,
}

impl IndexStats {
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn immutable_count(&self) -> usize {
        self.segments.iter().filter(|s| s.immutable).count()
    }

    pub fn total_docs(&self) -> u64 {
        self.segments.iter().map(|s| (s.next - s.from) as u64).sum()
    }

    pub fn deleted_docs(&self) -> u64 {
        self.segments.iter().map(|s| s.deleted).sum()
    }

    pub fn live_docs(&self) -> u64 {
        self.total_docs() - self.deleted_docs()
    }
}
