//! Segments
//!
//! A segment owns a contiguous doc-id range `[from, next)` with its postings,
//! retained field values, optional source documents, and deleted set.
//!
//! - [`MutableSegment`]: in-memory, append-only, the ingestion target
//! - [`ImmutableSegment`]: built once from a sealed mutable segment and read
//!   from an ordered key-value store through a bounded decode cache
//!
//! Both are used through the [`Segment`] trait.

mod cache;
mod immutable;
pub mod keys;
mod mutable;
mod postings;
mod term_dict;
mod types;

pub use cache::{CachedValue, DecodeCache};
pub use immutable::{FieldStore, ImmutableSegment, SegmentConfig, StoredFieldInfo};
pub use mutable::MutableSegment;
pub use postings::Postings;
pub use term_dict::{TermDictionary, TermDictionaryBuilder};
pub use types::SegmentId;
pub(crate) use types::next_instance_id;

use std::sync::Arc;

use crate::docset::DocIdSet;
use crate::error::{QuarryError, Result};
use crate::models::{DocId, Document, Value};
use crate::query::{DocComparator, SortClause, Term};

/// Shared handle to a segment of either kind
pub type SegmentRef = Arc<dyn Segment>;

pub trait Segment: Send + Sync {
    fn id(&self) -> SegmentId;

    /// Identity of this in-memory object, distinct across rebuilds
    fn instance_id(&self) -> u64;

    /// First doc id of the segment
    fn from(&self) -> DocId;

    /// One past the last assigned doc id
    fn next(&self) -> DocId;

    fn is_immutable(&self) -> bool;

    /// Postings for a term. Unknown terms give an empty set.
    fn get(&self, field: &str, term: &Term) -> Result<DocIdSet>;

    /// Cheap existence probe for a term
    fn may_match(&self, field: &str, term: &Term) -> Result<bool>;

    /// Terms of one field in ascending order
    fn terms(&self, field: &str) -> Result<Vec<Term>>;

    fn deleted(&self) -> DocIdSet;

    /// Mark a doc deleted. Returns false if it was already deleted.
    fn add_to_deleted(&self, id: DocId) -> Result<bool>;

    /// Original document, when sources are stored
    fn source(&self, id: DocId) -> Result<Option<Document>>;

    /// Retained values of `fields` for each id, in input order. Fields the
    /// doc has no value for are left out of its partial document.
    fn project(&self, ids: &[DocId], fields: &[String]) -> Result<Vec<Document>>;

    /// Comparator for `clauses` plus the fields a cross-segment merge needs
    fn build_comparator(&self, clauses: &[SortClause]) -> Result<(DocComparator, Vec<String>)>;

    fn contains(&self, id: DocId) -> bool {
        self.from() <= id && id < self.next()
    }

    fn doc_count(&self) -> u64 {
        (self.next() - self.from()) as u64
    }

    /// One retained value
    fn stored_value(&self, id: DocId, field: &str) -> Result<Option<Value>> {
        let mut docs = self.project(&[id], &[field.to_string()])?;
        Ok(docs.pop().and_then(|mut doc| doc.remove(field)))
    }
}

pub(crate) fn out_of_range(segment: SegmentId, id: DocId) -> QuarryError {
    QuarryError::Internal(format!("doc {} is outside {}", id, segment))
}
