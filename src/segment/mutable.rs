//! In-memory write segment
//!
//! Documents are appended in doc-id order. Ingestion is serialized by the
//! index; the inner lock only lets readers run next to the single writer.

use parking_lot::{RwLock, RwLockReadGuard};
use roaring::RoaringBitmap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::postings::Postings;
use super::types::{next_instance_id, SegmentId};
use super::{out_of_range, Segment};
use crate::codec::RecordStore;
use crate::docset::DocIdSet;
use crate::error::{QuarryError, Result};
use crate::models::{DocId, Document, Value};
use crate::query::{terms, DocComparator, KeySource, SortClause, Term};
use crate::schema::{FieldConfig, FieldFlags, FieldRegistry, ALL_FIELD, FIELDS_PRESENT};

pub struct MutableSegment {
    id: SegmentId,
    instance: u64,
    from: DocId,
    registry: Arc<FieldRegistry>,
    inner: RwLock<MutableInner>,
}

pub(crate) struct MutableInner {
    pub(crate) next: DocId,
    pub(crate) postings: HashMap<String, BTreeMap<Term, Postings>>,
    /// Retained (stored or sort-optimized) values, one record per doc
    pub(crate) stored: RecordStore,
    pub(crate) source: Option<RecordStore>,
    pub(crate) deleted: Arc<RoaringBitmap>,
    pub(crate) sealed: bool,
}

impl MutableSegment {
    pub fn new(id: SegmentId, from: DocId, registry: Arc<FieldRegistry>, store_source: bool) -> Self {
        Self {
            id,
            instance: next_instance_id(),
            from,
            registry,
            inner: RwLock::new(MutableInner {
                next: from,
                postings: HashMap::new(),
                stored: RecordStore::new(),
                source: store_source.then(RecordStore::new),
                deleted: Arc::new(RoaringBitmap::new()),
                sealed: false,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<FieldRegistry> {
        &self.registry
    }

    pub fn stores_source(&self) -> bool {
        self.inner.read().source.is_some()
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.read().sealed
    }

    /// Stop accepting documents
    pub fn seal(&self) {
        self.inner.write().sealed = true;
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, MutableInner> {
        self.inner.read()
    }

    /// Append documents. On a codec failure the failing document is rolled
    /// back and the error returned; documents before it stay added.
    pub fn add(&self, docs: &[Document]) -> Result<usize> {
        let mut inner = self.inner.write();
        if inner.sealed {
            return Err(QuarryError::Internal(format!("{} is sealed", self.id)));
        }
        let mut added = 0;
        for doc in docs {
            self.add_one(&mut inner, doc)?;
            added += 1;
        }
        debug!(segment = %self.id, docs = added, next = inner.next, "documents added");
        Ok(added)
    }

    fn add_one(&self, inner: &mut MutableInner, doc: &Document) -> Result<()> {
        let generated = self.apply_generators(doc);
        let doc = generated.as_ref().unwrap_or(doc);
        let id = inner.next;
        if id == DocId::MAX {
            return Err(QuarryError::Internal("doc id space exhausted".to_string()));
        }

        let flat = doc.flatten();
        let mut retained = Document::new();
        for (path, value) in &flat {
            if self.registry.resolve(path).flags.is_retained() {
                retained.insert(path.clone(), value.clone());
            }
        }

        let source_len = inner.source.as_ref().map(RecordStore::len);
        if let Some(source) = inner.source.as_mut() {
            source.add(doc)?;
        }
        if let Err(e) = inner.stored.add(&retained) {
            if let (Some(source), Some(len)) = (inner.source.as_mut(), source_len) {
                source.truncate(len);
            }
            return Err(e);
        }

        for (path, value) in &flat {
            if is_empty_value(value) {
                continue;
            }
            add_posting(&mut inner.postings, FIELDS_PRESENT, Term::string(path), id);
            let config = self.registry.config(path);
            if !config.is_searchable() {
                continue;
            }
            let field_terms = field_terms(config, value);
            if config.flags.contains(FieldFlags::IN_ALL) {
                for term in &field_terms {
                    add_posting(&mut inner.postings, ALL_FIELD, term.clone(), id);
                }
            }
            for term in field_terms {
                add_posting(&mut inner.postings, path, term, id);
            }
        }

        inner.next = id + 1;
        Ok(())
    }

    fn apply_generators(&self, doc: &Document) -> Option<Document> {
        let mut generated: Option<Document> = None;
        for (name, generator) in self.registry.generators() {
            if let Some(value) = generator(doc) {
                generated
                    .get_or_insert_with(|| doc.clone())
                    .insert(name.clone(), value);
            }
        }
        generated
    }

    fn doc_index(&self, inner: &MutableInner, id: DocId) -> Result<usize> {
        if id < self.from || id >= inner.next {
            return Err(out_of_range(self.id, id));
        }
        Ok((id - self.from) as usize)
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn add_posting(
    postings: &mut HashMap<String, BTreeMap<Term, Postings>>,
    field: &str,
    term: Term,
    id: DocId,
) {
    if !postings.contains_key(field) {
        postings.insert(field.to_string(), BTreeMap::new());
    }
    if let Some(field_postings) = postings.get_mut(field) {
        field_postings
            .entry(term)
            .and_modify(|p| p.insert(id))
            .or_insert(Postings::Single(id));
    }
}

/// Terms a field value is indexed under: analyzer tokens for strings when the
/// field has an analyzer, the plain value encoding otherwise.
pub(crate) fn field_terms(config: &FieldConfig, value: &Value) -> Vec<Term> {
    let Some(analyzer) = config.analyzer.as_ref() else {
        return terms::value_terms(value);
    };
    let mut out = Vec::new();
    let mut push = |v: &Value| match v {
        Value::String(s) => out.extend(analyzer.analyze(s).iter().map(|t| Term::string(t))),
        other => out.extend(terms::value_terms(other)),
    };
    match value {
        Value::Array(items) => items.iter().for_each(&mut push),
        other => push(other),
    }
    out
}

impl Segment for MutableSegment {
    fn id(&self) -> SegmentId {
        self.id
    }

    fn instance_id(&self) -> u64 {
        self.instance
    }

    fn from(&self) -> DocId {
        self.from
    }

    fn next(&self) -> DocId {
        self.inner.read().next
    }

    fn is_immutable(&self) -> bool {
        false
    }

    fn get(&self, field: &str, term: &Term) -> Result<DocIdSet> {
        let inner = self.inner.read();
        Ok(inner
            .postings
            .get(field)
            .and_then(|terms| terms.get(term))
            .map_or(DocIdSet::Empty, Postings::to_doc_set))
    }

    fn may_match(&self, field: &str, term: &Term) -> Result<bool> {
        let inner = self.inner.read();
        Ok(inner
            .postings
            .get(field)
            .map_or(false, |terms| terms.contains_key(term)))
    }

    fn terms(&self, field: &str) -> Result<Vec<Term>> {
        let inner = self.inner.read();
        Ok(inner
            .postings
            .get(field)
            .map(|terms| terms.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn deleted(&self) -> DocIdSet {
        DocIdSet::from_shared(self.inner.read().deleted.clone())
    }

    fn add_to_deleted(&self, id: DocId) -> Result<bool> {
        let mut inner = self.inner.write();
        self.doc_index(&inner, id)?;
        Ok(Arc::make_mut(&mut inner.deleted).insert(id))
    }

    fn source(&self, id: DocId) -> Result<Option<Document>> {
        let inner = self.inner.read();
        let index = self.doc_index(&inner, id)?;
        match inner.source.as_ref() {
            Some(source) => Ok(Some(source.get(index)?)),
            None => Ok(None),
        }
    }

    fn project(&self, ids: &[DocId], fields: &[String]) -> Result<Vec<Document>> {
        let inner = self.inner.read();
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            let index = self.doc_index(&inner, id)?;
            let mut stored = inner.stored.get(index)?;
            let mut partial = Document::new();
            for field in fields {
                if let Some(value) = stored.remove(field) {
                    partial.insert(field.clone(), value);
                }
            }
            out.push(partial);
        }
        Ok(out)
    }

    fn build_comparator(&self, clauses: &[SortClause]) -> Result<(DocComparator, Vec<String>)> {
        let sources = clauses.iter().map(|_| KeySource::Stored).collect();
        let fields = clauses.iter().map(|c| c.field.clone()).collect();
        Ok((DocComparator::new(clauses.to_vec(), sources), fields))
    }
}

impl std::fmt::Debug for MutableSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("MutableSegment")
            .field("id", &self.id)
            .field("from", &self.from)
            .field("next", &inner.next)
            .field("sealed", &inner.sealed)
            .finish()
    }
}
