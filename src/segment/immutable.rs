//! Persisted, read-only segment
//!
//! Built once from a sealed [`MutableSegment`]. Monomorphic fields become
//! typed columns, everything else lands in one generic record store, and
//! postings are written under `field + separator + term` keys. Reads go
//! through a size-bounded [`DecodeCache`]; the term dictionary, the deleted
//! set and the rank columns stay in memory.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use super::cache::{CachedValue, DecodeCache};
use super::keys;
use super::mutable::MutableSegment;
use super::postings::Postings;
use super::term_dict::{TermDictionary, TermDictionaryBuilder};
use super::types::{next_instance_id, SegmentId};
use super::{out_of_range, Segment};
use crate::codec::varint::{decode_len, encode_vbyte, read_prefixed, write_prefixed};
use crate::codec::{decode_standalone, RecordStore, Schema};
use crate::columns::{Column, RankColumn};
use crate::docset::DocIdSet;
use crate::error::{QuarryError, Result};
use crate::models::{DocId, Document, Value};
use crate::persistence::{KvPair, KvStore};
use crate::query::{DocComparator, KeySource, SortClause, Term};
use crate::schema::FieldFlags;

/// Where a retained field's values live
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldStore {
    Column { kind: String },
    Generic,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredFieldInfo {
    pub flags: FieldFlags,
    pub store: FieldStore,
    /// A rank column exists for this field
    pub rank: bool,
}

/// Segment metadata, persisted as JSON under the config key
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub version: u32,
    pub id: SegmentId,
    pub from: DocId,
    pub next: DocId,
    pub fields: BTreeMap<String, StoredFieldInfo>,
    pub source_schema: Option<Schema>,
    pub generic_schema: Schema,
    pub source_block_size: usize,
}

impl SegmentConfig {
    pub const VERSION: u32 = 1;

    fn reindex(&mut self) {
        if let Some(schema) = self.source_schema.as_mut() {
            schema.reindex();
        }
        self.generic_schema.reindex();
    }
}

pub struct ImmutableSegment {
    instance: u64,
    config: SegmentConfig,
    store: Arc<dyn KvStore>,
    terms: TermDictionary,
    ranks: HashMap<String, Arc<RankColumn>>,
    deleted: ArcSwap<RoaringBitmap>,
    delete_lock: Mutex<()>,
    cache: DecodeCache,
}

impl ImmutableSegment {
    /// Write a sealed mutable segment into `store` and open the result
    pub fn from_mutable(
        segment: &MutableSegment,
        store: Arc<dyn KvStore>,
        cache_limit: usize,
        source_block_size: usize,
    ) -> Result<Self> {
        let entries = {
            let inner = segment.read();
            if !inner.sealed {
                return Err(QuarryError::Internal(format!(
                    "{} must be sealed before persisting",
                    segment.id()
                )));
            }
            let block_size = source_block_size.max(1);
            let mut entries: Vec<KvPair> = Vec::new();

            // Retained values: typed columns where possible, generic records otherwise
            let docs = (0..inner.stored.len())
                .map(|i| inner.stored.get(i))
                .collect::<Result<Vec<_>>>()?;
            let names: BTreeSet<&String> = docs.iter().flat_map(|d| d.keys()).collect();
            let mut fields = BTreeMap::new();
            let mut generic_fields = BTreeSet::new();
            for name in names {
                let rows: Vec<Option<&Value>> = docs.iter().map(|d| d.get(name)).collect();
                let flags = segment.registry().config(name).flags;
                let store = match Column::build(&rows) {
                    Some(column) => {
                        entries.push((keys::column(name), column.serialize()?));
                        FieldStore::Column {
                            kind: column.kind().to_string(),
                        }
                    }
                    None => {
                        generic_fields.insert(name.clone());
                        FieldStore::Generic
                    }
                };
                let rank = flags.contains(FieldFlags::SORT_OPTIMIZED);
                if rank {
                    entries.push((keys::rank(name), RankColumn::build(&rows).serialize()));
                }
                fields.insert(name.clone(), StoredFieldInfo { flags, store, rank });
            }

            let mut generic = RecordStore::new();
            if !generic_fields.is_empty() {
                for doc in &docs {
                    let partial: Document = doc
                        .iter()
                        .filter(|(name, _)| generic_fields.contains(*name))
                        .map(|(name, value)| (name.clone(), value.clone()))
                        .collect();
                    generic.add(&partial)?;
                }
                entries.push((keys::singleton(keys::GENERIC_POINTERS), generic.encode_pointers()?));
                entries.push((keys::singleton(keys::GENERIC_BUFFER), generic.buffer().to_vec()));
            }

            // Source documents in fixed-size blocks of raw records
            let source_schema = match inner.source.as_ref() {
                Some(source) => {
                    let mut block_no = 0u32;
                    let mut start = 0;
                    while start < source.len() {
                        let end = (start + block_size).min(source.len());
                        let mut block = Vec::new();
                        encode_vbyte((end - start) as u64, &mut block);
                        for i in start..end {
                            let bytes = source.record_bytes(i).ok_or_else(|| {
                                QuarryError::Internal(format!("source record {} missing", i))
                            })?;
                            write_prefixed(bytes, &mut block);
                        }
                        entries.push((keys::source_block(block_no), block));
                        block_no += 1;
                        start = end;
                    }
                    Some(source.schema().clone())
                }
                None => None,
            };

            let mut deleted = Vec::with_capacity(inner.deleted.serialized_size());
            inner.deleted.serialize_into(&mut deleted)?;
            entries.push((keys::singleton(keys::DELETED), deleted));

            let mut dict = TermDictionaryBuilder::new();
            for (field, field_postings) in &inner.postings {
                for (term, postings) in field_postings {
                    dict.add(field, term, postings.len());
                    entries.push((keys::posting_key(field, term), postings.encode()?));
                }
            }
            entries.push((keys::singleton(keys::TERM_DICT), dict.build()?.as_bytes().to_vec()));

            let config = SegmentConfig {
                version: SegmentConfig::VERSION,
                id: segment.id(),
                from: segment.from(),
                next: inner.next,
                fields,
                source_schema,
                generic_schema: generic.schema().clone(),
                source_block_size: block_size,
            };
            entries.push((keys::singleton(keys::CONFIG), serde_json::to_vec(&config)?));
            entries
        };

        let keys_written = entries.len();
        store.write_batch(entries)?;
        store.flush()?;
        debug!(segment = %segment.id(), keys = keys_written, "segment store written");
        Self::open(store, cache_limit)
    }

    /// Open a segment previously written by [`ImmutableSegment::from_mutable`]
    pub fn open(store: Arc<dyn KvStore>, cache_limit: usize) -> Result<Self> {
        let raw = store
            .get(&keys::singleton(keys::CONFIG))?
            .ok_or_else(|| QuarryError::Storage("segment config missing".to_string()))?;
        let mut config: SegmentConfig = serde_json::from_slice(&raw)?;
        if config.version != SegmentConfig::VERSION {
            return Err(QuarryError::Storage(format!(
                "unsupported segment version {}",
                config.version
            )));
        }
        config.reindex();

        let dict = store
            .get(&keys::singleton(keys::TERM_DICT))?
            .ok_or_else(|| QuarryError::Storage("term dictionary missing".to_string()))?;
        let terms = TermDictionary::new(dict)?;

        let deleted = match store.get(&keys::singleton(keys::DELETED))? {
            Some(bytes) => RoaringBitmap::deserialize_from(&bytes[..])?,
            None => RoaringBitmap::new(),
        };

        let mut ranks = HashMap::new();
        for (key, value) in store.scan_prefix(&[keys::RANK])? {
            let name = String::from_utf8(key[1..].to_vec())
                .map_err(|e| QuarryError::Storage(format!("bad rank key: {}", e)))?;
            ranks.insert(name, Arc::new(RankColumn::deserialize(&value)?));
        }

        info!(
            segment = %config.id,
            from = config.from,
            next = config.next,
            terms = terms.len(),
            "opened immutable segment"
        );
        Ok(Self {
            instance: next_instance_id(),
            config,
            store,
            terms,
            ranks,
            deleted: ArcSwap::from_pointee(deleted),
            delete_lock: Mutex::new(()),
            cache: DecodeCache::new(cache_limit),
        })
    }

    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }

    pub fn cache(&self) -> &DecodeCache {
        &self.cache
    }

    pub fn term_dictionary(&self) -> &TermDictionary {
        &self.terms
    }

    /// Mark every id of `ids` inside this segment deleted
    pub fn merge_deleted(&self, ids: &RoaringBitmap) -> Result<u64> {
        let _guard = self.delete_lock.lock();
        let current = self.deleted.load_full();
        let added = ids - &*current;
        if added.is_empty() {
            return Ok(0);
        }
        let merged = &*current | &added;
        self.write_deleted(merged)?;
        Ok(added.len())
    }

    fn write_deleted(&self, deleted: RoaringBitmap) -> Result<()> {
        let mut bytes = Vec::with_capacity(deleted.serialized_size());
        deleted.serialize_into(&mut bytes)?;
        self.store.put(&keys::singleton(keys::DELETED), &bytes)?;
        self.store.flush()?;
        self.deleted.store(Arc::new(deleted));
        Ok(())
    }

    fn index_of(&self, id: DocId) -> Result<u32> {
        if id < self.config.from || id >= self.config.next {
            return Err(out_of_range(self.config.id, id));
        }
        Ok(id - self.config.from)
    }

    fn column(&self, field: &str) -> Result<Option<Arc<Column>>> {
        let key = keys::column(field);
        let loaded = self.cache.get_or_load(&key, || -> Result<Option<CachedValue>> {
            match self.store.get(&key)? {
                Some(bytes) => Ok(Some(CachedValue::Column(Arc::new(Column::deserialize(&bytes)?)))),
                None => Ok(None),
            }
        })?;
        match loaded {
            Some(CachedValue::Column(column)) => Ok(Some(column)),
            Some(_) => Err(cache_mismatch(&key)),
            None => Ok(None),
        }
    }

    fn generic(&self) -> Result<Option<Arc<RecordStore>>> {
        let key = keys::singleton(keys::GENERIC_BUFFER);
        let loaded = self.cache.get_or_load(&key, || -> Result<Option<CachedValue>> {
            let Some(buffer) = self.store.get(&key)? else {
                return Ok(None);
            };
            let pointers = self
                .store
                .get(&keys::singleton(keys::GENERIC_POINTERS))?
                .ok_or_else(|| QuarryError::Storage("generic pointers missing".to_string()))?;
            let store = RecordStore::from_parts(self.config.generic_schema.clone(), buffer, &pointers)?;
            Ok(Some(CachedValue::Generic(Arc::new(store))))
        })?;
        match loaded {
            Some(CachedValue::Generic(store)) => Ok(Some(store)),
            Some(_) => Err(cache_mismatch(&key)),
            None => Ok(None),
        }
    }

    fn source_block(&self, block: u32, schema: &Schema) -> Result<Option<Arc<Vec<Document>>>> {
        let key = keys::source_block(block);
        let loaded = self.cache.get_or_load(&key, || -> Result<Option<CachedValue>> {
            let Some(bytes) = self.store.get(&key)? else {
                return Ok(None);
            };
            let mut pos = 0;
            let count = decode_len(&bytes, &mut pos)?;
            let mut docs = Vec::with_capacity(count);
            for _ in 0..count {
                let record = read_prefixed(&bytes, &mut pos)?;
                docs.push(decode_standalone(schema, record)?);
            }
            Ok(Some(CachedValue::SourceBlock(Arc::new(docs))))
        })?;
        match loaded {
            Some(CachedValue::SourceBlock(docs)) => Ok(Some(docs)),
            Some(_) => Err(cache_mismatch(&key)),
            None => Ok(None),
        }
    }
}

fn cache_mismatch(key: &[u8]) -> QuarryError {
    QuarryError::Internal(format!("decode cache holds wrong kind for key {:?}", key))
}

impl Segment for ImmutableSegment {
    fn id(&self) -> SegmentId {
        self.config.id
    }

    fn instance_id(&self) -> u64 {
        self.instance
    }

    fn from(&self) -> DocId {
        self.config.from
    }

    fn next(&self) -> DocId {
        self.config.next
    }

    fn is_immutable(&self) -> bool {
        true
    }

    fn get(&self, field: &str, term: &Term) -> Result<DocIdSet> {
        if !self.terms.contains(field, term) {
            return Ok(DocIdSet::Empty);
        }
        let key = keys::posting_key(field, term);
        let loaded = self.cache.get_or_load(&key, || -> Result<Option<CachedValue>> {
            match self.store.get(&key)? {
                Some(bytes) => Ok(Some(CachedValue::Postings(Postings::decode(&bytes)?))),
                None => Ok(None),
            }
        })?;
        match loaded {
            Some(CachedValue::Postings(postings)) => Ok(postings.to_doc_set()),
            Some(_) => Err(cache_mismatch(&key)),
            None => Ok(DocIdSet::Empty),
        }
    }

    fn may_match(&self, field: &str, term: &Term) -> Result<bool> {
        Ok(self.terms.contains(field, term))
    }

    fn terms(&self, field: &str) -> Result<Vec<Term>> {
        Ok(self.terms.terms(field))
    }

    fn deleted(&self) -> DocIdSet {
        DocIdSet::from_shared(self.deleted.load_full())
    }

    fn add_to_deleted(&self, id: DocId) -> Result<bool> {
        self.index_of(id)?;
        let _guard = self.delete_lock.lock();
        let current = self.deleted.load_full();
        if current.contains(id) {
            return Ok(false);
        }
        let mut updated = (*current).clone();
        updated.insert(id);
        self.write_deleted(updated)?;
        Ok(true)
    }

    fn source(&self, id: DocId) -> Result<Option<Document>> {
        let index = self.index_of(id)? as usize;
        let Some(schema) = self.config.source_schema.as_ref() else {
            return Ok(None);
        };
        let block_size = self.config.source_block_size;
        let block = (index / block_size) as u32;
        Ok(self
            .source_block(block, schema)?
            .and_then(|docs| docs.get(index % block_size).cloned()))
    }

    fn project(&self, ids: &[DocId], fields: &[String]) -> Result<Vec<Document>> {
        let mut columns = Vec::with_capacity(fields.len());
        let mut needs_generic = false;
        for field in fields {
            let column = match self.config.fields.get(field).map(|info| &info.store) {
                Some(FieldStore::Column { .. }) => self.column(field)?,
                Some(FieldStore::Generic) => {
                    needs_generic = true;
                    None
                }
                None => None,
            };
            columns.push(column);
        }
        let generic = if needs_generic { self.generic()? } else { None };

        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            let index = self.index_of(id)?;
            let mut generic_doc = match generic.as_ref() {
                Some(store) => Some(store.get(index as usize)?),
                None => None,
            };
            let mut partial = Document::new();
            for (field, column) in fields.iter().zip(&columns) {
                let value = match column {
                    Some(column) => column.get(index),
                    None => generic_doc.as_mut().and_then(|doc| doc.remove(field)),
                };
                if let Some(value) = value {
                    partial.insert(field.clone(), value);
                }
            }
            out.push(partial);
        }
        Ok(out)
    }

    fn build_comparator(&self, clauses: &[SortClause]) -> Result<(DocComparator, Vec<String>)> {
        let sources = clauses
            .iter()
            .map(|clause| match self.ranks.get(&clause.field) {
                Some(column) => KeySource::Rank {
                    column: column.clone(),
                    base: self.config.from,
                },
                None => KeySource::Stored,
            })
            .collect();
        let fields = clauses.iter().map(|c| c.field.clone()).collect();
        Ok((DocComparator::new(clauses.to_vec(), sources), fields))
    }
}

impl std::fmt::Debug for ImmutableSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImmutableSegment")
            .field("id", &self.config.id)
            .field("from", &self.config.from)
            .field("next", &self.config.next)
            .field("fields", &self.config.fields.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::query::ast::term;
    use crate::query::Query;
    use crate::schema::{FieldConfig, FieldRegistry, ALL_FIELD};
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Document {
        Document::from_json(v).unwrap()
    }

    fn registry() -> Arc<FieldRegistry> {
        Arc::new(FieldRegistry::default().with_field(
            "price",
            FieldConfig::new(FieldFlags::SEARCHABLE | FieldFlags::SORT_OPTIMIZED),
        ))
    }

    fn build(docs: Vec<serde_json::Value>, block_size: usize) -> (MutableSegment, ImmutableSegment) {
        let mutable = MutableSegment::new(SegmentId(2), 10, registry(), true);
        let docs: Vec<Document> = docs.into_iter().map(doc).collect();
        mutable.add(&docs).unwrap();
        mutable.seal();
        let store = Arc::new(MemoryStore::new());
        let immutable = ImmutableSegment::from_mutable(&mutable, store, 1 << 20, block_size).unwrap();
        (mutable, immutable)
    }

    fn sample() -> Vec<serde_json::Value> {
        vec![
            json!({"name": "ann", "price": 30, "tags": ["a", "b"]}),
            json!({"name": "bob", "price": 10, "mixed": 1}),
            json!({"name": "cy", "mixed": "one"}),
        ]
    }

    fn lookup(segment: &dyn Segment, field: &str, value: Value) -> Vec<DocId> {
        let Query::Term { term, .. } = term(field, value) else {
            panic!("expected a single term");
        };
        segment.get(field, &term).unwrap().to_vec()
    }

    #[test]
    fn test_postings_match_mutable() {
        let (mutable, immutable) = build(sample(), 2);
        for (field, value) in [
            ("name", Value::from("bob")),
            ("tags", Value::from("a")),
            (ALL_FIELD, Value::from("cy")),
        ] {
            assert_eq!(lookup(&mutable, field, value.clone()), lookup(&immutable, field, value));
        }
        assert_eq!(immutable.from(), 10);
        assert_eq!(immutable.next(), 13);
        assert!(lookup(&immutable, "name", Value::from("zed")).is_empty());
        assert_eq!(immutable.terms("name").unwrap(), mutable.terms("name").unwrap());
    }

    #[test]
    fn test_field_store_selection() {
        let (_, immutable) = build(sample(), 2);
        let fields = &immutable.config().fields;
        assert!(matches!(fields["name"].store, FieldStore::Column { .. }));
        assert_eq!(fields["mixed"].store, FieldStore::Generic);
        assert!(fields["price"].rank);
    }

    #[test]
    fn test_project_and_source_across_blocks() {
        let (mutable, immutable) = build(sample(), 2);
        let fields = vec!["name".to_string(), "mixed".to_string(), "tags".to_string()];
        let ids = [10, 11, 12];
        assert_eq!(
            immutable.project(&ids, &fields).unwrap(),
            mutable.project(&ids, &fields).unwrap()
        );
        for id in ids {
            assert_eq!(immutable.source(id).unwrap(), mutable.source(id).unwrap());
        }
        assert!(immutable.source(13).is_err());
    }

    #[test]
    fn test_rank_comparator() {
        let (_, immutable) = build(sample(), 2);
        let (comparator, fields) = immutable.build_comparator(&[SortClause::asc("price")]).unwrap();
        assert_eq!(fields, vec!["price".to_string()]);
        let sorted = comparator.sort(&immutable, [10, 11, 12], None).unwrap();
        assert_eq!(sorted, vec![11, 10, 12]);
    }

    #[test]
    fn test_deletes_persist_in_store() {
        let store = Arc::new(MemoryStore::new());
        let mutable = MutableSegment::new(SegmentId(0), 0, registry(), false);
        mutable.add(&[doc(json!({"a": 1})), doc(json!({"a": 2}))]).unwrap();
        mutable.add_to_deleted(0).unwrap();
        mutable.seal();
        let immutable = ImmutableSegment::from_mutable(&mutable, store.clone(), 1024, 8).unwrap();
        assert_eq!(immutable.deleted().to_vec(), vec![0]);

        assert!(immutable.add_to_deleted(1).unwrap());
        assert!(!immutable.add_to_deleted(1).unwrap());
        let reopened = ImmutableSegment::open(store, 1024).unwrap();
        assert_eq!(reopened.deleted().to_vec(), vec![0, 1]);
        assert_ne!(reopened.instance_id(), immutable.instance_id());
        assert_eq!(reopened.source(0).unwrap(), None);
    }

    #[test]
    fn test_requires_sealed_segment() {
        let mutable = MutableSegment::new(SegmentId(0), 0, registry(), false);
        let store = Arc::new(MemoryStore::new());
        assert!(ImmutableSegment::from_mutable(&mutable, store, 1024, 8).is_err());
    }
}
