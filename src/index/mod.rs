//! Index coordinator
//!
//! Owns the segment list: a set of sealed segments (persisted, or mutable
//! ones still waiting on the persistence worker) followed by the current
//! mutable segment that receives new documents. Doc ids are assigned densely
//! across the whole index, so every segment covers a contiguous range.
//!
//! Queries copy the segment list under a short read lock and resolve against
//! that copy, so rotation never waits on a slow query. Ingestion is
//! serialized; it only takes the segment-list lock to rotate.

mod events;
mod persister;
mod stream;

pub use stream::QueryStream;

use std::collections::BTreeMap;
use std::sync::Arc;

use crossbeam::channel::{bounded, unbounded, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::aggregation::{aggregate, AggregationResult, AggregationSpec};
use crate::config::IndexSettings;
use crate::docset::DocIdSet;
use crate::error::{QuarryError, Result};
use crate::models::{DocId, Document, IndexStats, ResultItem, SegmentStats};
use crate::persistence::StoreProvider;
use crate::query::{and, resolve, rewrite, term, Query, QueryRequest};
use crate::schema::{FieldConfig, FieldRegistry};
use crate::segment::{ImmutableSegment, MutableSegment, Segment, SegmentId, SegmentRef};
use events::{EventBus, IndexEvent};
use persister::{spawn_persister, PersistOp, PersisterHandles};
use stream::StreamParts;

pub(crate) struct IndexState {
    pub(crate) current: Arc<MutableSegment>,
    /// Older segments in doc-id order
    pub(crate) sealed: Vec<SegmentRef>,
    next_segment: SegmentId,
}

/// State shared with the persistence worker
pub(crate) struct Shared {
    pub(crate) settings: IndexSettings,
    pub(crate) registry: Arc<FieldRegistry>,
    pub(crate) provider: StoreProvider,
    pub(crate) state: RwLock<IndexState>,
    events: EventBus,
}

/// Segments and the doc-id watermark captured at one instant
struct Snapshot {
    segments: Vec<SegmentRef>,
    watermark: DocId,
}

impl Shared {
    fn snapshot(&self) -> Snapshot {
        let state = self.state.read();
        let mut segments = state.sealed.clone();
        let watermark = state.current.next();
        segments.push(state.current.clone());
        Snapshot { segments, watermark }
    }
}

/// An embedded document index
pub struct Index {
    shared: Arc<Shared>,
    /// Serializes ingestion, rotation and commit
    ingest: Mutex<()>,
    persister: Option<PersisterHandles>,
}

impl Index {
    /// Index with the default field configuration
    pub fn new(settings: IndexSettings) -> Result<Self> {
        Self::open(settings, FieldRegistry::default())
    }

    /// Open an index. With a data directory, every segment recorded in the
    /// manifest is loaded and new doc ids continue after the last of them.
    pub fn open(settings: IndexSettings, registry: FieldRegistry) -> Result<Self> {
        let registry = Arc::new(registry);
        let provider = match &settings.data_dir {
            Some(dir) => StoreProvider::fjall(dir)?,
            None => StoreProvider::memory(),
        };

        let manifest = provider.manifest();
        let mut sealed: Vec<SegmentRef> = Vec::with_capacity(manifest.segments.len());
        for entry in &manifest.segments {
            let store = provider.open(entry.id)?;
            let segment = ImmutableSegment::open(store, settings.cache_size_bytes)?;
            for name in segment.config().fields.keys() {
                if !registry.is_declared(name) {
                    registry.observe(name);
                }
            }
            sealed.push(Arc::new(segment));
        }
        let next_segment = manifest.next_segment_id;
        let current = Arc::new(MutableSegment::new(
            next_segment,
            manifest.next_doc_id(),
            registry.clone(),
            settings.store_source,
        ));
        if !sealed.is_empty() {
            info!(
                segments = sealed.len(),
                next_doc = manifest.next_doc_id(),
                "reopened index"
            );
        }

        let shared = Arc::new(Shared {
            settings,
            registry,
            provider,
            state: RwLock::new(IndexState {
                current,
                sealed,
                next_segment: next_segment.next(),
            }),
            events: EventBus::default(),
        });
        let (tx, rx) = unbounded();
        let persister = spawn_persister(tx, rx, shared.clone())?;
        Ok(Self {
            shared,
            ingest: Mutex::new(()),
            persister: Some(persister),
        })
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.shared.settings
    }

    pub fn registry(&self) -> &Arc<FieldRegistry> {
        &self.shared.registry
    }

    pub fn add(&self, doc: Document) -> Result<usize> {
        self.add_all(std::iter::once(doc))
    }

    pub fn add_json(&self, json: serde_json::Value) -> Result<usize> {
        self.add(Document::from_json(json)?)
    }

    /// Add documents in batches of `batch_size`, rotating the current segment
    /// whenever it reaches `max_segment_docs`. Returns the number added; on
    /// error the documents before the failing one stay added.
    pub fn add_all<I>(&self, docs: I) -> Result<usize>
    where
        I: IntoIterator<Item = Document>,
    {
        let _ingest = self.ingest.lock();
        let batch_size = self.shared.settings.batch_size.max(1);
        let mut docs = docs.into_iter().peekable();
        let mut added = 0;
        let mut batch = Vec::with_capacity(batch_size);
        while docs.peek().is_some() {
            let current = self.shared.state.read().current.clone();
            let room = match self.shared.settings.max_segment_docs {
                Some(max) => {
                    let held = current.doc_count() as usize;
                    if held >= max {
                        self.rotate_and_schedule(None)?;
                        continue;
                    }
                    (max - held).min(batch_size)
                }
                None => batch_size,
            };

            batch.clear();
            batch.extend(docs.by_ref().take(room));
            let from = current.next();
            let result = current.add(&batch);
            let to = current.next();
            if to > from {
                added += (to - from) as usize;
                self.shared.events.publish(IndexEvent::Appended {
                    segment: current.clone(),
                    from,
                    to,
                });
            }
            result?;
        }
        Ok(added)
    }

    /// Seal the current segment and persist it. With `sync` the call returns
    /// once the segment is persisted and every earlier persistence job is
    /// done; otherwise persistence runs in the background.
    pub fn commit(&self, sync: bool) -> Result<()> {
        let (done_tx, done_rx) = bounded(1);
        {
            let _ingest = self.ingest.lock();
            let done = sync.then_some(done_tx);
            if self.shared.state.read().current.doc_count() == 0 {
                if let Some(done) = done {
                    self.send(PersistOp::Barrier { done })?;
                }
            } else {
                self.rotate_and_schedule(done)?;
            }
        }
        if sync {
            done_rx.recv().map_err(|_| QuarryError::Closed)??;
        }
        Ok(())
    }

    fn send(&self, op: PersistOp) -> Result<()> {
        let persister = self.persister.as_ref().ok_or(QuarryError::Closed)?;
        persister.tx.send(op).map_err(|_| QuarryError::Closed)
    }

    /// Swap in a fresh current segment and queue the old one for persistence.
    /// Callers hold the ingest lock.
    fn rotate_and_schedule(&self, done: Option<Sender<Result<()>>>) -> Result<()> {
        let retired = {
            let mut state = self.shared.state.write();
            let retired = state.current.clone();
            retired.seal();
            let id = state.next_segment;
            state.next_segment = id.next();
            state.current = Arc::new(MutableSegment::new(
                id,
                retired.next(),
                self.shared.registry.clone(),
                self.shared.settings.store_source,
            ));
            state.sealed.push(retired.clone());
            retired
        };
        info!(
            segment = %retired.id(),
            docs = retired.doc_count(),
            next_doc = retired.next(),
            "rotated segment"
        );
        self.send(PersistOp::Persist {
            segment: retired,
            done,
        })
    }

    /// Mark a document deleted. Returns false for unknown or already deleted ids.
    pub fn delete(&self, id: DocId) -> Result<bool> {
        let state = self.shared.state.read();
        if state.current.contains(id) {
            return state.current.add_to_deleted(id);
        }
        let position = state.sealed.partition_point(|s| s.next() <= id);
        match state.sealed.get(position) {
            Some(segment) if segment.contains(id) => segment.add_to_deleted(id),
            _ => Ok(false),
        }
    }

    /// Run a query. The stream is lazy: segments are resolved as results are
    /// pulled, and dropping it cancels the query.
    pub fn query(&self, request: impl Into<QueryRequest>) -> Result<QueryStream> {
        let request = request.into();
        request.validate(&self.shared.registry)?;
        let query = rewrite(request.query);

        // subscribe before the snapshot so no append falls between the two
        let events = request
            .mode
            .includes_future()
            .then(|| self.shared.events.subscribe());
        let snapshot = self.shared.snapshot();
        debug!(
            segments = snapshot.segments.len(),
            watermark = snapshot.watermark,
            mode = ?request.mode,
            sorted = !request.sort.is_empty(),
            "query fan-out"
        );

        QueryStream::new(StreamParts {
            query,
            sort: request.sort,
            fields: request.fields,
            include_source: request.include_source,
            limit: request.limit,
            timeout: request.timeout.or(self.shared.settings.query_timeout),
            segments: snapshot.segments,
            watermark: snapshot.watermark,
            include_current: request.mode.includes_current(),
            events,
        })
    }

    /// Collect every result of a query
    pub fn search(&self, request: impl Into<QueryRequest>) -> Result<Vec<ResultItem>> {
        self.query(request)?.collect()
    }

    /// Run aggregations over the documents matching `query`, one result per spec
    pub fn aggregate_query(&self, query: Query, specs: &[AggregationSpec]) -> Result<Vec<AggregationResult>> {
        for spec in specs {
            spec.validate(&self.shared.registry)?;
        }
        let query = rewrite(query);
        let snapshot = self.shared.snapshot();
        debug!(
            segments = snapshot.segments.len(),
            aggregations = specs.len(),
            "aggregation fan-out"
        );
        let mut matches: Vec<(SegmentRef, DocIdSet)> = Vec::with_capacity(snapshot.segments.len());
        for segment in snapshot.segments {
            let set = resolve(&query, segment.as_ref(), snapshot.watermark)?;
            matches.push((segment, set));
        }
        aggregate(specs, &matches)
    }

    /// Query matching every token of `text` under the field's analyzer. Fields
    /// without an analyzer match the whole string.
    pub fn match_text(&self, field: &str, text: &str) -> Query {
        match self.shared.registry.config(field).analyzer.as_ref() {
            Some(analyzer) => and(analyzer.analyze(text).into_iter().map(|t| term(field, t)).collect()),
            None => term(field, text),
        }
    }

    pub fn list_all_known_fields(&self) -> BTreeMap<String, FieldConfig> {
        self.shared.registry.list_all_known_fields()
    }

    pub fn stats(&self) -> IndexStats {
        let snapshot = self.shared.snapshot();
        let segments = snapshot
            .segments
            .iter()
            .map(|s| SegmentStats {
                id: s.id(),
                immutable: s.is_immutable(),
                from: s.from(),
                next: s.next(),
                deleted: s.deleted().count(),
            })
            .collect();
        IndexStats { segments }
    }

    /// Make the next `n` segment stores fail their bulk write
    #[cfg(any(test, feature = "testing"))]
    pub fn inject_persist_failures(&self, n: u32) {
        self.shared.provider.inject_write_failures(n);
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if let Some(PersisterHandles { tx, join }) = self.persister.take() {
            // queued jobs drain before the worker sees the disconnect
            drop(tx);
            let _ = join.join();
        }
    }
}
