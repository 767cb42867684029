//! Named filters that memoize their resolved doc-id set per segment

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::ast::Query;
use crate::docset::DocIdSet;
use crate::error::Result;
use crate::models::DocId;
use crate::segment::SegmentId;

const DEFAULT_CAPACITY: usize = 256;

/// The set resolved for one segment. A hit needs the same segment instance
/// and upper doc id: a mutable segment that grew, or was replaced by its
/// persisted form, misses and overwrites the entry.
struct Entry {
    instance: u64,
    upper: DocId,
    set: DocIdSet,
    tick: u64,
}

#[derive(Default)]
struct Entries {
    by_segment: HashMap<SegmentId, Entry>,
    order: BTreeMap<u64, SegmentId>,
    tick: u64,
}

impl Entries {
    fn get(&mut self, segment: SegmentId, instance: u64, upper: DocId) -> Option<DocIdSet> {
        self.tick += 1;
        let tick = self.tick;
        let entry = self.by_segment.get_mut(&segment)?;
        if entry.instance != instance || entry.upper != upper {
            return None;
        }
        self.order.remove(&entry.tick);
        entry.tick = tick;
        self.order.insert(tick, segment);
        Some(entry.set.clone())
    }

    fn insert(&mut self, segment: SegmentId, instance: u64, upper: DocId, set: DocIdSet, capacity: usize) {
        self.tick += 1;
        let tick = self.tick;
        let entry = Entry { instance, upper, set, tick };
        if let Some(old) = self.by_segment.insert(segment, entry) {
            self.order.remove(&old.tick);
        }
        self.order.insert(tick, segment);
        while self.by_segment.len() > capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.by_segment.remove(&oldest);
        }
    }
}

/// A shared sub-expression whose result is cached per segment.
///
/// Filters compare by identity: two filters built from equal queries are
/// still distinct cache owners. At most `capacity` segments are cached; the
/// least recently used one goes first.
#[derive(Clone)]
pub struct CachedFilter(Arc<FilterInner>);

struct FilterInner {
    name: String,
    query: Query,
    capacity: usize,
    entries: Mutex<Entries>,
}

impl CachedFilter {
    pub fn new(name: impl Into<String>, query: Query) -> Self {
        Self::with_capacity(name, query, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(name: impl Into<String>, query: Query, capacity: usize) -> Self {
        CachedFilter(Arc::new(FilterInner {
            name: name.into(),
            query,
            capacity: capacity.max(1),
            entries: Mutex::new(Entries::default()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn query(&self) -> &Query {
        &self.0.query
    }

    /// Wrap into a query node
    pub fn to_query(&self) -> Query {
        Query::Cached(self.clone())
    }

    pub fn cached_segments(&self) -> usize {
        self.0.entries.lock().by_segment.len()
    }

    /// Cached set for the segment, resolving with `resolve` on a miss.
    /// Resolution runs outside the lock; a racing miss just resolves twice.
    pub(crate) fn get_or_resolve<F>(
        &self,
        segment: SegmentId,
        instance: u64,
        upper: DocId,
        resolve: F,
    ) -> Result<DocIdSet>
    where
        F: FnOnce(&Query) -> Result<DocIdSet>,
    {
        if let Some(hit) = self.0.entries.lock().get(segment, instance, upper) {
            return Ok(hit);
        }

        let resolved = resolve(&self.0.query)?;
        let resolved = if resolved.is_eager() {
            resolved
        } else {
            DocIdSet::from_bitmap(resolved.materialize())
        };

        self.0
            .entries
            .lock()
            .insert(segment, instance, upper, resolved.clone(), self.0.capacity);
        Ok(resolved)
    }
}

impl PartialEq for CachedFilter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for CachedFilter {}

impl Hash for CachedFilter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl std::fmt::Debug for CachedFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedFilter")
            .field("name", &self.0.name)
            .field("query", &self.0.query)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_memoizes_per_segment_state() {
        let filter = CachedFilter::new("everything", Query::All);
        let seg = SegmentId::new(0);
        let calls = Cell::new(0);
        let resolve = |_: &Query| {
            calls.set(calls.get() + 1);
            Ok(DocIdSet::range(0, 10))
        };

        filter.get_or_resolve(seg, 1, 10, resolve).unwrap();
        filter.get_or_resolve(seg, 1, 10, resolve).unwrap();
        assert_eq!(calls.get(), 1);

        // grown segment
        filter.get_or_resolve(seg, 1, 12, resolve).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(filter.cached_segments(), 1);

        filter.get_or_resolve(SegmentId::new(1), 2, 5, resolve).unwrap();
        assert_eq!(filter.cached_segments(), 2);
    }

    #[test]
    fn test_replaced_segment_instance_overwrites_entry() {
        let filter = CachedFilter::new("everything", Query::All);
        let seg = SegmentId::new(3);
        let calls = Cell::new(0);
        let resolve = |_: &Query| {
            calls.set(calls.get() + 1);
            Ok(DocIdSet::range(0, 4))
        };

        filter.get_or_resolve(seg, 7, 4, resolve).unwrap();
        // same segment, now persisted under a new instance
        filter.get_or_resolve(seg, 8, 4, resolve).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(filter.cached_segments(), 1);
        filter.get_or_resolve(seg, 8, 4, resolve).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_least_recently_used_segment_is_evicted() {
        let filter = CachedFilter::with_capacity("everything", Query::All, 2);
        let calls = Cell::new(0);
        let resolve = |_: &Query| {
            calls.set(calls.get() + 1);
            Ok(DocIdSet::range(0, 4))
        };
        let (a, b, c) = (SegmentId::new(0), SegmentId::new(1), SegmentId::new(2));

        filter.get_or_resolve(a, 0, 4, resolve).unwrap();
        filter.get_or_resolve(b, 1, 4, resolve).unwrap();
        filter.get_or_resolve(a, 0, 4, resolve).unwrap();
        filter.get_or_resolve(c, 2, 4, resolve).unwrap();
        assert_eq!(calls.get(), 3);
        assert_eq!(filter.cached_segments(), 2);

        // a was touched last before c arrived, so b went
        filter.get_or_resolve(a, 0, 4, resolve).unwrap();
        assert_eq!(calls.get(), 3);
        filter.get_or_resolve(b, 1, 4, resolve).unwrap();
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_identity_equality() {
        let a = CachedFilter::new("f", Query::All);
        let b = CachedFilter::new("f", Query::All);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.to_query(), b.to_query());
    }
}
