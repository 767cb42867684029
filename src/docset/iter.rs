//! Resumable forward iterators over doc-id sets
//!
//! Every iterator answers `next_id(skip_to)`: the smallest id that is both
//! greater than the last id it returned and at least `skip_to`.

use roaring::RoaringBitmap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::models::DocId;

/// Forward iterator over one doc-id set
pub enum DocIdIter {
    Empty,
    Singleton { id: DocId, done: bool },
    Range { next: u64, end: u64 },
    Bitmap(BitmapIter),
    Conjunction(ConjunctionIter),
    Disjunction(DisjunctionIter),
    Difference(Box<DifferenceIter>),
}

impl DocIdIter {
    /// Next id at or after `skip_to`, or `None` once exhausted
    pub fn next_id(&mut self, skip_to: Option<DocId>) -> Option<DocId> {
        match self {
            DocIdIter::Empty => None,
            DocIdIter::Singleton { id, done } => {
                if *done {
                    return None;
                }
                *done = true;
                match skip_to {
                    Some(target) if target > *id => None,
                    _ => Some(*id),
                }
            }
            DocIdIter::Range { next, end } => {
                let candidate = skip_to.map_or(*next, |t| (*next).max(t as u64));
                if candidate >= *end {
                    *next = *end;
                    return None;
                }
                *next = candidate + 1;
                Some(candidate as DocId)
            }
            DocIdIter::Bitmap(it) => it.next_id(skip_to),
            DocIdIter::Conjunction(it) => it.next_id(skip_to),
            DocIdIter::Disjunction(it) => it.next_id(skip_to),
            DocIdIter::Difference(it) => it.next_id(skip_to),
        }
    }
}

impl Iterator for DocIdIter {
    type Item = DocId;

    fn next(&mut self) -> Option<DocId> {
        self.next_id(None)
    }
}

// ── BitmapIter ───────────────────────────────────────────────────────────

/// Skips with rank/select; decodes the bitmap once on the first sequential step.
pub struct BitmapIter {
    bitmap: Arc<RoaringBitmap>,
    decoded: Option<Vec<u32>>,
    pos: usize,
}

impl BitmapIter {
    pub fn new(bitmap: Arc<RoaringBitmap>) -> Self {
        Self {
            bitmap,
            decoded: None,
            pos: 0,
        }
    }

    fn next_id(&mut self, skip_to: Option<DocId>) -> Option<DocId> {
        if let Some(decoded) = &self.decoded {
            if let Some(target) = skip_to {
                let rest = &decoded[self.pos.min(decoded.len())..];
                self.pos += rest.partition_point(|&v| v < target);
            }
            let value = decoded.get(self.pos).copied();
            if value.is_some() {
                self.pos += 1;
            }
            return value;
        }

        match skip_to {
            Some(target) => {
                let below = if target == 0 {
                    0
                } else {
                    self.bitmap.rank(target - 1) as usize
                };
                self.pos = self.pos.max(below);
                let value = u32::try_from(self.pos)
                    .ok()
                    .and_then(|n| self.bitmap.select(n));
                if value.is_some() {
                    self.pos += 1;
                }
                value
            }
            None => {
                self.decoded = Some(self.bitmap.iter().collect());
                self.next_id(None)
            }
        }
    }
}

// ── ConjunctionIter ──────────────────────────────────────────────────────

struct Follower {
    iter: DocIdIter,
    current: Option<DocId>,
}

/// Leapfrog intersection driven by the cheapest operand
pub struct ConjunctionIter {
    lead: Box<DocIdIter>,
    followers: Vec<Follower>,
    exhausted: bool,
}

impl ConjunctionIter {
    /// `iters` must be ordered by ascending cost; the first one leads.
    pub fn new(mut iters: Vec<DocIdIter>) -> Self {
        if iters.is_empty() {
            return Self {
                lead: Box::new(DocIdIter::Empty),
                followers: Vec::new(),
                exhausted: true,
            };
        }
        let lead = iters.remove(0);
        Self {
            lead: Box::new(lead),
            followers: iters
                .into_iter()
                .map(|iter| Follower {
                    iter,
                    current: None,
                })
                .collect(),
            exhausted: false,
        }
    }

    fn next_id(&mut self, skip_to: Option<DocId>) -> Option<DocId> {
        if self.exhausted {
            return None;
        }
        let mut target = skip_to;
        'lead: loop {
            let Some(candidate) = self.lead.next_id(target) else {
                self.exhausted = true;
                return None;
            };
            for follower in self.followers.iter_mut() {
                let position = match follower.current {
                    Some(c) if c >= candidate => c,
                    _ => match follower.iter.next_id(Some(candidate)) {
                        Some(c) => {
                            follower.current = Some(c);
                            c
                        }
                        None => {
                            self.exhausted = true;
                            return None;
                        }
                    },
                };
                if position > candidate {
                    target = Some(position);
                    continue 'lead;
                }
            }
            return Some(candidate);
        }
    }
}

// ── DisjunctionIter ──────────────────────────────────────────────────────

/// K-way merge keyed by each operand's current position
pub struct DisjunctionIter {
    iters: Vec<DocIdIter>,
    heap: BinaryHeap<Reverse<(DocId, usize)>>,
    started: bool,
    last: Option<DocId>,
}

impl DisjunctionIter {
    pub fn new(iters: Vec<DocIdIter>) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(iters.len()),
            iters,
            started: false,
            last: None,
        }
    }

    fn next_id(&mut self, skip_to: Option<DocId>) -> Option<DocId> {
        let floor = match self.last {
            Some(DocId::MAX) => return None,
            Some(last) => Some(skip_to.map_or(last + 1, |t| t.max(last + 1))),
            None => skip_to,
        };

        if !self.started {
            self.started = true;
            for (i, iter) in self.iters.iter_mut().enumerate() {
                if let Some(id) = iter.next_id(floor) {
                    self.heap.push(Reverse((id, i)));
                }
            }
        }

        if let Some(floor) = floor {
            while let Some(&Reverse((id, i))) = self.heap.peek() {
                if id >= floor {
                    break;
                }
                self.heap.pop();
                if let Some(next) = self.iters[i].next_id(Some(floor)) {
                    self.heap.push(Reverse((next, i)));
                }
            }
        }

        let Reverse((id, i)) = self.heap.pop()?;
        if let Some(next) = self.iters[i].next_id(None) {
            self.heap.push(Reverse((next, i)));
        }
        while let Some(&Reverse((dup, j))) = self.heap.peek() {
            if dup != id {
                break;
            }
            self.heap.pop();
            if let Some(next) = self.iters[j].next_id(None) {
                self.heap.push(Reverse((next, j)));
            }
        }
        self.last = Some(id);
        Some(id)
    }
}

// ── DifferenceIter ───────────────────────────────────────────────────────

/// Ids of `include` that never appear in `exclude`
pub struct DifferenceIter {
    include: DocIdIter,
    exclude: DocIdIter,
    exclude_current: Option<DocId>,
    exclude_done: bool,
}

impl DifferenceIter {
    pub fn new(include: DocIdIter, exclude: DocIdIter) -> Self {
        Self {
            include,
            exclude,
            exclude_current: None,
            exclude_done: false,
        }
    }

    fn next_id(&mut self, skip_to: Option<DocId>) -> Option<DocId> {
        let mut target = skip_to;
        loop {
            let candidate = self.include.next_id(target.take())?;
            if !self.exclude_done && self.exclude_current.map_or(true, |e| e < candidate) {
                match self.exclude.next_id(Some(candidate)) {
                    Some(e) => self.exclude_current = Some(e),
                    None => self.exclude_done = true,
                }
            }
            if self.exclude_current == Some(candidate) {
                continue;
            }
            return Some(candidate);
        }
    }
}
