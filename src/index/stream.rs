//! Pull-based query result streams
//!
//! A stream first walks the segments captured at query start, then, for the
//! future modes, waits on the index's append events. Nothing is resolved
//! until the consumer pulls, and dropping the stream unsubscribes it.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError};

use super::events::IndexEvent;
use crate::docset::{DocIdIter, DocIdSet};
use crate::error::{QuarryError, Result};
use crate::models::{DocId, ResultItem};
use crate::query::{compare_keys, resolve, value_key, Query, SortClause, SortKey};
use crate::segment::SegmentRef;

/// Results of one query, in doc-id order unless sorted
pub struct QueryStream {
    query: Query,
    fields: Vec<String>,
    include_source: bool,
    remaining: Option<usize>,
    deadline: Option<(Instant, Duration)>,
    /// First doc id not covered by the snapshot
    watermark: DocId,
    source: Source,
    active: Option<(SegmentRef, DocIdIter)>,
    events: Option<Receiver<IndexEvent>>,
    finished: bool,
}

enum Source {
    /// Snapshot segments not yet resolved
    Scan(VecDeque<SegmentRef>),
    Sorted(SortedMerge),
    Exhausted,
}

pub(crate) struct StreamParts {
    pub(crate) query: Query,
    pub(crate) sort: Vec<SortClause>,
    pub(crate) fields: Vec<String>,
    pub(crate) include_source: bool,
    pub(crate) limit: Option<usize>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) segments: Vec<SegmentRef>,
    pub(crate) watermark: DocId,
    pub(crate) include_current: bool,
    pub(crate) events: Option<Receiver<IndexEvent>>,
}

impl QueryStream {
    pub(crate) fn new(parts: StreamParts) -> Result<Self> {
        let deadline = parts.timeout.map(|t| (Instant::now() + t, t));
        let source = if !parts.include_current {
            Source::Exhausted
        } else if parts.sort.is_empty() {
            Source::Scan(parts.segments.into())
        } else {
            Source::Sorted(SortedMerge::build(
                &parts.query,
                parts.sort,
                &parts.segments,
                parts.watermark,
                parts.limit,
            )?)
        };
        Ok(Self {
            query: parts.query,
            fields: parts.fields,
            include_source: parts.include_source,
            remaining: parts.limit,
            deadline,
            watermark: parts.watermark,
            source,
            active: None,
            events: parts.events,
            finished: false,
        })
    }

    /// Stop producing; releases the event subscription
    fn finish(&mut self) {
        self.finished = true;
        self.events = None;
        self.active = None;
        self.source = Source::Exhausted;
    }

    fn fail(&mut self, e: QuarryError) -> Option<Result<ResultItem>> {
        self.finish();
        Some(Err(e))
    }

    fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some((at, timeout)) if Instant::now() >= at => Err(QuarryError::Timeout(timeout)),
            _ => Ok(()),
        }
    }

    fn emit(&mut self, segment: &SegmentRef, id: DocId) -> Result<ResultItem> {
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        let mut item = ResultItem::new(id);
        if self.include_source {
            item.source = segment.source(id)?;
        }
        if !self.fields.is_empty() {
            item.fields = segment.project(&[id], &self.fields)?.pop();
        }
        Ok(item)
    }

    /// Next event range, or `None` when the stream should end
    fn next_event(&mut self) -> Option<Result<IndexEvent>> {
        let events = self.events.as_ref()?;
        match self.deadline {
            Some((at, timeout)) => {
                let wait = at.saturating_duration_since(Instant::now());
                match events.recv_timeout(wait) {
                    Ok(event) => Some(Ok(event)),
                    Err(RecvTimeoutError::Timeout) => Some(Err(QuarryError::Timeout(timeout))),
                    Err(RecvTimeoutError::Disconnected) => None,
                }
            }
            None => events.recv().ok().map(Ok),
        }
    }

    fn open_event(&mut self, event: IndexEvent) -> Result<()> {
        let IndexEvent::Appended { segment, from, to } = event;
        // docs below the watermark were already served from the snapshot
        let lo = from.max(self.watermark);
        if lo >= to {
            return Ok(());
        }
        let set = resolve(&self.query, segment.as_ref(), to)?;
        let window = DocIdSet::range(lo, to);
        let set = if set.is_eager() {
            set.intersect(&window)
        } else {
            DocIdSet::and(vec![set, window])
        };
        if !set.is_empty() {
            self.active = Some((segment, set.iter()));
        }
        Ok(())
    }
}

impl Iterator for QueryStream {
    type Item = Result<ResultItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.remaining == Some(0) {
            self.finish();
            return None;
        }
        loop {
            if let Err(e) = self.check_deadline() {
                return self.fail(e);
            }

            let hit = self
                .active
                .as_mut()
                .and_then(|(segment, iter)| iter.next().map(|id| (segment.clone(), id)));
            if let Some((segment, id)) = hit {
                return match self.emit(&segment, id) {
                    Ok(item) => Some(Ok(item)),
                    Err(e) => self.fail(e),
                };
            }
            self.active = None;

            match &mut self.source {
                Source::Scan(pending) => {
                    match pending.pop_front() {
                        Some(segment) => match resolve(&self.query, segment.as_ref(), self.watermark) {
                            Ok(set) => self.active = Some((segment, set.iter())),
                            Err(e) => return self.fail(e),
                        },
                        None => self.source = Source::Exhausted,
                    }
                    continue;
                }
                Source::Sorted(merge) => {
                    match merge.pop() {
                        Some((segment, id)) => {
                            return match self.emit(&segment, id) {
                                Ok(item) => Some(Ok(item)),
                                Err(e) => self.fail(e),
                            };
                        }
                        None => self.source = Source::Exhausted,
                    }
                    continue;
                }
                Source::Exhausted => {}
            }

            match self.next_event() {
                Some(Ok(event)) => {
                    if let Err(e) = self.open_event(event) {
                        return self.fail(e);
                    }
                }
                Some(Err(e)) => return self.fail(e),
                None => {
                    self.finish();
                    return None;
                }
            }
        }
    }
}

/// K-way merge of per-segment sorted runs, compared by value
struct SortedMerge {
    clauses: Vec<SortClause>,
    runs: Vec<SortedRun>,
}

struct SortedRun {
    segment: SegmentRef,
    entries: VecDeque<(SortKey, DocId)>,
}

impl SortedMerge {
    fn build(
        query: &Query,
        clauses: Vec<SortClause>,
        segments: &[SegmentRef],
        upper: DocId,
        limit: Option<usize>,
    ) -> Result<Self> {
        let mut runs = Vec::with_capacity(segments.len());
        for segment in segments {
            let set = resolve(query, segment.as_ref(), upper)?;
            if set.is_empty() {
                continue;
            }
            let (comparator, fields) = segment.build_comparator(&clauses)?;
            let ids = comparator.sort(segment.as_ref(), set.iter(), limit)?;
            let projected = segment.project(&ids, &fields)?;
            let entries = ids
                .into_iter()
                .zip(projected)
                .map(|(id, doc)| {
                    let values: Vec<_> = fields.iter().map(|f| doc.get(f).cloned()).collect();
                    (value_key(&values), id)
                })
                .collect();
            runs.push(SortedRun {
                segment: segment.clone(),
                entries,
            });
        }
        Ok(Self { clauses, runs })
    }

    fn pop(&mut self) -> Option<(SegmentRef, DocId)> {
        let mut best: Option<usize> = None;
        for (i, run) in self.runs.iter().enumerate() {
            let Some((key, id)) = run.entries.front() else {
                continue;
            };
            let better = match best.and_then(|b| self.runs[b].entries.front()) {
                None => true,
                Some((best_key, best_id)) => compare_keys(&self.clauses, key, best_key)
                    .then(id.cmp(best_id))
                    .is_lt(),
            };
            if better {
                best = Some(i);
            }
        }
        let run = &mut self.runs[best?];
        run.entries.pop_front().map(|(_, id)| (run.segment.clone(), id))
    }
}
