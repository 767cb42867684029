//! Per-segment aggregation state

use std::collections::BTreeMap;

use super::types::AggregationSpec;
use crate::docset::DocIdSet;
use crate::error::Result;
use crate::models::{DocId, ValueKey};
use crate::query::{DocComparator, SortKey};
use crate::segment::{Segment, SegmentRef};

/// Docs buffered per group before they reach the nested accumulators
const GROUP_BATCH: usize = 64;

/// Ids pulled from a lazy set per step
const SCAN_BATCH: usize = 256;

pub(crate) enum Accumulator {
    Count(u64),
    Top(TopAccumulator),
    GroupBy(GroupAccumulator),
}

pub(crate) struct TopAccumulator {
    comparator: DocComparator,
    best: Option<(SortKey, DocId)>,
}

pub(crate) struct GroupAccumulator {
    field: String,
    specs: Vec<AggregationSpec>,
    groups: BTreeMap<ValueKey, Group>,
}

struct Group {
    accumulators: Vec<Accumulator>,
    pending: Vec<DocId>,
}

/// Finished per-segment state, ready for the cross-segment merge
pub(crate) enum Partial {
    Count(u64),
    Top(Option<TopPartial>),
    Groups(BTreeMap<ValueKey, Vec<Partial>>),
}

/// A per-segment winner; projection waits until the merge picks one
pub(crate) struct TopPartial {
    pub(crate) segment: SegmentRef,
    pub(crate) doc_id: DocId,
}

impl Accumulator {
    pub(crate) fn new(spec: &AggregationSpec, segment: &dyn Segment) -> Result<Self> {
        Ok(match spec {
            AggregationSpec::Count => Accumulator::Count(0),
            AggregationSpec::First(sort) => {
                let (comparator, _) = segment.build_comparator(sort)?;
                Accumulator::Top(TopAccumulator {
                    comparator,
                    best: None,
                })
            }
            AggregationSpec::Last(sort) => {
                let (comparator, _) = segment.build_comparator(sort)?;
                Accumulator::Top(TopAccumulator {
                    comparator: comparator.reversed(),
                    best: None,
                })
            }
            AggregationSpec::GroupBy {
                field,
                aggregations,
            } => Accumulator::GroupBy(GroupAccumulator {
                field: field.clone(),
                specs: aggregations.clone(),
                groups: BTreeMap::new(),
            }),
        })
    }

    pub(crate) fn for_specs(specs: &[AggregationSpec], segment: &dyn Segment) -> Result<Vec<Self>> {
        specs.iter().map(|spec| Accumulator::new(spec, segment)).collect()
    }

    /// Feed a whole resolved set. Counting never visits the documents when
    /// the set knows its size.
    pub(crate) fn add_set(&mut self, segment: &dyn Segment, set: &DocIdSet) -> Result<()> {
        if let Accumulator::Count(n) = self {
            *n += set.count();
            return Ok(());
        }
        let mut iter = set.iter();
        let mut batch = Vec::with_capacity(SCAN_BATCH);
        loop {
            batch.clear();
            batch.extend(iter.by_ref().take(SCAN_BATCH));
            if batch.is_empty() {
                return Ok(());
            }
            self.add_ids(segment, &batch)?;
        }
    }

    pub(crate) fn add_ids(&mut self, segment: &dyn Segment, ids: &[DocId]) -> Result<()> {
        match self {
            Accumulator::Count(n) => *n += ids.len() as u64,
            Accumulator::Top(top) => {
                for &id in ids {
                    top.offer(segment, id)?;
                }
            }
            Accumulator::GroupBy(groups) => groups.add(segment, ids)?,
        }
        Ok(())
    }

    pub(crate) fn finish(self, segment: &SegmentRef) -> Result<Partial> {
        Ok(match self {
            Accumulator::Count(n) => Partial::Count(n),
            Accumulator::Top(top) => Partial::Top(top.best.map(|(_, doc_id)| TopPartial {
                segment: segment.clone(),
                doc_id,
            })),
            Accumulator::GroupBy(groups) => {
                let mut out = BTreeMap::new();
                for (key, mut group) in groups.groups {
                    group.flush(segment.as_ref())?;
                    let partials = group
                        .accumulators
                        .into_iter()
                        .map(|acc| acc.finish(segment))
                        .collect::<Result<Vec<_>>>()?;
                    out.insert(key, partials);
                }
                Partial::Groups(out)
            }
        })
    }
}

impl TopAccumulator {
    fn offer(&mut self, segment: &dyn Segment, id: DocId) -> Result<()> {
        let key = self.comparator.key(segment, id)?;
        let better = match &self.best {
            None => true,
            // ids arrive ascending, so ties keep the earlier doc
            Some((best, _)) => self.comparator.compare(&key, best).is_lt(),
        };
        if better {
            self.best = Some((key, id));
        }
        Ok(())
    }
}

impl GroupAccumulator {
    fn add(&mut self, segment: &dyn Segment, ids: &[DocId]) -> Result<()> {
        let fields = [self.field.clone()];
        let projected = segment.project(ids, &fields)?;
        for (&id, mut doc) in ids.iter().zip(projected) {
            let Some(value) = doc.remove(&self.field) else {
                continue;
            };
            let key = ValueKey(value);
            if !self.groups.contains_key(&key) {
                let group = Group {
                    accumulators: Accumulator::for_specs(&self.specs, segment)?,
                    pending: Vec::with_capacity(GROUP_BATCH),
                };
                self.groups.insert(key.clone(), group);
            }
            if let Some(group) = self.groups.get_mut(&key) {
                group.pending.push(id);
                if group.pending.len() >= GROUP_BATCH {
                    group.flush(segment)?;
                }
            }
        }
        Ok(())
    }
}

impl Group {
    fn flush(&mut self, segment: &dyn Segment) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        for acc in &mut self.accumulators {
            acc.add_ids(segment, &pending)?;
        }
        Ok(())
    }
}
