//! Cross-segment merge of partial aggregation results

use std::collections::BTreeMap;

use super::accumulator::{Partial, TopPartial};
use super::types::{AggregationResult, AggregationSpec, GroupResult, TopHit};
use crate::error::{QuarryError, Result};
use crate::models::ValueKey;
use crate::query::{compare_keys, value_key, SortClause, SortKey};

pub(crate) enum Merger {
    Count(u64),
    Top(TopMerger),
    GroupBy(GroupMerger),
}

pub(crate) struct TopMerger {
    clauses: Vec<SortClause>,
    /// Value key is fetched only once a second candidate shows up
    best: Option<(Option<SortKey>, TopPartial)>,
}

pub(crate) struct GroupMerger {
    specs: Vec<AggregationSpec>,
    groups: BTreeMap<ValueKey, Vec<Merger>>,
}

impl Merger {
    pub(crate) fn for_spec(spec: &AggregationSpec) -> Self {
        match spec {
            AggregationSpec::Count => Merger::Count(0),
            AggregationSpec::First(sort) => Merger::Top(TopMerger {
                clauses: sort.clone(),
                best: None,
            }),
            AggregationSpec::Last(sort) => Merger::Top(TopMerger {
                clauses: sort.iter().map(SortClause::reversed).collect(),
                best: None,
            }),
            AggregationSpec::GroupBy { aggregations, .. } => Merger::GroupBy(GroupMerger {
                specs: aggregations.clone(),
                groups: BTreeMap::new(),
            }),
        }
    }

    pub(crate) fn for_specs(specs: &[AggregationSpec]) -> Vec<Self> {
        specs.iter().map(Merger::for_spec).collect()
    }

    pub(crate) fn merge(&mut self, partial: Partial) -> Result<()> {
        match (self, partial) {
            (Merger::Count(total), Partial::Count(n)) => *total += n,
            (Merger::Top(top), Partial::Top(candidate)) => {
                if let Some(candidate) = candidate {
                    top.offer(candidate)?;
                }
            }
            (Merger::GroupBy(merger), Partial::Groups(groups)) => {
                let GroupMerger { specs, groups: merged } = merger;
                for (key, partials) in groups {
                    let mergers = merged.entry(key).or_insert_with(|| Merger::for_specs(specs));
                    if mergers.len() != partials.len() {
                        return Err(mismatch());
                    }
                    for (merger, partial) in mergers.iter_mut().zip(partials) {
                        merger.merge(partial)?;
                    }
                }
            }
            _ => return Err(mismatch()),
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> Result<AggregationResult> {
        Ok(match self {
            Merger::Count(n) => AggregationResult::Count(n),
            Merger::Top(top) => AggregationResult::Top(top.finish()?),
            Merger::GroupBy(merger) => {
                let mut groups = Vec::with_capacity(merger.groups.len());
                for (key, mergers) in merger.groups {
                    let results = mergers
                        .into_iter()
                        .map(Merger::finish)
                        .collect::<Result<Vec<_>>>()?;
                    groups.push(GroupResult { key: key.0, results });
                }
                AggregationResult::Groups(groups)
            }
        })
    }
}

fn mismatch() -> QuarryError {
    QuarryError::Internal("partial result does not match its aggregation".to_string())
}

impl TopMerger {
    fn fields(&self) -> Vec<String> {
        self.clauses.iter().map(|c| c.field.clone()).collect()
    }

    fn key_of(&self, candidate: &TopPartial) -> Result<SortKey> {
        let fields = self.fields();
        let doc = candidate
            .segment
            .project(&[candidate.doc_id], &fields)?
            .pop()
            .unwrap_or_default();
        let values: Vec<_> = fields.iter().map(|f| doc.get(f).cloned()).collect();
        Ok(value_key(&values))
    }

    fn offer(&mut self, candidate: TopPartial) -> Result<()> {
        let Some((best_key, best)) = self.best.take() else {
            self.best = Some((None, candidate));
            return Ok(());
        };
        let best_key = match best_key {
            Some(key) => key,
            None => self.key_of(&best)?,
        };
        let key = self.key_of(&candidate)?;
        let ord = compare_keys(&self.clauses, &key, &best_key).then(candidate.doc_id.cmp(&best.doc_id));
        self.best = Some(if ord.is_lt() {
            (Some(key), candidate)
        } else {
            (Some(best_key), best)
        });
        Ok(())
    }

    fn finish(self) -> Result<Option<TopHit>> {
        let fields = self.fields();
        let Some((_, best)) = self.best else {
            return Ok(None);
        };
        let projected = best.segment.project(&[best.doc_id], &fields)?;
        Ok(Some(TopHit {
            doc_id: best.doc_id,
            segment: best.segment.id(),
            fields: projected.into_iter().next().unwrap_or_default(),
            source: best.segment.source(best.doc_id)?,
        }))
    }
}
