//! Sorting
//!
//! Inside one segment documents are compared by [`SortKey`]s built from the
//! segment's rank columns when it has them and from stored values otherwise.
//! Across segments only values are comparable, so the merge step re-keys the
//! per-segment winners by value. Missing values sort last in both directions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::columns::RankColumn;
use crate::error::Result;
use crate::models::{DocId, Value, ValueKey};
use crate::segment::Segment;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortClause {
    pub field: String,
    pub direction: SortDirection,
}

impl SortClause {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            field: self.field.clone(),
            direction: match self.direction {
                SortDirection::Ascending => SortDirection::Descending,
                SortDirection::Descending => SortDirection::Ascending,
            },
        }
    }
}

/// One clause's key for one document
#[derive(Clone, Debug)]
pub enum KeyPart {
    Missing,
    Rank(u32),
    Value(ValueKey),
}

impl KeyPart {
    fn from_value(value: Option<Value>) -> Self {
        match value {
            Some(v) => KeyPart::Value(ValueKey(v)),
            None => KeyPart::Missing,
        }
    }
}

pub type SortKey = Vec<KeyPart>;

/// Compare two keys under `clauses`; missing parts sort last either way
pub fn compare_keys(clauses: &[SortClause], a: &[KeyPart], b: &[KeyPart]) -> Ordering {
    for (clause, (x, y)) in clauses.iter().zip(a.iter().zip(b.iter())) {
        let ord = match (x, y) {
            (KeyPart::Missing, KeyPart::Missing) => Ordering::Equal,
            (KeyPart::Missing, _) => Ordering::Greater,
            (_, KeyPart::Missing) => Ordering::Less,
            (x, y) => {
                let natural = match (x, y) {
                    (KeyPart::Rank(p), KeyPart::Rank(q)) => p.cmp(q),
                    (KeyPart::Value(p), KeyPart::Value(q)) => p.cmp(q),
                    (KeyPart::Rank(_), _) => Ordering::Less,
                    (_, KeyPart::Rank(_)) => Ordering::Greater,
                    _ => Ordering::Equal,
                };
                match clause.direction {
                    SortDirection::Ascending => natural,
                    SortDirection::Descending => natural.reverse(),
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Where one clause's keys come from inside a segment
#[derive(Clone, Debug)]
pub enum KeySource {
    Rank { column: Arc<RankColumn>, base: DocId },
    Stored,
}

/// Per-segment comparator produced by [`Segment::build_comparator`]
#[derive(Clone, Debug)]
pub struct DocComparator {
    clauses: Vec<SortClause>,
    sources: Vec<KeySource>,
}

impl DocComparator {
    pub fn new(clauses: Vec<SortClause>, sources: Vec<KeySource>) -> Self {
        Self { clauses, sources }
    }

    pub fn clauses(&self) -> &[SortClause] {
        &self.clauses
    }

    /// Same sources with every direction flipped
    pub fn reversed(&self) -> Self {
        Self {
            clauses: self.clauses.iter().map(SortClause::reversed).collect(),
            sources: self.sources.clone(),
        }
    }

    pub fn key(&self, segment: &dyn Segment, id: DocId) -> Result<SortKey> {
        let mut key = Vec::with_capacity(self.clauses.len());
        let mut stored: Option<Vec<Option<Value>>> = None;
        for (i, source) in self.sources.iter().enumerate() {
            let part = match source {
                KeySource::Rank { column, base } => match id.checked_sub(*base).and_then(|i| column.get(i)) {
                    Some(rank) => KeyPart::Rank(rank),
                    None => KeyPart::Missing,
                },
                KeySource::Stored => {
                    if stored.is_none() {
                        stored = Some(self.stored_values(segment, id)?);
                    }
                    let value = stored.as_mut().and_then(|values| values[i].take());
                    KeyPart::from_value(value)
                }
            };
            key.push(part);
        }
        Ok(key)
    }

    fn stored_values(&self, segment: &dyn Segment, id: DocId) -> Result<Vec<Option<Value>>> {
        let fields: Vec<String> = self.clauses.iter().map(|c| c.field.clone()).collect();
        let mut projected = segment.project(&[id], &fields)?;
        let doc = projected.pop().unwrap_or_default();
        Ok(fields.iter().map(|f| doc.get(f).cloned()).collect())
    }

    pub fn compare(&self, a: &[KeyPart], b: &[KeyPart]) -> Ordering {
        compare_keys(&self.clauses, a, b)
    }

    /// Sort `ids` and keep the first `limit`. Ties keep doc-id order.
    pub fn sort(
        &self,
        segment: &dyn Segment,
        ids: impl IntoIterator<Item = DocId>,
        limit: Option<usize>,
    ) -> Result<Vec<DocId>> {
        let mut keyed = Vec::new();
        for id in ids {
            keyed.push((self.key(segment, id)?, id));
        }
        keyed.sort_by(|(ka, ia), (kb, ib)| self.compare(ka, kb).then(ia.cmp(ib)));
        if let Some(limit) = limit {
            keyed.truncate(limit);
        }
        Ok(keyed.into_iter().map(|(_, id)| id).collect())
    }
}

/// Value keys for comparing documents from different segments
pub fn value_key(values: &[Option<Value>]) -> SortKey {
    values.iter().cloned().map(KeyPart::from_value).collect()
}
