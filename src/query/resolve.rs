//! Resolving a query tree against one segment

use tracing::trace;

use super::ast::{BooleanQuery, Query};
use crate::docset::DocIdSet;
use crate::error::Result;
use crate::models::DocId;
use crate::segment::Segment;

/// Live documents of `segment` below `upper` matching `query`.
///
/// `upper` pins the view of a mutable segment that keeps growing while the
/// query runs. Deleted documents are always removed.
pub fn resolve(query: &Query, segment: &dyn Segment, upper: DocId) -> Result<DocIdSet> {
    let upper = upper.min(segment.next());
    let window = DocIdSet::range(segment.from(), upper);
    if window.is_empty() {
        return Ok(DocIdSet::Empty);
    }
    let matched = resolve_node(query, segment, upper)?;
    let clipped = if matched.is_eager() {
        matched.intersect(&window)
    } else {
        DocIdSet::and(vec![matched, window])
    };
    let deleted = segment.deleted();
    Ok(if clipped.is_eager() {
        clipped.difference(&deleted)
    } else {
        clipped.and_not(deleted)
    })
}

/// Matches of one node, not yet clipped to the segment window or filtered
/// for deletions
pub fn resolve_node(query: &Query, segment: &dyn Segment, upper: DocId) -> Result<DocIdSet> {
    match query {
        Query::All => Ok(DocIdSet::range(segment.from(), upper)),
        Query::None => Ok(DocIdSet::Empty),
        Query::Term { field, term } => {
            if !segment.may_match(field, term)? {
                return Ok(DocIdSet::Empty);
            }
            segment.get(field, term)
        }
        Query::Cached(filter) => filter.get_or_resolve(segment.id(), segment.instance_id(), upper, |inner| {
            resolve_node(inner, segment, upper)
        }),
        Query::Boolean(b) => resolve_boolean(b, segment, upper),
    }
}

fn resolve_boolean(b: &BooleanQuery, segment: &dyn Segment, upper: DocId) -> Result<DocIdSet> {
    let required = match resolve_must(&b.must, segment, upper)? {
        Some(set) if set.is_empty() => return Ok(DocIdSet::Empty),
        other => other,
    };

    let optional = if b.should.is_empty() {
        None
    } else {
        // Should clauses are always materialized
        let mut union = DocIdSet::Empty;
        for clause in &b.should {
            union = union.union(&resolve_node(clause, segment, upper)?);
        }
        if union.is_empty() {
            return Ok(DocIdSet::Empty);
        }
        Some(union)
    };

    let base = match (required, optional) {
        (Some(r), Some(o)) if r.is_eager() => r.intersect(&o),
        (Some(r), Some(o)) => DocIdSet::and(vec![r, o]),
        (Some(r), None) => r,
        (None, Some(o)) => o,
        (None, None) => DocIdSet::range(segment.from(), upper),
    };
    if base.is_empty() || b.must_not.is_empty() {
        return Ok(base);
    }

    let mut excluded = Vec::with_capacity(b.must_not.len());
    for clause in &b.must_not {
        let set = resolve_node(clause, segment, upper)?;
        if !set.is_empty() {
            excluded.push(set);
        }
    }
    let exclusion = DocIdSet::or(excluded);
    Ok(if base.is_eager() && exclusion.is_eager() {
        base.difference(&exclusion)
    } else {
        base.and_not(exclusion)
    })
}

/// AND of the must clauses, `None` when there are none. Eager sets are
/// intersected smallest first; lazy ones join the result as a conjunction.
fn resolve_must(clauses: &[Query], segment: &dyn Segment, upper: DocId) -> Result<Option<DocIdSet>> {
    if clauses.is_empty() {
        return Ok(None);
    }
    let mut eager = Vec::new();
    let mut lazy = Vec::new();
    for clause in clauses {
        let set = resolve_node(clause, segment, upper)?;
        if set.is_empty() {
            trace!(clause = ?clause, "must clause is empty");
            return Ok(Some(DocIdSet::Empty));
        }
        if set.is_eager() {
            eager.push(set);
        } else {
            lazy.push(set);
        }
    }

    eager.sort_by_key(DocIdSet::cost);
    let mut acc: Option<DocIdSet> = None;
    for set in eager {
        let next = match acc {
            Some(current) => current.intersect(&set),
            None => set,
        };
        if next.is_empty() {
            return Ok(Some(DocIdSet::Empty));
        }
        acc = Some(next);
    }

    Ok(Some(match acc {
        Some(eager) if lazy.is_empty() => eager,
        Some(eager) => {
            lazy.push(eager);
            DocIdSet::and(lazy)
        }
        None => DocIdSet::and(lazy),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use crate::query::ast::{and, exists, not, number_range, or, term};
    use crate::query::{rewrite, CachedFilter};
    use crate::schema::FieldRegistry;
    use crate::segment::{MutableSegment, SegmentId};
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    fn segment(docs: Vec<serde_json::Value>) -> MutableSegment {
        let seg = MutableSegment::new(SegmentId(0), 0, Arc::new(FieldRegistry::default()), false);
        let docs: Vec<Document> = docs.into_iter().map(|d| Document::from_json(d).unwrap()).collect();
        seg.add(&docs).unwrap();
        seg
    }

    fn ids(query: &Query, seg: &MutableSegment) -> Vec<DocId> {
        resolve(query, seg, DocId::MAX).unwrap().to_vec()
    }

    fn colors() -> MutableSegment {
        segment(vec![
            json!({"color": "red", "size": 1}),
            json!({"color": "blue", "size": 2}),
            json!({"color": "red", "size": 3}),
            json!({"shape": "round"}),
        ])
    }

    #[test]
    fn test_boolean_combinations() {
        let seg = colors();
        assert_eq!(ids(&term("color", "red"), &seg), vec![0, 2]);
        assert_eq!(ids(&and(vec![term("color", "red"), term("size", 3)]), &seg), vec![2]);
        assert_eq!(ids(&or(vec![term("color", "blue"), term("size", 3)]), &seg), vec![1, 2]);
        assert_eq!(ids(&not(term("color", "red")), &seg), vec![1, 3]);
        assert_eq!(ids(&exists("shape"), &seg), vec![3]);
        assert!(ids(&term("color", "green"), &seg).is_empty());
    }

    #[test]
    fn test_deleted_and_upper_bound() {
        let seg = colors();
        seg.add_to_deleted(0).unwrap();
        assert_eq!(ids(&term("color", "red"), &seg), vec![2]);
        assert_eq!(resolve(&Query::All, &seg, 2).unwrap().to_vec(), vec![1]);
    }

    #[test]
    fn test_cached_filter_resolves_once_per_view() {
        let seg = colors();
        let filter = CachedFilter::new("red", term("color", "red"));
        let query = filter.to_query();
        assert_eq!(ids(&query, &seg), vec![0, 2]);
        assert_eq!(filter.cached_segments(), 1);

        seg.add(&[Document::from_json(json!({"color": "red"})).unwrap()]).unwrap();
        assert_eq!(ids(&query, &seg), vec![0, 2, 4]);
        assert_eq!(filter.cached_segments(), 1);
    }

    #[test]
    fn test_range_scenario() {
        let seg = segment(vec![json!({"n": 10_000_000}), json!({"n": 30}), json!({"n": -5})]);
        let high = number_range("n", Some(30), Some(crate::models::MAX_SAFE_INTEGER), true, true).unwrap();
        assert_eq!(ids(&high, &seg), vec![0, 1]);
        let low = number_range("n", Some(crate::models::MIN_SAFE_INTEGER), Some(30), true, false).unwrap();
        assert_eq!(ids(&low, &seg), vec![2]);
    }

    fn arb_leaf() -> impl Strategy<Value = Query> {
        prop_oneof![
            Just(Query::All),
            Just(Query::None),
            (0i64..4).prop_map(|v| term("a", v)),
            (0i64..4).prop_map(|v| term("b", v)),
        ]
    }

    fn arb_query() -> impl Strategy<Value = Query> {
        arb_leaf().prop_recursive(3, 24, 4, |inner| {
            (
                prop::collection::vec(inner.clone(), 0..3),
                prop::collection::vec(inner.clone(), 0..3),
                prop::collection::vec(inner, 0..2),
            )
                .prop_map(|(should, must, must_not)| Query::boolean(should, must, must_not))
        })
    }

    proptest! {
        #[test]
        fn test_rewrite_preserves_matches(
            values in prop::collection::vec((0i64..4, 0i64..4), 1..24),
            query in arb_query(),
        ) {
            let docs = values
                .iter()
                .map(|(a, b)| json!({"a": a, "b": b}))
                .collect();
            let seg = segment(docs);
            let before = ids(&query, &seg);
            let after = ids(&rewrite(query), &seg);
            prop_assert_eq!(before, after);
        }
    }
}
