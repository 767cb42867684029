//! Doc-id set algebra
//!
//! A [`DocIdSet`] is one of:
//! - eager sets: `Empty`, `Singleton`, `Range`, `Bitmap` (roaring, shared)
//! - lazy combinators: `Conjunction`, `Disjunction`, `Difference`
//!
//! Lazy sets are evaluated through [`DocIdIter`], which supports skipping.
//! Conjunctions keep their operands sorted by ascending cost so the cheapest
//! operand leads the leapfrog join. Eager helpers ([`DocIdSet::intersect`],
//! [`DocIdSet::union`], [`DocIdSet::difference`]) combine at bitmap
//! granularity and keep singletons unallocated.

mod iter;

pub use iter::{BitmapIter, ConjunctionIter, DifferenceIter, DisjunctionIter, DocIdIter};

use roaring::RoaringBitmap;
use std::fmt;
use std::sync::Arc;

use crate::models::DocId;

#[derive(Clone, Default)]
pub enum DocIdSet {
    #[default]
    Empty,
    Singleton(DocId),
    /// Half-open `[from, to)`
    Range {
        from: DocId,
        to: DocId,
    },
    Bitmap(Arc<RoaringBitmap>),
    Conjunction(Vec<DocIdSet>),
    Disjunction(Vec<DocIdSet>),
    Difference(Box<DocIdSet>, Box<DocIdSet>),
}

impl DocIdSet {
    pub fn range(from: DocId, to: DocId) -> Self {
        if from >= to {
            DocIdSet::Empty
        } else {
            DocIdSet::Range { from, to }
        }
    }

    pub fn from_bitmap(bitmap: RoaringBitmap) -> Self {
        if bitmap.is_empty() {
            DocIdSet::Empty
        } else {
            DocIdSet::Bitmap(Arc::new(bitmap))
        }
    }

    pub fn from_shared(bitmap: Arc<RoaringBitmap>) -> Self {
        if bitmap.is_empty() {
            DocIdSet::Empty
        } else {
            DocIdSet::Bitmap(bitmap)
        }
    }

    /// Cheap upper bound on cardinality
    pub fn cost(&self) -> u64 {
        match self {
            DocIdSet::Empty => 0,
            DocIdSet::Singleton(_) => 1,
            DocIdSet::Range { from, to } => (*to - *from) as u64,
            DocIdSet::Bitmap(b) => b.len(),
            DocIdSet::Conjunction(sets) => sets.iter().map(DocIdSet::cost).min().unwrap_or(0),
            DocIdSet::Disjunction(sets) => sets.iter().map(DocIdSet::cost).sum(),
            DocIdSet::Difference(include, _) => include.cost(),
        }
    }

    /// Exact cardinality when known without iterating
    pub fn exact_len(&self) -> Option<u64> {
        match self {
            DocIdSet::Empty | DocIdSet::Singleton(_) | DocIdSet::Range { .. } | DocIdSet::Bitmap(_) => {
                Some(self.cost())
            }
            _ => None,
        }
    }

    /// Exact cardinality, iterating lazy sets if needed
    pub fn count(&self) -> u64 {
        match self.exact_len() {
            Some(n) => n,
            None => self.iter().count() as u64,
        }
    }

    pub fn is_eager(&self) -> bool {
        matches!(
            self,
            DocIdSet::Empty | DocIdSet::Singleton(_) | DocIdSet::Range { .. } | DocIdSet::Bitmap(_)
        )
    }

    pub fn is_empty(&self) -> bool {
        self.cost() == 0
    }

    pub fn has(&self, id: DocId) -> bool {
        match self {
            DocIdSet::Empty => false,
            DocIdSet::Singleton(x) => *x == id,
            DocIdSet::Range { from, to } => *from <= id && id < *to,
            DocIdSet::Bitmap(b) => b.contains(id),
            DocIdSet::Conjunction(sets) => sets.iter().all(|s| s.has(id)),
            DocIdSet::Disjunction(sets) => sets.iter().any(|s| s.has(id)),
            DocIdSet::Difference(include, exclude) => include.has(id) && !exclude.has(id),
        }
    }

    pub fn iter(&self) -> DocIdIter {
        match self {
            DocIdSet::Empty => DocIdIter::Empty,
            DocIdSet::Singleton(id) => DocIdIter::Singleton {
                id: *id,
                done: false,
            },
            DocIdSet::Range { from, to } => DocIdIter::Range {
                next: *from as u64,
                end: *to as u64,
            },
            DocIdSet::Bitmap(b) => DocIdIter::Bitmap(BitmapIter::new(b.clone())),
            DocIdSet::Conjunction(sets) => {
                DocIdIter::Conjunction(ConjunctionIter::new(sets.iter().map(DocIdSet::iter).collect()))
            }
            DocIdSet::Disjunction(sets) => {
                DocIdIter::Disjunction(DisjunctionIter::new(sets.iter().map(DocIdSet::iter).collect()))
            }
            DocIdSet::Difference(include, exclude) => {
                DocIdIter::Difference(Box::new(DifferenceIter::new(include.iter(), exclude.iter())))
            }
        }
    }

    /// Lazy AND. Nested conjunctions are spliced in and operands sorted by cost;
    /// any zero-cost operand makes the whole set empty.
    pub fn and(sets: Vec<DocIdSet>) -> DocIdSet {
        let mut flat = Vec::with_capacity(sets.len());
        for set in sets {
            match set {
                DocIdSet::Conjunction(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.is_empty() || flat.iter().any(|s| s.cost() == 0) {
            return DocIdSet::Empty;
        }
        if flat.len() == 1 {
            return flat.pop().unwrap_or_default();
        }
        flat.sort_by_key(DocIdSet::cost);
        DocIdSet::Conjunction(flat)
    }

    /// Lazy OR. Nested disjunctions are spliced in and empty operands dropped.
    pub fn or(sets: Vec<DocIdSet>) -> DocIdSet {
        let mut flat = Vec::with_capacity(sets.len());
        for set in sets {
            match set {
                DocIdSet::Disjunction(inner) => flat.extend(inner),
                other if other.cost() == 0 => {}
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => DocIdSet::Empty,
            1 => flat.pop().unwrap_or_default(),
            _ => DocIdSet::Disjunction(flat),
        }
    }

    /// Lazy AND-NOT. Returns `self` untouched when `exclude` is empty.
    pub fn and_not(self, exclude: DocIdSet) -> DocIdSet {
        if exclude.cost() == 0 {
            return self;
        }
        if self.cost() == 0 {
            return DocIdSet::Empty;
        }
        DocIdSet::Difference(Box::new(self), Box::new(exclude))
    }

    /// Eager AND at bitmap granularity
    pub fn intersect(&self, other: &DocIdSet) -> DocIdSet {
        match (self, other) {
            (DocIdSet::Empty, _) | (_, DocIdSet::Empty) => DocIdSet::Empty,
            (DocIdSet::Singleton(id), o) | (o, DocIdSet::Singleton(id)) => {
                if o.has(*id) {
                    DocIdSet::Singleton(*id)
                } else {
                    DocIdSet::Empty
                }
            }
            (DocIdSet::Range { from: a, to: b }, DocIdSet::Range { from: c, to: d }) => {
                DocIdSet::range((*a).max(*c), (*b).min(*d))
            }
            (DocIdSet::Range { from, to }, DocIdSet::Bitmap(bm))
            | (DocIdSet::Bitmap(bm), DocIdSet::Range { from, to }) => {
                if bm.min().map_or(false, |m| m >= *from) && bm.max().map_or(false, |m| m < *to) {
                    return DocIdSet::Bitmap(bm.clone());
                }
                let mut clipped = (**bm).clone();
                clipped.remove_range(..*from);
                clipped.remove_range(*to..);
                DocIdSet::from_bitmap(clipped)
            }
            (DocIdSet::Bitmap(a), DocIdSet::Bitmap(b)) => DocIdSet::from_bitmap(&**a & &**b),
            (a, b) => DocIdSet::from_bitmap(a.materialize() & b.materialize()),
        }
    }

    /// Eager OR at bitmap granularity
    pub fn union(&self, other: &DocIdSet) -> DocIdSet {
        match (self, other) {
            (DocIdSet::Empty, o) | (o, DocIdSet::Empty) => o.clone(),
            (DocIdSet::Singleton(a), DocIdSet::Singleton(b)) if a == b => DocIdSet::Singleton(*a),
            (DocIdSet::Bitmap(a), DocIdSet::Bitmap(b)) => DocIdSet::from_bitmap(&**a | &**b),
            (a, b) => DocIdSet::from_bitmap(a.materialize() | b.materialize()),
        }
    }

    /// Eager AND-NOT at bitmap granularity
    pub fn difference(&self, exclude: &DocIdSet) -> DocIdSet {
        if exclude.cost() == 0 {
            return self.clone();
        }
        match self {
            DocIdSet::Empty => DocIdSet::Empty,
            DocIdSet::Singleton(id) => {
                if exclude.has(*id) {
                    DocIdSet::Empty
                } else {
                    DocIdSet::Singleton(*id)
                }
            }
            _ => DocIdSet::from_bitmap(self.materialize() - exclude.materialize()),
        }
    }

    /// Force evaluation into an owned bitmap
    pub fn materialize(&self) -> RoaringBitmap {
        match self {
            DocIdSet::Empty => RoaringBitmap::new(),
            DocIdSet::Singleton(id) => {
                let mut b = RoaringBitmap::new();
                b.insert(*id);
                b
            }
            DocIdSet::Range { from, to } => {
                let mut b = RoaringBitmap::new();
                b.insert_range(*from..*to);
                b
            }
            DocIdSet::Bitmap(b) => (**b).clone(),
            DocIdSet::Conjunction(sets) => {
                let mut ordered: Vec<&DocIdSet> = sets.iter().collect();
                ordered.sort_by_key(|s| s.cost());
                let mut iter = ordered.into_iter();
                let mut acc = match iter.next() {
                    Some(first) => first.materialize(),
                    None => return RoaringBitmap::new(),
                };
                for set in iter {
                    if acc.is_empty() {
                        break;
                    }
                    match set {
                        DocIdSet::Bitmap(b) => acc &= &**b,
                        DocIdSet::Range { from, to } => {
                            acc.remove_range(..*from);
                            acc.remove_range(*to..);
                        }
                        other => acc &= other.materialize(),
                    }
                }
                acc
            }
            DocIdSet::Disjunction(sets) => {
                let mut acc = RoaringBitmap::new();
                for set in sets {
                    match set {
                        DocIdSet::Bitmap(b) => acc |= &**b,
                        other => acc |= other.materialize(),
                    }
                }
                acc
            }
            DocIdSet::Difference(include, exclude) => {
                let mut acc = include.materialize();
                match exclude.as_ref() {
                    DocIdSet::Bitmap(b) => acc -= &**b,
                    other => acc -= other.materialize(),
                }
                acc
            }
        }
    }

    /// Shared bitmap view, reusing the existing allocation when already a bitmap
    pub fn to_bitmap(&self) -> Arc<RoaringBitmap> {
        match self {
            DocIdSet::Bitmap(b) => b.clone(),
            other => Arc::new(other.materialize()),
        }
    }

    /// Collect all ids in ascending order
    pub fn to_vec(&self) -> Vec<DocId> {
        self.iter().collect()
    }
}

impl fmt::Debug for DocIdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocIdSet::Empty => write!(f, "Empty"),
            DocIdSet::Singleton(id) => write!(f, "Singleton({})", id),
            DocIdSet::Range { from, to } => write!(f, "Range({}..{})", from, to),
            DocIdSet::Bitmap(b) => write!(f, "Bitmap(len={})", b.len()),
            DocIdSet::Conjunction(sets) => f.debug_tuple("Conjunction").field(sets).finish(),
            DocIdSet::Disjunction(sets) => f.debug_tuple("Disjunction").field(sets).finish(),
            DocIdSet::Difference(a, b) => f.debug_tuple("Difference").field(a).field(b).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bitmap(ids: &[u32]) -> DocIdSet {
        DocIdSet::from_bitmap(ids.iter().copied().collect())
    }

    #[test]
    fn test_singleton_and_range() {
        let single = DocIdSet::Singleton(5);
        assert_eq!(single.cost(), 1);
        assert!(single.has(5));
        assert_eq!(single.to_vec(), vec![5]);

        let range = DocIdSet::range(3, 7);
        assert_eq!(range.to_vec(), vec![3, 4, 5, 6]);
        assert!(DocIdSet::range(7, 7).is_empty());
    }

    #[test]
    fn test_skip_iteration() {
        let set = bitmap(&[1, 5, 9, 200, 70_000]);
        let mut it = set.iter();
        assert_eq!(it.next_id(Some(6)), Some(9));
        assert_eq!(it.next_id(None), Some(200));
        assert_eq!(it.next_id(Some(100)), Some(70_000));
        assert_eq!(it.next_id(None), None);

        let mut it = set.iter();
        assert_eq!(it.next_id(None), Some(1));
        assert_eq!(it.next_id(Some(9)), Some(9));
        assert_eq!(it.next_id(Some(3)), Some(200));
    }

    #[test]
    fn test_zero_cost_and_short_circuits() {
        let set = DocIdSet::and(vec![bitmap(&[1, 2, 3]), DocIdSet::Empty, DocIdSet::range(0, 100)]);
        assert!(matches!(set, DocIdSet::Empty));
    }

    #[test]
    fn test_and_not_empty_exclusion_is_identity() {
        let base = bitmap(&[1, 2, 3]);
        let DocIdSet::Bitmap(original) = &base else {
            panic!("expected bitmap");
        };
        let original = original.clone();
        match base.and_not(DocIdSet::Empty) {
            DocIdSet::Bitmap(b) => assert!(Arc::ptr_eq(&b, &original)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_conjunction_sorted_by_cost_and_flattened() {
        let inner = DocIdSet::and(vec![DocIdSet::range(0, 1000), bitmap(&[2, 4, 6, 8])]);
        let outer = DocIdSet::and(vec![inner, DocIdSet::Singleton(4)]);
        let DocIdSet::Conjunction(ops) = &outer else {
            panic!("expected conjunction");
        };
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].cost(), 1);
        assert_eq!(outer.to_vec(), vec![4]);
    }

    #[test]
    fn test_lazy_ops_match_eager() {
        let a = bitmap(&[1, 3, 5, 7, 9, 11]);
        let b = DocIdSet::range(4, 10);
        let c = DocIdSet::Singleton(7);

        let lazy_or = DocIdSet::or(vec![a.clone(), c.clone()]);
        assert_eq!(lazy_or.to_vec(), vec![1, 3, 5, 7, 9, 11]);

        let lazy_and = DocIdSet::and(vec![a.clone(), b.clone()]);
        assert_eq!(lazy_and.to_vec(), vec![5, 7, 9]);
        assert_eq!(a.intersect(&b).to_vec(), vec![5, 7, 9]);

        let lazy_diff = a.clone().and_not(DocIdSet::or(vec![b.clone(), c]));
        assert_eq!(lazy_diff.to_vec(), vec![1, 3, 11]);
        assert_eq!(a.difference(&b).to_vec(), vec![1, 3, 11]);
    }

    #[test]
    fn test_singleton_intersect_avoids_bitmap() {
        let a = DocIdSet::Singleton(3);
        assert!(matches!(a.intersect(&bitmap(&[1, 3])), DocIdSet::Singleton(3)));
        assert!(matches!(a.intersect(&DocIdSet::range(4, 9)), DocIdSet::Empty));
    }

    fn arb_set() -> impl Strategy<Value = DocIdSet> {
        let leaf = prop_oneof![
            Just(DocIdSet::Empty),
            (0u32..200).prop_map(DocIdSet::Singleton),
            (0u32..200, 0u32..60).prop_map(|(from, len)| DocIdSet::range(from, from + len)),
            proptest::collection::vec(0u32..200, 0..40)
                .prop_map(|ids| DocIdSet::from_bitmap(ids.into_iter().collect())),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 1..4).prop_map(DocIdSet::and),
                proptest::collection::vec(inner.clone(), 1..4).prop_map(DocIdSet::or),
                (inner.clone(), inner).prop_map(|(a, b)| a.and_not(b)),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_iteration_matches_materialize(set in arb_set()) {
            let iterated: RoaringBitmap = set.iter().collect();
            prop_assert_eq!(iterated, set.materialize());
        }

        #[test]
        fn prop_has_matches_materialize(set in arb_set(), probe in 0u32..260) {
            prop_assert_eq!(set.has(probe), set.materialize().contains(probe));
        }

        #[test]
        fn prop_and_or_commutative(a in arb_set(), b in arb_set()) {
            prop_assert_eq!(
                DocIdSet::and(vec![a.clone(), b.clone()]).materialize(),
                DocIdSet::and(vec![b.clone(), a.clone()]).materialize()
            );
            prop_assert_eq!(
                DocIdSet::or(vec![a.clone(), b.clone()]).materialize(),
                DocIdSet::or(vec![b, a]).materialize()
            );
        }

        #[test]
        fn prop_associative(a in arb_set(), b in arb_set(), c in arb_set()) {
            let left = DocIdSet::and(vec![DocIdSet::and(vec![a.clone(), b.clone()]), c.clone()]);
            let right = DocIdSet::and(vec![a.clone(), DocIdSet::and(vec![b.clone(), c.clone()])]);
            prop_assert_eq!(left.materialize(), right.materialize());

            let left = DocIdSet::or(vec![DocIdSet::or(vec![a.clone(), b.clone()]), c.clone()]);
            let right = DocIdSet::or(vec![a, DocIdSet::or(vec![b, c])]);
            prop_assert_eq!(left.materialize(), right.materialize());
        }

        #[test]
        fn prop_de_morgan(u in arb_set(), a in arb_set(), b in arb_set()) {
            // u - (a | b) == (u - a) & (u - b)
            let left = u.clone().and_not(DocIdSet::or(vec![a.clone(), b.clone()]));
            let right = DocIdSet::and(vec![u.clone().and_not(a), u.and_not(b)]);
            prop_assert_eq!(left.materialize(), right.materialize());
        }

        #[test]
        fn prop_eager_matches_lazy(a in arb_set(), b in arb_set()) {
            prop_assert_eq!(a.intersect(&b).materialize(), DocIdSet::and(vec![a.clone(), b.clone()]).materialize());
            prop_assert_eq!(a.union(&b).materialize(), DocIdSet::or(vec![a.clone(), b.clone()]).materialize());
            prop_assert_eq!(a.difference(&b).materialize(), a.clone().and_not(b).materialize());
        }

        #[test]
        fn prop_skip_returns_first_at_or_after(set in arb_set(), target in 0u32..260) {
            let expected = set.materialize().iter().find(|&v| v >= target);
            prop_assert_eq!(set.iter().next_id(Some(target)), expected);
        }
    }
}
