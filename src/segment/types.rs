//! Core segment identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Segment identifier (monotonically increasing per index)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub u64);

impl SegmentId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment_{}", self.0)
    }
}

static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one in-memory segment object.
///
/// A sealed mutable segment and the immutable segment built from it share a
/// [`SegmentId`] but not an instance id, so per-segment caches never mix them.
pub(crate) fn next_instance_id() -> u64 {
    INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_id_display_and_next() {
        let id = SegmentId::new(4);
        assert_eq!(id.to_string(), "segment_4");
        assert_eq!(id.next(), SegmentId(5));
    }

    #[test]
    fn test_instance_ids_are_unique() {
        let a = next_instance_id();
        let b = next_instance_id();
        assert_ne!(a, b);
    }
}
