//! Aggregations
//!
//! Each segment feeds its matching documents into one `Accumulator` per
//! requested aggregation. Accumulators finish into partial results that a `Merger` of the
//! same shape folds together across segments:
//!
//! | kind       | per segment                      | merge                         |
//! |------------|----------------------------------|-------------------------------|
//! | `Count`    | set size, no doc visits if known | sum                           |
//! | `First`    | best doc by segment comparator   | re-compare by value           |
//! | `Last`     | same, inverted comparator        | same, inverted clauses        |
//! | `GroupBy`  | nested accumulators per key      | nested mergers per key        |

mod accumulator;
mod merger;
mod types;

pub use types::{AggregationResult, AggregationSpec, GroupResult, TopHit};

use accumulator::Accumulator;
use merger::Merger;

use crate::docset::DocIdSet;
use crate::error::Result;
use crate::segment::SegmentRef;

/// Run `specs` over resolved per-segment sets, one result per spec in order
pub fn aggregate(specs: &[AggregationSpec], matches: &[(SegmentRef, DocIdSet)]) -> Result<Vec<AggregationResult>> {
    let mut mergers = Merger::for_specs(specs);
    for (segment, set) in matches {
        for (spec, merger) in specs.iter().zip(mergers.iter_mut()) {
            let mut acc = Accumulator::new(spec, segment.as_ref())?;
            acc.add_set(segment.as_ref(), set)?;
            merger.merge(acc.finish(segment)?)?;
        }
    }
    mergers.into_iter().map(Merger::finish).collect()
}
