pub mod document;
pub mod search;

pub use document::{DocId, Document, Value, ValueKey, MAX_SAFE_INTEGER, MIN_SAFE_INTEGER};
pub use search::{IndexStats, QueryMode, ResultItem, SegmentStats};
