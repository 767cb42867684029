//! Adaptive document codec
//!
//! Documents are packed without a pre-declared schema. The [`Schema`] tree
//! grows as new field shapes are seen; [`RecordStore`] rolls back the record
//! in progress, extends the schema and retries when encoding hits an
//! unknown shape.

pub mod bitpack;
mod record;
mod schema;
mod store;
pub mod varint;

pub use record::{decode_record, encode_record, Mismatch};
pub use schema::{FieldSlots, NumericFlags, Schema, Slot, SlotType, DEFAULT_SLOT_BUDGET, END_OF_RECORD};
pub use store::{decode_standalone, RecordStore};
